use super::Error;
use serde_json::Value;
use std::io::{Read, Write};

/// CodecKind selects the blob encoding of stored documents.
/// Readers must use the encoding the writer used; the choice is
/// recorded only by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    /// MessagePack, a binary structural encoding of the document.
    #[default]
    MessagePack,
    Json,
    GzipJson,
}

impl CodecKind {
    pub fn encode(&self, doc: &Value) -> Result<Vec<u8>, Error> {
        let enc = |e: Box<dyn std::error::Error + Send + Sync>| Error::Encode(e);

        match self {
            CodecKind::MessagePack => rmp_serde::to_vec(doc).map_err(|e| enc(e.into())),
            CodecKind::Json => serde_json::to_vec(doc).map_err(|e| enc(e.into())),
            CodecKind::GzipJson => {
                let mut gz =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                serde_json::to_writer(&mut gz, doc).map_err(|e| enc(e.into()))?;
                gz.finish().map_err(|e| enc(e.into()))
            }
        }
    }

    pub fn decode(&self, blob: &[u8]) -> Result<Value, Error> {
        let dec = |e: Box<dyn std::error::Error + Send + Sync>| Error::Decode(e);

        match self {
            CodecKind::MessagePack => rmp_serde::from_slice(blob).map_err(|e| dec(e.into())),
            CodecKind::Json => serde_json::from_slice(blob).map_err(|e| dec(e.into())),
            CodecKind::GzipJson => {
                let mut json = Vec::new();
                flate2::read::GzDecoder::new(blob)
                    .read_to_end(&mut json)
                    .map_err(|e| dec(e.into()))?;
                serde_json::from_slice(&json).map_err(|e| dec(e.into()))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn codecs_round_trip() {
        let doc = json!({
            "metadata": {"name": "obj01", "labels": {"cows": "milk"}},
            "spec": {"replicas": 3, "ratio": 0.5, "on": true, "empty": null},
        });

        for codec in [CodecKind::MessagePack, CodecKind::Json, CodecKind::GzipJson] {
            let blob = codec.encode(&doc).unwrap();
            assert_eq!(codec.decode(&blob).unwrap(), doc, "{codec:?}");
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        for codec in [CodecKind::MessagePack, CodecKind::Json, CodecKind::GzipJson] {
            assert!(matches!(
                codec.decode(b"\xc1 not a document"),
                Err(Error::Decode(_))
            ));
        }
    }
}
