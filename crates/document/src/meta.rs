use super::Error;
use serde_json::Value;
use std::collections::BTreeMap;

/// Fetch a string property of the document's metadata, or "".
pub fn metadata_str<'v>(doc: &'v Value, prop: &str) -> &'v str {
    doc.get("metadata")
        .and_then(|m| m.get(prop))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

pub fn name_of(doc: &Value) -> &str {
    metadata_str(doc, "name")
}

pub fn namespace_of(doc: &Value) -> &str {
    metadata_str(doc, "namespace")
}

pub fn resource_version_of(doc: &Value) -> &str {
    metadata_str(doc, "resourceVersion")
}

/// The document's `metadata.labels`, as an ordered map.
/// Non-string values are ignored.
pub fn labels_of(doc: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let Some(labels) = doc
        .get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(Value::as_object)
    else {
        return out;
    };
    for (name, value) in labels {
        if let Some(value) = value.as_str() {
            out.insert(name.clone(), value.to_string());
        }
    }
    out
}

/// The default key function: `namespace/name` for namespaced documents
/// and bare `name` otherwise.
pub fn default_key(doc: &Value) -> Result<String, Error> {
    let name = name_of(doc);
    if name.is_empty() {
        return Err(Error::MissingName);
    }
    let namespace = namespace_of(doc);
    if namespace.is_empty() {
        Ok(name.to_string())
    } else {
        Ok(format!("{namespace}/{name}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_and_labels() {
        let doc = json!({
            "metadata": {
                "name": "web-0",
                "namespace": "default",
                "resourceVersion": "107",
                "labels": {"app": "web", "tier": 3},
            },
        });

        assert_eq!(default_key(&doc).unwrap(), "default/web-0");
        assert_eq!(resource_version_of(&doc), "107");

        // The non-string label value is dropped.
        assert_eq!(
            labels_of(&doc),
            BTreeMap::from([("app".to_string(), "web".to_string())])
        );

        let cluster_scoped = json!({"metadata": {"name": "node-1"}});
        assert_eq!(default_key(&cluster_scoped).unwrap(), "node-1");

        assert!(default_key(&json!({"metadata": {}})).is_err());
    }
}
