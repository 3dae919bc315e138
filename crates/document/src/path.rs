use super::Error;

/// FieldPath is a parsed path into an unstructured document.
///
/// The textual form is a dotted path with two bracket extensions:
/// `[3]` addresses an array element, and `[example.com/name]` escapes a
/// property whose name itself contains dots or slashes.
/// `spec.containers[0].image` and `metadata.annotations[cattle.io/ts]` are
/// both valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse the textual form. Empty paths and unterminated brackets
    /// are rejected.
    pub fn parse(path: &str) -> Result<Self, Error> {
        let malformed = || Error::InvalidFieldPath {
            path: path.to_string(),
        };

        let mut segments = Vec::new();
        let mut cur = String::new();
        let mut it = path.chars();

        while let Some(c) = it.next() {
            match c {
                '.' => {
                    if cur.is_empty() && segments.is_empty() {
                        return Err(malformed());
                    }
                    if !cur.is_empty() {
                        segments.push(std::mem::take(&mut cur));
                    }
                }
                '[' => {
                    if !cur.is_empty() {
                        segments.push(std::mem::take(&mut cur));
                    }
                    let mut escaped = String::new();
                    loop {
                        match it.next() {
                            Some(']') => break,
                            Some(c) => escaped.push(c),
                            None => return Err(malformed()),
                        }
                    }
                    if escaped.is_empty() {
                        return Err(malformed());
                    }
                    segments.push(escaped);
                }
                ']' => return Err(malformed()),
                _ => cur.push(c),
            }
        }
        if !cur.is_empty() {
            segments.push(cur);
        }
        if segments.is_empty() {
            return Err(malformed());
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The column name under which this path is projected into the
    /// fields table. Segments requiring escapes render in bracket form.
    pub fn column_name(&self) -> String {
        let mut out = String::new();
        for (i, seg) in self.0.iter().enumerate() {
            if seg.contains(['.', '/', '[', ']']) {
                out.push_str(&format!("[{seg}]"));
            } else if i == 0 {
                out.push_str(seg);
            } else {
                out.push('.');
                out.push_str(seg);
            }
        }
        out
    }

    /// The label name when this path addresses `metadata.labels.<name>`.
    pub fn label_name(&self) -> Option<&str> {
        match self.0.as_slice() {
            [a, b, name] if a == "metadata" && b == "labels" => Some(name),
            _ => None,
        }
    }

    /// When the final segment is an array subscript, split it off:
    /// `spec.containers.image.3` becomes (`spec.containers.image`, 3).
    pub fn split_trailing_index(&self) -> Option<(FieldPath, usize)> {
        let (last, rest) = self.0.split_last()?;
        if rest.is_empty() {
            return None;
        }
        let index = last.parse::<usize>().ok()?;
        Some((FieldPath(rest.to_vec()), index))
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.column_name())
    }
}

impl<S: Into<String>> FromIterator<S> for FieldPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl std::ops::Deref for FieldPath {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_and_render() {
        let cases = [
            ("metadata.name", vec!["metadata", "name"]),
            ("spec.containers[0].image", vec!["spec", "containers", "0", "image"]),
            (
                "metadata.labels[example.com/part]",
                vec!["metadata", "labels", "example.com/part"],
            ),
            ("status.podIP", vec!["status", "podIP"]),
            ("metadata.fields.3", vec!["metadata", "fields", "3"]),
        ];
        for (text, segments) in cases {
            let path = FieldPath::parse(text).unwrap();
            assert_eq!(path.segments(), segments.as_slice(), "{text}");
            assert_eq!(FieldPath::parse(&path.column_name()).unwrap(), path);
        }
    }

    #[test]
    fn parse_rejects_malformed() {
        for text in ["", ".leading", "open[bracket", "a[]b", "stray]"] {
            assert!(FieldPath::parse(text).is_err(), "{text}");
        }
    }

    #[test]
    fn label_and_index_helpers() {
        assert_eq!(
            FieldPath::parse("metadata.labels.app").unwrap().label_name(),
            Some("app")
        );
        assert_eq!(FieldPath::parse("metadata.name").unwrap().label_name(), None);

        let (base, index) = FieldPath::parse("spec.containers.image.3")
            .unwrap()
            .split_trailing_index()
            .unwrap();
        assert_eq!(base.column_name(), "spec.containers.image");
        assert_eq!(index, 3);

        assert!(FieldPath::parse("metadata.name")
            .unwrap()
            .split_trailing_index()
            .is_none());
    }
}
