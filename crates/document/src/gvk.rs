/// Gvk identifies a group/version/kind of resource held by the cache.
/// Its sanitized form names the backing SQL tables of that resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Base name of this Gvk's tables: sanitized `group_version_kind`.
    /// The `_fields` and `_labels` sidecars suffix this base.
    pub fn table_base(&self) -> String {
        sanitize(&format!("{}_{}_{}", self.group, self.version, self.kind))
    }

    /// The `group/version` form used by indirect filter and sort directives.
    pub fn group_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }
}

impl std::fmt::Display for Gvk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}, Kind={}", self.group, self.version, self.kind)
    }
}

/// Map an identifier destined for SQL text into a safe form:
/// `/` and every character outside `[-a-zA-Z0-9._]` become `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '-' | '.' => c,
            _ if c.is_ascii_alphanumeric() => c,
            _ => '_',
        })
        .collect()
}
