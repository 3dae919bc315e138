use super::FieldPath;
use serde_json::Value;
use std::sync::Arc;

/// SQL column affinity of an indexed field. Text unless overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlType {
    #[default]
    Text,
    Integer,
    Real,
}

impl SqlType {
    pub fn ddl(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
        }
    }
}

/// How an indexed field obtains its value from a document.
#[derive(Clone)]
pub enum Extract {
    /// Walk the document along the field's path.
    Path,
    /// An opaque extractor producing a scalar (or scalar list).
    Computed(Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>),
}

impl std::fmt::Debug for Extract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Extract::Path => f.write_str("Path"),
            Extract::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// IndexedField declares one JSON path of a document that is projected
/// into a column of the GVK's fields table, with one secondary index.
/// The declared set is fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct IndexedField {
    pub path: FieldPath,
    pub sql_type: SqlType,
    pub extract: Extract,
}

impl IndexedField {
    pub fn new(path: FieldPath) -> Self {
        Self {
            path,
            sql_type: SqlType::Text,
            extract: Extract::Path,
        }
    }

    pub fn with_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = sql_type;
        self
    }

    /// Declare a computed column: `path` names the column, the closure
    /// produces its value.
    pub fn computed<F>(path: FieldPath, f: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            path,
            sql_type: SqlType::Text,
            extract: Extract::Computed(Arc::new(f)),
        }
    }

    pub fn column_name(&self) -> String {
        self.path.column_name()
    }

    /// Evaluate this field against `doc`, returning the projected value
    /// (possibly a list of scalars) or None when absent.
    pub fn evaluate(&self, doc: &Value) -> Option<Value> {
        match &self.extract {
            Extract::Path => walk(doc, self.path.segments()),
            Extract::Computed(f) => f(doc),
        }
    }
}

// Walk `doc` along the path. A non-numeric segment applied to a list
// projects the remaining path across the list's elements, so e.g.
// `spec.containers.image` over a container list yields the image list.
fn walk(doc: &Value, segments: &[String]) -> Option<Value> {
    let Some((seg, rest)) = segments.split_first() else {
        return Some(doc.clone());
    };
    match doc {
        Value::Object(map) => walk(map.get(seg)?, rest),
        Value::Array(items) => {
            if let Ok(index) = seg.parse::<usize>() {
                return walk(items.get(index)?, rest);
            }
            let mut collected = Vec::new();
            for item in items {
                match walk(item, segments) {
                    Some(Value::Array(nested)) => collected.extend(nested),
                    Some(value) => collected.push(value),
                    None => (),
                }
            }
            (!collected.is_empty()).then_some(Value::Array(collected))
        }
        _ => None,
    }
}
