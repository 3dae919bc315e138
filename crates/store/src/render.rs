use super::Error;
use serde_json::Value;

/// Render an extracted field value into its canonical indexed text:
/// absent values become '', booleans and numbers their display form,
/// and lists of scalars are `|`-joined. Objects and nested lists are
/// not indexable.
pub fn render_scalar(base: &str, column: &str, value: Option<&Value>) -> Result<String, Error> {
    let unindexable = || Error::Unindexable {
        base: base.to_string(),
        column: column.to_string(),
    };

    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Null => parts.push(String::new()),
                    Value::Bool(b) => parts.push(b.to_string()),
                    Value::Number(n) => parts.push(n.to_string()),
                    Value::String(s) => parts.push(s.clone()),
                    Value::Array(_) | Value::Object(_) => return Err(unindexable()),
                }
            }
            parts.join("|")
        }
        Some(Value::Object(_)) => return Err(unindexable()),
    })
}
