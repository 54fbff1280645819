// Canonical JSON: object keys sorted by byte order, no insignificant whitespace.
// Used wherever a hash is taken over JSON so two writers agree on the bytes.
use serde::Serialize;
use serde_json::Value;

use crate::error::{ErrorCode, Result, SidetreeError};

pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)
        .map_err(|e| SidetreeError::new(ErrorCode::OperationRequestNotJson, e.to_string()))?;
    let mut out = Vec::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push(b'{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String(key.clone()), out)?;
                out.push(b':');
                write_canonical(val, out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => write_scalar(scalar, out)?,
    }
    Ok(())
}

fn write_scalar(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    serde_json::to_writer(out, value)
        .map_err(|e| SidetreeError::new(ErrorCode::OperationRequestNotJson, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_nested_keys_without_whitespace() {
        let v = json!({"b": [ {"z": 1, "a": 2} ], "a": "x"});
        assert_eq!(canonicalize(&v).unwrap(), br#"{"a":"x","b":[{"a":2,"z":1}]}"#.to_vec());
    }
}
