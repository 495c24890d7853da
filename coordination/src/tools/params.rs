//! Parameter extraction for tool actions
//!
//! Binary fields are accepted either as a base64 string or as a JSON array
//! of byte values. Records must be JSON objects.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};

use super::{ToolError, ToolResult};

/// Parameters of one tool request
pub type Params = Map<String, Value>;

/// Required non-empty string
pub fn require_str<'a>(params: &'a Params, name: &str) -> ToolResult<&'a str> {
    optional_str(params, name)?.ok_or_else(|| ToolError::missing(name))
}

/// Optional string. Present but not a string is an error; blank counts as absent.
pub fn optional_str<'a>(params: &'a Params, name: &str) -> ToolResult<Option<&'a str>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ToolError::invalid(name, "expected a string")),
    }
}

/// Required non-empty binary payload
pub fn require_binary(params: &Params, name: &str) -> ToolResult<Vec<u8>> {
    optional_binary(params, name)?
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ToolError::missing(name))
}

/// Optional binary payload. A present but empty payload stays `Some`, so
/// callers echoing input see exactly what was sent.
pub fn optional_binary(params: &Params, name: &str) -> ToolResult<Option<Vec<u8>>> {
    let bytes = match params.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(encoded)) => BASE64
            .decode(encoded.trim().as_bytes())
            .map_err(|e| ToolError::invalid(name, &format!("invalid base64 ({})", e)))?,
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| ToolError::invalid(name, "byte array values must be 0-255"))
            })
            .collect::<ToolResult<Vec<u8>>>()?,
        Some(_) => {
            return Err(ToolError::invalid(
                name,
                "expected a base64 string or byte array",
            ))
        }
    };

    Ok(Some(bytes))
}

/// Optional JSON object
pub fn optional_record<'a>(params: &'a Params, name: &str) -> ToolResult<Option<&'a Params>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(ToolError::invalid(name, "expected an object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("test params must be an object"),
        }
    }

    #[test]
    fn test_require_str() {
        let p = params(json!({"text": "hello", "blank": "  ", "num": 3}));
        assert_eq!(require_str(&p, "text").unwrap(), "hello");
        assert_eq!(
            require_str(&p, "blank").unwrap_err().to_string(),
            "Missing required parameter: blank"
        );
        assert_eq!(
            require_str(&p, "num").unwrap_err().to_string(),
            "Invalid parameter num: expected a string"
        );
        assert_eq!(
            require_str(&p, "absent").unwrap_err().to_string(),
            "Missing required parameter: absent"
        );
    }

    #[test]
    fn test_binary_accepts_base64_and_arrays() {
        let p = params(json!({"a": "aGk=", "b": [104, 105], "c": "", "d": [300]}));
        assert_eq!(require_binary(&p, "a").unwrap(), b"hi");
        assert_eq!(require_binary(&p, "b").unwrap(), b"hi");
        assert_eq!(optional_binary(&p, "c").unwrap(), Some(Vec::new()));
        assert_eq!(
            require_binary(&p, "c").unwrap_err().to_string(),
            "Missing required parameter: c"
        );
        assert!(require_binary(&p, "d").is_err());
        assert_eq!(
            require_binary(&p, "image").unwrap_err().to_string(),
            "Missing required parameter: image"
        );
    }

    #[test]
    fn test_binary_rejects_bad_base64() {
        let p = params(json!({"image": "not base64!"}));
        let err = require_binary(&p, "image").unwrap_err().to_string();
        assert!(err.starts_with("Invalid parameter image: invalid base64"));
    }

    #[test]
    fn test_optional_record() {
        let p = params(json!({"ctx": {"k": 1}, "bad": [1]}));
        assert_eq!(optional_record(&p, "ctx").unwrap().unwrap()["k"], 1);
        assert!(optional_record(&p, "bad").is_err());
        assert!(optional_record(&p, "none").unwrap().is_none());
    }
}
