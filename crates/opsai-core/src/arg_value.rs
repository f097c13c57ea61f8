use serde::{Deserialize, Serialize};

/// Discriminated argument value passed to a worker action.
///
/// Replaces an opaque string-keyed map with a small closed union so the
/// coercion rules (boolean-like strings, scalar-in-place-of-list) live in one
/// place instead of being re-derived at every call site.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    List(Vec<ArgValue>),
}

impl ArgValue {
    /// Coerce to a string slice, if this value is itself a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean coercion: accepts a real bool, or a case-insensitive
    /// "true"/"false" string, per the worker contract's coercion policy.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f) => Some(*f as i64),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// List coercion: a bare scalar is accepted in place of a single-element
    /// list, per the worker contract's coercion policy.
    pub fn as_list(&self) -> Vec<&ArgValue> {
        match self {
            Self::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_bool_from_string_true() {
        let v = ArgValue::from("true");
        assert_eq!(v.as_bool(), Some(true));
    }

    #[test]
    fn test_as_bool_case_insensitive() {
        let v = ArgValue::String("FALSE".to_string());
        assert_eq!(v.as_bool(), Some(false));
    }

    #[test]
    fn test_as_bool_native() {
        assert_eq!(ArgValue::Bool(true).as_bool(), Some(true));
    }

    #[test]
    fn test_as_bool_invalid_string() {
        let v = ArgValue::String("maybe".to_string());
        assert_eq!(v.as_bool(), None);
    }

    #[test]
    fn test_as_list_wraps_scalar() {
        let v = ArgValue::from("single");
        let list = v.as_list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].as_str(), Some("single"));
    }

    #[test]
    fn test_as_list_passthrough() {
        let v = ArgValue::List(vec![ArgValue::from("a"), ArgValue::from("b")]);
        assert_eq!(v.as_list().len(), 2);
    }

    #[test]
    fn test_as_i64_from_string() {
        let v = ArgValue::from("42".to_string());
        assert_eq!(v.as_i64(), Some(42));
    }

    #[test]
    fn test_serde_roundtrip() {
        let v = ArgValue::List(vec![ArgValue::from(1i64), ArgValue::Bool(false)]);
        let json = serde_json::to_string(&v).unwrap();
        let back: ArgValue = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
