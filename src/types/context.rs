//! Caveat context value types.

use std::collections::HashMap;

/// A typed value for caveat context evaluation.
///
/// Context maps travel on relationships (bindings captured at write time)
/// and on check requests (bindings supplied by the caller); the caveat
/// module receives the merged map when evaluating an expression.
///
/// # Examples
///
/// ```
/// use warrant::ContextValue;
///
/// let v = ContextValue::String("hello".into());
/// let n = ContextValue::Number(42.0);
/// let b = ContextValue::Bool(true);
/// let list = ContextValue::List(vec![
///     ContextValue::String("a".into()),
///     ContextValue::String("b".into()),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    /// JSON null.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A numeric value (f64).
    Number(f64),
    /// A string value.
    String(String),
    /// A list of values.
    List(Vec<ContextValue>),
    /// A nested key-value structure.
    Struct(HashMap<String, ContextValue>),
}

#[cfg(feature = "serde")]
impl From<&ContextValue> for serde_json::Value {
    fn from(cv: &ContextValue) -> Self {
        match cv {
            ContextValue::Null => serde_json::Value::Null,
            ContextValue::Bool(b) => serde_json::Value::Bool(*b),
            ContextValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ContextValue::String(s) => serde_json::Value::String(s.clone()),
            ContextValue::List(items) => {
                serde_json::Value::Array(items.iter().map(Into::into).collect())
            }
            ContextValue::Struct(fields) => serde_json::Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
            ),
        }
    }
}

#[cfg(feature = "serde")]
impl From<serde_json::Value> for ContextValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => ContextValue::Null,
            serde_json::Value::Bool(b) => ContextValue::Bool(b),
            serde_json::Value::Number(n) => ContextValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => ContextValue::String(s),
            serde_json::Value::Array(items) => {
                ContextValue::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(fields) => ContextValue::Struct(
                fields.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_null() {
        let orig = ContextValue::Null;
        let json: serde_json::Value = (&orig).into();
        let back: ContextValue = json.into();
        assert_eq!(orig, back);
    }

    #[test]
    fn roundtrip_bool() {
        let orig = ContextValue::Bool(true);
        let json: serde_json::Value = (&orig).into();
        let back: ContextValue = json.into();
        assert_eq!(orig, back);
    }

    #[test]
    fn roundtrip_number() {
        let orig = ContextValue::Number(42.5);
        let json: serde_json::Value = (&orig).into();
        let back: ContextValue = json.into();
        assert_eq!(orig, back);
    }

    #[test]
    fn roundtrip_list() {
        let orig = ContextValue::List(vec![
            ContextValue::Number(1.0),
            ContextValue::String("two".into()),
        ]);
        let json: serde_json::Value = (&orig).into();
        let back: ContextValue = json.into();
        assert_eq!(orig, back);
    }

    #[test]
    fn roundtrip_nested_struct() {
        let mut fields = HashMap::new();
        fields.insert("key".to_string(), ContextValue::Bool(false));
        let orig = ContextValue::Struct(fields);
        let json: serde_json::Value = (&orig).into();
        let back: ContextValue = json.into();
        assert_eq!(orig, back);
    }
}
