use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Null,
    Integer,
    BigInt,
    Float,
    Varchar,
    Boolean,
}

/// Singleton SQL value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "TYPE", content = "VALUE", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Value {
    Null,
    Integer(i32),
    BigInt(i64),
    Float(f64),
    Varchar(String),
    Boolean(bool),
}

impl ValueType {
    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Integer | Self::BigInt)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || matches!(self, Self::Float)
    }

    /// Whether a value of type `other` may stand where `self` is expected. Null fits anywhere
    /// and integral types widen into each other.
    pub fn accepts(&self, other: ValueType) -> bool {
        *self == other
            || other == Self::Null
            || (self.is_integral() && other.is_integral())
            || (*self == Self::Float && other.is_integral())
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Integer(_) => ValueType::Integer,
            Self::BigInt(_) => ValueType::BigInt,
            Self::Float(_) => ValueType::Float,
            Self::Varchar(_) => ValueType::Varchar,
            Self::Boolean(_) => ValueType::Boolean,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(val) => Some(*val as i64),
            Self::BigInt(val) => Some(*val),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(val) => write!(f, "{}", val),
            Self::BigInt(val) => write!(f, "{}", val),
            Self::Float(val) => write!(f, "{}", val),
            Self::Varchar(val) => write!(f, "'{}'", val),
            Self::Boolean(val) => write!(f, "{}", val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn value_type_names() {
        assert_eq!(ValueType::BigInt.to_string(), "BIG_INT");
        assert_eq!(ValueType::from_str("VARCHAR").unwrap(), ValueType::Varchar);
        assert_eq!(
            serde_json::to_value(ValueType::Boolean).unwrap(),
            serde_json::json!("BOOLEAN")
        );
    }

    #[test]
    fn accepts_widening() {
        assert!(ValueType::BigInt.accepts(ValueType::Integer));
        assert!(ValueType::Float.accepts(ValueType::BigInt));
        assert!(ValueType::Varchar.accepts(ValueType::Null));
        assert!(!ValueType::Integer.accepts(ValueType::Varchar));
        assert!(!ValueType::Integer.accepts(ValueType::Float));
    }

    #[test]
    fn value_document_shape() {
        assert_eq!(
            serde_json::to_value(Value::BigInt(7)).unwrap(),
            serde_json::json!({"TYPE": "BIG_INT", "VALUE": 7})
        );
        assert_eq!(
            serde_json::from_value::<Value>(serde_json::json!({"TYPE": "NULL"})).unwrap(),
            Value::Null
        );
        assert_eq!(Value::Varchar("a".to_string()).to_string(), "'a'");
    }
}
