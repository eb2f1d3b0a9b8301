use derive_more::From;
use serde::{Deserialize, Serialize};

/// A value taken from an event or a trigger condition.
///
/// `TriggerValue` is deliberately small: absent, a string, a number, or a flat list of scalars.
/// No coercion happens at construction time; each operator decides how to compare values.
///
/// Conveniently implements `From` conversions for `&str`, `String`, `f64` and `Vec<Scalar>`:
/// ```
/// # use inapp_eligibility::TriggerValue;
/// let string_value: TriggerValue = "example".into();
/// let number_value: TriggerValue = 42.0.into();
/// let list_value: TriggerValue = ["red", "blue"].into_iter().collect();
/// ```
#[derive(Debug, Clone, PartialEq, Default, From, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum TriggerValue {
    /// The value is missing.
    #[default]
    Absent,
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A list of scalars. Nested lists and objects are dropped when decoding.
    List(Vec<Scalar>),
}

/// A single element of [`TriggerValue::List`].
#[derive(Debug, Clone, PartialEq, From)]
pub enum Scalar {
    #[allow(missing_docs)]
    String(String),
    #[allow(missing_docs)]
    Number(f64),
}

impl TriggerValue {
    /// Returns `true` if the value is missing.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns `true` for list values.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Raw string value, if the value is a string.
    pub fn string_value(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Number value, if the value is a number. Numeric strings are not parsed.
    pub fn number_value(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// List elements, if the value is a list.
    pub fn list_value(&self) -> Option<&[Scalar]> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    /// String value trimmed and lowercased.
    pub fn string_value_cleaned(&self) -> Option<String> {
        self.string_value().map(clean)
    }

    /// List value with every string element trimmed and lowercased. Numbers are kept as is.
    pub fn list_value_cleaned(&self) -> Option<Vec<Scalar>> {
        let list = self.list_value()?;
        Some(list.iter().map(Scalar::cleaned).collect())
    }

    /// The value as a scalar, if it is one.
    pub(crate) fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Self::String(s) => Some(Scalar::String(s.clone())),
            Self::Number(n) => Some(Scalar::Number(*n)),
            Self::Absent | Self::List(_) => None,
        }
    }
}

impl Scalar {
    /// String view of the scalar, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// Numeric view of the scalar. Strings holding a number are parsed.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
        }
    }

    fn cleaned(&self) -> Scalar {
        match self {
            Self::String(s) => Self::String(clean(s)),
            Self::Number(n) => Self::Number(*n),
        }
    }

    fn from_json(value: serde_json::Value) -> Option<Scalar> {
        match value {
            serde_json::Value::String(s) => Some(Self::String(s)),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::Bool(b) => Some(Self::String(b.to_string())),
            serde_json::Value::Null
            | serde_json::Value::Array(_)
            | serde_json::Value::Object(_) => None,
        }
    }
}

pub(crate) fn clean(s: &str) -> String {
    s.trim().to_lowercase()
}

impl From<&str> for TriggerValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl<T: Into<Scalar>> FromIterator<T> for TriggerValue {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::List(iter.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for TriggerValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null | serde_json::Value::Object(_) => Self::Absent,
            serde_json::Value::Bool(b) => Self::String(b.to_string()),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Absent, Self::Number),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().filter_map(Scalar::from_json).collect())
            }
        }
    }
}

impl From<Scalar> for serde_json::Value {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::String(s) => serde_json::Value::String(s),
            Scalar::Number(n) => serde_json::Number::from_f64(n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
        }
    }
}

impl From<TriggerValue> for serde_json::Value {
    fn from(value: TriggerValue) -> Self {
        match value {
            TriggerValue::Absent => serde_json::Value::Null,
            TriggerValue::String(s) => Scalar::String(s).into(),
            TriggerValue::Number(n) => Scalar::Number(n).into(),
            TriggerValue::List(list) => {
                serde_json::Value::Array(list.into_iter().map(Into::into).collect())
            }
        }
    }
}
