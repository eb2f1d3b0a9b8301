use serde::{Deserialize, Deserializer, Serialize};

use crate::{campaign::TryParse, TriggerValue};

/// Comparison applied by a [`TriggerCondition`].
///
/// Encoded on the wire as an integer code. Unknown codes decode as [`TriggerOperator::Equals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
#[allow(missing_docs)]
pub enum TriggerOperator {
    GreaterThan,
    #[default]
    Equals,
    LessThan,
    Contains,
    Between,
    NotEquals,
    Set,
    NotSet,
    NotContains,
}

impl From<i64> for TriggerOperator {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::GreaterThan,
            1 => Self::Equals,
            2 => Self::LessThan,
            3 => Self::Contains,
            4 => Self::Between,
            15 => Self::NotEquals,
            26 => Self::Set,
            27 => Self::NotSet,
            28 => Self::NotContains,
            _ => Self::Equals,
        }
    }
}

impl From<TriggerOperator> for i64 {
    fn from(operator: TriggerOperator) -> Self {
        match operator {
            TriggerOperator::GreaterThan => 0,
            TriggerOperator::Equals => 1,
            TriggerOperator::LessThan => 2,
            TriggerOperator::Contains => 3,
            TriggerOperator::Between => 4,
            TriggerOperator::NotEquals => 15,
            TriggerOperator::Set => 26,
            TriggerOperator::NotSet => 27,
            TriggerOperator::NotContains => 28,
        }
    }
}

/// One clause of a trigger's property or item conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerCondition {
    /// A condition without a property name is never satisfied.
    #[serde(default)]
    pub property_name: Option<String>,
    /// Unknown or missing operators read as [`TriggerOperator::Equals`].
    #[serde(default)]
    pub operator: TriggerOperator,
    /// Value the event property is compared with (`propertyValue` on the wire).
    #[serde(default, rename = "propertyValue")]
    pub expected: TriggerValue,
}

impl TriggerCondition {
    /// A condition on `property_name`.
    pub fn new(
        property_name: impl Into<String>,
        operator: TriggerOperator,
        expected: impl Into<TriggerValue>,
    ) -> Self {
        TriggerCondition {
            property_name: Some(property_name.into()),
            operator,
            expected: expected.into(),
        }
    }
}

/// A circular area the user has to be in for the trigger to match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoRadius {
    #[allow(missing_docs)]
    pub lat: f64,
    #[allow(missing_docs)]
    pub lng: f64,
    /// Radius in kilometres.
    #[serde(rename = "rad")]
    pub radius: f64,
}

/// A campaign "when" clause: which event, with which properties, fires the campaign.
///
/// Every list tolerates broken entries: an entry that fails to decode is kept as
/// [`TryParse::ParseFailed`] and is never satisfied, without affecting the rest of the campaign.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAdapter {
    #[serde(default, deserialize_with = "null_as_default")]
    event_name: String,
    #[serde(
        default,
        rename = "eventProperties",
        deserialize_with = "null_as_default"
    )]
    property_conditions: Vec<TryParse<TriggerCondition>>,
    #[serde(default, rename = "itemProperties", deserialize_with = "null_as_default")]
    item_conditions: Vec<TryParse<TriggerCondition>>,
    #[serde(default, rename = "geoRadius", deserialize_with = "null_as_default")]
    geo_radius: Vec<TryParse<GeoRadius>>,
    #[serde(default, deserialize_with = "null_as_default")]
    first_time_only: bool,
    #[serde(default)]
    profile_attr_name: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl TriggerAdapter {
    /// A trigger on `event_name` without conditions.
    pub fn new(event_name: impl Into<String>) -> Self {
        TriggerAdapter {
            event_name: event_name.into(),
            ..Default::default()
        }
    }

    /// Decode a stored trigger. Returns `None` if `json` is not a trigger object at all.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match serde_json::from_value(json.clone()) {
            Ok(trigger) => Some(trigger),
            Err(err) => {
                log::warn!(target: "inapp", "failed to decode trigger: {err}");
                None
            }
        }
    }

    /// Add a condition on the event's top-level properties.
    pub fn with_property_condition(mut self, condition: TriggerCondition) -> Self {
        self.property_conditions.push(TryParse::Parsed(condition));
        self
    }

    /// Add a condition on the line items of a charged event.
    pub fn with_item_condition(mut self, condition: TriggerCondition) -> Self {
        self.item_conditions.push(TryParse::Parsed(condition));
        self
    }

    /// Add an area the user may be in.
    pub fn with_geo_radius(mut self, geo_radius: GeoRadius) -> Self {
        self.geo_radius.push(TryParse::Parsed(geo_radius));
        self
    }

    /// Restrict the trigger to changes of the given profile attribute.
    pub fn with_profile_attr_name(mut self, name: impl Into<String>) -> Self {
        self.profile_attr_name = Some(name.into());
        self
    }

    /// Only match the first time a profile attribute gets a value, i.e. profile-change events
    /// without an `oldValue`. Ignored for events that are not profile changes.
    pub fn first_time_only(mut self, first_time_only: bool) -> Self {
        self.first_time_only = first_time_only;
        self
    }

    #[allow(missing_docs)]
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    #[allow(missing_docs)]
    pub fn property_conditions(&self) -> &[TryParse<TriggerCondition>] {
        &self.property_conditions
    }

    #[allow(missing_docs)]
    pub fn item_conditions(&self) -> &[TryParse<TriggerCondition>] {
        &self.item_conditions
    }

    #[allow(missing_docs)]
    pub fn geo_radius(&self) -> &[TryParse<GeoRadius>] {
        &self.geo_radius
    }

    /// See [`TriggerAdapter::first_time_only`].
    pub fn is_first_time_only(&self) -> bool {
        self.first_time_only
    }

    #[allow(missing_docs)]
    pub fn profile_attr_name(&self) -> Option<&str> {
        self.profile_attr_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{TriggerAdapter, TriggerOperator};
    use crate::{campaign::TryParse, TriggerValue};

    #[test]
    fn decodes_full_trigger() {
        let trigger = TriggerAdapter::from_json(&json!({
            "eventName": "Charged",
            "eventProperties": [
                {"propertyName": "Amount", "operator": 0, "propertyValue": 100}
            ],
            "itemProperties": [
                {"propertyName": "Category", "operator": 3, "propertyValue": ["shoes", "bags"]}
            ],
            "geoRadius": [{"lat": 19.07, "lng": 72.87, "rad": 2}],
            "profileAttrName": null,
            "firstTimeOnly": false
        }))
        .unwrap();

        assert_eq!(trigger.event_name(), "Charged");
        let TryParse::Parsed(condition) = &trigger.property_conditions()[0] else {
            panic!("condition should parse");
        };
        assert_eq!(condition.property_name.as_deref(), Some("Amount"));
        assert_eq!(condition.operator, TriggerOperator::GreaterThan);
        assert_eq!(condition.expected, TriggerValue::from(100.0));
        assert_eq!(trigger.item_conditions().len(), 1);
        assert_eq!(trigger.geo_radius().len(), 1);
        assert!(!trigger.is_first_time_only());
    }

    #[test]
    fn missing_fields_degrade_to_defaults() {
        let trigger = TriggerAdapter::from_json(&json!({
            "eventName": "Signup",
            "eventProperties": null
        }))
        .unwrap();
        assert!(trigger.property_conditions().is_empty());
        assert!(trigger.item_conditions().is_empty());
        assert!(trigger.geo_radius().is_empty());
        assert_eq!(trigger.profile_attr_name(), None);
    }

    #[test]
    fn broken_condition_is_isolated() {
        let trigger = TriggerAdapter::from_json(&json!({
            "eventName": "Signup",
            "eventProperties": [
                {"propertyName": "plan", "operator": "one", "propertyValue": "gold"},
                {"propertyName": "plan", "operator": 1, "propertyValue": "gold"}
            ]
        }))
        .unwrap();
        assert!(matches!(
            trigger.property_conditions()[0],
            TryParse::ParseFailed(_)
        ));
        assert!(matches!(trigger.property_conditions()[1], TryParse::Parsed(_)));
    }

    #[test]
    fn unknown_operator_code_is_equals() {
        assert_eq!(TriggerOperator::from(99), TriggerOperator::Equals);
        assert_eq!(i64::from(TriggerOperator::NotContains), 28);
    }

    #[test]
    fn not_an_object_is_rejected() {
        assert!(TriggerAdapter::from_json(&json!("Signup")).is_none());
    }
}
