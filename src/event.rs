use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::TriggerValue;

/// Properties of an event or of a single charged item.
///
/// Keys are kept sorted so that normalized lookups (see [`EventAdapter::property_value`]) resolve
/// deterministically when several stored keys collapse to the same normalized name.
pub type EventProperties = BTreeMap<String, TriggerValue>;

/// Name of the event raised when the host application starts.
pub const APP_LAUNCHED_EVENT: &str = "App Launched";
/// Name of the purchase event carrying line items.
pub const CHARGED_EVENT: &str = "Charged";

/// Property holding the new value of a changed profile attribute.
pub const PROFILE_NEW_VALUE: &str = "newValue";
/// Property holding the previous value of a changed profile attribute.
pub const PROFILE_OLD_VALUE: &str = "oldValue";

pub(crate) static ABSENT: TriggerValue = TriggerValue::Absent;

/// Geographic position of the user, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[allow(missing_docs)]
    pub lat: f64,
    #[allow(missing_docs)]
    pub lng: f64,
}

/// Normalized view over an event produced by the host application.
#[derive(Debug, Clone, Default)]
pub struct EventAdapter {
    event_name: String,
    properties: EventProperties,
    items: Vec<EventProperties>,
    user_location: Option<Location>,
    profile_attr_name: Option<String>,
}

impl EventAdapter {
    /// A custom event.
    pub fn new(event_name: impl Into<String>, properties: EventProperties) -> Self {
        EventAdapter {
            event_name: event_name.into(),
            properties,
            ..Default::default()
        }
    }

    /// A charged (purchase) event with its line items.
    pub fn charged(details: EventProperties, items: Vec<EventProperties>) -> Self {
        EventAdapter {
            items,
            ..EventAdapter::new(CHARGED_EVENT, details)
        }
    }

    /// The app launch event.
    pub fn app_launched(properties: EventProperties) -> Self {
        EventAdapter::new(APP_LAUNCHED_EVENT, properties)
    }

    /// An event describing the change of a single profile attribute. The event is named after the
    /// attribute and carries `newValue`/`oldValue` properties.
    pub fn for_profile_change(
        attribute: impl Into<String>,
        new_value: TriggerValue,
        old_value: TriggerValue,
    ) -> Self {
        let attribute = attribute.into();
        let properties = [
            (PROFILE_NEW_VALUE.to_owned(), new_value),
            (PROFILE_OLD_VALUE.to_owned(), old_value),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_absent())
        .collect();

        EventAdapter {
            profile_attr_name: Some(attribute.clone()),
            ..EventAdapter::new(attribute, properties)
        }
    }

    /// Attach the user's location, used by geo-radius triggers.
    pub fn with_location(mut self, location: Option<Location>) -> Self {
        self.user_location = location;
        self
    }

    #[allow(missing_docs)]
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Top-level properties as supplied.
    pub fn properties(&self) -> &EventProperties {
        &self.properties
    }

    /// Line items of a charged event. Empty for other events.
    pub fn items(&self) -> &[EventProperties] {
        &self.items
    }

    #[allow(missing_docs)]
    pub fn user_location(&self) -> Option<Location> {
        self.user_location
    }

    /// Attribute name of a profile-change event.
    pub fn profile_attr_name(&self) -> Option<&str> {
        self.profile_attr_name.as_deref()
    }

    /// Look up a top-level property.
    ///
    /// An exact key always wins. Otherwise keys are compared with all whitespace removed and in
    /// lowercase, and the first matching key is used. Missing properties are `Absent`.
    pub fn property_value(&self, name: &str) -> &TriggerValue {
        resolve_property(&self.properties, name).unwrap_or(&ABSENT)
    }

    /// Look up `name` in every charged item. Items without the property are skipped, so the
    /// result may be shorter than [`EventAdapter::items`].
    pub fn item_value(&self, name: &str) -> Vec<&TriggerValue> {
        self.items
            .iter()
            .filter_map(|item| resolve_property(item, name))
            .collect()
    }
}

/// Two-phase property lookup shared by events and charged items.
pub(crate) fn resolve_property<'a>(
    properties: &'a EventProperties,
    name: &str,
) -> Option<&'a TriggerValue> {
    if let Some(value) = properties.get(name) {
        return Some(value);
    }

    let normalized = normalize_key(name);
    properties
        .iter()
        .find(|(key, _)| normalize_key(key) == normalized)
        .map(|(_, value)| value)
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Build [`EventProperties`] from a JSON object, e.g. as received from the host bridge.
pub fn properties_from_json(object: &serde_json::Map<String, serde_json::Value>) -> EventProperties {
    object
        .iter()
        .map(|(key, value)| (key.clone(), TriggerValue::from(value.clone())))
        .collect()
}
