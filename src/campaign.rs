use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, LimitAdapter, Result, TriggerAdapter};

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
///
/// This isolates errors in a subtree: if one condition of a trigger is broken, the rest of the
/// campaign is still usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

pub(crate) const KEY_ID: &str = "ti";
const KEY_PRIORITY: &str = "priority";
const KEY_DELAY_AFTER_TRIGGER: &str = "delayAfterTrigger";
const KEY_WHEN_TRIGGERS: &str = "whenTriggers";
const KEY_WHEN_LIMITS: &str = "whenLimits";
const KEY_FREQUENCY_LIMITS: &str = "frequencyLimits";
const KEY_EXCLUDE_FROM_CAPS: &str = "efc";
const KEY_MAX_PER_SESSION: &str = "mdc";
const KEY_TOTAL_LIFETIME_COUNT: &str = "tlc";
const KEY_TOTAL_DAILY_COUNT: &str = "tdc";
const KEY_SUPPRESSED: &str = "suppressed";
const KEY_TTL: &str = "wzrk_ttl";
const KEY_TTL_OFFSET: &str = "wzrk_ttl_offset";
const KEY_REPORT_ID: &str = "wzrk_id";
const KEY_REPORT_PIVOT: &str = "wzrk_pivot";
const KEY_REPORT_CONTROL_GROUP: &str = "wzrk_cgId";

const DEFAULT_PIVOT: &str = "wzrk_default";

/// Sentinel used by the server for "no cap configured".
const UNSET_COUNT: i64 = -1;

/// A campaign payload as delivered by the candidate source.
///
/// The payload is kept as an opaque JSON object, so that the renderer receives exactly what the
/// server sent. Accessors are lenient: a missing or mistyped field reads as its default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Campaign(Map<String, Value>);

impl Campaign {
    /// Wrap a JSON value. Returns `None` unless `json` is an object.
    pub fn from_json(json: Value) -> Option<Campaign> {
        match json {
            Value::Object(map) => Some(Campaign(map)),
            _ => None,
        }
    }

    /// The raw payload.
    pub fn as_json(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Unwrap into a JSON object value.
    pub fn into_json(self) -> Value {
        Value::Object(self.0)
    }

    /// Raw payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Campaign identifier. Numeric identifiers are rendered as strings.
    pub fn id(&self) -> Option<String> {
        match self.0.get(KEY_ID)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Display priority. Higher values are shown first.
    pub fn priority(&self) -> Option<i64> {
        self.int(KEY_PRIORITY)
    }

    /// Seconds to wait between the trigger and the display. Zero or missing means immediate.
    pub fn delay_after_trigger(&self) -> Option<i64> {
        self.int(KEY_DELAY_AFTER_TRIGGER)
    }

    /// Creation time in epoch seconds, as encoded in the numeric campaign identifier. Campaigns
    /// without a numeric identifier are considered created at `now_seconds`.
    pub fn created_at(&self, now_seconds: i64) -> i64 {
        self.id()
            .and_then(|id| id.parse().ok())
            .unwrap_or(now_seconds)
    }

    /// Decoded `whenTriggers`. Entries that are not trigger objects are skipped.
    pub fn when_triggers(&self) -> Vec<TriggerAdapter> {
        let Some(Value::Array(triggers)) = self.0.get(KEY_WHEN_TRIGGERS) else {
            return Vec::new();
        };
        triggers.iter().filter_map(TriggerAdapter::from_json).collect()
    }

    /// Decoded `whenLimits`, checked while matching an event.
    pub fn when_limits(&self) -> Result<Vec<LimitAdapter>> {
        self.limits(KEY_WHEN_LIMITS)
    }

    /// Decoded `frequencyLimits`, checked before display.
    pub fn frequency_limits(&self) -> Result<Vec<LimitAdapter>> {
        self.limits(KEY_FREQUENCY_LIMITS)
    }

    /// Missing limits are no limits. A limits field that is not an array cannot be evaluated and
    /// is an error; individual entries that fail to decode are skipped.
    fn limits(&self, key: &'static str) -> Result<Vec<LimitAdapter>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(entries)) => Ok(entries
                .iter()
                .filter_map(|entry| {
                    let limit = LimitAdapter::from_json(entry);
                    if limit.is_none() {
                        log::warn!(target: "inapp",
                                   campaign_id:? = self.id(),
                                   field = key;
                                   "skipping undecodable limit: {entry}");
                    }
                    limit
                })
                .collect()),
            Some(_) => Err(Error::InvalidCampaign(match key {
                KEY_WHEN_LIMITS => "whenLimits is not an array",
                _ => "frequencyLimits is not an array",
            })),
        }
    }

    /// Returns `true` if the campaign bypasses every display cap.
    pub fn exclude_from_caps(&self) -> bool {
        self.flag(KEY_EXCLUDE_FROM_CAPS)
    }

    /// Per-session display cap of this campaign.
    pub fn max_per_session(&self) -> Option<i64> {
        self.int(KEY_MAX_PER_SESSION)
    }

    /// Lifetime display cap, `None` when not configured.
    pub fn total_lifetime_count(&self) -> Option<i64> {
        self.int(KEY_TOTAL_LIFETIME_COUNT)
            .filter(|count| *count != UNSET_COUNT)
    }

    /// Daily display cap, `None` when not configured.
    pub fn total_daily_count(&self) -> Option<i64> {
        self.int(KEY_TOTAL_DAILY_COUNT)
            .filter(|count| *count != UNSET_COUNT)
    }

    /// Returns `true` if the server marked the campaign as suppressed (control group).
    pub fn is_suppressed(&self) -> bool {
        self.flag(KEY_SUPPRESSED)
    }

    /// Expiry in epoch seconds, stamped on immediately selected campaigns.
    pub fn ttl(&self) -> Option<i64> {
        self.int(KEY_TTL)
    }

    pub(crate) fn update_ttl(&mut self, now_seconds: i64) {
        if let Some(offset) = self.int(KEY_TTL_OFFSET) {
            self.0.insert(KEY_TTL.to_owned(), now_seconds.saturating_add(offset).into());
        } else {
            self.0.remove(KEY_TTL);
        }
    }

    pub(crate) fn remove_ttl(&mut self) {
        self.0.remove(KEY_TTL);
    }

    /// Reporting identifiers sent back to the server for a suppressed campaign.
    pub(crate) fn suppression_record(&self) -> SuppressedCampaign {
        SuppressedCampaign {
            report_id: self.string(KEY_REPORT_ID),
            pivot: self
                .string(KEY_REPORT_PIVOT)
                .unwrap_or_else(|| DEFAULT_PIVOT.to_owned()),
            control_group_id: self.int(KEY_REPORT_CONTROL_GROUP),
        }
    }

    fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        }
    }
}

impl TryFrom<Value> for Campaign {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Campaign::from_json(value).ok_or(Error::InvalidCampaign("campaign is not a JSON object"))
    }
}

/// A campaign that was withheld by the suppression handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressedCampaign {
    /// Reporting identifier of the campaign.
    #[serde(rename = "wzrk_id")]
    pub report_id: Option<String>,
    /// Variant the campaign belongs to.
    #[serde(rename = "wzrk_pivot")]
    pub pivot: String,
    /// Control group the user was placed in.
    #[serde(rename = "wzrk_cgId")]
    pub control_group_id: Option<i64>,
}
