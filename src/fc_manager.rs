use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::{
    clock::Calendar,
    store::{CounterKind, CounterValue, DisplayCounts, ScopedCounters},
    Campaign, Clock, EngineConfig, ImpressionManager, Result,
};

const KEY_STALE: &str = "inapp_stale";
const KEY_GLOBAL_MAX_PER_SESSION: &str = "imc";

/// Session-wide display thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Per-campaign session cap for campaigns that carry none.
    pub max_per_session: Option<u32>,
    /// Displays allowed across all campaigns in one session.
    pub global_max_per_session: u32,
}

impl Default for SessionLimits {
    fn default() -> Self {
        SessionLimits {
            max_per_session: None,
            global_max_per_session: EngineConfig::DEFAULT_GLOBAL_MAX_PER_SESSION,
        }
    }
}

/// Frequency-capping manager: session, daily and lifetime display caps.
pub struct InAppFCManager {
    counters: Arc<ScopedCounters>,
    impressions: Arc<ImpressionManager>,
    clock: Arc<dyn Clock>,
    calendar: Calendar,
    limits: RwLock<SessionLimits>,
}

impl InAppFCManager {
    pub(crate) fn new(
        counters: Arc<ScopedCounters>,
        impressions: Arc<ImpressionManager>,
        clock: Arc<dyn Clock>,
        calendar: Calendar,
        limits: SessionLimits,
    ) -> InAppFCManager {
        InAppFCManager {
            counters,
            impressions,
            clock,
            calendar,
            limits: RwLock::new(limits),
        }
    }

    /// Decide whether `campaign` may be displayed now.
    ///
    /// `has_frequency_limits_maxed_out` receives the campaign and its id. An error from it makes
    /// the campaign ineligible.
    pub fn can_show(
        &self,
        campaign: Option<&Campaign>,
        has_frequency_limits_maxed_out: impl FnOnce(&Campaign, &str) -> Result<bool>,
    ) -> bool {
        let Some(campaign) = campaign else {
            return false;
        };
        let Some(id) = campaign.id() else {
            return true;
        };
        let id = id.as_str();

        if campaign.exclude_from_caps() {
            return true;
        }

        match has_frequency_limits_maxed_out(campaign, id) {
            Ok(false) => {}
            Ok(true) => {
                log::trace!(target: "inapp", campaign_id = id; "frequency limits maxed out");
                return false;
            }
            Err(err) => {
                log::warn!(target: "inapp", campaign_id = id; "failed to check frequency limits: {err}");
                return false;
            }
        }

        let limits = self.limits();

        let max_per_session = campaign
            .max_per_session()
            .or(limits.max_per_session.map(i64::from));
        if let Some(max) = max_per_session {
            if self.impressions.per_session(id) as i64 >= max {
                log::trace!(target: "inapp", campaign_id = id, max; "session cap reached");
                return false;
            }
        }

        if self.impressions.per_session_total() >= limits.global_max_per_session {
            log::trace!(target: "inapp",
                        campaign_id = id,
                        max = limits.global_max_per_session;
                        "global session cap reached");
            return false;
        }

        let (today, lifetime) = self.get_display_counts(id);

        if let Some(max) = campaign.total_lifetime_count() {
            if lifetime >= max {
                log::trace!(target: "inapp", campaign_id = id, max; "lifetime cap reached");
                return false;
            }
        }

        if let Some(max) = campaign.total_daily_count() {
            if today >= max {
                log::trace!(target: "inapp", campaign_id = id, max; "daily cap reached");
                return false;
            }
        }

        true
    }

    /// Record that `campaign` was displayed.
    pub fn did_show(&self, campaign: &Campaign) {
        let Some(id) = campaign.id() else {
            return;
        };

        let day = self.calendar.local_date(self.clock.now());
        self.counters
            .update(CounterKind::DisplayCounts, &id, |value| {
                let counts = match value {
                    Some(CounterValue::DisplayCounts(counts)) if counts.day == day => counts,
                    Some(CounterValue::DisplayCounts(counts)) => {
                        log::debug!(target: "inapp", campaign_id = id.as_str(); "daily count rolled over");
                        DisplayCounts {
                            today: 0,
                            day,
                            ..counts
                        }
                    }
                    _ => DisplayCounts {
                        today: 0,
                        lifetime: 0,
                        day,
                    },
                };
                CounterValue::DisplayCounts(DisplayCounts {
                    today: counts.today + 1,
                    lifetime: counts.lifetime + 1,
                    day,
                })
            });

        self.impressions.record_impression(&id);
    }

    /// `(today, lifetime)` display counts of `campaign_id`. Counts written on an earlier local date
    /// contribute nothing to today.
    pub fn get_display_counts(&self, campaign_id: &str) -> (i64, i64) {
        match self.counters.read(CounterKind::DisplayCounts, campaign_id) {
            Some(CounterValue::DisplayCounts(counts)) => {
                let today = self.calendar.local_date(self.clock.now());
                let today_count = if counts.day == today { counts.today } else { 0 };
                (today_count, counts.lifetime)
            }
            _ => (0, 0),
        }
    }

    /// Switch every counter to `device_id`. The new identity starts from its own counters and a
    /// fresh session.
    pub fn change_user(&self, device_id: &str) {
        self.counters.set_device_id(device_id);
        self.impressions.clear_session_data();
        log::debug!(target: "inapp", device_id; "switched user");
    }

    /// Apply a server response: drop counters of stale campaigns and pick up a new global session
    /// cap. Returns the stale campaign ids.
    pub fn process_response(&self, response: &Value) -> Vec<String> {
        if let Some(max) = response
            .get(KEY_GLOBAL_MAX_PER_SESSION)
            .and_then(Value::as_u64)
            .and_then(|max| u32::try_from(max).ok())
        {
            let limits = self.limits();
            self.update_limits(limits.max_per_session, max);
        }

        let stale: Vec<String> = match response.get(KEY_STALE) {
            Some(Value::Array(ids)) => ids
                .iter()
                .filter_map(|id| match id {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        for id in &stale {
            self.counters.remove(CounterKind::DisplayCounts, id);
            self.impressions.remove_impressions(id);
        }
        if !stale.is_empty() {
            log::debug!(target: "inapp", stale:serde = stale; "removed stale campaign counters");
        }

        stale
    }

    /// Replace the session thresholds.
    pub fn update_limits(&self, max_per_session: Option<u32>, global_max_per_session: u32) {
        *self.limits.write().unwrap_or_else(|e| e.into_inner()) = SessionLimits {
            max_per_session,
            global_max_per_session,
        };
    }

    /// Current session thresholds.
    pub fn limits(&self) -> SessionLimits {
        *self.limits.read().unwrap_or_else(|e| e.into_inner())
    }
}
