use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    clock::Calendar,
    store::{CounterKind, CounterValue, ScopedCounters},
    Clock,
};

#[derive(Debug, Default)]
struct SessionImpressions {
    per_campaign: HashMap<String, Vec<i64>>,
    total: u32,
}

/// Records when campaigns were displayed and counts displays over time windows.
///
/// Every impression is appended to the persisted per-campaign list and to a session cache.
/// Session counts read the cache only, window counts read the persisted list.
pub struct ImpressionManager {
    counters: Arc<ScopedCounters>,
    clock: Arc<dyn Clock>,
    calendar: Calendar,
    session: Mutex<SessionImpressions>,
}

impl ImpressionManager {
    pub(crate) fn new(
        counters: Arc<ScopedCounters>,
        clock: Arc<dyn Clock>,
        calendar: Calendar,
    ) -> ImpressionManager {
        ImpressionManager {
            counters,
            clock,
            calendar,
            session: Mutex::new(SessionImpressions::default()),
        }
    }

    /// Record a display of `campaign_id` at the current time.
    pub fn record_impression(&self, campaign_id: &str) {
        let now = self.clock.now_seconds();

        {
            let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            session
                .per_campaign
                .entry(campaign_id.to_owned())
                .or_default()
                .push(now);
            session.total += 1;
        }

        self.counters
            .update(CounterKind::Impressions, campaign_id, |value| {
                let mut timestamps = match value {
                    Some(CounterValue::Timestamps(timestamps)) => timestamps,
                    _ => Vec::new(),
                };
                timestamps.push(now);
                CounterValue::Timestamps(timestamps)
            });

        log::trace!(target: "inapp", campaign_id, timestamp = now; "recorded impression");
    }

    /// Impressions of `campaign_id` in the current session.
    pub fn per_session(&self, campaign_id: &str) -> usize {
        let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        session.per_campaign.get(campaign_id).map_or(0, Vec::len)
    }

    /// Impressions of all campaigns in the current session.
    pub fn per_session_total(&self) -> u32 {
        self.session.lock().unwrap_or_else(|e| e.into_inner()).total
    }

    /// Impressions of `campaign_id` in the last `seconds`.
    pub fn per_second(&self, campaign_id: &str, seconds: i64) -> usize {
        self.within(campaign_id, seconds)
    }

    #[allow(missing_docs)]
    pub fn per_minute(&self, campaign_id: &str, minutes: i64) -> usize {
        self.within(campaign_id, minutes.saturating_mul(60))
    }

    #[allow(missing_docs)]
    pub fn per_hour(&self, campaign_id: &str, hours: i64) -> usize {
        self.within(campaign_id, hours.saturating_mul(3600))
    }

    #[allow(missing_docs)]
    pub fn per_day(&self, campaign_id: &str, days: i64) -> usize {
        self.within(campaign_id, days.saturating_mul(86_400))
    }

    /// Impressions since the start of the current local week, extended back by `weeks - 1` whole
    /// weeks.
    pub fn per_week(&self, campaign_id: &str, weeks: i64) -> usize {
        let start_of_week = self.calendar.start_of_week(self.clock.now());
        let extra = (weeks.max(1) - 1).saturating_mul(7 * 86_400);
        self.since(campaign_id, start_of_week.saturating_sub(extra))
    }

    /// Persisted impression timestamps of `campaign_id`, oldest first.
    pub fn get_impressions(&self, campaign_id: &str) -> Vec<i64> {
        match self.counters.read(CounterKind::Impressions, campaign_id) {
            Some(CounterValue::Timestamps(timestamps)) => timestamps,
            _ => Vec::new(),
        }
    }

    /// Count persisted impressions in the last `seconds`. Windows reaching past the representable
    /// range count the whole history.
    fn within(&self, campaign_id: &str, seconds: i64) -> usize {
        let cutoff = self.clock.now_seconds().saturating_sub(seconds);
        self.since(campaign_id, cutoff)
    }

    /// Count persisted impressions at or after `cutoff`.
    fn since(&self, campaign_id: &str, cutoff: i64) -> usize {
        self.get_impressions(campaign_id)
            .iter()
            .rev()
            .take_while(|timestamp| **timestamp >= cutoff)
            .count()
    }

    /// Forget the session cache. Persisted impressions are kept.
    pub fn clear_session_data(&self) {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        *session = SessionImpressions::default();
        log::debug!(target: "inapp", "cleared impression session data");
    }

    /// Drop both the persisted and the session impressions of `campaign_id`.
    pub fn remove_impressions(&self, campaign_id: &str) {
        self.counters.remove(CounterKind::Impressions, campaign_id);
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        session.per_campaign.remove(campaign_id);
    }
}
