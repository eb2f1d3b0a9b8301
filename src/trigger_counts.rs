use std::sync::Arc;

use crate::store::{CounterKind, CounterValue, ScopedCounters};

/// Persisted per-campaign count of matching events.
pub struct TriggerManager {
    counters: Arc<ScopedCounters>,
}

impl TriggerManager {
    pub(crate) fn new(counters: Arc<ScopedCounters>) -> TriggerManager {
        TriggerManager { counters }
    }

    /// Record one more matching event for `campaign_id`, returning the new count.
    pub fn increment(&self, campaign_id: &str) -> i64 {
        let value = self
            .counters
            .update(CounterKind::Triggers, campaign_id, |value| {
                CounterValue::Count(count_of(value.as_ref()) + 1)
            });
        count_of(Some(&value))
    }

    /// Matching events recorded so far. An unreadable counter is zero.
    pub fn get_triggers(&self, campaign_id: &str) -> i64 {
        count_of(self.counters.read(CounterKind::Triggers, campaign_id).as_ref())
    }

    /// Forget the trigger count of `campaign_id`.
    pub fn remove_triggers(&self, campaign_id: &str) {
        self.counters.remove(CounterKind::Triggers, campaign_id);
    }
}

fn count_of(value: Option<&CounterValue>) -> i64 {
    match value {
        Some(CounterValue::Count(count)) => (*count).max(0),
        _ => 0,
    }
}
