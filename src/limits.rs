use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{ImpressionManager, TriggerManager};

/// Kind of a when-limit or frequency-limit clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum LimitType {
    Session,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Ever,
    OnEvery,
    OnExactly,
}

/// One limit clause of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitAdapter {
    /// What is counted, and over which window.
    #[serde(rename = "type")]
    pub limit_type: LimitType,
    /// Threshold. For `onEvery` and `onExactly` this is the trigger ordinal.
    pub limit: i64,
    /// Window multiplier for the time-based types, e.g. `3` hours. Values below 1 count as 1.
    #[serde(default = "default_frequency")]
    pub frequency: i64,
}

fn default_frequency() -> i64 {
    1
}

impl LimitAdapter {
    /// A clause with a window multiplier of 1.
    pub fn new(limit_type: LimitType, limit: i64) -> LimitAdapter {
        LimitAdapter {
            limit_type,
            limit,
            frequency: default_frequency(),
        }
    }

    /// Set the window multiplier.
    pub fn with_frequency(mut self, frequency: i64) -> LimitAdapter {
        self.frequency = frequency;
        self
    }

    /// Decode a stored limit clause. Returns `None` for unknown types or a missing `limit`.
    pub fn from_json(json: &serde_json::Value) -> Option<LimitAdapter> {
        serde_json::from_value(json.clone()).ok()
    }

    fn window(&self) -> i64 {
        self.frequency.max(1)
    }
}

/// Evaluates limit clauses against the impression and trigger counters.
pub struct LimitsMatcher {
    impressions: Arc<ImpressionManager>,
    triggers: Arc<TriggerManager>,
}

impl LimitsMatcher {
    #[allow(missing_docs)]
    pub fn new(impressions: Arc<ImpressionManager>, triggers: Arc<TriggerManager>) -> LimitsMatcher {
        LimitsMatcher {
            impressions,
            triggers,
        }
    }

    /// Return `true` if every clause is satisfied. No clauses are always satisfied.
    pub fn match_when_limits(&self, limits: &[LimitAdapter], campaign_id: &str) -> bool {
        limits
            .iter()
            .all(|limit| self.match_limit(limit, campaign_id))
    }

    fn match_limit(&self, limit: &LimitAdapter, campaign_id: &str) -> bool {
        let impressions = &self.impressions;
        let below = |count: usize| (count as i64) < limit.limit;

        let satisfied = match limit.limit_type {
            LimitType::Session => below(impressions.per_session(campaign_id)),
            LimitType::Seconds => below(impressions.per_second(campaign_id, limit.window())),
            LimitType::Minutes => below(impressions.per_minute(campaign_id, limit.window())),
            LimitType::Hours => below(impressions.per_hour(campaign_id, limit.window())),
            LimitType::Days => below(impressions.per_day(campaign_id, limit.window())),
            LimitType::Weeks => below(impressions.per_week(campaign_id, limit.window())),
            LimitType::Ever => below(impressions.get_impressions(campaign_id).len()),
            LimitType::OnEvery => {
                limit.limit > 0 && self.triggers.get_triggers(campaign_id) % limit.limit == 0
            }
            LimitType::OnExactly => self.triggers.get_triggers(campaign_id) <= limit.limit,
        };

        if !satisfied {
            log::trace!(target: "inapp",
                        campaign_id,
                        limit:serde = limit;
                        "limit not satisfied");
        }
        satisfied
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use serde_json::json;

    use super::{LimitAdapter, LimitType, LimitsMatcher};
    use crate::{
        clock::Calendar, store::ScopedCounters, ImpressionManager, InMemoryCounterStore,
        ManualClock, TriggerManager,
    };

    struct Fixture {
        clock: Arc<ManualClock>,
        impressions: Arc<ImpressionManager>,
        triggers: Arc<TriggerManager>,
        matcher: LimitsMatcher,
    }

    fn fixture() -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();

        let clock = Arc::new(ManualClock::from_seconds(1_700_000_000));
        let counters = Arc::new(ScopedCounters::new(
            Arc::new(InMemoryCounterStore::new()),
            "acct",
            "device",
        ));
        let impressions = Arc::new(ImpressionManager::new(
            counters.clone(),
            clock.clone(),
            Calendar::default(),
        ));
        let triggers = Arc::new(TriggerManager::new(counters));
        let matcher = LimitsMatcher::new(impressions.clone(), triggers.clone());
        Fixture {
            clock,
            impressions,
            triggers,
            matcher,
        }
    }

    #[test]
    fn decodes_limits() {
        assert_eq!(
            LimitAdapter::from_json(&json!({"type": "hours", "limit": 2, "frequency": 3})),
            Some(LimitAdapter::new(LimitType::Hours, 2).with_frequency(3))
        );
        assert_eq!(
            LimitAdapter::from_json(&json!({"type": "onEvery", "limit": 2})),
            Some(LimitAdapter::new(LimitType::OnEvery, 2))
        );
        assert_eq!(LimitAdapter::from_json(&json!({"type": "fortnights", "limit": 2})), None);
        assert_eq!(LimitAdapter::from_json(&json!({"type": "ever"})), None);
    }

    #[test]
    fn empty_limits_are_satisfied() {
        let f = fixture();
        assert!(f.matcher.match_when_limits(&[], "a"));
    }

    #[test]
    fn session_limit() {
        let f = fixture();
        let limits = [LimitAdapter::new(LimitType::Session, 2)];
        assert!(f.matcher.match_when_limits(&limits, "a"));
        f.impressions.record_impression("a");
        assert!(f.matcher.match_when_limits(&limits, "a"));
        f.impressions.record_impression("a");
        assert!(!f.matcher.match_when_limits(&limits, "a"));
        f.impressions.clear_session_data();
        assert!(f.matcher.match_when_limits(&limits, "a"));
    }

    #[test]
    fn time_window_limit_uses_frequency() {
        let f = fixture();
        let limits = [LimitAdapter::new(LimitType::Hours, 1).with_frequency(2)];
        f.impressions.record_impression("a");
        assert!(!f.matcher.match_when_limits(&limits, "a"));

        f.clock.advance(Duration::minutes(90));
        assert!(!f.matcher.match_when_limits(&limits, "a"));

        f.clock.advance(Duration::minutes(31));
        assert!(f.matcher.match_when_limits(&limits, "a"));
    }

    #[test]
    fn frequency_below_one_is_one() {
        let f = fixture();
        let limits = [LimitAdapter::new(LimitType::Minutes, 1).with_frequency(0)];
        f.impressions.record_impression("a");
        assert!(!f.matcher.match_when_limits(&limits, "a"));
        f.clock.advance(Duration::seconds(61));
        assert!(f.matcher.match_when_limits(&limits, "a"));
    }

    #[test]
    fn huge_frequency_spans_whole_history() {
        let f = fixture();
        let limits: Vec<LimitAdapter> = ["minutes", "hours", "days", "weeks"]
            .into_iter()
            .filter_map(|kind| {
                LimitAdapter::from_json(&json!({"type": kind, "limit": 1, "frequency": i64::MAX}))
            })
            .collect();
        assert_eq!(limits.len(), 4);

        assert!(f.matcher.match_when_limits(&limits, "a"));
        f.impressions.record_impression("a");
        f.clock.advance(Duration::days(3650));
        for limit in &limits {
            assert!(!f.matcher.match_when_limits(std::slice::from_ref(limit), "a"));
        }
    }

    #[test]
    fn ever_limit() {
        let f = fixture();
        let limits = [LimitAdapter::new(LimitType::Ever, 1)];
        assert!(f.matcher.match_when_limits(&limits, "a"));
        f.impressions.record_impression("a");
        f.impressions.clear_session_data();
        f.clock.advance(Duration::days(400));
        assert!(!f.matcher.match_when_limits(&limits, "a"));
    }

    #[test]
    fn on_every_nth_trigger() {
        let f = fixture();
        let limits = [LimitAdapter::new(LimitType::OnEvery, 2)];
        let results: Vec<bool> = (0..5)
            .map(|_| {
                f.triggers.increment("a");
                f.matcher.match_when_limits(&limits, "a")
            })
            .collect();
        assert_eq!(results, vec![false, true, false, true, false]);

        let never = [LimitAdapter::new(LimitType::OnEvery, 0)];
        assert!(!f.matcher.match_when_limits(&never, "a"));
    }

    #[test]
    fn on_exactly_nth_trigger() {
        let f = fixture();
        let limits = [LimitAdapter::new(LimitType::OnExactly, 2)];
        let results: Vec<bool> = (0..3)
            .map(|_| {
                f.triggers.increment("a");
                f.matcher.match_when_limits(&limits, "a")
            })
            .collect();
        assert_eq!(results, vec![true, true, false]);
    }

    #[test]
    fn all_clauses_must_hold() {
        let f = fixture();
        let limits = [
            LimitAdapter::new(LimitType::OnExactly, 5),
            LimitAdapter::new(LimitType::Ever, 1),
        ];
        f.triggers.increment("a");
        assert!(f.matcher.match_when_limits(&limits, "a"));
        f.impressions.record_impression("a");
        assert!(!f.matcher.match_when_limits(&limits, "a"));
    }
}
