use std::sync::Arc;

use chrono::{FixedOffset, Weekday};

use crate::{
    clock::Calendar, fc_manager::SessionLimits, Clock, CounterStore, EvaluationManager,
    InMemoryCounterStore, SystemClock,
};

/// Configuration for [`EvaluationManager`].
pub struct EngineConfig {
    pub(crate) account_id: String,
    pub(crate) device_id: String,
    pub(crate) counter_store: Arc<dyn CounterStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) calendar: Calendar,
    pub(crate) session_limits: SessionLimits,
}

impl EngineConfig {
    /// Create a default configuration for the given account and device. Counters are kept in
    /// memory and time is read from the system clock.
    ///
    /// ```
    /// # use inapp_eligibility::EngineConfig;
    /// EngineConfig::new("account-id", "device-id");
    /// ```
    pub fn new(account_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        EngineConfig {
            account_id: account_id.into(),
            device_id: device_id.into(),
            counter_store: Arc::new(InMemoryCounterStore::new()),
            clock: Arc::new(SystemClock),
            calendar: Calendar::default(),
            session_limits: SessionLimits::default(),
        }
    }

    /// Set the store persisting impression, trigger and display counters.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use inapp_eligibility::{EngineConfig, InMemoryCounterStore};
    /// let mut config = EngineConfig::new("account-id", "device-id");
    /// config.counter_store(Arc::new(InMemoryCounterStore::new()));
    /// ```
    pub fn counter_store(&mut self, counter_store: Arc<dyn CounterStore>) -> &mut Self {
        self.counter_store = counter_store;
        self
    }

    /// Set the time source. Defaults to [`crate::SystemClock`].
    pub fn clock(&mut self, clock: Arc<dyn Clock>) -> &mut Self {
        self.clock = clock;
        self
    }

    /// Time zone of the user's wall clock, used for day rollover and week boundaries. Defaults to
    /// UTC.
    pub fn utc_offset(&mut self, utc_offset: FixedOffset) -> &mut Self {
        self.calendar.utc_offset = utc_offset;
        self
    }

    /// First day of the week for `weeks` limits. Defaults to Monday.
    pub fn week_start(&mut self, week_start: Weekday) -> &mut Self {
        self.calendar.week_start = week_start;
        self
    }

    /// Per-campaign session cap for campaigns that don't carry their own.
    pub fn max_per_session(&mut self, max_per_session: Option<u32>) -> &mut Self {
        self.session_limits.max_per_session = max_per_session;
        self
    }

    /// Displays allowed per session across all campaigns.
    pub const DEFAULT_GLOBAL_MAX_PER_SESSION: u32 = 1;

    /// Displays allowed per session across all campaigns. Defaults to
    /// [`EngineConfig::DEFAULT_GLOBAL_MAX_PER_SESSION`].
    pub fn global_max_per_session(&mut self, global_max_per_session: u32) -> &mut Self {
        self.session_limits.global_max_per_session = global_max_per_session;
        self
    }

    /// Create a new [`EvaluationManager`] using the specified configuration.
    ///
    /// ```
    /// # use inapp_eligibility::{EngineConfig, EvaluationManager};
    /// let engine: EvaluationManager = EngineConfig::new("account-id", "device-id").to_engine();
    /// ```
    pub fn to_engine(self) -> EvaluationManager {
        EvaluationManager::new(self)
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("account_id", &self.account_id)
            .field("device_id", &self.device_id)
            .field("utc_offset", &self.calendar.utc_offset)
            .field("week_start", &self.calendar.week_start)
            .field("session_limits", &self.session_limits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, Offset, Utc, Weekday};

    use super::EngineConfig;

    #[test]
    fn defaults() {
        let config = EngineConfig::new("acct", "device");
        assert_eq!(config.calendar.utc_offset, Utc.fix());
        assert_eq!(config.calendar.week_start, Weekday::Mon);
        assert_eq!(config.session_limits.max_per_session, None);
        assert_eq!(
            config.session_limits.global_max_per_session,
            EngineConfig::DEFAULT_GLOBAL_MAX_PER_SESSION
        );
    }

    #[test]
    fn builder_methods_chain() {
        let mut config = EngineConfig::new("acct", "device");
        config
            .utc_offset(FixedOffset::east_opt(3600).unwrap())
            .week_start(Weekday::Sun)
            .max_per_session(Some(2))
            .global_max_per_session(5);
        assert_eq!(config.calendar.week_start, Weekday::Sun);
        assert_eq!(config.session_limits.max_per_session, Some(2));
        assert_eq!(config.session_limits.global_max_per_session, 5);
    }
}
