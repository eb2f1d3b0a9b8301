use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex},
};

use crate::{
    campaign::SuppressedCampaign,
    event::{EventProperties, Location},
    matcher::TriggersMatcher,
    selection::sort_by_priority,
    store::ScopedCounters,
    Campaign, CampaignStore, Clock, EngineConfig, EventAdapter, ImpressionManager, InAppFCManager,
    LimitsMatcher, Result, SelectionStrategy, TriggerManager, TriggerValue,
};

/// The eligibility engine.
///
/// For every event produced by the host application the engine matches the stored campaigns'
/// triggers, records trigger occurrences, checks when-limits and frequency caps, and selects which
/// campaigns to display.
///
/// In order to create an engine instance, first create [`EngineConfig`].
///
/// # Examples
/// ```
/// # use inapp_eligibility::{EngineConfig, EvaluationManager};
/// EvaluationManager::new(EngineConfig::new("account-id", "device-id"));
/// ```
pub struct EvaluationManager {
    clock: Arc<dyn Clock>,
    campaigns: Arc<CampaignStore>,
    impressions: Arc<ImpressionManager>,
    triggers: Arc<TriggerManager>,
    limits_matcher: LimitsMatcher,
    fc_manager: InAppFCManager,
    triggers_matcher: TriggersMatcher,
    suppressed: Mutex<Vec<SuppressedCampaign>>,
    evaluated_server_side_ids: Mutex<Vec<String>>,
}

impl EvaluationManager {
    /// Create a new `EvaluationManager` using the specified configuration.
    pub fn new(config: EngineConfig) -> Self {
        let counters = Arc::new(ScopedCounters::new(
            config.counter_store,
            config.account_id,
            config.device_id,
        ));
        let impressions = Arc::new(ImpressionManager::new(
            counters.clone(),
            config.clock.clone(),
            config.calendar,
        ));
        let triggers = Arc::new(TriggerManager::new(counters.clone()));
        let fc_manager = InAppFCManager::new(
            counters,
            impressions.clone(),
            config.clock.clone(),
            config.calendar,
            config.session_limits,
        );

        EvaluationManager {
            clock: config.clock,
            campaigns: Arc::new(CampaignStore::new()),
            limits_matcher: LimitsMatcher::new(impressions.clone(), triggers.clone()),
            impressions,
            triggers,
            fc_manager,
            triggers_matcher: TriggersMatcher,
            suppressed: Mutex::new(Vec::new()),
            evaluated_server_side_ids: Mutex::new(Vec::new()),
        }
    }

    /// Evaluate stored campaigns against a custom event.
    pub fn evaluate_on_event(
        &self,
        event_name: &str,
        properties: EventProperties,
        user_location: Option<Location>,
    ) -> Vec<Campaign> {
        let event = EventAdapter::new(event_name, properties).with_location(user_location);
        self.evaluate_stored(&event)
    }

    /// Evaluate stored campaigns against a charged (purchase) event.
    pub fn evaluate_on_charged_event(
        &self,
        details: EventProperties,
        items: Vec<EventProperties>,
        user_location: Option<Location>,
    ) -> Vec<Campaign> {
        let event = EventAdapter::charged(details, items).with_location(user_location);
        self.evaluate_stored(&event)
    }

    /// Evaluate stored campaigns against the app launch.
    pub fn evaluate_on_app_launched_client_side(
        &self,
        properties: EventProperties,
        user_location: Option<Location>,
    ) -> Vec<Campaign> {
        let event = EventAdapter::app_launched(properties).with_location(user_location);
        self.evaluate_stored(&event)
    }

    /// Evaluate campaigns delivered by the server together with the app launch.
    pub fn evaluate_on_app_launched_server_side(
        &self,
        candidates: &[Campaign],
        properties: EventProperties,
        user_location: Option<Location>,
    ) -> Vec<Campaign> {
        let event = EventAdapter::app_launched(properties).with_location(user_location);
        self.evaluate(&event, candidates)
    }

    /// Evaluate stored campaigns against a batch of profile attribute changes, given as
    /// `attribute -> (new value, old value)`.
    ///
    /// Each change is evaluated as its own event. A campaign eligible for several changes is
    /// selected from once.
    pub fn evaluate_on_user_attribute_change(
        &self,
        changes: BTreeMap<String, (TriggerValue, TriggerValue)>,
        user_location: Option<Location>,
    ) -> Vec<Campaign> {
        let candidates = self.campaigns.client_side();
        let mut seen = HashSet::new();
        let mut eligible = Vec::new();

        for (attribute, (new_value, old_value)) in changes {
            let event = EventAdapter::for_profile_change(attribute, new_value, old_value)
                .with_location(user_location);
            self.evaluate_server_side_metadata(&event);

            for campaign in self.eligible(&event, &candidates) {
                let first = campaign.id().map_or(true, |id| seen.insert(id));
                if first {
                    eligible.push(campaign);
                }
            }
        }

        self.select(&eligible)
    }

    /// Filter `candidates` down to the eligible ones and select what to display.
    ///
    /// The input is not modified; selected campaigns are returned as copies.
    pub fn evaluate(&self, event: &EventAdapter, candidates: &[Campaign]) -> Vec<Campaign> {
        let eligible = self.eligible(event, candidates);
        self.select(&eligible)
    }

    /// Sort eligible campaigns by priority and apply the selection strategies: immediate
    /// campaigns first, then one campaign per delay.
    pub fn select(&self, eligible: &[Campaign]) -> Vec<Campaign> {
        let now = self.clock.now_seconds();
        let (delayed, immediate): (Vec<Campaign>, Vec<Campaign>) = sort_by_priority(eligible, now)
            .into_iter()
            .partition(|campaign| campaign.delay_after_trigger().is_some_and(|delay| delay > 0));

        let mut selected = Vec::new();
        for (strategy, campaigns) in [
            (SelectionStrategy::Immediate, immediate),
            (SelectionStrategy::Delayed, delayed),
        ] {
            for mut campaign in strategy.select(&campaigns, |c| self.suppression_handler(c)) {
                if strategy.should_update_ttl() {
                    campaign.update_ttl(now);
                } else {
                    campaign.remove_ttl();
                }
                selected.push(campaign);
            }
        }

        log::trace!(target: "inapp",
                    eligible = eligible.len(),
                    selected:serde = selected.iter().map(Campaign::id).collect::<Vec<_>>();
                    "selected campaigns");
        selected
    }

    /// Check the campaign's frequency limits. Returns `true` if the campaign may be displayed.
    pub fn match_when_limits_before_display(&self, campaign: &Campaign) -> Result<bool> {
        let Some(id) = campaign.id() else {
            return Ok(true);
        };
        let limits = campaign.frequency_limits()?;
        Ok(self.limits_matcher.match_when_limits(&limits, &id))
    }

    /// Record that `campaign` was displayed.
    pub fn did_show(&self, campaign: &Campaign) {
        self.fc_manager.did_show(campaign);
    }

    /// End the current session. Session caps start over; persisted counters are kept.
    pub fn on_session_end(&self) {
        self.impressions.clear_session_data();
        log::debug!(target: "inapp", "session ended");
    }

    /// Switch to another device identity. Counters of the previous identity are kept in the store
    /// but no longer consulted.
    pub fn change_user(&self, device_id: &str) {
        self.fc_manager.change_user(device_id);
        self.clear_suppressed_campaigns();
        self.clear_evaluated_server_side_ids();
    }

    /// Apply a server response, dropping every counter and stored copy of stale campaigns.
    /// Returns the stale campaign ids.
    pub fn process_response(&self, response: &serde_json::Value) -> Vec<String> {
        let stale = self.fc_manager.process_response(response);
        for id in &stale {
            self.triggers.remove_triggers(id);
        }
        self.campaigns.remove(&stale);
        stale
    }

    /// Campaigns withheld by suppression since the last clear.
    pub fn suppressed_campaigns(&self) -> Vec<SuppressedCampaign> {
        self.suppressed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Forget recorded suppressions, typically once they were reported.
    pub fn clear_suppressed_campaigns(&self) {
        self.suppressed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Ids of server-side campaigns that qualified since the last clear, to be sent with the next
    /// server request.
    pub fn evaluated_server_side_ids(&self) -> Vec<String> {
        self.evaluated_server_side_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Forget the qualified server-side ids, typically once they were sent.
    pub fn clear_evaluated_server_side_ids(&self) {
        self.evaluated_server_side_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Stored candidate campaigns.
    pub fn campaigns(&self) -> &Arc<CampaignStore> {
        &self.campaigns
    }

    #[allow(missing_docs)]
    pub fn impressions(&self) -> &ImpressionManager {
        &self.impressions
    }

    #[allow(missing_docs)]
    pub fn triggers(&self) -> &TriggerManager {
        &self.triggers
    }

    #[allow(missing_docs)]
    pub fn limits_matcher(&self) -> &LimitsMatcher {
        &self.limits_matcher
    }

    #[allow(missing_docs)]
    pub fn fc_manager(&self) -> &InAppFCManager {
        &self.fc_manager
    }

    fn evaluate_stored(&self, event: &EventAdapter) -> Vec<Campaign> {
        self.evaluate_server_side_metadata(event);
        let candidates = self.campaigns.client_side();
        self.evaluate(event, &candidates)
    }

    /// Match server-side campaign metadata. Qualifying ids are collected instead of being
    /// selected.
    fn evaluate_server_side_metadata(&self, event: &EventAdapter) {
        let metadata = self.campaigns.server_side();
        for campaign in metadata.iter() {
            let Some(id) = campaign.id() else {
                continue;
            };
            if !self.matches_trigger_and_when_limits(event, campaign) {
                continue;
            }

            let mut ids = self
                .evaluated_server_side_ids
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    /// Campaigns among `candidates` whose triggers match `event` and that pass when-limits and
    /// frequency caps, in input order.
    fn eligible(&self, event: &EventAdapter, candidates: &[Campaign]) -> Vec<Campaign> {
        candidates
            .iter()
            .filter(|&campaign| {
                self.matches_trigger_and_when_limits(event, campaign)
                    && self.fc_manager.can_show(Some(campaign), |campaign, _id| {
                        self.match_when_limits_before_display(campaign)
                            .map(|allowed| !allowed)
                    })
            })
            .cloned()
            .collect()
    }

    /// Match triggers, record the trigger occurrence, then check when-limits. A campaign whose
    /// limits cannot be evaluated is not eligible.
    fn matches_trigger_and_when_limits(&self, event: &EventAdapter, campaign: &Campaign) -> bool {
        if !self
            .triggers_matcher
            .match_event(&campaign.when_triggers(), event)
        {
            return false;
        }

        let Some(id) = campaign.id() else {
            return true;
        };
        self.triggers.increment(&id);

        match campaign.when_limits() {
            Ok(limits) => {
                let matched = self.limits_matcher.match_when_limits(&limits, &id);
                log::trace!(target: "inapp",
                            campaign_id = id.as_str(),
                            event = event.event_name(),
                            matched;
                            "trigger matched");
                matched
            }
            Err(err) => {
                log::warn!(target: "inapp", campaign_id = id.as_str(); "failed to check when limits: {err}");
                false
            }
        }
    }

    /// Return `true` if the campaign is suppressed, recording its reporting ids.
    fn suppression_handler(&self, campaign: &Campaign) -> bool {
        if !campaign.is_suppressed() {
            return false;
        }

        let record = campaign.suppression_record();
        log::trace!(target: "inapp", record:serde; "campaign suppressed");
        self.suppressed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
        true
    }
}
