//! Eligibility engine for in-app marketing campaigns.
//!
//! # Overview
//!
//! The engine revolves around an [`EvaluationManager`] that decides, for every event produced by
//! the host application, which pending campaigns may be shown right now. A [`Campaign`] is an
//! opaque JSON payload carrying trigger definitions ([`TriggerAdapter`]), when-limits and
//! frequency limits ([`LimitAdapter`]), display caps and a priority.
//!
//! Evaluating an event:
//! 1. matches the campaign triggers against the event ([`TriggerValue`] comparisons with a
//!    [`TriggerOperator`]);
//! 2. records a trigger occurrence for every matched campaign ([`TriggerManager`]);
//! 3. checks when-limits against impression and trigger counters ([`LimitsMatcher`]);
//! 4. checks session, daily and lifetime caps ([`InAppFCManager`]);
//! 5. sorts the eligible campaigns by priority and applies a [`SelectionStrategy`].
//!
//! Counters are kept in a [`CounterStore`] scoped to the current account and device. Time is read
//! from a [`Clock`], which can be replaced by a [`ManualClock`] in tests.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Evaluation never fails as a whole. A campaign whose limits cannot be evaluated is treated as
//! not eligible and the error is logged, so that a single malformed campaign never over-shows or
//! blocks the remaining candidates. Comparisons between mismatched types are simply `false`.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `inapp` target. Consider integrating a `log`-compatible logger implementation for better
//! visibility into evaluation decisions: per-campaign decisions are logged at `trace` level.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod campaign;
mod campaign_store;
mod clock;
mod config;
mod error;
mod evaluation;
mod event;
mod fc_manager;
mod impressions;
mod limits;
mod matcher;
mod selection;
mod store;
mod trigger;
mod trigger_counts;
mod value;

pub use campaign::{Campaign, SuppressedCampaign, TryParse};
pub use campaign_store::CampaignStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use evaluation::EvaluationManager;
pub use event::{
    properties_from_json, EventAdapter, EventProperties, Location, APP_LAUNCHED_EVENT,
    CHARGED_EVENT, PROFILE_NEW_VALUE, PROFILE_OLD_VALUE,
};
pub use fc_manager::{InAppFCManager, SessionLimits};
pub use impressions::ImpressionManager;
pub use limits::{LimitAdapter, LimitType, LimitsMatcher};
pub use matcher::TriggersMatcher;
pub use selection::{sort_by_priority, SelectionStrategy};
pub use store::{CounterStore, CounterValue, DisplayCounts, InMemoryCounterStore, JsonFileCounterStore};
pub use trigger::{GeoRadius, TriggerAdapter, TriggerCondition, TriggerOperator};
pub use trigger_counts::TriggerManager;
pub use value::{Scalar, TriggerValue};
