use std::{collections::BTreeMap, sync::Arc};

use chrono::Duration;
use serde_json::json;

use inapp_eligibility::{
    properties_from_json, Campaign, EngineConfig, EvaluationManager, EventAdapter,
    JsonFileCounterStore, ManualClock,
};

const START: i64 = 1_700_000_000;

fn engine(clock: Arc<ManualClock>) -> EvaluationManager {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut config = EngineConfig::new("acct", "device");
    config.clock(clock).global_max_per_session(100);
    config.to_engine()
}

fn campaigns(json: serde_json::Value) -> Vec<Campaign> {
    serde_json::from_value(json).unwrap()
}

fn ids(campaigns: &[Campaign]) -> Vec<String> {
    campaigns.iter().filter_map(Campaign::id).collect()
}

#[test]
fn selects_by_priority_then_creation_time() {
    let engine = engine(Arc::new(ManualClock::from_seconds(START)));
    let candidates = campaigns(json!([
        {"ti": 1_600_000_003, "priority": 1, "whenTriggers": [{"eventName": "Open"}]},
        {"ti": 1_600_000_001, "whenTriggers": [{"eventName": "Open"}]},
        {"ti": 1_600_000_002, "priority": 1, "whenTriggers": [{"eventName": "Open"}]},
    ]));

    let event = EventAdapter::new("Open", BTreeMap::new());
    assert_eq!(ids(&engine.evaluate(&event, &candidates)), vec!["1600000002"]);
}

#[test]
fn delayed_campaigns_one_per_delay() {
    let engine = engine(Arc::new(ManualClock::from_seconds(START)));
    let candidates = campaigns(json!([
        {"ti": "a", "delayAfterTrigger": 10, "priority": 1, "whenTriggers": [{"eventName": "Open"}]},
        {"ti": "b", "delayAfterTrigger": 10, "priority": 2, "whenTriggers": [{"eventName": "Open"}]},
        {"ti": "c", "delayAfterTrigger": 20, "whenTriggers": [{"eventName": "Open"}]},
    ]));

    let event = EventAdapter::new("Open", BTreeMap::new());
    assert_eq!(ids(&engine.evaluate(&event, &candidates)), vec!["b", "c"]);
}

#[test]
fn property_conditions_from_wire_format() {
    let engine = engine(Arc::new(ManualClock::from_seconds(START)));
    engine.campaigns().set_client_side(campaigns(json!([{
        "ti": "big-spender",
        "whenTriggers": [{
            "eventName": "Checkout",
            "eventProperties": [
                {"propertyName": "Cart Value", "operator": 2, "propertyValue": 100},
                {"propertyName": "coupon", "operator": 27},
                {"propertyName": "city", "operator": 3, "propertyValue": ["york", "london"]}
            ]
        }]
    }])));

    let properties = |json: serde_json::Value| properties_from_json(json.as_object().unwrap());

    let selected = engine.evaluate_on_event(
        "Checkout",
        properties(json!({"cartvalue": "150", "city": "New York"})),
        None,
    );
    assert_eq!(ids(&selected), vec!["big-spender"]);

    let with_coupon = engine.evaluate_on_event(
        "Checkout",
        properties(json!({"cartvalue": 150, "city": "New York", "coupon": "SPRING"})),
        None,
    );
    assert!(with_coupon.is_empty());

    let too_small = engine.evaluate_on_event(
        "Checkout",
        properties(json!({"Cart Value": 50, "city": "London"})),
        None,
    );
    assert!(too_small.is_empty());
}

#[test]
fn when_limits_on_every_second_trigger() {
    let engine = engine(Arc::new(ManualClock::from_seconds(START)));
    engine.campaigns().set_client_side(campaigns(json!([{
        "ti": "every-other",
        "whenTriggers": [{"eventName": "Open"}],
        "whenLimits": [{"type": "onEvery", "limit": 2}]
    }])));

    let results: Vec<usize> = (0..4)
        .map(|_| engine.evaluate_on_event("Open", BTreeMap::new(), None).len())
        .collect();
    assert_eq!(results, vec![0, 1, 0, 1]);
}

#[test]
fn daily_cap_rolls_over_but_lifetime_does_not() {
    let clock = Arc::new(ManualClock::from_seconds(START));
    let engine = engine(clock.clone());
    let campaign = campaigns(json!([{
        "ti": "capped",
        "tdc": 1,
        "tlc": 2,
        "whenTriggers": [{"eventName": "Open"}]
    }]));
    engine.campaigns().set_client_side(campaign.clone());

    let shown = engine.evaluate_on_event("Open", BTreeMap::new(), None);
    assert_eq!(ids(&shown), vec!["capped"]);
    engine.did_show(&shown[0]);
    assert!(engine.evaluate_on_event("Open", BTreeMap::new(), None).is_empty());

    clock.advance(Duration::days(1));
    let shown = engine.evaluate_on_event("Open", BTreeMap::new(), None);
    assert_eq!(ids(&shown), vec!["capped"]);
    engine.did_show(&shown[0]);
    assert_eq!(engine.fc_manager().get_display_counts("capped"), (1, 2));

    clock.advance(Duration::days(1));
    assert!(engine.evaluate_on_event("Open", BTreeMap::new(), None).is_empty());
}

#[test]
fn broken_campaign_does_not_block_others() {
    let engine = engine(Arc::new(ManualClock::from_seconds(START)));
    engine.campaigns().set_client_side(campaigns(json!([
        {"ti": "broken", "priority": 10, "whenLimits": 5, "whenTriggers": [{"eventName": "Open"}]},
        {"ti": "odd-trigger", "priority": 9, "whenTriggers": ["Open", {"eventName": "Open"}]},
        {"ti": "fine", "priority": 1, "whenTriggers": [{"eventName": "Open"}]},
    ])));

    let selected = engine.evaluate_on_event("Open", BTreeMap::new(), None);
    assert_eq!(ids(&selected), vec!["odd-trigger"]);
}

#[test]
fn counters_persist_across_engines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counters.json");
    let clock = Arc::new(ManualClock::from_seconds(START));
    let campaign = campaigns(json!([{
        "ti": "once",
        "whenTriggers": [{"eventName": "Open"}],
        "whenLimits": [{"type": "ever", "limit": 1}]
    }]));

    let build = || {
        let mut config = EngineConfig::new("acct", "device");
        config
            .clock(clock.clone())
            .counter_store(Arc::new(JsonFileCounterStore::open(&path).unwrap()))
            .global_max_per_session(100);
        let engine = config.to_engine();
        engine.campaigns().set_client_side(campaign.clone());
        engine
    };

    {
        let engine = build();
        let shown = engine.evaluate_on_event("Open", BTreeMap::new(), None);
        engine.did_show(&shown[0]);
    }

    let engine = build();
    assert!(engine.evaluate_on_event("Open", BTreeMap::new(), None).is_empty());
    assert_eq!(engine.triggers().get_triggers("once"), 2);
}
