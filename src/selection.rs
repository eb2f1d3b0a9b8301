use std::cmp::Ordering;

use crate::Campaign;

/// Display-timing policy applied to a priority-sorted list of eligible campaigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Show at most one campaign right away.
    Immediate,
    /// Schedule one campaign per distinct delay.
    Delayed,
}

impl SelectionStrategy {
    /// Whether selected campaigns get their TTL stamped at selection time.
    pub fn should_update_ttl(&self) -> bool {
        match self {
            SelectionStrategy::Immediate => true,
            SelectionStrategy::Delayed => false,
        }
    }

    /// Select from `sorted` campaigns. `is_suppressed` is called for each considered campaign and
    /// may record the suppression; suppressed campaigns are never selected.
    pub fn select(
        &self,
        sorted: &[Campaign],
        mut is_suppressed: impl FnMut(&Campaign) -> bool,
    ) -> Vec<Campaign> {
        match self {
            SelectionStrategy::Immediate => sorted
                .iter()
                .find(|campaign| !is_suppressed(campaign))
                .cloned()
                .into_iter()
                .collect(),
            SelectionStrategy::Delayed => {
                // (delay, selected) in order of first appearance
                let mut groups: Vec<(i64, Option<&Campaign>)> = Vec::new();
                for campaign in sorted {
                    let delay = campaign.delay_after_trigger().unwrap_or(0);
                    let index = match groups.iter().position(|(d, _)| *d == delay) {
                        Some(index) => index,
                        None => {
                            groups.push((delay, None));
                            groups.len() - 1
                        }
                    };
                    if groups[index].1.is_none() && !is_suppressed(campaign) {
                        groups[index].1 = Some(campaign);
                    }
                }
                groups
                    .into_iter()
                    .filter_map(|(_, selected)| selected.cloned())
                    .collect()
            }
        }
    }
}

/// Sort campaigns by descending priority. Campaigns without a priority come last; ties go to the
/// campaign created first. The sort is stable.
pub fn sort_by_priority(campaigns: &[Campaign], now_seconds: i64) -> Vec<Campaign> {
    let mut sorted = campaigns.to_vec();
    sorted.sort_by(|a, b| compare_priority(a, b, now_seconds));
    sorted
}

fn compare_priority(a: &Campaign, b: &Campaign, now_seconds: i64) -> Ordering {
    // `None < Some(_)`, so a missing priority sorts after every present one
    b.priority()
        .cmp(&a.priority())
        .then_with(|| a.created_at(now_seconds).cmp(&b.created_at(now_seconds)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{sort_by_priority, SelectionStrategy};
    use crate::Campaign;

    fn campaign(json: serde_json::Value) -> Campaign {
        Campaign::from_json(json).unwrap()
    }

    fn ids(campaigns: &[Campaign]) -> Vec<String> {
        campaigns.iter().filter_map(Campaign::id).collect()
    }

    #[test]
    fn sorts_by_priority_then_creation() {
        let campaigns = vec![
            campaign(json!({"ti": 300, "priority": 1})),
            campaign(json!({"ti": 100})),
            campaign(json!({"ti": 200, "priority": 5})),
            campaign(json!({"ti": 150, "priority": 1})),
        ];
        assert_eq!(ids(&sort_by_priority(&campaigns, 0)), vec!["200", "150", "300", "100"]);
        // the input is left untouched
        assert_eq!(ids(&campaigns), vec!["300", "100", "200", "150"]);
    }

    #[test]
    fn sort_is_stable_for_identical_keys() {
        let campaigns = vec![
            campaign(json!({"ti": "x", "priority": 2, "tag": 1})),
            campaign(json!({"ti": "y", "priority": 2, "tag": 2})),
        ];
        assert_eq!(ids(&sort_by_priority(&campaigns, 10)), vec!["x", "y"]);
    }

    #[test]
    fn immediate_returns_first_unsuppressed() {
        let sorted = vec![
            campaign(json!({"ti": "a", "suppressed": true})),
            campaign(json!({"ti": "b"})),
            campaign(json!({"ti": "c"})),
        ];
        let mut checked = Vec::new();
        let selected = SelectionStrategy::Immediate.select(&sorted, |c| {
            checked.extend(c.id());
            c.is_suppressed()
        });
        assert_eq!(ids(&selected), vec!["b"]);
        assert_eq!(checked, vec!["a", "b"]);
        assert!(SelectionStrategy::Immediate.should_update_ttl());
    }

    #[test]
    fn immediate_with_all_suppressed_is_empty() {
        let sorted = vec![campaign(json!({"ti": "a"}))];
        assert!(SelectionStrategy::Immediate.select(&sorted, |_| true).is_empty());
        assert!(SelectionStrategy::Immediate.select(&[], |_| false).is_empty());
    }

    #[test]
    fn delayed_picks_one_per_delay_group() {
        let sorted = vec![
            campaign(json!({"ti": "a", "delayAfterTrigger": 10})),
            campaign(json!({"ti": "b", "delayAfterTrigger": 10})),
            campaign(json!({"ti": "c", "delayAfterTrigger": 20})),
        ];
        let selected = SelectionStrategy::Delayed.select(&sorted, |_| false);
        assert_eq!(ids(&selected), vec!["a", "c"]);
        assert!(!SelectionStrategy::Delayed.should_update_ttl());
    }

    #[test]
    fn immediate_and_delayed_on_same_delayed_input() {
        let campaigns = vec![
            campaign(json!({"ti": "high", "priority": 100, "delayAfterTrigger": 10})),
            campaign(json!({"ti": "low", "priority": 1, "delayAfterTrigger": 10})),
            campaign(json!({"ti": "mid", "priority": 50, "delayAfterTrigger": 20})),
        ];
        let sorted = sort_by_priority(&campaigns, 0);
        assert_eq!(ids(&sorted), vec!["high", "mid", "low"]);

        let immediate = SelectionStrategy::Immediate.select(&sorted, |_| false);
        assert_eq!(ids(&immediate), vec!["high"]);

        let delayed = SelectionStrategy::Delayed.select(&sorted, |_| false);
        assert_eq!(ids(&delayed), vec!["high", "mid"]);
    }

    #[test]
    fn delayed_skips_suppressed_within_group() {
        let sorted = vec![
            campaign(json!({"ti": "a", "delayAfterTrigger": 20, "suppressed": true})),
            campaign(json!({"ti": "b", "delayAfterTrigger": 10, "suppressed": true})),
            campaign(json!({"ti": "c", "delayAfterTrigger": 20})),
            campaign(json!({"ti": "d"})),
            campaign(json!({"ti": "e", "delayAfterTrigger": -5})),
            campaign(json!({"ti": "f", "delayAfterTrigger": 0})),
        ];
        let selected = SelectionStrategy::Delayed.select(&sorted, Campaign::is_suppressed);
        assert_eq!(ids(&selected), vec!["c", "d", "e"]);
    }
}
