//! Differences between two consecutive record sets.

use std::collections::HashMap;

use serde::Serialize;

use crate::NodeRecord;

/// Per-node difference between the current and the previous cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChangeEntry {
    /// Win counter difference.
    pub win_delta: i64,

    /// Reward score difference.
    pub reward_delta: i64,

    /// Whether the online flag differs between cycles.
    pub online_flag_changed: bool,

    /// Transaction age difference, in minutes.
    ///
    /// [`None`] unless both cycles observed a transaction age.
    pub tx_age_delta: Option<i64>,
}

impl ChangeEntry {
    /// Check if this entry carries changes worth reporting.
    ///
    /// Transaction age changes on every cycle and is not considered significant.
    pub fn is_significant(&self) -> bool {
        self.win_delta != 0 || self.reward_delta != 0 || self.online_flag_changed
    }
}

/// Change entries keyed by node identifier.
///
/// Nodes that are absent from either cycle have no entry.
pub type Changes = HashMap<String, ChangeEntry>;

/// Compute change entries for every node present in both record sets.
pub fn calculate(current: &[NodeRecord], previous: Option<&[NodeRecord]>) -> Changes {
    let Some(previous) = previous else {
        return Changes::new();
    };

    let previous: HashMap<_, _> = previous
        .iter()
        .map(|record| (record.id.as_str(), record))
        .collect();

    current
        .iter()
        .filter_map(|current| {
            let previous = previous.get(current.id.as_str())?;

            let tx_age_delta = current
                .last_tx_age_minutes
                .zip(previous.last_tx_age_minutes)
                .map(|(current, previous)| current as i64 - previous as i64);

            Some((
                current.id.clone(),
                ChangeEntry {
                    win_delta: current.win_count - previous.win_count,
                    reward_delta: current.reward_score - previous.reward_score,
                    online_flag_changed: current.online != previous.online,
                    tx_age_delta,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::record::tests::record;

    use super::{calculate, ChangeEntry};

    #[test]
    fn no_previous() {
        assert!(calculate(&[record("a")], None).is_empty());
    }

    #[test]
    fn identical_sets() {
        let records = vec![
            crate::NodeRecord {
                win_count: 4,
                reward_score: 9,
                last_tx_age_minutes: Some(3),
                ..record("a")
            },
            record("b"),
        ];

        let changes = calculate(&records, Some(records.as_slice()));

        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes["a"],
            ChangeEntry {
                tx_age_delta: Some(0),
                ..Default::default()
            }
        );
        assert_eq!(changes["b"], ChangeEntry::default());
        assert!(changes.values().all(|change| !change.is_significant()));
    }

    #[test]
    fn deltas() {
        let previous = vec![crate::NodeRecord {
            win_count: 10,
            reward_score: 100,
            online: true,
            last_tx_age_minutes: Some(40),
            ..record("a")
        }];
        let current = vec![crate::NodeRecord {
            win_count: 12,
            reward_score: 95,
            online: false,
            last_tx_age_minutes: Some(5),
            ..record("a")
        }];

        let change = calculate(&current, Some(previous.as_slice()))["a"];

        assert_eq!(change.win_delta, 2);
        assert_eq!(change.reward_delta, -5);
        assert!(change.online_flag_changed);
        assert_eq!(change.tx_age_delta, Some(-35));
        assert!(change.is_significant());
    }

    #[test]
    fn tx_age_requires_both_values() {
        let previous = vec![crate::NodeRecord {
            last_tx_age_minutes: None,
            ..record("a")
        }];
        let current = vec![crate::NodeRecord {
            last_tx_age_minutes: Some(5),
            ..record("a")
        }];

        assert_eq!(calculate(&current, Some(previous.as_slice()))["a"].tx_age_delta, None);
        assert_eq!(calculate(&previous, Some(current.as_slice()))["a"].tx_age_delta, None);
    }

    #[test]
    fn added_and_removed_nodes() {
        let previous = vec![record("a"), record("removed")];
        let current = vec![record("a"), record("added")];

        let changes = calculate(&current, Some(previous.as_slice()));

        assert!(changes.contains_key("a"));
        assert!(!changes.contains_key("added"));
        assert!(!changes.contains_key("removed"));
    }
}
