//! Aggregated statistics over a record set.
//!
//! Report renderers consume [`Statistics`] instead of re-deriving counters
//! from raw records.

use serde::Serialize;

use crate::{HardwareClass, NodeRecord};

/// Transaction age, in minutes, starting from which a node needs attention.
pub const WARNING_AGE: u64 = 30;

/// Transaction age, in minutes, starting from which a node is considered critical.
pub const CRITICAL_AGE: u64 = 60;

/// Activity bucket derived from a node's transaction age.
///
/// Bucket boundaries are lower-inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ActivityBucket {
    /// Less than 10 minutes.
    VeryActive,

    /// From 10 to 30 minutes.
    Active,

    /// From 30 to 60 minutes.
    Warning,

    /// 60 minutes or more.
    Problem,

    /// Transaction age is not known.
    Unknown,
}

impl ActivityBucket {
    pub fn from_age(age_minutes: Option<u64>) -> Self {
        match age_minutes {
            None => ActivityBucket::Unknown,
            Some(age) if age < 10 => ActivityBucket::VeryActive,
            Some(age) if age < WARNING_AGE => ActivityBucket::Active,
            Some(age) if age < CRITICAL_AGE => ActivityBucket::Warning,
            Some(_) => ActivityBucket::Problem,
        }
    }

    /// Human-readable bucket label.
    pub fn label(&self) -> &'static str {
        match self {
            ActivityBucket::VeryActive => "Very active",
            ActivityBucket::Active => "Active",
            ActivityBucket::Warning => "Warning",
            ActivityBucket::Problem => "PROBLEM",
            ActivityBucket::Unknown => "No data",
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            ActivityBucket::VeryActive | ActivityBucket::Active => "🟢",
            ActivityBucket::Warning => "🟡",
            ActivityBucket::Problem => "🔴",
            ActivityBucket::Unknown => "⚫",
        }
    }
}

/// Node counts per [`ActivityBucket`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ActivityHistogram {
    pub very_active: usize,
    pub active: usize,
    pub warning: usize,
    pub problem: usize,
    pub unknown: usize,
}

impl ActivityHistogram {
    pub fn count(&self, bucket: ActivityBucket) -> usize {
        match bucket {
            ActivityBucket::VeryActive => self.very_active,
            ActivityBucket::Active => self.active,
            ActivityBucket::Warning => self.warning,
            ActivityBucket::Problem => self.problem,
            ActivityBucket::Unknown => self.unknown,
        }
    }

    fn add(&mut self, bucket: ActivityBucket) {
        let counter = match bucket {
            ActivityBucket::VeryActive => &mut self.very_active,
            ActivityBucket::Active => &mut self.active,
            ActivityBucket::Warning => &mut self.warning,
            ActivityBucket::Problem => &mut self.problem,
            ActivityBucket::Unknown => &mut self.unknown,
        };

        *counter += 1;
    }
}

/// Per hardware class counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HardwareStats {
    pub total: usize,
    pub online: usize,
    pub wins: i64,
}

impl HardwareStats {
    pub fn online_ratio(&self) -> f64 {
        ratio(self.online, self.total)
    }
}

/// Statistics summary of a single record set.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Statistics {
    /// Total count of nodes.
    pub total: usize,

    /// Count of online nodes.
    pub online: usize,

    /// Count of nodes with a resolved address.
    pub with_address: usize,

    /// Sum of win counters.
    pub total_wins: i64,

    /// Counters per hardware class, in order of first appearance.
    pub hardware: Vec<(HardwareClass, HardwareStats)>,

    /// Activity histogram.
    pub activity: ActivityHistogram,
}

impl Statistics {
    pub fn from_records(records: &[NodeRecord]) -> Self {
        let mut stats = Statistics {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            stats.online += usize::from(record.online);
            stats.with_address += usize::from(record.address.is_some());
            stats.total_wins += record.win_count;
            stats
                .activity
                .add(ActivityBucket::from_age(record.last_tx_age_minutes));

            let existing = stats
                .hardware
                .iter()
                .position(|(class, _)| *class == record.hardware_class);

            let position = match existing {
                Some(position) => position,
                None => {
                    stats
                        .hardware
                        .push((record.hardware_class.clone(), HardwareStats::default()));
                    stats.hardware.len() - 1
                }
            };

            let hardware = &mut stats.hardware[position].1;
            hardware.total += 1;
            hardware.online += usize::from(record.online);
            hardware.wins += record.win_count;
        }

        stats
    }

    pub fn online_ratio(&self) -> f64 {
        ratio(self.online, self.total)
    }

    pub fn address_ratio(&self) -> f64 {
        ratio(self.with_address, self.total)
    }
}

/// Nodes whose transaction age is at least [`WARNING_AGE`].
pub fn needing_attention(records: &[NodeRecord]) -> impl Iterator<Item = &NodeRecord> {
    aged_at_least(records, WARNING_AGE)
}

/// Nodes whose transaction age is at least [`CRITICAL_AGE`].
pub fn critical(records: &[NodeRecord]) -> impl Iterator<Item = &NodeRecord> {
    aged_at_least(records, CRITICAL_AGE)
}

fn aged_at_least(records: &[NodeRecord], minutes: u64) -> impl Iterator<Item = &NodeRecord> {
    records
        .iter()
        .filter(move |record| matches!(record.last_tx_age_minutes, Some(age) if age >= minutes))
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use crate::{record::tests::record, Address, HardwareClass, NodeRecord};

    use super::{critical, needing_attention, ActivityBucket, Statistics};

    #[test]
    fn bucket_boundaries() {
        let buckets: Vec<_> = [9, 10, 29, 30, 59, 60]
            .into_iter()
            .map(|age| ActivityBucket::from_age(Some(age)))
            .collect();

        assert_eq!(
            buckets,
            [
                ActivityBucket::VeryActive,
                ActivityBucket::Active,
                ActivityBucket::Active,
                ActivityBucket::Warning,
                ActivityBucket::Warning,
                ActivityBucket::Problem,
            ]
        );
        assert_eq!(ActivityBucket::from_age(Some(0)), ActivityBucket::VeryActive);
        assert_eq!(ActivityBucket::from_age(None), ActivityBucket::Unknown);
    }

    #[test]
    fn summary() {
        let records = vec![
            NodeRecord {
                win_count: 5,
                last_tx_age_minutes: Some(3),
                address: Some(Address::new([1; 20])),
                ..record("a")
            },
            NodeRecord {
                hardware_class: HardwareClass::Gpu,
                online: false,
                win_count: 2,
                last_tx_age_minutes: Some(45),
                ..record("b")
            },
            NodeRecord {
                win_count: 1,
                last_tx_age_minutes: Some(120),
                ..record("c")
            },
            record("d"),
        ];

        let stats = Statistics::from_records(&records);

        assert_eq!(stats.total, 4);
        assert_eq!(stats.online, 3);
        assert_eq!(stats.with_address, 1);
        assert_eq!(stats.total_wins, 8);
        assert_eq!(stats.online_ratio(), 0.75);
        assert_eq!(stats.address_ratio(), 0.25);

        assert_eq!(stats.hardware.len(), 2);
        assert_eq!(stats.hardware[0].0, HardwareClass::Cpu);
        assert_eq!(stats.hardware[0].1.total, 3);
        assert_eq!(stats.hardware[0].1.online, 3);
        assert_eq!(stats.hardware[0].1.wins, 6);
        assert_eq!(stats.hardware[1].0, HardwareClass::Gpu);
        assert_eq!(stats.hardware[1].1.online_ratio(), 0.0);

        assert_eq!(stats.activity.very_active, 1);
        assert_eq!(stats.activity.warning, 1);
        assert_eq!(stats.activity.problem, 1);
        assert_eq!(stats.activity.unknown, 1);
        assert_eq!(stats.activity.count(ActivityBucket::Active), 0);

        let attention: Vec<_> = needing_attention(&records).map(|r| &*r.id).collect();
        assert_eq!(attention, ["b", "c"]);

        let critical: Vec<_> = critical(&records).map(|r| &*r.id).collect();
        assert_eq!(critical, ["c"]);
    }

    #[test]
    fn empty() {
        let stats = Statistics::from_records(&[]);

        assert_eq!(stats.total, 0);
        assert_eq!(stats.online_ratio(), 0.0);
    }
}
