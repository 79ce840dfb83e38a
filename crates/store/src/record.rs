//! Per-node records produced by a monitoring cycle.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::Address;

/// Node hardware class, as declared in the roster.
///
/// Values that are neither `CPU` nor `GPU` are kept as-is (upper-cased).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HardwareClass {
    Cpu,
    Gpu,
    Unknown,
    Other(String),
}

impl HardwareClass {
    pub fn as_str(&self) -> &str {
        match self {
            HardwareClass::Cpu => "CPU",
            HardwareClass::Gpu => "GPU",
            HardwareClass::Unknown => "UNKNOWN",
            HardwareClass::Other(value) => value,
        }
    }
}

impl From<&str> for HardwareClass {
    fn from(value: &str) -> Self {
        let value = value.trim().to_uppercase();

        match &*value {
            "CPU" => HardwareClass::Cpu,
            "GPU" => HardwareClass::Gpu,
            "" | "UNKNOWN" => HardwareClass::Unknown,
            _ => HardwareClass::Other(value),
        }
    }
}

impl From<String> for HardwareClass {
    fn from(value: String) -> Self {
        HardwareClass::from(&*value)
    }
}

impl From<HardwareClass> for String {
    fn from(value: HardwareClass) -> Self {
        match value {
            HardwareClass::Other(value) => value,
            class => class.as_str().to_owned(),
        }
    }
}

impl fmt::Display for HardwareClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single monitored node, as declared in the roster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeDescriptor {
    /// Operator-defined display name.
    pub custom_name: String,

    /// Opaque peer identifier.
    pub node_id: String,

    /// Declared hardware class.
    pub hardware_class: HardwareClass,
}

/// Node state observed during a single monitoring cycle.
///
/// Field names in the serialized form follow the historical snapshot layout,
/// in which the win counter is stored as `reward` and the reward counter as `score`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Peer identifier, unique within a [`RecordSet`].
    pub id: String,

    /// Operator-defined display name.
    pub custom_name: String,

    /// Name reported by the peer status service.
    pub api_name: String,

    /// Declared hardware class.
    #[serde(rename = "hardware_type")]
    pub hardware_class: HardwareClass,

    /// Resolved on-chain account address.
    pub address: Option<Address>,

    /// Win counter.
    #[serde(rename = "reward")]
    pub win_count: i64,

    /// Reward score counter.
    #[serde(rename = "score")]
    pub reward_score: i64,

    /// Online flag reported by the peer status service.
    pub online: bool,

    /// Minutes since the latest transaction of the node's address.
    ///
    /// [`None`] if no transaction source returned any data.
    #[serde(rename = "last_tx_minutes_ago", default, deserialize_with = "deserialize_age")]
    pub last_tx_age_minutes: Option<u64>,

    /// Time at which the record was collected.
    #[serde(rename = "timestamp", with = "crate::timestamp")]
    pub collected_at: OffsetDateTime,
}

/// Older snapshots may contain negative ages when the explorer clock ran ahead.
fn deserialize_age<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(Option::<i64>::deserialize(deserializer)?.map(|age| age.max(0).unsigned_abs()))
}

/// Records produced by a single monitoring cycle, in roster order.
pub type RecordSet = Vec<NodeRecord>;
