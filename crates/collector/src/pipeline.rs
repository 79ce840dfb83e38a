//! Monitoring cycle data collection.

use std::time::Duration;

use common::config::Config;
use derive_more::{Display, Error, From};
use store::{ActivityBucket, NodeDescriptor, NodeRecord, OffsetDateTime, RecordSet};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    peer::{PeerClient, PeerInfo, PeerSource},
    prober::{ActivityProber, ActivitySource},
    resolver::{AddressResolver, AddressSource, ContractClient, ResolveError, Resolution},
};

/// API name of nodes whose peer status couldn't be fetched.
pub const UNKNOWN_API_NAME: &str = "UNKNOWN";

/// Collector construction errors.
#[derive(Debug, Display, Error, From)]
pub enum BuildError {
    /// Unable to set up the registry contract client.
    Resolver(ResolveError),

    /// Unable to set up an HTTP client.
    Http(reqwest::Error),
}

/// Result of a single collection run.
#[derive(Debug)]
pub struct Collection {
    /// One record per roster node, in roster order.
    pub records: RecordSet,

    /// Set if address resolution failed for the whole roster.
    pub resolution_error: Option<ResolveError>,
}

/// Collects a [`RecordSet`] from a node roster.
pub struct Collector<A, P, T> {
    resolver: AddressResolver<A>,
    peers: P,
    activity: T,
    node_delay: Duration,
}

impl Collector<ContractClient, PeerClient, ActivityProber> {
    /// Create a collector that talks to the configured services.
    pub fn from_config(config: &Config) -> Result<Self, BuildError> {
        let contract = ContractClient::new(&config.chain, &config.http)?;

        Ok(Self::new(
            AddressResolver::from_config(contract, &config.chain),
            PeerClient::new(&config.peer, &config.http)?,
            ActivityProber::new(&config.explorer, &config.http)?,
            Duration::from_millis(config.monitor.node_delay_ms),
        ))
    }
}

impl<A, P, T> Collector<A, P, T>
where
    A: AddressSource + Send + Sync,
    P: PeerSource + Sync,
    T: ActivitySource + Sync,
{
    pub fn new(
        resolver: AddressResolver<A>,
        peers: P,
        activity: T,
        node_delay: Duration,
    ) -> Self {
        Self {
            resolver,
            peers,
            activity,
            node_delay,
        }
    }

    /// Collect one record per roster node, preserving roster order.
    ///
    /// Failures of individual nodes are reflected in their records and never
    /// abort the collection.
    pub async fn collect(&mut self, nodes: &[NodeDescriptor]) -> Collection {
        info!(nodes = nodes.len(), "collecting node data");

        let node_ids: Vec<_> = nodes.iter().map(|node| node.node_id.clone()).collect();
        let Resolution {
            addresses,
            error: resolution_error,
        } = self.resolver.resolve_batch(&node_ids).await;

        let mut records = Vec::with_capacity(nodes.len());

        for (index, node) in nodes.iter().enumerate() {
            if index > 0 {
                sleep(self.node_delay).await;
            }

            info!(
                node = index + 1,
                total = nodes.len(),
                name = %node.custom_name,
                hardware = %node.hardware_class,
                "processing node"
            );

            let address = addresses.get(&node.node_id).copied().flatten();

            let Some(info) = self.peers.peer_info(&node.node_id).await else {
                warn!(node_id = %node.node_id, "no peer status, recording node as unknown");

                records.push(NodeRecord {
                    id: node.node_id.clone(),
                    custom_name: node.custom_name.clone(),
                    api_name: String::from(UNKNOWN_API_NAME),
                    hardware_class: node.hardware_class.clone(),
                    address,
                    win_count: 0,
                    reward_score: 0,
                    online: false,
                    last_tx_age_minutes: None,
                    collected_at: OffsetDateTime::now_utc(),
                });

                continue;
            };

            let last_tx_age_minutes = match &address {
                Some(address) => self.activity.minutes_since_last_tx(address).await,
                None => None,
            };

            let record = node_record(node, info, address, last_tx_age_minutes);

            info!(
                status = ActivityBucket::from_age(record.last_tx_age_minutes).marker(),
                name = %record.custom_name,
                tx_minutes = ?record.last_tx_age_minutes,
                wins = record.win_count,
                rewards = record.reward_score,
                "node processed"
            );

            records.push(record);
        }

        info!(records = records.len(), "node data collected");

        Collection {
            records,
            resolution_error,
        }
    }
}

fn node_record(
    node: &NodeDescriptor,
    info: PeerInfo,
    address: Option<store::Address>,
    last_tx_age_minutes: Option<u64>,
) -> NodeRecord {
    NodeRecord {
        id: node.node_id.clone(),
        custom_name: node.custom_name.clone(),
        api_name: info.peer_name,
        hardware_class: node.hardware_class.clone(),
        address,
        // The peer service reports wins as `score` and rewards as `reward`.
        win_count: info.score,
        reward_score: info.reward,
        online: info.online,
        last_tx_age_minutes,
        collected_at: OffsetDateTime::now_utc(),
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex, time::Duration};

    use async_trait::async_trait;
    use store::{Address, HardwareClass, NodeDescriptor};

    use crate::{
        peer::{PeerInfo, PeerSource},
        prober::ActivitySource,
        resolver::{AddressResolver, AddressSource, ResolveError},
    };

    use super::{Collector, UNKNOWN_API_NAME};

    struct Registry(Vec<Address>);

    #[async_trait]
    impl AddressSource for Registry {
        async fn addresses(&self, _: &[String]) -> Result<Vec<Address>, ResolveError> {
            Ok(self.0.clone())
        }
    }

    struct Offline;

    #[async_trait]
    impl AddressSource for Offline {
        async fn addresses(&self, _: &[String]) -> Result<Vec<Address>, ResolveError> {
            Err(ResolveError::EmptyResponse)
        }
    }

    struct Peers(HashMap<&'static str, PeerInfo>);

    #[async_trait]
    impl PeerSource for Peers {
        async fn peer_info(&self, node_id: &str) -> Option<PeerInfo> {
            self.0.get(node_id).cloned()
        }
    }

    /// Records looked up addresses and reports a fixed age.
    #[derive(Default)]
    struct Activity(Mutex<Vec<Address>>);

    #[async_trait]
    impl ActivitySource for Activity {
        async fn minutes_since_last_tx(&self, address: &Address) -> Option<u64> {
            self.0.lock().unwrap().push(*address);
            Some(7)
        }
    }

    fn node(id: &str, hardware_class: HardwareClass) -> NodeDescriptor {
        NodeDescriptor {
            custom_name: format!("name {id}"),
            node_id: id.to_owned(),
            hardware_class,
        }
    }

    fn info(name: &str, score: i64, reward: i64) -> PeerInfo {
        PeerInfo {
            peer_name: name.to_owned(),
            online: true,
            score,
            reward,
        }
    }

    fn collector<A>(source: A, peers: Peers) -> Collector<A, Peers, Activity>
    where
        A: AddressSource + Send + Sync,
    {
        Collector::new(
            AddressResolver::new(source, 1, Duration::ZERO),
            peers,
            Activity::default(),
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn failed_peer_status() {
        let bound = Address::new([0xab; 20]);
        let peers = Peers(HashMap::from([("nodeA", info("owl", 4, 9))]));
        let mut collector = collector(Registry(vec![bound, bound]), peers);

        let records = collector
            .collect(&[node("nodeA", HardwareClass::Cpu), node("nodeB", HardwareClass::Gpu)])
            .await
            .records;

        assert_eq!(records.len(), 2);

        assert_eq!(records[0].id, "nodeA");
        assert_eq!(records[0].api_name, "owl");
        assert_eq!(records[0].last_tx_age_minutes, Some(7));

        let failed = &records[1];
        assert_eq!(failed.id, "nodeB");
        assert_eq!(failed.custom_name, "name nodeB");
        assert_eq!(failed.hardware_class, HardwareClass::Gpu);
        assert_eq!(failed.api_name, UNKNOWN_API_NAME);
        assert!(!failed.online);
        assert_eq!(failed.win_count, 0);
        assert_eq!(failed.reward_score, 0);
        assert_eq!(failed.last_tx_age_minutes, None);
        assert_eq!(failed.address, Some(bound));

        assert_eq!(*collector.activity.0.lock().unwrap(), [bound]);
    }

    #[tokio::test]
    async fn unresolved_addresses_are_not_looked_up() {
        let bound: Address = "0xABC0000000000000000000000000000000000123".parse().unwrap();
        let peers = Peers(HashMap::from([
            ("nodeA", info("a", 1, 2)),
            ("nodeB", info("b", 3, 4)),
        ]));
        let mut collector = collector(Registry(vec![Address::ZERO, bound]), peers);

        let records = collector
            .collect(&[node("nodeA", HardwareClass::Cpu), node("nodeB", HardwareClass::Cpu)])
            .await
            .records;

        assert_eq!(records[0].address, None);
        assert_eq!(records[0].last_tx_age_minutes, None);
        assert_eq!(records[1].address, Some(bound));
        assert_eq!(records[1].last_tx_age_minutes, Some(7));

        assert_eq!(*collector.activity.0.lock().unwrap(), [bound]);
    }

    #[tokio::test]
    async fn counters_are_cross_mapped() {
        let peers = Peers(HashMap::from([("nodeA", info("a", 11, 250))]));
        let mut collector = collector(Registry(vec![Address::ZERO]), peers);

        let records = collector.collect(&[node("nodeA", HardwareClass::Cpu)]).await.records;

        assert_eq!(records[0].win_count, 11);
        assert_eq!(records[0].reward_score, 250);
    }

    #[tokio::test]
    async fn resolution_failure() {
        let peers = Peers(HashMap::from([
            ("nodeA", info("a", 1, 2)),
            ("nodeB", info("b", 3, 4)),
            ("nodeC", info("c", 5, 6)),
        ]));
        let mut collector = collector(Offline, peers);

        let collection = collector
            .collect(&[
                node("nodeC", HardwareClass::Cpu),
                node("nodeA", HardwareClass::Gpu),
                node("nodeB", HardwareClass::Cpu),
            ])
            .await;
        let records = collection.records;

        assert!(collection.resolution_error.is_some());

        let ids: Vec<_> = records.iter().map(|record| &*record.id).collect();
        assert_eq!(ids, ["nodeC", "nodeA", "nodeB"]);
        assert!(records.iter().all(|record| record.address.is_none()));
        assert!(records.iter().all(|record| record.online));
        assert!(collector.activity.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_roster() {
        let mut collector = collector(Registry(Vec::new()), Peers(HashMap::new()));

        let collection = collector.collect(&[]).await;

        assert!(collection.records.is_empty());
        assert!(collection.resolution_error.is_none());
    }
}
