//! Peer status service client.

use std::time::Duration;

use async_trait::async_trait;
use common::config;
use derive_more::{Display, Error, From};
use reqwest::Client;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error};

use crate::http;

/// Peer status reported by the service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    /// Name assigned to the peer by the service.
    #[serde(default = "default_peer_name", deserialize_with = "deserialize_name")]
    pub peer_name: String,

    #[serde(default, deserialize_with = "deserialize_flag")]
    pub online: bool,

    /// Counter the service reports as `score`.
    #[serde(default, deserialize_with = "deserialize_counter")]
    pub score: i64,

    /// Counter the service reports as `reward`.
    #[serde(default, deserialize_with = "deserialize_counter")]
    pub reward: i64,
}

fn default_peer_name() -> String {
    String::from("Unknown")
}

fn deserialize_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_peer_name))
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts integers, floats, numeric strings and `null`.
fn deserialize_counter<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|value| value as i64))
            .ok_or_else(|| de::Error::custom(format_args!("invalid counter: {number}"))),
        Value::String(text) if text.trim().is_empty() => Ok(0),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .or_else(|_| text.trim().parse::<f64>().map(|value| value as i64))
            .map_err(|_| de::Error::custom(format_args!("invalid counter: {text}"))),
        value => Err(de::Error::custom(format_args!("invalid counter: {value}"))),
    }
}

/// Peer status request errors.
#[derive(Debug, Display, Error, From)]
pub enum PeerError {
    /// HTTP client error, including non-success statuses.
    Http(reqwest::Error),

    /// Response body is not valid peer status JSON.
    Json(serde_json::Error),

    /// Response body is not a non-empty JSON object.
    #[display(fmt = "empty peer status")]
    Empty,
}

/// A source of peer status.
#[async_trait]
pub trait PeerSource {
    /// Fetch status of the provided peer.
    ///
    /// Returns [`None`] if the status cannot be fetched.
    async fn peer_info(&self, node_id: &str) -> Option<PeerInfo>;
}

/// Peer status service client.
pub struct PeerClient {
    client: Client,
    url: String,
}

impl PeerClient {
    pub fn new(peer: &config::Peer, http: &config::Http) -> reqwest::Result<Self> {
        Ok(Self {
            client: http::client(http, Duration::from_secs(peer.timeout_secs))?,
            url: peer.url.clone(),
        })
    }

    /// Fetch status of the provided peer with a single request.
    pub async fn fetch(&self, node_id: &str) -> Result<PeerInfo, PeerError> {
        let body: Value = serde_json::from_slice(
            &self
                .client
                .get(&self.url)
                .query(&[("id", node_id)])
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?,
        )?;

        if !body.as_object().map_or(false, |fields| !fields.is_empty()) {
            return Err(PeerError::Empty);
        }

        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl PeerSource for PeerClient {
    async fn peer_info(&self, node_id: &str) -> Option<PeerInfo> {
        match self.fetch(node_id).await {
            Ok(info) => {
                debug!(%node_id, peer_name = %info.peer_name, "peer status fetched");
                Some(info)
            }
            Err(err) => {
                error!(%node_id, %err, "unable to fetch peer status");
                None
            }
        }
    }
}
