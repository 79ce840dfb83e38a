//! Transaction recency lookups through the blockchain explorer.
//!
//! The explorer API changed its paths and response shapes over time, so
//! the prober tries a configured list of endpoint templates in order and
//! decodes each response with an ordered list of [`Envelope`] strategies.
//! The first endpoint that yields at least one valid timestamp wins.

use std::time::Duration;

use async_trait::async_trait;
use common::config;
use derive_more::{Display, Error, From};
use reqwest::{
    header::{ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER},
    Client, StatusCode,
};
use serde_json::Value;
use store::{timestamp, Address};
use time::OffsetDateTime;
use tracing::debug;

use crate::http;

/// Record fields that may hold a transaction timestamp, in order of preference.
pub const TIMESTAMP_FIELDS: [&str; 5] = [
    "timestamp",
    "block_timestamp",
    "created_at",
    "time",
    "block_time",
];

/// Epoch values above this threshold are treated as milliseconds.
const MILLIS_THRESHOLD: i128 = 1_000_000_000_000;

/// Response envelope strategies, tried in order.
const ENVELOPES: [Envelope; 6] = [
    Envelope::List,
    Envelope::Field("items"),
    Envelope::Field("transactions"),
    Envelope::Field("data"),
    Envelope::Field("result"),
    Envelope::Field("internal_transactions"),
];

/// Shape of a transaction listing response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Envelope {
    /// Transactions are the top-level array.
    List,

    /// Transactions are an array under the provided object field.
    Field(&'static str),
}

impl Envelope {
    /// Extract transaction records if the body matches this envelope.
    pub fn extract<'a>(&self, body: &'a Value) -> Option<&'a [Value]> {
        match self {
            Envelope::List => body.as_array(),
            Envelope::Field(name) => body.as_object()?.get(*name)?.as_array(),
        }
        .map(Vec::as_slice)
    }
}

/// Extract transaction records using the first matching envelope.
pub fn transactions(body: &Value) -> &[Value] {
    ENVELOPES
        .iter()
        .find_map(|envelope| envelope.extract(body))
        .unwrap_or_default()
}

/// Convert a single timestamp value into an instant.
///
/// Accepts epoch seconds, epoch milliseconds (as numbers or digit strings)
/// and ISO 8601 strings with an explicit offset. Empty, zero and negative
/// values are treated as absent.
pub fn normalize_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::Number(number) => {
            let epoch = match number.as_i64() {
                Some(epoch) => i128::from(epoch),
                None => number.as_f64()? as i128,
            };

            from_epoch(epoch)
        }
        Value::String(text) if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => {
            from_epoch(text.parse().ok()?)
        }
        Value::String(text) if !text.is_empty() => timestamp::parse_with_offset(text),
        _ => None,
    }
}

fn from_epoch(epoch: i128) -> Option<OffsetDateTime> {
    if epoch <= 0 {
        return None;
    }

    let nanos = if epoch > MILLIS_THRESHOLD {
        epoch.checked_mul(1_000_000)?
    } else {
        epoch.checked_mul(1_000_000_000)?
    };

    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

/// Find the latest transaction timestamp within the provided records.
///
/// For each record the first parseable field from [`TIMESTAMP_FIELDS`] is used.
pub fn latest_timestamp(transactions: &[Value]) -> Option<OffsetDateTime> {
    transactions
        .iter()
        .filter_map(|transaction| {
            TIMESTAMP_FIELDS
                .iter()
                .filter_map(|field| transaction.get(field))
                .find_map(normalize_timestamp)
        })
        .max()
}

/// Whole minutes elapsed between two instants, never negative.
pub fn minutes_between(latest: OffsetDateTime, now: OffsetDateTime) -> u64 {
    u64::try_from((now - latest).whole_minutes()).unwrap_or(0)
}

/// Single endpoint failure.
#[derive(Debug, Display, Error, From)]
pub enum EndpointFailure {
    /// Request couldn't be completed.
    Request(reqwest::Error),

    /// Endpoint responded with a status other than `200 OK`.
    #[display(fmt = "unexpected status: {}", _0)]
    #[from(ignore)]
    Status(#[error(not(source))] StatusCode),

    /// Response body is not valid JSON.
    Body(serde_json::Error),

    /// Response contains no parseable timestamps.
    #[display(fmt = "no transaction timestamps")]
    NoTimestamps,
}

/// A source of transaction recency.
#[async_trait]
pub trait ActivitySource {
    /// Minutes since the latest transaction of the provided address.
    ///
    /// Returns [`None`] if recency cannot be determined.
    async fn minutes_since_last_tx(&self, address: &Address) -> Option<u64>;
}

/// Explorer client that queries endpoints in order.
pub struct ActivityProber {
    client: Client,
    base_url: String,
    endpoints: Vec<String>,
}

impl ActivityProber {
    pub fn new(explorer: &config::Explorer, http: &config::Http) -> reqwest::Result<Self> {
        Ok(Self {
            client: http::client(http, Duration::from_secs(explorer.timeout_secs))?,
            base_url: explorer.url.trim_end_matches('/').to_owned(),
            endpoints: explorer.endpoints.clone(),
        })
    }

    /// Find the latest transaction timestamp of the provided address.
    pub async fn last_activity(&self, address: &Address) -> Option<OffsetDateTime> {
        if address.is_zero() {
            return None;
        }

        let address = address.to_string();

        for endpoint in &self.endpoints {
            let url = format!("{}{}", self.base_url, endpoint.replace("{address}", &address));

            match self.query_endpoint(&url, &address).await {
                Ok(latest) => return Some(latest),
                Err(err) => debug!(%url, %err, "explorer endpoint yielded no activity"),
            }
        }

        None
    }

    async fn query_endpoint(&self, url: &str, address: &str) -> Result<OffsetDateTime, EndpointFailure> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .header(
                REFERER,
                format!("{}/address/{}?tab=internal_txns", self.base_url, address),
            )
            .header(ORIGIN, &self.base_url)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(EndpointFailure::Status(response.status()));
        }

        let body: Value = serde_json::from_slice(&response.bytes().await?)?;

        latest_timestamp(transactions(&body)).ok_or(EndpointFailure::NoTimestamps)
    }
}

#[async_trait]
impl ActivitySource for ActivityProber {
    async fn minutes_since_last_tx(&self, address: &Address) -> Option<u64> {
        let latest = self.last_activity(address).await?;
        Some(minutes_between(latest, OffsetDateTime::now_utc()))
    }
}
