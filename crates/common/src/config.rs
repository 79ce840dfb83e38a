use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

#[cfg(feature = "logging")]
use tracing_subscriber::filter::LevelFilter;

/// Implementation of [`serde`]'s deserializer for [`FromStr`] types.
#[cfg(feature = "logging")]
fn deserialize_from_str<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error,
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    std::str::FromStr::from_str(&s).map_err(serde::de::Error::custom)
}

/// Logging configuration.
#[cfg(feature = "logging")]
#[derive(Deserialize)]
pub struct Logging {
    /// Log level.
    #[serde(deserialize_with = "deserialize_from_str")]
    pub level: LevelFilter,
}

#[cfg(feature = "logging")]
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
        }
    }
}

/// Monitoring cycle configuration.
#[derive(Deserialize)]
pub struct Monitor {
    /// Interval between two monitoring cycles, in minutes.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Path to the node roster, a workbook or a CSV file.
    #[serde(default = "default_roster_path")]
    pub roster_path: PathBuf,

    /// Delay inserted between two processed nodes, in milliseconds.
    #[serde(default = "default_node_delay_ms")]
    pub node_delay_ms: u64,

    /// Maximum roster size for which a detailed per-node report is sent.
    #[serde(default = "default_detailed_report_limit")]
    pub detailed_report_limit: usize,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            roster_path: default_roster_path(),
            node_delay_ms: default_node_delay_ms(),
            detailed_report_limit: default_detailed_report_limit(),
        }
    }
}

/// Peer status service configuration.
#[derive(Deserialize)]
pub struct Peer {
    /// Peer status endpoint URL, queried with an `id` parameter.
    #[serde(default = "default_peer_url")]
    pub url: String,

    /// Request timeout, in seconds.
    #[serde(default = "default_peer_timeout")]
    pub timeout_secs: u64,
}

impl Default for Peer {
    fn default() -> Self {
        Self {
            url: default_peer_url(),
            timeout_secs: default_peer_timeout(),
        }
    }
}

/// On-chain identity registry configuration.
#[derive(Deserialize)]
pub struct Chain {
    /// JSON-RPC endpoint URL.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Address of a contract that maps peer identifiers to account addresses.
    #[serde(default = "default_contract_address")]
    pub contract_address: String,

    /// Expected chain identifier.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Contract call timeout, in seconds.
    #[serde(default = "default_chain_timeout")]
    pub timeout_secs: u64,

    /// Total count of contract call attempts.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between two contract call attempts, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            contract_address: default_contract_address(),
            chain_id: default_chain_id(),
            timeout_secs: default_chain_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

/// Blockchain explorer configuration.
#[derive(Deserialize)]
pub struct Explorer {
    /// Explorer base URL, without a trailing slash.
    #[serde(default = "default_explorer_url")]
    pub url: String,

    /// Per-endpoint request timeout, in seconds.
    #[serde(default = "default_explorer_timeout")]
    pub timeout_secs: u64,

    /// Transaction listing path templates, tried in order.
    ///
    /// Each template must contain an `{address}` placeholder.
    #[serde(default = "default_explorer_endpoints")]
    pub endpoints: Vec<String>,
}

impl Default for Explorer {
    fn default() -> Self {
        Self {
            url: default_explorer_url(),
            timeout_secs: default_explorer_timeout(),
            endpoints: default_explorer_endpoints(),
        }
    }
}

/// Snapshot and report storage configuration.
#[derive(Deserialize)]
pub struct Storage {
    /// Directory that holds the current snapshot and the snapshot history.
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,

    /// Directory in which spreadsheet exports are written.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Maximum count of history entries.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            history_dir: default_history_dir(),
            results_dir: default_results_dir(),
            history_capacity: default_history_capacity(),
        }
    }
}

/// Outgoing HTTP configuration shared by all clients.
#[derive(Clone, Deserialize)]
pub struct Http {
    /// `User-Agent` header value.
    ///
    /// Defaults to a desktop browser string, the explorer rejects unknown clients.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Proxy in the `login:password@host:port` format.
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            proxy: None,
        }
    }
}

/// Telegram notification channel configuration.
#[derive(Deserialize)]
pub struct Telegram {
    /// Bot API token.
    pub bot_token: String,

    /// Target chat identifier.
    pub chat_id: String,

    /// Bot API base URL.
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
}

// Default values match the public testnet deployment.
fn default_interval_minutes() -> u64 {
    30
}

fn default_roster_path() -> PathBuf {
    PathBuf::from("nodes.csv")
}

fn default_node_delay_ms() -> u64 {
    1000
}

fn default_detailed_report_limit() -> usize {
    15
}

fn default_peer_url() -> String {
    String::from("https://dashboard.gensyn.ai/api/v1/peer")
}

fn default_peer_timeout() -> u64 {
    30
}

fn default_rpc_url() -> String {
    String::from("https://gensyn-testnet.g.alchemy.com/public")
}

fn default_contract_address() -> String {
    String::from("0xFaD7C5e93f28257429569B854151A1B8DCD404c2")
}

fn default_chain_id() -> u64 {
    685685
}

fn default_chain_timeout() -> u64 {
    180
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    10
}

fn default_explorer_url() -> String {
    String::from("https://gensyn-testnet.explorer.alchemy.com")
}

fn default_explorer_timeout() -> u64 {
    15
}

fn default_explorer_endpoints() -> Vec<String> {
    [
        "/api/v2/addresses/{address}/internal-transactions",
        "/api/v1/addresses/{address}/internal-transactions",
        "/api/addresses/{address}/internal-transactions",
        "/api/v2/addresses/{address}/internal_transactions",
        "/api/v1/addresses/{address}/internal_transactions",
        "/api/v2/addresses/{address}/transactions?filter=internal",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("monitor_history")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_history_capacity() -> usize {
    100
}

fn default_user_agent() -> String {
    String::from(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    )
}

fn default_telegram_api_url() -> String {
    String::from("https://api.telegram.org")
}

/// General configuration.
#[derive(Deserialize)]
pub struct Config {
    /// Logging configuration.
    #[cfg(feature = "logging")]
    #[serde(default)]
    pub logging: Logging,

    /// Monitoring cycle configuration.
    #[serde(default)]
    pub monitor: Monitor,

    /// Peer status service configuration.
    #[serde(default)]
    pub peer: Peer,

    /// On-chain identity registry configuration.
    #[serde(default)]
    pub chain: Chain,

    /// Blockchain explorer configuration.
    #[serde(default)]
    pub explorer: Explorer,

    /// Snapshot and report storage configuration.
    #[serde(default)]
    pub storage: Storage,

    /// Outgoing HTTP configuration.
    #[serde(default)]
    pub http: Http,

    /// Telegram configuration.
    ///
    /// Notifications are only logged if this section is missing.
    #[serde(default)]
    pub telegram: Option<Telegram>,
}

impl Config {
    /// Create new config using default configuration file or environment variables.
    ///
    /// Nested keys in environment variables are separated with `__`,
    /// for example `CONFIG_TELEGRAM__CHAT_ID`.
    ///
    /// See [`Env`] for more details on how to use environment variables configuration.
    ///
    /// [`Env`]: figment::providers::Env
    pub fn new(path: Option<PathBuf>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.unwrap_or(PathBuf::from("Config.toml"))))
            .merge(Env::prefixed("CONFIG_").split("__"))
            .extract()
    }

    /// Create new config suitable for running unit tests.
    #[cfg(feature = "test-utils")]
    pub fn for_tests() -> Self {
        Self {
            #[cfg(feature = "logging")]
            logging: Logging::default(),
            monitor: Monitor {
                node_delay_ms: 0,
                ..Default::default()
            },
            peer: Peer {
                url: String::from("http://127.0.0.1:1/peer"),
                timeout_secs: 1,
            },
            chain: Chain {
                rpc_url: String::from("http://127.0.0.1:1"),
                timeout_secs: 1,
                retry_delay_secs: 0,
                ..Default::default()
            },
            explorer: Explorer {
                url: String::from("http://127.0.0.1:1"),
                timeout_secs: 1,
                ..Default::default()
            },
            storage: Storage::default(),
            http: Http::default(),
            telegram: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::Config;

    #[test]
    fn defaults_without_file() {
        Jail::expect_with(|_| {
            let config = Config::new(None)?;

            assert_eq!(config.monitor.interval_minutes, 30);
            assert_eq!(config.chain.retry_attempts, 3);
            assert_eq!(config.chain.retry_delay_secs, 10);
            assert_eq!(config.storage.history_capacity, 100);
            assert_eq!(config.explorer.endpoints.len(), 6);
            assert!(config.telegram.is_none());
            assert!(config.http.user_agent.starts_with("Mozilla/5.0 (Windows NT 10.0"));
            assert!(config.http.user_agent.ends_with("Chrome/120.0.0.0 Safari/537.36"));

            Ok(())
        });
    }

    #[test]
    fn file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Config.toml",
                r#"
                [monitor]
                interval_minutes = 5

                [telegram]
                bot_token = "token"
                chat_id = "1"
                "#,
            )?;
            jail.set_env("CONFIG_TELEGRAM__CHAT_ID", "@monitor");
            jail.set_env("CONFIG_CHAIN__RETRY_ATTEMPTS", "5");

            let config = Config::new(None)?;
            let telegram = config.telegram.expect("missing telegram section");

            assert_eq!(config.monitor.interval_minutes, 5);
            assert_eq!(config.chain.retry_attempts, 5);
            assert_eq!(telegram.bot_token, "token");
            assert_eq!(telegram.chat_id, "@monitor");

            Ok(())
        });
    }
}
