//! Node identifier to on-chain address resolution.
//!
//! Addresses are resolved with a single `getEoa(string[])` contract read
//! for the whole roster. The call is retried a fixed number of times, with
//! a connectivity re-establishment step between attempts. If every attempt
//! fails, [`AddressResolver::resolve_batch`] treats the whole batch as unresolved.

use std::{collections::HashMap, iter, num::ParseIntError, time::Duration};

use async_trait::async_trait;
use common::config;
use derive_more::{Display, Error, From};
use ethabi::{Contract, Function, Token};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use store::Address;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::http;

/// Registry contract ABI, limited to the address lookup function.
const REGISTRY_ABI: &str = r#"[
    {
        "inputs": [{ "internalType": "string[]", "name": "peerIds", "type": "string[]" }],
        "name": "getEoa",
        "outputs": [{ "internalType": "address[]", "name": "", "type": "address[]" }],
        "stateMutability": "view",
        "type": "function"
    }
]"#;

/// Address resolution errors.
#[derive(Debug, Display, Error, From)]
pub enum ResolveError {
    /// HTTP client error.
    Http(reqwest::Error),

    /// Unable to encode the call or decode its output.
    Abi(ethabi::Error),

    /// Call output is not a valid hex string.
    Hex(hex::FromHexError),

    /// Chain identifier is not a valid hex number.
    ChainId(ParseIntError),

    /// JSON-RPC error returned by the node.
    #[display(fmt = "rpc error {}: {}", code, message)]
    Rpc { code: i64, message: String },

    /// JSON-RPC response contains neither a result nor an error.
    #[display(fmt = "empty rpc response")]
    EmptyResponse,

    /// Contract call returned an unexpected value.
    #[display(fmt = "unexpected contract output")]
    UnexpectedOutput,
}

/// A source of node addresses.
#[async_trait]
pub trait AddressSource {
    /// Fetch addresses for the provided node identifiers in a single attempt.
    ///
    /// Returned addresses are parallel to the identifiers.
    async fn addresses(&self, node_ids: &[String]) -> Result<Vec<Address>, ResolveError>;

    /// Re-establish connectivity after a failed attempt.
    async fn reconnect(&mut self) -> Result<(), ResolveError> {
        Ok(())
    }
}

/// JSON-RPC request body.
#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

/// JSON-RPC response body.
#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// `eth_call` transaction object.
#[derive(Serialize)]
struct CallRequest<'a> {
    to: &'a str,
    data: String,
}

/// Registry contract client that talks to a JSON-RPC node.
pub struct ContractClient {
    client: Client,
    http: config::Http,
    rpc_url: String,
    contract_address: String,
    chain_id: u64,
    timeout: Duration,
    function: Function,
}

impl ContractClient {
    pub fn new(chain: &config::Chain, http: &config::Http) -> Result<Self, ResolveError> {
        let timeout = Duration::from_secs(chain.timeout_secs);
        let function = Contract::load(REGISTRY_ABI.as_bytes())?
            .function("getEoa")?
            .clone();

        Ok(Self {
            client: http::client(http, timeout)?,
            http: http.clone(),
            rpc_url: chain.rpc_url.clone(),
            contract_address: chain.contract_address.clone(),
            chain_id: chain.chain_id,
            timeout,
            function,
        })
    }

    /// Get the chain identifier reported by the node.
    pub async fn chain_id(&self) -> Result<u64, ResolveError> {
        let chain_id: String = self.call("eth_chainId", Vec::<String>::new()).await?;
        Ok(u64::from_str_radix(chain_id.trim_start_matches("0x"), 16)?)
    }

    async fn call<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<T, ResolveError> {
        let response: RpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id: 1,
                method,
                params,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response {
            RpcResponse {
                error: Some(RpcError { code, message }),
                ..
            } => Err(ResolveError::Rpc { code, message }),
            RpcResponse {
                result: Some(result),
                ..
            } => Ok(result),
            _ => Err(ResolveError::EmptyResponse),
        }
    }
}

#[async_trait]
impl AddressSource for ContractClient {
    async fn addresses(&self, node_ids: &[String]) -> Result<Vec<Address>, ResolveError> {
        let input = self.function.encode_input(&[Token::Array(
            node_ids.iter().cloned().map(Token::String).collect(),
        )])?;

        let call = CallRequest {
            to: &self.contract_address,
            data: format!("0x{}", hex::encode(input)),
        };

        let output: String = self.call("eth_call", (call, "latest")).await?;
        let output = hex::decode(output.trim_start_matches("0x"))?;

        let Some(Token::Array(tokens)) = self.function.decode_output(&output)?.into_iter().next()
        else {
            return Err(ResolveError::UnexpectedOutput);
        };

        tokens
            .into_iter()
            .map(|token| match token {
                Token::Address(address) => Ok(Address::new(address.to_fixed_bytes())),
                _ => Err(ResolveError::UnexpectedOutput),
            })
            .collect()
    }

    async fn reconnect(&mut self) -> Result<(), ResolveError> {
        self.client = http::client(&self.http, self.timeout)?;

        let chain_id = self.chain_id().await?;

        if chain_id != self.chain_id {
            warn!(
                expected = self.chain_id,
                actual = chain_id,
                "connected to an unexpected chain"
            );
        }

        Ok(())
    }
}

/// Outcome of a batch resolution.
#[derive(Debug)]
pub struct Resolution {
    /// Resolved address of every requested identifier.
    pub addresses: HashMap<String, Option<Address>>,

    /// Failure that caused the whole batch to be left unresolved.
    pub error: Option<ResolveError>,
}

/// Address resolver with a retry policy.
pub struct AddressResolver<S> {
    source: S,
    attempts: u32,
    delay: Duration,
}

impl<S> AddressResolver<S>
where
    S: AddressSource + Send + Sync,
{
    pub fn new(source: S, attempts: u32, delay: Duration) -> Self {
        Self {
            source,
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn from_config(source: S, chain: &config::Chain) -> Self {
        Self::new(
            source,
            chain.retry_attempts,
            Duration::from_secs(chain.retry_delay_secs),
        )
    }

    /// Resolve node identifiers, returning an error once all attempts are exhausted.
    ///
    /// Zero addresses are returned as [`None`], as are identifiers for which
    /// the contract returned no value at all.
    pub async fn fetch(&mut self, node_ids: &[String]) -> Result<Vec<Option<Address>>, ResolveError> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 1;

        loop {
            info!(nodes = node_ids.len(), attempt, "resolving node addresses");

            match self.source.addresses(node_ids).await {
                Ok(addresses) => {
                    return Ok(addresses
                        .into_iter()
                        .map(Address::non_zero)
                        .chain(iter::repeat(None))
                        .take(node_ids.len())
                        .collect())
                }
                Err(err) if attempt < self.attempts => {
                    warn!(%err, attempt, attempts = self.attempts, "address resolution attempt failed");

                    sleep(self.delay).await;

                    match self.source.reconnect().await {
                        Ok(()) => info!("reconnected"),
                        Err(err) => warn!(%err, "unable to reconnect"),
                    }

                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Resolve node identifiers into a map.
    ///
    /// If resolution fails, every identifier is mapped to [`None`] and the
    /// failure is kept in [`Resolution::error`].
    pub async fn resolve_batch(&mut self, node_ids: &[String]) -> Resolution {
        match self.fetch(node_ids).await {
            Ok(addresses) => {
                let resolved = addresses.iter().flatten().count();
                info!(resolved, total = node_ids.len(), "node addresses resolved");

                Resolution {
                    addresses: node_ids.iter().cloned().zip(addresses).collect(),
                    error: None,
                }
            }
            Err(err) => {
                error!(%err, "address resolution failed, treating all nodes as unresolved");

                Resolution {
                    addresses: node_ids.iter().map(|id| (id.clone(), None)).collect(),
                    error: Some(err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use axum::{routing::post, Json, Router};
    use common::config::Config;
    use ethabi::Token;
    use serde_json::{json, Value};
    use store::Address;

    use crate::testing::serve;

    use super::{AddressResolver, AddressSource, ContractClient, ResolveError};

    /// Fails a fixed count of times before returning addresses.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        reconnects: u32,
        addresses: Vec<Address>,
    }

    impl Flaky {
        fn new(failures: u32, addresses: Vec<Address>) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                reconnects: 0,
                addresses,
            }
        }
    }

    #[async_trait]
    impl AddressSource for Flaky {
        async fn addresses(&self, _: &[String]) -> Result<Vec<Address>, ResolveError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);

            if call < self.failures {
                Err(ResolveError::EmptyResponse)
            } else {
                Ok(self.addresses.clone())
            }
        }

        async fn reconnect(&mut self) -> Result<(), ResolveError> {
            self.reconnects += 1;
            Ok(())
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn zero_addresses_are_unresolved() {
        let bound = Address::new([0xab; 20]);
        let mut resolver =
            AddressResolver::new(Flaky::new(0, vec![Address::ZERO, bound]), 3, Duration::ZERO);

        let resolution = resolver.resolve_batch(&ids(&["nodeA", "nodeB"])).await;
        let addresses = resolution.addresses;

        assert!(resolution.error.is_none());

        assert_eq!(addresses["nodeA"], None);
        assert_eq!(addresses["nodeB"], Some(bound));
    }

    #[tokio::test]
    async fn short_output() {
        let bound = Address::new([1; 20]);
        let mut resolver = AddressResolver::new(Flaky::new(0, vec![bound]), 3, Duration::ZERO);

        let addresses = resolver.fetch(&ids(&["a", "b", "a"])).await.unwrap();

        assert_eq!(addresses, [Some(bound), None, None]);
    }

    #[tokio::test]
    async fn retries_with_reconnect() {
        let bound = Address::new([1; 20]);
        let mut resolver = AddressResolver::new(Flaky::new(2, vec![bound]), 3, Duration::ZERO);

        let addresses = resolver.fetch(&ids(&["a"])).await.unwrap();

        assert_eq!(addresses, [Some(bound)]);
        assert_eq!(resolver.source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(resolver.source.reconnects, 2);
    }

    #[tokio::test]
    async fn exhausted_retries() {
        let mut resolver =
            AddressResolver::new(Flaky::new(3, vec![Address::new([1; 20])]), 3, Duration::ZERO);

        assert!(resolver.fetch(&ids(&["a"])).await.is_err());
        assert_eq!(resolver.source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(resolver.source.reconnects, 2);

        let mut resolver =
            AddressResolver::new(Flaky::new(3, vec![Address::new([1; 20])]), 3, Duration::ZERO);
        let resolution = resolver.resolve_batch(&ids(&["a", "b"])).await;

        assert_eq!(resolution.addresses.len(), 2);
        assert!(resolution.addresses.values().all(Option::is_none));
        assert!(matches!(resolution.error, Some(ResolveError::EmptyResponse)));
    }

    #[tokio::test]
    async fn empty_batch() {
        let mut resolver = AddressResolver::new(Flaky::new(0, Vec::new()), 3, Duration::ZERO);

        assert!(resolver.fetch(&[]).await.unwrap().is_empty());
        assert_eq!(resolver.source.calls.load(Ordering::SeqCst), 0);
    }

    async fn rpc(Json(request): Json<Value>) -> Json<Value> {
        let result = match request["method"].as_str() {
            Some("eth_chainId") => json!("0xa7675"),
            Some("eth_call") => {
                let data = request["params"][0]["data"].as_str().unwrap_or_default();

                if !data.starts_with("0x") || request["params"][1] != "latest" {
                    return Json(json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "bad call" } }));
                }

                let output = ethabi::encode(&[Token::Array(vec![
                    Token::Address(ethabi::Address::zero()),
                    Token::Address(ethabi::Address::repeat_byte(0xab)),
                ])]);

                json!(format!("0x{}", hex::encode(output)))
            }
            _ => {
                return Json(json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32601, "message": "method not found" } }))
            }
        };

        Json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
    }

    #[tokio::test]
    async fn contract_client() {
        let address = serve(Router::new().route("/", post(rpc))).await;

        let mut config = Config::for_tests();
        config.chain.rpc_url = format!("http://{address}/");

        let mut client = ContractClient::new(&config.chain, &config.http).unwrap();

        let addresses = client
            .addresses(&ids(&["nodeA", "nodeB"]))
            .await
            .unwrap();

        assert_eq!(addresses, [Address::ZERO, Address::new([0xab; 20])]);
        assert_eq!(client.chain_id().await.unwrap(), 685685);
        assert!(client.reconnect().await.is_ok());
    }

    #[tokio::test]
    async fn contract_client_unreachable() {
        let config = Config::for_tests();
        let client = ContractClient::new(&config.chain, &config.http).unwrap();

        assert!(matches!(
            client.addresses(&ids(&["nodeA"])).await,
            Err(ResolveError::Http(_))
        ));
    }
}
