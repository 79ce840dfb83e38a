use std::time::Duration;

use common::config;
use reqwest::{Client, Proxy};
use tracing::{info, warn};

/// Proxy server with credentials, parsed from the `login:password@host:port` format.
#[derive(Debug, PartialEq, Eq)]
pub struct ProxyAddress<'a> {
    pub login: &'a str,
    pub password: &'a str,
    pub host: &'a str,
    pub port: u16,
}

impl<'a> ProxyAddress<'a> {
    /// Parse a proxy value.
    ///
    /// The password may contain any characters, including `@` and `:`.
    pub fn parse(proxy: &'a str) -> Option<Self> {
        let (auth, server) = proxy.rsplit_once('@')?;
        let (login, password) = auth.split_once(':')?;
        let (host, port) = server.rsplit_once(':')?;

        if login.is_empty() || host.is_empty() {
            return None;
        }

        Some(Self {
            login,
            password,
            host,
            port: port.parse().ok()?,
        })
    }

    /// Proxy URL without credentials.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Create an HTTP client with the provided request timeout.
///
/// A malformed proxy value is reported and ignored.
pub fn client(config: &config::Http, timeout: Duration) -> reqwest::Result<Client> {
    let mut builder = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(timeout);

    if let Some(proxy) = config.proxy.as_deref().filter(|proxy| !proxy.is_empty()) {
        match ProxyAddress::parse(proxy).map(|address| {
            Proxy::all(address.url())
                .map(|proxy| proxy.basic_auth(address.login, address.password))
        }) {
            Some(Ok(value)) => {
                info!(proxy = %masked(proxy), "using proxy");
                builder = builder.proxy(value);
            }
            Some(Err(err)) => warn!(%err, "unable to use proxy, continuing without it"),
            None => warn!("invalid proxy format, expected login:password@host:port"),
        }
    }

    builder.build()
}

/// Hide the password part of a proxy value.
fn masked(proxy: &str) -> String {
    match ProxyAddress::parse(proxy) {
        Some(address) => format!("{}:***@{}:{}", address.login, address.host, address.port),
        None => String::from("***"),
    }
}
