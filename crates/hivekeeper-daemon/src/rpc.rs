//! Daemon RPC surface used once the daemon is serving its API
//!
//! Only two calls matter to the supervisor: reading a config value (the relay
//! list) and asking the daemon to connect to a peer address. Both go through
//! the [`DaemonRpc`] trait so tests can substitute a scripted client.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use hivekeeper_core::prelude::*;

/// Default location of the daemon's HTTP API
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5001";

/// RPC operations against a running daemon
#[trait_variant::make(DaemonRpc: Send)]
pub trait LocalDaemonRpc {
    /// Read the daemon config value stored under `key`
    async fn get_config(&self, key: &str) -> Result<Value>;

    /// Ask the daemon to open a connection to the peer at `address`
    async fn connect(&self, address: &str) -> Result<()>;
}

/// Extract relay addresses from a config value.
///
/// The value must be an array of strings; `null` is treated as an empty list.
pub fn parse_relay_list(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::rpc(format!("relay entry is not a string: {}", item)))
            })
            .collect(),
        other => Err(Error::rpc(format!(
            "relay list is not an array: {}",
            other
        ))),
    }
}

/// Read the relay list stored under `key`
pub async fn relay_list<R: DaemonRpc>(rpc: &R, key: &str) -> Result<Vec<String>> {
    let value = rpc.get_config(key).await?;
    parse_relay_list(&value)
}

#[derive(Debug, Deserialize)]
struct ConfigResponse {
    #[serde(rename = "Value")]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Message")]
    message: String,
}

/// [`DaemonRpc`] over the daemon's HTTP API (`POST /api/v0/<command>?arg=...`)
#[derive(Debug, Clone)]
pub struct HttpRpcClient {
    client: reqwest::Client,
    api_url: Url,
}

impl HttpRpcClient {
    pub fn new(mut api_url: Url, timeout: Duration) -> Result<Self> {
        // Url::join replaces the last segment unless the base ends in '/'.
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::rpc(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, api_url })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    fn endpoint(&self, command: &str, arg: &str) -> Result<Url> {
        let mut url = self
            .api_url
            .join(&format!("api/v0/{}", command))
            .map_err(|e| Error::rpc(format!("invalid API url: {}", e)))?;
        url.query_pairs_mut().append_pair("arg", arg);
        Ok(url)
    }

    async fn call(&self, command: &str, arg: &str) -> Result<Value> {
        let url = self.endpoint(command, arg)?;
        trace!("RPC {}", url);

        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| Error::rpc(format!("{} request failed: {}", command, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::rpc(format!("{} response unreadable: {}", command, e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(Error::rpc(format!("{} failed ({}): {}", command, status, message)));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl DaemonRpc for HttpRpcClient {
    async fn get_config(&self, key: &str) -> Result<Value> {
        let value = self.call("config", key).await?;
        let response: ConfigResponse = serde_json::from_value(value)?;
        Ok(response.value)
    }

    async fn connect(&self, address: &str) -> Result<()> {
        self.call("swarm/connect", address).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(url: &str) -> HttpRpcClient {
        HttpRpcClient::new(Url::parse(url).unwrap(), Duration::from_secs(5)).unwrap()
    }

    async fn config_server(key: &str, value: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/config"))
            .and(query_param("arg", key))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Key": key,
                "Value": value,
            })))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_parse_relay_list() {
        let value = json!(["/ip4/1.2.3.4/tcp/4001/p2p/QmA", "/dnsaddr/relay.example/p2p/QmB"]);
        assert_eq!(
            parse_relay_list(&value).unwrap(),
            vec!["/ip4/1.2.3.4/tcp/4001/p2p/QmA", "/dnsaddr/relay.example/p2p/QmB"]
        );
        assert!(parse_relay_list(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_parse_relay_list_rejects_wrong_shapes() {
        assert!(parse_relay_list(&json!("not-a-list")).is_err());
        assert!(parse_relay_list(&json!(["ok", 42])).is_err());
    }

    #[tokio::test]
    async fn test_relay_list_via_rpc() {
        let server = config_server("Bootstrap", json!(["/ip4/1.2.3.4/tcp/4001"])).await;
        let rpc = client(&server.uri());

        assert_eq!(
            relay_list(&rpc, "Bootstrap").await.unwrap(),
            vec!["/ip4/1.2.3.4/tcp/4001"]
        );
    }

    #[test]
    fn test_endpoint_encodes_argument() {
        let rpc = client(DEFAULT_API_URL);
        let url = rpc.endpoint("swarm/connect", "/ip4/1.2.3.4/tcp/4001").unwrap();
        assert_eq!(url.path(), "/api/v0/swarm/connect");
        assert_eq!(
            url.query_pairs().next().map(|(k, v)| (k.into_owned(), v.into_owned())),
            Some(("arg".to_string(), "/ip4/1.2.3.4/tcp/4001".to_string()))
        );
    }

    #[test]
    fn test_endpoint_keeps_api_url_path_prefix() {
        let rpc = client("http://gateway.local/proxy");
        assert_eq!(rpc.api_url().as_str(), "http://gateway.local/proxy/");
        let url = rpc.endpoint("config", "Bootstrap").unwrap();
        assert_eq!(url.path(), "/proxy/api/v0/config");

        let rpc = client("http://gateway.local/proxy/");
        assert_eq!(
            rpc.endpoint("config", "Bootstrap").unwrap().path(),
            "/proxy/api/v0/config"
        );
    }

    #[tokio::test]
    async fn test_get_config_reads_value_field() {
        let server = config_server("Bootstrap", json!(["/ip4/1.2.3.4/tcp/4001"])).await;

        let rpc = client(&server.uri());
        let value = DaemonRpc::get_config(&rpc, "Bootstrap").await.unwrap();
        assert_eq!(value, json!(["/ip4/1.2.3.4/tcp/4001"]));
    }

    #[tokio::test]
    async fn test_connect_posts_address_to_swarm_connect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/swarm/connect"))
            .and(query_param("arg", "/ip4/10.0.0.1/tcp/4001/p2p/QmA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Strings": ["connect QmA success"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rpc = client(&server.uri());
        DaemonRpc::connect(&rpc, "/ip4/10.0.0.1/tcp/4001/p2p/QmA")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_uses_daemon_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/swarm/connect"))
            .and(query_param("arg", "/ip4/10.0.0.1/tcp/4001"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "Message": "dial backoff",
                "Code": 0,
                "Type": "error"
            })))
            .mount(&server)
            .await;

        let rpc = client(&server.uri());
        let err = DaemonRpc::connect(&rpc, "/ip4/10.0.0.1/tcp/4001")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Rpc { .. }));
        assert!(err.to_string().contains("dial backoff"));
    }
}
