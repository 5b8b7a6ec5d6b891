//! Bitcoin Core JSON-RPC client over HTTP

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use url::Url;

use super::source::NodeDataSource;
use crate::config::NodeSettings;
use crate::core::{Block, BlockHeader, NodeError};

/// JSON-RPC request as accepted by bitcoind
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// Basic-auth credentials for the RPC port
#[derive(Clone)]
pub struct RpcCredentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for RpcCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcCredentials")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl RpcCredentials {
    /// Reads a bitcoind `.cookie` file (`user:password` on one line)
    pub fn from_cookie_file(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Credentials(format!("{}: {}", path.display(), e)))?;
        let (user, password) = content
            .trim()
            .split_once(':')
            .ok_or_else(|| NodeError::Credentials(format!("{}: expected user:password", path.display())))?;
        Ok(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    fn from_settings(settings: &NodeSettings) -> Result<Option<Self>, NodeError> {
        if let Some(user) = &settings.rpc_user {
            return Ok(Some(Self {
                user: user.clone(),
                password: settings.rpc_password.clone().unwrap_or_default(),
            }));
        }
        match &settings.cookie_file {
            Some(path) => Self::from_cookie_file(path).map(Some),
            None => Ok(None),
        }
    }
}

/// Node session: one HTTP client bound to one endpoint and credential set
pub struct RpcNodeClient {
    client: Client,
    url: Url,
    credentials: Option<RpcCredentials>,
    request_id: AtomicU64,
}

impl std::fmt::Debug for RpcNodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcNodeClient")
            .field("url", &self.url.as_str())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl RpcNodeClient {
    pub fn new(settings: &NodeSettings) -> Result<Self, NodeError> {
        let url = Url::parse(&settings.rpc_url)
            .map_err(|e| NodeError::Endpoint(format!("{}: {}", settings.rpc_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(NodeError::Endpoint(format!(
                "{}: scheme must be http or https",
                settings.rpc_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        let credentials = RpcCredentials::from_settings(settings)?;

        info!(url = %url, authenticated = credentials.is_some(), "node RPC client ready");
        Ok(Self {
            client,
            url,
            credentials,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, NodeError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "1.0",
            id,
            method,
            params,
        };
        debug!(id, method, "sending RPC request");

        let mut builder = self.client.post(self.url.clone()).json(&request);
        if let Some(credentials) = &self.credentials {
            builder = builder.basic_auth(&credentials.user, Some(&credentials.password));
        }
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        decode_response(method, status.as_u16(), &body)
    }
}

/// Interprets a bitcoind reply; RPC failures arrive with non-2xx statuses and a JSON body
pub(crate) fn decode_response<T: DeserializeOwned>(
    method: &str,
    status: u16,
    body: &str,
) -> Result<T, NodeError> {
    let envelope: JsonRpcResponse = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(source) => {
            if !(200..300).contains(&status) {
                return Err(NodeError::HttpStatus {
                    status,
                    body: body.chars().take(200).collect(),
                });
            }
            return Err(NodeError::Decode {
                context: format!("{} response", method),
                source,
            });
        }
    };

    if let Some(error) = envelope.error {
        return Err(NodeError::Rpc {
            method: method.to_string(),
            code: error.code,
            message: error.message,
        });
    }

    match envelope.result {
        None | Some(Value::Null) => Err(NodeError::MissingResult(method.to_string())),
        Some(result) => serde_json::from_value(result).map_err(|source| NodeError::Decode {
            context: format!("{} result", method),
            source,
        }),
    }
}

#[async_trait]
impl NodeDataSource for RpcNodeClient {
    async fn get_chain_height(&self) -> Result<u64, NodeError> {
        self.call("getblockcount", json!([])).await
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, NodeError> {
        self.call("getblockhash", json!([height])).await
    }

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, NodeError> {
        self.call("getblockheader", json!([hash, true])).await
    }

    #[instrument(skip(self))]
    async fn get_block(&self, hash: &str, verbosity: u8) -> Result<Block, NodeError> {
        self.call("getblock", json!([hash, verbosity])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_request_shape() {
        let request = JsonRpcRequest {
            jsonrpc: "1.0",
            id: 7,
            method: "getblockhash",
            params: json!([820000]),
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({"jsonrpc": "1.0", "id": 7, "method": "getblockhash", "params": [820000]})
        );
    }

    #[test]
    fn test_decode_success() {
        let height: u64 =
            decode_response("getblockcount", 200, r#"{"result":820123,"error":null,"id":1}"#).unwrap();
        assert_eq!(height, 820123);

        let header: BlockHeader = decode_response(
            "getblockheader",
            200,
            r#"{"result":{"hash":"00ab","height":5,"time":1702598400,"confirmations":3},"error":null,"id":2}"#,
        )
        .unwrap();
        assert_eq!(header.height, 5);
        assert_eq!(header.timestamp, 1702598400);
    }

    #[test]
    fn test_decode_rpc_error_on_500() {
        let err = decode_response::<String>(
            "getblockhash",
            500,
            r#"{"result":null,"error":{"code":-8,"message":"Block height out of range"},"id":3}"#,
        )
        .unwrap_err();
        match err {
            NodeError::Rpc { method, code, message } => {
                assert_eq!(method, "getblockhash");
                assert_eq!(code, -8);
                assert_eq!(message, "Block height out of range");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_non_json_failure() {
        let err = decode_response::<u64>("getblockcount", 401, "Unauthorized").unwrap_err();
        assert!(matches!(err, NodeError::HttpStatus { status: 401, .. }));

        let err = decode_response::<u64>("getblockcount", 200, "garbage").unwrap_err();
        assert!(matches!(err, NodeError::Decode { .. }));

        let err = decode_response::<u64>("getblockcount", 200, r#"{"result":null,"error":null,"id":1}"#)
            .unwrap_err();
        assert!(matches!(err, NodeError::MissingResult(_)));
    }

    #[test]
    fn test_cookie_credentials() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "__cookie__:s3cr3t\n").unwrap();
        let credentials = RpcCredentials::from_cookie_file(file.path()).unwrap();
        assert_eq!(credentials.user, "__cookie__");
        assert_eq!(credentials.password, "s3cr3t");
        assert!(!format!("{:?}", credentials).contains("s3cr3t"));
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let settings = NodeSettings {
            rpc_url: "ssh://192.168.1.99".to_string(),
            ..Default::default()
        };
        assert!(matches!(RpcNodeClient::new(&settings), Err(NodeError::Endpoint(_))));

        let settings = NodeSettings {
            rpc_url: "http://192.168.1.99:8332".to_string(),
            rpc_user: Some("oracle".to_string()),
            rpc_password: Some("pw".to_string()),
            ..Default::default()
        };
        let client = RpcNodeClient::new(&settings).unwrap();
        assert_eq!(client.url().port(), Some(8332));
    }
}
