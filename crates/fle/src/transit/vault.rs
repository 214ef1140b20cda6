//! [`VaultTransit`]: HTTP client for a Vault transit secrets engine.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use common::protocol::{TransitErrorBody, TransitRequest, TransitResponse};
use http_body_util::{BodyExt, Full};
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    Method, Request, StatusCode,
};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tracing::debug;

use super::{KeyService, KeyServiceError};

/// Default mount point of the transit engine.
pub const DEFAULT_MOUNT: &str = "transit";

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Vault transit client.
///
/// Cheap to clone; clones share one connection pool. Retries, token renewal
/// and timeouts are left to the deployment (proxy, agent, or caller).
#[derive(Clone)]
pub struct VaultTransit {
    client: HttpsClient,
    addr: String,
    token: String,
    mount: String,
    namespace: Option<String>,
}

impl VaultTransit {
    /// Create a client for the Vault server at `addr` (e.g. `https://vault:8200`).
    pub fn new(addr: impl Into<String>, token: impl Into<String>) -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);

        Self {
            client,
            addr: addr.into().trim_end_matches('/').to_owned(),
            token: token.into(),
            mount: DEFAULT_MOUNT.to_owned(),
            namespace: None,
        }
    }

    /// Use a transit engine mounted somewhere other than `transit/`.
    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into().trim_matches('/').to_owned();
        self
    }

    /// Send requests to a Vault Enterprise namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// URL of `<mount>/<operation>/<key_name>`.
    fn endpoint(&self, operation: &str, key_name: &str) -> String {
        format!("{}/v1/{}/{}/{}", self.addr, self.mount, operation, key_name)
    }

    async fn write(
        &self,
        operation: &str,
        key_name: &str,
        request: &TransitRequest,
    ) -> Result<TransitResponse, KeyServiceError> {
        let url = self.endpoint(operation, key_name);
        let body = serde_json::to_vec(request)
            .map_err(|e| KeyServiceError::Transport(format!("failed to encode request: {e}")))?;

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(&url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(TOKEN_HEADER, &self.token);
        if let Some(ns) = &self.namespace {
            builder = builder.header(NAMESPACE_HEADER, ns);
        }
        let req = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| KeyServiceError::Transport(format!("invalid request: {e}")))?;

        debug!(
            operation,
            key_name,
            items = request.batch_input.len(),
            "sending transit batch"
        );

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| KeyServiceError::Transport(e.to_string()))?;

        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| KeyServiceError::Transport(format!("failed to read response body: {e}")))?
            .to_bytes();

        parse_response(status, &bytes)
    }
}

/// Interpret a transit response: status, JSON shape, and per-item errors.
fn parse_response(status: StatusCode, body: &[u8]) -> Result<TransitResponse, KeyServiceError> {
    if !status.is_success() {
        let errors = serde_json::from_slice::<TransitErrorBody>(body)
            .map(|b| b.errors)
            .unwrap_or_default();
        return Err(KeyServiceError::Status {
            status: status.as_u16(),
            errors,
        });
    }

    let parsed: TransitResponse = serde_json::from_slice(body)
        .map_err(|e| KeyServiceError::MalformedResponse(e.to_string()))?;

    if let Some((index, message)) = parsed
        .data
        .batch_results
        .iter()
        .enumerate()
        .find_map(|(i, r)| r.error.as_ref().map(|m| (i, m.clone())))
    {
        return Err(KeyServiceError::ItemFailed { index, message });
    }

    Ok(parsed)
}

#[async_trait]
impl KeyService for VaultTransit {
    async fn encrypt(
        &self,
        key_name: &str,
        request: TransitRequest,
    ) -> Result<TransitResponse, KeyServiceError> {
        self.write("encrypt", key_name, &request).await
    }

    async fn decrypt(
        &self,
        key_name: &str,
        request: TransitRequest,
    ) -> Result<TransitResponse, KeyServiceError> {
        self.write("decrypt", key_name, &request).await
    }
}

impl fmt::Debug for VaultTransit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the token.
        f.debug_struct("VaultTransit")
            .field("addr", &self.addr)
            .field("mount", &self.mount)
            .field("namespace", &self.namespace)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
