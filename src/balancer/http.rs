// ABOUTME: Balancer client speaking JSON over HTTP/1.1 with hyper.
// ABOUTME: One connection per request; pools live under /pools/{pool}/nodes.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::net::TcpStream;

use crate::types::Node;

use super::{Balancer, BalancerError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a balancer's API listens.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    authority: String,
    base_path: String,
}

impl Endpoint {
    fn parse(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("http://")?;
        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, format!("/{}", path.trim_end_matches('/'))),
            None => (rest, String::new()),
        };
        if authority.is_empty() {
            return None;
        }
        let authority = if authority.contains(':') {
            authority.to_string()
        } else {
            format!("{authority}:80")
        };
        Some(Self {
            authority,
            base_path: if path == "/" { String::new() } else { path },
        })
    }

    fn nodes_path(&self, pool: &str) -> String {
        format!("{}/pools/{}/nodes", self.base_path, urlencoding::encode(pool))
    }
}

/// Balancers by name, as configured under `balancers:`.
pub struct HttpBalancer {
    endpoints: BTreeMap<String, String>,
}

impl HttpBalancer {
    pub fn new(endpoints: BTreeMap<String, String>) -> Self {
        Self { endpoints }
    }

    fn endpoint(&self, balancer: &str) -> Result<Endpoint, BalancerError> {
        let url = self
            .endpoints
            .get(balancer)
            .ok_or_else(|| BalancerError::UnknownBalancer(balancer.to_string()))?;
        Endpoint::parse(url).ok_or_else(|| BalancerError::Connection {
            balancer: balancer.to_string(),
            reason: format!("unsupported URL {url}"),
        })
    }

    async fn request(
        &self,
        balancer: &str,
        pool: &str,
        method: Method,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, BalancerError> {
        let endpoint = self.endpoint(balancer)?;
        let connection_error = |reason: String| BalancerError::Connection {
            balancer: balancer.to_string(),
            reason,
        };

        let exchange = async {
            let stream = TcpStream::connect(endpoint.authority.as_str())
                .await
                .map_err(|e| connection_error(e.to_string()))?;
            let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
                .await
                .map_err(|e| connection_error(format!("HTTP handshake failed: {e}")))?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    tracing::warn!("balancer connection error: {}", e);
                }
            });

            let req = Request::builder()
                .method(method)
                .uri(endpoint.nodes_path(pool))
                .header("Host", endpoint.authority.as_str())
                .header("Content-Type", "application/json")
                .body(Full::new(Bytes::from(body.unwrap_or_default())))
                .map_err(|e| connection_error(format!("failed to build request: {e}")))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| connection_error(format!("request failed: {e}")))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| connection_error(format!("failed to read response: {e}")))?
                .to_bytes();

            if !status.is_success() {
                return Err(BalancerError::Status {
                    balancer: balancer.to_string(),
                    pool: pool.to_string(),
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
            Ok::<_, BalancerError>(body)
        };

        tokio::time::timeout(REQUEST_TIMEOUT, exchange)
            .await
            .map_err(|_| connection_error(format!("no answer within {REQUEST_TIMEOUT:?}")))?
    }

    fn encode(nodes: &BTreeSet<Node>) -> Vec<u8> {
        let names: Vec<String> = nodes.iter().map(Node::to_string).collect();
        serde_json::to_vec(&names).unwrap_or_default()
    }
}

#[async_trait]
impl Balancer for HttpBalancer {
    async fn get_nodes(&self, balancer: &str, pool: &str) -> Result<BTreeSet<Node>, BalancerError> {
        let body = self.request(balancer, pool, Method::GET, None).await?;
        let names: Vec<String> =
            serde_json::from_slice(&body).map_err(|e| BalancerError::BadResponse {
                balancer: balancer.to_string(),
                reason: e.to_string(),
            })?;

        names
            .iter()
            .map(|name| {
                name.parse::<Node>().map_err(|e| BalancerError::BadResponse {
                    balancer: balancer.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn add_nodes(
        &self,
        balancer: &str,
        pool: &str,
        nodes: &BTreeSet<Node>,
    ) -> Result<(), BalancerError> {
        self.request(balancer, pool, Method::POST, Some(Self::encode(nodes)))
            .await?;
        Ok(())
    }

    async fn remove_nodes(
        &self,
        balancer: &str,
        pool: &str,
        nodes: &BTreeSet<Node>,
    ) -> Result<(), BalancerError> {
        self.request(balancer, pool, Method::DELETE, Some(Self::encode(nodes)))
            .await?;
        Ok(())
    }
}
