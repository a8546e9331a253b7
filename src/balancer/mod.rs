// ABOUTME: Load balancer seam: read and edit the node set of a named pool.
// ABOUTME: Calls are set operations, so repeating one is harmless.

mod http;

pub use http::HttpBalancer;

use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::types::Node;

#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("unknown balancer: {0}")]
    UnknownBalancer(String),

    #[error("cannot reach balancer {balancer}: {reason}")]
    Connection { balancer: String, reason: String },

    #[error("balancer {balancer} answered {status} for pool {pool}: {body}")]
    Status {
        balancer: String,
        pool: String,
        status: u16,
        body: String,
    },

    #[error("unreadable response from balancer {balancer}: {reason}")]
    BadResponse { balancer: String, reason: String },
}

#[async_trait]
pub trait Balancer: Send + Sync {
    async fn get_nodes(&self, balancer: &str, pool: &str) -> Result<BTreeSet<Node>, BalancerError>;

    async fn add_nodes(
        &self,
        balancer: &str,
        pool: &str,
        nodes: &BTreeSet<Node>,
    ) -> Result<(), BalancerError>;

    async fn remove_nodes(
        &self,
        balancer: &str,
        pool: &str,
        nodes: &BTreeSet<Node>,
    ) -> Result<(), BalancerError>;
}
