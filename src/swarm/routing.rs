// ABOUTME: Pool reconciliation: make the balancer's node set equal the wanted set.
// ABOUTME: Issues an add and/or a remove call only when there is something to change.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::balancer::{Balancer, BalancerError};
use crate::model::PoolAssignment;
use crate::types::Node;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutingChange {
    pub wanted: BTreeSet<Node>,
    pub added: BTreeSet<Node>,
    pub removed: BTreeSet<Node>,
}

impl RoutingChange {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// `(wanted - current, current - wanted)`
pub fn diff(current: &BTreeSet<Node>, wanted: &BTreeSet<Node>) -> (BTreeSet<Node>, BTreeSet<Node>) {
    (
        wanted.difference(current).cloned().collect(),
        current.difference(wanted).cloned().collect(),
    )
}

/// New nodes go in before old ones come out.
pub async fn reconcile_routing(
    balancer: &dyn Balancer,
    pool: &PoolAssignment,
    wanted: &BTreeSet<Node>,
) -> Result<RoutingChange, BalancerError> {
    let current = balancer.get_nodes(&pool.balancer, &pool.name).await?;
    let (added, removed) = diff(&current, wanted);

    if !added.is_empty() {
        balancer.add_nodes(&pool.balancer, &pool.name, &added).await?;
    }
    if !removed.is_empty() {
        balancer.remove_nodes(&pool.balancer, &pool.name, &removed).await?;
    }

    Ok(RoutingChange {
        wanted: wanted.clone(),
        added,
        removed,
    })
}
