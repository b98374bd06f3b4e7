//! Node selection adapter
//!
//! Wraps the node selector and enforces the replication policy on what it
//! returns. The underlying selector may hand back fewer nodes than asked for;
//! this is the one place that turns that into a hard failure.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};
use crate::types::{EndpointSet, NodeInfo, ReplicationPolicy};

/// Reduce raw selector output to the usable endpoints for `policy`.
///
/// Drops nodes rejected by the policy filter and duplicate URLs (a node listed
/// twice does not hold two replicas), keeping the selector's order. Fails with
/// `InsufficientReplicas` when fewer than `replica_count` remain.
pub fn enforce_policy(nodes: Vec<NodeInfo>, policy: &ReplicationPolicy) -> Result<EndpointSet> {
    let returned = nodes.len();
    let mut seen = HashSet::new();

    let usable: Vec<NodeInfo> = nodes
        .into_iter()
        .filter(|node| policy.filter().map_or(true, |f| f.accepts(node)))
        .filter(|node| seen.insert(node.url.clone()))
        .collect();

    if usable.len() < returned {
        debug!(
            returned,
            usable = usable.len(),
            "Discarded filtered or duplicate nodes"
        );
    }

    let required = policy.replica_count().max(policy.min_nodes());
    if usable.len() < required {
        warn!(
            required,
            available = usable.len(),
            "Not enough storage nodes for replication policy"
        );
        return Err(OrchestratorError::InsufficientReplicas {
            required,
            available: usable.len(),
        });
    }

    EndpointSet::new(usable).ok_or(OrchestratorError::InsufficientReplicas {
        required,
        available: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeFilter;

    fn nodes(urls: &[&str]) -> Vec<NodeInfo> {
        urls.iter().map(|u| NodeInfo::new(*u)).collect()
    }

    #[test]
    fn test_enough_nodes_keeps_order() {
        let policy = ReplicationPolicy::new(2).unwrap();
        let set = enforce_policy(nodes(&["http://b", "http://a", "http://c"]), &policy).unwrap();
        assert_eq!(set.urls(), vec!["http://b", "http://a", "http://c"]);
    }

    #[test]
    fn test_empty_selection_fails() {
        let policy = ReplicationPolicy::new(1).unwrap();
        let err = enforce_policy(vec![], &policy).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InsufficientReplicas {
                required: 1,
                available: 0
            }
        ));
    }

    #[test]
    fn test_fewer_than_replica_count_fails() {
        let policy = ReplicationPolicy::new(3).unwrap();
        let err = enforce_policy(nodes(&["http://a", "http://b"]), &policy).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InsufficientReplicas {
                required: 3,
                available: 2
            }
        ));
    }

    #[test]
    fn test_duplicates_do_not_count_as_replicas() {
        let policy = ReplicationPolicy::new(2).unwrap();
        let err = enforce_policy(nodes(&["http://a", "http://a"]), &policy).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InsufficientReplicas { available: 1, .. }
        ));
    }

    #[test]
    fn test_filter_is_enforced_locally() {
        let policy = ReplicationPolicy::new(1)
            .unwrap()
            .with_filter(NodeFilter::new(|n| n.url.starts_with("https://")));

        let set = enforce_policy(nodes(&["http://a", "https://b"]), &policy).unwrap();
        assert_eq!(set.urls(), vec!["https://b"]);

        assert!(enforce_policy(nodes(&["http://a"]), &policy).is_err());
    }
}
