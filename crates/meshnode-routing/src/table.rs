//! # Routing Table
//!
//! Longest-prefix-match lookup over hierarchical addresses, with static
//! routes and follow-graph-derived routes coexisting at different
//! prefixes. At most one entry is kept per `(prefix, source)` pair; a
//! static route at the same prefix as a follow-graph route always wins.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use meshnode_core::{Address, PeerId};

/// Where a route came from — decides the tie-break at equal prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteSource {
    Static,
    FollowGraph,
}

/// A single routing table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub prefix: Address,
    pub next_hop: PeerId,
    pub priority: i32,
    pub source: RouteSource,
}

/// A node declared in the topology used for `validateReachability` and
/// `detectDisconnected`.
#[derive(Debug, Clone)]
pub struct TopologyNode {
    pub node: PeerId,
    pub declared_peers: Vec<PeerId>,
}

/// A reachability problem found while validating the table against a
/// topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReachabilityIssue {
    /// A route's next hop is not a declared peer of this node.
    UnreachableNextHop { prefix: Address, next_hop: PeerId },
    /// A route names a peer that does not exist anywhere in the topology.
    UndeclaredPeer { prefix: Address, next_hop: PeerId },
}

/// Longest-prefix-match routing table.
///
/// Insertion order is preserved per `(prefix, source)` key so that the
/// final tie-break — insertion order — is deterministic across two
/// nodes built from the same configuration in the same order.
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: HashMap<(Address, RouteSource), Route>,
    insertion_order: Vec<(Address, RouteSource)>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a route by `(prefix, source)`.
    pub fn insert(&mut self, route: Route) {
        let key = (route.prefix.clone(), route.source);
        if !self.routes.contains_key(&key) {
            self.insertion_order.push(key.clone());
        }
        self.routes.insert(key, route);
    }

    pub fn remove(&mut self, prefix: &Address, source: RouteSource) {
        let key = (prefix.clone(), source);
        self.routes.remove(&key);
        self.insertion_order.retain(|k| k != &key);
    }

    /// Longest-prefix-match lookup. Ties are broken by source (static
    /// beats follow-graph), then by insertion order.
    pub fn lookup(&self, address: &Address) -> Option<&PeerId> {
        let mut best: Option<&Route> = None;
        for key in &self.insertion_order {
            let Some(route) = self.routes.get(key) else {
                continue;
            };
            if !route.prefix.is_prefix_of(address) {
                continue;
            }
            best = Some(match best {
                None => route,
                Some(current) => pick_better(current, route, &self.insertion_order),
            });
        }
        best.map(|r| &r.next_hop)
    }

    /// Confirm every route's next hop is a peer this node has declared,
    /// and that declared peers exist somewhere in the topology.
    pub fn validate_reachability(&self, declared_peers: &[PeerId]) -> Vec<ReachabilityIssue> {
        let mut issues = Vec::new();
        for route in self.routes.values() {
            if !declared_peers.contains(&route.next_hop) {
                issues.push(ReachabilityIssue::UnreachableNextHop {
                    prefix: route.prefix.clone(),
                    next_hop: route.next_hop.clone(),
                });
            }
        }
        issues
    }

    /// Nodes in the topology with no outbound peer declarations.
    pub fn detect_disconnected(topology: &[TopologyNode]) -> Vec<PeerId> {
        topology
            .iter()
            .filter(|n| n.declared_peers.is_empty())
            .map(|n| n.node.clone())
            .collect()
    }
}

/// Longer prefix wins; equal length breaks by source (static > follow-graph),
/// then by insertion order (earlier wins).
fn pick_better<'a>(a: &'a Route, b: &'a Route, order: &[(Address, RouteSource)]) -> &'a Route {
    let a_len = a.prefix.segment_count();
    let b_len = b.prefix.segment_count();
    if a_len != b_len {
        return if a_len > b_len { a } else { b };
    }
    match (a.source, b.source) {
        (RouteSource::Static, RouteSource::FollowGraph) => a,
        (RouteSource::FollowGraph, RouteSource::Static) => b,
        _ => {
            let a_pos = order.iter().position(|k| k.0 == a.prefix && k.1 == a.source);
            let b_pos = order.iter().position(|k| k.0 == b.prefix && k.1 == b.source);
            if a_pos <= b_pos {
                a
            } else {
                b
            }
        }
    }
}
