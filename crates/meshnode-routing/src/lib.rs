//! # meshnode-routing — Routing Table and Follow-Graph Router
//!
//! Two cooperating pieces of routing state:
//!
//! - [`table::RoutingTable`] — longest-prefix-match lookup over static
//!   and follow-graph-derived routes.
//! - [`follow_graph::FollowGraphRouter`] — ingests signed follow events
//!   and feeds the follow-graph side of the table.
//!
//! The forwarding engine consults the routing table directly; the
//! follow-graph router is kept separate so the tie-break policy in
//! `RoutingTable::lookup` stays deterministic regardless of how a
//! follow-graph route was derived.

pub mod follow_graph;
pub mod table;

pub use follow_graph::{FollowEvent, FollowGraphError, FollowGraphRouter};
pub use table::{ReachabilityIssue, Route, RouteSource, RoutingTable, TopologyNode};
