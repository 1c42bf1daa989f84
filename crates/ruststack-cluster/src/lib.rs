//! Cluster membership, leader routing, and synchronous quorum replication.
//!
//! A [`Cluster`] knows its own ordinal, enumerates peer URLs from the
//! StatefulSet DNS pattern, probes peer health to pick a leader, proxies
//! mutating requests to that leader when this node is a follower, and fans
//! out replication calls to peers requiring majority acknowledgement.
//!
//! Leadership here is a stateless routing hint, not a consensus protocol:
//! each probe is independent and there is no fencing across transitions.
//! See the daemon's design notes for the accepted split-brain risk.

mod cluster;
mod config;

pub use cluster::{Cluster, ProxiedResponse, Surface};
pub use config::{ClusterConfig, INTERNAL_REPLICATION_HEADER, parse_ordinal};
