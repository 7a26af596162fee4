//! # DVT Cluster SDK
//!
//! Reconstructs the current state of DVT operator clusters from the
//! append-only event history of the network contract, and classifies a
//! user's operators against the on-chain registry.
//!
//! ## Overview
//!
//! Cluster state (validator count, fee index, balance, active flag) only
//! exists as the payload of the last event that touched the cluster. The SDK
//! finds that event by scanning logs backward under providers that reject
//! large block ranges, then prices the cluster from live fee parameters.
//!
//! - **Scanning**: adaptive backward windows over six cluster event kinds
//! - **Resolution**: canonical `Cluster` snapshot plus required balance
//! - **Aggregation**: registered / nonregistered operator partition with pools
//!
//! ## Architecture
//!
//! Every component receives an explicit `Arc<dyn ChainReader>`:
//!
//! ```text
//! OperatorAggregator ── OperatorSource ── ChainReader
//!        │
//!        └── ProtocolContracts (registry, manager, views)
//!
//! ClusterStateResolver ── LogScanner ── ChainReader
//!        │
//!        └── ProtocolContracts (fee views)
//! ```
//!
//! Nothing is cached or persisted: each call builds a fresh point-in-time
//! snapshot pinned to the head block it read first.

// Core Types
/// Common types and data structures
pub mod types;
/// Contract bindings and event codecs
pub mod contracts;

// Chain access
/// Read-only JSON-RPC seam
pub mod chain_reader;
/// In-memory chain replay
pub mod fixture_reader;

// Reconstruction
/// Backward windowed event scan
pub mod log_scanner;
/// Cluster snapshot and required balance
pub mod cluster_resolver;
/// Upstream operator-network scan
pub mod operator_source;
/// Registered / nonregistered partition
pub mod operator_aggregator;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// Configuration loading
pub mod settings;
/// Block range helpers
pub mod utils;

pub use chain_reader::{ChainError, ChainReader, ProviderChainReader};
pub use cluster_resolver::{ClusterDetails, ClusterSource, ClusterStateResolver, ResolveError};
pub use contracts::{ContractAddresses, ProtocolContracts, RegistryOperator};
pub use fixture_reader::FixtureChainReader;
pub use log_scanner::{IncompleteReason, LogScanner, ScanConfig, ScanError, ScanOutcome};
pub use operator_aggregator::{AggregateError, OperatorAggregator, SkippedOperator, UserOperators};
pub use operator_source::{NetworkOperatorSource, OperatorSource, StaticOperatorSource};
pub use settings::Settings;
pub use types::{
    Cluster, ClusterEvent, ClusterEventData, ClusterEventKind, EventWindow, Operator, OperatorId,
    Pool, PoolStatus, RegisteredOperator, StepSchedule,
};
