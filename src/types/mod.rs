//! Common types shared by the scanner, resolver and aggregator.

pub mod cluster;
pub mod conversions;
pub mod operator;
pub mod window;

pub use cluster::{Cluster, ClusterEvent, ClusterEventData, ClusterEventKind, OperatorId};
pub use operator::{Operator, Pool, PoolStatus, RegisteredOperator};
pub use window::{EventWindow, StepSchedule};
