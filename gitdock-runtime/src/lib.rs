//! # gitdock-runtime
//!
//! Container runtime access and dependency-driven restarts.
//!
//! [`RuntimeChain`] picks the first reachable [`RuntimeBackend`] (runtime API,
//! `docker` command, or the local mirror). [`ContainerRestartEngine`] restarts
//! containers whose `restart-after` label lists a repository and reconciles
//! the local container mirror during discovery.

pub mod backend;
pub mod command;
pub mod error;
pub mod labels;
pub mod live;
pub mod restart;
pub mod select;
pub mod simulated;

pub use backend::{LabelFilter, RuntimeBackend, RuntimeContainer};
pub use error::RuntimeError;
pub use labels::{label_matches, label_tokens, DEPENDENCY_LABEL};
pub use restart::{ContainerRestartEngine, ContainerRestartResult, DiscoveryReport, RestartReport};
pub use select::{RuntimeChain, RuntimeConfig};
