//! # gitdock-sync
//!
//! Repository working-copy synchronisation.
//!
//! [`RepositorySyncEngine::sync`] clones or fast-forwards one registered
//! repository into the root found by [`PathResolver`], provisioning the active
//! signing key for SSH URLs and classifying any git failure.

pub mod classify;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod git;
pub mod paths;
pub mod url;

pub use credentials::{generate_key_pair, CredentialProvisioner, ProvisionedKey};
pub use engine::{RepositorySyncEngine, SyncConfig, SyncReport};
pub use error::SyncError;
pub use git::GitRunner;
pub use paths::{PathResolver, PathSource, ResolvedPath};
