//! Version checks and version swaps.
//!
//! [`UpdateCoordinator`] applies a version to an instance with
//! restart-if-running semantics. The manifest types describe the upstream
//! version list that new versions are discovered from; fetching it is left to
//! a caller-provided [`ManifestSource`].
mod coordinator;
pub mod manifest;

pub use coordinator::{UpdateCoordinator, UpdateOutcome, UpdateTransaction};
pub use manifest::{ManifestSource, VersionManifest};
