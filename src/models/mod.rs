//! Data types shared across the pipeline

pub mod fingerprint;
pub mod icon;

pub use fingerprint::Fingerprint;
pub use icon::{IconCandidate, ResolvedIconUrl, ScaledImage};
