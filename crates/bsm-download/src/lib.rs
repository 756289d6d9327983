#![doc = include_str!("../README.md")]

pub mod depot;
pub mod oculus;
mod slot;
mod stream;

// Re-export commonly used types for convenience
pub use depot::{DepotConfig, DepotDownloadRequest, DepotEngine, DepotEventStream, DepotPhase};
pub use oculus::{OculusConfig, OculusDownloadRequest, OculusEngine, OculusProgressStream};
pub use stream::{DownloadStream, StreamEnd};
