#![doc = include_str!("../README.md")]

pub mod depot;
pub mod errors;
pub mod identity;
pub mod progress;

// Re-export commonly used types for convenience
pub use depot::{
    CodeKind, DepotEvent, DepotEventKind, DepotUpdate, ErrorEvent, EventCategory, InfoEvent,
    WarningEvent,
};
pub use errors::{AcquireError, AcquireResult, ErrorCategory, ManifestError};
pub use identity::BuildIdentity;
pub use progress::Progression;
