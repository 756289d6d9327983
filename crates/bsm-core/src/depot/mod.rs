//! Steam (DepotDownloader) domain types.
//!
//! - `events` - raw protocol events recognized from downloader output
//! - `update` - interpreted stream items surfaced to callers

pub mod events;
pub mod update;

pub use events::{DepotEvent, DepotEventKind, ErrorEvent, EventCategory, InfoEvent, WarningEvent};
pub use update::{CodeKind, DepotUpdate};
