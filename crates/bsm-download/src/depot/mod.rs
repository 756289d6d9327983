//! Steam acquisition through the external `DepotDownloader` tool.
//!
//! - `protocol` - `[Category]|[SubType]|payload` line parser
//! - `process` - lazily spawned, shared stdout line stream with stdin access
//! - `args` - option-to-argv builder
//! - `config` - executable location and Steam ids
//! - `engine` - the state machine behind `download` / `send_input` / `stop`

mod args;
mod config;
mod engine;
mod process;
mod protocol;

pub use args::{ArgValue, DepotArgs, build_args};
pub use config::{DEFAULT_APP_ID, DEFAULT_DEPOT_ID, DepotConfig};
pub use engine::{DepotDownloadRequest, DepotEngine, DepotEventStream, DepotPhase};
pub use process::{DepotProcess, LineSubscription, ProcessError, ProcessOutput, SpawnOptions};
pub use protocol::{parse_line, parse_percent};
