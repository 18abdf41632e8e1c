//! Discovery, state synchronization, token metadata, and the orchestrator
//! that composes them into a pass.

pub mod creator;
pub mod discovery;
pub mod orchestrator;
pub mod registry;
pub mod state;
pub mod tokens;

use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use creator::{CreatorDiscovery, CreatorReport};
pub use discovery::{ScanReport, ScanSettings};
pub use orchestrator::{ContractsOrchestrator, FamilySummary, PassSummary, SyncSettings};
pub use registry::RegistryDiscovery;
pub use state::{AddressFailure, AuxiliaryAddress, StateFetcher, UpdateReport};
pub use tokens::{TokenReport, TokenService};

/// Source of "now" for expiry decisions and row timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}
