pub mod breakpoints;
pub mod error;
pub mod id_resolver;
pub mod input;
pub mod mapping_store;
pub mod overrides;
pub mod progress;
pub mod report;
pub mod run_lock;
pub mod run_log;
pub mod store;
pub mod sync;
pub mod translate;

#[cfg(test)]
mod testing;

pub use breakpoints::{compute_breakpoints, BreakpointBuilder};
pub use error::{StoreError, SyncError, SyncResult};
pub use id_resolver::{IdentifierResolver, ResolveContext, ResolveStrategy, Step};
pub use input::parse_source_show_id;
pub use mapping_store::MappingStore;
pub use overrides::OverrideStore;
pub use progress::ProgressTracker;
pub use report::{RunKind, RunStatus, SyncReport, Translation};
pub use run_lock::{RunLease, RunLock};
pub use run_log::{RunLog, RunRecord};
pub use store::{KeyValueStore, MemoryStore, SqliteStore, Store};
pub use sync::{EngineStatus, ShowInspection, SyncEngine, SyncOptions, SyncServices, SyncSettings};
pub use translate::translate;
