//! Pipeline components: discovery, orchestration, streaming, backups.

pub mod backup;
pub mod context;
pub mod discover;
pub mod orchestrator;
pub mod streaming;

pub use backup::BackupWriter;
pub use context::RunContext;
pub use discover::{DiscoverOptions, Discovered, category_for, discover_files};
pub use orchestrator::{ProgressFn, process_files};
pub use streaming::{StagedReplace, stage_transform, stage_transform_default};
