pub mod config;
pub mod fd_limit;
pub mod logger;
pub mod retexer_toml;
pub mod tempfiles;

pub use config::*;
pub use fd_limit::{FDS_PER_LANE, max_lanes_by_fd_limit, max_open_fds};
pub use logger::setup_logging;
pub use tempfiles::{temp_path_for, write_atomic};
