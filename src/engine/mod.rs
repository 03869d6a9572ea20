//! Engine module: CLI surface and progress display.

pub mod arg_parser;
pub mod handlers;
pub mod progress;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use handlers::handle_run;
pub use progress::{ProgressBar, create_progress_bar, progress_sink, update_bar_to};
