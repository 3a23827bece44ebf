//! CLI command handlers, one per file.

mod checksum;
mod completions;
mod history;
mod mark;
mod recover;
mod status;

pub use checksum::run_checksum;
pub use completions::run_completions;
pub use history::run_history;
pub use mark::{run_mark, MarkArgs};
pub use recover::run_recover;
pub use status::run_status;
