//! Output formatting for CLI.

mod json;
mod text;

pub use json::{JsonFormatter, WatchEvent, snapshot_to_output};
pub use text::TextFormatter;
