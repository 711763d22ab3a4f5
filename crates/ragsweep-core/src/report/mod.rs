pub mod console;
pub mod progress;

pub use progress::{format_progress_line, ProgressEvent, ProgressSink};
