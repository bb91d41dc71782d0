//! Output bounding filter
//!
//! Caps captured stdout/stderr before it is handed back to a tool caller:
//! - Per-stream and combined character limits
//! - end / start / middle / smart truncation strategies
//! - Optional raw snapshots of the untouched text

pub mod types;
pub mod smart;
pub mod truncate;
pub mod limiter;

pub use limiter::{apply_output_limits, truncate_combined};
pub use smart::{classify_line, LineClass};
pub use truncate::truncate_text;
pub use types::{CommandOutput, OutputLimits, TruncateStrategy, DEFAULT_TRUNCATE_MESSAGE};
