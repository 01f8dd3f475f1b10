//! Rendering search reports and history.
//!
//! # Submodules
//!
//! - [`markdown`]: terminal-friendly Markdown for reports and history listings
//! - [`json`]: writes a [`crate::orchestrator::SearchReport`] to disk
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── ai.json
//!     └── 台積電.json
//! ```

pub mod json;
pub mod markdown;
