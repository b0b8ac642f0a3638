//! Run reports written to disk.
//!
//! # Output Structure
//!
//! ```text
//! report_dir/
//! └── 2025-05-06/
//!     ├── 063000.json
//!     └── 203000.json
//! ```

pub mod json;
