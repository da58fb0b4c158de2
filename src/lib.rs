//! # duckdb-postal
//!
//! DuckDB extension for international address parsing and normalization,
//! backed by libpostal.
//!
//! ## SQL functions
//!
//! - **`postal_parse(VARCHAR)`**: labelled components as `MAP(VARCHAR, VARCHAR)`
//! - **`postal_normalize(VARCHAR)`**: normalized variants as `VARCHAR[]`
//! - **`postal_data_dir(VARCHAR)`**: load libpostal's models from a directory
//!
//! ## Quick Start
//!
//! ```sql
//! LOAD 'postal.duckdb_extension';
//! SELECT postal_data_dir('/usr/share/libpostal');
//!
//! SELECT postal_parse('123 Main St, Springfield');
//! -- {house_number=123, road=main st, city=springfield}
//!
//! SELECT postal_normalize('123 Main St');
//! -- [123 main street, 123 main saint]
//! ```
//!
//! libpostal is set up on first use from `LIBPOSTAL_DATA_DIR` or the
//! platform data directory unless `postal_data_dir` ran first.
//!
//! The marshaling from rows to list columns lives in [`batch`] and works
//! with any [`batch::Transform`], so the crate is also usable without DuckDB:
//!
//! ```rust,no_run
//! use duckdb_postal::AddressParser;
//!
//! let batch = AddressParser::new().parse_batch(&["123 Main St, Springfield"])?;
//! for (label, value) in batch.row(0).unwrap_or_default() {
//!     println!("{label}: {value}");
//! }
//! # Ok::<(), duckdb_postal::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod batch;
pub mod data;
pub mod error;
pub mod extension;
pub mod ffi;
pub mod normalizer;
pub mod parser;

// Re-export main API
pub use batch::{process_batch, BatchSummary, InputBatch, ListBatch, ListEntry, Transform};
pub use error::{Error, Result};
pub use normalizer::AddressNormalizer;
pub use parser::{AddressComponent, AddressParser};
