//! Spreadsheet import for Lencana.
//!
//! Turns an uploaded roster (Excel, ODS or CSV) into registration batches:
//! read the first sheet, find the header row, guess which column holds
//! which field, normalise the rows, then group them per school. Pure apart
//! from reading the file.
//!
//! # Quick start
//!
//! ```no_run
//! use lencana_import::{ImportDefaults, ImportSession};
//!
//! let defaults = ImportDefaults { school: "SK BUKIT".into(), code: None };
//! let session = ImportSession::open("senarai.xlsx", defaults).unwrap();
//! println!("{} rows, header at {:?}", session.rows().len(), session.header_row());
//! ```

pub mod detect;
pub mod error;
pub mod grid;
pub mod group;
pub mod rows;
pub mod session;

pub use detect::{ColumnMapping, Field, detect_columns, detect_header};
pub use error::{Error, Result};
pub use grid::{Grid, read_grid};
pub use group::group_batches;
pub use rows::{ImportDefaults, ImportRow, normalize_rows};
pub use session::ImportSession;
