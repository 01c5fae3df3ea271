//! Output generation.
//!
//! - [`table`]: unifies the field universe of a record set and writes it as a
//!   deterministic CSV file.

pub mod table;
