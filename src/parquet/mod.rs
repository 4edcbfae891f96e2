//! Handles serialising and saving emissions tables to disk in the _parquet_ file format.

pub mod table;

pub use table::{load_table, save_table};
