//! # Storage Module
//!
//! On-media queue of rows waiting for upload.
//!
//! This module handles:
//! - Day-keyed file naming that sorts chronologically
//! - Appending rows (with a header line per new file)
//! - Listing, reading and deleting pending files

pub mod durable_log;

pub use durable_log::{DateKey, DurableLog};
