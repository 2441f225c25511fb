//! # Field Telemetry Node Library
//!
//! Store-and-forward telemetry for a remote soil sensor station.
//!
//! This library reassembles channel frames from a chunked sensor bus, stamps
//! them with network time and GNSS position, keeps the resulting rows in
//! day files on local storage, and drains those files to an HTTP endpoint
//! through a cellular modem's AT command interface.

pub mod config;
pub mod error;
pub mod ingest;
pub mod modem;
pub mod record;
pub mod serial;
pub mod storage;
pub mod transport;
pub mod upload;
