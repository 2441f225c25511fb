//! # Ingest Module
//!
//! Sensor-side chunk ingestion.
//!
//! This module handles:
//! - Chunk protocol constants and frame types
//! - Per-channel frame reassembly with the short-fragment heuristic
//! - Reading bus packets on a dedicated task and queueing them as chunks

pub mod assembler;
pub mod bus;
pub mod protocol;

pub use assembler::FrameAssembler;
pub use bus::BusReader;
pub use protocol::{ChannelId, ChannelSpec, ChunkOutcome, Frame, ReadyFrame};
