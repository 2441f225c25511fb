//! # Record Module
//!
//! Canonical sample records and their text encodings.
//!
//! This module handles:
//! - Composing Ready frames, time and location into a sample
//! - Serializing samples as delimited rows (and parsing them back)
//! - Encoding rows into numbered endpoint fields

pub mod composer;
pub mod query;
pub mod sample;

pub use composer::{LocationSource, SampleComposer, TimeSource};
pub use sample::{ChannelSeries, Delimiter, Location, RowLayout, Sample};
