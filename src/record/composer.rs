//! # Sample Composer
//!
//! Merges Ready frames, a timestamp and a location into one [`Sample`].
//!
//! Missing upstream data never fails a composition: without a clock reading
//! the host clock is used, and without a fix the last known location (zeros
//! before the first fix) is used.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use tracing::{debug, warn};

use super::sample::{ChannelSeries, Location, Sample};
use crate::ingest::FrameAssembler;

/// Source of the sample timestamp
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TimeSource: Send {
    /// Current time, or `None` when the source has no usable reading
    async fn now(&mut self) -> Option<NaiveDateTime>;
}

/// Source of the sample position
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocationSource: Send {
    /// Current fix, or `None` when there is none
    async fn fix(&mut self) -> Option<Location>;
}

/// Builds samples and remembers the last known location
#[derive(Debug, Clone, Default)]
pub struct SampleComposer {
    last_location: Location,
    aux: Option<String>,
}

impl SampleComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last location handed out (zeros until the first fix).
    pub fn last_location(&self) -> Location {
        self.last_location
    }

    /// Set the auxiliary value attached to the next sample.
    pub fn set_aux(&mut self, aux: Option<String>) {
        self.aux = aux;
    }

    /// Compose a sample if every channel is Ready.
    ///
    /// Returns `None` without touching the assembler (or calling either
    /// source) when a channel is still assembling or not yet Ready. On
    /// success every composed channel is back to Idle.
    pub async fn try_compose<C, L>(
        &mut self,
        assembler: &mut FrameAssembler,
        clock: &mut C,
        gnss: &mut L,
    ) -> Option<Sample>
    where
        C: TimeSource + ?Sized,
        L: LocationSource + ?Sized,
    {
        let frames = assembler.take_ready()?;

        let series = frames
            .iter()
            .map(|frame| ChannelSeries::from_series(frame.channel.clone(), &frame.value_series()))
            .collect();

        let timestamp = match clock.now().await {
            Some(ts) => ts,
            None => {
                warn!("No timestamp from clock source, using host clock");
                Utc::now().naive_utc()
            }
        };

        match gnss.fix().await {
            Some(location) => self.last_location = location,
            None => warn!("No location fix, reusing last known location"),
        }

        let sample = Sample {
            timestamp,
            location: self.last_location,
            series,
            aux: self.aux.take(),
        };
        debug!("Composed sample at {}", sample.timestamp);
        Some(sample)
    }
}
