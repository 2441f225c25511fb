//! # Sample and Row Format
//!
//! A [`Sample`] is one composed reading; a Row is its single-line text form
//! inside a day file. Field order is fixed:
//!
//! ```text
//! date, time, lat, lon, alt, <channel 1 values...>, <channel 2 values...>, [aux]
//! ```

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{PayloadDefect, Result, TelemetryError};
use crate::ingest::protocol::VALUE_SEPARATOR;

/// Date format of the first row field
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time format of the second row field
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Number of fields before the channel values
const FIXED_FIELDS: usize = 5;

/// Field delimiter, chosen once per deployment
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Delimiter {
    pub fn as_char(&self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Tab => '\t',
        }
    }

    /// Day file extension for this delimiter
    pub fn extension(&self) -> &'static str {
        match self {
            Delimiter::Comma => "CSV",
            Delimiter::Tab => "TSV",
        }
    }
}

/// Position fix in decimal degrees and meters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// Values reported by one channel for one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSeries {
    pub channel: String,
    pub values: Vec<String>,
}

impl ChannelSeries {
    /// Split a comma-delimited value series.
    pub fn from_series(channel: impl Into<String>, series: &str) -> Self {
        let values = if series.is_empty() {
            Vec::new()
        } else {
            series.split(VALUE_SEPARATOR).map(|v| v.trim().to_string()).collect()
        };
        Self {
            channel: channel.into(),
            values,
        }
    }
}

/// One fully composed reading
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: NaiveDateTime,
    pub location: Location,
    pub series: Vec<ChannelSeries>,
    pub aux: Option<String>,
}

impl Sample {
    /// Calendar day the sample belongs to
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Channel ordering and column labels of a deployment's rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    pub delimiter: Delimiter,
    /// `(channel name, column labels)` in row order
    pub channels: Vec<(String, Vec<String>)>,
    pub aux_column: Option<String>,
}

impl RowLayout {
    pub fn from_config(config: &Config) -> Self {
        Self {
            delimiter: config.storage.delimiter,
            channels: config
                .channels
                .iter()
                .map(|c| (c.name.clone(), c.columns.clone()))
                .collect(),
            aux_column: config.storage.aux_column.clone(),
        }
    }

    fn join(&self, fields: &[String]) -> String {
        let mut delimiter = [0u8; 4];
        fields.join(self.delimiter.as_char().encode_utf8(&mut delimiter))
    }

    /// Header line written once at the top of each day file
    pub fn header_line(&self) -> String {
        let mut fields: Vec<String> = ["date", "time", "lat", "lon", "alt"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for (_, columns) in &self.channels {
            fields.extend(columns.iter().cloned());
        }
        if let Some(aux) = &self.aux_column {
            fields.push(aux.clone());
        }
        self.join(&fields)
    }

    /// Serialize a sample into one row (no line terminator).
    pub fn format_row(&self, sample: &Sample) -> String {
        let mut fields = vec![
            sample.timestamp.format(DATE_FORMAT).to_string(),
            sample.timestamp.format(TIME_FORMAT).to_string(),
            format!("{:.6}", sample.location.latitude),
            format!("{:.6}", sample.location.longitude),
            format!("{:.1}", sample.location.altitude),
        ];
        for series in &sample.series {
            fields.extend(series.values.iter().cloned());
        }
        if self.aux_column.is_some() {
            fields.push(sample.aux.clone().unwrap_or_default());
        }
        self.join(&fields)
    }

    /// Parse a row back into a sample.
    ///
    /// Every channel but the last takes as many values as it has column
    /// labels; the last channel takes the rest.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::InvalidPayload` if the fixed fields are
    /// missing or unparseable.
    pub fn parse_row(&self, row: &str) -> Result<Sample> {
        let malformed = || TelemetryError::InvalidPayload(PayloadDefect::Malformed);
        let mut fields: Vec<&str> = row
            .trim_end_matches(['\r', '\n'])
            .split(self.delimiter.as_char())
            .collect();

        // Rows always carry the aux column when one is configured, even empty
        let required = FIXED_FIELDS + usize::from(self.aux_column.is_some());
        if fields.len() < required {
            return Err(malformed());
        }

        let aux = if self.aux_column.is_some() {
            fields.pop().filter(|v| !v.is_empty()).map(str::to_string)
        } else {
            None
        };

        let date = NaiveDate::parse_from_str(fields[0].trim(), DATE_FORMAT).map_err(|_| malformed())?;
        let time = NaiveTime::parse_from_str(fields[1].trim(), TIME_FORMAT).map_err(|_| malformed())?;
        let coordinate = |i: usize| fields[i].trim().parse::<f64>().map_err(|_| malformed());
        let location = Location {
            latitude: coordinate(2)?,
            longitude: coordinate(3)?,
            altitude: coordinate(4)?,
        };

        let mut rest = &fields[FIXED_FIELDS..];
        let mut series = Vec::with_capacity(self.channels.len());
        for (i, (name, columns)) in self.channels.iter().enumerate() {
            let take = if i + 1 == self.channels.len() {
                rest.len()
            } else {
                columns.len().min(rest.len())
            };
            let (values, tail) = rest.split_at(take);
            series.push(ChannelSeries {
                channel: name.clone(),
                values: values.iter().map(|v| v.trim().to_string()).collect(),
            });
            rest = tail;
        }

        Ok(Sample {
            timestamp: NaiveDateTime::new(date, time),
            location,
            series,
            aux,
        })
    }
}
