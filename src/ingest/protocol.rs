//! # Chunk Protocol Constants and Types
//!
//! Definitions for the sensor bus chunk protocol.
//!
//! The sensor master pushes each logical message as a series of packets.
//! The first packet starts with the channel's header token (`"Temp,"`,
//! `"Moist,"`), later packets are bare continuations, and a continuation
//! shorter than [`SHORT_FRAGMENT_THRESHOLD`] ends the message. There is no
//! explicit terminator.

use crate::config::ChannelConfig;

/// A continuation chunk shorter than this closes its frame
pub const SHORT_FRAGMENT_THRESHOLD: usize = 15;

/// Largest packet the bus delivers in one go (I2C slave buffer size)
pub const DEFAULT_MAX_PACKET_SIZE: usize = 32;

/// Separator between values inside a channel payload
pub const VALUE_SEPARATOR: char = ',';

/// Index of a registered channel inside a [`FrameAssembler`](super::FrameAssembler)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub usize);

/// A named input channel and the token that opens its frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Channel name (e.g. "Moist")
    pub name: String,

    /// Header token (e.g. "Moist,")
    pub header: String,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            header: header.into(),
        }
    }

    /// Whether `chunk` opens a frame of this channel
    pub fn matches(&self, chunk: &[u8]) -> bool {
        chunk.starts_with(self.header.as_bytes())
    }
}

impl From<&ChannelConfig> for ChannelSpec {
    fn from(config: &ChannelConfig) -> Self {
        Self::new(config.name.clone(), config.header.clone())
    }
}

/// Per-channel frame state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Frame {
    /// Nothing received since the last composition
    #[default]
    Idle,
    /// Header seen, continuations still arriving
    Assembling { payload: String },
    /// Complete message waiting to be composed
    Ready { payload: String },
}

impl Frame {
    pub fn is_idle(&self) -> bool {
        matches!(self, Frame::Idle)
    }

    pub fn is_assembling(&self) -> bool {
        matches!(self, Frame::Assembling { .. })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Frame::Ready { .. })
    }

    /// Accumulated text, if any
    pub fn payload(&self) -> Option<&str> {
        match self {
            Frame::Idle => None,
            Frame::Assembling { payload } | Frame::Ready { payload } => Some(payload),
        }
    }
}

/// What one chunk did to the assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Header chunk started a fresh frame
    Opened(ChannelId),
    /// Continuation appended, frame still assembling
    Appended(ChannelId),
    /// Short continuation appended, frame is now Ready
    Completed(ChannelId),
    /// No active frame to attach the chunk to
    Dropped,
}

/// A completed frame handed over for composition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyFrame {
    pub channel: String,
    pub header: String,
    pub payload: String,
}

impl ReadyFrame {
    /// Payload with line breaks, the header token and one trailing
    /// separator removed.
    ///
    /// # Examples
    ///
    /// ```
    /// use field_telemetry_node::ingest::protocol::ReadyFrame;
    ///
    /// let frame = ReadyFrame {
    ///     channel: "Moist".to_string(),
    ///     header: "Moist,".to_string(),
    ///     payload: "Moist,10,20,30,40,".to_string(),
    /// };
    /// assert_eq!(frame.value_series(), "10,20,30,40");
    /// ```
    pub fn value_series(&self) -> String {
        let cleaned: String = self
            .payload
            .chars()
            .filter(|c| *c != '\r' && *c != '\n')
            .collect();
        let values = cleaned.strip_prefix(self.header.as_str()).unwrap_or(&cleaned);
        let values = values.trim();
        values
            .strip_suffix(VALUE_SEPARATOR)
            .unwrap_or(values)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_constants() {
        assert_eq!(SHORT_FRAGMENT_THRESHOLD, 15);
        assert_eq!(DEFAULT_MAX_PACKET_SIZE, 32);
    }

    #[test]
    fn test_channel_spec_matches_prefix_only() {
        let spec = ChannelSpec::new("Temp", "Temp,");
        assert!(spec.matches(b"Temp,21.5,"));
        assert!(!spec.matches(b"21.5,Temp,"));
        assert!(!spec.matches(b"Temp"));
    }

    #[test]
    fn test_value_series_strips_line_breaks() {
        let frame = ReadyFrame {
            channel: "Temp".to_string(),
            header: "Temp,".to_string(),
            payload: "Temp,21.5,22.0,\r\n".to_string(),
        };
        assert_eq!(frame.value_series(), "21.5,22.0");
    }

    #[test]
    fn test_value_series_keeps_inner_separators() {
        let frame = ReadyFrame {
            channel: "Temp".to_string(),
            header: "Temp,".to_string(),
            payload: "Temp,1,,2".to_string(),
        };
        assert_eq!(frame.value_series(), "1,,2");
    }

    #[test]
    fn test_frame_default_is_idle() {
        let frame = Frame::default();
        assert!(frame.is_idle());
        assert_eq!(frame.payload(), None);
    }
}
