//! # Frame Assembler
//!
//! Rebuilds named logical messages from chunked bus deliveries.
//!
//! Every channel runs its own `Idle -> Assembling -> Ready -> Idle` state
//! machine, so a header for one channel never touches another channel's
//! buffer. Continuations go to the *active* frame: the most recently opened
//! frame that is still assembling.
//!
//! ## Interleaved channels
//!
//! Senders are expected to transmit channels one after the other. If a
//! header for channel B arrives while A is still assembling, A keeps its
//! buffer and stays Assembling (suspended), B becomes active, and A only
//! recovers when its own header restarts it. Composition is blocked while
//! any frame is assembling, so a suspended frame holds back the next
//! sample rather than producing a torn one.
//!
//! ## Ownership
//!
//! The assembler is a plain value owned by the control loop. Chunks reach
//! it through a channel from the bus reader task, and composition borrows
//! it mutably, so a chunk can never be merged while a composition is
//! reading the buffers: it waits in the queue until the borrow ends.

use tracing::{debug, trace};

use super::protocol::{ChannelId, ChannelSpec, ChunkOutcome, Frame, ReadyFrame};

#[derive(Debug, Clone)]
struct ChannelSlot {
    spec: ChannelSpec,
    frame: Frame,
}

/// Per-channel chunk reassembly
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    slots: Vec<ChannelSlot>,
    active: Option<ChannelId>,
    threshold: usize,
}

impl FrameAssembler {
    /// Create an assembler for `channels`, all Idle.
    ///
    /// # Arguments
    ///
    /// * `channels` - Registered channels; headers must not prefix each other
    /// * `threshold` - Continuations shorter than this many bytes end a frame
    ///
    /// # Examples
    ///
    /// ```
    /// use field_telemetry_node::ingest::{ChannelSpec, FrameAssembler};
    ///
    /// let mut assembler = FrameAssembler::new(vec![ChannelSpec::new("Moist", "Moist,")], 15);
    /// assembler.ingest(b"Moist,10,20,30,");
    /// assembler.ingest(b"40,");
    /// assert!(assembler.all_ready());
    /// ```
    pub fn new(channels: Vec<ChannelSpec>, threshold: usize) -> Self {
        Self {
            slots: channels
                .into_iter()
                .map(|spec| ChannelSlot {
                    spec,
                    frame: Frame::Idle,
                })
                .collect(),
            active: None,
            threshold,
        }
    }

    /// Feed one bus chunk through the channel state machines.
    pub fn ingest(&mut self, chunk: &[u8]) -> ChunkOutcome {
        if let Some(id) = self.header_channel(chunk) {
            if let Some(previous) = self.active.filter(|prev| *prev != id) {
                debug!(
                    "{} header while {} is assembling; {} suspended",
                    self.slots[id.0].spec.name, self.slots[previous.0].spec.name,
                    self.slots[previous.0].spec.name
                );
            }
            // Termination is only decided on continuations, even if the
            // header chunk itself is short.
            self.slots[id.0].frame = Frame::Assembling {
                payload: String::from_utf8_lossy(chunk).into_owned(),
            };
            self.active = Some(id);
            trace!("Opened {} frame ({} bytes)", self.slots[id.0].spec.name, chunk.len());
            return ChunkOutcome::Opened(id);
        }

        let Some(id) = self.active else {
            trace!("Dropped {}-byte chunk with no active frame", chunk.len());
            return ChunkOutcome::Dropped;
        };

        let threshold = self.threshold;
        let slot = &mut self.slots[id.0];
        let Frame::Assembling { payload } = &mut slot.frame else {
            self.active = None;
            return ChunkOutcome::Dropped;
        };

        payload.push_str(&String::from_utf8_lossy(chunk));
        if chunk.len() < threshold {
            let payload = std::mem::take(payload);
            debug!("{} frame complete: {:?}", slot.spec.name, payload);
            slot.frame = Frame::Ready { payload };
            self.active = None;
            ChunkOutcome::Completed(id)
        } else {
            ChunkOutcome::Appended(id)
        }
    }

    fn header_channel(&self, chunk: &[u8]) -> Option<ChannelId> {
        self.slots
            .iter()
            .position(|slot| slot.spec.matches(chunk))
            .map(ChannelId)
    }

    /// Look up a channel by name.
    pub fn channel_id(&self, name: &str) -> Option<ChannelId> {
        self.slots
            .iter()
            .position(|slot| slot.spec.name == name)
            .map(ChannelId)
    }

    /// Current state of one channel.
    pub fn frame(&self, id: ChannelId) -> Option<&Frame> {
        self.slots.get(id.0).map(|slot| &slot.frame)
    }

    /// Frame currently receiving continuations.
    pub fn active(&self) -> Option<ChannelId> {
        self.active
    }

    /// Whether any channel is mid-assembly.
    pub fn is_assembling(&self) -> bool {
        self.slots.iter().any(|slot| slot.frame.is_assembling())
    }

    /// Whether every registered channel holds a Ready frame.
    pub fn all_ready(&self) -> bool {
        !self.slots.is_empty() && self.slots.iter().all(|slot| slot.frame.is_ready())
    }

    /// Hand over every Ready frame and reset all channels to Idle.
    ///
    /// Returns `None` and changes nothing unless no channel is assembling
    /// and every channel is Ready. Frames come back in registration order.
    pub fn take_ready(&mut self) -> Option<Vec<ReadyFrame>> {
        if self.is_assembling() || !self.all_ready() {
            return None;
        }

        let frames = self
            .slots
            .iter_mut()
            .map(|slot| {
                let payload = match std::mem::take(&mut slot.frame) {
                    Frame::Ready { payload } => payload,
                    _ => String::new(),
                };
                ReadyFrame {
                    channel: slot.spec.name.clone(),
                    header: slot.spec.header.clone(),
                    payload,
                }
            })
            .collect();
        self.active = None;
        Some(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> FrameAssembler {
        FrameAssembler::new(
            vec![ChannelSpec::new("Temp", "Temp,"), ChannelSpec::new("Moist", "Moist,")],
            15,
        )
    }

    fn state(assembler: &FrameAssembler, name: &str) -> Frame {
        let id = assembler.channel_id(name).unwrap();
        assembler.frame(id).unwrap().clone()
    }

    #[test]
    fn test_moist_example_reaches_ready() {
        let mut asm = assembler();
        let moist = asm.channel_id("Moist").unwrap();

        assert_eq!(asm.ingest(b"Moist,10,20,30,"), ChunkOutcome::Opened(moist));
        assert_eq!(asm.ingest(b"40,"), ChunkOutcome::Completed(moist));

        assert_eq!(
            state(&asm, "Moist"),
            Frame::Ready {
                payload: "Moist,10,20,30,40,".to_string()
            }
        );
    }

    #[test]
    fn test_long_continuations_keep_assembling() {
        let mut asm = assembler();
        let temp = asm.channel_id("Temp").unwrap();
        let chunks: [&[u8]; 4] = [
            b"Temp,21.50,21.4",
            b"0,21.30,21.20,21",
            b".10,21.00,20.90,",
            b"20.80,",
        ];

        assert_eq!(asm.ingest(chunks[0]), ChunkOutcome::Opened(temp));
        assert_eq!(asm.ingest(chunks[1]), ChunkOutcome::Appended(temp));
        assert_eq!(asm.ingest(chunks[2]), ChunkOutcome::Appended(temp));
        assert!(state(&asm, "Temp").is_assembling());
        assert_eq!(asm.ingest(chunks[3]), ChunkOutcome::Completed(temp));

        let expected = String::from_utf8(chunks.concat()).unwrap();
        assert_eq!(state(&asm, "Temp").payload(), Some(expected.as_str()));
    }

    #[test]
    fn test_ready_exactly_once_for_any_continuation_count() {
        for n in 1..6 {
            let mut asm = assembler();
            let mut expected = String::from("Temp,1,2,3,4,5,6,");
            asm.ingest(expected.as_bytes());

            let mut completions = 0;
            for i in 0..n {
                let chunk = if i + 1 == n {
                    "9,".to_string()
                } else {
                    format!("{:0>14},", i)
                };
                expected.push_str(&chunk);
                if let ChunkOutcome::Completed(_) = asm.ingest(chunk.as_bytes()) {
                    completions += 1;
                }
            }

            assert_eq!(completions, 1, "n = {}", n);
            assert_eq!(state(&asm, "Temp").payload(), Some(expected.as_str()));
        }
    }

    #[test]
    fn test_short_header_does_not_terminate() {
        let mut asm = assembler();
        asm.ingest(b"Temp,1,");
        assert!(state(&asm, "Temp").is_assembling());
        asm.ingest(b"2,");
        assert!(state(&asm, "Temp").is_ready());
    }

    #[test]
    fn test_header_for_other_channel_leaves_active_frame_untouched() {
        let mut asm = assembler();
        asm.ingest(b"Temp,21.50,21.4");
        asm.ingest(b"0,21.30,21.20,21");
        let before = state(&asm, "Temp");

        asm.ingest(b"Moist,10,20,30,");

        assert_eq!(state(&asm, "Temp"), before);
        assert!(state(&asm, "Moist").is_assembling());
        assert_eq!(asm.active(), asm.channel_id("Moist"));

        // Continuations now belong to Moist only
        asm.ingest(b"40,");
        assert!(state(&asm, "Moist").is_ready());
        assert_eq!(state(&asm, "Temp"), before);
    }

    #[test]
    fn test_suspended_frame_blocks_composition_until_restarted() {
        let mut asm = assembler();
        asm.ingest(b"Temp,21.50,21.4");
        asm.ingest(b"Moist,10,20,30,");
        asm.ingest(b"40,");
        assert!(asm.take_ready().is_none());

        asm.ingest(b"Temp,21.50,21.4");
        asm.ingest(b"0,");
        assert!(asm.take_ready().is_some());
    }

    #[test]
    fn test_header_restarts_ready_frame() {
        let mut asm = assembler();
        asm.ingest(b"Temp,1,2,3,4,5,6");
        asm.ingest(b"7,");
        assert!(state(&asm, "Temp").is_ready());

        asm.ingest(b"Temp,9,9,9,9,9,9");
        assert_eq!(
            state(&asm, "Temp"),
            Frame::Assembling {
                payload: "Temp,9,9,9,9,9,9".to_string()
            }
        );
    }

    #[test]
    fn test_orphan_chunk_is_dropped() {
        let mut asm = assembler();
        assert_eq!(asm.ingest(b"40,"), ChunkOutcome::Dropped);

        asm.ingest(b"Temp,1,2,3,4,5,6");
        asm.ingest(b"7,");
        assert_eq!(asm.ingest(b"8,"), ChunkOutcome::Dropped);
        assert_eq!(state(&asm, "Temp").payload(), Some("Temp,1,2,3,4,5,67,"));
    }

    #[test]
    fn test_take_ready_requires_every_channel() {
        let mut asm = assembler();
        asm.ingest(b"Moist,10,20,30,");
        asm.ingest(b"40,");
        assert!(asm.take_ready().is_none());
        // Untouched by the failed attempt
        assert!(state(&asm, "Moist").is_ready());
    }

    #[test]
    fn test_take_ready_resets_to_idle() {
        let mut asm = assembler();
        asm.ingest(b"Temp,21.5,22.0,2");
        asm.ingest(b"3.1,");
        asm.ingest(b"Moist,10,20,30,");
        asm.ingest(b"40,");

        let frames = asm.take_ready().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].channel, "Temp");
        assert_eq!(frames[0].value_series(), "21.5,22.0,23.1");
        assert_eq!(frames[1].value_series(), "10,20,30,40");

        assert!(state(&asm, "Temp").is_idle());
        assert!(state(&asm, "Moist").is_idle());
        assert!(asm.take_ready().is_none());
    }

    #[test]
    fn test_empty_assembler_is_never_ready() {
        let mut asm = FrameAssembler::new(Vec::new(), 15);
        assert!(!asm.all_ready());
        assert!(asm.take_ready().is_none());
        assert_eq!(asm.ingest(b"Temp,1,"), ChunkOutcome::Dropped);
    }
}
