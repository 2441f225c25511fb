//! # Bus Reader
//!
//! Pulls packets off the sensor bus and forwards each one as a chunk.
//!
//! The reader runs as its own task and never touches assembler state; the
//! mpsc channel is the only handoff point to the control loop.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};
use crate::serial::SerialPortIO;

/// Queue depth between the bus task and the control loop
pub const CHUNK_QUEUE_DEPTH: usize = 64;

/// Reads bounded packets from a bus port
pub struct BusReader<P: SerialPortIO> {
    port: P,
    max_packet_size: usize,
}

impl<P: SerialPortIO + 'static> BusReader<P> {
    pub fn new(port: P, max_packet_size: usize) -> Self {
        Self {
            port,
            max_packet_size,
        }
    }

    /// Wait for the next packet.
    ///
    /// Returns `Ok(None)` once the port reports end of stream.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let mut buf = vec![0u8; self.max_packet_size];
        let n = self
            .port
            .read(&mut buf)
            .await
            .map_err(|e| TelemetryError::Serial(format!("Bus read failed: {}", e)))?;

        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }

    /// Forward chunks into `tx` until the port closes or the receiver is
    /// dropped.
    pub fn spawn(mut self, tx: mpsc::Sender<Bytes>) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            info!("Bus reader started (max packet {} bytes)", self.max_packet_size);
            loop {
                match self.next_chunk().await {
                    Ok(Some(chunk)) => {
                        debug!("Bus chunk ({} bytes)", chunk.len());
                        if tx.send(chunk).await.is_err() {
                            debug!("Chunk receiver closed, stopping bus reader");
                            return Ok(());
                        }
                    }
                    Ok(None) => {
                        warn!("Bus port closed");
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("{}", e);
                        return Err(e);
                    }
                }
            }
        })
    }
}
