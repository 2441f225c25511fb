//! # Command Transport Module
//!
//! Request/response primitive over the modem's AT command channel.
//!
//! The channel has no framing: a command is written as one CRLF-terminated
//! line and every byte that shows up before the collection window closes is
//! handed back. Callers decide success by looking for a known token anywhere
//! in the returned blob, which may also contain stale bytes from an earlier
//! exchange.
//!
//! This module handles:
//! - Writing AT command lines and raw payloads
//! - Collecting inbound bytes for a fixed window ([`CommandTransport::send`])
//! - Returning early once an expected token arrives ([`CommandTransport::send_expect`])
//! - Echoing every exchange to the `modem` tracing target

pub mod response;

pub use response::TransportResponse;

use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::error::{Result, TelemetryError};
use crate::serial::SerialPortIO;

/// Line terminator appended to every command
pub const COMMAND_TERMINATOR: &str = "\r\n";

/// Bytes requested from the port per read
const READ_CHUNK_SIZE: usize = 256;

/// Back-off when the port reports zero bytes instead of blocking
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Synchronous-style request/response over a byte channel.
///
/// No retries and no cancellation: the window is the only knob.
#[async_trait]
pub trait CommandTransport: Send {
    /// Send `command` and collect everything that arrives until `window`
    /// elapses.
    ///
    /// Always returns [`TransportResponse::Completed`]; the full window is
    /// the expected end of this exchange.
    async fn send(&mut self, command: &str, window: Duration) -> Result<TransportResponse>;

    /// Send `command` and collect until `token` is seen or `window` elapses.
    ///
    /// Returns [`TransportResponse::Completed`] as soon as the token is
    /// present, [`TransportResponse::TimedOut`] with the partial bytes
    /// otherwise.
    async fn send_expect(
        &mut self,
        command: &str,
        window: Duration,
        token: &str,
    ) -> Result<TransportResponse>;

    /// Write raw bytes with no terminator and no response collection.
    async fn write_raw(&mut self, data: &[u8]) -> Result<()>;
}

/// [`CommandTransport`] over a serial port speaking AT commands
pub struct AtTransport<P: SerialPortIO> {
    port: P,
}

impl<P: SerialPortIO> std::fmt::Debug for AtTransport<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtTransport").finish_non_exhaustive()
    }
}

impl<P: SerialPortIO> AtTransport<P> {
    /// Wrap an opened port.
    pub fn new(port: P) -> Self {
        Self { port }
    }

    async fn write_command(&mut self, command: &str) -> Result<()> {
        let line = format!("{}{}", command, COMMAND_TERMINATOR);
        self.port
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TelemetryError::Serial(format!("Failed to write {:?}: {}", command, e)))?;
        self.port
            .flush()
            .await
            .map_err(|e| TelemetryError::Serial(format!("Failed to flush serial port: {}", e)))?;
        Ok(())
    }

    /// Collect inbound bytes until the deadline, or until `token` shows up.
    async fn collect(&mut self, window: Duration, token: Option<&str>) -> Result<TransportResponse> {
        let deadline = Instant::now() + window;
        let mut received = BytesMut::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if let Some(token) = token {
                if response::contains_token(&received, token) {
                    return Ok(TransportResponse::Completed(received.freeze()));
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match timeout(remaining, self.port.read(&mut chunk)).await {
                Ok(Ok(0)) => sleep(remaining.min(IDLE_POLL)).await,
                Ok(Ok(n)) => received.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => {
                    return Err(TelemetryError::Serial(format!("Failed to read response: {}", e)))
                }
                Err(_) => break,
            }
        }

        let bytes = received.freeze();
        Ok(match token {
            None => TransportResponse::Completed(bytes),
            Some(_) => TransportResponse::TimedOut(bytes),
        })
    }

    async fn exchange(
        &mut self,
        command: &str,
        window: Duration,
        token: Option<&str>,
    ) -> Result<TransportResponse> {
        self.write_command(command).await?;
        let response = self.collect(window, token).await?;

        debug!(
            target: "modem",
            "{} -> {:?}{}",
            command,
            response.text().trim(),
            if response.is_timed_out() { " (timed out)" } else { "" }
        );

        Ok(response)
    }
}

#[async_trait]
impl<P: SerialPortIO> CommandTransport for AtTransport<P> {
    async fn send(&mut self, command: &str, window: Duration) -> Result<TransportResponse> {
        self.exchange(command, window, None).await
    }

    async fn send_expect(
        &mut self,
        command: &str,
        window: Duration,
        token: &str,
    ) -> Result<TransportResponse> {
        self.exchange(command, window, Some(token)).await
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.port
            .write_all(data)
            .await
            .map_err(|e| TelemetryError::Serial(format!("Failed to write payload: {}", e)))?;
        self.port
            .flush()
            .await
            .map_err(|e| TelemetryError::Serial(format!("Failed to flush serial port: {}", e)))?;
        debug!(target: "modem", "raw payload ({} bytes)", data.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::port_trait::mocks::MockSerialPort;

    #[tokio::test(start_paused = true)]
    async fn test_send_appends_crlf() {
        let port = MockSerialPort::new();
        let mut transport = AtTransport::new(port.clone());

        transport.send("AT", Duration::from_millis(100)).await.unwrap();

        assert_eq!(port.get_written_data(), vec![b"AT\r\n".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_collects_for_full_window() {
        let port = MockSerialPort::new();
        port.reply("AT+CREG?", "+CREG: 0,1\r\nOK\r\n");
        let mut transport = AtTransport::new(port.clone());

        let start = Instant::now();
        let response = transport.send("AT+CREG?", Duration::from_secs(3)).await.unwrap();

        assert!(response.is_completed());
        assert!(response.contains("+CREG: 0,1"));
        assert!(response.contains("OK"));
        // The window is never cut short, even once OK has arrived
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_with_silent_channel_returns_empty() {
        let port = MockSerialPort::new();
        let mut transport = AtTransport::new(port);

        let response = transport.send("AT", Duration::from_secs(1)).await.unwrap();
        assert!(response.is_completed());
        assert!(response.bytes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_expect_returns_early_on_token() {
        let port = MockSerialPort::new();
        port.reply("AT+HTTPINIT", "\r\nOK\r\n");
        let mut transport = AtTransport::new(port);

        let start = Instant::now();
        let response = transport
            .send_expect("AT+HTTPINIT", Duration::from_secs(5), "OK")
            .await
            .unwrap();

        assert!(response.is_completed());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_expect_times_out_with_partial_bytes() {
        let port = MockSerialPort::new();
        port.reply("AT+HTTPINIT", "\r\nERROR\r\n");
        let mut transport = AtTransport::new(port);

        let response = transport
            .send_expect("AT+HTTPINIT", Duration::from_secs(5), "OK")
            .await
            .unwrap();

        assert!(response.is_timed_out());
        assert!(response.contains("ERROR"));
        assert!(!response.contains("OK"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_may_carry_stale_bytes() {
        let port = MockSerialPort::new();
        port.push_inbound(b"+CGPSINFO: ,,,,,,,,\r\n");
        port.reply("AT+CCLK?", "+CCLK: \"24/05/17,13:45:12-20\"\r\nOK\r\n");
        let mut transport = AtTransport::new(port);

        let response = transport.send("AT+CCLK?", Duration::from_secs(2)).await.unwrap();
        assert!(response.contains("+CGPSINFO"));
        assert!(response.contains("+CCLK"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_is_serial_error() {
        let port = MockSerialPort::new();
        port.set_write_error(std::io::ErrorKind::BrokenPipe);
        let mut transport = AtTransport::new(port);

        let result = transport.send("AT", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TelemetryError::Serial(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_raw_has_no_terminator() {
        let port = MockSerialPort::new();
        let mut transport = AtTransport::new(port.clone());

        transport.write_raw(b"api_key=K&field1=1").await.unwrap();
        assert_eq!(port.get_written_data(), vec![b"api_key=K&field1=1".to_vec()]);
    }
}
