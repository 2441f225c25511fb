//! # Modem Bring-Up
//!
//! Reset, boot wait and network attach for a SIM7600-class modem.
//!
//! Pin-level power sequencing belongs to the board; what matters here is
//! that boot takes a long but bounded time and must finish before any
//! other command is sent. Attach responses are advisory and never fail the
//! sequence.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::transport::CommandTransport;

/// Window for the reset command itself
const RESET_WINDOW: Duration = Duration::from_millis(1000);

/// Window for `AT+CTZU=1`
const TIME_UPDATE_WINDOW: Duration = Duration::from_millis(2000);

/// Full bring-up: optional reset, boot wait, network attach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringUp {
    reset_command: Option<String>,
    boot_wait: Duration,
    apn: String,
}

impl BringUp {
    pub fn new(reset_command: Option<String>, boot_wait: Duration, apn: impl Into<String>) -> Self {
        Self {
            reset_command: reset_command.filter(|cmd| !cmd.trim().is_empty()),
            boot_wait,
            apn: apn.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.modem.reset_command.clone(),
            config.boot_wait(),
            config.modem.apn.clone(),
        )
    }

    /// Attach commands and their collection windows, in order.
    pub fn attach_sequence(&self) -> Vec<(String, Duration)> {
        vec![
            ("AT+CCID".to_string(), Duration::from_millis(3000)),
            ("AT+CREG?".to_string(), Duration::from_millis(3000)),
            ("AT+CGATT=1".to_string(), Duration::from_millis(1000)),
            ("AT+CGACT=1,1".to_string(), Duration::from_millis(1000)),
            (
                format!("AT+CGDCONT=1,\"IP\",\"{}\"", self.apn),
                Duration::from_millis(1000),
            ),
        ]
    }

    /// Run the whole sequence.
    ///
    /// # Errors
    ///
    /// Only transport I/O failures are returned.
    pub async fn run<T>(&self, transport: &mut T) -> Result<()>
    where
        T: CommandTransport + ?Sized,
    {
        if let Some(reset) = &self.reset_command {
            info!("Resetting modem ({})", reset);
            transport.send(reset, RESET_WINDOW).await?;
        }

        info!("Waiting {}s for modem boot", self.boot_wait.as_secs());
        sleep(self.boot_wait).await;

        for (command, window) in self.attach_sequence() {
            transport.send(&command, window).await?;
        }

        let address = transport
            .send("AT+CGPADDR=1", Duration::from_millis(3000))
            .await?;
        if address.text().contains("+CGPADDR") && address.text().contains('.') {
            info!("Modem attached");
        } else {
            warn!("No IP address after attach");
        }

        transport.send("AT+CTZU=1", TIME_UPDATE_WINDOW).await?;
        Ok(())
    }
}
