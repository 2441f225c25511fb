//! GNSS position from the modem (`AT+CGPSINFO`).

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::SharedTransport;
use crate::error::Result;
use crate::record::{Location, LocationSource};
use crate::transport::CommandTransport;

const GPS_TOGGLE_WINDOW: Duration = Duration::from_millis(1000);
const GPS_INFO_WINDOW: Duration = Duration::from_millis(2000);

/// Time the receiver gets between power-on and the position query
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

/// Convert NMEA `ddmm.mmmm` / `dddmm.mmmm` to decimal degrees.
fn nmea_to_degrees(raw: &str, hemisphere: &str, negative: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    let degrees = (value / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    Some(if hemisphere.trim() == negative { -decimal } else { decimal })
}

/// Parse a `+CGPSINFO:` response into a [`Location`].
///
/// Field layout is `lat,N/S,lon,E/W,date,time,alt,speed,course`. An empty
/// field anywhere (`,,`) means no fix and yields `None`.
pub fn parse_cgpsinfo(response: &str) -> Option<Location> {
    let tail = &response[response.find("+CGPSINFO:")? + "+CGPSINFO:".len()..];
    let line = tail.lines().next()?.trim();
    if line.is_empty() || line.contains(",,") {
        return None;
    }

    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 7 {
        return None;
    }

    Some(Location {
        latitude: nmea_to_degrees(fields[0], fields[1], "S")?,
        longitude: nmea_to_degrees(fields[2], fields[3], "W")?,
        altitude: fields[6].trim().parse().ok()?,
    })
}

/// [`LocationSource`] that powers the modem's GNSS receiver per query
pub struct ModemGnss<T: CommandTransport> {
    transport: SharedTransport<T>,
    settle: Duration,
}

impl<T: CommandTransport> ModemGnss<T> {
    pub fn new(transport: SharedTransport<T>) -> Self {
        Self::with_settle(transport, DEFAULT_SETTLE)
    }

    pub fn with_settle(transport: SharedTransport<T>, settle: Duration) -> Self {
        Self { transport, settle }
    }

    async fn query(&mut self) -> Result<Option<Location>> {
        let mut transport = self.transport.lock().await;

        transport.send("AT+CGPS=1,1", GPS_TOGGLE_WINDOW).await?;
        sleep(self.settle).await;
        let info = transport.send("AT+CGPSINFO", GPS_INFO_WINDOW).await?;
        transport.send("AT+CGPS=0", GPS_TOGGLE_WINDOW).await?;

        let location = parse_cgpsinfo(&info.text());
        if location.is_none() {
            debug!("No GNSS fix in {:?}", info.text().trim());
        }
        Ok(location)
    }
}

#[async_trait]
impl<T: CommandTransport> LocationSource for ModemGnss<T> {
    async fn fix(&mut self) -> Option<Location> {
        match self.query().await {
            Ok(location) => location,
            Err(e) => {
                warn!("GNSS query failed: {}", e);
                None
            }
        }
    }
}
