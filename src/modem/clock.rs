//! Network time from the modem (`AT+CCLK?`).

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::time::Duration;
use tracing::{debug, warn};

use super::SharedTransport;
use crate::record::TimeSource;
use crate::transport::CommandTransport;

const CCLK_WINDOW: Duration = Duration::from_millis(2000);

/// Parse a `+CCLK: "yy/MM/dd,hh:mm:ss±zz"` response.
///
/// The zone suffix is ignored; the modem clock is network-synced local
/// time. Returns `None` for anything short or malformed.
///
/// # Examples
///
/// ```
/// use field_telemetry_node::modem::clock::parse_cclk;
///
/// let ts = parse_cclk("+CCLK: \"25/03/09,07:05:03-20\"\r\nOK").unwrap();
/// assert_eq!(ts.to_string(), "2025-03-09 07:05:03");
/// ```
pub fn parse_cclk(response: &str) -> Option<NaiveDateTime> {
    let tail = &response[response.find("+CCLK:")?..];
    let open = tail.find('"')?;
    let stamp = tail.get(open + 1..open + 18)?;

    let bytes = stamp.as_bytes();
    if bytes[2] != b'/' || bytes[5] != b'/' || bytes[8] != b',' || bytes[11] != b':' || bytes[14] != b':' {
        return None;
    }

    let field = |range: std::ops::Range<usize>| stamp.get(range)?.parse::<u32>().ok();
    let year = 2000 + field(0..2)? as i32;
    NaiveDate::from_ymd_opt(year, field(3..5)?, field(6..8)?)?
        .and_hms_opt(field(9..11)?, field(12..14)?, field(15..17)?)
}

/// [`TimeSource`] backed by the modem's network clock
pub struct ModemClock<T: CommandTransport> {
    transport: SharedTransport<T>,
}

impl<T: CommandTransport> ModemClock<T> {
    pub fn new(transport: SharedTransport<T>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: CommandTransport> TimeSource for ModemClock<T> {
    async fn now(&mut self) -> Option<NaiveDateTime> {
        let mut transport = self.transport.lock().await;
        let response = match transport.send("AT+CCLK?", CCLK_WINDOW).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Clock query failed: {}", e);
                return None;
            }
        };

        let parsed = parse_cclk(&response.text());
        if parsed.is_none() {
            debug!("Unparseable clock response: {:?}", response.text());
        }
        parsed
    }
}
