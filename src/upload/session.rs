//! # Upload Session
//!
//! One HTTP request through the modem's embedded HTTP stack.
//!
//! A session is strictly sequential: optional power cycle, tear down any
//! stale HTTP context, init, set parameters, run the action, check the
//! result, terminate. The terminate step runs no matter how the request
//! went, so the modem never keeps a half-open HTTP context.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::RowUploader;
use crate::config::{HttpMethod, UploadConfig};
use crate::error::{Result, TelemetryError};
use crate::modem::{BringUp, SharedTransport};
use crate::record::query::{encode_request, field_count};
use crate::record::Delimiter;
use crate::transport::CommandTransport;

const TERM_WINDOW: Duration = Duration::from_millis(1000);
const INIT_WINDOW: Duration = Duration::from_millis(5000);
const PARAM_WINDOW: Duration = Duration::from_millis(1000);
const DATA_WINDOW: Duration = Duration::from_millis(2000);

/// Upper bound the modem gets for receiving the POST body, in ms
const DATA_INPUT_TIMEOUT_MS: u32 = 10_000;

/// Pause after the POST body before starting the action
const BODY_SETTLE: Duration = Duration::from_millis(150);

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Endpoint settings for a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub url: String,
    pub api_key: String,
    pub method: HttpMethod,
    pub max_fields: usize,
    pub delimiter: Delimiter,
    pub action_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(upload: &UploadConfig, delimiter: Delimiter) -> Self {
        Self {
            url: upload.url.clone(),
            api_key: upload.api_key.clone(),
            method: upload.method,
            max_fields: upload.max_fields,
            delimiter,
            action_timeout: Duration::from_millis(upload.action_timeout_ms),
        }
    }
}

/// Uploads single rows over a shared modem transport
pub struct UploadSession<T: CommandTransport> {
    transport: SharedTransport<T>,
    settings: SessionSettings,
    power_cycle: Option<BringUp>,
}

impl<T: CommandTransport> UploadSession<T> {
    pub fn new(transport: SharedTransport<T>, settings: SessionSettings) -> Self {
        Self {
            transport,
            settings,
            power_cycle: None,
        }
    }

    /// Run `bring_up` before every request.
    pub fn with_power_cycle(mut self, bring_up: BringUp) -> Self {
        self.power_cycle = Some(bring_up);
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Upload one stored row.
    ///
    /// # Errors
    ///
    /// - `TelemetryError::TransportTimeout` if HTTP init (or the POST data
    ///   prompt) never acknowledges
    /// - `TelemetryError::UploadRejected` if the action result is not 200
    /// - `TelemetryError::Serial` on port I/O failure
    pub async fn upload(&mut self, row: &str) -> Result<()> {
        let mut transport = self.transport.lock().await;

        if let Some(bring_up) = &self.power_cycle {
            bring_up.run(&mut *transport).await?;
        }

        let fields = field_count(row, self.settings.delimiter);
        if fields > self.settings.max_fields {
            debug!(
                "Row has {} fields, sending first {}",
                fields, self.settings.max_fields
            );
        }

        if let Err(e) = transport.send("AT+HTTPTERM", TERM_WINDOW).await {
            debug!("Stale HTTP teardown failed: {}", e);
        }

        transport
            .send_expect("AT+HTTPINIT", INIT_WINDOW, "OK")
            .await?
            .into_result("AT+HTTPINIT")?;

        let outcome = request(&mut *transport, &self.settings, row).await;

        if let Err(e) = transport.send("AT+HTTPTERM", TERM_WINDOW).await {
            warn!("HTTP terminate failed: {}", e);
        }

        outcome
    }
}

/// Parameters, body and action for an initialized HTTP context.
async fn request<T>(transport: &mut T, settings: &SessionSettings, row: &str) -> Result<()>
where
    T: CommandTransport + ?Sized,
{
    let payload = encode_request(&settings.api_key, row, settings.delimiter, settings.max_fields);

    transport
        .send(
            &format!("AT+HTTPPARA=\"CONTENT\",\"{}\"", FORM_CONTENT_TYPE),
            PARAM_WINDOW,
        )
        .await?;

    match settings.method {
        HttpMethod::Get => {
            let url = format!("{}?{}", settings.url, payload);
            transport
                .send(&format!("AT+HTTPPARA=\"URL\",\"{}\"", url), PARAM_WINDOW)
                .await?;
        }
        HttpMethod::Post => {
            transport
                .send(&format!("AT+HTTPPARA=\"URL\",\"{}\"", settings.url), PARAM_WINDOW)
                .await?;
            let command = format!("AT+HTTPDATA={},{}", payload.len(), DATA_INPUT_TIMEOUT_MS);
            transport
                .send_expect(&command, DATA_WINDOW, "DOWNLOAD")
                .await?
                .into_result(&command)?;
            transport.write_raw(payload.as_bytes()).await?;
            sleep(BODY_SETTLE).await;
        }
    }

    let token = settings.method.success_token();
    let action = format!("AT+HTTPACTION={}", settings.method.action_code());
    let response = transport
        .send_expect(&action, settings.action_timeout, &token)
        .await?;

    if response.contains(&token) {
        info!("Row uploaded");
        Ok(())
    } else {
        Err(TelemetryError::UploadRejected(
            response.text().trim().to_string(),
        ))
    }
}

#[async_trait]
impl<T: CommandTransport> RowUploader for UploadSession<T> {
    async fn send(&mut self, row: &str) -> Result<()> {
        self.upload(row).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::share;
    use crate::serial::port_trait::mocks::MockSerialPort;
    use crate::transport::AtTransport;

    const URL: &str = "http://api.thingspeak.com/update";
    const ROW: &str = "2025-03-09\t07:05:03\t27.3";

    fn settings(method: HttpMethod) -> SessionSettings {
        SessionSettings {
            url: URL.to_string(),
            api_key: "KEY".to_string(),
            method,
            max_fields: 8,
            delimiter: Delimiter::Tab,
            action_timeout: Duration::from_secs(30),
        }
    }

    fn session(port: &MockSerialPort, method: HttpMethod) -> UploadSession<AtTransport<MockSerialPort>> {
        UploadSession::new(share(AtTransport::new(port.clone())), settings(method))
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_success_sequence() {
        let port = MockSerialPort::new();
        port.reply("AT+HTTPINIT", "OK\r\n");
        port.reply("AT+HTTPACTION=0", "OK\r\n\r\n+HTTPACTION: 0,200,1\r\n");

        session(&port, HttpMethod::Get).upload(ROW).await.unwrap();

        assert_eq!(
            port.written_lines(),
            vec![
                "AT+HTTPTERM".to_string(),
                "AT+HTTPINIT".to_string(),
                format!("AT+HTTPPARA=\"CONTENT\",\"{}\"", FORM_CONTENT_TYPE),
                format!(
                    "AT+HTTPPARA=\"URL\",\"{}?api_key=KEY&field1=2025-03-09&field2=07%3A05%3A03&field3=27.3\"",
                    URL
                ),
                "AT+HTTPACTION=0".to_string(),
                "AT+HTTPTERM".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_200_is_rejected_and_terminated() {
        let port = MockSerialPort::new();
        port.reply("AT+HTTPINIT", "OK\r\n");
        port.reply("AT+HTTPACTION=0", "OK\r\n\r\n+HTTPACTION: 0,404,0\r\n");

        let result = session(&port, HttpMethod::Get).upload(ROW).await;

        assert!(matches!(result, Err(TelemetryError::UploadRejected(ref r)) if r.contains("404")));
        assert_eq!(port.written_lines().last().unwrap(), "AT+HTTPTERM");
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_failure_stops_before_parameters() {
        let port = MockSerialPort::new();
        port.reply("AT+HTTPINIT", "ERROR\r\n");

        let result = session(&port, HttpMethod::Get).upload(ROW).await;

        assert!(matches!(
            result,
            Err(TelemetryError::TransportTimeout { ref command }) if command == "AT+HTTPINIT"
        ));
        assert_eq!(port.written_lines(), vec!["AT+HTTPTERM", "AT+HTTPINIT"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_sends_body_after_download_prompt() {
        let port = MockSerialPort::new();
        port.reply("AT+HTTPINIT", "OK\r\n");
        port.reply("AT+HTTPDATA=", "DOWNLOAD\r\n");
        port.reply("AT+HTTPACTION=1", "OK\r\n\r\n+HTTPACTION: 1,200,2\r\n");

        session(&port, HttpMethod::Post).upload(ROW).await.unwrap();

        let body = "api_key=KEY&field1=2025-03-09&field2=07%3A05%3A03&field3=27.3";
        let lines = port.written_lines();
        assert_eq!(lines[3], format!("AT+HTTPPARA=\"URL\",\"{}\"", URL));
        assert_eq!(lines[4], format!("AT+HTTPDATA={},10000", body.len()));
        assert_eq!(lines[5], body);
        assert_eq!(lines[6], "AT+HTTPACTION=1");
        assert_eq!(lines[7], "AT+HTTPTERM");
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_without_download_prompt_terminates_without_body() {
        let port = MockSerialPort::new();
        port.reply("AT+HTTPINIT", "OK\r\n");
        port.reply("AT+HTTPDATA=", "ERROR\r\n");

        let result = session(&port, HttpMethod::Post).upload(ROW).await;

        assert!(matches!(
            result,
            Err(TelemetryError::TransportTimeout { ref command }) if command.starts_with("AT+HTTPDATA=")
        ));
        let lines = port.written_lines();
        assert_eq!(lines.last().unwrap(), "AT+HTTPTERM");
        assert!(lines.iter().all(|l| !l.starts_with("api_key=")));
        assert!(lines.iter().all(|l| !l.starts_with("AT+HTTPACTION")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fields_beyond_max_are_dropped() {
        let port = MockSerialPort::new();
        port.reply("AT+HTTPINIT", "OK\r\n");
        port.reply("AT+HTTPACTION=0", "+HTTPACTION: 0,200,1\r\n");

        let mut s = session(&port, HttpMethod::Get);
        s.settings.max_fields = 2;
        s.upload(ROW).await.unwrap();

        let url_line = &port.written_lines()[3];
        assert!(url_line.contains("field2="));
        assert!(!url_line.contains("field3="));
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_cycle_runs_before_http() {
        let port = MockSerialPort::new();
        port.reply("AT+HTTPINIT", "OK\r\n");
        port.reply("AT+HTTPACTION=0", "+HTTPACTION: 0,200,1\r\n");

        let bring_up = BringUp::new(None, Duration::from_secs(30), "apn");
        let mut s = session(&port, HttpMethod::Get).with_power_cycle(bring_up);
        s.upload(ROW).await.unwrap();

        let lines = port.written_lines();
        assert_eq!(lines[0], "AT+CCID");
        let term = lines.iter().position(|l| l == "AT+HTTPTERM").unwrap();
        assert!(lines[..term].iter().any(|l| l == "AT+CTZU=1"));
    }
}
