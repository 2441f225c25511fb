//! # Field Telemetry Node
//!
//! Collects soil sensor frames, logs them to local storage, and uploads them
//! over LTE.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration and set up logging
//!    - Open the durable log (fatal if storage is unavailable)
//!    - Open the modem link and run the bring-up sequence
//!    - Open the sensor bus and spawn the bus reader task
//!
//! 2. **Main Loop**
//!    - Feed every bus chunk to the frame assembler; once all channels are
//!      Ready, compose a sample and append it to the day file
//!    - On the sample tick, retry composition and report stuck frames
//!    - On the drain tick, upload pending files oldest first
//!    - Handle Ctrl+C for graceful shutdown

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use field_telemetry_node::config::{Config, LoggingConfig};
use field_telemetry_node::ingest::bus::CHUNK_QUEUE_DEPTH;
use field_telemetry_node::ingest::{BusReader, ChannelSpec, ChunkOutcome, FrameAssembler};
use field_telemetry_node::modem::{self, BringUp, ModemClock, ModemGnss};
use field_telemetry_node::record::{LocationSource, RowLayout, SampleComposer, TimeSource};
use field_telemetry_node::serial::{open_first, open_port};
use field_telemetry_node::storage::{DateKey, DurableLog};
use field_telemetry_node::transport::AtTransport;
use field_telemetry_node::upload::{SessionSettings, UploadDrain, UploadSession};

/// Config file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name stem for rolling log files
const LOG_FILE_NAME: &str = "field-telemetry-node.log";

/// Set up the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. With `logging.dir` set, output
/// goes to a daily rolling file instead of stdout; the returned guard must
/// live as long as the process to flush it.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Compose a sample if every channel is Ready and append it to its day file.
async fn compose_and_store<C, L>(
    assembler: &mut FrameAssembler,
    composer: &mut SampleComposer,
    clock: &mut C,
    gnss: &mut L,
    layout: &RowLayout,
    log: &DurableLog,
) where
    C: TimeSource + ?Sized,
    L: LocationSource + ?Sized,
{
    let Some(sample) = composer.try_compose(assembler, clock, gnss).await else {
        return;
    };

    let row = layout.format_row(&sample);
    let result = DateKey::new(sample.date()).and_then(|key| log.append(&row, key));
    match result {
        Ok(()) => info!("Stored sample for {}", sample.timestamp),
        Err(e) => error!("Dropping sample: {}", e),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);
    info!("Field Telemetry Node v{} starting...", env!("CARGO_PKG_VERSION"));

    // Storage
    let layout = RowLayout::from_config(&config);
    let log = DurableLog::open(
        &config.storage.dir,
        &config.storage.file_prefix,
        config.storage.delimiter,
        layout.header_line(),
    )
    .context("Storage unavailable")?;
    info!("Durable log at {}", log.root().display());

    // Modem
    let candidates: Vec<&str> = config
        .modem
        .port
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let (modem_port, modem_path) = open_first(&candidates, config.modem.baud_rate)?;
    info!("Modem opened at {}", modem_path);

    let transport = modem::share(AtTransport::new(modem_port));
    let bring_up = BringUp::from_config(&config);
    if let Err(e) = bring_up.run(&mut *transport.lock().await).await {
        warn!("Modem bring-up failed: {}", e);
    }

    // Sensor bus
    let bus_port = open_port(&config.bus.port, config.bus.baud_rate)?;
    let (chunk_tx, mut chunk_rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);
    let bus_task = BusReader::new(bus_port, config.bus.max_packet_size).spawn(chunk_tx);

    let mut assembler = FrameAssembler::new(
        config.channels.iter().map(ChannelSpec::from).collect(),
        config.bus.short_fragment_threshold,
    );
    let mut composer = SampleComposer::new();
    let mut clock = ModemClock::new(transport.clone());
    let mut gnss = ModemGnss::new(transport.clone());

    let mut session = UploadSession::new(
        transport.clone(),
        SessionSettings::from_config(&config.upload, config.storage.delimiter),
    );
    if config.modem.power_cycle_each_upload {
        session = session.with_power_cycle(bring_up.clone());
    }
    info!(
        "Uploading to {} ({:?}, up to {} fields per row)",
        session.settings().url,
        session.settings().method,
        session.settings().max_fields
    );
    let drain = UploadDrain::new(config.storage.max_files_per_drain);

    let mut sample_tick = interval(Duration::from_secs(config.schedule.sample_interval_s));
    sample_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut drain_tick = interval(Duration::from_secs(config.schedule.drain_interval_s));
    drain_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Entering control loop");
    info!("Press Ctrl+C to exit");

    let mut bus_open = true;
    let mut samples_seen: u64 = 0;

    loop {
        tokio::select! {
            chunk = chunk_rx.recv(), if bus_open => {
                let Some(chunk) = chunk else {
                    warn!("Sensor bus closed; continuing with uploads only");
                    bus_open = false;
                    continue;
                };

                match assembler.ingest(&chunk) {
                    ChunkOutcome::Completed(id) => {
                        debug!("Channel {} ready", id.0);
                        if assembler.all_ready() {
                            samples_seen += 1;
                            compose_and_store(
                                &mut assembler,
                                &mut composer,
                                &mut clock,
                                &mut gnss,
                                &layout,
                                &log,
                            )
                            .await;
                        }
                    }
                    ChunkOutcome::Dropped => debug!("Dropped orphan chunk ({} bytes)", chunk.len()),
                    _ => {}
                }
            }

            _ = sample_tick.tick() => {
                compose_and_store(
                    &mut assembler,
                    &mut composer,
                    &mut clock,
                    &mut gnss,
                    &layout,
                    &log,
                )
                .await;
                if assembler.is_assembling() {
                    warn!("Frame still assembling at sample tick");
                }
            }

            _ = drain_tick.tick() => {
                match drain.run(&log, &mut session).await {
                    Ok(report) if report.is_complete() => {
                        debug!("Drain pass complete ({} rows)", report.rows_sent);
                    }
                    Ok(report) => warn!("Drain pass incomplete: {:?}", report.aborted),
                    Err(e) => error!("Drain pass failed: {}", e),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Complete sample sets seen: {}", samples_seen);
                break;
            }
        }
    }

    bus_task.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        assert!(DEFAULT_CONFIG_PATH.ends_with(".toml"));
    }

    #[test]
    fn test_shipped_config_loads() {
        let config = Config::load(DEFAULT_CONFIG_PATH).expect("shipped config should be valid");
        assert_eq!(config.channels.len(), 2);
    }
}
