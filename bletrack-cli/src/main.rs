use std::os::fd::{FromRawFd, RawFd};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use bletrack_domain::clock::{Clock, MonotonicClock};
use bletrack_domain::identity::BeaconIdentity;
use bletrack_domain::path_loss::PathModel;
use bletrack_domain::registry::{MAX_INACTIVE_SECS, Registry, evict_stale};
use bletrack_domain::snapshot::registry_json;
use bletrack_hci::classify::classify;
use bletrack_hci::decoder::decode_event;
use bletrack_hci::framing::FrameBuffer;
use bletrack_sinks::report::ReportEncoder;
use bletrack_sinks::transport::{MAX_ACK_INTERVAL_SECS, RESOLVE_RETRY, Transport};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// inherited descriptor carrying the HCI event stream, opened by the
    /// privileged launcher before dropping to this process
    #[arg(long)]
    hci_fd: RawFd,

    /// collector hostname
    #[arg(long, default_value = "127.0.0.1")]
    remote_host: String,

    /// collector port
    #[arg(long, default_value_t = 9999)]
    remote_port: u16,

    /// how often to batch a data report
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    report_interval: Duration,

    /// send a keepalive when no data has gone out for this long
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    keepalive_interval: Duration,

    /// log-distance path loss exponent
    #[arg(long, default_value_t = 3.2)]
    path_loss: f64,

    /// height above the antenna baseline, meters
    #[arg(long, default_value_t = 0.0)]
    haab: f64,

    /// dB offset folded into every raw RSSI sample
    #[arg(long, default_value_t = 0)]
    antenna_correction: i8,

    /// hostname carried in report headers (defaults to the system hostname)
    #[arg(long)]
    hostname: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let clock = MonotonicClock::new();
    let model = PathModel {
        path_loss_exponent: args.path_loss,
        haab: args.haab,
        antenna_correction: args.antenna_correction,
    };
    let hostname = match &args.hostname {
        Some(name) => name.clone(),
        None => system_hostname(),
    };
    let encoder = ReportEncoder::new(&hostname);
    let mut registry = Registry::new();
    let mut frames = FrameBuffer::new();

    let mut hci = hci_stream(args.hci_fd).context("attaching to the HCI descriptor")?;

    let mut transport = Transport::new(args.remote_host.clone(), args.remote_port, clock.now());
    if transport.connect_once().await {
        transport.mark_alive(clock.now());
    }
    info!(hostname = %hostname, "listener up");

    let mut report_timer = interval(args.report_interval);
    let mut gc_timer = interval(Duration::from_secs_f64(MAX_INACTIVE_SECS / 2.0));
    // Only polled while disconnected; Delay keeps a long connected
    // stretch from bursting retries when the socket finally drops.
    let mut reconnect_timer = interval(RESOLVE_RETRY);
    reconnect_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_data_send = clock.now();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;

    let mut read_buf = [0u8; 4096];
    loop {
        tokio::select! {
            read = hci.read(&mut read_buf) => {
                let n = read.context("reading the HCI stream")?;
                if n == 0 {
                    info!("HCI stream closed");
                    break;
                }
                frames.extend(&read_buf[..n]);
                let now = clock.now();
                while let Some(body) = frames.next_event() {
                    handle_event(&body, now, &mut registry, &model, &encoder, &mut transport);
                }
            }
            _ = transport.ack_readable() => {
                transport.poll_acks(clock.now());
            }
            _ = reconnect_timer.tick(), if !transport.is_connected() => {
                if transport.connect_once().await {
                    transport.mark_alive(clock.now());
                }
            }
            _ = report_timer.tick() => {
                let now = clock.now();
                if transport.is_connected() && transport.stale(now, MAX_ACK_INTERVAL_SECS) {
                    warn!("collector ack timeout, reconnecting");
                    transport.disconnect();
                }
                let (data, keepalive) = tick_packets(
                    &encoder,
                    &mut registry,
                    now,
                    last_data_send,
                    args.keepalive_interval.as_secs_f64(),
                );
                if let Some(packet) = data {
                    if transport.send(&packet) {
                        last_data_send = now;
                    }
                }
                if let Some(packet) = keepalive {
                    transport.send(&packet);
                }
            }
            _ = gc_timer.tick() => {
                let now = clock.now();
                registry.visit(&mut [&mut evict_stale(now, MAX_INACTIVE_SECS)]);
            }
            _ = sigusr1.recv() => {
                info!(beacons = registry.len(), "registry snapshot follows");
                println!("{}", registry_json(&mut registry, clock.now()));
            }
            _ = sigterm.recv() => {
                info!("SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("SIGINT, shutting down");
                break;
            }
        }
    }
    // Dropping the stream closes the controller socket; the privileged
    // launcher disables scanning when it reaps us.
    info!("listener stopped");
    Ok(())
}

/// Run one decoded controller event through the pipeline: classify each
/// advertisement, fold it into its registry record, and report secure
/// beacons immediately.
fn handle_event(
    body: &[u8],
    now: f64,
    registry: &mut Registry,
    model: &PathModel,
    encoder: &ReportEncoder,
    transport: &mut Transport,
) {
    let records = match decode_event(body) {
        Ok(records) => records,
        Err(e) => {
            debug!(error = %e, "dropped undecodable event");
            return;
        }
    };
    for advertisement in records {
        let Some(beacon) = classify(&advertisement) else {
            continue;
        };
        let secure = matches!(beacon.identity, BeaconIdentity::Secure { .. });
        let record = registry.find_or_add(beacon.identity);
        record.observe(advertisement.rssi, beacon.tx_power, now, model);
        if secure {
            if let Some(packet) = encoder.encode_secure(record, &beacon.payload) {
                transport.send(&packet);
            }
        }
    }
}

/// Decide what one report tick puts on the wire: the batched data packet
/// when any beacon contributed since the last pass, otherwise a keepalive
/// in its place. A keepalive is also forced once no data has gone out for
/// a whole keepalive interval, but never two in the same tick.
fn tick_packets(
    encoder: &ReportEncoder,
    registry: &mut Registry,
    now: f64,
    last_data_send: f64,
    keepalive_interval: f64,
) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
    let data = encoder.encode_data(registry);
    let keepalive = if data.is_none() || now - last_data_send > keepalive_interval {
        Some(encoder.keepalive())
    } else {
        None
    };
    (data, keepalive)
}

fn hci_stream(fd: RawFd) -> Result<UnixStream> {
    // Sole owner of the inherited descriptor from here on.
    let stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(fd) };
    stream
        .set_nonblocking(true)
        .context("setting the HCI descriptor non-blocking")?;
    UnixStream::from_std(stream).context("registering the HCI descriptor with the reactor")
}

fn system_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
