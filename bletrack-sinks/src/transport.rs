use std::io;
use std::time::Duration;

use tokio::net::{UdpSocket, lookup_host};
use tracing::{debug, info, warn};

/// Fixed delay between reconnect attempts; the owning loop schedules
/// them so nothing else stalls while the collector is away.
pub const RESOLVE_RETRY: Duration = Duration::from_secs(5);

/// Reconnect when the collector has not acknowledged for this long.
pub const MAX_ACK_INTERVAL_SECS: f64 = 40.0;

/// Application-level acknowledgment the collector echoes back.
const ACK_TOKEN: &[u8; 3] = b"ACK";

/// Connected UDP pipe to the collector with application-level liveness.
/// Resolution failures are never fatal; send failures are logged and the
/// packet forgotten; only ack staleness (or a hard send error) tears the
/// socket down for the caller to reconnect.
pub struct Transport {
    host: String,
    port: u16,
    socket: Option<UdpSocket>,
    last_ack: f64,
}

impl Transport {
    pub fn new(host: String, port: u16, now: f64) -> Transport {
        Transport {
            host,
            port,
            socket: None,
            last_ack: now,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    pub fn last_ack(&self) -> f64 {
        self.last_ack
    }

    /// True when the collector has gone quiet past the liveness window.
    pub fn stale(&self, now: f64, max_ack_interval: f64) -> bool {
        now - self.last_ack > max_ack_interval
    }

    /// Restart the liveness window, e.g. right after (re)connecting.
    pub fn mark_alive(&mut self, now: f64) {
        self.last_ack = now;
    }

    /// One resolve-and-connect attempt, dropping any old socket first.
    /// A failure is logged and reported back; the caller retries on its
    /// own schedule, so resolution trouble never wedges the event loop.
    pub async fn connect_once(&mut self) -> bool {
        self.socket = None;
        match self.try_connect().await {
            Ok(socket) => {
                self.socket = Some(socket);
                true
            }
            Err(e) => {
                warn!(host = %self.host, error = %e, "collector not reachable yet");
                false
            }
        }
    }

    /// Tear the socket down; the caller's reconnect schedule takes over.
    pub fn disconnect(&mut self) {
        self.socket = None;
    }

    async fn try_connect(&self) -> io::Result<UdpSocket> {
        let mut addrs = lookup_host((self.host.as_str(), self.port)).await?;
        let addr = addrs.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "lookup returned no addresses")
        })?;
        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(addr).await?;
        info!(%addr, "connected to collector");
        Ok(socket)
    }

    /// Fire-and-forget datagram send. Failures are logged and never
    /// retried for this packet; a hard error drops the socket so the
    /// caller reconnects.
    pub fn send(&mut self, packet: &[u8]) -> bool {
        let Some(socket) = &self.socket else {
            debug!("not connected, packet dropped");
            return false;
        };
        match socket.try_send(packet) {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("socket not writable, packet dropped");
                false
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                warn!("collector refused packet");
                self.socket = None;
                false
            }
            Err(e) => {
                warn!(error = %e, "send failed");
                self.socket = None;
                false
            }
        }
    }

    /// Resolves when the socket is readable; pends forever while
    /// disconnected so it can sit in a select arm.
    pub async fn ack_readable(&self) {
        match &self.socket {
            Some(socket) => {
                // Readiness only; poll_acks does the reads.
                let _ = socket.readable().await;
            }
            None => std::future::pending().await,
        }
    }

    /// Drain inbound datagrams, looking for the collector's ack token.
    pub fn poll_acks(&mut self, now: f64) {
        let Some(socket) = &self.socket else {
            return;
        };
        let mut buf = [0u8; 64];
        loop {
            match socket.try_recv(&mut buf) {
                Ok(n) => {
                    if contains_ack(&buf[..n]) {
                        self.last_ack = now;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!(error = %e, "collector read error");
                    break;
                }
            }
        }
    }
}

fn contains_ack(buf: &[u8]) -> bool {
    buf.windows(ACK_TOKEN.len()).any(|w| w == ACK_TOKEN)
}
