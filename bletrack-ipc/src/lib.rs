//! Typed command channel to the privileged peer process.
//!
//! The unprivileged side relays configuration changes over a local byte
//! stream as newline-delimited JSON. Every request carries a serial;
//! responses correlate by serial and may arrive on later loop
//! iterations, out of order. The channel never assumes a synchronous
//! round trip.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Requests in flight beyond this are rejected immediately, not queued.
pub const MAX_OUTSTANDING: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    /// Stage one key/value configuration change.
    SetConfig { key: String, value: String },
    /// Apply everything staged so far.
    Commit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Invalid,
    Busy,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub serial: u64,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub serial: u64,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("too many requests in flight (cap {MAX_OUTSTANDING})")]
    Busy,
    #[error("response for unknown serial {0}")]
    UnknownSerial(u64),
    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Client half of the channel: stamps requests with increasing serials,
/// tracks what is outstanding, and matches responses as they arrive.
pub struct IpcClient<W> {
    writer: W,
    next_serial: u64,
    outstanding: Vec<u64>,
}

impl<W: AsyncWrite + Unpin> IpcClient<W> {
    pub fn new(writer: W) -> IpcClient<W> {
        IpcClient {
            writer,
            next_serial: 1,
            outstanding: Vec::new(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    /// Issue a command, returning its serial. Rejects with `Busy` when
    /// the in-flight cap is hit, before anything is written.
    pub async fn send(&mut self, command: Command) -> Result<u64, IpcError> {
        if self.outstanding.len() >= MAX_OUTSTANDING {
            return Err(IpcError::Busy);
        }
        let serial = self.next_serial;
        self.next_serial += 1;
        let mut line = serde_json::to_vec(&Request { serial, command })?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.outstanding.push(serial);
        Ok(serial)
    }

    /// Correlate one inbound response line with its request. A serial
    /// nobody is waiting on is an error; the caller logs and drops it.
    pub fn accept(&mut self, line: &str) -> Result<Response, IpcError> {
        let response: Response = serde_json::from_str(line)?;
        match self
            .outstanding
            .iter()
            .position(|&serial| serial == response.serial)
        {
            Some(at) => {
                self.outstanding.swap_remove(at);
                Ok(response)
            }
            None => Err(IpcError::UnknownSerial(response.serial)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Command, IpcClient, IpcError, MAX_OUTSTANDING, Request, Response, Status};
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn set(key: &str, value: &str) -> Command {
        Command::SetConfig {
            key: key.into(),
            value: value.into(),
        }
    }

    fn response(serial: u64, status: Status) -> String {
        serde_json::to_string(&Response {
            serial,
            status,
            detail: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn requests_are_serial_stamped_lines() {
        let (writer, reader) = tokio::io::duplex(1024);
        let mut client = IpcClient::new(writer);
        client.send(set("remote_host", "collector.local")).await.unwrap();
        client.send(Command::Commit).await.unwrap();
        assert_eq!(client.in_flight(), 2);

        let mut lines = BufReader::new(reader).lines();
        let first: Request =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: Request =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first.serial, 1);
        assert_eq!(first.command, set("remote_host", "collector.local"));
        assert_eq!(second.serial, 2);
        assert_eq!(second.command, Command::Commit);
    }

    #[tokio::test]
    async fn responses_correlate_out_of_order() {
        let (writer, _reader) = tokio::io::duplex(1024);
        let mut client = IpcClient::new(writer);
        let a = client.send(set("haab", "1.5")).await.unwrap();
        let b = client.send(Command::Commit).await.unwrap();

        // The peer answers the later request first.
        let late = client.accept(&response(b, Status::Ok)).unwrap();
        assert_eq!(late.serial, b);
        assert_eq!(client.in_flight(), 1);
        let early = client.accept(&response(a, Status::Invalid)).unwrap();
        assert_eq!(early.status, Status::Invalid);
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn unknown_serials_are_rejected() {
        let (writer, _reader) = tokio::io::duplex(64);
        let mut client = IpcClient::new(writer);
        assert!(matches!(
            client.accept(&response(99, Status::Ok)),
            Err(IpcError::UnknownSerial(99))
        ));
        // A serial cannot be consumed twice.
        let serial = client.send(Command::Commit).await.unwrap();
        client.accept(&response(serial, Status::Ok)).unwrap();
        assert!(matches!(
            client.accept(&response(serial, Status::Ok)),
            Err(IpcError::UnknownSerial(_))
        ));
    }

    #[tokio::test]
    async fn backlog_beyond_the_cap_is_rejected_immediately() {
        let (writer, _reader) = tokio::io::duplex(4096);
        let mut client = IpcClient::new(writer);
        for i in 0..MAX_OUTSTANDING {
            client.send(set("key", &i.to_string())).await.unwrap();
        }
        assert!(matches!(
            client.send(Command::Commit).await,
            Err(IpcError::Busy)
        ));
        // Draining one slot unblocks the next request.
        client.accept(&response(1, Status::Ok)).unwrap();
        assert!(client.send(Command::Commit).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_lines_are_codec_errors() {
        let (writer, _reader) = tokio::io::duplex(64);
        let mut client = IpcClient::new(writer);
        assert!(matches!(
            client.accept("not json"),
            Err(IpcError::Codec(_))
        ));
    }
}
