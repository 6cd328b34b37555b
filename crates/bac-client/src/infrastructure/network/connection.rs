//! The client side of a control connection.
//!
//! [`ControllerClient`] wraps a tokio `TcpStream`.  Outgoing commands are
//! encoded with the shared codec; incoming bytes go through the same
//! [`JsonFramer`] the server uses, so replies may arrive in any chunking.
//!
//! Only `get_slots` and `request_slot` are answered.  The request helpers
//! send and then wait for the next reply, checking that it answers the
//! command just sent.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use bac_core::protocol::{
    decode_reply, encode_command, Command, JsonFramer, Reply, SlotStatus, READ_CHUNK_SIZE,
};
use serde_json::{Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::ClientError;

/// An open control connection to a server.
pub struct ControllerClient {
    stream: TcpStream,
    server: SocketAddr,
    framer: JsonFramer,
    pending: VecDeque<Value>,
}

impl ControllerClient {
    /// Connects to the control socket at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectFailed`] if the TCP connect fails.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::ConnectFailed { addr, source })?;
        stream.set_nodelay(true)?;
        debug!("connected to {addr}");
        Ok(Self {
            stream,
            server: addr,
            framer: JsonFramer::new(),
            pending: VecDeque::new(),
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    /// Asks for the slot list.
    pub async fn get_slots(&mut self, timeout: Duration) -> Result<Vec<SlotStatus>, ClientError> {
        self.send(&Command::GetSlots).await?;
        match self.next_reply(timeout).await? {
            Reply::GetSlots(statuses) => Ok(statuses),
            other => Err(ClientError::UnexpectedReply {
                expected: "get_slots",
                got: other.name(),
            }),
        }
    }

    /// Asks for slot `slot`; returns whether it was granted.
    pub async fn request_slot(&mut self, slot: usize, timeout: Duration) -> Result<bool, ClientError> {
        self.send(&Command::RequestSlot { slot }).await?;
        match self.next_reply(timeout).await? {
            Reply::RequestSlot { granted } => Ok(granted),
            other => Err(ClientError::UnexpectedReply {
                expected: "request_slot",
                got: other.name(),
            }),
        }
    }

    /// Gives up the held slot.  The server does not answer.
    pub async fn relinquish_slot(&mut self) -> Result<(), ClientError> {
        self.send(&Command::RelinquishSlot).await
    }

    /// Reports peripheral values.  The server does not answer.
    pub async fn update_peripherals(&mut self, values: Map<String, Value>) -> Result<(), ClientError> {
        self.send(&Command::UpdatePeripherals(values)).await
    }

    /// Writes one command.
    pub async fn send(&mut self, command: &Command) -> Result<(), ClientError> {
        self.stream.write_all(&encode_command(command)).await?;
        Ok(())
    }

    /// Waits for the next reply that decodes cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Timeout`] if nothing usable arrives in time and
    /// [`ClientError::Closed`] if the server hangs up.
    pub async fn next_reply(&mut self, timeout: Duration) -> Result<Reply, ClientError> {
        tokio::time::timeout(timeout, self.read_reply())
            .await
            .map_err(|_| ClientError::Timeout(timeout))?
    }

    async fn read_reply(&mut self) -> Result<Reply, ClientError> {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            while let Some(value) = self.pending.pop_front() {
                match decode_reply(&value) {
                    Ok(reply) => return Ok(reply),
                    Err(e) => warn!("skipping reply from {}: {e}", self.server),
                }
            }

            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(ClientError::Closed);
            }
            for frame in self.framer.feed(&buf[..n]) {
                match frame {
                    Ok(value) => self.pending.push_back(value),
                    Err(e) => warn!("malformed data from {}: {e}", self.server),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// A connected client and the raw server side of its socket.
    async fn pair() -> (ControllerClient, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(ControllerClient::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_send_writes_one_encoded_command() {
        // Arrange
        let (mut client, mut server) = pair().await;

        // Act
        client.send(&Command::RequestSlot { slot: 3 }).await.unwrap();
        let mut buf = vec![0u8; 256];
        let n = server.read(&mut buf).await.unwrap();

        // Assert
        let value: Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(value["command"], "request_slot");
        assert_eq!(value["args"], serde_json::json!([3]));
    }

    #[tokio::test]
    async fn test_next_reply_reassembles_split_reply() {
        let (mut client, mut server) = pair().await;

        server.write_all(br#"{"bac":1,"response":"reque"#).await.unwrap();
        server.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.write_all(b"st_slot\",\"args\":[1]}\n").await.unwrap();

        let reply = client.next_reply(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply, Reply::RequestSlot { granted: true });
    }

    #[tokio::test]
    async fn test_next_reply_skips_wrong_version() {
        let (mut client, mut server) = pair().await;

        server
            .write_all(b"{\"bac\":9,\"response\":\"request_slot\",\"args\":[1]}\n{\"bac\":1,\"response\":\"request_slot\",\"args\":[0]}\n")
            .await
            .unwrap();

        let reply = client.next_reply(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply, Reply::RequestSlot { granted: false });
    }

    #[tokio::test]
    async fn test_next_reply_reports_closed_connection() {
        let (mut client, server) = pair().await;
        drop(server);

        let result = client.next_reply(Duration::from_secs(1)).await;

        assert!(matches!(result, Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn test_next_reply_times_out() {
        let (mut client, _server) = pair().await;

        let result = client.next_reply(Duration::from_millis(30)).await;

        assert!(matches!(result, Err(ClientError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_get_slots_rejects_mismatched_reply() {
        let (mut client, mut server) = pair().await;
        server
            .write_all(b"{\"bac\":1,\"response\":\"request_slot\",\"args\":[1]}\n")
            .await
            .unwrap();

        let result = client.get_slots(Duration::from_secs(1)).await;

        assert!(matches!(
            result,
            Err(ClientError::UnexpectedReply {
                expected: "get_slots",
                got: "request_slot"
            })
        ));
    }
}
