//! The async client against a real server running its event loop on a
//! background thread.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bac_client::{wait_for_announcement, ClientError, ControllerClient};
use bac_server::{NullLog, Server, ServerOptions};
use serde_json::{json, Map};
use tokio::net::UdpSocket;

const TIMEOUT: Duration = Duration::from_secs(2);

/// A server pumped by a background thread until dropped.
struct RunningServer {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RunningServer {
    fn start(slots: &[&str], broadcast_target: SocketAddr) -> Self {
        let options = ServerOptions {
            name: "Client Test".to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            broadcast_target,
            broadcast_interval: Duration::from_millis(50),
            ..ServerOptions::default()
        };
        let mut server = Server::bind(&options).expect("bind").with_log(NullLog);
        for name in slots {
            server.add_slot(*name);
        }
        let addr = server.local_addr();

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            while flag.load(Ordering::Relaxed) {
                server.process();
                std::thread::sleep(Duration::from_millis(1));
            }
        });

        Self {
            addr,
            running,
            handle: Some(handle),
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

async fn discovery_socket() -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    (socket, addr)
}

#[tokio::test]
async fn test_client_discovers_server_over_loopback() {
    // Arrange
    let (socket, target) = discovery_socket().await;
    let server = RunningServer::start(&["Slot 0"], target);

    // Act
    let found = wait_for_announcement(&socket, TIMEOUT).await.unwrap();

    // Assert
    assert_eq!(found.name, "Client Test");
    assert_eq!(found.addr, server.addr);
}

#[tokio::test]
async fn test_client_full_session_flow() {
    // Arrange
    let (_socket, target) = discovery_socket().await;
    let server = RunningServer::start(&["Slot 0", "Slot 1"], target);
    let mut client = ControllerClient::connect(server.addr).await.unwrap();

    // Act / Assert
    let slots = client.get_slots(TIMEOUT).await.unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[1].name, "Slot 1");
    assert!(slots.iter().all(|s| s.available));

    assert!(client.request_slot(1, TIMEOUT).await.unwrap());

    let mut update = Map::new();
    update.insert("touch_points".to_string(), json!([[5, 6]]));
    client.update_peripherals(update).await.unwrap();

    let slots = client.get_slots(TIMEOUT).await.unwrap();
    assert!(!slots[1].available);

    client.relinquish_slot().await.unwrap();
    let slots = client.get_slots(TIMEOUT).await.unwrap();
    assert!(slots[1].available);
}

#[tokio::test]
async fn test_second_client_is_refused_until_first_disconnects() {
    // Arrange
    let (_socket, target) = discovery_socket().await;
    let server = RunningServer::start(&["Slot 0"], target);
    let mut a = ControllerClient::connect(server.addr).await.unwrap();
    let mut b = ControllerClient::connect(server.addr).await.unwrap();
    assert!(a.request_slot(0, TIMEOUT).await.unwrap());

    // Act
    let refused = b.request_slot(0, TIMEOUT).await.unwrap();
    drop(a);

    // Assert
    assert!(!refused);
    let mut granted = false;
    for _ in 0..100 {
        if b.request_slot(0, TIMEOUT).await.unwrap() {
            granted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(granted, "slot must be free once the holder disconnects");
}

#[tokio::test]
async fn test_commands_without_reply_do_not_produce_one() {
    let (_socket, target) = discovery_socket().await;
    let server = RunningServer::start(&["Slot 0"], target);
    let mut client = ControllerClient::connect(server.addr).await.unwrap();

    client.relinquish_slot().await.unwrap();
    let result = client.next_reply(Duration::from_millis(100)).await;

    assert!(matches!(result, Err(ClientError::Timeout(_))));
}
