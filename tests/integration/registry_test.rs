//! Registry behavior over the wire

use super::{spawn_registry, TEST_TOKEN};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use vaultfs_protocol::{Command, Packet, StoreCodec, WireEvent};

async fn raw_call(addr: &str, packet: Packet) -> Option<Packet> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut framed = Framed::new(stream, StoreCodec::new());
    framed.send(packet).await.unwrap();
    match framed.next().await {
        Some(Ok(WireEvent::Packet(p))) => Some(p),
        _ => None,
    }
}

fn with_token(command: Command, data: &str) -> Packet {
    Packet::new(command, Some(TEST_TOKEN.to_owned()), data.as_bytes().to_vec())
}

async fn fire_and_forget(addr: &str, packet: Packet) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut framed = Framed::new(stream, StoreCodec::new());
    framed.send(packet).await.unwrap();
}

/// A node that stops heartbeating disappears from the member list.
#[tokio::test]
async fn test_registry_eviction() {
    let registry = spawn_registry(200).await;

    fire_and_forget(&registry, with_token(Command::HeartbeatDatanode, "a:1|5")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let reply = raw_call(&registry, with_token(Command::GetDatanodes, ""))
        .await
        .unwrap();
    assert_eq!(reply.command, Command::ResponseDatanodes);
    assert!(reply.text().contains("a:1|5"), "{}", reply.text());

    tokio::time::sleep(Duration::from_millis(400)).await;
    let reply = raw_call(&registry, with_token(Command::GetDatanodes, ""))
        .await
        .unwrap();
    assert!(!reply.text().contains("a:1"), "{}", reply.text());
}

/// Register and heartbeat are the same upsert; both roles are tracked
/// independently.
#[tokio::test]
async fn test_register_both_roles() {
    let registry = spawn_registry(30_000).await;

    fire_and_forget(&registry, with_token(Command::RegisterDatanode, "d:1|77")).await;
    fire_and_forget(&registry, with_token(Command::RegisterNamenode, "n:1")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    fire_and_forget(&registry, with_token(Command::HeartbeatDatanode, "d:1|99")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let datanodes = raw_call(&registry, with_token(Command::GetDatanodes, ""))
        .await
        .unwrap();
    assert_eq!(datanodes.text(), "d:1|99");

    let namenodes = raw_call(&registry, with_token(Command::GetNamenodes, ""))
        .await
        .unwrap();
    assert_eq!(namenodes.command, Command::ResponseNamenodes);
    assert_eq!(namenodes.text(), "n:1");
}

/// Token mismatch yields "Authentication Failed" and a closed connection.
#[tokio::test]
async fn test_bad_token() {
    let registry = spawn_registry(30_000).await;
    let reply = raw_call(
        &registry,
        Packet::new(Command::GetDatanodes, Some("nope".to_owned()), ""),
    )
    .await
    .unwrap();
    assert_eq!(reply.command, Command::Error);
    assert_eq!(reply.text(), "Authentication Failed");
}

/// Commands outside the registry surface are answered with ERROR.
#[tokio::test]
async fn test_unknown_command() {
    let registry = spawn_registry(30_000).await;
    let reply = raw_call(&registry, with_token(Command::PreUpload, "abcd"))
        .await
        .unwrap();
    assert_eq!(reply.command, Command::Error);
}
