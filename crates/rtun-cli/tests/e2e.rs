//! End-to-end scenarios wiring the rendezvous engine and the pairing agent
//! together over real loopback sockets, per the tunnel's testable scenarios:
//! a public caller, a client-side target, and the server in between.

use std::time::Duration;

use rtun_client::agent::ClientAgent;
use rtun_client::config::ClientConfig;
use rtun_server::config::ServerConfig;
use rtun_server::engine::RendezvousEngine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

/// Accepts one connection, echoes everything it reads until EOF, then shuts
/// down its write side. Used as the "target" behind the tunnel.
async fn spawn_echo_target(target_addr: String) {
    let listener = TcpListener::bind(&target_addr).await.unwrap();
    tokio::spawn(async move {
        loop {
            let (mut conn, _) = match listener.accept().await {
                Ok(c) => c,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let (mut r, mut w) = conn.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
                let _ = w.shutdown().await;
            });
        }
    });
}

#[tokio::test]
async fn happy_path_round_trips_bytes_through_the_tunnel() {
    let public_addr = free_addr().await;
    let client_addr = free_addr().await;
    let target_addr = free_addr().await;

    spawn_echo_target(target_addr.clone()).await;

    let server_config = ServerConfig::load(
        None,
        Some(&public_addr),
        Some(&client_addr),
        Some(10),
    )
    .unwrap();
    let engine = RendezvousEngine::new(server_config);
    tokio::spawn(engine.run());

    let client_config =
        ClientConfig::load(None, Some(&client_addr), Some(&target_addr), Some(1)).unwrap();
    let agent = ClientAgent::new(client_config);
    tokio::spawn(agent.run());

    // Give the client a moment to register its control channel.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut caller = TcpStream::connect(&public_addr).await.unwrap();
    caller.write_all(b"hello\n").await.unwrap();
    caller.shutdown().await.unwrap();

    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), caller.read_to_end(&mut reply))
        .await
        .expect("relay should complete")
        .unwrap();
    assert_eq!(reply, b"hello\n");
}

#[tokio::test]
async fn no_client_registered_times_out_the_public_caller() {
    let public_addr = free_addr().await;
    let client_addr = free_addr().await;

    let server_config =
        ServerConfig::load(None, Some(&public_addr), Some(&client_addr), Some(1)).unwrap();
    let engine = RendezvousEngine::new(server_config);
    tokio::spawn(engine.run());

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut caller = TcpStream::connect(&public_addr).await.unwrap();
    let mut buf = [0u8; 1];
    let result = tokio::time::timeout(Duration::from_secs(3), caller.read(&mut buf))
        .await
        .expect("server must close the caller at or before the pair timeout");
    assert_eq!(result.unwrap(), 0, "caller should observe EOF, not data");
}

#[tokio::test]
async fn second_control_client_is_rejected_and_first_keeps_serving() {
    let public_addr = free_addr().await;
    let client_addr = free_addr().await;
    let target_addr = free_addr().await;

    spawn_echo_target(target_addr.clone()).await;

    let server_config =
        ServerConfig::load(None, Some(&public_addr), Some(&client_addr), Some(5)).unwrap();
    let engine = RendezvousEngine::new(server_config);
    tokio::spawn(engine.run());

    let client_config =
        ClientConfig::load(None, Some(&client_addr), Some(&target_addr), Some(1)).unwrap();
    let agent = ClientAgent::new(client_config);
    tokio::spawn(agent.run());

    tokio::time::sleep(Duration::from_millis(200)).await;

    // A second control registration attempt should be closed by the server.
    let mut second = TcpStream::connect(&client_addr).await.unwrap();
    second.write_all(b"CONTROL\n").await.unwrap();
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf))
        .await
        .expect("second control client should be closed promptly")
        .unwrap();
    assert_eq!(n, 0);

    // The first client should still be able to serve a public caller.
    let mut caller = TcpStream::connect(&public_addr).await.unwrap();
    caller.write_all(b"still alive\n").await.unwrap();
    caller.shutdown().await.unwrap();
    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), caller.read_to_end(&mut reply))
        .await
        .expect("relay should complete")
        .unwrap();
    assert_eq!(reply, b"still alive\n");
}
