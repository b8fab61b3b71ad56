//! The client pairing agent: maintains the outbound control connection and
//! spawns one worker per `NEW` notification to pair a fresh data channel
//! with the local target.

use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

use rtun_core::protocol::{read_message, write_message};
use rtun_core::Message;

use crate::config::ClientConfig;

/// Runs the client pairing agent.
pub struct ClientAgent {
    config: ClientConfig,
}

impl ClientAgent {
    pub fn new(config: ClientConfig) -> Arc<Self> {
        Arc::new(Self { config })
    }

    /// Loop forever: dial the control channel, relay `NEW` notifications into
    /// data-pairing workers, and reconnect with a fixed backoff whenever the
    /// control session ends.
    pub async fn run(self: Arc<Self>) -> ! {
        loop {
            match self.run_control_session().await {
                Ok(()) => {}
                Err(err) => {
                    warn!(error = %err, "control session ended");
                }
            }
            tokio::time::sleep(self.config.reconnect_backoff).await;
        }
    }

    async fn run_control_session(self: &Arc<Self>) -> Result<(), rtun_core::RtunError> {
        let mut stream = TcpStream::connect(&self.config.server_addr).await?;
        stream.write_all(Message::Control.encode().as_bytes()).await?;
        stream.flush().await?;

        info!(server = %self.config.server_addr, "control connected");

        let mut reader = BufReader::new(stream);
        loop {
            let msg = read_message(&mut reader).await?;
            match msg {
                Message::New(id) => {
                    let agent = self.clone();
                    tokio::spawn(async move { agent.handle_new(id).await });
                }
                other => {
                    warn!(?other, "unexpected message on control channel");
                }
            }
        }
    }

    async fn handle_new(self: Arc<Self>, id: String) {
        let mut data_stream = match TcpStream::connect(&self.config.server_addr).await {
            Ok(s) => s,
            Err(err) => {
                warn!(conn_id = %id, error = %err, "dial data channel failed");
                return;
            }
        };

        if let Err(err) = write_message(&mut data_stream, &Message::Data(id.clone())).await {
            warn!(conn_id = %id, error = %err, "send data hello failed");
            return;
        }

        let target_stream = match TcpStream::connect(&self.config.target_addr).await {
            Ok(s) => s,
            Err(err) => {
                warn!(conn_id = %id, target = %self.config.target_addr, error = %err, "dial target failed");
                return;
            }
        };

        info!(conn_id = %id, target = %self.config.target_addr, "relay start");
        rtun_core::relay::splice(data_stream, target_stream).await;
        info!(conn_id = %id, "relay end");
    }
}
