//! Bidirectional relay: splices two TCP streams together.
//!
//! Runs two concurrent copiers, one per direction. When a copier's source
//! reaches EOF or errors, it half-closes the write side of its destination
//! so the peer observes end-of-stream on its own read, then returns. Once
//! both copiers have returned, both streams are fully closed (dropping the
//! split halves closes the underlying socket). No user-space buffering
//! beyond a fixed-size copy buffer is introduced — the relay leans entirely
//! on kernel socket buffers, same as the gateway forwarder's TCP relay this
//! is grounded on.

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Splice two TCP streams into a single bidirectional relay.
///
/// Returns once both directions have drained and both streams are closed.
/// Errors on either copier are swallowed — the stream is torn down either
/// way, and there is no caller left to hand an error to once both halves of
/// the pairing are already committed to this relay.
pub async fn splice(a: TcpStream, b: TcpStream) {
    let (a_read, a_write) = a.into_split();
    let (b_read, b_write) = b.into_split();

    let forward = copy_and_shutdown(a_read, b_write, "a->b");
    let reverse = copy_and_shutdown(b_read, a_write, "b->a");

    tokio::join!(forward, reverse);
}

async fn copy_and_shutdown(mut src: OwnedReadHalf, mut dst: OwnedWriteHalf, label: &'static str) {
    let result = tokio::io::copy(&mut src, &mut dst).await;
    if let Err(err) = &result {
        debug!(direction = label, error = %err, "relay copier error");
    }
    let _ = dst.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let accept = listener.accept();
        let (connect, accept) = tokio::join!(connect, accept);
        (connect.unwrap(), accept.unwrap().0)
    }

    #[tokio::test]
    async fn echoes_bytes_in_both_directions() {
        let (left_near, left_far) = connected_pair().await;
        let (right_near, right_far) = connected_pair().await;

        tokio::spawn(splice(left_far, right_far));

        let mut left = left_near;
        let mut right = right_near;

        left.write_all(b"hello\n").await.unwrap();
        let mut buf = [0u8; 6];
        right.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");

        right.write_all(b"world\n").await.unwrap();
        let mut buf = [0u8; 6];
        left.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world\n");
    }

    #[tokio::test]
    async fn half_close_propagates_and_final_close_follows() {
        let (left_near, left_far) = connected_pair().await;
        let (right_near, right_far) = connected_pair().await;

        let relay = tokio::spawn(splice(left_far, right_far));

        let mut left = left_near;
        let mut right = right_near;

        left.write_all(b"ping\n").await.unwrap();
        left.shutdown().await.unwrap();

        let mut received = Vec::new();
        right.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"ping\n");

        // The peer can still write back after observing our half-close.
        right.write_all(b"OK\n").await.unwrap();
        right.shutdown().await.unwrap();

        let mut reply = Vec::new();
        left.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"OK\n");

        relay.await.unwrap();
    }
}
