//! Transport seam — the duplex, event-addressed channel everything runs on.
//!
//! A [`Transport`] emits named events and yields inbound ones in arrival
//! order. Disconnection is signalled by `recv` returning `None`; there is no
//! reconnection policy at this layer. Two implementations are provided: a
//! framed TCP transport for real connections and an in-memory pair for tests.

use crate::message::{
    decode_event, decode_length, encode_event, WireError, WireEvent, MAX_EVENT_SIZE,
};

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// A duplex, event-addressed channel between exactly two parties.
///
/// The transport guarantees in-order, exactly-once delivery of each event it
/// accepts for emission, for as long as the connection lives.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Emit one event to the peer.
    async fn emit(&self, event: WireEvent) -> Result<(), WireError>;

    /// Receive the next inbound event. `None` means the connection is gone.
    async fn recv(&self) -> Option<WireEvent>;
}

/// Write a framed event (4-byte length + JSON) to a stream.
pub async fn write_event<W: AsyncWrite + Unpin>(
    writer: &mut W,
    event: &WireEvent,
) -> Result<(), WireError> {
    let bytes = encode_event(event)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a framed event (4-byte length + JSON) from a stream.
pub async fn read_event<R: AsyncRead + Unpin>(reader: &mut R) -> Result<WireEvent, WireError> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed);
        }
        Err(e) => return Err(WireError::Io(e)),
    }

    let len = decode_length(&header);
    if len > MAX_EVENT_SIZE {
        return Err(WireError::EventTooLarge {
            size: len,
            max: MAX_EVENT_SIZE,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    decode_event(&body)
}

/// Framed TCP transport.
///
/// The read half is drained by a background task into an inbox channel so the
/// connection's end is observable as a closed inbox, matching the single
/// disconnect signal the protocol expects.
pub struct TcpTransport {
    writer: Mutex<tokio::net::tcp::OwnedWriteHalf>,
    inbox: Mutex<mpsc::Receiver<WireEvent>>,
    peer_addr: Option<SocketAddr>,
}

impl TcpTransport {
    /// Connect to a listening endpoint.
    pub async fn connect(addr: SocketAddr) -> Result<Self, WireError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an accepted or connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        let peer_addr = stream.peer_addr().ok();
        let (mut reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            loop {
                match read_event(&mut reader).await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(WireError::ConnectionClosed) => break,
                    Err(e) => {
                        debug!("FBP: read loop ended: {}", e);
                        break;
                    }
                }
            }
            // tx drops here, closing the inbox.
        });

        Self {
            writer: Mutex::new(writer),
            inbox: Mutex::new(rx),
            peer_addr,
        }
    }

    /// Address of the remote end, when known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn emit(&self, event: WireEvent) -> Result<(), WireError> {
        let mut writer = self.writer.lock().await;
        write_event(&mut *writer, &event).await
    }

    async fn recv(&self) -> Option<WireEvent> {
        self.inbox.lock().await.recv().await
    }
}

/// One end of an in-memory duplex pair.
pub struct MemoryTransport {
    tx: mpsc::Sender<WireEvent>,
    rx: Mutex<mpsc::Receiver<WireEvent>>,
}

/// Build a connected in-memory transport pair.
///
/// Events emitted on one end arrive on the other in order. Dropping one end
/// closes the other's inbox, mimicking a disconnect.
pub fn memory_pair() -> (MemoryTransport, MemoryTransport) {
    let (tx_a, rx_a) = mpsc::channel(64);
    let (tx_b, rx_b) = mpsc::channel(64);
    (
        MemoryTransport {
            tx: tx_a,
            rx: Mutex::new(rx_b),
        },
        MemoryTransport {
            tx: tx_b,
            rx: Mutex::new(rx_a),
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn emit(&self, event: WireEvent) -> Result<(), WireError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| WireError::ConnectionClosed)
    }

    async fn recv(&self) -> Option<WireEvent> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_memory_pair_roundtrip() {
        let (a, b) = memory_pair();
        a.emit(WireEvent::new("ping", json!(1))).await.unwrap();
        a.emit(WireEvent::new("ping", json!(2))).await.unwrap();

        let first = b.recv().await.unwrap();
        let second = b.recv().await.unwrap();
        assert_eq!(first.payload, json!(1));
        assert_eq!(second.payload, json!(2));
    }

    #[tokio::test]
    async fn test_memory_pair_disconnect_closes_inbox() {
        let (a, b) = memory_pair();
        drop(a);
        assert!(b.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_tcp_transport_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            TcpTransport::from_stream(stream)
        });

        let client = TcpTransport::connect(addr).await.unwrap();
        let server = accept.await.unwrap();

        client
            .emit(WireEvent::new("hello", json!({"n": 1})))
            .await
            .unwrap();
        let received = server.recv().await.unwrap();
        assert_eq!(received.event, "hello");
        assert_eq!(received.payload, json!({"n": 1}));

        server.emit(WireEvent::ready()).await.unwrap();
        let back = client.recv().await.unwrap();
        assert_eq!(back.event, "ready");
    }

    #[tokio::test]
    async fn test_tcp_disconnect_closes_inbox() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            TcpTransport::from_stream(stream)
        });

        let client = TcpTransport::connect(addr).await.unwrap();
        let server = accept.await.unwrap();

        drop(client);
        assert!(server.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        // A header claiming more than the allowed maximum.
        let len = MAX_EVENT_SIZE + 1;
        a.write_all(&len.to_be_bytes()).await.unwrap();

        match read_event(&mut b).await {
            Err(WireError::EventTooLarge { size, .. }) => assert_eq!(size, len),
            other => panic!("Expected EventTooLarge, got {other:?}"),
        }
    }
}
