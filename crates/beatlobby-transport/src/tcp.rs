//! Player channel: length-prefixed frames over TCP.
//!
//! Every message is a `u32` big-endian length followed by that many payload
//! bytes. Frames longer than the configured cap are rejected by the decoder
//! before the payload is buffered, so a misbehaving client cannot make the
//! server allocate unbounded memory.

use std::net::SocketAddr;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Default cap on a single frame's payload (64 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

fn frame_codec(max_frame_size: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(max_frame_size)
        .new_codec()
}

/// A TCP [`Transport`] that listens for player connections.
pub struct TcpTransport {
    listener: TcpListener,
    max_frame_size: usize,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(
        addr: &str,
        max_frame_size: usize,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, max_frame_size, "player transport listening");
        Ok(Self {
            listener,
            max_frame_size,
        })
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%addr, error = %e, "failed to set TCP_NODELAY");
        }

        let conn = TcpConnection::new(stream, addr, self.max_frame_size);
        tracing::debug!(id = %conn.id, %addr, "accepted player connection");
        Ok(conn)
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// A single framed TCP connection.
///
/// The read and write halves are locked independently so one task can
/// block in [`recv`](Connection::recv) while another drains an outbound
/// queue through [`send`](Connection::send).
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    reader: Mutex<FramedRead<OwnedReadHalf, LengthDelimitedCodec>>,
    writer: Mutex<FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>>,
}

impl TcpConnection {
    /// Wraps an already-connected stream.
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        max_frame_size: usize,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            id: ConnectionId::next(),
            peer,
            reader: Mutex::new(FramedRead::new(
                read_half,
                frame_codec(max_frame_size),
            )),
            writer: Mutex::new(FramedWrite::new(
                write_half,
                frame_codec(max_frame_size),
            )),
        }
    }

    /// Opens an outbound connection (used by tools and tests that play
    /// the client role).
    pub async fn connect(
        addr: &str,
        max_frame_size: usize,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let peer = stream
            .peer_addr()
            .map_err(TransportError::AcceptFailed)?;
        Ok(Self::new(stream, peer, max_frame_size))
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, data: Bytes) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .send(data)
            .await
            .map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Bytes>, Self::Error> {
        match self.reader.lock().await.next().await {
            Some(Ok(frame)) => Ok(Some(frame.freeze())),
            Some(Err(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                Err(TransportError::InvalidFrame(e.to_string()))
            }
            Some(Err(e)) => Err(TransportError::ReceiveFailed(e)),
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        SinkExt::<Bytes>::close(&mut *writer)
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
