//! Framing over a byte-stream channel: magic, identifier, integer, string and packet values.
//!
//! Integers are 4 bytes big-endian signed; strings and packets are length-prefixed.
//! Reads return `Ok(None)` when the peer sent something unusable (stream ended early,
//! wrong magic, negative length). There is no resynchronisation: callers abort the exchange.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::identity::{Identifier, ID_LENGTH};
use crate::packet::{Packet, PacketError, LEN_SIZE};

/// Handshake marker sent first by both sides.
pub const MAGIC: [u8; 6] = [0x00, 0x47, 0x61, 0x79, 0x36, 0x39];

/// Listening port of the server side when the channel is TCP.
pub const DEFAULT_PORT: u16 = 20666;

/// Largest string or packet frame accepted from a peer.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024; // 16 MiB

/// A duplex channel speaking the relay framing.
pub struct Wire<S> {
    stream: S,
}

impl<S> Wire<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub async fn send_magic(&mut self) -> Result<(), WireError> {
        self.stream.write_all(&MAGIC).await?;
        Ok(())
    }

    pub async fn send_id(&mut self, id: &Identifier) -> Result<(), WireError> {
        self.stream.write_all(id.as_bytes()).await?;
        Ok(())
    }

    pub async fn send_int(&mut self, value: i32) -> Result<(), WireError> {
        self.stream.write_all(&value.to_be_bytes()).await?;
        Ok(())
    }

    pub async fn send_string(&mut self, text: &str) -> Result<(), WireError> {
        let len = frame_len(text.len())?;
        self.send_int(len).await?;
        self.stream.write_all(text.as_bytes()).await?;
        Ok(())
    }

    /// Length prefix (the packet's encoded length) followed by the encoded packet.
    pub async fn send_packet(&mut self, packet: &Packet) -> Result<(), WireError> {
        let len = frame_len(packet.encoded_len())?;
        let mut frame = Vec::with_capacity(LEN_SIZE + packet.encoded_len());
        frame.extend_from_slice(&len.to_be_bytes());
        packet.encode_into(&mut frame)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), WireError> {
        self.stream.flush().await?;
        Ok(())
    }

    /// `Some` only if the next six bytes are exactly [`MAGIC`].
    pub async fn recv_magic(&mut self) -> Result<Option<[u8; 6]>, WireError> {
        let mut magic = [0u8; MAGIC.len()];
        if !self.read_element(&mut magic).await? || magic != MAGIC {
            return Ok(None);
        }
        Ok(Some(magic))
    }

    pub async fn recv_id(&mut self) -> Result<Option<Identifier>, WireError> {
        let mut bytes = [0u8; ID_LENGTH];
        if !self.read_element(&mut bytes).await? {
            return Ok(None);
        }
        Ok(Some(Identifier::from_bytes(bytes)))
    }

    pub async fn recv_int(&mut self) -> Result<Option<i32>, WireError> {
        let mut bytes = [0u8; LEN_SIZE];
        if !self.read_element(&mut bytes).await? {
            return Ok(None);
        }
        Ok(Some(i32::from_be_bytes(bytes)))
    }

    /// `None` on a short read, a negative length, or invalid UTF-8.
    pub async fn recv_string(&mut self) -> Result<Option<String>, WireError> {
        let Some(bytes) = self.recv_frame().await? else {
            return Ok(None);
        };
        Ok(String::from_utf8(bytes).ok())
    }

    /// Reads one length-prefixed packet. A frame that does not decode to exactly its
    /// declared length is an error rather than an absent value.
    pub async fn recv_packet(&mut self) -> Result<Option<Packet>, WireError> {
        let Some(bytes) = self.recv_frame().await? else {
            return Ok(None);
        };
        let (packet, consumed) = Packet::decode(&bytes)?;
        if consumed != bytes.len() {
            return Err(WireError::FrameMismatch {
                declared: bytes.len(),
                decoded: consumed,
            });
        }
        Ok(Some(packet))
    }

    async fn recv_frame(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        let Some(len) = self.recv_int().await? else {
            return Ok(None);
        };
        if len < 0 {
            return Ok(None);
        }
        let len = len as usize;
        if len > MAX_FRAME_LEN {
            return Err(WireError::TooLarge(len));
        }
        let mut bytes = vec![0u8; len];
        if !self.read_element(&mut bytes).await? {
            return Ok(None);
        }
        Ok(Some(bytes))
    }

    /// Fill `buf` completely. Returns false if the stream ends first.
    async fn read_element(&mut self, buf: &mut [u8]) -> Result<bool, WireError> {
        match self.stream.read_exact(buf).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn frame_len(len: usize) -> Result<i32, WireError> {
    if len > MAX_FRAME_LEN {
        return Err(WireError::TooLarge(len));
    }
    Ok(len as i32)
}

/// Error on the channel itself or in a frame the peer sent.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed packet: {0}")]
    Packet(#[from] PacketError),
    #[error("frame too large: {0} bytes")]
    TooLarge(usize),
    #[error("frame declared {declared} bytes but packet used {decoded}")]
    FrameMismatch { declared: usize, decoded: usize },
}
