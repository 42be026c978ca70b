use crate::protocol::error::{ApiRpcError, Result};
use crate::protocol::Message;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (100 MB)
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Header bytes following the length prefix: kind, flag, sequence
const HEADER_LEN: usize = 6;

const KIND_REPLY: u8 = 0x80;
const KIND_ONE_WAY: u8 = 0x40;
const KIND_ERROR: u8 = 0x20;

/// Frame codec for ApiRpc messages.
///
/// # Wire Format
///
/// ```text
/// [4-byte length as u32 big-endian] [kind u8] [flag u8] [sequence u32 big-endian] [payload]
/// ```
///
/// `length` counts every byte after the prefix. Kind bits: `0x80` reply,
/// `0x40` one-way, `0x20` error.
///
/// When `user_packet` is set the payload is treated as an already framed user
/// packet: only the length prefix is written and no header is parsed on
/// read. The RPC client always runs with `user_packet = false` so that
/// replies can be correlated by sequence.
///
/// # Example
///
/// ```
/// use apirpc_common::protocol::Message;
/// use apirpc_common::transport::FrameCodec;
///
/// let codec = FrameCodec::default();
/// let msg = Message::new(b"hello".to_vec()).with_flag(2);
///
/// let frame = codec.encode(&msg).unwrap();
/// let decoded = codec.decode(&frame[4..]).unwrap();
/// assert_eq!(decoded, msg);
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Time allowed for a reply to arrive
    pub timeout: Duration,
    /// Treat payloads as pre-framed user packets
    pub user_packet: bool,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
            user_packet: false,
        }
    }
}

impl FrameCodec {
    /// Creates a message codec with the given reply timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            user_packet: false,
        }
    }

    /// Encodes a message into a complete frame, length prefix included.
    pub fn encode(&self, msg: &Message) -> Result<Vec<u8>> {
        let header_len = if self.user_packet { 0 } else { HEADER_LEN };
        let body_len = header_len + msg.payload.len();
        if body_len > MAX_FRAME_SIZE {
            return Err(ApiRpcError::Transport(format!(
                "Frame too large: {} bytes (max {} bytes)",
                body_len, MAX_FRAME_SIZE
            )));
        }

        let mut frame = Vec::with_capacity(4 + body_len);
        frame.extend_from_slice(&(body_len as u32).to_be_bytes());

        if !self.user_packet {
            let mut kind = 0u8;
            if msg.reply {
                kind |= KIND_REPLY;
            }
            if msg.one_way {
                kind |= KIND_ONE_WAY;
            }
            if msg.error {
                kind |= KIND_ERROR;
            }
            frame.push(kind);
            frame.push(msg.flag);
            frame.extend_from_slice(&msg.sequence.to_be_bytes());
        }

        frame.extend_from_slice(&msg.payload);
        Ok(frame)
    }

    /// Decodes a frame body (everything after the length prefix).
    pub fn decode(&self, body: &[u8]) -> Result<Message> {
        if self.user_packet {
            return Ok(Message {
                payload: body.to_vec(),
                ..Default::default()
            });
        }

        if body.len() < HEADER_LEN {
            return Err(ApiRpcError::Transport(format!(
                "Frame too short: {} bytes (header is {} bytes)",
                body.len(),
                HEADER_LEN
            )));
        }

        let kind = body[0];
        let mut seq = [0u8; 4];
        seq.copy_from_slice(&body[2..6]);

        Ok(Message {
            sequence: u32::from_be_bytes(seq),
            reply: kind & KIND_REPLY != 0,
            one_way: kind & KIND_ONE_WAY != 0,
            error: kind & KIND_ERROR != 0,
            flag: body[1],
            payload: body[HEADER_LEN..].to_vec(),
        })
    }

    /// Writes one message to the stream and flushes it.
    pub async fn write_frame<W>(&self, writer: &mut W, msg: &Message) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.encode(msg)?;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| map_io_error(e, "writing frame"))?;
        writer
            .flush()
            .await
            .map_err(|e| map_io_error(e, "flushing stream"))?;
        Ok(())
    }

    /// Reads one message from the stream.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly before a new
    /// frame started.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Option<Message>>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(map_io_error(e, "reading length prefix")),
        }

        let len = u32::from_be_bytes(len_buf) as usize;

        // Validate length to prevent allocation of excessively large buffers
        if len > MAX_FRAME_SIZE {
            return Err(ApiRpcError::Transport(format!(
                "Frame too large: {} bytes (max {} bytes)",
                len, MAX_FRAME_SIZE
            )));
        }

        let mut body = vec![0u8; len];
        reader
            .read_exact(&mut body)
            .await
            .map_err(|e| map_io_error(e, "reading frame body"))?;

        self.decode(&body).map(Some)
    }
}

/// Map IO errors to appropriate ApiRpcError variants
///
/// - Connection errors and truncated frames -> `Connection`
/// - Other IO errors -> `Io`
pub(crate) fn map_io_error(err: std::io::Error, context: &str) -> ApiRpcError {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::UnexpectedEof => {
            ApiRpcError::Connection(format!("{}: Connection lost", context))
        }
        _ => ApiRpcError::Io(err),
    }
}
