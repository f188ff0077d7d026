//! Length-prefixed framing over a WebSocket carrying binary messages.
//!
//! Outbound: 3-byte big-endian payload length followed by the payload, one
//! WebSocket binary frame per protocol frame; the very first frame of a
//! connection is prefixed with the start-of-stream header. Inbound: binary
//! messages accumulate in a byte buffer and frames are peeled off it, so a
//! protocol frame may span WebSocket frames and vice versa.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{Result, TransportError};
use crate::noise::WIRE_HEADER;

/// Largest payload the 3-byte length prefix can express.
pub const MAX_FRAME_PAYLOAD: usize = (1 << 24) - 1;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Prepend the length prefix (and, for the first frame of a connection,
/// the start-of-stream header).
pub fn frame_payload(payload: &[u8], first_frame: bool) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let header_len = if first_frame { WIRE_HEADER.len() } else { 0 };
    let mut out = Vec::with_capacity(header_len + 3 + payload.len());
    if first_frame {
        out.extend_from_slice(&WIRE_HEADER);
    }
    let len = payload.len();
    out.push((len >> 16) as u8);
    out.push((len >> 8) as u8);
    out.push(len as u8);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Reassembly buffer for inbound frames. Partial headers and payloads are
/// tolerated across WebSocket messages.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Peel one complete `len ‖ payload` frame off the buffer.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buffer.len() < 3 {
            return None;
        }
        let len = ((self.buffer[0] as usize) << 16)
            | ((self.buffer[1] as usize) << 8)
            | self.buffer[2] as usize;
        if self.buffer.len() < 3 + len {
            return None;
        }
        let frame = self.buffer[3..3 + len].to_vec();
        self.buffer.drain(..3 + len);
        Some(frame)
    }
}

/// A connected, framed WebSocket. Used whole during the handshake, then
/// split into send/receive halves for the connection's lifetime.
#[derive(Debug)]
pub struct FrameSocket {
    sender: FrameSender,
    receiver: FrameReceiver,
}

impl FrameSocket {
    /// Open the WebSocket with the browser-equivalent Origin header.
    pub async fn connect(url: &str, origin: &str) -> Result<Self> {
        let mut request = url.into_client_request()?;
        let origin_value = origin
            .parse()
            .map_err(|_| TransportError::Handshake(format!("invalid origin header: {origin}")))?;
        request.headers_mut().insert(ORIGIN, origin_value);
        let (ws, _response) = connect_async(request).await?;
        tracing::debug!(url, "WebSocket connected");
        let (sink, stream) = ws.split();
        Ok(Self {
            sender: FrameSender { sink, header_sent: false },
            receiver: FrameReceiver { stream, decoder: FrameDecoder::default() },
        })
    }

    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        self.sender.send_frame(payload).await
    }

    pub async fn next_frame(&mut self) -> Result<Vec<u8>> {
        self.receiver.next_frame().await
    }

    pub fn split(self) -> (FrameSender, FrameReceiver) {
        (self.sender, self.receiver)
    }
}

/// Send half. Owns the first-frame header state.
pub struct FrameSender {
    sink: SplitSink<Ws, Message>,
    header_sent: bool,
}

impl FrameSender {
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        let framed = frame_payload(payload, !self.header_sent)?;
        self.header_sent = true;
        self.sink
            .send(Message::Binary(framed.into()))
            .await
            .map_err(|_| TransportError::Disconnected)
    }

    /// Close the WebSocket politely.
    pub async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

impl std::fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSender")
            .field("header_sent", &self.header_sent)
            .finish_non_exhaustive()
    }
}

/// Receive half: accumulates WebSocket binary messages and yields protocol
/// frames in order.
pub struct FrameReceiver {
    stream: SplitStream<Ws>,
    decoder: FrameDecoder,
}

impl FrameReceiver {
    /// The next protocol frame, or [`TransportError::Disconnected`] once the
    /// peer closes. Control frames are handled by the WebSocket layer.
    pub async fn next_frame(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Ok(frame);
            }
            match self.stream.next().await {
                Some(Ok(Message::Binary(bytes))) => self.decoder.push(&bytes),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(TransportError::Disconnected);
                }
                Some(Ok(_)) => {} // ping/pong/text — nothing to reassemble
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket read error");
                    return Err(TransportError::Disconnected);
                }
            }
        }
    }
}

impl std::fmt::Debug for FrameReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReceiver").finish_non_exhaustive()
    }
}
