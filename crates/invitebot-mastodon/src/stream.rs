use std::io::ErrorKind;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, error::ProtocolError, Message},
    MaybeTlsStream, WebSocketStream,
};

use invitebot_core::{
    domain::StreamChannel,
    errors::Error,
    ports::{FrameSource, StreamTransport, TransportFrame},
    Result,
};

use crate::MastodonClient;

/// Opens `/api/v1/streaming` WebSocket connections.
pub struct WebSocketTransport {
    client: MastodonClient,
}

impl WebSocketTransport {
    pub fn new(client: MastodonClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn connect(&self, channel: StreamChannel) -> Result<Box<dyn FrameSource>> {
        let url = self.client.streaming_url(channel)?;
        tracing::info!(instance = %self.client.base_url(), %channel, "opening stream");

        let handshake = connect_async(url.as_str());
        let (ws, _response) = tokio::time::timeout(self.client.timeout(), handshake)
            .await
            .map_err(|_| Error::Transport("stream handshake timed out".to_string()))?
            .map_err(|e| Error::Transport(format!("stream handshake failed: {e}")))?;

        Ok(Box::new(WebSocketSource { ws }))
    }
}

struct WebSocketSource {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn next_frame(&mut self) -> Result<TransportFrame> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(TransportFrame::Text(text.to_string())),
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "stream closed by server");
                    return Ok(TransportFrame::Closed);
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.ws.send(Message::Pong(data)).await {
                        return classify_error(e);
                    }
                }
                Some(Ok(_)) => {} // binary, pong, raw frames
                Some(Err(e)) => return classify_error(e),
                None => return Ok(TransportFrame::Closed),
            }
        }
    }
}

fn classify_error(e: tungstenite::Error) -> Result<TransportFrame> {
    if is_disconnect(&e) {
        tracing::debug!(error = %e, "stream dropped");
        return Ok(TransportFrame::Closed);
    }
    Err(Error::Transport(format!("stream error: {e}")))
}

/// Errors that only mean the peer went away.
fn is_disconnect(e: &tungstenite::Error) -> bool {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => true,
        tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        tungstenite::Error::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}
