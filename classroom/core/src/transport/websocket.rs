//! WebSocket Transport
//!
//! Client side of the classroom socket, built on `tokio-tungstenite`.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐  OutboundFrame   ┌─────────────┐
//!  SessionClient ─────►│ writer task  ├─────────────────►│             │
//!                      └──────────────┘                  │  WebSocket  │
//!                      ┌──────────────┐  TransportEvent  │   stream    │
//!  SessionClient ◄─────┤ reader task  │◄─────────────────┤             │
//!                      └──────────────┘                  └─────────────┘
//! ```
//!
//! The stream is split after the handshake. The reader turns socket
//! messages into `TransportEvent`s; the writer drains the outbound queue.
//! Dropping the outbound sender closes the socket with a normal close.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::traits::{
    CloseCode, OutboundFrame, Transport, TransportError, TransportEvent, TransportLink,
};

/// Close code reported when the peer's close frame carries no status
const NO_STATUS: CloseCode = CloseCode(1005);

/// WebSocket transport
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    /// Handshake timeout
    connect_timeout: Duration,
    /// Capacity of the outbound and event channels
    capacity: usize,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 100)
    }
}

impl WebSocketTransport {
    /// Create a transport
    #[must_use]
    pub fn new(connect_timeout: Duration, capacity: usize) -> Self {
        Self {
            connect_timeout,
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<TransportLink, TransportError> {
        let handshake = connect_async(url.as_str());
        let (stream, _response) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| {
                TransportError::Timeout(
                    u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX),
                )
            })?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(self.capacity);
        let (events_tx, events_rx) = mpsc::channel::<TransportEvent>(self.capacity);

        events_tx
            .send(TransportEvent::Opened)
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;

        // Writer: outbound queue -> socket
        let writer_events = events_tx.clone();
        tokio::spawn(async move {
            let mut close_code = CloseCode::NORMAL;
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    OutboundFrame::Text(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            let error = TransportError::SendFailed(e.to_string());
                            tracing::warn!(error = %error, "WebSocket write error");
                            forward(&writer_events, TransportEvent::Error(error.to_string()))
                                .await;
                            return;
                        }
                    }
                    OutboundFrame::Close(code) => {
                        close_code = code;
                        break;
                    }
                }
            }

            let frame = CloseFrame {
                code: WsCloseCode::from(close_code.0),
                reason: "".into(),
            };
            if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                tracing::debug!(error = %e, "Close frame not sent");
            }
        });

        // Reader: socket -> transport events
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => TransportEvent::Message(text),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => TransportEvent::Message(text),
                        Err(_) => {
                            tracing::debug!("Dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let code = frame.map_or(NO_STATUS, |f| CloseCode(u16::from(f.code)));
                        forward(&events_tx, TransportEvent::Closed(code)).await;
                        return;
                    }
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                    Err(e) => {
                        if forward(&events_tx, TransportEvent::Error(e.to_string())).await {
                            forward(&events_tx, TransportEvent::Closed(CloseCode::ABNORMAL)).await;
                        }
                        return;
                    }
                };

                if !forward(&events_tx, event).await {
                    return;
                }
            }

            forward(&events_tx, TransportEvent::Closed(CloseCode::ABNORMAL)).await;
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            events: events_rx,
        })
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// Hand `event` to the session; `false` once the receiver is gone
async fn forward(events: &mpsc::Sender<TransportEvent>, event: TransportEvent) -> bool {
    if events.send(event).await.is_err() {
        tracing::debug!("Event receiver dropped");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn echo_server() -> (Url, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => {
                        let reply = format!(r#"{{"animation":"wave","reply_text":"{text}"}}"#);
                        ws.send(Message::Text(reply)).await.unwrap();
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        let url = Url::parse(&format!("ws://{addr}/ws/v1/classroom/room_001?token=t")).unwrap();
        (url, handle)
    }

    #[tokio::test]
    async fn test_websocket_roundtrip_and_close() {
        let (url, server) = echo_server().await;
        let transport = WebSocketTransport::default();

        let mut link = transport.open(&url).await.unwrap();
        assert_eq!(link.events.recv().await, Some(TransportEvent::Opened));

        link.outbound
            .send(OutboundFrame::Text("hi".to_string()))
            .await
            .unwrap();
        let echoed = tokio::time::timeout(Duration::from_secs(2), link.events.recv())
            .await
            .unwrap();
        assert_eq!(
            echoed,
            Some(TransportEvent::Message(
                r#"{"animation":"wave","reply_text":"hi"}"#.to_string()
            ))
        );

        link.outbound
            .send(OutboundFrame::Close(CloseCode::NORMAL))
            .await
            .unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), server).await;
    }

    #[tokio::test]
    async fn test_websocket_dropped_peer_reports_abnormal_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            drop(ws);
        });

        let url = Url::parse(&format!("ws://{addr}/ws/v1/classroom/r?token=t")).unwrap();
        let mut link = WebSocketTransport::default().open(&url).await.unwrap();
        assert_eq!(link.events.recv().await, Some(TransportEvent::Opened));

        let closed = loop {
            let event = tokio::time::timeout(Duration::from_secs(5), link.events.recv())
                .await
                .unwrap();
            match event {
                Some(TransportEvent::Closed(code)) => break code,
                Some(TransportEvent::Error(_)) => continue,
                other => panic!("unexpected event {other:?}"),
            }
        };
        assert_eq!(closed, CloseCode::ABNORMAL);
    }

    #[tokio::test]
    async fn test_forward_reports_dropped_receiver() {
        let (tx, rx) = mpsc::channel(1);
        assert!(forward(&tx, TransportEvent::Opened).await);
        drop(rx);
        assert!(!forward(&tx, TransportEvent::Closed(CloseCode::ABNORMAL)).await);
    }

    #[tokio::test]
    async fn test_websocket_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}/ws/v1/classroom/r?token=t")).unwrap();
        let transport = WebSocketTransport::new(Duration::from_secs(2), 8);
        let result = transport.open(&url).await;
        assert!(matches!(
            result,
            Err(TransportError::ConnectionFailed(_) | TransportError::Timeout(_))
        ));
    }
}
