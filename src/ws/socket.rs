//! WebSocket client socket backed by tokio-tungstenite
//!
//! The connection runs in a spawned task. The session side only touches two
//! unbounded channels, so `send_text` and `poll_event` never block the tick.

use futures::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::transport::{Socket, SocketEvent, SocketFactory, TransportError};

enum Outbound {
    Text(String),
    Close,
}

/// Opens relay connections on the given runtime
pub struct WsSocketFactory {
    runtime: Handle,
}

impl WsSocketFactory {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl SocketFactory for WsSocketFactory {
    fn open(&mut self, url: &str) -> Result<Box<dyn Socket>, TransportError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        self.runtime
            .spawn(run_connection(url.to_string(), event_tx, outbound_rx));

        Ok(Box::new(WsSocket {
            outbound_tx,
            event_rx,
        }))
    }
}

struct WsSocket {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    event_rx: mpsc::UnboundedReceiver<SocketEvent>,
}

impl Socket for WsSocket {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound_tx
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Write("connection task has stopped".to_string()))
    }

    fn poll_event(&mut self) -> Option<SocketEvent> {
        self.event_rx.try_recv().ok()
    }

    fn close(&mut self) {
        let _ = self.outbound_tx.send(Outbound::Close);
    }
}

/// Drive one connection until either side closes it
async fn run_connection(
    url: String,
    events: mpsc::UnboundedSender<SocketEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            error!(url = %url, error = %e, "WebSocket connect failed");
            let _ = events.send(SocketEvent::Error(e.to_string()));
            return;
        }
    };

    info!(url = %url, "WebSocket open");
    let _ = events.send(SocketEvent::Opened);

    let (mut ws_sink, mut ws_stream) = stream.split();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = ws_sink.send(Message::Text(text)).await {
                        warn!(error = %e, "WebSocket write failed");
                        let _ = events.send(SocketEvent::Error(e.to_string()));
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    debug!("Closing WebSocket");
                    let _ = ws_sink.close().await;
                    break;
                }
            },
            inbound = ws_stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if events.send(SocketEvent::Text(text)).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!("Received binary frame, ignoring");
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Relay closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    let _ = events.send(SocketEvent::Error(e.to_string()));
                    return;
                }
            },
        }
    }

    let _ = events.send(SocketEvent::Closed);
}
