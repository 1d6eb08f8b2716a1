//! Streaming channel over WebSocket
//!
//! [`ApiClient::subscribe`] spawns one task per subscription. The task
//! authorizes the endpoint, rewrites `http(s)` to `ws(s)`, connects and then
//! multiplexes three sources until one of them ends the channel:
//!
//! - cancellation from the [`EventStream`] handle (sends Close, ends quietly)
//! - the liveness probe timer (a failed Ping emits `Error`, channel stays up)
//! - inbound frames (`Message` per text or binary frame; Close ends with
//!   `Disconnected`; a receive failure ends with `Error`)
//!
//! There is no reconnect. A new subscription is a new connection.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{SinkExt, Stream, StreamExt};
use pawlink_domain::StreamEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, Request};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use url::Url;

use super::client::ApiClient;
use super::endpoint::Endpoint;
use super::errors::ApiError;

/// Live subscription handle
///
/// Yields [`StreamEvent`]s through [`futures::Stream`]. Dropping the handle
/// cancels the subscription.
#[derive(Debug)]
pub struct EventStream {
    rx: Option<mpsc::Receiver<StreamEvent>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EventStream {
    /// Tear the subscription down
    ///
    /// Closes the socket, stops the probe timer and waits for the channel
    /// task to exit. No event is yielded afterwards.
    pub async fn cancel(&mut self) {
        self.cancel.cancel();
        self.rx = None;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "stream task ended abnormally");
            }
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().rx.as_mut() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ApiClient {
    /// Open a streaming subscription to `endpoint`
    ///
    /// The first event is `Connected` once the handshake succeeds. Failures
    /// before that (offline, missing token with fail-fast, bad endpoint,
    /// handshake) arrive as a single `Error` event that ends the stream.
    ///
    /// Must be called within a Tokio runtime.
    pub fn subscribe(&self, endpoint: &Endpoint) -> EventStream {
        let (tx, rx) = mpsc::channel(self.stream.buffer_size.max(1));
        let cancel = CancellationToken::new();

        let client = self.clone();
        let endpoint = endpoint.clone();
        let span = tracing::info_span!("stream", endpoint = endpoint.target());
        let task = tokio::spawn(client.run_channel(endpoint, tx, cancel.clone()).instrument(span));

        EventStream { rx: Some(rx), cancel, task: Some(task) }
    }

    async fn run_channel(
        self,
        endpoint: Endpoint,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) {
        let request = match self.stream_request(&endpoint).await {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "stream setup failed");
                emit(&tx, &cancel, StreamEvent::Error(Some(e.to_string()))).await;
                return;
            }
        };

        let connect = tokio::time::timeout(self.http.timeout(), connect_async(request));
        let socket = tokio::select! {
            () = cancel.cancelled() => return,
            connected = connect => match connected {
                Ok(Ok((socket, _))) => socket,
                Ok(Err(e)) => {
                    warn!(error = %e, "stream handshake failed");
                    emit(&tx, &cancel, StreamEvent::Error(Some(ApiError::Network(e.to_string()).to_string()))).await;
                    return;
                }
                Err(_) => {
                    warn!("stream handshake timed out");
                    let err = ApiError::Network(format!(
                        "stream handshake timed out after {}s",
                        self.http.timeout().as_secs()
                    ));
                    emit(&tx, &cancel, StreamEvent::Error(Some(err.to_string()))).await;
                    return;
                }
            },
        };

        info!("stream connected");
        if !emit(&tx, &cancel, StreamEvent::Connected).await {
            return;
        }

        let (mut write, mut read) = socket.split();
        let interval = self.stream.probe_interval();
        let write_timeout = self.stream.probe_write_timeout();
        let mut probe = interval_at(Instant::now() + interval, interval);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("stream cancelled; closing socket");
                    match tokio::time::timeout(write_timeout, write.send(Message::Close(None))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => debug!(error = %e, "close frame not sent"),
                        Err(_) => debug!("close frame timed out"),
                    }
                    break;
                }
                _ = probe.tick() => {
                    let failure = match tokio::time::timeout(write_timeout, write.send(Message::Ping(Vec::new()))).await {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some(format!("liveness probe failed: {e}")),
                        Err(_) => Some("liveness probe timed out".to_string()),
                    };
                    if let Some(detail) = failure {
                        warn!(%detail, "liveness probe failed");
                        if !emit(&tx, &cancel, StreamEvent::Error(Some(detail))).await {
                            break;
                        }
                    }
                }
                frame = read.next() => {
                    let (event, last) = match frame {
                        Some(Ok(Message::Text(text))) => (StreamEvent::Message(text), false),
                        Some(Ok(Message::Binary(data))) => {
                            (StreamEvent::Message(String::from_utf8_lossy(&data).into_owned()), false)
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.into_owned())
                                .filter(|reason| !reason.is_empty());
                            info!(?reason, "stream closed by server");
                            (StreamEvent::Disconnected(reason), true)
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!(error = %e, "stream receive failed");
                            (StreamEvent::Error(Some(e.to_string())), true)
                        }
                        None => (StreamEvent::Disconnected(None), true),
                    };
                    if !emit(&tx, &cancel, event).await || last {
                        break;
                    }
                }
            }
        }

        debug!("stream task finished");
    }

    async fn stream_request(&self, endpoint: &Endpoint) -> Result<Request<()>, ApiError> {
        self.preflight()?;
        let adapted = self.authorize(endpoint).await?;
        let url = to_stream_scheme(adapted.resolve(&self.base_url)?)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ApiError::InvalidEndpoint(e.to_string()))?;

        for (name, value) in adapted.headers() {
            let invalid = |e: &dyn std::fmt::Display| ApiError::InvalidEndpoint(format!("header {name}: {e}"));
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(&e))?;
            let value = HeaderValue::from_str(value).map_err(|e| invalid(&e))?;
            request.headers_mut().insert(header, value);
        }

        Ok(request)
    }
}

/// Deliver `event` unless the subscription is cancelled or abandoned
async fn emit(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    event: StreamEvent,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

fn to_stream_scheme(mut url: Url) -> Result<Url, ApiError> {
    let scheme = match url.scheme() {
        "ws" | "wss" => return Ok(url),
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ApiError::InvalidEndpoint(format!("unsupported stream scheme: {other}")))
        }
    };

    url.set_scheme(scheme)
        .map_err(|()| ApiError::InvalidEndpoint(format!("cannot switch {url} to {scheme}")))?;
    Ok(url)
}
