//! Background listener holding a session's event stream open.

use crate::config::HandshakeConfig;
use crate::session::{HandshakeState, SseEvent};
use crate::transport::http::HttpTransport;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Decodes the event stream into a [`HandshakeState`].
pub struct StreamListener {
    http: HttpTransport,
    state: Arc<HandshakeState>,
    config: HandshakeConfig,
}

impl StreamListener {
    pub fn new(http: HttpTransport, state: Arc<HandshakeState>) -> Self {
        let config = http.config().handshake.clone();
        Self {
            http,
            state,
            config,
        }
    }

    /// Run the listener on its own task.
    pub fn spawn(self) -> ListenerHandle {
        ListenerHandle {
            task: Some(tokio::spawn(self.run())),
        }
    }

    /// Open the stream and feed every event into the shared state.
    ///
    /// Never returns an error: failures end up in the connection phase.
    pub async fn run(self) {
        let response = match self.http.open_stream().await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Failed to open event stream");
                self.state.mark_failed(e.to_string());
                return;
            }
        };

        info!(status = response.status().as_u16(), "Event stream connected");
        self.state.mark_connected();

        let mut events = response.bytes_stream().eventsource();
        let mut seen = 0usize;

        loop {
            let next = match self.config.idle_timeout {
                Some(idle) => match tokio::time::timeout(idle, events.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(idle_ms = idle.as_millis() as u64, "Event stream idle, closing");
                        break;
                    }
                },
                None => events.next().await,
            };

            match next {
                Some(Ok(event)) => {
                    seen += 1;
                    debug!(n = seen, event = %event.event, data = %event.data, "Stream event");

                    // The decoder names unnamed events "message".
                    let named = !event.event.is_empty() && event.event != "message";
                    let name = named.then_some(event.event);
                    self.state.observe(&SseEvent {
                        event: name,
                        data: event.data,
                    });

                    if self
                        .config
                        .cutoff_reached(seen, self.state.handle().is_some())
                    {
                        debug!(events = seen, "Event cutoff reached, closing stream");
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, events = seen, "Event stream error");
                    break;
                }
                None => {
                    debug!(events = seen, "Event stream ended");
                    break;
                }
            }
        }

        self.state.mark_closed();
    }
}

/// Owns the listener task; the stream is released when this is closed or dropped.
#[derive(Debug)]
pub struct ListenerHandle {
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop listening and wait for the task to wind down.
    pub async fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
