//! # Relay Module
//!
//! Carries the result of the out-of-process Steam login (a popup window) back
//! to the initiating context. The popup posts exactly one message to its
//! opener; a watchdog polls for the window being closed before any message
//! arrives. Whichever fires first wins, the loser is dropped with the call,
//! and the attempt resolves exactly once.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

/// How often the watchdog checks whether the popup was closed.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Message posted by the callback page to its opener.
///
/// Tag and field names are the wire schema the callback page emits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum PopupMessage {
    #[serde(rename = "STEAM_AUTH_SUCCESS", rename_all = "camelCase")]
    Success { steam_id: String, ticket: String },

    #[serde(rename = "STEAM_AUTH_ERROR")]
    Error { error: String },
}

/// A message together with the origin it was posted from.
#[derive(Debug, Clone)]
pub struct WindowMessage {
    pub origin: String,
    pub message: PopupMessage,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The environment refused to open the window.
    #[error("popup blocked - please allow popups for this site")]
    PopupBlocked,

    /// The user closed the window, or cancelled on the provider page.
    #[error("authentication cancelled by user")]
    Cancelled,

    /// The popup reported an explicit failure.
    #[error("steam authentication failed: {0}")]
    Failed(String),
}

/// Successful relay resolution: the claimed identity plus the provider's
/// correlation nonce (opaque, not an authentication ticket).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub steam_id: String,
    pub ticket: String,
}

/// Handle to an opened top-level browsing context.
pub trait AuthWindow: Send {
    fn is_closed(&self) -> bool;
    fn close(&mut self);
}

/// An opened window plus its message inbox.
pub struct OpenedWindow {
    pub window: Box<dyn AuthWindow>,
    pub messages: mpsc::UnboundedReceiver<WindowMessage>,
}

/// Opens the login window. Desktop shells wrap a real browser window; tests
/// supply scripted implementations.
pub trait WindowOpener {
    fn open(&self, url: &Url) -> Result<OpenedWindow, RelayError>;
}

/// Per-attempt relay state machine.
pub struct RelayChannel {
    expected_origin: String,
    poll_interval: Duration,
}

impl RelayChannel {
    pub fn new(expected_origin: String) -> Self {
        Self {
            expected_origin,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Shorten the watchdog cadence (tests).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Wait for exactly one resolution.
    ///
    /// Consumes the opened window, so a second resolution for the same attempt
    /// is unrepresentable. Messages from unexpected origins are ignored, not
    /// trusted. No retries happen here; retry policy belongs to the caller.
    pub async fn await_result(&self, opened: OpenedWindow) -> Result<RelayOutcome, RelayError> {
        let OpenedWindow {
            mut window,
            mut messages,
        } = opened;

        let mut watchdog = tokio::time::interval(self.poll_interval);
        // First tick fires immediately; that's fine, the window can only be
        // closed at that point if the user already dismissed it.
        loop {
            tokio::select! {
                // Prefer a queued message over the watchdog when both are ready.
                biased;

                received = messages.recv() => match received {
                    Some(WindowMessage { origin, message }) => {
                        if origin != self.expected_origin {
                            warn!(origin = %origin, expected = %self.expected_origin, "Ignoring relay message from unexpected origin");
                            continue;
                        }
                        window.close();
                        match message {
                            PopupMessage::Success { steam_id, ticket } => {
                                debug!(steam_id = %steam_id, "Relay resolved with Steam identity");
                                return Ok(RelayOutcome { steam_id, ticket });
                            }
                            PopupMessage::Error { error } => {
                                debug!(error = %error, "Relay resolved with popup-reported failure");
                                return Err(RelayError::Failed(error));
                            }
                        }
                    }
                    // Inbox gone without a message: nothing can ever arrive,
                    // treat like a closed window.
                    None => {
                        debug!("Relay inbox closed before any message arrived");
                        return Err(RelayError::Cancelled);
                    }
                },

                _ = watchdog.tick() => {
                    if window.is_closed() {
                        debug!("Popup closed before any message arrived");
                        return Err(RelayError::Cancelled);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FakeWindow {
        closed: Arc<AtomicBool>,
    }

    impl AuthWindow for FakeWindow {
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn fast_channel() -> RelayChannel {
        RelayChannel::new("https://example.com".to_string())
            .with_poll_interval(Duration::from_millis(10))
    }

    fn opened_window(
        closed: Arc<AtomicBool>,
    ) -> (mpsc::UnboundedSender<WindowMessage>, OpenedWindow) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            OpenedWindow {
                window: Box::new(FakeWindow { closed }),
                messages: rx,
            },
        )
    }

    #[tokio::test]
    async fn success_message_resolves_with_identity() {
        let closed = Arc::new(AtomicBool::new(false));
        let (tx, opened) = opened_window(closed.clone());

        tx.send(WindowMessage {
            origin: "https://example.com".to_string(),
            message: PopupMessage::Success {
                steam_id: "76561198000000000".to_string(),
                ticket: "nonce-1".to_string(),
            },
        })
        .unwrap();

        let outcome = fast_channel().await_result(opened).await.unwrap();
        assert_eq!(outcome.steam_id, "76561198000000000");
        assert_eq!(outcome.ticket, "nonce-1");
        // Winner closes the window on its way out.
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn messages_from_unexpected_origins_are_ignored() {
        let closed = Arc::new(AtomicBool::new(false));
        let (tx, opened) = opened_window(closed);

        tx.send(WindowMessage {
            origin: "https://evil.example".to_string(),
            message: PopupMessage::Success {
                steam_id: "1".to_string(),
                ticket: "spoofed".to_string(),
            },
        })
        .unwrap();
        tx.send(WindowMessage {
            origin: "https://example.com".to_string(),
            message: PopupMessage::Success {
                steam_id: "76561198000000000".to_string(),
                ticket: "real".to_string(),
            },
        })
        .unwrap();

        let outcome = fast_channel().await_result(opened).await.unwrap();
        assert_eq!(outcome.steam_id, "76561198000000000");
        assert_eq!(outcome.ticket, "real");
    }

    #[tokio::test]
    async fn closed_window_resolves_cancelled() {
        let closed = Arc::new(AtomicBool::new(false));
        let (_tx, opened) = opened_window(closed.clone());

        closed.store(true, Ordering::SeqCst);

        let err = fast_channel().await_result(opened).await.unwrap_err();
        assert_eq!(err, RelayError::Cancelled);
    }

    #[tokio::test]
    async fn error_message_resolves_failed() {
        let closed = Arc::new(AtomicBool::new(false));
        let (tx, opened) = opened_window(closed);

        tx.send(WindowMessage {
            origin: "https://example.com".to_string(),
            message: PopupMessage::Error {
                error: "Authentication cancelled by user".to_string(),
            },
        })
        .unwrap();

        let err = fast_channel().await_result(opened).await.unwrap_err();
        assert_eq!(
            err,
            RelayError::Failed("Authentication cancelled by user".to_string())
        );
    }

    #[tokio::test]
    async fn dropped_inbox_resolves_cancelled() {
        let closed = Arc::new(AtomicBool::new(false));
        let (tx, opened) = opened_window(closed);
        drop(tx);

        let err = fast_channel().await_result(opened).await.unwrap_err();
        assert_eq!(err, RelayError::Cancelled);
    }

    #[test]
    fn popup_message_wire_format() {
        let message = PopupMessage::Success {
            steam_id: "123456".to_string(),
            ticket: "verified".to_string(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "STEAM_AUTH_SUCCESS");
        assert_eq!(json["steamId"], "123456");
        assert_eq!(json["ticket"], "verified");

        let error = PopupMessage::Error {
            error: "nope".to_string(),
        };
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["type"], "STEAM_AUTH_ERROR");
        assert_eq!(json["error"], "nope");
    }
}
