//! # Responses and Completion Handles
//!
//! Purpose: Carry a decoded reply back to the caller that issued the command.
//!
//! ## Design Principles
//! 1. **Channel per Request**: Each logical request owns one `oneshot` pair.
//! 2. **Settle Once**: A responder may be cloned across batch lines, but the
//!    first resolve or reject wins and later ones are no-ops.
//! 3. **Failure Is Data**: `success=false` is a normal `Response`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use tsdb_common::Frame;

use crate::error::{ClientError, ClientResult};

/// Decoded server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// True when the server reported success.
    pub success: bool,
    /// Payload decoded as UTF-8 text.
    pub data: String,
}

impl Response {
    /// Parses the payload as JSON when the reply succeeded.
    ///
    /// A failed reply is returned as `ClientError::Server` carrying the raw text.
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        if !self.success {
            return Err(ClientError::Server(self.data.clone()));
        }
        Ok(serde_json::from_str(&self.data)?)
    }
}

impl From<Frame> for Response {
    fn from(frame: Frame) -> Self {
        let data = frame.text().into_owned();
        Response {
            success: frame.success,
            data,
        }
    }
}

type Slot = Arc<Mutex<Option<oneshot::Sender<ClientResult<Response>>>>>;

/// Shared completion handle for one logical request.
#[derive(Clone)]
pub(crate) struct Responder {
    slot: Slot,
}

impl Responder {
    /// Creates a responder and the future its caller awaits.
    pub(crate) fn channel() -> (Responder, ResponseFuture) {
        let (tx, rx) = oneshot::channel();
        let responder = Responder {
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (responder, ResponseFuture { rx })
    }

    pub(crate) fn resolve(&self, response: Response) {
        self.settle(Ok(response));
    }

    pub(crate) fn reject(&self, err: ClientError) {
        self.settle(Err(err));
    }

    /// True when both handles complete the same logical request.
    pub(crate) fn same_request(&self, other: &Responder) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    #[cfg(test)]
    pub(crate) fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }

    fn settle(&self, result: ClientResult<Response>) {
        let sender = self.slot.lock().take();
        if let Some(tx) = sender {
            // Receiver may have been dropped; nothing left to notify.
            let _ = tx.send(result);
        }
    }
}

/// Future resolving to the reply of a submitted command.
///
/// The command is queued when the future is created, not when it is first
/// polled, so submission order is call order.
#[must_use = "the reply is lost if the future is dropped"]
pub struct ResponseFuture {
    rx: oneshot::Receiver<ClientResult<Response>>,
}

impl Future for ResponseFuture {
    type Output = ClientResult<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::Disconnected)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_settlement_wins() {
        let (responder, future) = Responder::channel();
        let clone = responder.clone();
        clone.resolve(Response {
            success: true,
            data: "OK".into(),
        });
        responder.reject(ClientError::Disconnected);
        assert!(responder.is_settled());
        assert_eq!(future.await.unwrap().data, "OK");
    }

    #[tokio::test]
    async fn dropped_responder_reports_disconnect() {
        let (responder, future) = Responder::channel();
        drop(responder);
        assert!(matches!(future.await, Err(ClientError::Disconnected)));
    }

    #[test]
    fn json_only_on_success() {
        let ok = Response {
            success: true,
            data: "[1, 2, 3]".into(),
        };
        assert_eq!(ok.json::<Vec<u32>>().unwrap(), vec![1, 2, 3]);

        let failed = Response {
            success: false,
            data: "ERR: No db named x".into(),
        };
        match failed.json::<serde_json::Value>() {
            Err(ClientError::Server(message)) => assert_eq!(message, "ERR: No db named x"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
