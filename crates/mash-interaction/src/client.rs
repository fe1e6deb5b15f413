// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Interaction client (§4.3 "Client"): message-id correlation, a
//! configurable per-request timeout, and an unsolicited-notification
//! demultiplexer. One client wraps one `Session`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{split, AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{trace, warn};

use mash_codec::{framing, InboundEnvelope, MessageIdGenerator, Operation, Request, Response};
use mash_core::Value;

use crate::error::{Result, StatusError};

/// Requests with no reply inside this window fail with `SessionError`-free
/// `StatusError::Timeout` (§4.3 "the client... applies a timeout, 10s
/// unless the caller overrides it").
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives one session's request/response correlation and fans unsolicited
/// notifications out to `notifications()`. Own a `Arc<InteractionClient>`
/// per connected peer; `run()` must be polled (spawned) for replies and
/// notifications to ever arrive.
pub struct InteractionClient<S> {
    message_ids: Mutex<MessageIdGenerator>,
    pending: DashMap<u32, oneshot::Sender<Response>>,
    writer: Mutex<WriteHalf<S>>,
    notify_tx: mpsc::UnboundedSender<mash_codec::Notification>,
    default_timeout: Duration,
}

impl<S> InteractionClient<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Splits `stream` and returns the client plus a notification receiver.
    /// Spawn `run()` on the returned client (or call it from a task you
    /// manage yourself) to actually pump inbound frames.
    pub fn new(stream: S) -> (Arc<Self>, ReadHalf<S>, mpsc::UnboundedReceiver<mash_codec::Notification>) {
        Self::with_timeout(stream, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        stream: S,
        default_timeout: Duration,
    ) -> (Arc<Self>, ReadHalf<S>, mpsc::UnboundedReceiver<mash_codec::Notification>) {
        let (read_half, write_half) = split(stream);
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            message_ids: Mutex::new(MessageIdGenerator::new()),
            pending: DashMap::new(),
            writer: Mutex::new(write_half),
            notify_tx,
            default_timeout,
        });
        (client, read_half, notify_rx)
    }

    /// Reads frames off `reader` until the peer disconnects, routing each
    /// to its waiting caller (by `messageId`) or to the notification
    /// channel. Run this as a background task for the lifetime of the
    /// session.
    pub async fn run(self: Arc<Self>, mut reader: ReadHalf<S>) {
        loop {
            let frame = match framing::read_frame(&mut reader).await {
                Ok(Some(f)) => f,
                Ok(None) => {
                    trace!("peer closed connection");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "frame read failed, closing client");
                    break;
                }
            };
            match InboundEnvelope::decode(&frame) {
                Ok(InboundEnvelope::Response(resp)) => {
                    if let Some((_, tx)) = self.pending.remove(&resp.message_id) {
                        let _ = tx.send(resp);
                    }
                }
                Ok(InboundEnvelope::Notification(n)) => {
                    if self.notify_tx.send(n).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "malformed envelope, dropping frame"),
            }
        }
        // Any requests still waiting get nothing; their oneshot receivers
        // observe a closed channel and `send_request` maps that to Timeout.
        self.pending.clear();
    }

    async fn send(&self, message_id: u32, operation: Operation, endpoint_id: u8, feature_id: u8, payload: Value) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(message_id, tx);
        let req = Request { message_id, operation, endpoint_id, feature_id, payload };
        let encoded = req.encode();
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = framing::write_frame(&mut *writer, &encoded).await {
                self.pending.remove(&message_id);
                return Err(StatusError::new(
                    mash_codec::StatusCode::InternalError,
                    format!("write failed: {e}"),
                ));
            }
        }
        match tokio::time::timeout(self.default_timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => {
                self.pending.remove(&message_id);
                Err(StatusError::new(mash_codec::StatusCode::Timeout, "connection closed before a reply arrived"))
            }
            Err(_) => {
                self.pending.remove(&message_id);
                Err(StatusError::new(mash_codec::StatusCode::Timeout, "no reply within the request timeout"))
            }
        }
    }

    async fn next_id(&self) -> u32 {
        self.message_ids.lock().await.next()
    }

    pub async fn read(&self, endpoint_id: u8, feature_id: u8, attribute_ids: &[u16]) -> Result<Response> {
        let id = self.next_id().await;
        let payload = if attribute_ids.is_empty() {
            Value::Null
        } else {
            Value::Array(attribute_ids.iter().map(|id| Value::U16(*id)).collect())
        };
        self.send(id, Operation::Read, endpoint_id, feature_id, payload).await
    }

    pub async fn write(&self, endpoint_id: u8, feature_id: u8, values: std::collections::BTreeMap<u16, Value>) -> Result<Response> {
        let id = self.next_id().await;
        let payload = Value::Map(values.into_iter().map(|(id, v)| (id.to_string(), v)).collect());
        self.send(id, Operation::Write, endpoint_id, feature_id, payload).await
    }

    pub async fn subscribe(
        &self,
        endpoint_id: u8,
        feature_id: u8,
        attribute_ids: &[u16],
        min_interval: Duration,
        max_interval: Duration,
    ) -> Result<Response> {
        let id = self.next_id().await;
        let mut payload = std::collections::BTreeMap::new();
        if !attribute_ids.is_empty() {
            payload.insert(
                "attributeIds".to_string(),
                Value::Array(attribute_ids.iter().map(|id| Value::U16(*id)).collect()),
            );
        }
        payload.insert("minIntervalMs".to_string(), Value::U32(min_interval.as_millis() as u32));
        payload.insert("maxIntervalMs".to_string(), Value::U32(max_interval.as_millis() as u32));
        self.send(id, Operation::Subscribe, endpoint_id, feature_id, Value::Map(payload)).await
    }

    /// Unsubscribe is a Subscribe addressed at endpoint 0 / feature 0 with
    /// `{subscriptionId}` (§4.2).
    pub async fn unsubscribe(&self, subscription_id: u32) -> Result<Response> {
        let id = self.next_id().await;
        let mut payload = std::collections::BTreeMap::new();
        payload.insert("subscriptionId".to_string(), Value::U32(subscription_id));
        self.send(id, Operation::Subscribe, 0, 0, Value::Map(payload)).await
    }

    pub async fn invoke(
        &self,
        endpoint_id: u8,
        feature_id: u8,
        command_id: u8,
        parameters: std::collections::BTreeMap<String, Value>,
    ) -> Result<Response> {
        let id = self.next_id().await;
        let mut payload = std::collections::BTreeMap::new();
        payload.insert("commandId".to_string(), Value::U8(command_id));
        payload.insert("parameters".to_string(), Value::Map(parameters));
        self.send(id, Operation::Invoke, endpoint_id, feature_id, Value::Map(payload)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mash_codec::{Notification, StatusCode};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn read_request_correlates_to_its_response() {
        let (client_io, mut peer) = tokio::io::duplex(4096);
        let (client, read_half, _notify_rx) = InteractionClient::new(client_io);
        tokio::spawn(Arc::clone(&client).run(read_half));

        tokio::spawn(async move {
            let frame = framing::read_frame(&mut peer).await.unwrap().unwrap();
            let req = Request::decode(&frame).unwrap();
            assert_eq!(req.operation, Operation::Read);
            let mut payload = BTreeMap::new();
            payload.insert("1".to_string(), Value::U32(5000));
            let resp = Response::ok(req.message_id, Value::Map(payload));
            framing::write_frame(&mut peer, &resp.encode()).await.unwrap();
        });

        let resp = client.read(1, 2, &[1]).await.unwrap();
        assert_eq!(resp.status, StatusCode::Success);
    }

    #[tokio::test]
    async fn notifications_are_forwarded_independently_of_replies() {
        let (client_io, mut peer) = tokio::io::duplex(4096);
        let (client, read_half, mut notify_rx) = InteractionClient::new(client_io);
        tokio::spawn(Arc::clone(&client).run(read_half));

        let mut changes = BTreeMap::new();
        changes.insert(1u16, Value::U32(42));
        let notification = Notification { subscription_id: 7, endpoint_id: 1, feature_id: 2, changes };
        framing::write_frame(&mut peer, &notification.encode()).await.unwrap();

        let received = notify_rx.recv().await.expect("notification should arrive");
        assert_eq!(received.subscription_id, 7);
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let (client_io, _peer) = tokio::io::duplex(4096);
        let (client, read_half, _notify_rx) = InteractionClient::with_timeout(client_io, Duration::from_millis(20));
        tokio::spawn(Arc::clone(&client).run(read_half));

        let err = client.read(1, 2, &[]).await.unwrap_err();
        assert_eq!(err.status, StatusCode::Timeout);
    }
}
