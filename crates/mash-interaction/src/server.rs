// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `handle_request` dispatch (§4.3), per device model instance.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use mash_codec::{Notification, Operation, Request, Response, StatusCode};
use mash_core::model::{Device, Feature, FeatureType, Subscriber};
use mash_core::{RequestContext, Value};

use crate::subscription::Subscription;

fn as_u32(v: &Value) -> Option<u32> {
    match v {
        Value::U8(x) => Some(*x as u32),
        Value::U16(x) => Some(*x as u32),
        Value::U32(x) => Some(*x),
        Value::U64(x) => u32::try_from(*x).ok(),
        _ => None,
    }
}

fn as_u16(v: &Value) -> Option<u16> {
    as_u32(v).and_then(|v| u16::try_from(v).ok())
}

/// Dispatches Read/Write/Subscribe/Invoke against one device tree and
/// drives its live subscriptions. One server per connected device model
/// instance — the roster (mash-controller) or the device runtime
/// (mash-device) owns it.
pub struct InteractionServer {
    device: Arc<Device>,
    subscriptions: DashMap<u32, Arc<Subscription>>,
    next_subscription_id: AtomicU32,
    notify_tx: mpsc::UnboundedSender<Notification>,
}

impl InteractionServer {
    pub fn new(device: Arc<Device>) -> (Arc<Self>, mpsc::UnboundedReceiver<Notification>) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                device,
                subscriptions: DashMap::new(),
                next_subscription_id: AtomicU32::new(1),
                notify_tx,
            }),
            notify_rx,
        )
    }

    pub fn handle_request(&self, ctx: &RequestContext, req: &Request) -> Response {
        debug!(message_id = req.message_id, op = ?req.operation, "handling request");
        let result = match req.operation {
            Operation::Read => self.handle_read(req),
            Operation::Write => self.handle_write(req),
            Operation::Subscribe => self.handle_subscribe(req),
            Operation::Invoke => self.handle_invoke(req, ctx),
        };
        match result {
            Ok(payload) => Response::ok(req.message_id, payload),
            Err((status, message)) => Response::error(req.message_id, status, message),
        }
    }

    fn resolve_feature(
        &self,
        endpoint_id: u8,
        feature_id: u8,
    ) -> Result<Arc<Feature>, (StatusCode, String)> {
        let endpoint = self
            .device
            .get_endpoint(endpoint_id)
            .map_err(|_| (StatusCode::InvalidEndpoint, format!("no endpoint {endpoint_id}")))?;
        let feature_type = FeatureType::from_wire_id(feature_id)
            .ok_or_else(|| (StatusCode::InvalidFeature, format!("unknown feature id {feature_id}")))?;
        endpoint
            .get_feature(feature_type)
            .map_err(|_| (StatusCode::InvalidFeature, format!("endpoint {endpoint_id} has no feature {feature_id}")))
    }

    fn handle_read(&self, req: &Request) -> Result<Value, (StatusCode, String)> {
        let feature = self.resolve_feature(req.endpoint_id, req.feature_id)?;

        let ids: Option<Vec<u16>> = match &req.payload {
            Value::Array(items) if !items.is_empty() => {
                Some(items.iter().filter_map(as_u16).collect())
            }
            _ => None,
        };

        let values = match ids {
            None => feature.read_all_attributes(),
            Some(ids) => ids
                .into_iter()
                .filter_map(|id| feature.read_attribute(id).ok().map(|v| (id, v)))
                .collect(),
        };
        Ok(Value::Map(values.into_iter().map(|(id, v)| (id.to_string(), v)).collect()))
    }

    fn handle_write(&self, req: &Request) -> Result<Value, (StatusCode, String)> {
        let feature = self.resolve_feature(req.endpoint_id, req.feature_id)?;

        let writes = match &req.payload {
            Value::Map(m) => m.clone(),
            _ => return Err((StatusCode::InvalidParameter, "write payload must be a map".into())),
        };

        let mut confirmed = BTreeMap::new();
        let mut first_error: Option<(StatusCode, String)> = None;
        for (key, value) in writes {
            let Ok(id) = key.parse::<u16>() else { continue };
            match feature.write_attribute(id, value) {
                Ok(v) => {
                    confirmed.insert(id.to_string(), v);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some((status_for_model_error(&e), e.to_string()));
                    }
                }
            }
        }

        if confirmed.is_empty() {
            return Err(first_error.unwrap_or((StatusCode::ConstraintError, "no attributes written".to_string())));
        }
        Ok(Value::Map(confirmed))
    }

    fn handle_subscribe(&self, req: &Request) -> Result<Value, (StatusCode, String)> {
        let params = match &req.payload {
            Value::Map(m) => m.clone(),
            _ => BTreeMap::new(),
        };

        // Unsubscribe is a Subscribe with endpoint=0, feature=0 and
        // {subscriptionId} (§4.2).
        if req.endpoint_id == 0 && req.feature_id == 0 {
            if let Some(id) = params.get("subscriptionId").and_then(as_u32) {
                if let Some((_, sub)) = self.subscriptions.remove(&id) {
                    if let Some(feature) = sub.feature() {
                        let sub_dyn: Arc<dyn Subscriber> = sub;
                        let weak: std::sync::Weak<dyn Subscriber> = Arc::downgrade(&sub_dyn);
                        feature.unsubscribe(&weak);
                    }
                }
            }
            return Ok(Value::Null);
        }

        let feature_type = FeatureType::from_wire_id(req.feature_id)
            .ok_or_else(|| (StatusCode::InvalidFeature, format!("unknown feature id {}", req.feature_id)))?;
        let feature = self.resolve_feature(req.endpoint_id, req.feature_id)?;

        let attribute_ids: Vec<u16> = match params.get("attributeIds") {
            Some(Value::Array(items)) => items.iter().filter_map(as_u16).collect(),
            _ => Vec::new(),
        };
        let min_interval = Duration::from_millis(
            params.get("minIntervalMs").and_then(as_u32).unwrap_or(0) as u64,
        );
        let max_interval = Duration::from_millis(
            params.get("maxIntervalMs").and_then(as_u32).unwrap_or(60_000) as u64,
        );

        // Priming report: the snapshot at subscribe time, before the
        // subscriber is registered, so it cannot race its own fan-out.
        let priming: BTreeMap<u16, Value> = feature
            .read_all_attributes()
            .into_iter()
            .filter(|(id, _)| attribute_ids.is_empty() || attribute_ids.contains(id))
            .collect();

        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        let sub = Arc::new(Subscription::new(
            id,
            req.endpoint_id,
            feature_type,
            &feature,
            attribute_ids,
            min_interval,
            max_interval,
            priming.clone(),
        ));
        feature.subscribe(Arc::downgrade(&sub) as std::sync::Weak<dyn Subscriber>);
        self.subscriptions.insert(id, sub);

        let mut payload = BTreeMap::new();
        payload.insert("subscriptionId".to_string(), Value::U32(id));
        payload.insert(
            "currentValues".to_string(),
            Value::Map(priming.into_iter().map(|(id, v)| (id.to_string(), v)).collect()),
        );
        Ok(Value::Map(payload))
    }

    fn handle_invoke(&self, req: &Request, ctx: &RequestContext) -> Result<Value, (StatusCode, String)> {
        let feature = self.resolve_feature(req.endpoint_id, req.feature_id)?;

        let params = match &req.payload {
            Value::Map(m) => m,
            _ => return Err((StatusCode::InvalidParameter, "invoke payload must be a map".into())),
        };
        let command_id = params
            .get("commandId")
            .and_then(|v| match v {
                Value::U8(x) => Some(*x),
                _ => as_u32(v).and_then(|v| u8::try_from(v).ok()),
            })
            .ok_or_else(|| (StatusCode::InvalidParameter, "missing commandId".to_string()))?;
        let parameters = match params.get("parameters") {
            Some(Value::Map(m)) => m.clone(),
            _ => BTreeMap::new(),
        };

        feature
            .invoke_command(command_id, &parameters, ctx)
            .map(Value::Map)
            .map_err(|e| map_invoke_error(command_id, e))
    }

    /// Called by the session layer on disconnect (§4.3 "Lifetime").
    pub fn cancel_all_subscriptions(&self) {
        for entry in self.subscriptions.iter() {
            let sub = entry.value();
            if let Some(feature) = sub.feature() {
                let sub_dyn: Arc<dyn Subscriber> = sub.clone();
                let weak: std::sync::Weak<dyn Subscriber> = Arc::downgrade(&sub_dyn);
                feature.unsubscribe(&weak);
            }
        }
        self.subscriptions.clear();
    }

    /// Background tick: polls every live subscription and forwards any
    /// resulting delta/heartbeat as a `Notification` on the outbox channel
    /// (§4.3 min/maxInterval semantics).
    pub async fn run_subscription_ticker(self: Arc<Self>, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            let now = std::time::Instant::now();
            let mut dangling = Vec::new();
            for entry in self.subscriptions.iter() {
                let sub = entry.value();
                if sub.is_dangling() {
                    dangling.push(*entry.key());
                    continue;
                }
                if let Some(changes) = sub.poll(now) {
                    let notification = Notification {
                        subscription_id: sub.id,
                        endpoint_id: sub.endpoint_id,
                        feature_id: sub.feature_type as u8,
                        changes,
                    };
                    if self.notify_tx.send(notification).is_err() {
                        return;
                    }
                }
            }
            for id in dangling {
                self.subscriptions.remove(&id);
            }
        }
    }
}

/// Maps a data-model error to the §4.2 status code table.
fn status_for_model_error(err: &mash_core::ModelError) -> StatusCode {
    use mash_core::ModelError::*;
    match err {
        EndpointNotFound(_) | EndpointDuplicate(_) => StatusCode::InvalidEndpoint,
        FeatureNotFound(_) | FeatureDuplicate(_) => StatusCode::InvalidFeature,
        AttributeNotFound(_) => StatusCode::InvalidAttribute,
        ReadOnly(_) | WriteOnly(_) => StatusCode::ReadOnly,
        TypeMismatch(_) | ConstraintViolated(_) | NotNullable(_) => StatusCode::ConstraintError,
        CommandNotFound(_) => StatusCode::InvalidCommand,
        InvalidParameters(_) => StatusCode::InvalidParameter,
        CommandFailed(_, _) => StatusCode::InternalError,
    }
}

fn map_invoke_error(command_id: u8, err: mash_core::ModelError) -> (StatusCode, String) {
    let status = status_for_model_error(&err);
    if status == StatusCode::InternalError {
        warn!(command_id, error = %err, "command handler failed");
    }
    (status, err.to_string())
}
