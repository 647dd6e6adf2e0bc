//! Outcome messages and the dispatcher contract.
//!
//! The engine never formats player-facing text. It hands structured
//! [`OutcomeMessage`]s to a [`MessageDispatcher`] after the state change
//! they describe has been committed.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::Timestamp;
use crate::id::PlayerId;
use crate::resources::Resources;
use crate::units::UnitCollection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageCategory {
    Fleet,
    Combat,
    Espionage,
    Expedition,
    Colonization,
    Harvest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMessage {
    pub recipient: PlayerId,
    pub category: MessageCategory,
    /// Key of the template the mailbox renders, e.g. `transport.arrived`.
    pub template_key: String,
    pub params: Map<String, Value>,
    /// Game instant the outcome happened at.
    pub at: Timestamp,
}

impl OutcomeMessage {
    pub fn new(
        recipient: PlayerId,
        category: MessageCategory,
        template_key: impl Into<String>,
        at: Timestamp,
    ) -> Self {
        Self {
            recipient,
            category,
            template_key: template_key.into(),
            params: Map::new(),
            at,
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Add `metal`, `crystal` and `deuterium` as whole numbers.
    pub fn with_resources(self, r: &Resources) -> Self {
        let (m, c, d) = r.whole();
        self.with("metal", m).with("crystal", c).with("deuterium", d)
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// Whole metal, crystal and deuterium as a JSON object.
pub fn resources_value(r: &Resources) -> Value {
    let (m, c, d) = r.whole();
    serde_json::json!({ "metal": m, "crystal": c, "deuterium": d })
}

/// Unit counts as a JSON object keyed by unit type id.
pub fn units_value(units: &UnitCollection) -> Value {
    Value::Object(
        units
            .iter()
            .map(|(u, n)| (u.0.to_string(), Value::from(n)))
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("message delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Stores or delivers outcome messages.
pub trait MessageDispatcher: Send + Sync {
    fn dispatch(&self, message: OutcomeMessage) -> Result<(), DeliveryError>;
}

/// Drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDispatcher;

impl MessageDispatcher for NullDispatcher {
    fn dispatch(&self, _message: OutcomeMessage) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Keeps every message in memory, in delivery order.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    messages: Mutex<Vec<OutcomeMessage>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OutcomeMessage> {
        self.lock().clone()
    }

    pub fn messages_for(&self, player: PlayerId) -> Vec<OutcomeMessage> {
        self.lock()
            .iter()
            .filter(|m| m.recipient == player)
            .cloned()
            .collect()
    }

    pub fn with_key(&self, template_key: &str) -> Vec<OutcomeMessage> {
        self.lock()
            .iter()
            .filter(|m| m.template_key == template_key)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<OutcomeMessage>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MessageDispatcher for RecordingDispatcher {
    fn dispatch(&self, message: OutcomeMessage) -> Result<(), DeliveryError> {
        self.lock().push(message);
        Ok(())
    }
}

/// Send each message, logging failures. A failed delivery never undoes
/// the committed state change.
pub fn deliver_all(dispatcher: &dyn MessageDispatcher, messages: Vec<OutcomeMessage>) {
    for message in messages {
        let key = message.template_key.clone();
        let recipient = message.recipient;
        if let Err(e) = dispatcher.dispatch(message) {
            tracing::warn!(?recipient, template = %key, error = %e, "outcome message not delivered");
        }
    }
}
