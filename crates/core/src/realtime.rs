//! Realtime client protocol and fan-out routing rules.
//!
//! Lives in `core` so the WebSocket hub, its tests and any future client
//! tooling agree on one wire format and one matching predicate.
//!
//! Subscription keys:
//!
//! | Key                      | Receives                                    |
//! |--------------------------|---------------------------------------------|
//! | `all`                    | every event                                 |
//! | `<type>`                 | every event about that resource type        |
//! | `<type>:<id>`            | events about one resource                   |
//! | `notebook:<id>`          | also events about notes inside the notebook |
//! | `notebook:notes:<id>`    | events about notes inside the notebook      |
//! | `<type>s`                | collection-level subscription               |

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::resource::ResourceKind;

pub const SUBSCRIPTION_ALL: &str = "all";

pub const MSG_SUBSCRIBE: &str = "subscribe";
pub const MSG_UNSUBSCRIBE: &str = "unsubscribe";
pub const MSG_EVENT: &str = "event";
pub const MSG_SUBSCRIPTION: &str = "subscription";
pub const MSG_ERROR: &str = "error";
pub const SUBSCRIPTION_CONFIRMED: &str = "confirmed";

// ---------------------------------------------------------------------------
// Inbound control messages
// ---------------------------------------------------------------------------

/// What a client wants to (un)subscribe from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTarget {
    pub resource: String,
    #[serde(
        default,
        deserialize_with = "id_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
}

impl SubscriptionTarget {
    pub fn new(resource: impl Into<String>, id: Option<String>) -> Self {
        Self {
            resource: resource.into(),
            id,
        }
    }

    /// The subscription-set key for this target.
    pub fn key(&self) -> String {
        if self.resource == SUBSCRIPTION_ALL {
            return SUBSCRIPTION_ALL.to_string();
        }
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => format!("{}:{}", self.resource, id),
            _ => self.resource.clone(),
        }
    }
}

/// A parsed inbound control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Subscribe(SubscriptionTarget),
    Unsubscribe(SubscriptionTarget),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unsupported message type '{0}'")]
    UnsupportedType(String),

    #[error("message is missing a resource")]
    MissingResource,
}

/// Wire shape of an inbound frame. The target may be nested under
/// `payload` or given at the top level.
#[derive(Deserialize)]
struct RawClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default, deserialize_with = "id_as_string")]
    id: Option<String>,
}

/// Parse one inbound text frame.
pub fn parse_client_message(text: &str) -> Result<ClientCommand, ProtocolError> {
    let raw: RawClientMessage =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let target = match raw.payload {
        Some(payload @ Value::Object(_)) => serde_json::from_value::<SubscriptionTarget>(payload)
            .map_err(|_| ProtocolError::MissingResource)?,
        _ => SubscriptionTarget {
            resource: raw.resource.ok_or(ProtocolError::MissingResource)?,
            id: raw.id,
        },
    };
    if target.resource.is_empty() {
        return Err(ProtocolError::MissingResource);
    }

    match raw.kind.as_str() {
        MSG_SUBSCRIBE => Ok(ClientCommand::Subscribe(target)),
        MSG_UNSUBSCRIBE => Ok(ClientCommand::Unsubscribe(target)),
        other => Err(ProtocolError::UnsupportedType(other.to_string())),
    }
}

fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_id))
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// A frame sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub event: String,
    pub payload: Value,
}

impl ServerMessage {
    /// Deliver a bus envelope.
    pub fn event(event_type: impl Into<String>, envelope: Value) -> Self {
        Self {
            kind: MSG_EVENT.to_string(),
            event: event_type.into(),
            payload: envelope,
        }
    }

    /// Confirm a newly added subscription.
    pub fn subscription_confirmed(target: &SubscriptionTarget) -> Self {
        Self {
            kind: MSG_SUBSCRIPTION.to_string(),
            event: SUBSCRIPTION_CONFIRMED.to_string(),
            payload: serde_json::json!({
                "resource": target.resource,
                "id": target.id,
            }),
        }
    }

    /// Report a control frame the server could not act on.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: MSG_ERROR.to_string(),
            event: "rejected".to_string(),
            payload: serde_json::json!({ "message": message.into() }),
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// The resource an envelope is about, as far as routing is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub resource_type: String,
    pub resource_id: Option<String>,
    /// Parent notebook, used for notes only.
    pub notebook_id: Option<String>,
}

/// Work out what an envelope is about.
///
/// Tried in order, first hit wins:
/// 1. explicit `resource_type`/`entity` fields at the top level, then in
///    `data`, `payload`, `payload.data`;
/// 2. structural heuristics on the innermost object (`title` -> note,
///    `name` -> notebook, `content` -> block);
/// 3. the prefix of the event type name (`"note.updated"` -> note).
pub fn extract_route(envelope: &Value) -> Option<RouteTarget> {
    let layers = layers(envelope);

    let resource_type = explicit_type(&layers)
        .map(|(ty, start)| (ty, Some(start)))
        .or_else(|| heuristic_type(&layers).map(|(ty, at)| (ty, Some(at))))
        .or_else(|| type_from_event_name(envelope).map(|ty| (ty, None)))?;

    let (resource_type, start) = resource_type;
    let resource_id = find_id(&layers, &resource_type, start.unwrap_or(0));
    let notebook_id = if resource_type == ResourceKind::Note.as_str() {
        layers
            .iter()
            .find_map(|layer| layer.get("notebook_id").and_then(value_as_id))
    } else {
        None
    };

    Some(RouteTarget {
        resource_type,
        resource_id,
        notebook_id,
    })
}

/// Whether a client with `subscriptions` should receive an event about
/// `target`.
pub fn subscription_matches(subscriptions: &HashSet<String>, target: &RouteTarget) -> bool {
    if subscriptions.contains(SUBSCRIPTION_ALL) {
        return true;
    }
    let ty = target.resource_type.as_str();
    if subscriptions.contains(ty) {
        return true;
    }
    if let Some(id) = &target.resource_id {
        if subscriptions.contains(&format!("{ty}:{id}")) {
            return true;
        }
    }
    if ty == ResourceKind::Note.as_str() {
        if let Some(notebook_id) = &target.notebook_id {
            if subscriptions.contains(&format!("notebook:{notebook_id}"))
                || subscriptions.contains(&format!("notebook:notes:{notebook_id}"))
            {
                return true;
            }
        }
    }
    subscriptions.contains(&format!("{ty}s"))
}

/// Root, `data`, `payload`, `payload.data`, skipping anything that is not
/// an object.
fn layers(envelope: &Value) -> Vec<&serde_json::Map<String, Value>> {
    let payload = envelope.get("payload");
    [
        Some(envelope),
        envelope.get("data"),
        payload,
        payload.and_then(|p| p.get("data")),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_object)
    .collect()
}

fn explicit_type(layers: &[&serde_json::Map<String, Value>]) -> Option<(String, usize)> {
    layers.iter().enumerate().find_map(|(i, layer)| {
        ["resource_type", "entity"]
            .iter()
            .find_map(|key| layer.get(*key).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(|s| (s.to_string(), i))
    })
}

fn heuristic_type(layers: &[&serde_json::Map<String, Value>]) -> Option<(String, usize)> {
    layers.iter().enumerate().rev().find_map(|(i, layer)| {
        let ty = if layer.contains_key("title") {
            ResourceKind::Note
        } else if layer.contains_key("name") {
            ResourceKind::Notebook
        } else if layer.contains_key("content") {
            ResourceKind::Block
        } else {
            return None;
        };
        Some((ty.as_str().to_string(), i))
    })
}

fn type_from_event_name(envelope: &Value) -> Option<String> {
    let name = ["type", "event_type", "event"]
        .iter()
        .find_map(|key| envelope.get(*key).and_then(Value::as_str))?;
    let (prefix, _) = name.split_once('.')?;
    prefix
        .parse::<ResourceKind>()
        .ok()
        .map(|kind| kind.as_str().to_string())
}

fn find_id(
    layers: &[&serde_json::Map<String, Value>],
    resource_type: &str,
    start: usize,
) -> Option<String> {
    let typed_key = format!("{resource_type}_id");
    layers.iter().skip(start).find_map(|layer| {
        ["resource_id", typed_key.as_str(), "id"]
            .iter()
            .find_map(|key| layer.get(*key).and_then(value_as_id))
    })
}
