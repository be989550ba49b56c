//! Outbox row to bus envelope.

use quill_core::envelope::EventEnvelope;
use quill_core::resource::ResourceKind;
use quill_core::types::DbId;
use quill_db::models::event::OutboxEvent;
use serde_json::Value;

/// Build the canonical envelope for an outbox row.
///
/// `data` is the stored payload verbatim. Resource ids found in it are
/// hoisted; the payload's own `id` becomes `<entity>_id` when the entity is
/// known and no explicit field of that name exists.
pub fn build_envelope(event: &OutboxEvent) -> EventEnvelope {
    let payload = &event.payload;
    let own_id = event
        .entity
        .parse::<ResourceKind>()
        .ok()
        .and_then(|kind| read_id(payload, "id").map(|id| (kind, id)));
    let hoist = |kind: ResourceKind| {
        read_id(payload, kind.id_field())
            .or_else(|| own_id.filter(|(own, _)| *own == kind).map(|(_, id)| id))
    };

    EventEnvelope {
        event_id: event.id,
        timestamp: event.created_at,
        entity: event.entity.clone(),
        event_type: event.event_type.clone(),
        actor_id: event.actor_id,
        data: payload.clone(),
        note_id: hoist(ResourceKind::Note),
        notebook_id: hoist(ResourceKind::Notebook),
        block_id: hoist(ResourceKind::Block),
        task_id: hoist(ResourceKind::Task),
        user_id: hoist(ResourceKind::User),
    }
}

fn read_id(payload: &Value, field: &str) -> Option<DbId> {
    payload.get(field)?.as_str()?.parse().ok()
}
