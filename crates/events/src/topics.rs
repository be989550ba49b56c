//! Topic naming. One topic per entity kind; anything else lands on
//! [`FALLBACK_TOPIC`].

use quill_core::resource::ResourceKind;

pub const TOPIC_NOTE: &str = "note";
pub const TOPIC_NOTEBOOK: &str = "notebook";
pub const TOPIC_BLOCK: &str = "block";
pub const TOPIC_TASK: &str = "task";
pub const TOPIC_USER: &str = "user";
pub const FALLBACK_TOPIC: &str = "events";

/// Topic for an outbox row's `entity` column.
pub fn topic_for(entity: &str) -> &'static str {
    match entity.parse::<ResourceKind>() {
        Ok(ResourceKind::Note) => TOPIC_NOTE,
        Ok(ResourceKind::Notebook) => TOPIC_NOTEBOOK,
        Ok(ResourceKind::Block) => TOPIC_BLOCK,
        Ok(ResourceKind::Task) => TOPIC_TASK,
        Ok(ResourceKind::User) => TOPIC_USER,
        Err(_) => FALLBACK_TOPIC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_entities_get_their_own_topic() {
        assert_eq!(topic_for("block"), TOPIC_BLOCK);
        assert_eq!(topic_for("notebook"), TOPIC_NOTEBOOK);
        assert_eq!(topic_for("user"), TOPIC_USER);
    }

    #[test]
    fn unknown_entities_fall_back() {
        assert_eq!(topic_for("comment"), FALLBACK_TOPIC);
        assert_eq!(topic_for(""), FALLBACK_TOPIC);
    }
}
