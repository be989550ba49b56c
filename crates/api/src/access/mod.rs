//! Access resolution over role grants and the resource hierarchy.
//!
//! Order of evaluation, first match wins:
//!
//! 1. a system admin grant (`user` / own id / `admin`) allows everything;
//! 2. a principal always has access to its own user resource;
//! 3. walking from the resource up to the root, at each node a direct
//!    grant decides by rank, and at a note ownership allows;
//! 4. reaching the root denies.
//!
//! Missing resources along the way are denials, not errors.

use std::sync::Arc;

use quill_core::error::CoreError;
use quill_core::resource::{ResourceKind, ResourceRef};
use quill_core::roles::RoleLevel;
use quill_core::types::{parse_id, DbId};
use quill_db::models::role::RoleGrant;
use quill_db::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// An id, resource type or role name could not be parsed.
    #[error("malformed access request: {0}")]
    Malformed(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one node of the ancestor walk yields when it has no direct grant.
enum Step {
    Allow,
    Deny,
    Parent(ResourceRef),
}

/// Evaluates `has_access` and assigns roles. Cheap to share behind `Arc`;
/// holds no state besides the store handle.
pub struct AccessResolver {
    store: Arc<dyn Store>,
}

impl AccessResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Whether `principal` holds at least `min_role` on the resource.
    pub async fn has_access(
        &self,
        principal: DbId,
        resource_id: DbId,
        kind: ResourceKind,
        min_role: RoleLevel,
    ) -> Result<bool, AccessError> {
        if self.is_system_admin(principal).await? {
            return Ok(true);
        }
        if kind == ResourceKind::User && resource_id == principal {
            return Ok(true);
        }

        let mut node = ResourceRef::new(kind, resource_id);
        loop {
            if let Some(grant) = self.store.find_grant(principal, node).await? {
                return Ok(grant.role.satisfies(min_role));
            }
            match self.step(principal, node).await? {
                Step::Allow => return Ok(true),
                Step::Deny => return Ok(false),
                Step::Parent(parent) => node = parent,
            }
        }
    }

    /// [`has_access`](Self::has_access) over unparsed input.
    pub async fn has_access_raw(
        &self,
        principal: &str,
        resource_id: &str,
        kind: &str,
        min_role: &str,
    ) -> Result<bool, AccessError> {
        let principal = parse_id(principal)?;
        let resource_id = parse_id(resource_id)?;
        let kind: ResourceKind = kind.parse()?;
        let min_role: RoleLevel = min_role.parse()?;
        self.has_access(principal, resource_id, kind, min_role).await
    }

    /// Give `principal` exactly `role` on the resource, replacing any
    /// existing grant for the same triple.
    pub async fn assign_role(
        &self,
        principal: DbId,
        resource_id: DbId,
        kind: ResourceKind,
        role: RoleLevel,
    ) -> Result<RoleGrant, AccessError> {
        let grant = self
            .store
            .upsert_grant(principal, ResourceRef::new(kind, resource_id), role)
            .await?;
        tracing::info!(
            user_id = %principal,
            resource_type = %kind,
            resource_id = %resource_id,
            role = %role,
            "Role assigned",
        );
        Ok(grant)
    }

    /// Whether `principal` holds the `admin` grant on its own user resource.
    pub async fn is_system_admin(&self, principal: DbId) -> Result<bool, AccessError> {
        let own = ResourceRef::new(ResourceKind::User, principal);
        Ok(self
            .store
            .find_grant(principal, own)
            .await?
            .is_some_and(|g| g.is_system_admin()))
    }

    /// Resolve the next node above `node`, or settle the walk.
    async fn step(&self, principal: DbId, node: ResourceRef) -> Result<Step, AccessError> {
        let Some(parent_kind) = node.kind.parent_kind() else {
            return Ok(Step::Deny);
        };
        let parent_id = match node.kind {
            ResourceKind::Note => match self.store.find_note(node.id).await? {
                None => None,
                Some(note) if note.user_id == principal => return Ok(Step::Allow),
                Some(note) => note.notebook_id,
            },
            ResourceKind::Block => self.store.find_block(node.id).await?.map(|b| b.note_id),
            ResourceKind::Task => {
                // Standalone tasks have no inherited access path.
                match self.store.find_task(node.id).await?.and_then(|t| t.block_id) {
                    Some(block_id) => self.store.find_block(block_id).await?.map(|b| b.note_id),
                    None => None,
                }
            }
            ResourceKind::Notebook | ResourceKind::User => None,
        };
        Ok(parent_id.map_or(Step::Deny, |id| {
            Step::Parent(ResourceRef::new(parent_kind, id))
        }))
    }
}
