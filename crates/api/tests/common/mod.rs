//! Shared fixtures for the api integration tests.
//!
//! Everything runs against `MemoryStore`; no database is needed.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use quill_api::access::AccessResolver;
use quill_api::auth::jwt::{generate_access_token, JwtConfig};
use quill_api::config::{LogFormat, RealtimeConfig, ServerConfig};
use quill_api::router::build_app_router;
use quill_api::state::AppState;
use quill_api::sync::{BlockTaskSynchronizer, SyncOutcome};
use quill_api::ws::{Hub, HubHandle};
use quill_core::envelope::EventEnvelope;
use quill_core::payload::{BlockContent, BlockMetadata, BlockType, TaskMetadata};
use quill_core::resource::{ResourceKind, ResourceRef};
use quill_core::roles::RoleLevel;
use quill_core::types::DbId;
use quill_db::models::block::{Block, CreateBlock};
use quill_db::models::note::{CreateNote, Note};
use quill_db::models::task::{CreateTask, Task};
use quill_db::{ContentStore, MemoryStore, OutboxStore, RoleStore, Store};
use quill_events::envelope::build_envelope;

/// Rounds of sync processing after which a test treats the system as
/// looping.
pub const MAX_SYNC_ROUNDS: usize = 8;

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        outbox_poll_interval: Duration::from_millis(10),
        realtime: RealtimeConfig::default(),
        log_format: LogFormat::Pretty,
        jwt: JwtConfig {
            secret: "test-secret-not-for-production".to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

pub fn token_for(user_id: DbId) -> String {
    generate_access_token(user_id, &test_config().jwt).expect("token")
}

/// Store, resolver and synchronizer wired together.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub access: Arc<AccessResolver>,
    pub sync: Arc<BlockTaskSynchronizer>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Store> = store.clone();
        let access = Arc::new(AccessResolver::new(dyn_store.clone()));
        let sync = Arc::new(BlockTaskSynchronizer::new(dyn_store, access.clone()));
        Self {
            store,
            access,
            sync,
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub async fn note(&self, owner: DbId, title: &str, is_primary: bool) -> Note {
        self.store
            .create_note(
                Some(owner),
                CreateNote {
                    user_id: owner,
                    notebook_id: None,
                    title: title.to_string(),
                    is_primary,
                },
            )
            .await
            .expect("create note")
    }

    pub async fn note_in(&self, owner: DbId, notebook_id: DbId, title: &str) -> Note {
        self.store
            .create_note(
                Some(owner),
                CreateNote {
                    user_id: owner,
                    notebook_id: Some(notebook_id),
                    title: title.to_string(),
                    is_primary: false,
                },
            )
            .await
            .expect("create note")
    }

    /// A block written by `actor`, as the editor would.
    pub async fn block(&self, actor: DbId, note: &Note, block_type: &str, text: &str) -> Block {
        self.store
            .create_block(
                Some(actor),
                CreateBlock {
                    note_id: note.id,
                    user_id: note.user_id,
                    block_type: BlockType::from(block_type),
                    content: BlockContent::with_text(text),
                    metadata: BlockMetadata::default(),
                    order: None,
                    sync_source: None,
                },
            )
            .await
            .expect("create block")
    }

    /// A task written by `actor` through the task API.
    pub async fn task(&self, actor: DbId, owner: DbId, title: &str, block_id: Option<DbId>) -> Task {
        self.store
            .create_task(
                Some(actor),
                CreateTask {
                    user_id: owner,
                    title: title.to_string(),
                    description: None,
                    is_completed: false,
                    block_id,
                    metadata: TaskMetadata::default(),
                    sync_source: None,
                },
            )
            .await
            .expect("create task")
    }

    pub async fn grant(&self, user_id: DbId, kind: ResourceKind, id: DbId, role: RoleLevel) {
        self.store
            .upsert_grant(user_id, ResourceRef::new(kind, id), role)
            .await
            .expect("grant");
    }

    /// Take every undispatched outbox row as an envelope, marking it
    /// dispatched, the way one dispatcher tick would.
    pub async fn take_pending(&self) -> Vec<EventEnvelope> {
        let rows = self.store.list_undispatched().await.expect("outbox");
        let mut envelopes = Vec::with_capacity(rows.len());
        for row in rows {
            self.store
                .mark_dispatched(row.id, chrono::Utc::now())
                .await
                .expect("mark dispatched");
            envelopes.push(build_envelope(&row));
        }
        envelopes
    }

    /// Feed pending events to the synchronizer until the outbox is quiet.
    /// Returns the number of rounds it took, or panics on a runaway loop.
    pub async fn settle(&self) -> usize {
        for round in 0..MAX_SYNC_ROUNDS {
            let envelopes = self.take_pending().await;
            if envelopes.is_empty() {
                return round;
            }
            for envelope in &envelopes {
                self.sync.handle(envelope).await.expect("sync handle");
            }
        }
        panic!("sync did not settle within {MAX_SYNC_ROUNDS} rounds");
    }

    /// Outcomes of handling the currently pending events once.
    pub async fn handle_pending(&self) -> Vec<SyncOutcome> {
        let mut outcomes = Vec::new();
        for envelope in self.take_pending().await {
            outcomes.push(self.sync.handle(&envelope).await.expect("sync handle"));
        }
        outcomes
    }

    /// Full router on top of this fixture's store, plus the hub behind it.
    pub fn app(&self) -> (Router, HubHandle) {
        let config = test_config();
        let (hub, _task) = Hub::spawn(
            config.realtime.client_buffer,
            None,
            CancellationToken::new(),
        );
        let state = AppState {
            store: self.dyn_store(),
            config: Arc::new(config.clone()),
            access: self.access.clone(),
            hub: hub.clone(),
        };
        (build_app_router(state, &config), hub)
    }
}

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str, token: Option<&str>) -> Response<Body> {
    send(app, Method::GET, uri, token, None).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
