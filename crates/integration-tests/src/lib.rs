//! Shared harness for the end-to-end tests: a [`ForumBackend`] wired to the
//! in-memory store, a controllable clock and helpers for users and forums.

pub mod contracts;

use chrono::{DateTime, Duration, Utc};
use domains::{Clock, Forum, ForumId, ForumType, MessageId, Priority, User, UserRole};
use services::dto::{CreateCommentRequest, CreateForumRequest, CreateMessageRequest};
use services::{EngineConfig, ForumBackend, Ports};
use std::sync::{Arc, Mutex};
use storage_adapters::{InMemorySessions, InMemoryStore};

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A registered account plus an open session token.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user: User,
    pub token: String,
}

pub struct Harness {
    pub backend: ForumBackend,
    pub store: Arc<InMemoryStore>,
    pub sessions: Arc<InMemorySessions>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let store = Arc::new(InMemoryStore::new());
        let sessions = Arc::new(InMemorySessions::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backend = ForumBackend::new(
            Ports {
                sessions: sessions.clone(),
                forums: store.clone(),
                messages: store.clone(),
                ratings: store.clone(),
                clock: clock.clone(),
            },
            config,
        );
        Self { backend, store, sessions, clock }
    }

    pub fn actor(&self, name: &str) -> Actor {
        self.register(User::new(name))
    }

    pub fn superuser(&self, name: &str) -> Actor {
        let mut user = User::new(name);
        user.role = UserRole::Superuser;
        self.register(user)
    }

    pub fn register(&self, user: User) -> Actor {
        self.sessions.register(user.clone());
        let token = self
            .sessions
            .open_session(user.id)
            .unwrap_or_else(|e| panic!("session for {}: {e}", user.name));
        Actor { user, token }
    }

    /// Replaces the stored account, keeping existing sessions valid.
    pub fn update(&self, actor: &mut Actor, change: impl FnOnce(&mut User)) {
        change(&mut actor.user);
        self.sessions
            .update_user(actor.user.clone())
            .unwrap_or_else(|e| panic!("update {}: {e}", actor.user.name));
    }

    /// Moves time forward by one second so creation order is unambiguous.
    pub fn tick(&self) {
        self.clock.advance(Duration::seconds(1));
    }

    pub async fn forum(&self, owner: &Actor, name: &str, forum_type: ForumType) -> Forum {
        self.backend
            .create_forum(&owner.token, CreateForumRequest { name: name.into(), forum_type })
            .await
            .unwrap_or_else(|e| panic!("create forum {name}: {e}"))
    }
}

pub fn new_message(forum_id: ForumId, subject: &str, body: &str) -> CreateMessageRequest {
    CreateMessageRequest {
        forum_id,
        subject: subject.into(),
        body: body.into(),
        priority: Priority::Normal,
        tags: Default::default(),
    }
}

pub fn new_comment(parent_id: MessageId, body: &str) -> CreateCommentRequest {
    CreateCommentRequest { parent_id, body: body.into() }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
