//! Fills a fresh store with a small demo forum and prints its trees as JSON.
//!
//! Uses PostgreSQL when built with `db-postgres` and `database.url` is set,
//! the in-memory store otherwise.

use anyhow::{Context, Result};
use configs::Settings;
use domains::{
    Decision, ForumRepository, ForumType, MessageRepository, Order, Page, Priority,
    RatingRepository, SystemClock, User, UserRole,
};
use services::dto::{
    CreateCommentRequest, CreateForumRequest, CreateMessageRequest, ListTreesRequest,
    PublishRequest, RateRequest, SplitBranchRequest,
};
use services::{EngineConfig, ForumBackend, Ports};
use std::sync::Arc;
use storage_adapters::{InMemorySessions, InMemoryStore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));
    let registry = tracing_subscriber::registry().with(filter);
    if settings.log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

struct Repositories {
    forums: Arc<dyn ForumRepository>,
    messages: Arc<dyn MessageRepository>,
    ratings: Arc<dyn RatingRepository>,
}

impl Repositories {
    fn shared<S>(store: Arc<S>) -> Self
    where
        S: ForumRepository + MessageRepository + RatingRepository + 'static,
    {
        Self { forums: store.clone(), messages: store.clone(), ratings: store }
    }
}

#[cfg(feature = "db-postgres")]
async fn repositories(settings: &Settings) -> Result<Repositories> {
    if let Some(url) = &settings.database.url {
        let store = storage_adapters::PgStore::connect(url)
            .await
            .context("failed to connect to postgres")?;
        return Ok(Repositories::shared(Arc::new(store)));
    }
    Ok(Repositories::shared(Arc::new(InMemoryStore::new())))
}

#[cfg(not(feature = "db-postgres"))]
async fn repositories(_settings: &Settings) -> Result<Repositories> {
    Ok(Repositories::shared(Arc::new(InMemoryStore::new())))
}

fn engine_config(settings: &Settings) -> EngineConfig {
    EngineConfig {
        max_ban_count: settings.moderation.max_ban_count,
        default_page: Page {
            offset: settings.pagination.default_offset,
            limit: settings.pagination.default_limit,
        },
        max_forum_name_length: settings.forum.max_name_length,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("failed to load configuration")?;
    init_tracing(&settings);
    info!("configuration loaded");

    let sessions = Arc::new(InMemorySessions::new());
    let repos = repositories(&settings).await?;
    let backend = ForumBackend::new(
        Ports {
            sessions: sessions.clone(),
            forums: repos.forums,
            messages: repos.messages,
            ratings: repos.ratings,
            clock: Arc::new(SystemClock),
        },
        engine_config(&settings),
    );

    let mut admin = User::new("admin");
    admin.role = UserRole::Superuser;
    let alice = User::new("alice");
    let bob = User::new("bob");
    let carol = User::new("carol");
    let mut tokens = Vec::new();
    for user in [&admin, &alice, &bob, &carol] {
        sessions.register(user.clone());
        tokens.push(sessions.open_session(user.id)?);
    }
    let [admin_token, alice_token, bob_token, carol_token] = [&tokens[0], &tokens[1], &tokens[2], &tokens[3]];

    let forum = backend
        .create_forum(alice_token, CreateForumRequest { name: "general".into(), forum_type: ForumType::Moderated })
        .await?;
    let announcements = backend
        .create_forum(admin_token, CreateForumRequest { name: "announcements".into(), forum_type: ForumType::Unmoderated })
        .await?;
    info!(forum = %forum.id, announcements = %announcements.id, "forums created");

    let welcome = backend
        .create_message(
            alice_token,
            CreateMessageRequest {
                forum_id: forum.id,
                subject: "Welcome".into(),
                body: "Say hello below.".into(),
                priority: Priority::High,
                tags: ["meta".to_string()].into(),
            },
        )
        .await?;
    let question = backend
        .create_message(
            bob_token,
            CreateMessageRequest {
                forum_id: forum.id,
                subject: "Build times".into(),
                body: "How do you keep incremental builds fast?".into(),
                priority: Priority::Normal,
                tags: ["rust".to_string()].into(),
            },
        )
        .await?;
    backend
        .publish(alice_token, PublishRequest { message_id: question.id, decision: Decision::Yes })
        .await?;

    let hello = backend
        .create_comment(bob_token, CreateCommentRequest { parent_id: welcome.id, body: "Hello!".into() })
        .await?;
    backend
        .publish(alice_token, PublishRequest { message_id: hello.id, decision: Decision::Yes })
        .await?;
    let tangent = backend
        .create_comment(carol_token, CreateCommentRequest { parent_id: hello.id, body: "Anyone tried the new linker?".into() })
        .await?;
    backend
        .publish(alice_token, PublishRequest { message_id: tangent.id, decision: Decision::Yes })
        .await?;
    backend
        .split_branch(
            alice_token,
            SplitBranchRequest {
                message_id: tangent.id,
                subject: "Linkers".into(),
                priority: Priority::Normal,
                tags: ["tooling".to_string()].into(),
            },
        )
        .await?;

    for (token, value) in [(bob_token, 5), (carol_token, 4)] {
        backend.rate(token, RateRequest { message_id: welcome.id, value: Some(value) }).await?;
    }
    backend.rate(alice_token, RateRequest { message_id: question.id, value: Some(3) }).await?;

    let request = ListTreesRequest {
        order: Order::Rating,
        include_comments: true,
        ..ListTreesRequest::default()
    };
    let trees = backend.list_trees(None, forum.id, request).await?;
    info!(trees = trees.len(), "seed complete");
    println!("{}", serde_json::to_string_pretty(&trees)?);
    Ok(())
}
