//! # PostgreSQL store
//!
//! Maps the relational model onto the domain models. Every write runs in its
//! own transaction so a failure leaves no partial state behind.
//! History rows are ordered by `seq`; the row with the highest `seq` is the
//! head of a message's history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    DomainError, Forum, ForumId, ForumRepository, ForumType, History, HistoryChange, HistoryItem,
    MessageId, MessageItem, MessageRepository, MessageTree, Priority, PublicationState, Rating,
    RatingRepository, RatingSummary, RatingValue, Result, TreeId, UserId,
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

fn db_err(err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return DomainError::Conflict(db.message().to_string());
        }
    }
    DomainError::persistence(err)
}

fn corrupt(what: &str, value: &str) -> DomainError {
    DomainError::Persistence(format!("unexpected {what} '{value}' in database"))
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and runs pending migrations.
    pub async fn connect(url: &SecretString) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url.expose_secret())
            .await
            .map_err(db_err)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DomainError::persistence)?;
        info!("postgres store ready");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>> {
        self.pool.begin().await.map_err(db_err)
    }
}

fn forum_from_row(row: &PgRow) -> Result<Forum> {
    let forum_type: String = row.get("forum_type");
    Ok(Forum {
        id: ForumId(row.get("id")),
        forum_type: ForumType::parse(&forum_type).ok_or_else(|| corrupt("forum type", &forum_type))?,
        name: row.get("name"),
        owner: UserId(row.get("owner_id")),
        created_at: row.get("created_at"),
        readonly: row.get("readonly"),
    })
}

fn tree_from_row(row: &PgRow, tags: BTreeSet<String>) -> Result<MessageTree> {
    let priority: String = row.get("priority");
    Ok(MessageTree {
        id: TreeId(row.get("id")),
        forum_id: ForumId(row.get("forum_id")),
        subject: row.get("subject"),
        root_id: MessageId(row.get("root_id")),
        priority: Priority::parse(&priority).ok_or_else(|| corrupt("priority", &priority))?,
        tags,
        created_at: row.get("created_at"),
    })
}

fn history_item_from_row(row: &PgRow) -> Result<HistoryItem> {
    let state: String = row.get("state");
    Ok(HistoryItem {
        body: row.get("body"),
        state: PublicationState::parse(&state).ok_or_else(|| corrupt("publication state", &state))?,
        created_at: row.get("created_at"),
    })
}

/// Assembles message items from their rows plus history and child rows.
/// `rows` must be in creation order; that order carries over to `children`.
fn assemble(rows: Vec<PgRow>, history_rows: Vec<PgRow>) -> Result<Vec<MessageItem>> {
    let mut histories: HashMap<Uuid, Vec<HistoryItem>> = HashMap::new();
    for row in &history_rows {
        histories
            .entry(row.get("message_id"))
            .or_default()
            .push(history_item_from_row(row)?);
    }

    let mut children: HashMap<Uuid, Vec<MessageId>> = HashMap::new();
    for row in &rows {
        if let Some(parent) = row.get::<Option<Uuid>, _>("parent_id") {
            children.entry(parent).or_default().push(MessageId(row.get("id")));
        }
    }

    rows.iter()
        .map(|row| {
            let id: Uuid = row.get("id");
            let history = histories
                .remove(&id)
                .and_then(History::from_newest_first)
                .ok_or_else(|| DomainError::Persistence(format!("message {id} has no history")))?;
            Ok(MessageItem {
                id: MessageId(id),
                owner: UserId(row.get("owner_id")),
                parent_id: row.get::<Option<Uuid>, _>("parent_id").map(MessageId),
                tree_id: TreeId(row.get("tree_id")),
                history,
                children: children.remove(&id).unwrap_or_default(),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
        })
        .collect()
}

async fn insert_message(tx: &mut Transaction<'_, Postgres>, message: &MessageItem) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO messages (id, tree_id, parent_id, owner_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(message.id.as_uuid())
    .bind(message.tree_id.as_uuid())
    .bind(message.parent_id.map(|p| p.as_uuid()))
    .bind(message.owner.as_uuid())
    .bind(message.created_at)
    .bind(message.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;

    // Oldest first so the newest version receives the highest seq.
    for item in message.history.versions().iter().rev() {
        insert_history(tx, message.id, item).await?;
    }
    Ok(())
}

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    message_id: MessageId,
    item: &HistoryItem,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO message_history (message_id, body, state, created_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(message_id.as_uuid())
    .bind(&item.body)
    .bind(item.state.as_str())
    .bind(item.created_at)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

async fn insert_tree(tx: &mut Transaction<'_, Postgres>, tree: &MessageTree) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO message_trees (id, forum_id, subject, root_id, priority, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(tree.id.as_uuid())
    .bind(tree.forum_id.as_uuid())
    .bind(&tree.subject)
    .bind(tree.root_id.as_uuid())
    .bind(tree.priority.as_str())
    .bind(tree.created_at)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;

    for tag in &tree.tags {
        sqlx::query("INSERT INTO tree_tags (tree_id, tag) VALUES ($1, $2)")
            .bind(tree.id.as_uuid())
            .bind(tag)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
    }
    Ok(())
}

#[async_trait]
impl ForumRepository for PgStore {
    async fn get_forum(&self, id: ForumId) -> Result<Option<Forum>> {
        let row = sqlx::query("SELECT * FROM forums WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(forum_from_row).transpose()
    }

    async fn create_forum(&self, forum: Forum) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO forums (id, forum_type, name, owner_id, readonly, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(forum.id.as_uuid())
        .bind(forum.forum_type.as_str())
        .bind(&forum.name)
        .bind(forum.owner.as_uuid())
        .bind(forum.readonly)
        .bind(forum.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn set_forum_readonly(&self, id: ForumId, readonly: bool) -> Result<()> {
        let done = sqlx::query("UPDATE forums SET readonly = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(readonly)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(DomainError::forum_not_found(id));
        }
        Ok(())
    }
}

impl PgStore {
    async fn tags_of(&self, tree_ids: &[Uuid]) -> Result<HashMap<Uuid, BTreeSet<String>>> {
        let rows = sqlx::query("SELECT tree_id, tag FROM tree_tags WHERE tree_id = ANY($1)")
            .bind(tree_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let mut tags: HashMap<Uuid, BTreeSet<String>> = HashMap::new();
        for row in rows {
            tags.entry(row.get("tree_id")).or_default().insert(row.get("tag"));
        }
        Ok(tags)
    }
}

#[async_trait]
impl MessageRepository for PgStore {
    async fn get_message(&self, id: MessageId) -> Result<Option<MessageItem>> {
        let Some(row) = sqlx::query("SELECT * FROM messages WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };

        let history = sqlx::query(
            "SELECT * FROM message_history WHERE message_id = $1 ORDER BY seq DESC",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let children: Vec<Uuid> = sqlx::query(
            "SELECT id FROM messages WHERE parent_id = $1 ORDER BY created_at, id",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .iter()
        .map(|r| r.get("id"))
        .collect();

        let mut items = assemble(vec![row], history)?;
        let mut message = items.pop().ok_or_else(|| DomainError::message_not_found(id))?;
        message.children = children.into_iter().map(MessageId).collect();
        Ok(Some(message))
    }

    async fn get_tree(&self, id: TreeId) -> Result<Option<MessageTree>> {
        let Some(row) = sqlx::query("SELECT * FROM message_trees WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };
        let mut tags = self.tags_of(&[id.as_uuid()]).await?;
        tree_from_row(&row, tags.remove(&id.as_uuid()).unwrap_or_default()).map(Some)
    }

    async fn tree_messages(&self, id: TreeId) -> Result<Vec<MessageItem>> {
        let rows = sqlx::query("SELECT * FROM messages WHERE tree_id = $1 ORDER BY created_at, id")
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let history = sqlx::query(
            r#"
            SELECT h.* FROM message_history h
            JOIN messages m ON m.id = h.message_id
            WHERE m.tree_id = $1
            ORDER BY h.seq DESC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        assemble(rows, history)
    }

    async fn list_trees(&self, forum_id: ForumId) -> Result<Vec<MessageTree>> {
        let rows = sqlx::query("SELECT * FROM message_trees WHERE forum_id = $1 ORDER BY id")
            .bind(forum_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.get("id")).collect();
        let mut tags = self.tags_of(&ids).await?;
        rows.iter()
            .map(|row| {
                let id: Uuid = row.get("id");
                tree_from_row(row, tags.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn create_tree(&self, tree: MessageTree, root: MessageItem) -> Result<()> {
        let mut tx = self.begin().await?;
        insert_tree(&mut tx, &tree).await?;
        insert_message(&mut tx, &root).await?;
        tx.commit().await.map_err(db_err)?;
        debug!(tree = %tree.id, root = %root.id, "tree stored");
        Ok(())
    }

    async fn create_comment(&self, comment: MessageItem) -> Result<()> {
        let mut tx = self.begin().await?;
        insert_message(&mut tx, &comment).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn apply_history(
        &self,
        id: MessageId,
        change: HistoryChange,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.begin().await?;
        let head: Option<i64> = sqlx::query("SELECT MAX(seq) AS seq FROM message_history WHERE message_id = $1")
            .bind(id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?
            .get("seq");
        let head = head.ok_or_else(|| DomainError::message_not_found(id))?;

        match change {
            HistoryChange::Append(item) => insert_history(&mut tx, id, &item).await?,
            HistoryChange::OverwriteLatest(item) => {
                sqlx::query(
                    "UPDATE message_history SET body = $2, state = $3, created_at = $4 WHERE seq = $1",
                )
                .bind(head)
                .bind(&item.body)
                .bind(item.state.as_str())
                .bind(item.created_at)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            HistoryChange::SetLatestState(state) => {
                sqlx::query("UPDATE message_history SET state = $2 WHERE seq = $1")
                    .bind(head)
                    .bind(state.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
            HistoryChange::DiscardLatest => {
                let versions: i64 = sqlx::query("SELECT COUNT(*) AS n FROM message_history WHERE message_id = $1")
                    .bind(id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_err)?
                    .get("n");
                if versions < 2 {
                    return Err(DomainError::Persistence(format!(
                        "message {id} cannot lose its only version"
                    )));
                }
                sqlx::query("DELETE FROM message_history WHERE seq = $1")
                    .bind(head)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
        }

        sqlx::query("UPDATE messages SET updated_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)
    }

    async fn delete_tree(&self, id: TreeId) -> Result<()> {
        // Messages, history, tags and ratings follow through ON DELETE CASCADE.
        let done = sqlx::query("DELETE FROM message_trees WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(DomainError::tree_not_found(id));
        }
        Ok(())
    }

    async fn delete_message(&self, id: MessageId) -> Result<()> {
        let mut tx = self.begin().await?;
        let has_children: bool =
            sqlx::query("SELECT EXISTS (SELECT 1 FROM messages WHERE parent_id = $1) AS found")
                .bind(id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?
                .get("found");
        if has_children {
            return Err(DomainError::MessageHasComments(id));
        }
        let done = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(DomainError::message_not_found(id));
        }
        tx.commit().await.map_err(db_err)
    }

    async fn split_branch(&self, message_id: MessageId, tree: MessageTree) -> Result<()> {
        let mut tx = self.begin().await?;
        let parent: Option<Option<Uuid>> = sqlx::query("SELECT parent_id FROM messages WHERE id = $1 FOR UPDATE")
            .bind(message_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .map(|row| row.get("parent_id"));
        match parent {
            None => return Err(DomainError::message_not_found(message_id)),
            Some(None) => return Err(DomainError::MessageAlreadyBranch(message_id)),
            Some(Some(_)) => {}
        }

        insert_tree(&mut tx, &tree).await?;
        let moved = sqlx::query(
            r#"
            WITH RECURSIVE branch AS (
                SELECT id FROM messages WHERE id = $1
                UNION ALL
                SELECT m.id FROM messages m JOIN branch b ON m.parent_id = b.id
            )
            UPDATE messages SET tree_id = $2 WHERE id IN (SELECT id FROM branch)
            "#,
        )
        .bind(message_id.as_uuid())
        .bind(tree.id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        sqlx::query("UPDATE messages SET parent_id = NULL WHERE id = $1")
            .bind(message_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        debug!(message = %message_id, tree = %tree.id, moved = moved.rows_affected(), "branch split stored");
        Ok(())
    }
}

#[async_trait]
impl RatingRepository for PgStore {
    async fn upsert_rating(&self, rating: Rating) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ratings (message_id, user_id, value) VALUES ($1, $2, $3)
            ON CONFLICT (message_id, user_id) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(rating.message_id.as_uuid())
        .bind(rating.user_id.as_uuid())
        .bind(i16::from(rating.value.get()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_rating(&self, message_id: MessageId, user_id: UserId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM ratings WHERE message_id = $1 AND user_id = $2")
            .bind(message_id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(done.rows_affected() > 0)
    }

    async fn ratings_for(&self, message_id: MessageId) -> Result<Vec<Rating>> {
        let rows = sqlx::query("SELECT user_id, value FROM ratings WHERE message_id = $1")
            .bind(message_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                let value: i16 = row.get("value");
                Ok(Rating {
                    message_id,
                    user_id: UserId(row.get("user_id")),
                    value: RatingValue::try_from(i32::from(value)).map_err(DomainError::Persistence)?,
                })
            })
            .collect()
    }

    async fn rating_summaries(
        &self,
        message_ids: Vec<MessageId>,
    ) -> Result<HashMap<MessageId, RatingSummary>> {
        let ids: Vec<Uuid> = message_ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT message_id, AVG(value)::FLOAT8 AS average, COUNT(*) AS count
            FROM ratings WHERE message_id = ANY($1)
            GROUP BY message_id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows
            .iter()
            .map(|row| {
                let count: i64 = row.get("count");
                (
                    MessageId(row.get("message_id")),
                    RatingSummary { average: row.get("average"), count: count as u64 },
                )
            })
            .collect())
    }
}
