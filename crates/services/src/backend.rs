//! # ForumBackend
//!
//! Request-level entry point. Resolves the session, dispatches to the
//! engines and applies the read-side access rule: only the forum owner may
//! see other users' unpublished content.

use crate::branch::{BranchSplitter, NewBranch};
use crate::context::{EngineConfig, Ports};
use crate::dto::{
    CreateCommentRequest, CreateForumRequest, CreateMessageRequest, EditMessageRequest,
    ListTreesRequest, PublishRequest, RateRequest, SplitBranchRequest,
};
use crate::forum::ForumService;
use crate::moderation::{DecisionOutcome, Deletion, ModerationEngine, NewMessage, WriteResponse};
use crate::query::TreeQueryEngine;
use crate::rating::RatingAggregator;
use domains::{
    DomainError, Forum, ForumId, ForumRepository, MessageId, MessageRepository, Page,
    RatingSummary, RatingValue, Result, SessionProvider, TreeId, TreeQuery, TreeView, User,
    UserId,
};
use std::sync::Arc;
use tracing::{error, warn};

pub struct ForumBackend {
    sessions: Arc<dyn SessionProvider>,
    forum_repo: Arc<dyn ForumRepository>,
    message_repo: Arc<dyn MessageRepository>,
    forums: ForumService,
    moderation: ModerationEngine,
    branches: BranchSplitter,
    ratings: RatingAggregator,
    queries: TreeQueryEngine,
    config: EngineConfig,
}

/// Logs a failed request. Rule violations are expected traffic; anything
/// else is an infrastructure problem.
fn observe<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        if err.is_business_rule() {
            warn!(operation, error = %err, "request rejected");
        } else {
            error!(operation, error = %err, "request failed");
        }
    }
    result
}

impl ForumBackend {
    pub fn new(ports: Ports, config: EngineConfig) -> Self {
        Self {
            forums: ForumService::new(
                ports.forums.clone(),
                ports.clock.clone(),
                config.max_forum_name_length,
                config.max_ban_count,
            ),
            moderation: ModerationEngine::new(
                ports.forums.clone(),
                ports.messages.clone(),
                ports.clock.clone(),
                config.max_ban_count,
            ),
            branches: BranchSplitter::new(
                ports.forums.clone(),
                ports.messages.clone(),
                ports.clock.clone(),
            ),
            ratings: RatingAggregator::new(ports.messages.clone(), ports.ratings.clone()),
            queries: TreeQueryEngine::new(
                ports.forums.clone(),
                ports.messages.clone(),
                ports.ratings.clone(),
            ),
            sessions: ports.sessions,
            forum_repo: ports.forums,
            message_repo: ports.messages,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn authenticate(&self, token: &str) -> Result<User> {
        self.sessions.user_by_token(token).await?.ok_or(DomainError::Auth)
    }

    /// Anonymous reads are allowed; a token that does not resolve is not.
    async fn viewer(&self, token: Option<&str>) -> Result<Option<User>> {
        match token {
            Some(token) => self.authenticate(token).await.map(Some),
            None => Ok(None),
        }
    }

    async fn forum(&self, id: ForumId) -> Result<Forum> {
        self.forum_repo
            .get_forum(id)
            .await?
            .ok_or_else(|| DomainError::forum_not_found(id))
    }

    pub async fn create_forum(&self, token: &str, request: CreateForumRequest) -> Result<Forum> {
        let result = async {
            let user = self.authenticate(token).await?;
            self.forums.create_forum(&user, &request.name, request.forum_type).await
        }
        .await;
        observe("create_forum", result)
    }

    pub async fn set_forum_readonly(&self, token: &str, forum_id: ForumId, readonly: bool) -> Result<Forum> {
        let result = async {
            let user = self.authenticate(token).await?;
            self.forums.set_readonly(&user, forum_id, readonly).await
        }
        .await;
        observe("set_forum_readonly", result)
    }

    pub async fn create_message(&self, token: &str, request: CreateMessageRequest) -> Result<WriteResponse> {
        let result = async {
            let user = self.authenticate(token).await?;
            let message = NewMessage {
                subject: request.subject,
                body: request.body,
                priority: request.priority,
                tags: request.tags,
            };
            self.moderation.create_message(&user, request.forum_id, message).await
        }
        .await;
        observe("create_message", result)
    }

    pub async fn create_comment(&self, token: &str, request: CreateCommentRequest) -> Result<WriteResponse> {
        let result = async {
            let user = self.authenticate(token).await?;
            self.moderation.create_comment(&user, request.parent_id, request.body).await
        }
        .await;
        observe("create_comment", result)
    }

    pub async fn edit_message(&self, token: &str, request: EditMessageRequest) -> Result<WriteResponse> {
        let result = async {
            let user = self.authenticate(token).await?;
            self.moderation.edit_content(&user, request.message_id, request.body).await
        }
        .await;
        observe("edit_message", result)
    }

    pub async fn publish(&self, token: &str, request: PublishRequest) -> Result<DecisionOutcome> {
        let result = async {
            let user = self.authenticate(token).await?;
            self.moderation.decide(&user, request.message_id, request.decision).await
        }
        .await;
        observe("publish", result)
    }

    pub async fn delete_message(&self, token: &str, message_id: MessageId) -> Result<Deletion> {
        let result = async {
            let user = self.authenticate(token).await?;
            self.moderation.delete_message(&user, message_id).await
        }
        .await;
        observe("delete_message", result)
    }

    pub async fn split_branch(&self, token: &str, request: SplitBranchRequest) -> Result<WriteResponse> {
        let result = async {
            let user = self.authenticate(token).await?;
            let branch = NewBranch {
                subject: request.subject,
                priority: request.priority,
                tags: request.tags,
            };
            self.branches.split_branch(&user, request.message_id, branch).await
        }
        .await;
        observe("split_branch", result)
    }

    pub async fn rate(&self, token: &str, request: RateRequest) -> Result<RatingSummary> {
        let result = async {
            let user = self.authenticate(token).await?;
            let value = request
                .value
                .map(RatingValue::try_from)
                .transpose()
                .map_err(DomainError::Validation)?;
            self.ratings.rate(&user, request.message_id, value).await
        }
        .await;
        observe("rate", result)
    }

    pub async fn rating(&self, message_id: MessageId) -> Result<RatingSummary> {
        observe("rating", self.ratings.aggregate_rating(message_id).await)
    }

    /// One tree. Unpublished content of other users is shown only when the
    /// caller owns the forum and asked for it.
    pub async fn get_tree(&self, token: Option<&str>, tree_id: TreeId, query: TreeQuery) -> Result<TreeView> {
        let result = async {
            let viewer = self.viewer(token).await?;
            let tree = self
                .message_repo
                .get_tree(tree_id)
                .await?
                .ok_or_else(|| DomainError::tree_not_found(tree_id))?;
            let forum = self.forum(tree.forum_id).await?;
            let (query, viewer) = restrict_query(query, &forum, viewer.as_ref());
            self.queries.get_tree_visible_to(tree_id, query, viewer).await
        }
        .await;
        observe("get_tree", result)
    }

    pub async fn list_trees(
        &self,
        token: Option<&str>,
        forum_id: ForumId,
        request: ListTreesRequest,
    ) -> Result<Vec<TreeView>> {
        let result = async {
            let viewer = self.viewer(token).await?;
            let forum = self.forum(forum_id).await?;
            let page = Page::resolve(request.offset, request.limit, self.config.default_page);
            let (query, viewer) = restrict_query(request.query(), &forum, viewer.as_ref());
            self.queries.get_trees_by_forum_visible_to(forum_id, query, page, viewer).await
        }
        .await;
        observe("list_trees", result)
    }
}

/// Downgrades `include_unpublished` for callers without moderation rights.
/// Such callers still see their own pending content when they ask for it.
fn restrict_query(
    mut query: TreeQuery,
    forum: &Forum,
    viewer: Option<&User>,
) -> (TreeQuery, Option<UserId>) {
    let moderator = viewer.is_some_and(|user| forum.is_owned_by(user.id));
    if moderator || !query.include_unpublished {
        return (query, None);
    }
    query.include_unpublished = false;
    (query, viewer.map(|user| user.id))
}
