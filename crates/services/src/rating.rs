//! # RatingAggregator
//!
//! One rating per (message, user); a new value replaces the old one and
//! `None` withdraws it. Authors never rate their own messages.

use domains::{
    DomainError, MessageId, MessageItem, MessageRepository, Rating, RatingRepository,
    RatingSummary, RatingValue, Result, User,
};
use std::sync::Arc;
use tracing::info;

pub struct RatingAggregator {
    messages: Arc<dyn MessageRepository>,
    ratings: Arc<dyn RatingRepository>,
}

impl RatingAggregator {
    pub fn new(messages: Arc<dyn MessageRepository>, ratings: Arc<dyn RatingRepository>) -> Self {
        Self { messages, ratings }
    }

    /// Upserts or withdraws `rater`'s rating and returns the new aggregate.
    #[tracing::instrument(skip(self, rater), fields(user = %rater.id))]
    pub async fn rate(
        &self,
        rater: &User,
        message_id: MessageId,
        value: Option<RatingValue>,
    ) -> Result<RatingSummary> {
        let message = self.message(message_id).await?;
        if message.owner == rater.id {
            return Err(DomainError::SelfRating { user: rater.id, message: message_id });
        }

        match value {
            Some(value) => {
                self.ratings
                    .upsert_rating(Rating { message_id, user_id: rater.id, value })
                    .await?;
                info!(message = %message_id, value = value.get(), "rating stored");
            }
            None => {
                let existed = self.ratings.delete_rating(message_id, rater.id).await?;
                info!(message = %message_id, existed, "rating withdrawn");
            }
        }
        self.summary(message_id).await
    }

    /// Average and count; `(0.0, 0)` when nobody rated the message.
    /// Unknown messages are `NotFound`.
    pub async fn aggregate_rating(&self, message_id: MessageId) -> Result<RatingSummary> {
        self.message(message_id).await?;
        self.summary(message_id).await
    }

    async fn message(&self, message_id: MessageId) -> Result<MessageItem> {
        self.messages
            .get_message(message_id)
            .await?
            .ok_or_else(|| DomainError::message_not_found(message_id))
    }

    async fn summary(&self, message_id: MessageId) -> Result<RatingSummary> {
        let ratings = self.ratings.ratings_for(message_id).await?;
        Ok(RatingSummary::from_values(ratings.into_iter().map(|r| r.value)))
    }
}
