//! Feedback mapping and aggregation
//!
//! Reaction symbols map through a fixed table; anything outside the
//! table produces no feedback row. Rates are computed on read over the
//! full append-only history.

use crate::store::{FeedbackRating, Store, StoreError};

/// Fixed mapping of reaction symbols to ratings. Symbols absent from
/// this table are ignored, not an error.
const REACTION_TABLE: &[(&str, FeedbackRating)] = &[
    ("+1", FeedbackRating::Helpful),
    ("thumbsup", FeedbackRating::Helpful),
    ("white_check_mark", FeedbackRating::Helpful),
    ("heavy_check_mark", FeedbackRating::Helpful),
    ("-1", FeedbackRating::NotHelpful),
    ("thumbsdown", FeedbackRating::NotHelpful),
    ("x", FeedbackRating::NotHelpful),
];

/// Map a reaction symbol to a rating, if it carries one
pub fn rating_for_reaction(symbol: &str) -> Option<FeedbackRating> {
    REACTION_TABLE
        .iter()
        .find(|(name, _)| *name == symbol)
        .map(|(_, rating)| *rating)
}

/// Helpful percentage over (helpful, total) counts. Defined as 0 when
/// there are no ratings.
pub fn helpful_rate(helpful: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (helpful as f64 / total as f64) * 100.0
}

/// Helpful rate for one conversation
pub fn conversation_helpful_rate(store: &Store, conversation_id: &str) -> Result<f64, StoreError> {
    let (helpful, total) = store.feedback_counts_for_conversation(conversation_id)?;
    Ok(helpful_rate(helpful, total))
}

/// Helpful rate across a channel
pub fn channel_helpful_rate(store: &Store, channel_id: &str) -> Result<f64, StoreError> {
    let (helpful, total) = store.feedback_counts_for_channel(channel_id)?;
    Ok(helpful_rate(helpful, total))
}
