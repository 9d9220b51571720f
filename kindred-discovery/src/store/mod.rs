//! Storage seam for the discovery service.
//!
//! [`DiscoveryStore`] covers the five stores the engine reads and writes (user
//! directory, interaction log, like ledger, match registry, messages).
//! [`LedgerTx`] is the subset available inside the like transaction, where the
//! like edge, the interaction record and the match must commit or abort together.
//!
//! Two backends implement it: [`PgStore`] (diesel over Postgres) and
//! [`MemoryStore`] (mutex-guarded tables, used by tests and local runs).

pub mod memory;
pub mod postgres;

use uuid::Uuid;

use crate::models::{
    Action, LikeEdge, MatchEdge, MatchPartner, Message, NewMessage, NewUser, ProfileCard,
    UpdateProfile, User,
};
use crate::pair::PairKey;
use crate::services::feed::{Candidate, CandidateQuery};

pub use memory::{MemoryStore, StoreOp};
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint other than the ones the engine absorbs on purpose.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("database error: {0}")]
    Database(diesel::result::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::UniqueViolation(info.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        StoreError::Pool(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Writes and reads that run inside the like transaction.
pub trait LedgerTx {
    /// Insert `liker -> liked`. Returns `false` when the edge already existed.
    fn insert_like(&mut self, liker_id: Uuid, liked_id: Uuid) -> StoreResult<bool>;

    /// Insert or overwrite the viewer's current action toward the target.
    fn upsert_interaction(&mut self, viewer_id: Uuid, target_id: Uuid, action: Action) -> StoreResult<()>;

    fn like_exists(&mut self, liker_id: Uuid, liked_id: Uuid) -> StoreResult<bool>;

    /// Create the match for `pair`. Returns `Ok(None)` when one already exists.
    fn insert_match(&mut self, pair: PairKey) -> StoreResult<Option<MatchEdge>>;

    fn find_match(&mut self, pair: PairKey) -> StoreResult<Option<MatchEdge>>;
}

pub trait DiscoveryStore: Send + Sync {
    /// Run `f` atomically. Transactions on the same `pair` are serialised, in
    /// either direction. An `Err` from `f` rolls back every write it made.
    fn transaction<T, F>(&self, pair: PairKey, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> StoreResult<T>;

    /// Cheap liveness probe for health checks.
    fn ping(&self) -> StoreResult<()>;

    // --- User directory ---

    fn insert_user(&self, user: &NewUser) -> StoreResult<User>;

    fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    fn update_user(&self, id: Uuid, patch: &UpdateProfile) -> StoreResult<Option<User>>;

    fn profile_cards(&self, ids: &[Uuid]) -> StoreResult<Vec<ProfileCard>>;

    fn match_partners(&self, ids: &[Uuid]) -> StoreResult<Vec<MatchPartner>>;

    /// One page of the candidate feed; applies exclusions, the age range and,
    /// when `query.near` is set, the distance cut-off with nearest-first order.
    fn find_candidates(&self, query: &CandidateQuery) -> StoreResult<Vec<Candidate>>;

    // --- Interaction log ---

    fn upsert_interaction(&self, viewer_id: Uuid, target_id: Uuid, action: Action) -> StoreResult<()>;

    /// Every target the viewer has acted on, whatever the action.
    fn seen_targets(&self, viewer_id: Uuid) -> StoreResult<Vec<Uuid>>;

    // --- Like ledger ---

    /// Delete likes in both directions between `a` and `b`.
    fn delete_likes_between(&self, a: Uuid, b: Uuid) -> StoreResult<usize>;

    fn delete_like(&self, liker_id: Uuid, liked_id: Uuid) -> StoreResult<usize>;

    /// Likes pointing at `user_id`, oldest first.
    fn likes_received(&self, user_id: Uuid) -> StoreResult<Vec<LikeEdge>>;

    /// Likes made by `user_id`, oldest first.
    fn likes_sent(&self, user_id: Uuid) -> StoreResult<Vec<LikeEdge>>;

    // --- Match registry ---

    fn find_match(&self, pair: PairKey) -> StoreResult<Option<MatchEdge>>;

    fn delete_match(&self, pair: PairKey) -> StoreResult<Option<MatchEdge>>;

    /// Matches where `user_id` is either side, oldest first.
    fn matches_for(&self, user_id: Uuid) -> StoreResult<Vec<MatchEdge>>;

    /// Matches between `user_id` and any of `others`.
    fn matches_with_any(&self, user_id: Uuid, others: &[Uuid]) -> StoreResult<Vec<MatchEdge>>;

    // --- Messages ---

    fn insert_message(&self, message: &NewMessage) -> StoreResult<Message>;

    fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>>;

    /// Non-deleted messages in both directions, oldest first.
    fn messages_between(&self, a: Uuid, b: Uuid) -> StoreResult<Vec<Message>>;

    /// Replace the text of a non-deleted message and stamp `edited_at`.
    fn edit_message(&self, id: Uuid, text: &str) -> StoreResult<Option<Message>>;

    /// Returns `true` when the flag flipped.
    fn soft_delete_message(&self, id: Uuid) -> StoreResult<bool>;

    /// Hard delete of every message in both directions.
    fn delete_messages_between(&self, a: Uuid, b: Uuid) -> StoreResult<usize>;
}
