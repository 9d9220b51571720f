//! Like, skip, view, decline and unmatch protocols, plus the match and like listings.
//!
//! Only [`like`] needs a transaction: its like edge, interaction record and match
//! are written through [`LedgerTx`] and commit or abort together. Skip and unmatch
//! are sequences of independent writes; when a later step fails, the earlier ones
//! stay committed and the caller gets [`DiscoveryError::PartialCompletion`].

use std::collections::HashSet;

use metrics::counter;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::models::{Action, MatchEdge, MatchPartner, ProfileCard};
use crate::pair::PairKey;
use crate::store::{DiscoveryStore, LedgerTx, StoreResult};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LikeOutcome {
    pub matched: bool,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_edge: Option<MatchEdge>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UnmatchOutcome {
    pub removed_match: bool,
    pub deleted_messages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeclineOutcome {
    pub deleted_count: usize,
}

/// A match paired with the other side's profile. `partner` is `None` when that
/// profile no longer exists.
#[derive(Debug, Clone, Serialize)]
pub struct MatchListing {
    #[serde(rename = "match")]
    pub match_edge: MatchEdge,
    pub partner: Option<MatchPartner>,
}

/// Maps a failed step to `Storage` when nothing was written yet, `PartialCompletion` otherwise.
fn step<T>(operation: &'static str, completed_steps: usize, result: StoreResult<T>) -> DiscoveryResult<T> {
    result.map_err(|source| {
        if completed_steps == 0 {
            DiscoveryError::Storage(source)
        } else {
            DiscoveryError::PartialCompletion { operation, completed_steps, source }
        }
    })
}

fn ensure_other<S: DiscoveryStore>(store: &S, actor_id: Uuid, target_id: Uuid, verb: &str) -> DiscoveryResult<()> {
    if actor_id == target_id {
        return Err(DiscoveryError::InvalidOperation(format!("cannot {verb} yourself")));
    }
    if store.find_user(target_id)?.is_none() {
        return Err(DiscoveryError::NotFound("target profile not found".into()));
    }
    Ok(())
}

/// Record a like and create the match when the like is mutual.
///
/// Repeating a like is harmless: the edge is kept once and the outcome reflects
/// the current match state.
pub fn like<S: DiscoveryStore>(store: &S, liker_id: Uuid, liked_id: Uuid) -> DiscoveryResult<LikeOutcome> {
    ensure_other(store, liker_id, liked_id, "like")?;
    let pair = PairKey::new(liker_id, liked_id);

    let (created, outcome) = store.transaction(pair, |tx: &mut dyn LedgerTx| {
        tx.insert_like(liker_id, liked_id)?;
        tx.upsert_interaction(liker_id, liked_id, Action::Like)?;

        if !tx.like_exists(liked_id, liker_id)? {
            return Ok((false, LikeOutcome { matched: false, match_edge: None }));
        }

        match tx.insert_match(pair)? {
            Some(edge) => Ok((true, LikeOutcome { matched: true, match_edge: Some(edge) })),
            None => {
                let existing = tx.find_match(pair)?;
                Ok((false, LikeOutcome { matched: existing.is_some(), match_edge: existing }))
            }
        }
    })?;

    counter!("discovery_likes_total").increment(1);

    match (&outcome.match_edge, created) {
        (Some(edge), true) => {
            counter!("discovery_matches_created_total").increment(1);
            tracing::info!(match_id = %edge.id, user_a = %edge.user_a, user_b = %edge.user_b, "match created");
        }
        (Some(edge), false) => {
            counter!("discovery_match_races_total").increment(1);
            tracing::info!(match_id = %edge.id, liker_id = %liker_id, "match already existed");
        }
        (None, _) => {
            tracing::debug!(liker_id = %liker_id, liked_id = %liked_id, "like recorded");
        }
    }

    Ok(outcome)
}

/// Mark the target as skipped and reset the relationship: likes in both
/// directions and any match between the two are removed.
pub fn skip<S: DiscoveryStore>(store: &S, viewer_id: Uuid, target_id: Uuid) -> DiscoveryResult<()> {
    const OP: &str = "skip";
    ensure_other(store, viewer_id, target_id, "skip")?;

    step(OP, 0, store.upsert_interaction(viewer_id, target_id, Action::Skip))?;
    let likes_removed = step(OP, 1, store.delete_likes_between(viewer_id, target_id))?;
    let match_removed = step(OP, 2, store.delete_match(PairKey::new(viewer_id, target_id)))?;

    counter!("discovery_skips_total").increment(1);
    if let Some(edge) = match_removed {
        counter!("discovery_unmatches_total").increment(1);
        tracing::info!(match_id = %edge.id, viewer_id = %viewer_id, "match dissolved by skip");
    }
    tracing::debug!(viewer_id = %viewer_id, target_id = %target_id, likes_removed, "skip recorded");
    Ok(())
}

pub fn record_view<S: DiscoveryStore>(store: &S, viewer_id: Uuid, target_id: Uuid) -> DiscoveryResult<()> {
    ensure_other(store, viewer_id, target_id, "view")?;
    store.upsert_interaction(viewer_id, target_id, Action::View)?;
    tracing::debug!(viewer_id = %viewer_id, target_id = %target_id, "view recorded");
    Ok(())
}

/// Remove the like `liker_id -> user_id`. Interaction records and matches are left alone.
pub fn decline_like<S: DiscoveryStore>(store: &S, user_id: Uuid, liker_id: Uuid) -> DiscoveryResult<DeclineOutcome> {
    let deleted_count = store.delete_like(liker_id, user_id)?;
    tracing::debug!(user_id = %user_id, liker_id = %liker_id, deleted_count, "like declined");
    Ok(DeclineOutcome { deleted_count })
}

/// Remove the match and every message between the pair. Likes and interaction
/// records survive, so either user may like the other again.
pub fn unmatch<S: DiscoveryStore>(store: &S, user_id: Uuid, partner_id: Uuid) -> DiscoveryResult<UnmatchOutcome> {
    const OP: &str = "unmatch";
    if user_id == partner_id {
        return Err(DiscoveryError::InvalidOperation("cannot unmatch yourself".into()));
    }

    let removed = step(OP, 0, store.delete_match(PairKey::new(user_id, partner_id)))?;
    let deleted_messages = step(OP, 1, store.delete_messages_between(user_id, partner_id))?;

    if let Some(edge) = &removed {
        counter!("discovery_unmatches_total").increment(1);
        tracing::info!(match_id = %edge.id, user_id = %user_id, deleted_messages, "unmatched");
    }

    Ok(UnmatchOutcome { removed_match: removed.is_some(), deleted_messages })
}

pub fn is_matched<S: DiscoveryStore>(store: &S, user_id: Uuid, partner_id: Uuid) -> DiscoveryResult<bool> {
    if user_id == partner_id {
        return Ok(false);
    }
    Ok(store.find_match(PairKey::new(user_id, partner_id))?.is_some())
}

pub fn list_matches<S: DiscoveryStore>(store: &S, user_id: Uuid) -> DiscoveryResult<Vec<MatchListing>> {
    let edges = store.matches_for(user_id)?;
    if edges.is_empty() {
        return Ok(Vec::new());
    }

    let partner_ids: Vec<Uuid> = edges.iter().filter_map(|m| m.partner_of(user_id)).collect();
    let partners = store.match_partners(&partner_ids)?;

    Ok(edges
        .into_iter()
        .map(|edge| {
            let partner = edge
                .partner_of(user_id)
                .and_then(|id| partners.iter().find(|p| p.id == id).cloned());
            MatchListing { match_edge: edge, partner }
        })
        .collect())
}

/// Keep only the first occurrence of each id.
fn unique_ordered(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Profiles for `ids` in the order given. Ids without a profile are dropped.
fn cards_in_order<S: DiscoveryStore>(store: &S, ids: &[Uuid]) -> DiscoveryResult<Vec<ProfileCard>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut cards = store.profile_cards(ids)?;
    let mut ordered = Vec::with_capacity(cards.len());
    for id in ids {
        if let Some(idx) = cards.iter().position(|c| c.id == *id) {
            ordered.push(cards.swap_remove(idx));
        }
    }
    Ok(ordered)
}

/// People who liked `user_id` and are not matched with them yet, oldest like first.
pub fn received_likes<S: DiscoveryStore>(store: &S, user_id: Uuid) -> DiscoveryResult<Vec<ProfileCard>> {
    let likers = unique_ordered(store.likes_received(user_id)?.into_iter().map(|l| l.liker_id));
    if likers.is_empty() {
        return Ok(Vec::new());
    }

    let matched: HashSet<Uuid> = store
        .matches_with_any(user_id, &likers)?
        .iter()
        .filter_map(|m| m.partner_of(user_id))
        .collect();

    let pending: Vec<Uuid> = likers.into_iter().filter(|id| !matched.contains(id)).collect();
    cards_in_order(store, &pending)
}

/// Profiles `user_id` has liked, oldest like first.
pub fn sent_likes<S: DiscoveryStore>(store: &S, user_id: Uuid) -> DiscoveryResult<Vec<ProfileCard>> {
    let liked = unique_ordered(store.likes_sent(user_id)?.into_iter().map(|l| l.liked_id));
    cards_in_order(store, &liked)
}
