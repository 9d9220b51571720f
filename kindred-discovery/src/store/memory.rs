//! In-memory discovery store for tests and ephemeral use.
//!
//! [`MemoryStore`] keeps every table in a `Vec` behind one `Mutex`. Transactions
//! run against a copy of the tables that replaces the original only when the
//! closure returns `Ok`, so an error rolls back every write it made. Holding the
//! lock for the whole closure serialises transactions, which gives the same
//! per-pair ordering as the advisory lock in [`super::PgStore`].
//!
//! [`MemoryStore::fail_on`] arms a one-shot failure for a given operation, so
//! tests can exercise rollback and partial-completion paths.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use super::{DiscoveryStore, LedgerTx, StoreError, StoreResult};
use crate::models::{
    Action, GeoPoint, InteractionRecord, LikeEdge, MatchEdge, MatchPartner, Message, NewMessage,
    NewUser, ProfileCard, UpdateProfile, User,
};
use crate::pair::PairKey;
use crate::services::feed::{rank_nearest, BoundingBox, Candidate, CandidateQuery};

/// Operations that can be made to fail with [`MemoryStore::fail_on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    InsertLike,
    UpsertInteraction,
    LikeExists,
    InsertMatch,
    DeleteLikes,
    DeleteMatch,
    DeleteMessages,
}

#[derive(Debug, Default, Clone)]
struct Tables {
    users: Vec<User>,
    interactions: Vec<InteractionRecord>,
    likes: Vec<LikeEdge>,
    matches: Vec<MatchEdge>,
    messages: Vec<Message>,
}

impl Tables {
    fn upsert_interaction(&mut self, viewer_id: Uuid, target_id: Uuid, action: Action) {
        let now = Utc::now();
        match self
            .interactions
            .iter_mut()
            .find(|r| r.viewer_id == viewer_id && r.target_id == target_id)
        {
            Some(existing) => {
                existing.action = action;
                existing.created_at = now;
            }
            None => self.interactions.push(InteractionRecord {
                id: Uuid::now_v7(),
                viewer_id,
                target_id,
                action,
                created_at: now,
            }),
        }
    }

    fn like_exists(&self, liker_id: Uuid, liked_id: Uuid) -> bool {
        self.likes.iter().any(|l| l.liker_id == liker_id && l.liked_id == liked_id)
    }

    fn find_match(&self, pair: PairKey) -> Option<&MatchEdge> {
        self.matches
            .iter()
            .find(|m| m.user_a == pair.low() && m.user_b == pair.high())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    faults: Mutex<Vec<StoreOp>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with [`StoreError::Unavailable`].
    pub fn fail_on(&self, op: StoreOp) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(op);
        }
    }

    /// Insert a user with a generated email; handy for tests and local seeding.
    pub fn seed_user(&self, name: &str, age: Option<i32>, position: GeoPoint) -> User {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let user = User {
            id,
            email: format!("{id}@kindred.test"),
            name: name.to_string(),
            password_hash: String::new(),
            age,
            bio: String::new(),
            personality: String::new(),
            motivation: String::new(),
            frustration: String::new(),
            tags: Vec::new(),
            gender: None,
            longitude: position.longitude,
            latitude: position.latitude,
            profile_picture_url: String::new(),
            profile_picture_public_id: String::new(),
            created_at: now,
            updated_at: now,
        };
        if let Ok(mut tables) = self.tables.lock() {
            tables.users.push(user.clone());
        }
        user
    }

    /// Current interaction record for `(viewer, target)`.
    pub fn interaction(&self, viewer_id: Uuid, target_id: Uuid) -> Option<InteractionRecord> {
        let tables = self.tables.lock().ok()?;
        tables
            .interactions
            .iter()
            .find(|r| r.viewer_id == viewer_id && r.target_id == target_id)
            .cloned()
    }

    pub fn has_like(&self, liker_id: Uuid, liked_id: Uuid) -> bool {
        self.tables
            .lock()
            .map(|t| t.like_exists(liker_id, liked_id))
            .unwrap_or(false)
    }

    pub fn like_count(&self) -> usize {
        self.tables.lock().map(|t| t.likes.len()).unwrap_or(0)
    }

    pub fn match_count(&self) -> usize {
        self.tables.lock().map(|t| t.matches.len()).unwrap_or(0)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn check(&self, op: StoreOp) -> StoreResult<()> {
        trip(&self.faults, op)
    }
}

fn trip(faults: &Mutex<Vec<StoreOp>>, op: StoreOp) -> StoreResult<()> {
    let mut faults = faults
        .lock()
        .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
    match faults.iter().position(|armed| *armed == op) {
        Some(idx) => {
            faults.remove(idx);
            Err(StoreError::Unavailable(format!("{op:?} failed")))
        }
        None => Ok(()),
    }
}

struct MemoryTx<'a> {
    tables: &'a mut Tables,
    faults: &'a Mutex<Vec<StoreOp>>,
}

impl LedgerTx for MemoryTx<'_> {
    fn insert_like(&mut self, liker_id: Uuid, liked_id: Uuid) -> StoreResult<bool> {
        trip(self.faults, StoreOp::InsertLike)?;
        if self.tables.like_exists(liker_id, liked_id) {
            return Ok(false);
        }
        self.tables.likes.push(LikeEdge {
            id: Uuid::now_v7(),
            liker_id,
            liked_id,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    fn upsert_interaction(&mut self, viewer_id: Uuid, target_id: Uuid, action: Action) -> StoreResult<()> {
        trip(self.faults, StoreOp::UpsertInteraction)?;
        self.tables.upsert_interaction(viewer_id, target_id, action);
        Ok(())
    }

    fn like_exists(&mut self, liker_id: Uuid, liked_id: Uuid) -> StoreResult<bool> {
        trip(self.faults, StoreOp::LikeExists)?;
        Ok(self.tables.like_exists(liker_id, liked_id))
    }

    fn insert_match(&mut self, pair: PairKey) -> StoreResult<Option<MatchEdge>> {
        trip(self.faults, StoreOp::InsertMatch)?;
        if self.tables.find_match(pair).is_some() {
            return Ok(None);
        }
        let edge = MatchEdge {
            id: Uuid::now_v7(),
            user_a: pair.low(),
            user_b: pair.high(),
            matched_at: Utc::now(),
        };
        self.tables.matches.push(edge.clone());
        Ok(Some(edge))
    }

    fn find_match(&mut self, pair: PairKey) -> StoreResult<Option<MatchEdge>> {
        Ok(self.tables.find_match(pair).cloned())
    }
}

impl DiscoveryStore for MemoryStore {
    fn transaction<T, F>(&self, _pair: PairKey, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> StoreResult<T>,
    {
        let mut tables = self.lock()?;
        let mut working = tables.clone();
        let result = f(&mut MemoryTx { tables: &mut working, faults: &self.faults })?;
        *tables = working;
        Ok(result)
    }

    fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }

    fn insert_user(&self, new_user: &NewUser) -> StoreResult<User> {
        let mut tables = self.lock()?;
        let email = new_user.email.to_lowercase();
        if tables.users.iter().any(|u| u.email.to_lowercase() == email) {
            return Err(StoreError::UniqueViolation("users_email_lower_idx".into()));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            email: new_user.email.clone(),
            name: new_user.name.clone(),
            password_hash: new_user.password_hash.clone(),
            age: None,
            bio: String::new(),
            personality: String::new(),
            motivation: String::new(),
            frustration: String::new(),
            tags: Vec::new(),
            gender: None,
            longitude: 0.0,
            latitude: 0.0,
            profile_picture_url: String::new(),
            profile_picture_public_id: String::new(),
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.lock()?.users.iter().find(|u| u.id == id).cloned())
    }

    fn update_user(&self, id: Uuid, patch: &UpdateProfile) -> StoreResult<Option<User>> {
        let mut tables = self.lock()?;
        let Some(user) = tables.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };

        if let Some(name) = &patch.name {
            user.name = name.clone();
        }
        if let Some(age) = patch.age {
            user.age = Some(age);
        }
        if let Some(bio) = &patch.bio {
            user.bio = bio.clone();
        }
        if let Some(personality) = &patch.personality {
            user.personality = personality.clone();
        }
        if let Some(motivation) = &patch.motivation {
            user.motivation = motivation.clone();
        }
        if let Some(frustration) = &patch.frustration {
            user.frustration = frustration.clone();
        }
        if let Some(tags) = &patch.tags {
            user.tags = tags.clone();
        }
        if let Some(gender) = patch.gender {
            user.gender = Some(gender);
        }
        if let Some(longitude) = patch.longitude {
            user.longitude = longitude;
        }
        if let Some(latitude) = patch.latitude {
            user.latitude = latitude;
        }
        if let Some(url) = &patch.profile_picture_url {
            user.profile_picture_url = url.clone();
        }
        if let Some(public_id) = &patch.profile_picture_public_id {
            user.profile_picture_public_id = public_id.clone();
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    fn profile_cards(&self, ids: &[Uuid]) -> StoreResult<Vec<ProfileCard>> {
        let tables = self.lock()?;
        Ok(tables
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .map(ProfileCard::from)
            .collect())
    }

    fn match_partners(&self, ids: &[Uuid]) -> StoreResult<Vec<MatchPartner>> {
        let tables = self.lock()?;
        Ok(tables
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .map(MatchPartner::from)
            .collect())
    }

    fn find_candidates(&self, query: &CandidateQuery) -> StoreResult<Vec<Candidate>> {
        let tables = self.lock()?;
        let eligible = tables.users.iter().filter(|u| {
            !query.excluded.contains(&u.id)
                && matches!(u.age, Some(age) if age >= query.min_age && age <= query.max_age)
        });

        let candidates = match query.near {
            Some(near) => {
                let bbox = BoundingBox::around(near.center, near.max_distance_km);
                let cards = eligible
                    .filter(|u| bbox.contains(u.position()))
                    .map(ProfileCard::from);
                rank_nearest(cards, near, query.offset, query.limit)
            }
            None => eligible
                .skip(query.offset.max(0) as usize)
                .take(query.limit.max(0) as usize)
                .map(|u| Candidate { profile: ProfileCard::from(u), distance_km: None })
                .collect(),
        };
        Ok(candidates)
    }

    fn upsert_interaction(&self, viewer_id: Uuid, target_id: Uuid, action: Action) -> StoreResult<()> {
        self.check(StoreOp::UpsertInteraction)?;
        self.lock()?.upsert_interaction(viewer_id, target_id, action);
        Ok(())
    }

    fn seen_targets(&self, viewer_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let tables = self.lock()?;
        Ok(tables
            .interactions
            .iter()
            .filter(|r| r.viewer_id == viewer_id)
            .map(|r| r.target_id)
            .collect())
    }

    fn delete_likes_between(&self, a: Uuid, b: Uuid) -> StoreResult<usize> {
        self.check(StoreOp::DeleteLikes)?;
        let mut tables = self.lock()?;
        let before = tables.likes.len();
        tables.likes.retain(|l| {
            !((l.liker_id == a && l.liked_id == b) || (l.liker_id == b && l.liked_id == a))
        });
        Ok(before - tables.likes.len())
    }

    fn delete_like(&self, liker_id: Uuid, liked_id: Uuid) -> StoreResult<usize> {
        self.check(StoreOp::DeleteLikes)?;
        let mut tables = self.lock()?;
        let before = tables.likes.len();
        tables
            .likes
            .retain(|l| !(l.liker_id == liker_id && l.liked_id == liked_id));
        Ok(before - tables.likes.len())
    }

    fn likes_received(&self, user_id: Uuid) -> StoreResult<Vec<LikeEdge>> {
        let tables = self.lock()?;
        Ok(tables.likes.iter().filter(|l| l.liked_id == user_id).cloned().collect())
    }

    fn likes_sent(&self, user_id: Uuid) -> StoreResult<Vec<LikeEdge>> {
        let tables = self.lock()?;
        Ok(tables.likes.iter().filter(|l| l.liker_id == user_id).cloned().collect())
    }

    fn find_match(&self, pair: PairKey) -> StoreResult<Option<MatchEdge>> {
        Ok(self.lock()?.find_match(pair).cloned())
    }

    fn delete_match(&self, pair: PairKey) -> StoreResult<Option<MatchEdge>> {
        self.check(StoreOp::DeleteMatch)?;
        let mut tables = self.lock()?;
        let idx = tables
            .matches
            .iter()
            .position(|m| m.user_a == pair.low() && m.user_b == pair.high());
        Ok(idx.map(|i| tables.matches.remove(i)))
    }

    fn matches_for(&self, user_id: Uuid) -> StoreResult<Vec<MatchEdge>> {
        let tables = self.lock()?;
        Ok(tables
            .matches
            .iter()
            .filter(|m| m.user_a == user_id || m.user_b == user_id)
            .cloned()
            .collect())
    }

    fn matches_with_any(&self, user_id: Uuid, others: &[Uuid]) -> StoreResult<Vec<MatchEdge>> {
        let tables = self.lock()?;
        Ok(tables
            .matches
            .iter()
            .filter(|m| m.partner_of(user_id).is_some_and(|p| others.contains(&p)))
            .cloned()
            .collect())
    }

    fn insert_message(&self, message: &NewMessage) -> StoreResult<Message> {
        let mut tables = self.lock()?;
        let stored = Message {
            id: Uuid::now_v7(),
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            text: message.text.clone(),
            created_at: Utc::now(),
            edited_at: None,
            deleted: false,
        };
        tables.messages.push(stored.clone());
        Ok(stored)
    }

    fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        Ok(self.lock()?.messages.iter().find(|m| m.id == id).cloned())
    }

    fn messages_between(&self, a: Uuid, b: Uuid) -> StoreResult<Vec<Message>> {
        let tables = self.lock()?;
        let mut thread: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| !m.deleted)
            .filter(|m| {
                (m.sender_id == a && m.recipient_id == b) || (m.sender_id == b && m.recipient_id == a)
            })
            .cloned()
            .collect();
        thread.sort_by_key(|m| m.created_at);
        Ok(thread)
    }

    fn edit_message(&self, id: Uuid, text: &str) -> StoreResult<Option<Message>> {
        let mut tables = self.lock()?;
        let Some(message) = tables.messages.iter_mut().find(|m| m.id == id && !m.deleted) else {
            return Ok(None);
        };
        message.text = text.to_string();
        message.edited_at = Some(Utc::now());
        Ok(Some(message.clone()))
    }

    fn soft_delete_message(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        match tables.messages.iter_mut().find(|m| m.id == id && !m.deleted) {
            Some(message) => {
                message.deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_messages_between(&self, a: Uuid, b: Uuid) -> StoreResult<usize> {
        self.check(StoreOp::DeleteMessages)?;
        let mut tables = self.lock()?;
        let before = tables.messages.len();
        tables.messages.retain(|m| {
            !((m.sender_id == a && m.recipient_id == b) || (m.sender_id == b && m.recipient_id == a))
        });
        Ok(before - tables.messages.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> GeoPoint {
        GeoPoint::new(0.0, 0.0)
    }

    #[test]
    fn failed_transaction_leaves_tables_untouched() {
        let store = MemoryStore::new();
        let a = store.seed_user("a", Some(30), origin()).id;
        let b = store.seed_user("b", Some(30), origin()).id;

        let result: StoreResult<()> = store.transaction(PairKey::new(a, b), |tx| {
            tx.insert_like(a, b)?;
            tx.upsert_interaction(a, b, Action::Like)?;
            Err(StoreError::Unavailable("boom".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.like_count(), 0);
        assert!(store.interaction(a, b).is_none());
    }

    #[test]
    fn duplicate_like_and_match_report_existing() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let pair = PairKey::new(a, b);

        let (first, second, created, again) = store
            .transaction(pair, |tx| {
                Ok((
                    tx.insert_like(a, b)?,
                    tx.insert_like(a, b)?,
                    tx.insert_match(pair)?,
                    tx.insert_match(pair)?,
                ))
            })
            .unwrap();

        assert!(first);
        assert!(!second);
        assert!(created.is_some());
        assert!(again.is_none());
        assert_eq!(store.like_count(), 1);
        assert_eq!(store.match_count(), 1);
    }

    #[test]
    fn armed_fault_fires_once() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        store.fail_on(StoreOp::UpsertInteraction);

        assert!(matches!(
            store.upsert_interaction(a, b, Action::View),
            Err(StoreError::Unavailable(_))
        ));
        store.upsert_interaction(a, b, Action::View).unwrap();
        assert_eq!(store.interaction(a, b).map(|r| r.action), Some(Action::View));
    }

    #[test]
    fn interaction_upsert_overwrites() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());

        store.upsert_interaction(a, b, Action::Like).unwrap();
        store.upsert_interaction(a, b, Action::Skip).unwrap();

        assert_eq!(store.seen_targets(a).unwrap(), vec![b]);
        assert_eq!(store.interaction(a, b).map(|r| r.action), Some(Action::Skip));
    }

    #[test]
    fn email_uniqueness_ignores_case() {
        let store = MemoryStore::new();
        let new_user = |email: &str| NewUser {
            email: email.into(),
            name: "x".into(),
            password_hash: String::new(),
        };

        store.insert_user(&new_user("ana@example.com")).unwrap();
        let err = store.insert_user(&new_user("ANA@example.com")).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }
}
