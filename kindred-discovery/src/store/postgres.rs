use chrono::Utc;
use diesel::dsl::exists;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::sql_types::{Array, BigInt, Double, Integer, Uuid as SqlUuid};
use uuid::Uuid;

use kindred_shared::clients::db::DbPool;

use super::{DiscoveryStore, LedgerTx, StoreError, StoreResult};
use crate::models::{
    Action, LikeEdge, MatchEdge, MatchPartner, Message, NewInteraction, NewLike, NewMatch,
    NewMessage, NewUser, ProfileCard, UpdateProfile, User,
};
use crate::pair::PairKey;
use crate::schema::{interactions, likes, matches, messages, users};
use crate::services::feed::{BoundingBox, Candidate, CandidateQuery, NearFilter, EARTH_RADIUS_KM};

type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

const CARD_COLUMNS: (
    users::id,
    users::name,
    users::age,
    users::bio,
    users::personality,
    users::tags,
    users::gender,
    users::longitude,
    users::latitude,
    users::profile_picture_url,
) = (
    users::id,
    users::name,
    users::age,
    users::bio,
    users::personality,
    users::tags,
    users::gender,
    users::longitude,
    users::latitude,
    users::profile_picture_url,
);

const PARTNER_COLUMNS: (users::id, users::name, users::profile_picture_url, users::age) =
    (users::id, users::name, users::profile_picture_url, users::age);

/// Diesel-backed store. Calls block; run them off the async executor.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> StoreResult<PgPooled> {
        Ok(self.pool.get()?)
    }
}

fn upsert_interaction(
    conn: &mut PgConnection,
    viewer_id: Uuid,
    target_id: Uuid,
    action: Action,
) -> StoreResult<()> {
    diesel::insert_into(interactions::table)
        .values(&NewInteraction { viewer_id, target_id, action })
        .on_conflict((interactions::viewer_id, interactions::target_id))
        .do_update()
        .set((
            interactions::action.eq(action),
            interactions::created_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

fn find_match(conn: &mut PgConnection, pair: PairKey) -> StoreResult<Option<MatchEdge>> {
    Ok(matches::table
        .filter(matches::user_a.eq(pair.low()))
        .filter(matches::user_b.eq(pair.high()))
        .first::<MatchEdge>(conn)
        .optional()?)
}

/// Haversine in SQL, mirroring `feed::haversine_km`. The bounding box keeps the
/// position index usable; distance cut-off, order and paging happen in Postgres.
const NEAREST_SQL: &str = "\
    SELECT id, name, age, bio, personality, tags, gender, longitude, latitude, \
           profile_picture_url, distance_km \
    FROM ( \
        SELECT id, name, age, bio, personality, tags, gender, longitude, latitude, \
               profile_picture_url, \
               2 * $1 * ASIN(LEAST(1, SQRT( \
                   POWER(SIN(RADIANS(latitude - $2) / 2), 2) \
                   + COS(RADIANS($2)) * COS(RADIANS(latitude)) \
                     * POWER(SIN(RADIANS(longitude - $3) / 2), 2) \
               ))) AS distance_km \
        FROM users \
        WHERE id <> ALL($4) \
          AND age BETWEEN $5 AND $6 \
          AND latitude BETWEEN $7 AND $8 \
          AND longitude BETWEEN $9 AND $10 \
    ) ranked \
    WHERE distance_km <= $11 \
    ORDER BY distance_km, id \
    LIMIT $12 OFFSET $13";

#[derive(QueryableByName)]
struct NearestRow {
    #[diesel(embed)]
    profile: ProfileCard,
    #[diesel(sql_type = Double)]
    distance_km: f64,
}

fn nearest_candidates(
    conn: &mut PgConnection,
    query: &CandidateQuery,
    near: NearFilter,
) -> StoreResult<Vec<Candidate>> {
    let bbox = BoundingBox::around(near.center, near.max_distance_km);
    let rows = diesel::sql_query(NEAREST_SQL)
        .bind::<Double, _>(EARTH_RADIUS_KM)
        .bind::<Double, _>(near.center.latitude)
        .bind::<Double, _>(near.center.longitude)
        .bind::<Array<SqlUuid>, _>(&query.excluded)
        .bind::<Integer, _>(query.min_age)
        .bind::<Integer, _>(query.max_age)
        .bind::<Double, _>(bbox.min_lat)
        .bind::<Double, _>(bbox.max_lat)
        .bind::<Double, _>(bbox.min_lon)
        .bind::<Double, _>(bbox.max_lon)
        .bind::<Double, _>(near.max_distance_km)
        .bind::<BigInt, _>(query.limit)
        .bind::<BigInt, _>(query.offset)
        .load::<NearestRow>(conn)?;

    Ok(rows
        .into_iter()
        .map(|row| Candidate { profile: row.profile, distance_km: Some(row.distance_km) })
        .collect())
}

struct PgTx<'a> {
    conn: &'a mut PgConnection,
}

impl LedgerTx for PgTx<'_> {
    fn insert_like(&mut self, liker_id: Uuid, liked_id: Uuid) -> StoreResult<bool> {
        // ON CONFLICT keeps the transaction usable; a raised unique violation would abort it.
        let inserted = diesel::insert_into(likes::table)
            .values(&NewLike { liker_id, liked_id })
            .on_conflict((likes::liker_id, likes::liked_id))
            .do_nothing()
            .execute(self.conn)?;
        Ok(inserted == 1)
    }

    fn upsert_interaction(&mut self, viewer_id: Uuid, target_id: Uuid, action: Action) -> StoreResult<()> {
        upsert_interaction(self.conn, viewer_id, target_id, action)
    }

    fn like_exists(&mut self, liker_id: Uuid, liked_id: Uuid) -> StoreResult<bool> {
        Ok(diesel::select(exists(
            likes::table
                .filter(likes::liker_id.eq(liker_id))
                .filter(likes::liked_id.eq(liked_id)),
        ))
        .get_result::<bool>(self.conn)?)
    }

    fn insert_match(&mut self, pair: PairKey) -> StoreResult<Option<MatchEdge>> {
        Ok(diesel::insert_into(matches::table)
            .values(&NewMatch { user_a: pair.low(), user_b: pair.high() })
            .on_conflict((matches::user_a, matches::user_b))
            .do_nothing()
            .get_result::<MatchEdge>(self.conn)
            .optional()?)
    }

    fn find_match(&mut self, pair: PairKey) -> StoreResult<Option<MatchEdge>> {
        find_match(self.conn, pair)
    }
}

impl DiscoveryStore for PgStore {
    fn transaction<T, F>(&self, pair: PairKey, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> StoreResult<T>,
    {
        let mut pooled = self.conn()?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<T, StoreError, _>(|conn| {
            // Serialises like(A, B) against like(B, A) until commit, so the second
            // transaction's reverse-like check sees the first one's edge.
            diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
                .bind::<BigInt, _>(pair.lock_key())
                .execute(conn)?;
            f(&mut PgTx { conn })
        })
    }

    fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }

    fn insert_user(&self, user: &NewUser) -> StoreResult<User> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(users::table)
            .values(user)
            .get_result::<User>(&mut conn)?)
    }

    fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table.find(id).first::<User>(&mut conn).optional()?)
    }

    fn update_user(&self, id: Uuid, patch: &UpdateProfile) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(diesel::update(users::table.find(id))
            .set((patch, users::updated_at.eq(Utc::now())))
            .get_result::<User>(&mut conn)
            .optional()?)
    }

    fn profile_cards(&self, ids: &[Uuid]) -> StoreResult<Vec<ProfileCard>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .select(CARD_COLUMNS)
            .filter(users::id.eq_any(ids))
            .load::<ProfileCard>(&mut conn)?)
    }

    fn match_partners(&self, ids: &[Uuid]) -> StoreResult<Vec<MatchPartner>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .select(PARTNER_COLUMNS)
            .filter(users::id.eq_any(ids))
            .load::<MatchPartner>(&mut conn)?)
    }

    fn find_candidates(&self, query: &CandidateQuery) -> StoreResult<Vec<Candidate>> {
        let mut conn = self.conn()?;

        if let Some(near) = query.near {
            return nearest_candidates(&mut conn, query, near);
        }

        let cards = users::table
            .select(CARD_COLUMNS)
            .filter(users::id.ne_all(&query.excluded))
            .filter(users::age.ge(query.min_age))
            .filter(users::age.le(query.max_age))
            .order((users::created_at.asc(), users::id.asc()))
            .offset(query.offset)
            .limit(query.limit)
            .load::<ProfileCard>(&mut conn)?;
        Ok(cards
            .into_iter()
            .map(|profile| Candidate { profile, distance_km: None })
            .collect())
    }

    fn upsert_interaction(&self, viewer_id: Uuid, target_id: Uuid, action: Action) -> StoreResult<()> {
        let mut conn = self.conn()?;
        upsert_interaction(&mut conn, viewer_id, target_id, action)
    }

    fn seen_targets(&self, viewer_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let mut conn = self.conn()?;
        Ok(interactions::table
            .filter(interactions::viewer_id.eq(viewer_id))
            .select(interactions::target_id)
            .load::<Uuid>(&mut conn)?)
    }

    fn delete_likes_between(&self, a: Uuid, b: Uuid) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        Ok(diesel::delete(
            likes::table.filter(
                likes::liker_id
                    .eq(a)
                    .and(likes::liked_id.eq(b))
                    .or(likes::liker_id.eq(b).and(likes::liked_id.eq(a))),
            ),
        )
        .execute(&mut conn)?)
    }

    fn delete_like(&self, liker_id: Uuid, liked_id: Uuid) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        Ok(diesel::delete(
            likes::table
                .filter(likes::liker_id.eq(liker_id))
                .filter(likes::liked_id.eq(liked_id)),
        )
        .execute(&mut conn)?)
    }

    fn likes_received(&self, user_id: Uuid) -> StoreResult<Vec<LikeEdge>> {
        let mut conn = self.conn()?;
        Ok(likes::table
            .filter(likes::liked_id.eq(user_id))
            .order((likes::created_at.asc(), likes::id.asc()))
            .load::<LikeEdge>(&mut conn)?)
    }

    fn likes_sent(&self, user_id: Uuid) -> StoreResult<Vec<LikeEdge>> {
        let mut conn = self.conn()?;
        Ok(likes::table
            .filter(likes::liker_id.eq(user_id))
            .order((likes::created_at.asc(), likes::id.asc()))
            .load::<LikeEdge>(&mut conn)?)
    }

    fn find_match(&self, pair: PairKey) -> StoreResult<Option<MatchEdge>> {
        let mut conn = self.conn()?;
        find_match(&mut conn, pair)
    }

    fn delete_match(&self, pair: PairKey) -> StoreResult<Option<MatchEdge>> {
        let mut conn = self.conn()?;
        Ok(diesel::delete(
            matches::table
                .filter(matches::user_a.eq(pair.low()))
                .filter(matches::user_b.eq(pair.high())),
        )
        .get_result::<MatchEdge>(&mut conn)
        .optional()?)
    }

    fn matches_for(&self, user_id: Uuid) -> StoreResult<Vec<MatchEdge>> {
        let mut conn = self.conn()?;
        Ok(matches::table
            .filter(matches::user_a.eq(user_id).or(matches::user_b.eq(user_id)))
            .order((matches::matched_at.asc(), matches::id.asc()))
            .load::<MatchEdge>(&mut conn)?)
    }

    fn matches_with_any(&self, user_id: Uuid, others: &[Uuid]) -> StoreResult<Vec<MatchEdge>> {
        let mut conn = self.conn()?;
        Ok(matches::table
            .filter(
                matches::user_a
                    .eq(user_id)
                    .and(matches::user_b.eq_any(others))
                    .or(matches::user_b.eq(user_id).and(matches::user_a.eq_any(others))),
            )
            .load::<MatchEdge>(&mut conn)?)
    }

    fn insert_message(&self, message: &NewMessage) -> StoreResult<Message> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(messages::table)
            .values(message)
            .get_result::<Message>(&mut conn)?)
    }

    fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        let mut conn = self.conn()?;
        Ok(messages::table.find(id).first::<Message>(&mut conn).optional()?)
    }

    fn messages_between(&self, a: Uuid, b: Uuid) -> StoreResult<Vec<Message>> {
        let mut conn = self.conn()?;
        Ok(messages::table
            .filter(messages::deleted.eq(false))
            .filter(
                messages::sender_id
                    .eq(a)
                    .and(messages::recipient_id.eq(b))
                    .or(messages::sender_id.eq(b).and(messages::recipient_id.eq(a))),
            )
            .order((messages::created_at.asc(), messages::id.asc()))
            .load::<Message>(&mut conn)?)
    }

    fn edit_message(&self, id: Uuid, text: &str) -> StoreResult<Option<Message>> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            messages::table
                .find(id)
                .filter(messages::deleted.eq(false)),
        )
        .set((
            messages::text.eq(text),
            messages::edited_at.eq(Some(Utc::now())),
        ))
        .get_result::<Message>(&mut conn)
        .optional()?)
    }

    fn soft_delete_message(&self, id: Uuid) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            messages::table
                .find(id)
                .filter(messages::deleted.eq(false)),
        )
        .set(messages::deleted.eq(true))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    fn delete_messages_between(&self, a: Uuid, b: Uuid) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        Ok(diesel::delete(
            messages::table.filter(
                messages::sender_id
                    .eq(a)
                    .and(messages::recipient_id.eq(b))
                    .or(messages::sender_id.eq(b).and(messages::recipient_id.eq(a))),
            ),
        )
        .execute(&mut conn)?)
    }
}

#[cfg(test)]
mod tests {
    use diesel::connection::SimpleConnection;

    use super::*;
    use crate::models::GeoPoint;

    const VIEWER: &str = "00000000-0000-0000-0000-0000000000a1";
    const CLOSE: &str = "00000000-0000-0000-0000-0000000000b1";
    const EDGE: &str = "00000000-0000-0000-0000-0000000000b2";
    const OUTSIDE: &str = "00000000-0000-0000-0000-0000000000b3";

    #[test]
    #[ignore = "requires KINDRED_DISCOVERY_TEST_DATABASE_URL pointing at an empty Postgres database"]
    fn nearest_candidates_are_ranked_and_paged_in_sql() {
        let url = std::env::var("KINDRED_DISCOVERY_TEST_DATABASE_URL").unwrap();
        let mut conn = PgConnection::establish(&url).unwrap();
        conn.begin_test_transaction().unwrap();
        conn.batch_execute(include_str!("../../migrations/2024-05-01-000000_create_discovery/up.sql"))
            .unwrap();
        conn.batch_execute(&format!(
            "INSERT INTO users (id, email, name, age, longitude, latitude) VALUES \
             ('{VIEWER}', 'viewer@kindred.test', 'viewer', 30, 0, 0), \
             ('{CLOSE}', 'close@kindred.test', 'close', 30, 0, 0.1), \
             ('{EDGE}', 'edge@kindred.test', 'edge', 30, 0, 0.4494), \
             ('{OUTSIDE}', 'outside@kindred.test', 'outside', 30, 0, 0.46)"
        ))
        .unwrap();

        let viewer = Uuid::parse_str(VIEWER).unwrap();
        let near = NearFilter { center: GeoPoint::new(0.0, 0.0), max_distance_km: 50.0 };
        let mut query = CandidateQuery {
            viewer_id: viewer,
            excluded: vec![viewer],
            min_age: 18,
            max_age: 99,
            near: Some(near),
            offset: 0,
            limit: 10,
        };

        let page = nearest_candidates(&mut conn, &query, near).unwrap();
        let ids: Vec<String> = page.iter().map(|c| c.profile.id.to_string()).collect();
        assert_eq!(ids, vec![CLOSE, EDGE]);
        assert!(page[1].distance_km.is_some_and(|d| d < 50.0));

        query.offset = 1;
        query.limit = 1;
        let second = nearest_candidates(&mut conn, &query, near).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].profile.id.to_string(), EDGE);
    }
}
