use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::models::{GeoPoint, ProfileCard};
use crate::store::DiscoveryStore;

/// Mean Earth radius shared by the bounding box, [`haversine_km`] and the SQL ranking.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Caller-facing feed filters, defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedFilters {
    pub min_age: i32,
    pub max_age: i32,
    pub position: Option<GeoPoint>,
    pub max_distance_km: f64,
    pub limit: i64,
    pub page: i64,
}

impl Default for FeedFilters {
    fn default() -> Self {
        Self {
            min_age: 18,
            max_age: 99,
            position: None,
            max_distance_km: 50.0,
            limit: 20,
            page: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearFilter {
    pub center: GeoPoint,
    pub max_distance_km: f64,
}

/// Store-level query built from [`FeedFilters`] for one viewer.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub viewer_id: Uuid,
    /// The viewer plus every profile they already acted on.
    pub excluded: Vec<Uuid>,
    pub min_age: i32,
    pub max_age: i32,
    pub near: Option<NearFilter>,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    #[serde(flatten)]
    pub profile: ProfileCard,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

/// Latitude/longitude rectangle enclosing a search circle, used as an index-friendly prefilter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Smallest box containing every point within `radius_km` of `center` on the
    /// sphere of [`haversine_km`]. The longitude span is taken at the tangent point of
    /// the circle, which lies poleward of the centre's parallel.
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let angular = radius_km / EARTH_RADIUS_KM;
        let lat_delta = angular.to_degrees();
        let min_lat = (center.latitude - lat_delta).max(-90.0);
        let max_lat = (center.latitude + lat_delta).min(90.0);

        let spread = angular.sin() / center.latitude.to_radians().cos();
        let lon_delta = if angular >= std::f64::consts::FRAC_PI_2 || !(0.0..1.0).contains(&spread) {
            180.0
        } else {
            spread.asin().to_degrees()
        };

        let touches_pole = min_lat <= -90.0 || max_lat >= 90.0;
        let min_lon = center.longitude - lon_delta;
        let max_lon = center.longitude + lon_delta;

        // Circles touching a pole or crossing the antimeridian fall back to every longitude.
        if touches_pole || lon_delta >= 180.0 || min_lon < -180.0 || max_lon > 180.0 {
            return Self { min_lat, max_lat, min_lon: -180.0, max_lon: 180.0 };
        }

        Self { min_lat, max_lat, min_lon, max_lon }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.latitude)
            && (self.min_lon..=self.max_lon).contains(&point.longitude)
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Drop cards beyond the cut-off, order nearest first (ties by id) and cut one page.
pub fn rank_nearest(
    cards: impl IntoIterator<Item = ProfileCard>,
    near: NearFilter,
    offset: i64,
    limit: i64,
) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> = cards
        .into_iter()
        .filter_map(|profile| {
            let distance = haversine_km(near.center, profile.position());
            (distance <= near.max_distance_km).then_some(Candidate {
                profile,
                distance_km: Some(distance),
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        let (da, db) = (a.distance_km.unwrap_or(f64::MAX), b.distance_km.unwrap_or(f64::MAX));
        da.total_cmp(&db).then_with(|| a.profile.id.cmp(&b.profile.id))
    });

    ranked
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

fn validate(filters: &FeedFilters) -> DiscoveryResult<()> {
    if filters.min_age > filters.max_age {
        return Err(DiscoveryError::Validation("minAge must not exceed maxAge".into()));
    }
    if filters.page < 0 {
        return Err(DiscoveryError::Validation("page must be zero or positive".into()));
    }
    if filters.limit < 1 {
        return Err(DiscoveryError::Validation("limit must be at least 1".into()));
    }
    if !(filters.max_distance_km.is_finite() && filters.max_distance_km > 0.0) {
        return Err(DiscoveryError::Validation("maxDistanceKm must be a positive number".into()));
    }
    if let Some(p) = filters.position {
        if !(-90.0..=90.0).contains(&p.latitude) || !(-180.0..=180.0).contains(&p.longitude) {
            return Err(DiscoveryError::Validation("lat/lon out of range".into()));
        }
    }
    Ok(())
}

/// One page of unseen profiles for `viewer_id`. Read-only.
pub fn fetch_candidates<S: DiscoveryStore>(
    store: &S,
    viewer_id: Uuid,
    filters: &FeedFilters,
    max_limit: i64,
) -> DiscoveryResult<Vec<Candidate>> {
    validate(filters)?;

    if store.find_user(viewer_id)?.is_none() {
        return Err(DiscoveryError::NotFound("viewer profile not found".into()));
    }

    let mut excluded = store.seen_targets(viewer_id)?;
    excluded.push(viewer_id);

    let limit = filters.limit.min(max_limit.max(1));
    let offset = filters
        .page
        .checked_mul(limit)
        .ok_or_else(|| DiscoveryError::Validation("page is too large".into()))?;
    let query = CandidateQuery {
        viewer_id,
        excluded,
        min_age: filters.min_age,
        max_age: filters.max_age,
        near: filters.position.map(|center| NearFilter {
            center,
            max_distance_km: filters.max_distance_km,
        }),
        offset,
        limit,
    };

    let candidates = store.find_candidates(&query)?;
    tracing::debug!(
        viewer_id = %viewer_id,
        excluded = query.excluded.len(),
        returned = candidates.len(),
        "candidate feed built"
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use crate::store::MemoryStore;

    const MANILA: GeoPoint = GeoPoint { longitude: 120.9842, latitude: 14.5995 };

    fn seed(store: &MemoryStore, name: &str, age: i32, at: GeoPoint) -> Uuid {
        store.seed_user(name, Some(age), at).id
    }

    fn ids(candidates: &[Candidate]) -> Vec<Uuid> {
        candidates.iter().map(|c| c.profile.id).collect()
    }

    #[test]
    fn haversine_matches_known_distance() {
        let paris = GeoPoint::new(2.3522, 48.8566);
        let london = GeoPoint::new(-0.1276, 51.5072);
        let d = haversine_km(paris, london);
        assert!((d - 343.5).abs() < 2.0, "got {d}");
        assert_eq!(haversine_km(paris, paris), 0.0);
    }

    #[test]
    fn bounding_box_encloses_the_circle() {
        let bbox = BoundingBox::around(MANILA, 50.0);
        assert!(bbox.contains(MANILA));
        assert!(bbox.contains(GeoPoint::new(MANILA.longitude, MANILA.latitude + 0.44)));
        assert!(!bbox.contains(GeoPoint::new(MANILA.longitude, MANILA.latitude + 0.5)));
    }

    #[test]
    fn bounding_box_covers_points_near_the_edge() {
        let equator = GeoPoint::new(0.0, 0.0);
        let north_edge = GeoPoint::new(0.0, 0.4494);
        assert!(haversine_km(equator, north_edge) < 50.0);
        assert!(BoundingBox::around(equator, 50.0).contains(north_edge));

        // Off the centre's parallel, the circle reaches further east than the parallel arc.
        let sixty = GeoPoint::new(0.0, 60.0);
        let east_edge = GeoPoint::new(0.8990, 60.0018);
        assert!(haversine_km(sixty, east_edge) < 50.0);
        assert!(BoundingBox::around(sixty, 50.0).contains(east_edge));
    }

    #[test]
    fn bounding_box_widens_across_antimeridian_and_poles() {
        let fiji = BoundingBox::around(GeoPoint::new(179.9, -17.7), 50.0);
        assert_eq!((fiji.min_lon, fiji.max_lon), (-180.0, 180.0));

        let pole = BoundingBox::around(GeoPoint::new(0.0, 89.9), 50.0);
        assert_eq!(pole.max_lat, 90.0);
        assert_eq!((pole.min_lon, pole.max_lon), (-180.0, 180.0));
    }

    #[test]
    fn rank_nearest_orders_and_cuts() {
        let near = NearFilter { center: MANILA, max_distance_km: 50.0 };
        let card = |lat_offset: f64| ProfileCard {
            id: Uuid::new_v4(),
            name: format!("{lat_offset}"),
            age: Some(30),
            bio: String::new(),
            personality: String::new(),
            tags: vec![],
            gender: None,
            longitude: MANILA.longitude,
            latitude: MANILA.latitude + lat_offset,
            profile_picture_url: String::new(),
        };

        let far = card(1.0);
        let mid = card(0.2);
        let close = card(0.01);
        let ranked = rank_nearest(vec![far, mid.clone(), close.clone()], near, 0, 10);
        assert_eq!(ranked.iter().map(|c| c.profile.id).collect::<Vec<_>>(), vec![close.id, mid.id]);

        let second_page = rank_nearest(vec![mid.clone(), close], near, 1, 1);
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].profile.id, mid.id);
    }

    #[test]
    fn feed_excludes_viewer_and_seen_profiles() {
        let store = MemoryStore::new();
        let viewer = seed(&store, "viewer", 30, MANILA);
        let liked = seed(&store, "liked", 30, MANILA);
        let skipped = seed(&store, "skipped", 30, MANILA);
        let viewed = seed(&store, "viewed", 30, MANILA);
        let fresh = seed(&store, "fresh", 30, MANILA);

        store.upsert_interaction(viewer, liked, Action::Like).unwrap();
        store.upsert_interaction(viewer, skipped, Action::Skip).unwrap();
        store.upsert_interaction(viewer, viewed, Action::View).unwrap();

        let filters = FeedFilters { position: Some(MANILA), ..FeedFilters::default() };
        let feed = fetch_candidates(&store, viewer, &filters, 50).unwrap();
        assert_eq!(ids(&feed), vec![fresh]);

        let unfiltered = fetch_candidates(&store, viewer, &FeedFilters::default(), 50).unwrap();
        assert_eq!(ids(&unfiltered), vec![fresh]);
    }

    #[test]
    fn feed_applies_age_range_and_distance() {
        let store = MemoryStore::new();
        let viewer = seed(&store, "viewer", 30, MANILA);
        let young = seed(&store, "young", 19, MANILA);
        let in_range = seed(&store, "in-range", 25, GeoPoint::new(MANILA.longitude, MANILA.latitude + 0.1));
        let far_away = seed(&store, "far", 25, GeoPoint::new(MANILA.longitude, MANILA.latitude + 2.0));
        let nearest = seed(&store, "nearest", 28, MANILA);
        store.seed_user("ageless", None, MANILA);

        let filters = FeedFilters {
            min_age: 21,
            max_age: 35,
            position: Some(MANILA),
            ..FeedFilters::default()
        };
        let feed = fetch_candidates(&store, viewer, &filters, 50).unwrap();
        assert_eq!(ids(&feed), vec![nearest, in_range]);
        assert!(feed.iter().all(|c| c.distance_km.is_some()));
        assert!(!ids(&feed).contains(&young));
        assert!(!ids(&feed).contains(&far_away));
    }

    #[test]
    fn feed_pages_with_clamped_limit() {
        let store = MemoryStore::new();
        let viewer = seed(&store, "viewer", 30, MANILA);
        for i in 0..5 {
            seed(&store, &format!("u{i}"), 30, MANILA);
        }

        let filters = FeedFilters { limit: 100, ..FeedFilters::default() };
        assert_eq!(fetch_candidates(&store, viewer, &filters, 3).unwrap().len(), 3);

        let page_one = FeedFilters { limit: 3, page: 1, ..FeedFilters::default() };
        assert_eq!(fetch_candidates(&store, viewer, &page_one, 50).unwrap().len(), 2);
    }

    #[test]
    fn feed_keeps_profiles_just_inside_the_radius() {
        let store = MemoryStore::new();
        let origin = GeoPoint::new(0.0, 0.0);
        let viewer = seed(&store, "viewer", 30, origin);
        let edge = seed(&store, "edge", 30, GeoPoint::new(0.0, 0.4494));

        let filters = FeedFilters { position: Some(origin), ..FeedFilters::default() };
        let feed = fetch_candidates(&store, viewer, &filters, 50).unwrap();
        assert_eq!(ids(&feed), vec![edge]);
        assert!(feed[0].distance_km.is_some_and(|d| d < 50.0));
    }

    #[test]
    fn feed_rejects_page_past_the_offset_range() {
        let store = MemoryStore::new();
        let viewer = seed(&store, "viewer", 30, MANILA);

        let filters = FeedFilters { page: i64::MAX, ..FeedFilters::default() };
        let err = fetch_candidates(&store, viewer, &filters, 50).unwrap_err();
        assert!(matches!(err, DiscoveryError::Validation(_)));
    }

    #[test]
    fn feed_rejects_unknown_viewer_and_bad_filters() {
        let store = MemoryStore::new();
        let err = fetch_candidates(&store, Uuid::new_v4(), &FeedFilters::default(), 50).unwrap_err();
        assert!(matches!(err, DiscoveryError::NotFound(_)));

        let viewer = seed(&store, "viewer", 30, MANILA);
        let inverted = FeedFilters { min_age: 40, max_age: 20, ..FeedFilters::default() };
        let err = fetch_candidates(&store, viewer, &inverted, 50).unwrap_err();
        assert!(matches!(err, DiscoveryError::Validation(_)));
    }
}
