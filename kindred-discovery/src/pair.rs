use uuid::Uuid;

/// Unordered pair of users in canonical order: `low < high`.
///
/// `Uuid` ordering is byte order, which matches both the lexicographic order of
/// the hyphenated lower-case string form and Postgres' `uuid` comparison, so the
/// `matches_canonical_order` check constraint agrees with this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    low: Uuid,
    high: Uuid,
}

impl PairKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(&self) -> Uuid {
        self.low
    }

    pub fn high(&self) -> Uuid {
        self.high
    }

    /// Key for `pg_advisory_xact_lock`. Equal for both directions of the pair;
    /// collisions only serialise unrelated pairs.
    pub fn lock_key(&self) -> i64 {
        let folded = self.low.as_u128() ^ self.high.as_u128().rotate_left(64);
        ((folded >> 64) as u64 ^ folded as u64) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_does_not_depend_on_direction() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
        assert_eq!(PairKey::new(a, b).lock_key(), PairKey::new(b, a).lock_key());
    }

    #[test]
    fn low_is_lexicographically_smaller() {
        let a = Uuid::parse_str("0f000000-0000-0000-0000-000000000000").unwrap();
        let b = Uuid::parse_str("a0000000-0000-0000-0000-000000000000").unwrap();

        let pair = PairKey::new(b, a);
        assert_eq!(pair.low(), a);
        assert_eq!(pair.high(), b);
        assert!(pair.low().to_string() < pair.high().to_string());
    }
}
