//! Cache keys
//!
//! A [`CacheKey`] is an ordered list of components plus a running,
//! order-sensitive hash. Two keys are equal only when every component matches
//! in the same position; the hash is a fast pre-check, never a substitute.

use sqlweave_types::Value;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

const DEFAULT_MULTIPLIER: u64 = 37;
const DEFAULT_HASHCODE: u64 = 17;

#[derive(Debug, Clone)]
pub struct CacheKey {
    multiplier: u64,
    hashcode: u64,
    checksum: u64,
    count: usize,
    parts: Vec<Value>,
}

impl CacheKey {
    pub fn new() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            count: 0,
            parts: Vec::new(),
        }
    }

    /// Build a key from components in order
    pub fn from_parts<I, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut key = Self::new();
        key.update_all(parts);
        key
    }

    /// Append one component
    pub fn update(&mut self, part: impl Into<Value>) {
        let part = part.into();
        let mut hasher = DefaultHasher::new();
        part.hash(&mut hasher);
        let base = hasher.finish();

        self.count += 1;
        self.checksum = self.checksum.wrapping_add(base);
        let base = base.wrapping_mul(self.count as u64);
        self.hashcode = self
            .multiplier
            .wrapping_mul(self.hashcode)
            .wrapping_add(base);
        self.parts.push(part);
    }

    pub fn update_all<I, V>(&mut self, parts: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for part in parts {
            self.update(part);
        }
    }

    pub fn parts(&self) -> &[Value] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn hashcode(&self) -> u64 {
        self.hashcode
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hashcode == other.hashcode
            && self.checksum == other.checksum
            && self.count == other.count
            && self.parts == other.parts
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hashcode);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for part in &self.parts {
            write!(f, ":{}", part)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn statement_key(id: &str, offset: i64, limit: i64, sql: &str, params: &[Value]) -> CacheKey {
        keyed_for("production", id, offset, limit, sql, params)
    }

    fn keyed_for(
        environment: &str,
        id: &str,
        offset: i64,
        limit: i64,
        sql: &str,
        params: &[Value],
    ) -> CacheKey {
        let mut key = CacheKey::new();
        key.update(id);
        key.update(offset);
        key.update(limit);
        key.update(sql);
        key.update_all(params.iter().cloned());
        key.update(environment);
        key
    }

    #[test]
    fn test_empty_keys_are_equal() {
        assert_eq!(CacheKey::new(), CacheKey::default());
        assert!(CacheKey::new().is_empty());
    }

    #[test]
    fn test_component_count_matters() {
        // same trailing values, one extra component
        let a = CacheKey::from_parts(["x", "y"]);
        let b = CacheKey::from_parts(["x", "y", "y"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        let key = CacheKey::from_parts([Value::from("s1"), Value::from(0)]);
        let text = key.to_string();
        assert!(text.ends_with(":s1:0"), "{text}");
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ]
    }

    proptest! {
        #[test]
        fn prop_key_is_deterministic(
            id in "[a-z.]{1,16}",
            offset in 0i64..1000,
            limit in 1i64..1000,
            params in prop::collection::vec(value_strategy(), 0..6),
        ) {
            let a = statement_key(&id, offset, limit, "SELECT ?", &params);
            let b = statement_key(&id, offset, limit, "SELECT ?", &params);
            prop_assert_eq!(a.hashcode(), b.hashcode());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_changing_one_component_breaks_equality(
            params in prop::collection::vec(any::<i64>(), 1..6),
            which in any::<prop::sample::Index>(),
        ) {
            let values: Vec<Value> = params.iter().copied().map(Value::from).collect();
            let base = statement_key("s", 0, 10, "SELECT ?", &values);

            let mut changed = values.clone();
            let i = which.index(changed.len());
            changed[i] = Value::from(params[i].wrapping_add(1));
            prop_assert_ne!(&base, &statement_key("s", 0, 10, "SELECT ?", &changed));
        }

        #[test]
        fn prop_changing_statement_shape_breaks_equality(
            id in "[a-z]{1,8}",
            offset in 0i64..1000,
            limit in 1i64..1000,
            params in prop::collection::vec(value_strategy(), 0..4),
        ) {
            let sql = "SELECT * FROM t WHERE a = ?";
            let base = keyed_for("production", &id, offset, limit, sql, &params);

            let other_id = format!("{}.other", id);
            prop_assert_ne!(&base, &keyed_for("production", &other_id, offset, limit, sql, &params));
            prop_assert_ne!(&base, &keyed_for("production", &id, offset + 1, limit, sql, &params));
            prop_assert_ne!(&base, &keyed_for("production", &id, offset, limit + 1, sql, &params));
            prop_assert_ne!(
                &base,
                &keyed_for("production", &id, offset, limit, "SELECT * FROM t WHERE b = ?", &params)
            );
            prop_assert_ne!(&base, &keyed_for("staging", &id, offset, limit, sql, &params));
        }

        #[test]
        fn prop_order_matters(a in any::<i64>(), b in any::<i64>()) {
            prop_assume!(a != b);
            let ab = CacheKey::from_parts([a, b]);
            let ba = CacheKey::from_parts([b, a]);
            prop_assert_ne!(ab, ba);
        }
    }
}
