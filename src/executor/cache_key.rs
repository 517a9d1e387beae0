use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::Value;

const DEFAULT_MULTIPLIER: i64 = 37;
const DEFAULT_HASHCODE: i64 = 17;

/// An order-sensitive fingerprint of a query invocation.
///
/// Built from the statement id, the row bounds, the final SQL and every bound input
/// value in binding order. Two keys are equal only if every component is equal in
/// the same order; the running hash and checksum make mismatches cheap to detect.
#[derive(Clone)]
pub struct CacheKey {
    hashcode: i64,
    checksum: i64,
    count: usize,
    update_list: Vec<Value>,
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheKey {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            count: 0,
            update_list: Vec::new(),
        }
    }

    /// A key built from `parts` in order.
    pub fn from_parts<I, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut key = Self::new();
        for part in parts {
            key.update(part.into());
        }
        key
    }

    /// Append one component.
    pub fn update(&mut self, value: Value) {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        #[allow(clippy::cast_possible_wrap)]
        let base = hasher.finish() as i64;

        self.count += 1;
        self.checksum = self.checksum.wrapping_add(base);
        #[allow(clippy::cast_possible_wrap)]
        let weighted = base.wrapping_mul(self.count as i64);
        self.hashcode = DEFAULT_MULTIPLIER
            .wrapping_mul(self.hashcode)
            .wrapping_add(weighted);
        self.update_list.push(value);
    }

    #[must_use]
    pub fn update_count(&self) -> usize {
        self.count
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hashcode == other.hashcode
            && self.checksum == other.checksum
            && self.count == other.count
            && self.update_list == other.update_list
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hashcode.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for value in &self.update_list {
            write!(f, ":{value}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_give_equal_keys() {
        let a = CacheKey::from_parts([Value::from("s.id"), Value::Int(0), Value::from("select ?"), Value::Int(1)]);
        let b = CacheKey::from_parts([Value::from("s.id"), Value::Int(0), Value::from("select ?"), Value::Int(1)]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn order_and_values_matter() {
        let a = CacheKey::from_parts([Value::Int(1), Value::Int(2)]);
        let b = CacheKey::from_parts([Value::Int(2), Value::Int(1)]);
        let c = CacheKey::from_parts([Value::Int(1), Value::Int(3)]);
        let d = CacheKey::from_parts([Value::Int(1)]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
