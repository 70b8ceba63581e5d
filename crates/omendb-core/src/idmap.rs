//! Bidirectional string <-> numeric id maps.
//!
//! Open addressing with quadratic (triangular-number) probing over a
//! power-of-two table, a 7-bit control byte per slot for cheap candidate
//! rejection, tombstoned deletion, and a 90% maximum load factor. Keys hash
//! with 32-bit FNV-1a; the control byte is the top 7 bits of the hash.
//!
//! The generic hash maps in std/`rustc-hash` are deliberately not used here:
//! the control-byte fast reject is measurable on ANN workloads where lookups
//! dominate and most probes are misses.

/// Control byte for a never-used slot.
const CTRL_EMPTY: u8 = 0x80;
/// Control byte for a deleted slot.
const CTRL_TOMBSTONE: u8 = 0x81;

const MIN_CAPACITY: usize = 8;

#[inline]
fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash = 0x811C_9DC5u32;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Top 7 bits of the hash; always < 0x80 so it never collides with the
/// empty/tombstone markers.
#[inline]
#[allow(clippy::cast_possible_truncation)]
fn ctrl_of(hash: u32) -> u8 {
    (hash >> 25) as u8
}

/// Forward map: string id -> numeric id.
#[derive(Debug, Clone)]
pub struct StringIdMap {
    ctrl: Vec<u8>,
    slots: Vec<Option<(Box<str>, u32)>>,
    len: usize,
    tombstones: usize,
}

impl Default for StringIdMap {
    fn default() -> Self {
        Self::new()
    }
}

impl StringIdMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ctrl: vec![CTRL_EMPTY; MIN_CAPACITY],
            slots: (0..MIN_CAPACITY).map(|_| None).collect(),
            len: 0,
            tombstones: 0,
        }
    }

    /// Number of live entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the map has no live entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a key. Idempotent on an equal key (the value is updated);
    /// returns whether the key was new.
    pub fn insert(&mut self, key: &str, value: u32) -> bool {
        self.maybe_grow();

        let hash = fnv1a(key.as_bytes());
        let h7 = ctrl_of(hash);
        let mask = self.ctrl.len() - 1;
        let mut idx = hash as usize & mask;
        let mut step = 0usize;
        let mut first_tombstone: Option<usize> = None;

        loop {
            match self.ctrl[idx] {
                CTRL_EMPTY => {
                    let target = first_tombstone.unwrap_or(idx);
                    if self.ctrl[target] == CTRL_TOMBSTONE {
                        self.tombstones -= 1;
                    }
                    self.ctrl[target] = h7;
                    self.slots[target] = Some((key.into(), value));
                    self.len += 1;
                    return true;
                }
                CTRL_TOMBSTONE => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(idx);
                    }
                }
                c if c == h7 => {
                    if let Some((k, v)) = &mut self.slots[idx] {
                        if &**k == key {
                            *v = value;
                            return false;
                        }
                    }
                }
                _ => {}
            }
            step += 1;
            idx = (idx + step) & mask;
        }
    }

    /// Looks up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<u32> {
        let hash = fnv1a(key.as_bytes());
        let h7 = ctrl_of(hash);
        let mask = self.ctrl.len() - 1;
        let mut idx = hash as usize & mask;
        let mut step = 0usize;

        loop {
            match self.ctrl[idx] {
                CTRL_EMPTY => return None,
                c if c == h7 => {
                    if let Some((k, v)) = &self.slots[idx] {
                        if &**k == key {
                            return Some(*v);
                        }
                    }
                }
                _ => {}
            }
            step += 1;
            idx = (idx + step) & mask;
        }
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<u32> {
        let hash = fnv1a(key.as_bytes());
        let h7 = ctrl_of(hash);
        let mask = self.ctrl.len() - 1;
        let mut idx = hash as usize & mask;
        let mut step = 0usize;

        loop {
            match self.ctrl[idx] {
                CTRL_EMPTY => return None,
                c if c == h7 => {
                    let matches = self.slots[idx]
                        .as_ref()
                        .is_some_and(|(k, _)| &**k == key);
                    if matches {
                        self.ctrl[idx] = CTRL_TOMBSTONE;
                        let (_, v) = self.slots[idx].take()?;
                        self.len -= 1;
                        self.tombstones += 1;
                        return Some(v);
                    }
                }
                _ => {}
            }
            step += 1;
            idx = (idx + step) & mask;
        }
    }

    /// Iterates live entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref().map(|(k, v)| (&**k, *v)))
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.ctrl.iter_mut().for_each(|c| *c = CTRL_EMPTY);
        self.slots.iter_mut().for_each(|s| *s = None);
        self.len = 0;
        self.tombstones = 0;
    }

    fn maybe_grow(&mut self) {
        // 90% load including tombstones; tombstone-heavy tables rehash at
        // the same capacity, growth doubles.
        if (self.len + self.tombstones + 1) * 10 <= self.ctrl.len() * 9 {
            return;
        }
        let new_capacity = if (self.len + 1) * 10 > self.ctrl.len() * 9 {
            self.ctrl.len() * 2
        } else {
            self.ctrl.len()
        };
        self.rehash(new_capacity);
    }

    fn rehash(&mut self, new_capacity: usize) {
        let old_slots = std::mem::replace(
            &mut self.slots,
            (0..new_capacity).map(|_| None).collect(),
        );
        self.ctrl = vec![CTRL_EMPTY; new_capacity];
        self.tombstones = 0;
        let mask = new_capacity - 1;

        for entry in old_slots.into_iter().flatten() {
            let hash = fnv1a(entry.0.as_bytes());
            let h7 = ctrl_of(hash);
            let mut idx = hash as usize & mask;
            let mut step = 0usize;
            while self.ctrl[idx] != CTRL_EMPTY {
                step += 1;
                idx = (idx + step) & mask;
            }
            self.ctrl[idx] = h7;
            self.slots[idx] = Some(entry);
        }
    }
}

/// Reverse map: numeric id -> string id.
#[derive(Debug, Clone)]
pub struct ReverseIdMap {
    ctrl: Vec<u8>,
    slots: Vec<Option<(u32, Box<str>)>>,
    len: usize,
    tombstones: usize,
}

impl Default for ReverseIdMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ReverseIdMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ctrl: vec![CTRL_EMPTY; MIN_CAPACITY],
            slots: (0..MIN_CAPACITY).map(|_| None).collect(),
            len: 0,
            tombstones: 0,
        }
    }

    /// Number of live entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the map has no live entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts an id. Idempotent on an equal id; returns whether it was new.
    pub fn insert(&mut self, id: u32, key: &str) -> bool {
        self.maybe_grow();

        let hash = fnv1a(&id.to_le_bytes());
        let h7 = ctrl_of(hash);
        let mask = self.ctrl.len() - 1;
        let mut idx = hash as usize & mask;
        let mut step = 0usize;
        let mut first_tombstone: Option<usize> = None;

        loop {
            match self.ctrl[idx] {
                CTRL_EMPTY => {
                    let target = first_tombstone.unwrap_or(idx);
                    if self.ctrl[target] == CTRL_TOMBSTONE {
                        self.tombstones -= 1;
                    }
                    self.ctrl[target] = h7;
                    self.slots[target] = Some((id, key.into()));
                    self.len += 1;
                    return true;
                }
                CTRL_TOMBSTONE => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(idx);
                    }
                }
                c if c == h7 => {
                    if let Some((k, v)) = &mut self.slots[idx] {
                        if *k == id {
                            *v = key.into();
                            return false;
                        }
                    }
                }
                _ => {}
            }
            step += 1;
            idx = (idx + step) & mask;
        }
    }

    /// Looks up an id.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&str> {
        let hash = fnv1a(&id.to_le_bytes());
        let h7 = ctrl_of(hash);
        let mask = self.ctrl.len() - 1;
        let mut idx = hash as usize & mask;
        let mut step = 0usize;

        loop {
            match self.ctrl[idx] {
                CTRL_EMPTY => return None,
                c if c == h7 => {
                    if let Some((k, v)) = &self.slots[idx] {
                        if *k == id {
                            return Some(v);
                        }
                    }
                }
                _ => {}
            }
            step += 1;
            idx = (idx + step) & mask;
        }
    }

    /// Removes an id, returning its string key.
    pub fn remove(&mut self, id: u32) -> Option<Box<str>> {
        let hash = fnv1a(&id.to_le_bytes());
        let h7 = ctrl_of(hash);
        let mask = self.ctrl.len() - 1;
        let mut idx = hash as usize & mask;
        let mut step = 0usize;

        loop {
            match self.ctrl[idx] {
                CTRL_EMPTY => return None,
                c if c == h7 => {
                    let matches = self.slots[idx].as_ref().is_some_and(|(k, _)| *k == id);
                    if matches {
                        self.ctrl[idx] = CTRL_TOMBSTONE;
                        let (_, v) = self.slots[idx].take()?;
                        self.len -= 1;
                        self.tombstones += 1;
                        return Some(v);
                    }
                }
                _ => {}
            }
            step += 1;
            idx = (idx + step) & mask;
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.ctrl.iter_mut().for_each(|c| *c = CTRL_EMPTY);
        self.slots.iter_mut().for_each(|s| *s = None);
        self.len = 0;
        self.tombstones = 0;
    }

    fn maybe_grow(&mut self) {
        if (self.len + self.tombstones + 1) * 10 <= self.ctrl.len() * 9 {
            return;
        }
        let new_capacity = if (self.len + 1) * 10 > self.ctrl.len() * 9 {
            self.ctrl.len() * 2
        } else {
            self.ctrl.len()
        };
        self.rehash(new_capacity);
    }

    fn rehash(&mut self, new_capacity: usize) {
        let old_slots = std::mem::replace(
            &mut self.slots,
            (0..new_capacity).map(|_| None).collect(),
        );
        self.ctrl = vec![CTRL_EMPTY; new_capacity];
        self.tombstones = 0;
        let mask = new_capacity - 1;

        for entry in old_slots.into_iter().flatten() {
            let hash = fnv1a(&entry.0.to_le_bytes());
            let h7 = ctrl_of(hash);
            let mut idx = hash as usize & mask;
            let mut step = 0usize;
            while self.ctrl[idx] != CTRL_EMPTY {
                step += 1;
                idx = (idx + step) & mask;
            }
            self.ctrl[idx] = h7;
            self.slots[idx] = Some(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut map = StringIdMap::new();
        assert!(map.insert("a", 0));
        assert!(map.insert("b", 1));
        assert!(!map.insert("a", 7));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some(7));
        assert_eq!(map.get("b"), Some(1));
        assert_eq!(map.get("c"), None);
        assert_eq!(map.remove("a"), Some(7));
        assert_eq!(map.get("a"), None);
        assert_eq!(map.len(), 1);
        assert_eq!(map.remove("a"), None);
    }

    #[test]
    fn test_growth_beyond_load_factor() {
        let mut map = StringIdMap::new();
        for i in 0..10_000u32 {
            assert!(map.insert(&format!("key-{i}"), i));
        }
        assert_eq!(map.len(), 10_000);
        for i in 0..10_000u32 {
            assert_eq!(map.get(&format!("key-{i}")), Some(i));
        }
    }

    #[test]
    fn test_tombstone_reuse() {
        let mut map = StringIdMap::new();
        for i in 0..100u32 {
            map.insert(&format!("k{i}"), i);
        }
        for i in 0..100u32 {
            map.remove(&format!("k{i}"));
        }
        assert!(map.is_empty());
        // Deleted slots must not break later probes.
        for i in 100..200u32 {
            map.insert(&format!("k{i}"), i);
        }
        for i in 100..200u32 {
            assert_eq!(map.get(&format!("k{i}")), Some(i));
        }
        for i in 0..100u32 {
            assert_eq!(map.get(&format!("k{i}")), None);
        }
    }

    #[test]
    fn test_reverse_map_roundtrip() {
        let mut map = ReverseIdMap::new();
        for i in 0..1_000u32 {
            assert!(map.insert(i, &format!("vec-{i}")));
        }
        assert_eq!(map.get(500), Some("vec-500"));
        assert_eq!(map.remove(500).as_deref(), Some("vec-500"));
        assert_eq!(map.get(500), None);
        assert_eq!(map.len(), 999);
    }

    #[test]
    fn test_iter_yields_all_live() {
        let mut map = StringIdMap::new();
        map.insert("x", 1);
        map.insert("y", 2);
        map.remove("x");
        let entries: Vec<(String, u32)> =
            map.iter().map(|(k, v)| (k.to_string(), v)).collect();
        assert_eq!(entries, vec![("y".to_string(), 2)]);
    }

    #[test]
    fn test_clear() {
        let mut map = ReverseIdMap::new();
        map.insert(1, "a");
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.get(1), None);
        assert!(map.insert(1, "b"));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashMap;

        proptest! {
            #[test]
            fn forward_map_matches_std(ops in proptest::collection::vec(
                (0u8..3, "[a-z]{1,6}", 0u32..1000), 1..200)) {
                let mut ours = StringIdMap::new();
                let mut model: HashMap<String, u32> = HashMap::new();

                for (op, key, value) in ops {
                    match op {
                        0 => {
                            let new_ours = ours.insert(&key, value);
                            let new_model = model.insert(key, value).is_none();
                            prop_assert_eq!(new_ours, new_model);
                        }
                        1 => {
                            prop_assert_eq!(ours.get(&key), model.get(&key).copied());
                        }
                        _ => {
                            prop_assert_eq!(ours.remove(&key), model.remove(&key));
                        }
                    }
                    prop_assert_eq!(ours.len(), model.len());
                }
            }
        }
    }
}
