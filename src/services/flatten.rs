use std::collections::HashMap;
use std::hash::Hash;

/// Insertion-ordered collection holding at most one value per key.
///
/// Used to fold denormalized join rows into nested views: a child is only
/// appended the first time its identifier is seen, so a row multiplied by
/// the join fan-out never produces duplicate entries.
#[derive(Debug, Clone)]
pub struct Nested<K, V> {
    index: HashMap<K, usize>,
    items: Vec<V>,
}

impl<K, V> Default for Nested<K, V> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            items: Vec::new(),
        }
    }
}

impl<K: Eq + Hash, V> Nested<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the value for `key`, creating it with `make` on first sight.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        let position = match self.index.get(&key) {
            Some(position) => *position,
            None => {
                self.items.push(make());
                let position = self.items.len() - 1;
                self.index.insert(key, position);
                position
            }
        };
        &mut self.items[position]
    }

    /// Appends the value unless the key is already present. Returns whether
    /// it was inserted.
    pub fn insert_if_absent(&mut self, key: K, make: impl FnOnce() -> V) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.get_or_insert_with(key, make);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<V> {
        self.items
    }
}

/// A node under construction together with its deduplicated children.
#[derive(Debug, Clone)]
pub struct Branch<T, K, C> {
    pub node: T,
    pub children: Nested<K, C>,
}

impl<T, K: Eq + Hash, C> Branch<T, K, C> {
    pub fn new(node: T) -> Self {
        Self {
            node,
            children: Nested::new(),
        }
    }
}
