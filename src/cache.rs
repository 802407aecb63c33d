use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

/// State of one key in a loader cache.
///
/// A key is `Pending` from the moment it is first requested until the dispatch that covers it
/// completes, and `Ready` afterwards. There is never more than one entry per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry<V> {
    Pending,
    Ready(V),
}

impl<V> Entry<V> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Entry::Pending)
    }
}

pub trait Cache {
    type K;
    type V;

    fn get(&self, key: &Self::K) -> Option<&Self::V>;

    fn insert(&mut self, key: Self::K, value: Self::V);
    fn insert_many<I: IntoIterator<Item = (Self::K, Self::V)>>(&mut self, key_vals: I);

    fn remove(&mut self, keys: &[Self::K]);

    /// Keeps only the entries for which `keep` returns true.
    fn retain<F: FnMut(&Self::K, &Self::V) -> bool>(&mut self, keep: F);
}

impl<K, V, S: BuildHasher> Cache for HashMap<K, V, S>
where
    K: Eq + Hash,
{
    type K = K;
    type V = V;

    fn get(&self, key: &Self::K) -> Option<&Self::V> {
        HashMap::get(self, key)
    }

    fn insert(&mut self, key: Self::K, value: Self::V) {
        HashMap::insert(self, key, value);
    }

    fn insert_many<I: IntoIterator<Item = (Self::K, Self::V)>>(&mut self, key_vals: I) {
        for (key, value) in key_vals.into_iter() {
            HashMap::insert(self, key, value);
        }
    }

    fn remove(&mut self, keys: &[Self::K]) {
        for key in keys.iter() {
            HashMap::remove(self, key);
        }
    }

    fn retain<F: FnMut(&Self::K, &Self::V) -> bool>(&mut self, mut keep: F) {
        HashMap::retain(self, |k, v| keep(k, v));
    }
}
