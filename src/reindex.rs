use std::collections::HashMap;
use std::hash::Hash;

/// One `Option` per key: the first row owned by that key, or `None`. Rows may come in any
/// order; the result is aligned to `keys`.
pub fn align_single<K, R, F>(keys: &[K], rows: Vec<R>, key_of: F) -> Vec<Option<R>>
where
    K: Eq + Hash + Clone,
    R: Clone,
    F: Fn(&R) -> K,
{
    let mut by_key: HashMap<K, R> = HashMap::with_capacity(rows.len());
    for row in rows {
        by_key.entry(key_of(&row)).or_insert(row);
    }
    keys.iter().map(|k| by_key.get(k).cloned()).collect()
}

/// One `Vec` per key: every row owned by that key in source order, or an empty `Vec`.
pub fn align_many<K, R, F>(keys: &[K], rows: Vec<R>, key_of: F) -> Vec<Vec<R>>
where
    K: Eq + Hash + Clone,
    R: Clone,
    F: Fn(&R) -> K,
{
    let mut by_key: HashMap<K, Vec<R>> = HashMap::new();
    for row in rows {
        by_key.entry(key_of(&row)).or_default().push(row);
    }
    keys.iter().map(|k| by_key.get(k).cloned().unwrap_or_default()).collect()
}

/// Like [`align_many`] for bridge-table results, where the owning key travels next to the row.
pub fn align_owned<K, R>(keys: &[K], rows: Vec<(K, R)>) -> Vec<Vec<R>>
where
    K: Eq + Hash + Clone,
    R: Clone,
{
    let mut by_key: HashMap<K, Vec<R>> = HashMap::new();
    for (owner, row) in rows {
        by_key.entry(owner).or_default().push(row);
    }
    keys.iter().map(|k| by_key.get(k).cloned().unwrap_or_default()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_fills_missing_keys_with_none() {
        let rows = vec![(3, "c"), (2, "b")];
        assert_eq!(
            align_single(&[1, 2, 3], rows, |r| r.0),
            vec![None, Some((2, "b")), Some((3, "c"))]
        );
    }

    #[test]
    fn single_collapses_duplicate_rows() {
        let rows = vec![(1, "first"), (1, "second")];
        assert_eq!(align_single(&[1], rows, |r| r.0), vec![Some((1, "first"))]);
    }

    #[test]
    fn many_groups_rows_and_keeps_empty_slots() {
        let rows = vec![("X", 1), ("Y", 2), ("X", 3)];
        assert_eq!(
            align_many(&["X", "Z", "Y"], rows, |r| r.0),
            vec![vec![("X", 1), ("X", 3)], vec![], vec![("Y", 2)]]
        );
    }

    #[test]
    fn owned_rows_follow_their_owner() {
        let rows = vec![(20, "b"), (10, "a"), (10, "c")];
        assert_eq!(align_owned(&[10, 20, 30], rows), vec![vec!["a", "c"], vec!["b"], vec![]]);
    }
}
