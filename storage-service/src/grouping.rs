use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::models::Id;

/// Buckets `rows` by `key`, keeping the input order inside each bucket.
pub fn group_by<T, K, F>(rows: impl IntoIterator<Item = T>, key: F) -> HashMap<K, Vec<T>>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut groups: HashMap<K, Vec<T>> = HashMap::new();
    for row in rows {
        groups.entry(key(&row)).or_default().push(row);
    }
    groups
}

/// Distinct ids in ascending order.
pub fn unique_ids<T>(rows: &[T], key: impl Fn(&T) -> Id) -> Vec<Id> {
    let mut ids: Vec<Id> = rows.iter().map(key).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// First key that occurs twice, in input order.
pub fn first_duplicate<T, K, F>(rows: &[T], key: F) -> Option<K>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::with_capacity(rows.len());
    for row in rows {
        let k = key(row);
        if seen.contains(&k) {
            return Some(k);
        }
        seen.insert(k);
    }
    None
}
