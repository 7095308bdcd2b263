//! Predicate query capability.
//!
//! The in-memory reference has no real index; it scans
//! [`crate::map::KeyedMap::entries`] and filters/sorts/pages in memory,
//! which is semantically equivalent for small cluster-local maps like the
//! outbox, DLQ, and saga state store this backs.

use crate::map::KeyedMap;

/// A page of query results plus whether more pages remain.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
}

/// Run a predicate query over a map: filter, sort, then page.
///
/// `sort_key` extracts the field used for ordering (e.g. `createdAt`);
/// results are sorted ascending by it.
pub fn query<K, V, P, S, O>(
    map: &dyn KeyedMap<K, V>,
    predicate: P,
    sort_key: S,
    offset: usize,
    limit: usize,
) -> Page<V>
where
    K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    P: Fn(&V) -> bool,
    S: Fn(&V) -> O,
    O: Ord,
{
    let mut matched: Vec<V> = map.entries().into_iter().map(|(_, v)| v).filter(&predicate).collect();
    matched.sort_by_key(&sort_key);

    let total = matched.len();
    let items: Vec<V> = matched.into_iter().skip(offset).take(limit).collect();
    let has_more = total > offset + items.len();

    Page { items, total, has_more }
}
