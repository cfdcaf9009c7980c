//! Merging incremental fetches into a cached collection.

use std::collections::HashMap;

/// Records carrying a stable backend identifier.
pub trait Identified {
    fn id(&self) -> &str;
}

/// Merge `incoming` into `existing` by id.
///
/// Known records are replaced in place. Unknown records are placed ahead of
/// the existing ones, in the order they arrived. If `incoming` repeats an id,
/// the last occurrence wins.
pub fn merge_by_id<T>(existing: &[T], incoming: Vec<T>) -> Vec<T>
where
    T: Identified + Clone,
{
    let mut merged: Vec<T> = existing.to_vec();
    let known: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(index, record)| (record.id().to_string(), index))
        .collect();

    let mut fresh: Vec<T> = Vec::new();
    let mut fresh_index: HashMap<String, usize> = HashMap::new();

    for record in incoming {
        if let Some(&index) = known.get(record.id()) {
            merged[index] = record;
        } else if let Some(&index) = fresh_index.get(record.id()) {
            fresh[index] = record;
        } else {
            fresh_index.insert(record.id().to_string(), fresh.len());
            fresh.push(record);
        }
    }

    fresh.extend(merged);
    fresh
}
