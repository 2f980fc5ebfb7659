use std::collections::VecDeque;

/// Appends one item and evicts the oldest entries beyond `capacity`.
///
/// Returns the evicted items in insertion order. A zero capacity is treated
/// as one so the most recent item is always retained.
pub fn push_bounded<T>(items: &mut VecDeque<T>, item: T, capacity: usize) -> Vec<T> {
    items.push_back(item);

    let capacity = capacity.max(1);
    let overflow = items.len().saturating_sub(capacity);
    items.drain(..overflow).collect()
}
