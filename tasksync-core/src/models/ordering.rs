//! Dense 0..n-1 ranking of sibling records.
//!
//! Every structural change (insert, delete, move) re-indexes the full sibling
//! set; callers persist the whole set in one batch.

/// A record with a position among its siblings.
pub trait Ranked {
    fn rank(&self) -> u32;
    fn set_rank(&mut self, rank: u32);
}

/// Assigns ranks `0..n` in slice order.
///
/// Returns the indices whose rank actually changed.
pub fn rerank<T: Ranked>(items: &mut [T]) -> Vec<usize> {
    let mut changed = Vec::new();
    for (index, item) in items.iter_mut().enumerate() {
        let rank = index as u32;
        if item.rank() != rank {
            item.set_rank(rank);
            changed.push(index);
        }
    }
    changed
}

/// Moves the element at `from` to `to` and re-ranks the whole slice.
///
/// Out-of-range indices leave the items untouched and return `false`.
pub fn move_item<T: Ranked>(items: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from >= items.len() || to >= items.len() {
        return false;
    }
    let item = items.remove(from);
    items.insert(to, item);
    rerank(items);
    true
}
