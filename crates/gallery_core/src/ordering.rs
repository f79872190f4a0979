//! Drag-and-drop ordering policy.
//!
//! A move always renumbers the whole list to its 1-based positions instead of
//! squeezing the moved item between its neighbours, so gaps and duplicate
//! `display_order` values left by earlier writes disappear on the next move.

use shared::domain::{GalleryItem, GalleryItemId, ItemOrder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    /// The list in its new order, with `display_order` already rewritten.
    pub items: Vec<GalleryItem>,
    pub orders: Vec<ItemOrder>,
}

/// Moves `dragged` into the slot currently held by `target`.
///
/// Returns `None` when either id is absent or both are the same item; no
/// store writes should follow in that case.
pub fn plan_move(
    items: &[GalleryItem],
    dragged: GalleryItemId,
    target: GalleryItemId,
) -> Option<ReorderPlan> {
    if dragged == target {
        return None;
    }
    let from = items.iter().position(|item| item.id == dragged)?;
    let to = items.iter().position(|item| item.id == target)?;

    let mut reordered = items.to_vec();
    let moved = reordered.remove(from);
    reordered.insert(to, moved);

    let orders = renumber(&mut reordered);
    Some(ReorderPlan {
        items: reordered,
        orders,
    })
}

/// Rewrites `display_order` to 1..=N in list order.
pub fn renumber(items: &mut [GalleryItem]) -> Vec<ItemOrder> {
    items
        .iter_mut()
        .zip(1_i64..)
        .map(|(item, position)| {
            item.display_order = position;
            ItemOrder {
                id: item.id,
                display_order: position,
            }
        })
        .collect()
}

/// Order for a new item when the caller did not pick one.
pub fn next_display_order(current_max: Option<i64>) -> i64 {
    current_max.map_or(1, |max| max.saturating_add(1))
}

#[cfg(test)]
#[path = "tests/ordering_tests.rs"]
mod tests;
