use crate::domain::pool::PoolEntry;
use crate::domain::user::UserId;

/// Picks the next pool entry in rotation order.
///
/// `eligible` is the already-filtered set: enabled entries whose seller is
/// active, minus any seller excluded for having just declined. `last_assigned`
/// is the seller in that set who most recently received a lead, derived from
/// lead history by the caller. The pick is the entry with the smallest
/// `sort_order` strictly greater than the last assignee's, wrapping to the
/// smallest overall; equal `sort_order` values (an invariant violation kept
/// survivable) break toward the lexicographically smallest seller id. With no
/// usable history the rotation starts from the smallest `sort_order`.
pub fn next_in_rotation<'a>(
    eligible: &'a [PoolEntry],
    last_assigned: Option<&UserId>,
) -> Option<&'a PoolEntry> {
    if eligible.is_empty() {
        return None;
    }

    let mut ordered: Vec<&PoolEntry> = eligible.iter().collect();
    ordered.sort_by(|a, b| {
        a.sort_order.cmp(&b.sort_order).then_with(|| a.seller_id.cmp(&b.seller_id))
    });

    let last_order = last_assigned
        .and_then(|last| ordered.iter().find(|entry| &entry.seller_id == last))
        .map(|entry| entry.sort_order);

    let pick = match last_order {
        Some(order) => {
            ordered.iter().find(|entry| entry.sort_order > order).copied().unwrap_or(ordered[0])
        }
        None => ordered[0],
    };
    Some(pick)
}
