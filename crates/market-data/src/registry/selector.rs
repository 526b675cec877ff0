//! Source selection.
//!
//! Pure ordering over a snapshot of provider state. No I/O and no side
//! effects, so the same snapshot always yields the same order.

use crate::models::ProviderState;

/// One provider's entry in a selection snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionEntry {
    pub id: String,
    pub consecutive_failures: u32,
    /// Static priority plus any quality penalty. Lower is preferred.
    pub priority: i32,
    pub state: ProviderState,
}

/// Order active providers by (consecutive failures asc, priority asc).
///
/// Disabled providers are dropped. The sort is stable, so entries that tie
/// on both keys keep their registration order.
pub fn order_providers(entries: &[SelectionEntry]) -> Vec<String> {
    let mut active: Vec<&SelectionEntry> = entries
        .iter()
        .filter(|e| e.state == ProviderState::Active)
        .collect();

    active.sort_by_key(|e| (e.consecutive_failures, e.priority));
    active.into_iter().map(|e| e.id.clone()).collect()
}
