//! History window: keeps a session within its turn cap.

use meshbridge_core::message::Turn;

/// Trim `turns` from the front until it holds at most `cap` turns.
///
/// Removal works in role-aligned units: when a user turn is dropped and the
/// next turn is its assistant reply, the reply goes with it, so the history
/// never starts with an orphaned assistant turn. Returns how many turns were
/// removed.
pub fn bound_history(turns: &mut Vec<Turn>, cap: usize) -> usize {
    let mut cut = 0;

    while turns.len() - cut > cap {
        let dropped_user = turns[cut].is_user();
        cut += 1;
        if dropped_user && turns.get(cut).is_some_and(Turn::is_assistant) {
            cut += 1;
        }
    }

    turns.drain(..cut);
    cut
}
