use uuid::Uuid;

use crate::block::Block;

/// What happens to one block when a workflow advances to its next step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CarryAction {
    /// Durable zones: link the new step to the ultimate canonical.
    Link { canonical_id: Uuid },
    /// WORKING: independent copy of the resolved content.
    Copy,
}

/// Carry-forward rule for `block`. A LINKED source links to its own
/// canonical, never to itself, so the new block is still one hop away.
pub fn carry_action(block: &Block) -> CarryAction {
    if block.zone.is_durable() {
        CarryAction::Link {
            canonical_id: block.reference_id.unwrap_or(block.id),
        }
    } else {
        CarryAction::Copy
    }
}
