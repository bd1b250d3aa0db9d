//! Reference lifecycle: the REGULAR/LINKED state machine.
//!
//! Every public operation here runs as exactly one transaction. Either all
//! of its writes land (promotions, redirects, inserts, deletes) or none do.
//!
//! The reference graph is a star: a LINKED block always points at a REGULAR
//! canonical. `create_linked` is the only path that sets `reference_id`, and
//! it flattens a LINKED target to that target's own canonical first.

use rusqlite::Connection;
use uuid::Uuid;

use lb_core::{
    Block, BlockState, Zone, allocate_at_end, allocate_between, canonical_ids, needs_rebalance, rebalance,
};

use crate::config::validate_workspace_id;
use crate::error::{Result, StoreError};
use crate::store::{
    Store, canonical_lookup_on, delete_block_on, external_references_on, insert_block_on,
    max_order_on, references_to_on, require_block_on, write_content_on, write_draft_on,
    write_position_on, zone_blocks_on,
};

/// Where a new or moved block lands within its zone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Placement {
    /// After the current last block of the zone.
    #[default]
    End,
    /// Between two sibling blocks; `None` is an open end.
    Between {
        before: Option<Uuid>,
        after: Option<Uuid>,
    },
}

/// Input for [`Store::create_block`].
#[derive(Clone, Debug)]
pub struct NewBlock<'a> {
    pub kind: &'a str,
    pub zone: Zone,
    pub content: &'a str,
    pub placement: Placement,
    pub is_draft: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// References that were materialized into REGULAR blocks first.
    pub promoted: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DestroyReport {
    pub deleted: usize,
    pub promoted: usize,
}

impl Store {
    /// Insert a REGULAR block.
    pub fn create_block(&self, workspace_id: &str, new: &NewBlock<'_>) -> Result<Block> {
        validate_workspace_id(workspace_id)?;
        let tx = self.conn().unchecked_transaction()?;

        let order_key = order_for_placement_on(&tx, workspace_id, new.zone, new.placement, None)?;
        let mut block = Block::new_regular(workspace_id, new.kind, new.zone, order_key, new.content);
        block.is_draft = new.is_draft;
        insert_block_on(&tx, &block)?;

        tx.commit()?;
        Ok(block)
    }

    /// Insert a LINKED block in `target_workspace` delegating to `canonical_id`.
    ///
    /// A LINKED `canonical_id` is flattened to its own canonical, so the new
    /// block is always exactly one hop from real content. Fails with
    /// `NotFound` when the canonical (or the flattened canonical) is missing.
    pub fn create_linked(
        &self,
        target_workspace: &str,
        canonical_id: Uuid,
        zone: Zone,
    ) -> Result<Block> {
        validate_workspace_id(target_workspace)?;
        let tx = self.conn().unchecked_transaction()?;
        let block = create_linked_on(&tx, target_workspace, canonical_id, zone)?;
        tx.commit()?;
        Ok(block)
    }

    /// Replace a block's content. A LINKED block redirects the write to its
    /// canonical; every sibling reference sees it on the next resolve.
    ///
    /// Returns the row that was written.
    pub fn edit(&self, block_id: Uuid, content: &str) -> Result<Block> {
        let tx = self.conn().unchecked_transaction()?;

        let block = require_block_on(&tx, block_id)?;
        let mut target = match block.reference_id {
            None => block,
            Some(canonical_id) => require_block_on(&tx, canonical_id).map_err(|_| {
                StoreError::NotFound(format!(
                    "canonical {canonical_id} of linked block {block_id}"
                ))
            })?,
        };
        target.set_content(content);
        write_content_on(&tx, &target)?;

        tx.commit()?;
        Ok(target)
    }

    /// LINKED → REGULAR: copy the canonical's current content into the block
    /// and drop the reference. A dangling canonical materializes as empty.
    pub fn unlink(&self, block_id: Uuid) -> Result<Block> {
        let tx = self.conn().unchecked_transaction()?;

        let mut block = require_block_on(&tx, block_id)?;
        let Some(canonical_id) = block.reference_id else {
            return Err(StoreError::InvalidState(format!(
                "block {block_id} is not linked"
            )));
        };
        let lookup = canonical_lookup_on(&tx, &[canonical_id])?;
        let content = lookup.get(&canonical_id).cloned().unwrap_or_else(|| {
            tracing::warn!(canonical = %canonical_id, "unlinking dangling reference");
            String::new()
        });
        block.set_content(&content);
        write_content_on(&tx, &block)?;

        tx.commit()?;
        Ok(block)
    }

    /// Rewrite a REGULAR block's content in place with a shorter version.
    /// A LINKED block has no single owner to rewrite; unlink it first.
    pub fn compress(&self, block_id: Uuid, compressed: &str) -> Result<Block> {
        let tx = self.conn().unchecked_transaction()?;

        let mut block = require_block_on(&tx, block_id)?;
        if block.state() == BlockState::Linked {
            return Err(StoreError::InvalidState(format!(
                "block {block_id} is linked; unlink before compressing"
            )));
        }
        block.set_content(compressed);
        write_content_on(&tx, &block)?;

        tx.commit()?;
        Ok(block)
    }

    /// Delete one block. A REGULAR block with references promotes each of
    /// them first; a LINKED block is removed alone.
    pub fn delete_block(&self, block_id: Uuid) -> Result<DeleteReport> {
        let tx = self.conn().unchecked_transaction()?;

        let block = require_block_on(&tx, block_id)?;
        let promoted = match block.state() {
            BlockState::Linked => 0,
            BlockState::Regular => {
                let referrers = references_to_on(&tx, block.id)?;
                let count = referrers.len();
                for referrer in referrers {
                    promote_on(&tx, referrer, &block.content)?;
                }
                count
            }
        };
        delete_block_on(&tx, block.id)?;

        tx.commit()?;
        tracing::info!(block = %block_id, promoted, "deleted block");
        Ok(DeleteReport { promoted })
    }

    /// Remove every block of a workspace. References held by other
    /// workspaces are promoted first; references inside the workspace go
    /// down with it.
    pub fn destroy_workspace(&self, workspace_id: &str) -> Result<DestroyReport> {
        let tx = self.conn().unchecked_transaction()?;

        let external = external_references_on(&tx, workspace_id)?;
        let lookup = canonical_lookup_on(&tx, &canonical_ids(&external))?;
        let promoted = external.len();
        for referrer in external {
            let content = referrer
                .reference_id
                .and_then(|id| lookup.get(&id))
                .cloned()
                .unwrap_or_default();
            promote_on(&tx, referrer, &content)?;
        }

        let deleted = tx.execute(
            "DELETE FROM blocks WHERE workspace_id = ?1",
            [workspace_id],
        )?;

        tx.commit()?;
        tracing::info!(workspace = workspace_id, deleted, promoted, "destroyed workspace");
        Ok(DestroyReport { deleted, promoted })
    }

    /// Move a block to a zone/position. Link state is untouched.
    pub fn move_block(&self, block_id: Uuid, zone: Zone, placement: Placement) -> Result<Block> {
        let tx = self.conn().unchecked_transaction()?;

        let mut block = require_block_on(&tx, block_id)?;
        let order_key =
            order_for_placement_on(&tx, &block.workspace_id, zone, placement, Some(block.id))?;
        write_position_on(&tx, block.id, zone, order_key)?;

        tx.commit()?;
        block.zone = zone;
        block.order_key = order_key;
        Ok(block)
    }

    pub fn set_draft(&self, block_id: Uuid, is_draft: bool) -> Result<Block> {
        let tx = self.conn().unchecked_transaction()?;

        let mut block = require_block_on(&tx, block_id)?;
        write_draft_on(&tx, block.id, is_draft)?;

        tx.commit()?;
        block.is_draft = is_draft;
        Ok(block)
    }

    /// Reassign integer-spaced order keys across one zone, keeping order.
    ///
    /// Unless `force` is set, a zone whose keys are still comfortably spaced
    /// is left alone and `None` is returned. Otherwise returns the number of
    /// blocks renumbered.
    pub fn rebalance_zone(
        &self,
        workspace_id: &str,
        zone: Zone,
        force: bool,
    ) -> Result<Option<usize>> {
        let tx = self.conn().unchecked_transaction()?;

        let blocks = zone_blocks_on(&tx, workspace_id, zone)?;
        let keys: Vec<f64> = blocks.iter().map(|b| b.order_key).collect();
        if !force && !needs_rebalance(&keys) {
            tracing::debug!(workspace = workspace_id, zone = %zone, "zone keys already spaced");
            return Ok(None);
        }
        let fresh = rebalance(&keys);
        let mut changed = 0;
        for (block, key) in blocks.iter().zip(fresh) {
            if block.order_key != key {
                write_position_on(&tx, block.id, zone, key)?;
                changed += 1;
            }
        }

        tx.commit()?;
        tracing::info!(workspace = workspace_id, zone = %zone, changed, "rebalanced zone");
        Ok(Some(changed))
    }
}

/// `create_linked` body, usable inside a larger transaction.
pub(crate) fn create_linked_on(
    conn: &Connection,
    target_workspace: &str,
    canonical_id: Uuid,
    zone: Zone,
) -> Result<Block> {
    let target = require_block_on(conn, canonical_id)
        .map_err(|_| StoreError::NotFound(format!("canonical {canonical_id}")))?;

    let canonical = match target.reference_id {
        None => target,
        Some(next) => {
            let flattened = require_block_on(conn, next).map_err(|_| {
                StoreError::NotFound(format!("canonical {next} (via linked {canonical_id})"))
            })?;
            if flattened.is_linked() {
                return Err(StoreError::InvalidData(format!(
                    "reference chain {canonical_id} -> {next} exceeds one hop"
                )));
            }
            flattened
        }
    };

    let order_key = allocate_at_end(max_order_on(conn, target_workspace, zone)?);
    let block = Block::new_linked(target_workspace, &canonical.kind, zone, order_key, canonical.id);
    insert_block_on(conn, &block)?;

    tracing::debug!(
        block = %block.id,
        canonical = %canonical.id,
        workspace = target_workspace,
        "created linked block"
    );
    Ok(block)
}

/// Materialize `content` into a referencing block and clear its reference.
fn promote_on(conn: &Connection, mut referrer: Block, content: &str) -> Result<()> {
    referrer.set_content(content);
    write_content_on(conn, &referrer)?;
    tracing::debug!(block = %referrer.id, workspace = %referrer.workspace_id, "promoted reference");
    Ok(())
}

/// Order key for `placement` in `workspace_id`/`zone`. Named neighbors must
/// be siblings in that zone; `moving` is excluded from end-of-zone lookups.
fn order_for_placement_on(
    conn: &Connection,
    workspace_id: &str,
    zone: Zone,
    placement: Placement,
    moving: Option<Uuid>,
) -> Result<f64> {
    match placement {
        Placement::End => {
            let Some(moving) = moving else {
                return Ok(allocate_at_end(max_order_on(conn, workspace_id, zone)?));
            };
            let max = zone_blocks_on(conn, workspace_id, zone)?
                .iter()
                .filter(|b| b.id != moving)
                .map(|b| b.order_key)
                .reduce(f64::max);
            Ok(allocate_at_end(max))
        }
        Placement::Between { before, after } => {
            let before_key = neighbor_key_on(conn, workspace_id, zone, before, moving)?;
            let after_key = neighbor_key_on(conn, workspace_id, zone, after, moving)?;
            if let (Some(b), Some(a)) = (before_key, after_key)
                && b >= a
            {
                return Err(StoreError::InvalidInput(format!(
                    "neighbors out of order: {b} is not before {a}"
                )));
            }
            Ok(allocate_between(before_key, after_key))
        }
    }
}

fn neighbor_key_on(
    conn: &Connection,
    workspace_id: &str,
    zone: Zone,
    neighbor: Option<Uuid>,
    moving: Option<Uuid>,
) -> Result<Option<f64>> {
    let Some(id) = neighbor else {
        return Ok(None);
    };
    if Some(id) == moving {
        return Err(StoreError::InvalidInput(format!(
            "block {id} cannot be its own neighbor"
        )));
    }
    let sibling = require_block_on(conn, id)?;
    if sibling.workspace_id != workspace_id || sibling.zone != zone {
        return Err(StoreError::InvalidInput(format!(
            "neighbor {id} is not in {workspace_id}/{zone}"
        )));
    }
    Ok(Some(sibling.order_key))
}
