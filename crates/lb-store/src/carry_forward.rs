//! Carry a workspace's blocks into the next step of a pipeline.

use lb_core::{Block, CarryAction, allocate_at_end, canonical_ids, carry_action, resolve_many};

use crate::config::validate_workspace_id;
use crate::error::{Result, StoreError};
use crate::lifecycle::create_linked_on;
use crate::store::{
    Store, canonical_lookup_on, insert_block_on, max_order_on, workspace_blocks_on, write_draft_on,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CarryReport {
    pub linked: usize,
    pub copied: usize,
}

impl Store {
    /// Carry every block of `from` into `to`.
    ///
    /// PERMANENT and STABLE blocks arrive as links to their canonical, so a
    /// later edit anywhere in the pipeline is seen by every step. WORKING
    /// blocks arrive as independent copies of their resolved content. Zone,
    /// kind, draft flag and relative order are preserved; carried blocks are
    /// appended after whatever `to` already holds in each zone.
    pub fn advance_workspace(&self, from: &str, to: &str) -> Result<CarryReport> {
        validate_workspace_id(to)?;
        if from == to {
            return Err(StoreError::InvalidInput(format!(
                "cannot carry workspace {from} into itself"
            )));
        }
        let tx = self.conn().unchecked_transaction()?;

        let source = workspace_blocks_on(&tx, from)?;
        let live = canonical_lookup_on(&tx, &canonical_ids(&source))?;
        let resolved = resolve_many(&source, &live).blocks;

        let mut report = CarryReport::default();
        for block in &resolved {
            let action = match carry_action(block) {
                CarryAction::Link { canonical_id }
                    if block.is_linked() && !live.contains_key(&canonical_id) =>
                {
                    tracing::warn!(
                        block = %block.id,
                        canonical = %canonical_id,
                        "canonical missing, carrying as copy"
                    );
                    CarryAction::Copy
                }
                action => action,
            };

            let carried = match action {
                CarryAction::Link { canonical_id } => {
                    report.linked += 1;
                    create_linked_on(&tx, to, canonical_id, block.zone)?
                }
                CarryAction::Copy => {
                    report.copied += 1;
                    let order_key = allocate_at_end(max_order_on(&tx, to, block.zone)?);
                    let copy =
                        Block::new_regular(to, &block.kind, block.zone, order_key, &block.content);
                    insert_block_on(&tx, &copy)?;
                    copy
                }
            };
            if block.is_draft {
                write_draft_on(&tx, carried.id, true)?;
            }
        }

        tx.commit()?;
        tracing::info!(
            from,
            to,
            linked = report.linked,
            copied = report.copied,
            "advanced workspace"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{NewBlock, Placement};
    use lb_core::Zone;

    fn add(store: &Store, ws: &str, zone: Zone, content: &str) -> Block {
        store
            .create_block(
                ws,
                &NewBlock {
                    kind: "note",
                    zone,
                    content,
                    placement: Placement::End,
                    is_draft: false,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_advance_links_durable_and_copies_working() {
        let store = Store::open_in_memory().unwrap();
        let p = add(&store, "step1", Zone::Permanent, "rules");
        let s = add(&store, "step1", Zone::Stable, "reference doc");
        let w = add(&store, "step1", Zone::Working, "scratch");

        let report = store.advance_workspace("step1", "step2").unwrap();
        assert_eq!(report, CarryReport { linked: 2, copied: 1 });

        let carried = store.workspace_blocks("step2").unwrap();
        assert_eq!(carried.len(), 3);
        assert_eq!(carried[0].reference_id, Some(p.id));
        assert_eq!(carried[1].reference_id, Some(s.id));
        assert!(carried[2].reference_id.is_none());
        assert_eq!(carried[2].content, "scratch");
        assert_ne!(carried[2].id, w.id);

        // durable edits flow forward; working copies are independent
        store.edit(p.id, "rules v2").unwrap();
        store.edit(w.id, "scratch v2").unwrap();
        let resolved = store.resolve_workspace("step2").unwrap();
        assert_eq!(resolved[0].content, "rules v2");
        assert_eq!(resolved[2].content, "scratch");
    }

    #[test]
    fn test_advance_through_three_steps_stays_one_hop() {
        let store = Store::open_in_memory().unwrap();
        let p = add(&store, "a", Zone::Permanent, "root");
        store.advance_workspace("a", "b").unwrap();
        store.advance_workspace("b", "c").unwrap();

        let c = store.workspace_blocks("c").unwrap();
        assert_eq!(c[0].reference_id, Some(p.id));
        assert_eq!(store.references_to(p.id).unwrap().len(), 2);
    }

    #[test]
    fn test_advance_copies_resolved_working_link() {
        let store = Store::open_in_memory().unwrap();
        let x = add(&store, "lib", Zone::Stable, "shared snippet");
        store.create_linked("a", x.id, Zone::Working).unwrap();

        let report = store.advance_workspace("a", "b").unwrap();
        assert_eq!(report.copied, 1);
        let b = store.workspace_blocks("b").unwrap();
        assert_eq!(b[0].content, "shared snippet");
        assert!(!b[0].is_linked());
    }

    #[test]
    fn test_advance_appends_after_existing() {
        let store = Store::open_in_memory().unwrap();
        add(&store, "a", Zone::Stable, "one");
        add(&store, "a", Zone::Stable, "two");
        add(&store, "b", Zone::Stable, "already here");

        store.advance_workspace("a", "b").unwrap();
        let contents: Vec<String> = store
            .resolve_workspace("b")
            .unwrap()
            .into_iter()
            .map(|b| b.content)
            .collect();
        assert_eq!(contents, vec!["already here", "one", "two"]);
    }

    #[test]
    fn test_advance_dangling_link_becomes_empty_copy() {
        let store = Store::open_in_memory().unwrap();
        let x = add(&store, "lib", Zone::Stable, "gone soon");
        let y = store.create_linked("a", x.id, Zone::Stable).unwrap();
        store
            .conn()
            .execute("DELETE FROM blocks WHERE id = ?1", [x.id.to_string()])
            .unwrap();

        let report = store.advance_workspace("a", "b").unwrap();
        assert_eq!(report, CarryReport { linked: 0, copied: 1 });
        let b = store.workspace_blocks("b").unwrap();
        assert!(b[0].reference_id.is_none());
        assert!(b[0].content.is_empty());
        assert_ne!(b[0].id, y.id);
    }

    #[test]
    fn test_advance_keeps_draft_flag() {
        let store = Store::open_in_memory().unwrap();
        let p = add(&store, "a", Zone::Permanent, "p");
        store.set_draft(p.id, true).unwrap();
        store.advance_workspace("a", "b").unwrap();
        assert!(store.workspace_blocks("b").unwrap()[0].is_draft);
    }

    #[test]
    fn test_advance_into_self_rejected() {
        let store = Store::open_in_memory().unwrap();
        add(&store, "a", Zone::Working, "x");
        assert!(matches!(
            store.advance_workspace("a", "a"),
            Err(StoreError::InvalidInput(_))
        ));
        assert_eq!(store.block_count().unwrap(), 1);
    }

    #[test]
    fn test_advance_is_atomic() {
        let store = Store::open_in_memory().unwrap();
        add(&store, "step1", Zone::Permanent, "rules");
        add(&store, "step1", Zone::Working, "scratch");
        // the PERMANENT link goes in first, then the WORKING copy is refused
        store
            .conn()
            .execute_batch(
                "CREATE TRIGGER copy_guard BEFORE INSERT ON blocks
                 WHEN NEW.workspace_id = 'step2' AND NEW.reference_id IS NULL
                 BEGIN SELECT RAISE(ABORT, 'copy refused'); END;",
            )
            .unwrap();

        assert!(store.advance_workspace("step1", "step2").is_err());
        assert!(store.workspace_blocks("step2").unwrap().is_empty());
        assert_eq!(store.block_count().unwrap(), 2);
    }
}
