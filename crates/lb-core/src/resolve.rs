//! Reference resolution: block → effective content.
//!
//! Pure and I/O-free. The store has no joins, so callers first collect the
//! distinct canonical ids with [`canonical_ids`], fetch them in one query,
//! and pass the result in as a [`CanonicalLookup`].

use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use crate::block::Block;

/// Canonical id → canonical content.
pub type CanonicalLookup = HashMap<Uuid, String>;

/// Output of [`resolve_many`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Input blocks in input order, with `content` replaced by the effective
    /// content. All other fields, `reference_id` included, are untouched.
    pub blocks: Vec<Block>,
    /// Canonical ids referenced but missing from the lookup. Informational.
    pub dangling: Vec<Uuid>,
}

/// Distinct canonical ids referenced by `blocks`, sorted.
pub fn canonical_ids(blocks: &[Block]) -> Vec<Uuid> {
    blocks
        .iter()
        .filter_map(|b| b.reference_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Effective content of one block. A dangling reference resolves to `""`.
pub fn resolve_one<'a>(block: &'a Block, lookup: &'a CanonicalLookup) -> &'a str {
    match block.reference_id {
        None => &block.content,
        Some(id) => lookup.get(&id).map(String::as_str).unwrap_or(""),
    }
}

pub fn resolve_many(blocks: &[Block], lookup: &CanonicalLookup) -> Resolution {
    let mut dangling = BTreeSet::new();
    let resolved = blocks
        .iter()
        .map(|block| {
            if let Some(id) = block.reference_id
                && !lookup.contains_key(&id)
            {
                dangling.insert(id);
            }
            let mut out = block.clone();
            out.content = resolve_one(block, lookup).to_string();
            out
        })
        .collect();

    Resolution {
        blocks: resolved,
        dangling: dangling.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Zone;

    fn regular(ws: &str, content: &str, order: f64) -> Block {
        Block::new_regular(ws, "note", Zone::Working, order, content)
    }

    #[test]
    fn test_regular_returns_own_content() {
        let b = regular("w1", "mine", 1.0);
        let lookup = CanonicalLookup::new();
        assert_eq!(resolve_one(&b, &lookup), "mine");
    }

    #[test]
    fn test_linked_returns_canonical_content() {
        let canonical = regular("w1", "Guideline v1", 1.0);
        let linked = Block::new_linked("w2", "note", Zone::Permanent, 1.0, canonical.id);
        let lookup: CanonicalLookup = [(canonical.id, canonical.content.clone())].into();
        assert_eq!(resolve_one(&linked, &lookup), "Guideline v1");
    }

    #[test]
    fn test_dangling_resolves_empty() {
        let linked = Block::new_linked("w2", "note", Zone::Stable, 1.0, Uuid::new_v4());
        let result = resolve_many(std::slice::from_ref(&linked), &CanonicalLookup::new());
        assert_eq!(result.blocks[0].content, "");
        assert_eq!(result.dangling, vec![linked.reference_id.unwrap()]);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let canonical = regular("w1", "Doc", 1.0);
        let linked = Block::new_linked("w2", "note", Zone::Stable, 1.0, canonical.id);
        let lookup: CanonicalLookup = [(canonical.id, "Doc".to_string())].into();
        assert_eq!(resolve_one(&linked, &lookup), resolve_one(&linked, &lookup));
        assert_eq!(
            resolve_one(&canonical, &lookup),
            resolve_one(&canonical, &lookup)
        );
    }

    #[test]
    fn test_resolve_many_preserves_order_and_fields() {
        let canonical = regular("w1", "shared", 1.0);
        let blocks = vec![
            regular("w2", "first", 3.0),
            Block::new_linked("w2", "guideline", Zone::Permanent, 2.0, canonical.id),
            regular("w2", "third", 1.0),
        ];
        let lookup: CanonicalLookup = [(canonical.id, "shared".to_string())].into();
        let result = resolve_many(&blocks, &lookup);

        let contents: Vec<&str> = result.blocks.iter().map(|b| b.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "shared", "third"]);
        for (before, after) in blocks.iter().zip(&result.blocks) {
            assert_eq!(before.id, after.id);
            assert_eq!(before.reference_id, after.reference_id);
            assert_eq!(before.zone, after.zone);
            assert_eq!(before.order_key, after.order_key);
            assert_eq!(before.kind, after.kind);
        }
        assert!(result.dangling.is_empty());
        // input untouched
        assert_eq!(blocks[1].content, "");
    }

    #[test]
    fn test_canonical_ids_dedup() {
        let target = Uuid::new_v4();
        let other = Uuid::new_v4();
        let blocks = vec![
            Block::new_linked("w2", "note", Zone::Stable, 1.0, target),
            Block::new_linked("w3", "note", Zone::Stable, 1.0, target),
            Block::new_linked("w3", "note", Zone::Stable, 2.0, other),
            regular("w3", "plain", 3.0),
        ];
        let ids = canonical_ids(&blocks);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&target) && ids.contains(&other));
    }
}
