//! Linked prompt blocks: the pure half.
//!
//! Workspaces hold ordered text blocks in three zones. A block may delegate
//! its content to a canonical block in another workspace (one hop, never
//! more). This crate orders, fingerprints, resolves and assembles blocks.
//!
//! Zero I/O. Persistence and the reference lifecycle live in `lb-store`.

pub mod assemble;
pub mod block;
pub mod carry;
pub mod constants;
pub mod hash;
pub mod position;
pub mod resolve;
pub mod snapshot;
pub mod tokenizer;

pub use assemble::{
    AssembledPrompt, Message, Role, ZoneMetrics, ZoneStats, assemble, extract_system_prompt,
};
pub use block::{Block, BlockState, ParseZoneError, Zone, hash_for};
pub use carry::{CarryAction, carry_action};
pub use constants::{
    BLOCK_SEPARATOR, DEFAULT_KIND, FIRST_ORDER_KEY, MIN_ORDER_GAP, NO_HASH, STABLE_LABEL,
    SYSTEM_PROMPT_KIND, WORKING_LABEL,
};
pub use hash::{content_hash, is_matchable};
pub use position::{allocate_at_end, allocate_between, needs_rebalance, rebalance};
pub use resolve::{CanonicalLookup, Resolution, canonical_ids, resolve_many, resolve_one};
pub use snapshot::{SNAPSHOT_VERSION, SnapshotBlock, WorkspaceSnapshot, export_json, import_json};
pub use tokenizer::estimate_tokens;
