//! Self-contained workspace snapshots for templates and exports.
//!
//! A snapshot is built from *resolved* blocks and has no reference field,
//! so a saved artifact never depends on a canonical that may later vanish.

use serde::{Deserialize, Serialize};

use crate::block::{Block, Zone};

pub const SNAPSHOT_VERSION: &str = "1";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBlock {
    pub kind: String,
    pub zone: Zone,
    #[serde(rename = "orderKey")]
    pub order_key: f64,
    pub content: String,
    #[serde(rename = "isDraft", default)]
    pub is_draft: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub version: String,
    #[serde(rename = "workspaceId")]
    pub workspace_id: String,
    /// Unix seconds.
    #[serde(rename = "exportedAt", default)]
    pub exported_at: u64,
    pub blocks: Vec<SnapshotBlock>,
}

impl WorkspaceSnapshot {
    /// Snapshot of already-resolved blocks, in zone then order-key order.
    pub fn from_resolved(workspace_id: &str, resolved: &[Block], exported_at: u64) -> Self {
        let mut sorted: Vec<&Block> = resolved.iter().collect();
        sorted.sort_by(|a, b| {
            a.zone
                .cmp(&b.zone)
                .then_with(|| a.order_key.total_cmp(&b.order_key))
                .then_with(|| a.id.cmp(&b.id))
        });

        Self {
            version: SNAPSHOT_VERSION.to_string(),
            workspace_id: workspace_id.to_string(),
            exported_at,
            blocks: sorted
                .into_iter()
                .map(|b| SnapshotBlock {
                    kind: b.kind.clone(),
                    zone: b.zone,
                    order_key: b.order_key,
                    content: b.content.clone(),
                    is_draft: b.is_draft,
                })
                .collect(),
        }
    }
}

pub fn export_json(snapshot: &WorkspaceSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(snapshot)
}

pub fn import_json(json: &str) -> Result<WorkspaceSnapshot, String> {
    let snapshot: WorkspaceSnapshot =
        serde_json::from_str(json).map_err(|e| format!("invalid snapshot JSON: {e}"))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(format!(
            "unsupported snapshot version '{}' (expected {SNAPSHOT_VERSION})",
            snapshot.version
        ));
    }
    Ok(snapshot)
}
