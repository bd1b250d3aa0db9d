use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use lb_core::{Block, WorkspaceSnapshot, allocate_at_end, export_json, import_json};

use crate::config::validate_workspace_id;
use crate::error::{Result, StoreError};
use crate::store::{Store, insert_block_on, max_order_on};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Store {
    /// Fully resolved, reference-free snapshot of a workspace.
    pub fn export_snapshot(&self, workspace_id: &str) -> Result<WorkspaceSnapshot> {
        let resolved = self.resolve_workspace(workspace_id)?;
        Ok(WorkspaceSnapshot::from_resolved(
            workspace_id,
            &resolved,
            unix_now(),
        ))
    }

    pub fn export_snapshot_json(&self, workspace_id: &str) -> Result<String> {
        let snapshot = self.export_snapshot(workspace_id)?;
        export_json(&snapshot)
            .map_err(|e| StoreError::InvalidData(format!("snapshot export failed: {e}")))
    }

    pub fn export_snapshot_file(&self, workspace_id: &str, path: &Path) -> Result<()> {
        let json = self.export_snapshot_json(workspace_id)?;
        fs::write(path, json).map_err(|e| {
            StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
        })
    }

    /// Recreate a snapshot's blocks in `workspace_id` as REGULAR blocks.
    ///
    /// Blocks are appended after anything the workspace already holds, one
    /// zone at a time, keeping the snapshot's relative order. Returns the
    /// created blocks.
    pub fn import_snapshot(
        &self,
        workspace_id: &str,
        snapshot: &WorkspaceSnapshot,
    ) -> Result<Vec<Block>> {
        validate_workspace_id(workspace_id)?;
        let tx = self.conn().unchecked_transaction()?;

        let mut ordered: Vec<_> = snapshot.blocks.iter().collect();
        ordered.sort_by(|a, b| {
            a.zone
                .cmp(&b.zone)
                .then_with(|| a.order_key.total_cmp(&b.order_key))
        });

        let mut created = Vec::with_capacity(ordered.len());
        for entry in ordered {
            let order_key = allocate_at_end(max_order_on(&tx, workspace_id, entry.zone)?);
            let mut block =
                Block::new_regular(workspace_id, &entry.kind, entry.zone, order_key, &entry.content);
            block.is_draft = entry.is_draft;
            insert_block_on(&tx, &block)?;
            created.push(block);
        }

        tx.commit()?;
        tracing::info!(
            workspace = workspace_id,
            source = %snapshot.workspace_id,
            blocks = created.len(),
            "imported snapshot"
        );
        Ok(created)
    }

    pub fn import_snapshot_str(&self, workspace_id: &str, json: &str) -> Result<Vec<Block>> {
        let snapshot = import_json(json).map_err(StoreError::InvalidData)?;
        self.import_snapshot(workspace_id, &snapshot)
    }

    pub fn import_snapshot_file(&self, workspace_id: &str, path: &Path) -> Result<Vec<Block>> {
        let json = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        self.import_snapshot_str(workspace_id, &json)
    }
}
