use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use uuid::Uuid;

use lb_core::{
    AssembledPrompt, Block, CanonicalLookup, Message, Zone, assemble, canonical_ids, is_matchable,
    resolve_many,
};

use crate::error::{Result, StoreError};
use crate::schema;

const BLOCK_COLUMNS: &str = "id, workspace_id, content, kind, zone, order_key, reference_id, content_hash, token_count, is_draft";

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, schema::DEFAULT_BUSY_TIMEOUT_MS)
    }

    pub fn open_with_timeout(path: &Path, busy_timeout_ms: u32) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn, busy_timeout_ms)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn, schema::DEFAULT_BUSY_TIMEOUT_MS)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Fold the WAL back into the main database file.
    pub fn checkpoint_truncate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    // --- Raw reads ---

    pub fn get_block(&self, id: Uuid) -> Result<Option<Block>> {
        get_block_on(&self.conn, id)
    }

    /// A workspace's blocks as stored (LINKED blocks have empty content),
    /// in zone then order-key order.
    pub fn workspace_blocks(&self, workspace_id: &str) -> Result<Vec<Block>> {
        workspace_blocks_on(&self.conn, workspace_id)
    }

    /// Every workspace that owns at least one block, with its block count.
    pub fn workspaces(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT workspace_id, COUNT(*) FROM blocks GROUP BY workspace_id ORDER BY workspace_id",
        )?;
        stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?
        .collect::<std::result::Result<_, _>>()
        .map_err(StoreError::from)
    }

    pub fn block_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Blocks in any workspace whose `reference_id` is `canonical_id`.
    pub fn references_to(&self, canonical_id: Uuid) -> Result<Vec<Block>> {
        references_to_on(&self.conn, canonical_id)
    }

    // --- Resolved reads ---

    /// A workspace's blocks with effective content filled in.
    ///
    /// Block fetch, canonical prefetch and resolution run inside one read
    /// transaction so they observe a single snapshot.
    pub fn resolve_workspace(&self, workspace_id: &str) -> Result<Vec<Block>> {
        let tx = self.conn.unchecked_transaction()?;
        let blocks = workspace_blocks_on(&tx, workspace_id)?;
        let resolved = resolve_on(&tx, &blocks)?;
        tx.commit()?;
        Ok(resolved)
    }

    /// Effective content of a single block.
    pub fn resolve_block(&self, id: Uuid) -> Result<String> {
        let tx = self.conn.unchecked_transaction()?;
        let block = require_block_on(&tx, id)?;
        let mut resolved = resolve_on(&tx, std::slice::from_ref(&block))?;
        tx.commit()?;
        Ok(resolved.pop().map(|b| b.content).unwrap_or_default())
    }

    /// Resolve and assemble a workspace into an ordered message list.
    pub fn assemble_workspace(
        &self,
        workspace_id: &str,
        prompt: &str,
        history: Option<&[Message]>,
    ) -> Result<AssembledPrompt> {
        let resolved = self.resolve_workspace(workspace_id)?;
        Ok(assemble(&resolved, prompt, history))
    }

    // --- Duplicate suggestions ---

    /// REGULAR blocks carrying `hash` outside `exclude_workspace`.
    /// Purely advisory; never consulted when resolving content.
    pub fn find_duplicates(&self, hash: &str, exclude_workspace: &str) -> Result<Vec<Block>> {
        if !is_matchable(hash) {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks
             WHERE content_hash = ?1 AND workspace_id != ?2 AND reference_id IS NULL
             ORDER BY workspace_id, zone, order_key, id"
        );
        query_blocks(&self.conn, &sql, params![hash, exclude_workspace])
    }

    /// Duplicates of an existing block's content in other workspaces.
    pub fn suggest_duplicates(&self, block_id: Uuid) -> Result<Vec<Block>> {
        let block = require_block_on(&self.conn, block_id)?;
        match block.content_hash {
            Some(hash) => self.find_duplicates(&hash, &block.workspace_id),
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Primitive operations on any connection or open transaction
// ---------------------------------------------------------------------------

type RawBlock = (
    String,
    String,
    String,
    String,
    String,
    f64,
    Option<String>,
    Option<String>,
    i64,
    bool,
);

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawBlock> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get::<_, i32>(9)? != 0,
    ))
}

fn from_raw(raw: RawBlock) -> Result<Block> {
    let (id, workspace_id, content, kind, zone, order_key, reference_id, content_hash, tokens, is_draft) =
        raw;
    let zone: Zone = zone
        .parse()
        .map_err(|e| StoreError::InvalidData(format!("block {id}: {e}")))?;
    let reference_id = reference_id.as_deref().map(parse_uuid).transpose()?;
    Ok(Block {
        id: parse_uuid(&id)?,
        workspace_id,
        content,
        kind,
        zone,
        order_key,
        reference_id,
        content_hash,
        token_count: tokens.max(0) as usize,
        is_draft,
    })
}

fn query_blocks(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Block>> {
    let mut stmt = conn.prepare(sql)?;
    let raws = stmt
        .query_map(params, read_raw)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    raws.into_iter().map(from_raw).collect()
}

pub(crate) fn get_block_on(conn: &Connection, id: Uuid) -> Result<Option<Block>> {
    let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE id = ?1");
    let raw = conn
        .query_row(&sql, [id.to_string()], read_raw)
        .optional()?;
    raw.map(from_raw).transpose()
}

pub(crate) fn require_block_on(conn: &Connection, id: Uuid) -> Result<Block> {
    get_block_on(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("block {id}")))
}

pub(crate) fn workspace_blocks_on(conn: &Connection, workspace_id: &str) -> Result<Vec<Block>> {
    let sql = format!(
        "SELECT {BLOCK_COLUMNS} FROM blocks WHERE workspace_id = ?1
         ORDER BY CASE zone WHEN 'permanent' THEN 0 WHEN 'stable' THEN 1 ELSE 2 END, order_key, id"
    );
    query_blocks(conn, &sql, [workspace_id])
}

pub(crate) fn zone_blocks_on(conn: &Connection, workspace_id: &str, zone: Zone) -> Result<Vec<Block>> {
    let sql = format!(
        "SELECT {BLOCK_COLUMNS} FROM blocks WHERE workspace_id = ?1 AND zone = ?2
         ORDER BY order_key, id"
    );
    query_blocks(conn, &sql, params![workspace_id, zone.as_str()])
}

pub(crate) fn references_to_on(conn: &Connection, canonical_id: Uuid) -> Result<Vec<Block>> {
    let sql = format!(
        "SELECT {BLOCK_COLUMNS} FROM blocks WHERE reference_id = ?1 ORDER BY workspace_id, id"
    );
    query_blocks(conn, &sql, [canonical_id.to_string()])
}

/// Blocks outside `workspace_id` that reference a block owned by it.
pub(crate) fn external_references_on(conn: &Connection, workspace_id: &str) -> Result<Vec<Block>> {
    let sql = format!(
        "SELECT {BLOCK_COLUMNS} FROM blocks
         WHERE workspace_id != ?1
           AND reference_id IN (SELECT id FROM blocks WHERE workspace_id = ?1)
         ORDER BY workspace_id, id"
    );
    query_blocks(conn, &sql, [workspace_id])
}

pub(crate) fn max_order_on(conn: &Connection, workspace_id: &str, zone: Zone) -> Result<Option<f64>> {
    let max: Option<f64> = conn.query_row(
        "SELECT MAX(order_key) FROM blocks WHERE workspace_id = ?1 AND zone = ?2",
        params![workspace_id, zone.as_str()],
        |row| row.get(0),
    )?;
    Ok(max)
}

pub(crate) fn insert_block_on(conn: &Connection, block: &Block) -> Result<()> {
    conn.execute(
        "INSERT INTO blocks (id, workspace_id, content, kind, zone, order_key, reference_id, content_hash, token_count, is_draft)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            block.id.to_string(),
            block.workspace_id,
            block.content,
            block.kind,
            block.zone.as_str(),
            block.order_key,
            block.reference_id.map(|id| id.to_string()),
            block.content_hash,
            block.token_count as i64,
            block.is_draft as i32,
        ],
    )?;
    Ok(())
}

/// Write `block`'s content fields and clear its reference in one statement.
/// The caller has already refreshed hash and token count via `set_content`.
pub(crate) fn write_content_on(conn: &Connection, block: &Block) -> Result<()> {
    let rows = conn.execute(
        "UPDATE blocks SET content = ?1, content_hash = ?2, token_count = ?3, reference_id = NULL
         WHERE id = ?4",
        params![
            block.content,
            block.content_hash,
            block.token_count as i64,
            block.id.to_string(),
        ],
    )?;
    if rows == 0 {
        return Err(StoreError::NotFound(format!("block {}", block.id)));
    }
    Ok(())
}

pub(crate) fn write_position_on(conn: &Connection, id: Uuid, zone: Zone, order_key: f64) -> Result<()> {
    let rows = conn.execute(
        "UPDATE blocks SET zone = ?1, order_key = ?2 WHERE id = ?3",
        params![zone.as_str(), order_key, id.to_string()],
    )?;
    if rows == 0 {
        return Err(StoreError::NotFound(format!("block {id}")));
    }
    Ok(())
}

pub(crate) fn write_draft_on(conn: &Connection, id: Uuid, is_draft: bool) -> Result<()> {
    let rows = conn.execute(
        "UPDATE blocks SET is_draft = ?1 WHERE id = ?2",
        params![is_draft as i32, id.to_string()],
    )?;
    if rows == 0 {
        return Err(StoreError::NotFound(format!("block {id}")));
    }
    Ok(())
}

pub(crate) fn delete_block_on(conn: &Connection, id: Uuid) -> Result<usize> {
    Ok(conn.execute("DELETE FROM blocks WHERE id = ?1", [id.to_string()])?)
}

/// One batched fetch of canonical contents for `ids`.
pub(crate) fn canonical_lookup_on(conn: &Connection, ids: &[Uuid]) -> Result<CanonicalLookup> {
    let mut lookup = CanonicalLookup::with_capacity(ids.len());
    if ids.is_empty() {
        return Ok(lookup);
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT id, content FROM blocks WHERE id IN ({placeholders})");
    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<(String, String)> = stmt
        .query_map(params_from_iter(ids.iter().map(|id| id.to_string())), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<std::result::Result<_, _>>()?;
    for (id, content) in rows {
        lookup.insert(parse_uuid(&id)?, content);
    }
    Ok(lookup)
}

/// Prefetch canonicals for `blocks` and resolve them.
pub(crate) fn resolve_on(conn: &Connection, blocks: &[Block]) -> Result<Vec<Block>> {
    let ids = canonical_ids(blocks);
    let lookup = canonical_lookup_on(conn, &ids)?;
    let resolution = resolve_many(blocks, &lookup);
    for id in &resolution.dangling {
        tracing::warn!(canonical = %id, "dangling reference resolved to empty content");
    }
    Ok(resolution.blocks)
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("invalid UUID '{s}': {e}")))
}
