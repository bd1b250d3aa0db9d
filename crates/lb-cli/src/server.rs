use std::sync::Arc;

use lb_core::{Block, Message, Zone, import_json};
use lb_store::{BlockStore, NewBlock, Placement, StoreError};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone)]
pub struct LbServer {
    state: Arc<Mutex<BlockStore>>,
    tool_router: ToolRouter<Self>,
}

impl LbServer {
    pub fn new(store: BlockStore) -> Self {
        Self {
            state: Arc::new(Mutex::new(store)),
            tool_router: Self::tool_router(),
        }
    }

    /// Fold the WAL into the main file before the process exits.
    pub async fn checkpoint_wal(&self) {
        let state = self.state.lock().await;
        match state.store().checkpoint_truncate() {
            Ok(()) => tracing::info!("WAL checkpoint complete"),
            Err(e) => tracing::warn!("WAL checkpoint failed: {e}"),
        }
    }
}

/// Caller mistakes surface as invalid params, storage trouble as internal.
fn store_error(e: StoreError) -> McpError {
    if e.is_user_facing() {
        McpError::invalid_params(e.to_string(), None)
    } else {
        McpError::internal_error(e.to_string(), None)
    }
}

fn parse_id(field: &str, raw: &str) -> Result<Uuid, McpError> {
    Uuid::parse_str(raw.trim())
        .map_err(|e| McpError::invalid_params(format!("{field}: invalid UUID '{raw}': {e}"), None))
}

fn parse_opt_id(field: &str, raw: Option<&str>) -> Result<Option<Uuid>, McpError> {
    raw.map(|r| parse_id(field, r)).transpose()
}

fn parse_zone(raw: Option<&str>, default: Zone) -> Result<Zone, McpError> {
    match raw {
        None => Ok(default),
        Some(z) => z
            .parse::<Zone>()
            .map_err(|e| McpError::invalid_params(e.to_string(), None)),
    }
}

fn placement(before: Option<Uuid>, after: Option<Uuid>) -> Placement {
    if before.is_none() && after.is_none() {
        Placement::End
    } else {
        Placement::Between { before, after }
    }
}

fn block_json(block: &Block) -> serde_json::Value {
    serde_json::json!({
        "id": block.id,
        "workspace": block.workspace_id,
        "zone": block.zone,
        "kind": block.kind,
        "order_key": block.order_key,
        "linked": block.is_linked(),
        "reference_id": block.reference_id,
        "content": block.content,
        "tokens": block.token_count,
        "draft": block.is_draft,
    })
}

fn json_result(value: &serde_json::Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_default(),
    )])
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct CreateRequest {
    /// Workspace that owns the new block
    workspace: String,
    /// Block content
    content: String,
    /// permanent, stable or working (default: working)
    zone: Option<String>,
    /// Kind tag such as "note", "guideline" or "system_prompt"
    kind: Option<String>,
    /// Place after this sibling block
    before: Option<String>,
    /// Place before this sibling block
    after: Option<String>,
    /// Mark the block as a draft
    draft: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LinkRequest {
    /// Workspace receiving the linked block
    workspace: String,
    /// Block to link to. A linked block is followed to its own canonical.
    canonical_id: String,
    /// Zone for the new block (default: stable)
    zone: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ContentRequest {
    block_id: String,
    /// Replacement content
    content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct BlockRequest {
    block_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct MoveRequest {
    block_id: String,
    /// Target zone
    zone: String,
    /// Place after this sibling block
    before: Option<String>,
    /// Place before this sibling block
    after: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WorkspaceRequest {
    workspace: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct Turn {
    /// "user" or "assistant"
    role: String,
    content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AssembleRequest {
    workspace: String,
    /// The new user prompt, always the final message
    prompt: String,
    /// Prior conversation turns, oldest first
    history: Option<Vec<Turn>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AdvanceRequest {
    /// Workspace of the finished step
    from: String,
    /// Workspace of the next step
    to: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ImportRequest {
    /// Workspace to create the blocks in
    workspace: String,
    /// Snapshot JSON as produced by lb_export
    snapshot: serde_json::Value,
}

#[tool_router]
impl LbServer {
    #[tool(description = "Create a regular block in a workspace. Appends to the end of the zone unless before/after neighbors are given.")]
    async fn lb_create(
        &self,
        Parameters(req): Parameters<CreateRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let zone = parse_zone(req.zone.as_deref(), Zone::Working)?;
        let before = parse_opt_id("before", req.before.as_deref())?;
        let after = parse_opt_id("after", req.after.as_deref())?;
        let kind = req
            .kind
            .unwrap_or_else(|| state.config().default_kind.clone());

        let block = state
            .store()
            .create_block(
                &req.workspace,
                &NewBlock {
                    kind: &kind,
                    zone,
                    content: &req.content,
                    placement: placement(before, after),
                    is_draft: req.draft.unwrap_or(false),
                },
            )
            .map_err(store_error)?;
        Ok(json_result(&block_json(&block)))
    }

    #[tool(description = "Link a block into another workspace. The new block shows the canonical's content and edits to either side update the canonical.")]
    async fn lb_link(
        &self,
        Parameters(req): Parameters<LinkRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let canonical_id = parse_id("canonical_id", &req.canonical_id)?;
        let zone = parse_zone(req.zone.as_deref(), Zone::Stable)?;

        let block = state
            .store()
            .create_linked(&req.workspace, canonical_id, zone)
            .map_err(store_error)?;
        Ok(json_result(&block_json(&block)))
    }

    #[tool(description = "Edit a block's content. Editing a linked block edits its canonical, so every linked copy sees the change.")]
    async fn lb_edit(
        &self,
        Parameters(req): Parameters<ContentRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let id = parse_id("block_id", &req.block_id)?;
        let written = state.store().edit(id, &req.content).map_err(store_error)?;
        Ok(json_result(&serde_json::json!({
            "edited": written.id,
            "redirected": written.id != id,
            "tokens": written.token_count,
        })))
    }

    #[tool(description = "Detach a linked block: copy the canonical's current content into it and drop the link.")]
    async fn lb_unlink(
        &self,
        Parameters(req): Parameters<BlockRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let id = parse_id("block_id", &req.block_id)?;
        let block = state.store().unlink(id).map_err(store_error)?;
        Ok(json_result(&block_json(&block)))
    }

    #[tool(description = "Replace a regular block's content with a shorter version. Linked blocks must be unlinked first.")]
    async fn lb_compress(
        &self,
        Parameters(req): Parameters<ContentRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let id = parse_id("block_id", &req.block_id)?;
        let block = state
            .store()
            .compress(id, &req.content)
            .map_err(store_error)?;
        Ok(json_result(&block_json(&block)))
    }

    #[tool(description = "Move a block to another zone or position within its workspace. Link state is unchanged.")]
    async fn lb_move(
        &self,
        Parameters(req): Parameters<MoveRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let id = parse_id("block_id", &req.block_id)?;
        let zone = parse_zone(Some(&req.zone), Zone::Working)?;
        let before = parse_opt_id("before", req.before.as_deref())?;
        let after = parse_opt_id("after", req.after.as_deref())?;

        let block = state
            .store()
            .move_block(id, zone, placement(before, after))
            .map_err(store_error)?;
        Ok(json_result(&block_json(&block)))
    }

    #[tool(description = "Delete a block. Blocks linked to it in other workspaces keep a full copy of its content.")]
    async fn lb_delete(
        &self,
        Parameters(req): Parameters<BlockRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let id = parse_id("block_id", &req.block_id)?;
        let report = state.store().delete_block(id).map_err(store_error)?;
        Ok(json_result(&serde_json::json!({
            "deleted": id,
            "promoted": report.promoted,
        })))
    }

    #[tool(description = "Delete every block in a workspace. Links held by other workspaces are converted to full copies first.")]
    async fn lb_destroy_workspace(
        &self,
        Parameters(req): Parameters<WorkspaceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let report = state
            .store()
            .destroy_workspace(&req.workspace)
            .map_err(store_error)?;
        Ok(json_result(&serde_json::json!({
            "workspace": req.workspace,
            "deleted": report.deleted,
            "promoted": report.promoted,
        })))
    }

    #[tool(description = "List a workspace's blocks in zone order with their effective content.")]
    async fn lb_list(
        &self,
        Parameters(req): Parameters<WorkspaceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let blocks = state
            .store()
            .resolve_workspace(&req.workspace)
            .map_err(store_error)?;
        let items: Vec<_> = blocks.iter().map(block_json).collect();
        Ok(json_result(&serde_json::json!({
            "workspace": req.workspace,
            "blocks": items,
        })))
    }

    #[tool(description = "Assemble a workspace into a system prompt plus ordered messages: permanent, stable and working zones, then history, then the new prompt.")]
    async fn lb_assemble(
        &self,
        Parameters(req): Parameters<AssembleRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let history = req
            .history
            .map(|turns| {
                turns
                    .into_iter()
                    .map(|t| match t.role.trim().to_lowercase().as_str() {
                        "user" => Ok(Message::user(t.content)),
                        "assistant" => Ok(Message::assistant(t.content)),
                        other => Err(McpError::invalid_params(
                            format!("role must be 'user' or 'assistant', got '{other}'"),
                            None,
                        )),
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        let assembled = state
            .store()
            .assemble_workspace(&req.workspace, &req.prompt, history.as_deref())
            .map_err(store_error)?;
        let value = serde_json::to_value(&assembled)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(json_result(&value))
    }

    #[tool(description = "Advance a workflow: carry permanent and stable blocks into the next workspace as links, and working blocks as copies.")]
    async fn lb_advance(
        &self,
        Parameters(req): Parameters<AdvanceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let report = state
            .store()
            .advance_workspace(&req.from, &req.to)
            .map_err(store_error)?;
        Ok(json_result(&serde_json::json!({
            "from": req.from,
            "to": req.to,
            "linked": report.linked,
            "copied": report.copied,
        })))
    }

    #[tool(description = "Suggest existing blocks in other workspaces with identical content. Useful before creating a copy that could be a link instead.")]
    async fn lb_duplicates(
        &self,
        Parameters(req): Parameters<BlockRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let id = parse_id("block_id", &req.block_id)?;
        let dupes = state.store().suggest_duplicates(id).map_err(store_error)?;
        let items: Vec<_> = dupes
            .iter()
            .map(|b| serde_json::json!({ "id": b.id, "workspace": b.workspace_id, "zone": b.zone }))
            .collect();
        Ok(json_result(&serde_json::json!({ "duplicates": items })))
    }

    #[tool(description = "Export a workspace as a self-contained snapshot with all links resolved.")]
    async fn lb_export(
        &self,
        Parameters(req): Parameters<WorkspaceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let json = state
            .store()
            .export_snapshot_json(&req.workspace)
            .map_err(store_error)?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Create a workspace's blocks from a snapshot produced by lb_export. Imported blocks are independent copies.")]
    async fn lb_import(
        &self,
        Parameters(req): Parameters<ImportRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let json = serde_json::to_string(&req.snapshot)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let snapshot = import_json(&json).map_err(|e| McpError::invalid_params(e, None))?;

        let created = state
            .store()
            .import_snapshot(&req.workspace, &snapshot)
            .map_err(store_error)?;
        Ok(json_result(&serde_json::json!({
            "workspace": req.workspace,
            "imported": created.len(),
        })))
    }
}

#[tool_handler]
impl ServerHandler for LbServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Linked prompt blocks organized into workspaces.\n\n\
                 ZONES: permanent (rules, system prompt), stable (reference material), \
                 working (current task context). lb_assemble emits them in that order, \
                 followed by history and the new prompt.\n\n\
                 SHARING: lb_link reuses a block from another workspace without copying it. \
                 Editing either side updates the one canonical copy. lb_unlink detaches a \
                 copy; deleting a canonical never empties the blocks linked to it.\n\n\
                 WORKFLOWS: lb_advance carries a step's permanent and stable blocks forward \
                 as links and its working blocks as copies."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
