mod server;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lb_core::{AssembledPrompt, Block, Role, Zone};
use lb_store::{BlockStore, NewBlock, Placement};
use rmcp::{ServiceExt, transport::stdio};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "lb", about = "Linked prompt blocks: CLI and MCP server")]
struct Cli {
    /// Data directory (default: $LB_DATA_DIR, then ~/.linkblocks)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio transport
    Serve,

    /// Create a block
    Add {
        workspace: String,
        content: String,
        #[arg(long, default_value = "working")]
        zone: Zone,
        /// Kind tag (default from config.toml)
        #[arg(long)]
        kind: Option<String>,
        /// Insert after this block
        #[arg(long)]
        before: Option<Uuid>,
        /// Insert before this block
        #[arg(long)]
        after: Option<Uuid>,
        #[arg(long)]
        draft: bool,
    },

    /// Link an existing block into a workspace
    Link {
        workspace: String,
        canonical: Uuid,
        #[arg(long, default_value = "stable")]
        zone: Zone,
    },

    /// Replace a block's content (linked blocks edit their canonical)
    Edit { block: Uuid, content: String },

    /// Turn a linked block into an independent copy
    Unlink { block: Uuid },

    /// Replace a regular block's content with a shorter version
    Compress { block: Uuid, content: String },

    /// Delete a block, promoting anything linked to it
    Rm { block: Uuid },

    /// Move a block to another zone or position
    Mv {
        block: Uuid,
        zone: Zone,
        #[arg(long)]
        before: Option<Uuid>,
        #[arg(long)]
        after: Option<Uuid>,
    },

    /// Set or clear a block's draft flag
    Draft {
        block: Uuid,
        #[arg(long)]
        clear: bool,
    },

    /// Delete a workspace and every block in it
    Destroy { workspace: String },

    /// List a workspace's blocks (→ marks linked blocks)
    List { workspace: String },

    /// Show one block with its effective content
    Show { block: Uuid },

    /// Assemble a workspace and prompt into messages
    Assemble {
        workspace: String,
        prompt: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Carry a workflow step's blocks into the next step
    Advance { from: String, to: String },

    /// Blocks in other workspaces with identical content
    Dupes { block: Uuid },

    /// Export a resolved workspace snapshot to a JSON file
    Export { workspace: String, path: PathBuf },

    /// Import a snapshot JSON file into a workspace
    Import { workspace: String, path: PathBuf },

    /// Renumber a zone's order keys once inserts have crowded them
    Rebalance {
        workspace: String,
        zone: Zone,
        /// Renumber even when the keys are still well spaced
        #[arg(long)]
        force: bool,
    },

    /// List workspaces with their block counts
    Workspaces,
}

fn open_store(cli: &Cli) -> Result<BlockStore> {
    BlockStore::open(cli.data_dir.as_deref()).context("failed to open block store")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn placement(before: Option<Uuid>, after: Option<Uuid>) -> Placement {
    if before.is_none() && after.is_none() {
        Placement::End
    } else {
        Placement::Between { before, after }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve => cmd_serve(&cli).await,
        Commands::Add {
            workspace,
            content,
            zone,
            kind,
            before,
            after,
            draft,
        } => cmd_add(
            &cli,
            workspace,
            content,
            *zone,
            kind.as_deref(),
            placement(*before, *after),
            *draft,
        ),
        Commands::Link {
            workspace,
            canonical,
            zone,
        } => cmd_link(&cli, workspace, *canonical, *zone),
        Commands::Edit { block, content } => cmd_edit(&cli, *block, content),
        Commands::Unlink { block } => cmd_unlink(&cli, *block),
        Commands::Compress { block, content } => cmd_compress(&cli, *block, content),
        Commands::Rm { block } => cmd_rm(&cli, *block),
        Commands::Mv {
            block,
            zone,
            before,
            after,
        } => cmd_mv(&cli, *block, *zone, placement(*before, *after)),
        Commands::Draft { block, clear } => cmd_draft(&cli, *block, !*clear),
        Commands::Destroy { workspace } => cmd_destroy(&cli, workspace),
        Commands::List { workspace } => cmd_list(&cli, workspace),
        Commands::Show { block } => cmd_show(&cli, *block),
        Commands::Assemble {
            workspace,
            prompt,
            json,
        } => cmd_assemble(&cli, workspace, prompt, *json),
        Commands::Advance { from, to } => cmd_advance(&cli, from, to),
        Commands::Dupes { block } => cmd_dupes(&cli, *block),
        Commands::Export { workspace, path } => cmd_export(&cli, workspace, path),
        Commands::Import { workspace, path } => cmd_import(&cli, workspace, path),
        Commands::Rebalance {
            workspace,
            zone,
            force,
        } => cmd_rebalance(&cli, workspace, *zone, *force),
        Commands::Workspaces => cmd_workspaces(&cli),
    }
}

async fn cmd_serve(cli: &Cli) -> Result<()> {
    let store = open_store(cli)?;
    tracing::info!("starting MCP server on {}", store.data_dir().display());

    let server = server::LbServer::new(store);
    let service = match server.clone().serve(stdio()).await {
        Ok(service) => service,
        Err(e) => {
            // stdin closed before the handshake completed
            tracing::info!("MCP session ended before initialization: {e}");
            server.checkpoint_wal().await;
            return Ok(());
        }
    };

    tokio::select! {
        result = service.waiting() => {
            result.context("MCP server task failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
            server.checkpoint_wal().await;
            // the blocking stdin read cannot be cancelled; runtime shutdown
            // would wait on it
            std::process::exit(0);
        }
    }

    server.checkpoint_wal().await;
    Ok(())
}

/// One-line preview of a block's content.
fn preview(content: &str, width: usize) -> String {
    let line = content.lines().next().unwrap_or("");
    if line.chars().count() > width {
        let cut: String = line.chars().take(width.saturating_sub(1)).collect();
        format!("{cut}…")
    } else if content.lines().nth(1).is_some() {
        format!("{line} …")
    } else {
        line.to_string()
    }
}

fn print_block_line(block: &Block) {
    let marker = if block.is_linked() { "→" } else { " " };
    let draft = if block.is_draft { " (draft)" } else { "" };
    println!(
        "{:<9} {:>8.3} {} {} [{}]{} {}",
        block.zone.as_str(),
        block.order_key,
        block.id,
        marker,
        block.kind,
        draft,
        preview(&block.content, 60)
    );
}

fn cmd_add(
    cli: &Cli,
    workspace: &str,
    content: &str,
    zone: Zone,
    kind: Option<&str>,
    placement: Placement,
    draft: bool,
) -> Result<()> {
    let bs = open_store(cli)?;
    let kind = kind.unwrap_or(bs.config().default_kind.as_str());
    let block = bs
        .store()
        .create_block(
            workspace,
            &NewBlock {
                kind,
                zone,
                content,
                placement,
                is_draft: draft,
            },
        )
        .context("failed to create block")?;
    println!("{}", block.id);
    Ok(())
}

fn cmd_link(cli: &Cli, workspace: &str, canonical: Uuid, zone: Zone) -> Result<()> {
    let bs = open_store(cli)?;
    let block = bs
        .store()
        .create_linked(workspace, canonical, zone)
        .context("failed to link block")?;
    let target = block.reference_id.unwrap_or(canonical);
    if target != canonical {
        eprintln!("{canonical} is linked; linking to its canonical {target}");
    }
    println!("{}", block.id);
    Ok(())
}

fn cmd_edit(cli: &Cli, block: Uuid, content: &str) -> Result<()> {
    let bs = open_store(cli)?;
    let written = bs
        .store()
        .edit(block, content)
        .context("failed to edit block")?;
    if written.id != block {
        println!("edited canonical {} (via {block})", written.id);
    } else {
        println!("edited {block}");
    }
    Ok(())
}

fn cmd_unlink(cli: &Cli, block: Uuid) -> Result<()> {
    let bs = open_store(cli)?;
    let unlinked = bs.store().unlink(block).context("failed to unlink block")?;
    println!("unlinked {} ({} tokens)", unlinked.id, unlinked.token_count);
    Ok(())
}

fn cmd_compress(cli: &Cli, block: Uuid, content: &str) -> Result<()> {
    let bs = open_store(cli)?;
    let before = bs
        .store()
        .get_block(block)
        .context("failed to load block")?
        .map(|b| b.token_count)
        .unwrap_or(0);
    let compressed = bs
        .store()
        .compress(block, content)
        .context("failed to compress block")?;
    println!(
        "compressed {}: {before} → {} tokens",
        compressed.id, compressed.token_count
    );
    Ok(())
}

fn cmd_rm(cli: &Cli, block: Uuid) -> Result<()> {
    let bs = open_store(cli)?;
    let report = bs
        .store()
        .delete_block(block)
        .context("failed to delete block")?;
    println!("deleted {block}, promoted {} linked block(s)", report.promoted);
    Ok(())
}

fn cmd_mv(cli: &Cli, block: Uuid, zone: Zone, placement: Placement) -> Result<()> {
    let bs = open_store(cli)?;
    let moved = bs
        .store()
        .move_block(block, zone, placement)
        .context("failed to move block")?;
    println!("moved {} to {} @ {}", moved.id, moved.zone, moved.order_key);
    Ok(())
}

fn cmd_draft(cli: &Cli, block: Uuid, is_draft: bool) -> Result<()> {
    let bs = open_store(cli)?;
    bs.store()
        .set_draft(block, is_draft)
        .context("failed to update draft flag")?;
    println!("{block} draft={is_draft}");
    Ok(())
}

fn cmd_destroy(cli: &Cli, workspace: &str) -> Result<()> {
    let bs = open_store(cli)?;
    let report = bs
        .store()
        .destroy_workspace(workspace)
        .context("failed to destroy workspace")?;
    println!(
        "destroyed {workspace}: {} block(s) deleted, {} linked block(s) promoted",
        report.deleted, report.promoted
    );
    Ok(())
}

fn cmd_list(cli: &Cli, workspace: &str) -> Result<()> {
    let bs = open_store(cli)?;
    let blocks = bs
        .store()
        .resolve_workspace(workspace)
        .context("failed to load workspace")?;
    if blocks.is_empty() {
        println!("(no blocks in {workspace})");
        return Ok(());
    }
    for block in &blocks {
        print_block_line(block);
    }
    Ok(())
}

fn cmd_show(cli: &Cli, id: Uuid) -> Result<()> {
    let bs = open_store(cli)?;
    let block = bs
        .store()
        .get_block(id)
        .context("failed to load block")?
        .with_context(|| format!("block {id} not found"))?;
    let content = bs
        .store()
        .resolve_block(id)
        .context("failed to resolve block")?;

    println!("id:         {}", block.id);
    println!("workspace:  {}", block.workspace_id);
    println!("zone:       {}", block.zone);
    println!("kind:       {}", block.kind);
    println!("order_key:  {}", block.order_key);
    match block.reference_id {
        Some(canonical) => println!("linked:     → {canonical}"),
        None => println!("linked:     no"),
    }
    println!(
        "hash:       {}",
        block.content_hash.as_deref().unwrap_or(lb_core::NO_HASH)
    );
    println!("tokens:     {}", lb_core::estimate_tokens(&content));
    println!("draft:      {}", block.is_draft);
    println!();
    println!("{content}");
    Ok(())
}

fn print_assembled(assembled: &AssembledPrompt) {
    if let Some(system) = &assembled.system_prompt {
        println!("=== system ===");
        println!("{system}");
        println!();
    }
    for message in &assembled.messages {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        println!("=== {role} ===");
        println!("{}", message.content);
        println!();
    }
}

fn cmd_assemble(cli: &Cli, workspace: &str, prompt: &str, json: bool) -> Result<()> {
    let bs = open_store(cli)?;
    let assembled = bs
        .store()
        .assemble_workspace(workspace, prompt, None)
        .context("failed to assemble workspace")?;

    if json {
        let out = serde_json::to_string_pretty(&assembled).context("failed to serialize")?;
        println!("{out}");
    } else {
        print_assembled(&assembled);
    }

    if cli.verbose {
        let m = &assembled.metrics;
        eprintln!(
            "--- tokens: permanent={}, stable={}, working={}, total={} ---",
            m.permanent.tokens,
            m.stable.tokens,
            m.working.tokens,
            m.total_tokens()
        );
    }
    Ok(())
}

fn cmd_advance(cli: &Cli, from: &str, to: &str) -> Result<()> {
    let bs = open_store(cli)?;
    let report = bs
        .store()
        .advance_workspace(from, to)
        .context("failed to advance workspace")?;
    println!(
        "advanced {from} → {to}: {} linked, {} copied",
        report.linked, report.copied
    );
    Ok(())
}

fn cmd_dupes(cli: &Cli, block: Uuid) -> Result<()> {
    let bs = open_store(cli)?;
    let dupes = bs
        .store()
        .suggest_duplicates(block)
        .context("failed to look up duplicates")?;
    if dupes.is_empty() {
        println!("(no duplicates)");
    }
    for d in &dupes {
        println!("{} {} {}", d.workspace_id, d.zone, d.id);
    }
    Ok(())
}

fn cmd_export(cli: &Cli, workspace: &str, path: &Path) -> Result<()> {
    let bs = open_store(cli)?;
    bs.store()
        .export_snapshot_file(workspace, path)
        .context("failed to export snapshot")?;
    println!("exported {workspace} to {}", path.display());
    Ok(())
}

fn cmd_import(cli: &Cli, workspace: &str, path: &Path) -> Result<()> {
    let bs = open_store(cli)?;
    let created = bs
        .store()
        .import_snapshot_file(workspace, path)
        .context("failed to import snapshot")?;
    println!(
        "imported {} block(s) into {workspace} from {}",
        created.len(),
        path.display()
    );
    Ok(())
}

fn cmd_rebalance(cli: &Cli, workspace: &str, zone: Zone, force: bool) -> Result<()> {
    let bs = open_store(cli)?;
    match bs
        .store()
        .rebalance_zone(workspace, zone, force)
        .context("failed to rebalance zone")?
    {
        Some(changed) => println!("rebalanced {workspace}/{zone}: {changed} key(s) rewritten"),
        None => println!("{workspace}/{zone}: keys well spaced, no rebalance needed"),
    }
    Ok(())
}

fn cmd_workspaces(cli: &Cli) -> Result<()> {
    let bs = open_store(cli)?;
    let workspaces = bs.store().workspaces().context("failed to list workspaces")?;
    if workspaces.is_empty() {
        println!("(no workspaces)");
    }
    for (id, count) in workspaces {
        println!("{id}\t{count}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdefghijkl", 5), "abcd…");
        assert_eq!(preview("first\nsecond", 20), "first …");
        assert_eq!(preview("", 10), "");
    }

    #[test]
    fn test_placement_defaults_to_end() {
        assert_eq!(placement(None, None), Placement::End);
        let id = Uuid::new_v4();
        assert_eq!(
            placement(Some(id), None),
            Placement::Between {
                before: Some(id),
                after: None
            }
        );
    }

    #[test]
    fn test_cli_parses_zone() {
        let cli = Cli::try_parse_from(["lb", "add", "w1", "text", "--zone", "Permanent"]).unwrap();
        match cli.command {
            Commands::Add { zone, .. } => assert_eq!(zone, Zone::Permanent),
            _ => panic!("expected add"),
        }
        assert!(Cli::try_parse_from(["lb", "add", "w1", "text", "--zone", "archive"]).is_err());
    }
}
