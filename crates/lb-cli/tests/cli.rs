//! CLI command integration tests.
//! Each test uses a temp directory via LB_DATA_DIR for full isolation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn lb_cmd(data_dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("lb").unwrap();
    cmd.env("LB_DATA_DIR", data_dir.path());
    cmd
}

/// Run a command that prints a block id and return it.
fn run_for_id(dir: &TempDir, args: &[&str]) -> String {
    let output = lb_cmd(dir).args(args).output().unwrap();
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn add(dir: &TempDir, workspace: &str, zone: &str, content: &str) -> String {
    run_for_id(dir, &["add", workspace, content, "--zone", zone])
}

#[test]
fn workspaces_fresh_db() {
    let dir = TempDir::new().unwrap();
    lb_cmd(&dir)
        .arg("workspaces")
        .assert()
        .success()
        .stdout(predicate::str::contains("(no workspaces)"));
}

#[test]
fn add_then_list() {
    let dir = TempDir::new().unwrap();
    let id = add(&dir, "w1", "stable", "Reference doc body");
    assert_eq!(id.len(), 36, "add should print a UUID, got {id}");

    lb_cmd(&dir)
        .args(["list", "w1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()))
        .stdout(predicate::str::contains("stable"))
        .stdout(predicate::str::contains("[note]"))
        .stdout(predicate::str::contains("Reference doc body"));

    lb_cmd(&dir)
        .arg("workspaces")
        .assert()
        .success()
        .stdout(predicate::str::contains("w1\t1"));
}

#[test]
fn link_edit_redirects_to_canonical() {
    let dir = TempDir::new().unwrap();
    let x = add(&dir, "w1", "permanent", "Guideline v1");
    let y = run_for_id(&dir, &["link", "w2", &x, "--zone", "permanent"]);

    lb_cmd(&dir)
        .args(["list", "w2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("→"))
        .stdout(predicate::str::contains("Guideline v1"));

    lb_cmd(&dir)
        .args(["edit", &y, "Guideline v2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("edited canonical {x}")));

    lb_cmd(&dir)
        .args(["show", &x])
        .assert()
        .success()
        .stdout(predicate::str::contains("Guideline v2"));
    lb_cmd(&dir)
        .args(["show", &y])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("linked:     → {x}")))
        .stdout(predicate::str::contains("Guideline v2"));
}

#[test]
fn rm_canonical_promotes_links() {
    let dir = TempDir::new().unwrap();
    let x = add(&dir, "w1", "stable", "Doc");
    let y = run_for_id(&dir, &["link", "w2", &x]);

    lb_cmd(&dir)
        .args(["rm", &x])
        .assert()
        .success()
        .stdout(predicate::str::contains("promoted 1"));

    lb_cmd(&dir)
        .args(["show", &y])
        .assert()
        .success()
        .stdout(predicate::str::contains("linked:     no"))
        .stdout(predicate::str::contains("Doc"));
}

#[test]
fn destroy_workspace_keeps_external_copies() {
    let dir = TempDir::new().unwrap();
    let x = add(&dir, "w1", "permanent", "Shared rules");
    run_for_id(&dir, &["link", "w2", &x]);
    add(&dir, "w1", "working", "scratch");

    lb_cmd(&dir)
        .args(["destroy", "w1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 block(s) deleted"))
        .stdout(predicate::str::contains("1 linked block(s) promoted"));

    lb_cmd(&dir)
        .args(["list", "w2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Shared rules"))
        .stdout(predicate::str::contains("→").not());
}

#[test]
fn unlink_regular_fails() {
    let dir = TempDir::new().unwrap();
    let x = add(&dir, "w1", "stable", "text");
    lb_cmd(&dir)
        .args(["unlink", &x])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not linked"));
}

#[test]
fn compress_linked_fails() {
    let dir = TempDir::new().unwrap();
    let x = add(&dir, "w1", "stable", "long text here");
    let y = run_for_id(&dir, &["link", "w2", &x]);
    lb_cmd(&dir)
        .args(["compress", &y, "short"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unlink before compressing"));
}

#[test]
fn link_to_missing_block_fails() {
    let dir = TempDir::new().unwrap();
    lb_cmd(&dir)
        .args(["link", "w2", "00000000-0000-0000-0000-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn invalid_zone_rejected() {
    let dir = TempDir::new().unwrap();
    lb_cmd(&dir)
        .args(["add", "w1", "x", "--zone", "archive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown zone"));
}

#[test]
fn assemble_text_output() {
    let dir = TempDir::new().unwrap();
    run_for_id(
        &dir,
        &["add", "w1", "You are terse.", "--zone", "permanent", "--kind", "system_prompt"],
    );
    add(&dir, "w1", "stable", "API docs");
    add(&dir, "w1", "working", "Current diff");

    lb_cmd(&dir)
        .args(["assemble", "w1", "Review it"])
        .assert()
        .success()
        .stdout(predicate::str::contains("=== system ===\nYou are terse."))
        .stdout(predicate::str::contains("Reference Material:\n\nAPI docs"))
        .stdout(predicate::str::contains("Current Context:\n\nCurrent diff"))
        .stdout(predicate::str::contains("=== user ===\nReview it"));
}

#[test]
fn assemble_json_is_deterministic() {
    let dir = TempDir::new().unwrap();
    add(&dir, "w1", "permanent", "Rule");
    add(&dir, "w1", "stable", "Ref");

    let first = lb_cmd(&dir)
        .args(["assemble", "w1", "go", "--json"])
        .output()
        .unwrap();
    let second = lb_cmd(&dir)
        .args(["assemble", "w1", "go", "--json"])
        .output()
        .unwrap();
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);

    let json: serde_json::Value = serde_json::from_slice(&first.stdout).unwrap();
    assert!(json["system_prompt"].is_null());
    assert_eq!(json["messages"].as_array().unwrap().len(), 3);
    assert_eq!(json["messages"][0]["role"], "user");
    assert_eq!(json["messages"][2]["content"], "go");
}

#[test]
fn advance_links_and_copies() {
    let dir = TempDir::new().unwrap();
    add(&dir, "step1", "permanent", "rules");
    add(&dir, "step1", "working", "scratch");

    lb_cmd(&dir)
        .args(["advance", "step1", "step2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 linked, 1 copied"));

    lb_cmd(&dir)
        .args(["list", "step2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rules"))
        .stdout(predicate::str::contains("scratch"));
}

#[test]
fn dupes_finds_identical_content() {
    let dir = TempDir::new().unwrap();
    let a = add(&dir, "w1", "stable", "Same text");
    let b = add(&dir, "w2", "working", "Same text");

    lb_cmd(&dir)
        .args(["dupes", &a])
        .assert()
        .success()
        .stdout(predicate::str::contains(b.as_str()))
        .stdout(predicate::str::contains("w2"));
}

#[test]
fn export_import_roundtrip() {
    let dir = TempDir::new().unwrap();
    let x = add(&dir, "lib", "stable", "Library entry");
    run_for_id(&dir, &["link", "tpl", &x]);
    add(&dir, "tpl", "working", "Task notes");

    let path = dir.path().join("tpl.json");
    lb_cmd(&dir)
        .args(["export", "tpl"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("exported tpl"));

    let json = std::fs::read_to_string(&path).unwrap();
    assert!(json.contains("Library entry"));
    assert!(!json.contains(&x), "snapshot must not reference the canonical");

    lb_cmd(&dir)
        .args(["import", "run1"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 2 block(s) into run1"));

    lb_cmd(&dir)
        .args(["list", "run1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Library entry"))
        .stdout(predicate::str::contains("→").not());
}

#[test]
fn mv_and_rebalance() {
    let dir = TempDir::new().unwrap();
    let a = add(&dir, "w1", "working", "alpha");
    add(&dir, "w1", "working", "beta");

    lb_cmd(&dir)
        .args(["mv", &a, "stable"])
        .assert()
        .success()
        .stdout(predicate::str::contains("to stable"));

    lb_cmd(&dir)
        .args(["rebalance", "w1", "working"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no rebalance needed"));

    lb_cmd(&dir)
        .args(["rebalance", "w1", "working", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 key(s) rewritten"));
}

#[test]
fn config_default_kind_applies() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.toml"), "default_kind = \"guideline\"\n").unwrap();
    add(&dir, "w1", "stable", "x");

    lb_cmd(&dir)
        .args(["list", "w1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[guideline]"));
}

#[test]
fn data_dir_flag_overrides_env() {
    let env_dir = TempDir::new().unwrap();
    let flag_dir = TempDir::new().unwrap();

    lb_cmd(&env_dir)
        .args(["add", "w1", "flagged", "--data-dir"])
        .arg(flag_dir.path())
        .assert()
        .success();

    assert!(flag_dir.path().join("blocks.db").exists());
    lb_cmd(&env_dir)
        .arg("workspaces")
        .assert()
        .success()
        .stdout(predicate::str::contains("(no workspaces)"));
}
