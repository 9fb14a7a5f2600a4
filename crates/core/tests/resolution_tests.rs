//! Integration tests for input resolution
//!
//! Exercises the resolver against real directory trees: identity of inputs
//! across checkouts, optional declarations, and hashing each file once.

use cairn_core::{
    EnvVarDeclaration, Error, FileDeclaration, Input, InputResolver, Inputs, Task,
};
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn checkout() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "shop/src/main.rs", "fn main() {}");
    write(tmp.path(), "shop/src/lib/cart.rs", "pub struct Cart;");
    write(tmp.path(), "shop/Cargo.toml", "[package]");
    write(tmp.path(), "shop/db/001_init.sql", "create table cart();");
    write(tmp.path(), "cairn.toml", "[shop]");
    tmp
}

fn resolver(root: &Path) -> InputResolver {
    InputResolver::new(root).with_environment([("RUST_LOG", "info"), ("PROFILE", "release")])
}

fn build_task(root: &Path) -> Task {
    Task::new("shop", "build", root.join("shop"))
        .with_files(FileDeclaration::new(["src/**/*.rs", "Cargo.toml"]))
        .with_env_vars(EnvVarDeclaration {
            names: vec!["PROFILE".to_string()],
            optional: false,
        })
        .with_config_file("cairn.toml")
}

fn resolve(root: &Path, task: &Task) -> Inputs {
    resolver(root).resolve(task).unwrap()
}

#[test]
fn test_identities_are_repository_relative() {
    let tmp = checkout();
    let inputs = resolve(tmp.path(), &build_task(tmp.path()));
    let ids: Vec<String> = inputs.identities().collect();
    assert_eq!(
        ids,
        vec![
            "shop/src/lib/cart.rs",
            "shop/src/main.rs",
            "shop/Cargo.toml",
            "cairn.toml",
            "$PROFILE",
        ]
    );
}

#[test]
fn test_digest_independent_of_checkout_location() {
    let a = checkout();
    let b = checkout();
    assert_ne!(a.path(), b.path());

    let digest_a = resolve(a.path(), &build_task(a.path())).digest().unwrap();
    let digest_b = resolve(b.path(), &build_task(b.path())).digest().unwrap();
    assert_eq!(digest_a, digest_b);
}

#[test]
fn test_content_change_changes_digest() {
    let tmp = checkout();
    let before = resolve(tmp.path(), &build_task(tmp.path())).digest().unwrap();
    write(tmp.path(), "shop/src/main.rs", "fn main() { run() }");
    let after = resolve(tmp.path(), &build_task(tmp.path())).digest().unwrap();
    assert_ne!(before, after);
}

#[test]
fn test_required_pattern_without_match_names_pattern() {
    let tmp = checkout();
    let task = Task::new("shop", "build", tmp.path().join("shop"))
        .with_files(FileDeclaration::new(["Cargo.toml", "missing.ext"]));

    match resolver(tmp.path()).resolve(&task).unwrap_err() {
        Error::PatternMatchedZero { task, pattern } => {
            assert_eq!(task, "shop.build");
            assert_eq!(pattern, "missing.ext");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_optional_pattern_without_match_contributes_nothing() {
    let tmp = checkout();
    let plain = Task::new("shop", "build", tmp.path().join("shop"))
        .with_files(FileDeclaration::new(["Cargo.toml"]));
    let with_optional = plain
        .clone()
        .with_files(FileDeclaration::new(["*.proto"]).optional());

    assert_eq!(
        resolve(tmp.path(), &plain).digest().unwrap(),
        resolve(tmp.path(), &with_optional).digest().unwrap()
    );
}

#[test]
fn test_partially_matching_optional_declaration() {
    let tmp = checkout();
    let task = Task::new("shop", "migrate", tmp.path().join("shop"))
        .with_files(FileDeclaration::new(["db/*.sql", "db/*.down.sql"]).optional());

    let inputs = resolve(tmp.path(), &task);
    let ids: Vec<String> = inputs.identities().collect();
    assert_eq!(ids, vec!["shop/db/001_init.sql"]);
}

#[test]
fn test_optional_matches_are_still_hashed() {
    let tmp = checkout();
    let task = Task::new("shop", "migrate", tmp.path().join("shop"))
        .with_files(FileDeclaration::new(["db/*.sql"]).optional());

    let before = resolve(tmp.path(), &task).digest().unwrap();
    write(tmp.path(), "shop/db/002_orders.sql", "create table orders();");
    let after = resolve(tmp.path(), &task).digest().unwrap();
    assert_ne!(before, after);
}

#[test]
fn test_shared_file_hashed_once_across_tasks() {
    let tmp = checkout();
    let resolver = resolver(tmp.path());
    let build = build_task(tmp.path());
    let test = Task::new("shop", "test", tmp.path().join("shop"))
        .with_files(FileDeclaration::new(["src/*.rs", "Cargo.toml"]))
        .with_config_file("cairn.toml");

    let build_inputs = resolver.resolve(&build).unwrap();
    let test_inputs = resolver.resolve(&test).unwrap();
    build_inputs.digest().unwrap();
    test_inputs.digest().unwrap();

    // cart.rs, main.rs, Cargo.toml and cairn.toml, each once
    let stats = resolver.stats();
    assert_eq!(stats.files_hashed, 4);

    let shared = |inputs: &Inputs| {
        inputs
            .iter()
            .find_map(|i| match i {
                Input::File(f) if f.rel_path() == "shop/Cargo.toml" => Some(f.clone()),
                _ => None,
            })
            .unwrap()
    };
    assert!(std::sync::Arc::ptr_eq(
        &shared(&build_inputs),
        &shared(&test_inputs)
    ));
}

#[test]
fn test_overlapping_patterns_resolve_once() {
    let tmp = checkout();
    let task = Task::new("shop", "lint", tmp.path().join("shop"))
        .with_files(FileDeclaration::new(["src/**/*.rs", "src/main.rs"]))
        .with_files(FileDeclaration::new(["./src/main.rs"]));

    let inputs = resolve(tmp.path(), &task);
    assert_eq!(inputs.len(), 2);
}

#[test]
fn test_directory_pattern_expands_to_files() {
    let tmp = checkout();
    let task = Task::new("shop", "package", tmp.path().join("shop"))
        .with_files(FileDeclaration::new(["src"]));

    let ids: Vec<String> = resolve(tmp.path(), &task).identities().collect();
    assert_eq!(ids, vec!["shop/src/lib/cart.rs", "shop/src/main.rs"]);
}

#[test]
fn test_missing_required_variable() {
    let tmp = checkout();
    let task = Task::new("shop", "deploy", tmp.path().join("shop")).with_env_vars(
        EnvVarDeclaration {
            names: vec!["DEPLOY_TOKEN".to_string()],
            optional: false,
        },
    );
    assert!(matches!(
        resolver(tmp.path()).resolve(&task),
        Err(Error::PatternMatchedZero { .. })
    ));
}

#[cfg(unix)]
#[test]
fn test_dangling_symlink_is_filesystem_error() {
    let tmp = checkout();
    std::os::unix::fs::symlink(
        tmp.path().join("shop/nowhere.rs"),
        tmp.path().join("shop/src/broken.rs"),
    )
    .unwrap();
    let task = Task::new("shop", "build", tmp.path().join("shop"))
        .with_files(FileDeclaration::new(["src/*.rs"]));

    let err = resolver(tmp.path())
        .resolve(&task)
        .and_then(|inputs| inputs.digest().map(|_| ()))
        .unwrap_err();
    assert!(matches!(err, Error::Filesystem { .. }), "{err:?}");
}

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn git(root: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .unwrap()
        .status;
    assert!(status.success(), "git {args:?} failed");
}

#[test]
fn test_tracked_only_skips_untracked_files() {
    if !git_available() {
        return;
    }

    let tmp = checkout();
    git(tmp.path(), &["init", "-q"]);
    git(tmp.path(), &["add", "shop/src/main.rs"]);

    let vcs = cairn_vcs::detect(tmp.path());
    let task = Task::new("shop", "build", tmp.path().join("shop"))
        .with_files(FileDeclaration::new(["src/**/*.rs"]).tracked_only());
    let inputs = resolver(tmp.path()).with_vcs(vcs).resolve(&task).unwrap();

    let ids: Vec<String> = inputs.identities().collect();
    assert_eq!(ids, vec!["shop/src/main.rs"]);
}

#[test]
fn test_sibling_directory_patterns() {
    let tmp = checkout();
    write(tmp.path(), "shared/proto.txt", "syntax");
    write(tmp.path(), "shared/notes.md", "notes");
    let task = Task::new("shop", "gen", tmp.path().join("shop"))
        .with_files(FileDeclaration::new(["../shared/*.txt", "../cairn.toml"]));

    let ids: Vec<String> = resolve(tmp.path(), &task).identities().collect();
    assert_eq!(ids, vec!["shared/proto.txt", "cairn.toml"]);

    if !git_available() {
        return;
    }
    write(tmp.path(), "shared/scratch.txt", "wip");
    git(tmp.path(), &["init", "-q"]);
    git(tmp.path(), &["add", "shared/proto.txt", "cairn.toml"]);

    let tracked = Task::new("shop", "gen", tmp.path().join("shop"))
        .with_files(FileDeclaration::new(["../shared/*.txt", "../cairn.toml"]).tracked_only());
    let inputs = resolver(tmp.path())
        .with_vcs(cairn_vcs::detect(tmp.path()))
        .resolve(&tracked)
        .unwrap();
    let ids: Vec<String> = inputs.identities().collect();
    assert_eq!(ids, vec!["shared/proto.txt", "cairn.toml"]);
}
