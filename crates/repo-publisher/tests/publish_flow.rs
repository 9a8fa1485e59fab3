use std::sync::Arc;

use proprietary_scrub::{CleaningReport, Sanitizer, SourceFile};
use repo_publisher::fakes::MemorySourceHost;
use repo_publisher::{PublishError, PublishOptions, Publisher};

fn clean(files: &[(&str, &str)]) -> CleaningReport {
    let sanitizer = Sanitizer::with_default_catalog().unwrap();
    let files: Vec<SourceFile> = files.iter().map(|(p, c)| SourceFile::new(*p, *c)).collect();
    sanitizer.clean_files(&files)
}

#[tokio::test]
async fn manifest_scenario_creates_repo_and_commits() {
    let host = Arc::new(MemorySourceHost::new("octo"));
    let publisher = Publisher::new(host.clone());
    let report = clean(&[(
        "package.json",
        r#"{"dependencies":{"lovable-tagger":"1.0.0","react":"18.0.0"}}"#,
    )]);

    let outcome = publisher
        .publish(&report, &PublishOptions::new("my-app"))
        .await
        .unwrap();

    assert!(outcome.was_created);
    assert!(outcome.private);
    assert_eq!(outcome.http_status(), 201);
    assert_eq!(outcome.files_count, 1);
    assert_eq!(outcome.total_changes, 1);
    assert_eq!(outcome.repo_url, "https://github.com/octo/my-app");
    assert!(!outcome.package_manifest_valid, "manifest has no name");

    let files = host.branch_files("octo", "my-app", "main").unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&files["package.json"]).unwrap();
    assert_eq!(manifest["dependencies"]["react"], "18.0.0");
    assert!(manifest["dependencies"].get("lovable-tagger").is_none());
    assert!(files.contains_key("README.md"));

    let commit = host.branch_commit("octo", "my-app", "main").unwrap();
    assert_eq!(commit.parents.len(), 1);
    assert_eq!(
        host.calls(),
        vec![
            "authenticated_user",
            "get_repo",
            "create_repo",
            "branch_head",
            "bootstrap_readme",
            "branch_head",
            "create_tree",
            "create_commit",
            "update_ref",
        ]
    );
}

#[tokio::test]
async fn existing_repo_builds_on_branch_tip() {
    let host = Arc::new(
        MemorySourceHost::new("octo").with_repo("octo", "my-app", &[("old.txt", "keep")]),
    );
    let before = host.branch_commit("octo", "my-app", "main").unwrap();
    let publisher = Publisher::new(host.clone());
    let report = clean(&[(
        "package.json",
        r#"{"name":"my-app","dependencies":{"react":"18.0.0"}}"#,
    )]);

    let outcome = publisher
        .publish(&report, &PublishOptions::new("my-app"))
        .await
        .unwrap();

    assert!(!outcome.was_created);
    assert_eq!(outcome.http_status(), 200);
    assert!(outcome.package_manifest_valid);
    assert!(!host.calls().contains(&"bootstrap_readme".to_string()));
    assert!(!host.calls().contains(&"create_repo".to_string()));

    let files = host.branch_files("octo", "my-app", "main").unwrap();
    assert_eq!(files["old.txt"], "keep");
    let after = host.branch_commit("octo", "my-app", "main").unwrap();
    assert_ne!(after.tree_sha, before.tree_sha);
}

#[tokio::test]
async fn oversized_files_are_blob_references() {
    let host = Arc::new(MemorySourceHost::new("octo"));
    let publisher = Publisher::new(host.clone());
    let big = "x".repeat(2048);
    let report = clean(&[("src/small.ts", "export {};\n"), ("public/data.json", big.as_str())]);

    let outcome = publisher
        .publish(
            &report,
            &PublishOptions::new("app").with_inline_threshold(1024),
        )
        .await
        .unwrap();

    assert_eq!(outcome.blobs_uploaded, 1);
    let items = host.last_tree_items("octo", "app");
    let big_item = items.iter().find(|i| i.path == "public/data.json").unwrap();
    assert!(big_item.is_blob_reference());
    assert!(big_item.content.is_none());
    let small_item = items.iter().find(|i| i.path == "src/small.ts").unwrap();
    assert!(!small_item.is_blob_reference());

    let files = host.branch_files("octo", "app", "main").unwrap();
    assert_eq!(files["public/data.json"], big);
}

#[tokio::test]
async fn blob_failure_degrades_to_inline() {
    let host = Arc::new(MemorySourceHost::new("octo").failing_blobs());
    let publisher = Publisher::new(host.clone());
    let big = "y".repeat(300);
    let report = clean(&[("big.txt", big.as_str())]);

    let outcome = publisher
        .publish(&report, &PublishOptions::new("app").with_inline_threshold(100))
        .await
        .unwrap();

    assert_eq!(outcome.blobs_uploaded, 0);
    let items = host.last_tree_items("octo", "app");
    assert_eq!(items[0].content.as_deref(), Some(big.as_str()));
}

#[tokio::test]
async fn removed_and_lockfiles_are_not_published() {
    let host = Arc::new(MemorySourceHost::new("octo"));
    let publisher = Publisher::new(host.clone());
    let report = clean(&[
        ("lovable.config.ts", "export default {}"),
        ("bun.lockb", "lock"),
        ("src/main.ts", "console.log(1);\n"),
    ]);

    let outcome = publisher
        .publish(&report, &PublishOptions::new("app"))
        .await
        .unwrap();

    assert_eq!(outcome.files_count, 1);
    assert_eq!(outcome.removed_files, vec!["lovable.config.ts", "bun.lockb"]);
    let files = host.branch_files("octo", "app", "main").unwrap();
    assert!(!files.contains_key("bun.lockb"));
    assert!(!files.contains_key("lovable.config.ts"));
}

#[tokio::test]
async fn bad_token_is_terminal() {
    let host = Arc::new(MemorySourceHost::new("octo").rejecting_token());
    let publisher = Publisher::new(host.clone());
    let report = clean(&[("a.ts", "export {};\n")]);

    let err = publisher
        .publish(&report, &PublishOptions::new("app"))
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::InvalidToken { status: 401, .. }));
    assert_eq!(host.calls(), vec!["authenticated_user"]);
}

#[tokio::test]
async fn missing_repo_scope_is_reported_before_writes() {
    let host = Arc::new(MemorySourceHost::new("octo").with_scopes(Some(vec!["read:user"])));
    let publisher = Publisher::new(host.clone());
    let report = clean(&[("a.ts", "export {};\n")]);

    let err = publisher
        .publish(&report, &PublishOptions::new("app"))
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::InsufficientScope { .. }));
    assert_eq!(err.http_status(), 403);
    assert_eq!(host.calls(), vec!["authenticated_user"]);
}

#[tokio::test]
async fn unscoped_token_is_allowed() {
    let host = Arc::new(MemorySourceHost::new("octo").with_scopes(None));
    let publisher = Publisher::new(host.clone());
    let report = clean(&[("a.ts", "export {};\n")]);

    assert!(publisher
        .publish(&report, &PublishOptions::new("app"))
        .await
        .is_ok());
}

#[tokio::test]
async fn empty_file_set_is_rejected_without_network() {
    let host = Arc::new(MemorySourceHost::new("octo"));
    let publisher = Publisher::new(host.clone());
    let report = clean(&[(".lovable/meta.json", "{}")]);

    let err = publisher
        .publish(&report, &PublishOptions::new("app"))
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::Validation(_)));
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn failed_ref_update_leaves_branch_untouched() {
    let host = Arc::new(
        MemorySourceHost::new("octo")
            .with_repo("octo", "app", &[("a.ts", "old")])
            .failing_ref_update(),
    );
    let before = host.branch_files("octo", "app", "main").unwrap();
    let publisher = Publisher::new(host.clone());
    let report = clean(&[("a.ts", "new")]);

    let err = publisher
        .publish(&report, &PublishOptions::new("app"))
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::RemoteApi { status: 500, .. }));
    assert_eq!(host.branch_files("octo", "app", "main").unwrap(), before);
}

#[tokio::test]
async fn rerun_converges_to_same_tree() {
    let host = Arc::new(MemorySourceHost::new("octo"));
    let publisher = Publisher::new(host.clone());
    let report = clean(&[("a.ts", "export const a = 1;\n"), ("b.ts", "export const b = 2;\n")]);
    let options = PublishOptions::new("app");

    let first = publisher.publish(&report, &options).await.unwrap();
    let files_after_first = host.branch_files("octo", "app", "main").unwrap();
    let second = publisher.publish(&report, &options).await.unwrap();

    assert!(first.was_created);
    assert!(!second.was_created);
    assert_ne!(first.commit_sha, second.commit_sha);
    assert_eq!(host.branch_files("octo", "app", "main").unwrap(), files_after_first);
    assert_eq!(first.content_digest, second.content_digest);
}

#[tokio::test]
async fn explicit_owner_creates_under_organization() {
    let host = Arc::new(MemorySourceHost::new("octo"));
    let publisher = Publisher::new(host.clone());
    let report = clean(&[("a.ts", "export {};\n")]);

    let outcome = publisher
        .publish(&report, &PublishOptions::new("app").with_owner("acme"))
        .await
        .unwrap();

    assert_eq!(outcome.owner, "acme");
    assert!(host.repo_exists("acme", "app"));
    assert!(!host.repo_exists("octo", "app"));
}
