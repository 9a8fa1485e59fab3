use std::sync::Arc;

use proprietary_scrub::{Sanitizer, SourceFile};
use repo_publisher::{
    GitHubClient, GitHubConfig, PublishError, PublishOptions, Publisher, SourceHost, TreeItem,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GitHubClient {
    GitHubClient::new(GitHubConfig::new("ghp_test").with_api_url(&server.uri())).unwrap()
}

fn repo_json(owner: &str, name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "html_url": format!("https://github.com/{}/{}", owner, name),
        "default_branch": "main",
        "private": true,
        "owner": { "login": owner }
    })
}

#[tokio::test]
async fn identity_reads_scopes_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .and(header("Authorization", "Bearer ghp_test"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-OAuth-Scopes", "repo, read:org")
                .set_body_json(json!({ "login": "octo" })),
        )
        .mount(&server)
        .await;

    let identity = client(&server).authenticated_user().await.unwrap();
    assert_eq!(identity.login, "octo");
    assert_eq!(
        identity.scopes,
        Some(vec!["repo".to_string(), "read:org".to_string()])
    );
}

#[tokio::test]
async fn identity_without_scope_header_is_unverified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "octo" })))
        .mount(&server)
        .await;

    let identity = client(&server).authenticated_user().await.unwrap();
    assert!(identity.scopes.is_none());
    assert!(identity.can_write_repos());
}

#[tokio::test]
async fn unauthorized_identity_is_invalid_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .mount(&server)
        .await;

    let err = client(&server).authenticated_user().await.unwrap_err();
    match err {
        PublishError::InvalidToken { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "Bad credentials");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_repo_is_none_and_empty_repo_has_no_head() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/empty/git/ref/heads/main"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "message": "Git Repository is empty." })),
        )
        .mount(&server)
        .await;

    let gh = client(&server);
    assert!(gh.get_repo("octo", "missing").await.unwrap().is_none());
    assert!(gh.branch_head("octo", "empty", "main").await.unwrap().is_none());
}

#[tokio::test]
async fn tree_items_are_serialized_with_base_tree() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/app/git/trees"))
        .and(body_partial_json(json!({
            "base_tree": "base123",
            "tree": [
                { "path": "a.ts", "mode": "100644", "type": "blob", "content": "x" },
                { "path": "big.bin", "mode": "100644", "type": "blob", "sha": "blob456" }
            ]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "tree789" })))
        .expect(1)
        .mount(&server)
        .await;

    let sha = client(&server)
        .create_tree(
            "octo",
            "app",
            Some("base123"),
            &[TreeItem::inline("a.ts", "x"), TreeItem::blob("big.bin", "blob456")],
        )
        .await
        .unwrap();
    assert_eq!(sha, "tree789");
}

#[tokio::test]
async fn remote_failure_is_captured_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/app/git/commits"))
        .respond_with(ResponseTemplate::new(422).set_body_string("{\"message\":\"Tree SHA does not exist\"}"))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_commit("octo", "app", "msg", "nope", &[])
        .await
        .unwrap_err();
    match err {
        PublishError::RemoteApi {
            operation,
            status,
            body,
        } => {
            assert_eq!(operation, "commit creation");
            assert_eq!(status, 422);
            assert!(body.contains("Tree SHA does not exist"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn full_publish_against_mock_api() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-OAuth-Scopes", "repo")
                .set_body_json(json!({ "login": "octo" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repo_json("octo", "app")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/app/git/ref/heads/main"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "object": { "sha": "c0ffee" } })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/app/git/commits/c0ffee"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "tree": { "sha": "t0" } })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/app/git/trees"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "t1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/app/git/commits"))
        .and(body_partial_json(json!({ "tree": "t1", "parents": ["c0ffee"] })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "c1" })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/repos/octo/app/git/refs/heads/main"))
        .and(body_partial_json(json!({ "sha": "c1", "force": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": { "sha": "c1" } })))
        .expect(1)
        .mount(&server)
        .await;

    let sanitizer = Sanitizer::with_default_catalog().unwrap();
    let report = sanitizer.clean_files(&[SourceFile::new(
        "package.json",
        r#"{"name":"app","dependencies":{"lovable-tagger":"1.0.0","react":"18.0.0"}}"#,
    )]);
    let publisher = Publisher::new(Arc::new(client(&server)));

    let outcome = publisher
        .publish(&report, &PublishOptions::new("app"))
        .await
        .unwrap();

    assert_eq!(outcome.commit_sha, "c1");
    assert_eq!(outcome.repo_url, "https://github.com/octo/app");
    assert!(!outcome.was_created);
    assert!(outcome.package_manifest_valid);
}
