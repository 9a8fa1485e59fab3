use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use deploy_driver::{
    AppSource, CoolifyClient, CoolifyConfig, DeployError, DeployPlatform, EnvVar, NewApplication,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn client(server: &MockServer) -> CoolifyClient {
    CoolifyClient::new(CoolifyConfig::new(&server.uri(), "coolify-token")).unwrap()
}

fn new_app(source: AppSource) -> NewApplication {
    NewApplication {
        project_uuid: "proj-1".to_string(),
        server_uuid: "srv-1".to_string(),
        environment_name: "production".to_string(),
        name: "my-app".to_string(),
        ports_exposes: "3000".to_string(),
        source,
    }
}

#[tokio::test]
async fn version_check_maps_statuses() {
    for status in [401u16, 403, 404] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/version"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        let err = client(&server).version().await.unwrap_err();
        match status {
            401 => assert!(matches!(err, DeployError::InvalidToken { .. })),
            403 => assert!(matches!(err, DeployError::PermissionDenied { .. })),
            _ => assert!(matches!(err, DeployError::ApiNotFound { .. })),
        }
    }
}

#[tokio::test]
async fn version_check_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/version"))
        .and(header("Authorization", "Bearer coolify-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("4.0.0-beta.360"))
        .expect(1)
        .mount(&server)
        .await;
    assert_eq!(client(&server).version().await.unwrap(), "4.0.0-beta.360");
}

#[tokio::test]
async fn servers_read_reachability_from_settings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "uuid": "s1", "name": "down", "ip": "10.0.0.1", "settings": { "is_reachable": false } },
            { "uuid": "s2", "name": "up", "ip": "10.0.0.2", "settings": { "is_reachable": true } },
            { "uuid": "s3", "name": "plain", "ip": "10.0.0.3" }
        ])))
        .mount(&server)
        .await;

    let servers = client(&server).list_servers().await.unwrap();
    let reachable: Vec<bool> = servers.iter().map(|s| s.reachable).collect();
    assert_eq!(reachable, vec![false, true, true]);
}

#[tokio::test]
async fn nixpacks_application_posts_public_repository() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/applications/public"))
        .and(body_partial_json(json!({
            "project_uuid": "proj-1",
            "server_uuid": "srv-1",
            "git_repository": "https://github.com/octo/my-app.git",
            "git_branch": "main",
            "build_pack": "nixpacks",
            "ports_exposes": "3000"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "uuid": "app-1",
            "domains": "http://my-app.example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = client(&server)
        .create_application(&new_app(AppSource::Nixpacks {
            git_repository: "https://github.com/octo/my-app.git".to_string(),
            git_branch: "main".to_string(),
        }))
        .await
        .unwrap();
    assert_eq!(app.uuid, "app-1");
    assert_eq!(app.fqdn.as_deref(), Some("http://my-app.example.com"));
    assert_eq!(app.project_uuid.as_deref(), Some("proj-1"));
}

#[tokio::test]
async fn github_app_application_posts_private_source() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/applications/private-github-app"))
        .and(body_partial_json(json!({
            "github_app_uuid": "gh-app-1",
            "git_repository": "https://github.com/octo/my-app",
            "git_branch": "main",
            "build_pack": "nixpacks"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "uuid": "app-3" })))
        .expect(1)
        .mount(&server)
        .await;

    let app = client(&server)
        .create_application(&new_app(AppSource::GitHubApp {
            github_app_uuid: "gh-app-1".to_string(),
            git_repository: "https://github.com/octo/my-app".to_string(),
            git_branch: "main".to_string(),
        }))
        .await
        .unwrap();
    assert_eq!(app.uuid, "app-3");
}

#[tokio::test]
async fn dockerfile_application_is_base64_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/applications/dockerfile"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "uuid": "app-2" })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .create_application(&new_app(AppSource::Dockerfile {
            dockerfile: "FROM nginx:alpine\n".to_string(),
        }))
        .await
        .unwrap();

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let encoded = body["dockerfile"].as_str().unwrap();
    assert_eq!(BASE64.decode(encoded).unwrap(), b"FROM nginx:alpine\n");
    assert!(body.get("git_repository").is_none());
}

#[tokio::test]
async fn env_conflict_surfaces_as_409() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/applications/app-1/envs"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "Environment variable already exists. Use PATCH request to update it."
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/applications/app-1/envs"))
        .and(body_partial_json(json!({ "key": "API_URL", "is_build_time": true })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let c = client(&server);
    let env = EnvVar::build_time("API_URL", "https://api.example.com");
    let err = c.create_env("app-1", &env).await.unwrap_err();
    assert!(matches!(err, DeployError::RemoteApi { status: 409, .. }));
    c.update_env("app-1", &env).await.unwrap();
}

#[tokio::test]
async fn deploy_returns_first_deployment_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/deploy"))
        .and(query_param("uuid", "app-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "deployments": [{
                "message": "Application my-app deployment queued.",
                "resource_uuid": "app-1",
                "deployment_uuid": "dep-9"
            }]
        })))
        .mount(&server)
        .await;

    assert_eq!(client(&server).deploy("app-1").await.unwrap(), "dep-9");
}

#[tokio::test]
async fn status_and_logs_are_read() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/applications/app-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uuid": "app-1",
            "status": "exited:unhealthy"
        })))
        .mount(&server)
        .await;
    let logs = json!([
        { "output": "Cloning repository", "hidden": false },
        { "output": "npm ERR! code ELIFECYCLE", "hidden": false }
    ])
    .to_string();
    Mock::given(method("GET"))
        .and(path("/api/v1/deployments/dep-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "deployment_uuid": "dep-9",
            "status": "failed",
            "logs": logs
        })))
        .mount(&server)
        .await;

    let c = client(&server);
    assert_eq!(c.application_status("app-1").await.unwrap(), "exited:unhealthy");
    assert_eq!(
        c.deployment_logs("dep-9").await.unwrap(),
        "Cloning repository\nnpm ERR! code ELIFECYCLE"
    );
}

#[tokio::test]
async fn delete_project_failure_is_captured_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/projects/proj-1"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string("Project has resources, so it cannot be deleted."),
        )
        .mount(&server)
        .await;

    let err = client(&server).delete_project("proj-1").await.unwrap_err();
    match err {
        DeployError::RemoteApi { status, body, .. } => {
            assert_eq!(status, 400);
            assert!(body.contains("has resources"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}
