//! End-to-end pipeline tests over stub collaborators.
//!
//! Scenarios covered:
//! 1. Full stream: prologue, markup chunks, epilogue with hydration state
//! 2. Path params and query string reaching the page's hatch
//! 3. Session-gated page redirecting anonymous visitors
//! 4. Redirect signaled by a hatch mid-load
//! 5. Unmatched paths rendering an empty match instead of failing
//! 6. Outbound cookies attached to every terminal state

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hatchway_client::{BackendAnswer, BackendClient, BackendRequest};
use hatchway_common::error::Result;
use hatchway_common::routes::RouteTable;
use hatchway_common::scope::{RequestScope, ScopeTemplate};
use hatchway_server::{
    AssetManifest, DefaultRenderer, GateConfig, GateDecision, Hatch, HatchParams, HatchRegistry,
    PageRequest, PipelineResponse, RenderPipeline, SessionGate, StreamAssembler,
};
use serde_json::{json, Map, Value};

struct StubBackend {
    authenticated: bool,
}

#[async_trait]
impl BackendClient for StubBackend {
    async fn fetch(&self, request: BackendRequest) -> Result<BackendAnswer> {
        match request.path.as_str() {
            "/session" if self.authenticated => Ok(BackendAnswer {
                ok: true,
                status: 200,
                headers: HashMap::new(),
                set_cookie: vec!["sid=refreshed; HttpOnly".to_string()],
                body: json!({"user": {"id": "u-1", "username": "sova"}}),
            }),
            "/session" => Ok(BackendAnswer {
                ok: false,
                status: 401,
                headers: HashMap::new(),
                set_cookie: Vec::new(),
                body: Value::Null,
            }),
            path if path.starts_with("/users/") => {
                let id = path.trim_start_matches("/users/").to_string();
                Ok(BackendAnswer {
                    ok: true,
                    status: 200,
                    headers: HashMap::new(),
                    set_cookie: Vec::new(),
                    body: json!({"id": id, "username": format!("user-{id}")}),
                })
            }
            _ => Ok(BackendAnswer {
                ok: false,
                status: 404,
                headers: HashMap::new(),
                set_cookie: Vec::new(),
                body: Value::Null,
            }),
        }
    }
}

/// Loads the viewed user's profile, plus the tab selected via the query
/// string.
struct UserViewHatch {
    backend: Arc<dyn BackendClient>,
}

#[async_trait]
impl Hatch for UserViewHatch {
    async fn enter(&self, scope: &Arc<RequestScope>, params: HatchParams) -> Result<()> {
        let user_id = params.params.get("userId").cloned().unwrap_or_default();
        if let Some(tab) = params.query.get("tab") {
            scope.insert("activeTab", json!(tab));
        }

        let answer = self
            .backend
            .fetch(
                BackendRequest::get(format!("/users/{user_id}"))
                    .with_cookies(scope.request_cookies()),
            )
            .await?;
        if answer.ok {
            scope.insert("pageTitle", json!(format!("user-{user_id}")));
            scope.insert("viewedUser", answer.body);
        }
        Ok(())
    }
}

/// A page only authenticated users may load.
struct SettingsHatch {
    gate: Arc<SessionGate>,
}

#[async_trait]
impl Hatch for SettingsHatch {
    async fn enter(&self, scope: &Arc<RequestScope>, _params: HatchParams) -> Result<()> {
        if let GateDecision::Redirected(_) = self.gate.require_authenticated(scope).await {
            return Ok(());
        }
        scope.insert("settingsLoaded", json!(true));
        Ok(())
    }
}

/// A hatch that discovers a redirect while loading.
struct JumpHatch;

#[async_trait]
impl Hatch for JumpHatch {
    async fn enter(&self, scope: &Arc<RequestScope>, _params: HatchParams) -> Result<()> {
        scope.signal_redirect("/elsewhere");
        Ok(())
    }
}

fn pipeline(authenticated: bool) -> RenderPipeline {
    let backend: Arc<dyn BackendClient> = Arc::new(StubBackend { authenticated });
    let gate = Arc::new(SessionGate::new(
        Arc::clone(&backend),
        GateConfig::default(),
    ));

    let routes = Arc::new(
        RouteTable::new()
            .route("/", Some("home"), true)
            .route("/user/:userId", Some("user-view"), true)
            .route("/settings", Some("settings"), true)
            .route("/jump", Some("jump"), true),
    );

    let mut defaults = Map::new();
    defaults.insert("pageTitle".to_string(), json!(""));
    let template = Arc::new(ScopeTemplate::new(defaults).unwrap());

    let registry = Arc::new(
        HatchRegistry::new()
            .register(
                "user-view",
                Arc::new(UserViewHatch {
                    backend: Arc::clone(&backend),
                }),
            )
            .register(
                "settings",
                Arc::new(SettingsHatch {
                    gate: Arc::clone(&gate),
                }),
            )
            .register("jump", Arc::new(JumpHatch)),
    );

    RenderPipeline::new(
        routes,
        template,
        registry,
        gate,
        Arc::new(DefaultRenderer),
        StreamAssembler::new(Arc::new(AssetManifest::empty())),
    )
}

fn request(path: &str) -> PageRequest {
    PageRequest {
        method: "GET".to_string(),
        path: path.to_string(),
        cookies: "sid=abc".to_string(),
    }
}

async fn collect_stream(response: PipelineResponse) -> (String, Vec<String>) {
    match response {
        PipelineResponse::Stream { mut body, cookies } => {
            let mut out = String::new();
            while let Some(chunk) = body.recv().await {
                out.push_str(std::str::from_utf8(&chunk).unwrap());
            }
            (out, cookies)
        }
        PipelineResponse::Redirect { location, .. } => {
            panic!("expected a stream, got redirect to {location}")
        }
        PipelineResponse::Failure { status, message } => {
            panic!("expected a stream, got failure {status}: {message}")
        }
    }
}

#[tokio::test]
async fn test_user_page_streams_document_with_loaded_state() {
    let pipeline = pipeline(true);
    let response = pipeline.handle(request("/user/123?tab=cards")).await;
    let (body, cookies) = collect_stream(response).await;

    assert!(body.starts_with("<!doctype html>"));
    assert!(body.ends_with("</html>\n"));
    assert!(body.contains("window['INITIAL_STATE']"));
    // Path param and query string both reached the hatch.
    assert!(body.contains(r#""id":"123""#));
    assert!(body.contains(r#""activeTab":"cards""#));
    // Session resolved before the hatch loaded.
    assert!(body.contains(r#""status":"authenticated""#));
    // Set-Cookie captured during the session fetch goes out with the page.
    assert_eq!(cookies, vec!["sid=refreshed; HttpOnly".to_string()]);
}

#[tokio::test]
async fn test_prologue_precedes_markup_and_state_comes_last() {
    let pipeline = pipeline(true);
    let response = pipeline.handle(request("/user/7")).await;
    let (body, _) = collect_stream(response).await;

    let prologue = body.find("<div id='root'>").unwrap();
    let markup = body.find("<main").unwrap();
    let state = body.find("INITIAL_STATE").unwrap();
    assert!(prologue < markup);
    assert!(markup < state);
}

#[tokio::test]
async fn test_anonymous_visitor_is_redirected_from_gated_page() {
    let pipeline = pipeline(false);
    match pipeline.handle(request("/settings")).await {
        PipelineResponse::Redirect { location, .. } => assert_eq!(location, "/login"),
        _ => panic!("expected a redirect"),
    }
}

#[tokio::test]
async fn test_authenticated_visitor_loads_gated_page() {
    let pipeline = pipeline(true);
    let response = pipeline.handle(request("/settings")).await;
    let (body, _) = collect_stream(response).await;
    assert!(body.contains(r#""settingsLoaded":true"#));
}

#[tokio::test]
async fn test_redirect_signaled_mid_load_wins_over_streaming() {
    let pipeline = pipeline(true);
    match pipeline.handle(request("/jump")).await {
        PipelineResponse::Redirect { location, cookies } => {
            assert_eq!(location, "/elsewhere");
            // Cookies captured before the redirect still go out.
            assert_eq!(cookies, vec!["sid=refreshed; HttpOnly".to_string()]);
        }
        _ => panic!("expected a redirect"),
    }
}

#[tokio::test]
async fn test_unmatched_path_renders_empty_match() {
    let pipeline = pipeline(true);
    let response = pipeline.handle(request("/no/such/page")).await;
    let (body, _) = collect_stream(response).await;

    assert!(body.contains("data-page=''"));
    assert!(body.ends_with("</html>\n"));
}

#[tokio::test]
async fn test_concurrent_requests_do_not_share_state() {
    let pipeline = Arc::new(pipeline(true));

    let mut handles = Vec::new();
    for id in [1u32, 2, 3, 4] {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            let response = pipeline.handle(request(&format!("/user/{id}"))).await;
            let (body, _) = collect_stream(response).await;
            (id, body)
        }));
    }

    for handle in handles {
        let (id, body) = handle.await.unwrap();
        // Each response only ever carries its own user's data.
        assert!(body.contains(&format!(r#""id":"{id}""#)));
        for other in [1u32, 2, 3, 4] {
            if other != id {
                assert!(!body.contains(&format!(r#""id":"{other}""#)));
            }
        }
    }
}
