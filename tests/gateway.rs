//! End-to-end tests: a real gateway in front of mock MCP backends.

use std::time::Duration;

use serde_json::Value;

mod common;
use common::{client, initialize, rpc, secret_file, Gateway, MockMcp};

const TOKEN: &str = "ghp_integration_token";

fn github_agent_config(backend: &MockMcp, token_path: &str) -> String {
    format!(
        r#"
        [secrets.github]
        file = "{token_path}"

        [[backends]]
        name = "agent-0"
        group = "github-agent"
        url = "{url}"

        [[routes]]
        name = "github-agent"
        path_prefix = "/github-agent"
        backend_group = "github-agent"
        rewrite = "/"
        mcp = true

        [[routes.headers]]
        op = "set"
        name = "Authorization"
        value = "Bearer ${{secret:github}}"

        [[routes.headers]]
        op = "remove"
        name = "Cookie"
        "#,
        url = backend.url(),
    )
}

fn replicated_config(a: &MockMcp, b: &MockMcp, extra: &str) -> String {
    format!(
        r#"
        {extra}

        [[backends]]
        name = "{a_name}"
        group = "agents"
        url = "{a_url}"

        [[backends]]
        name = "{b_name}"
        group = "agents"
        url = "{b_url}"

        [[routes]]
        name = "agents"
        path_prefix = "/mcp"
        backend_group = "agents"
        mcp = true
        "#,
        a_name = a.name,
        a_url = a.url(),
        b_name = b.name,
        b_url = b.url(),
    )
}

async fn open_session(gateway: &Gateway, path: &str) -> (String, Value) {
    let res = client()
        .post(gateway.url(path))
        .header("content-type", "application/json")
        .body(initialize(1))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let id = res
        .headers()
        .get("mcp-session-id")
        .expect("initialize response carries a session id")
        .to_str()
        .unwrap()
        .to_string();
    (id, res.json().await.unwrap())
}

#[tokio::test]
async fn injects_credentials_over_client_values() {
    let backend = MockMcp::start("agent-0").await;
    let dir = tempfile::tempdir().unwrap();
    let token = secret_file(&dir, "github", TOKEN);
    let gateway = Gateway::start(&github_agent_config(&backend, &token)).await;

    let body = r#"{"jsonrpc":"2.0", "id":7,"method":"tools/list" ,  "params":{}}"#;
    let res = client()
        .post(gateway.url("/github-agent/chat?trace=1"))
        .header("AUTHORIZATION", "Bearer client-supplied")
        .header("cookie", "session=abc")
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    // The backend echoes Authorization; the gateway must not pass it back
    assert!(res.headers().get("authorization").is_none());

    let seen = backend.last();
    assert_eq!(seen.path_and_query, "/chat?trace=1");
    assert_eq!(seen.header("authorization"), Some("Bearer ghp_integration_token"));
    assert_eq!(seen.headers.get_all("authorization").iter().count(), 1);
    assert!(seen.header("cookie").is_none());
    assert_eq!(&seen.body[..], body.as_bytes());
    assert_eq!(seen.header("host"), Some(backend.addr.to_string().as_str()));
    assert_eq!(seen.header("x-forwarded-for"), Some("127.0.0.1"));
    assert_eq!(seen.header("x-forwarded-proto"), Some("http"));
}

#[tokio::test]
async fn error_bodies_never_echo_secrets() {
    let backend = MockMcp::start("agent-0").await;
    let dir = tempfile::tempdir().unwrap();
    let token = secret_file(&dir, "github", TOKEN);
    let gateway = Gateway::start(&github_agent_config(&backend, &token)).await;

    let res = client()
        .get(gateway.url("/github-agent/denied"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 401);
    let text = res.text().await.unwrap();
    assert!(!text.contains(TOKEN), "secret leaked: {}", text);
    assert!(text.contains("[REDACTED]"));
}

#[tokio::test]
async fn unknown_route_is_404_without_upstream_traffic() {
    let backend = MockMcp::start("agent-0").await;
    let dir = tempfile::tempdir().unwrap();
    let token = secret_file(&dir, "github", TOKEN);
    let gateway = Gateway::start(&github_agent_config(&backend, &token)).await;

    let res = client().get(gateway.url("/slack-agent/chat")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn request_id_is_generated_and_propagated() {
    let backend = MockMcp::start("agent-0").await;
    let dir = tempfile::tempdir().unwrap();
    let token = secret_file(&dir, "github", TOKEN);
    let gateway = Gateway::start(&github_agent_config(&backend, &token)).await;

    let res = client()
        .post(gateway.url("/github-agent/"))
        .body(rpc(1, "ping"))
        .send()
        .await
        .unwrap();
    let returned = res.headers()["x-request-id"].to_str().unwrap().to_string();
    assert_eq!(backend.last().header("x-request-id"), Some(returned.as_str()));

    let res = client()
        .post(gateway.url("/github-agent/"))
        .header("x-request-id", "caller-chosen")
        .body(rpc(2, "ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "caller-chosen");
}

#[tokio::test]
async fn sessions_stick_to_their_replica() {
    let a = MockMcp::start("replica-a").await;
    let b = MockMcp::start("replica-b").await;
    let gateway = Gateway::start(&replicated_config(&a, &b, "")).await;

    let (first, init) = open_session(&gateway, "/mcp").await;
    let (second, _) = open_session(&gateway, "/mcp").await;
    let first_backend = init["result"]["serverInfo"]["name"].as_str().unwrap().to_string();
    assert!(first.starts_with(&first_backend));
    assert_ne!(first.split("-session").next(), second.split("-session").next());

    for id in 2..6 {
        let res = client()
            .post(gateway.url("/mcp"))
            .header("mcp-session-id", &first)
            .body(rpc(id, "tools/list"))
            .send()
            .await
            .unwrap();
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["result"]["backend"], first_backend.as_str());
    }

    let (owner, other) = if first_backend == a.name { (&a, &b) } else { (&b, &a) };
    assert_eq!(owner.request_count(), 5);
    assert_eq!(other.request_count(), 1);
    assert_eq!(gateway.state.sessions().len(), 2);
}

#[tokio::test]
async fn expired_session_gets_jsonrpc_error() {
    let a = MockMcp::start("replica-a").await;
    let b = MockMcp::start("replica-b").await;
    let config = replicated_config(
        &a,
        &b,
        r#"
        [sessions]
        idle_timeout_secs = 1
        sweep_interval_secs = 60
        "#,
    );
    let gateway = Gateway::start(&config).await;

    let (id, _) = open_session(&gateway, "/mcp").await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let before = a.request_count() + b.request_count();
    let res = client()
        .post(gateway.url("/mcp"))
        .header("mcp-session-id", &id)
        .body(rpc(42, "tools/call"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["id"], 42);
    assert_eq!(a.request_count() + b.request_count(), before);
    assert!(gateway.state.sessions().is_empty());
}

#[tokio::test]
async fn delete_terminates_session() {
    let a = MockMcp::start("replica-a").await;
    let b = MockMcp::start("replica-b").await;
    let gateway = Gateway::start(&replicated_config(&a, &b, "")).await;

    let (id, _) = open_session(&gateway, "/mcp").await;
    let res = client()
        .delete(gateway.url("/mcp"))
        .header("mcp-session-id", &id)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(gateway.state.sessions().get(&id).is_none());

    let res = client()
        .post(gateway.url("/mcp"))
        .header("mcp-session-id", &id)
        .body(rpc(3, "tools/list"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn gateway_assigns_ids_for_stateless_backends() {
    let backend = MockMcp::start_stateless("stateless").await;
    let config = format!(
        r#"
        [[backends]]
        name = "stateless"
        group = "stateless"
        url = "{}"

        [[routes]]
        name = "stateless"
        path_prefix = "/mcp"
        backend_group = "stateless"
        mcp = true
        "#,
        backend.url()
    );
    let gateway = Gateway::start(&config).await;

    let (id, _) = open_session(&gateway, "/mcp").await;
    assert!(uuid::Uuid::parse_str(&id).is_ok());

    let res = client()
        .post(gateway.url("/mcp"))
        .header("mcp-session-id", &id)
        .body(rpc(2, "tools/list"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    // The upstream never issued this id, so it is not forwarded
    assert!(backend.last().header("mcp-session-id").is_none());
}

#[tokio::test]
async fn event_stream_chunks_arrive_before_stream_ends() {
    let backend = MockMcp::start("agent-0").await;
    let dir = tempfile::tempdir().unwrap();
    let token = secret_file(&dir, "github", TOKEN);
    let gateway = Gateway::start(&github_agent_config(&backend, &token)).await;

    let mut res = client()
        .get(gateway.url("/github-agent/stream"))
        .header("accept", "text/event-stream")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "text/event-stream");

    // The backend is still holding the second event here
    let first = tokio::time::timeout(Duration::from_secs(5), res.chunk())
        .await
        .expect("first event was buffered")
        .unwrap()
        .unwrap();
    assert!(std::str::from_utf8(&first).unwrap().contains("progress"));

    backend.release_stream();
    let mut rest = Vec::new();
    while let Some(chunk) = res.chunk().await.unwrap() {
        rest.extend_from_slice(&chunk);
    }
    assert!(std::str::from_utf8(&rest).unwrap().contains("done"));
}

#[tokio::test]
async fn unreachable_backend_is_502() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = format!(
        r#"
        [[backends]]
        name = "gone"
        group = "gone"
        url = "http://127.0.0.1:{port}"

        [[routes]]
        name = "gone"
        path_prefix = "/"
        backend_group = "gone"
        "#
    );
    let gateway = Gateway::start(&config).await;

    let res = client().get(gateway.url("/anything")).send().await.unwrap();
    assert_eq!(res.status(), 502);
}

#[tokio::test]
async fn reload_swaps_routes_and_keeps_sessions() {
    let a = MockMcp::start("replica-a").await;
    let b = MockMcp::start("replica-b").await;
    let gateway = Gateway::start(&replicated_config(&a, &b, "")).await;
    let (id, _) = open_session(&gateway, "/mcp").await;

    let reloaded = replicated_config(&a, &b, "").replace("path_prefix = \"/mcp\"", "path_prefix = \"/v2/mcp\"");
    gateway.push_config(&reloaded);

    let mut generation = 0;
    for _ in 0..50 {
        generation = gateway.state.runtime.load().generation;
        if generation > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(generation, 1);

    let res = client().post(gateway.url("/mcp")).body(rpc(1, "ping")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let res = client()
        .post(gateway.url("/v2/mcp"))
        .header("mcp-session-id", &id)
        .body(rpc(2, "tools/list"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn session_from_another_route_never_receives_injected_credentials() {
    let github = MockMcp::start("github").await;
    let public = MockMcp::start("public").await;
    let dir = tempfile::tempdir().unwrap();
    let token = secret_file(&dir, "pat", TOKEN);
    let config = format!(
        r#"
        [secrets.pat]
        file = "{token}"

        [[backends]]
        name = "github"
        group = "github"
        url = "{github_url}"

        [[backends]]
        name = "public"
        group = "public"
        url = "{public_url}"

        [[routes]]
        name = "mcp-github"
        path_prefix = "/mcp-github"
        backend_group = "github"
        rewrite = "/"
        mcp = true

        [[routes.headers]]
        op = "set"
        name = "Authorization"
        value = "Bearer ${{secret:pat}}"

        [[routes]]
        name = "public-mcp"
        path_prefix = "/public-mcp"
        backend_group = "public"
        rewrite = "/"
        mcp = true
        "#,
        github_url = github.url(),
        public_url = public.url(),
    );
    let gateway = Gateway::start(&config).await;

    let (id, _) = open_session(&gateway, "/public-mcp").await;
    assert!(id.starts_with("public"));

    let res = client()
        .post(gateway.url("/mcp-github"))
        .header("mcp-session-id", &id)
        .body(rpc(9, "tools/list"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["id"], 9);

    // A replayed initialize on the other route opens a session of its own
    let res = client()
        .post(gateway.url("/mcp-github"))
        .header("mcp-session-id", &id)
        .body(initialize(10))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(github.last().header("mcp-session-id").is_none());

    assert_eq!(public.request_count(), 1);
    for seen in public.seen() {
        assert!(seen.header("authorization").is_none(), "credential leaked to public backend");
    }
    assert_eq!(github.request_count(), 1);
    let owned = gateway.state.sessions().get(&id).expect("public session survives");
    assert_eq!(owned.route, "public-mcp");
    assert_eq!(gateway.state.sessions().len(), 2);
}

#[tokio::test]
async fn client_disconnect_cancels_upstream_stream() {
    let backend = MockMcp::start("agent-0").await;
    let dir = tempfile::tempdir().unwrap();
    let token = secret_file(&dir, "github", TOKEN);
    let gateway = Gateway::start(&github_agent_config(&backend, &token)).await;
    let (id, _) = open_session(&gateway, "/github-agent").await;

    let mut res = client()
        .get(gateway.url("/github-agent/stream"))
        .header("accept", "text/event-stream")
        .header("mcp-session-id", &id)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    tokio::time::timeout(Duration::from_secs(5), res.chunk())
        .await
        .expect("first event was buffered")
        .unwrap()
        .unwrap();

    let session = gateway.state.sessions().get(&id).unwrap();
    assert_eq!(session.in_flight(), 1);

    // Hang up while the backend is still holding the second event
    drop(res);

    let mut cancelled = false;
    for _ in 0..100 {
        if backend.stream_dropped() && session.in_flight() == 0 {
            cancelled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(cancelled, "upstream stream outlived the client");
    // A half-read connection is never handed back to the pool
    assert_eq!(gateway.state.forwarder.pool().total_idle(), 0);
}

#[tokio::test]
async fn replayed_initialize_reuses_session_on_its_replica() {
    let a = MockMcp::start("replica-a").await;
    let b = MockMcp::start("replica-b").await;
    let gateway = Gateway::start(&replicated_config(&a, &b, "")).await;

    let (id, init) = open_session(&gateway, "/mcp").await;
    let owner_name = init["result"]["serverInfo"]["name"].as_str().unwrap().to_string();

    let res = client()
        .post(gateway.url("/mcp"))
        .header("mcp-session-id", &id)
        .body(initialize(2))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["mcp-session-id"], id.as_str());

    let (owner, other) = if owner_name == a.name { (&a, &b) } else { (&b, &a) };
    assert_eq!(owner.request_count(), 2);
    assert_eq!(owner.last().header("mcp-session-id"), Some(id.as_str()));
    assert_eq!(other.request_count(), 0);
    assert_eq!(gateway.state.sessions().len(), 1);
    assert!(gateway.state.sessions().get(&id).is_some());
}

#[tokio::test]
async fn replayed_initialize_with_reset_starts_over() {
    let a = MockMcp::start("replica-a").await;
    let b = MockMcp::start("replica-b").await;
    let config = replicated_config(
        &a,
        &b,
        r#"
        [sessions]
        on_reinitialize = "reset"
        "#,
    );
    let gateway = Gateway::start(&config).await;

    let (old_id, init) = open_session(&gateway, "/mcp").await;
    let owner_name = init["result"]["serverInfo"]["name"].as_str().unwrap().to_string();

    let res = client()
        .post(gateway.url("/mcp"))
        .header("mcp-session-id", &old_id)
        .body(initialize(2))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let new_id = res.headers()["mcp-session-id"].to_str().unwrap().to_string();
    assert_ne!(new_id, old_id);

    // The fresh initialize is balanced like any other, onto the next replica
    let (owner, other) = if owner_name == a.name { (&a, &b) } else { (&b, &a) };
    assert!(new_id.starts_with(other.name));
    assert_eq!(owner.request_count(), 1);
    assert_eq!(other.request_count(), 1);
    assert!(other.last().header("mcp-session-id").is_none());

    assert_eq!(gateway.state.sessions().len(), 1);
    assert!(gateway.state.sessions().get(&old_id).is_none());
    assert!(gateway.state.sessions().get(&new_id).is_some());
}
