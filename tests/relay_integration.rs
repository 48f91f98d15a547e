//! Purpose: End-to-end tests for the relay binary against a fake upstream table.
//! Exports: None (integration test module).
//! Role: Validate list/create/update/delete forwarding, error relay, and console paging over TCP.
//! Invariants: Relay and fake upstream bind loopback only.
//! Invariants: Bounded waits avoid test flakiness.
//! Invariants: Relay processes are cleaned up on drop.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::{Json, Router};
use rowrelay::api::{ErrorKind, FieldPatch, ListQuery, NewRecord, PageSize, RelayClient};
use rowrelay::ui::Session;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

const TOKEN: &str = "patTest";
const BASE_ID: &str = "appTest";

static SERVER_LOCK: Mutex<()> = Mutex::new(());

#[derive(Clone, Debug)]
struct SeenRequest {
    method: &'static str,
    path: String,
    query: HashMap<String, String>,
    body: Option<Value>,
}

#[derive(Default)]
struct UpstreamTable {
    records: Vec<Value>,
    seen: Vec<SeenRequest>,
    next_id: usize,
}

type Shared = Arc<Mutex<UpstreamTable>>;

struct FakeUpstream {
    api_url: String,
    table: Shared,
}

impl FakeUpstream {
    fn start(names: &[&str]) -> TestResult<Self> {
        let table: Shared = Arc::default();
        {
            let mut guard = lock(&table);
            for name in names {
                let record = new_record(&mut guard, json!({
                    "nome": name,
                    "email": format!("{}@example.com", name.to_lowercase()),
                }));
                guard.records.push(record);
            }
        }

        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let app = Router::new()
            .route("/v0/:base/:table", get(list).post(create))
            .route("/v0/:base/:table/:id", patch(update).delete(remove))
            .with_state(Arc::clone(&table));

        std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(_) => return,
            };
            runtime.block_on(async move {
                if let Ok(listener) = tokio::net::TcpListener::from_std(listener) {
                    let _ = axum::serve(listener, app).await;
                }
            });
        });

        Ok(Self {
            api_url: format!("http://{addr}/v0"),
            table,
        })
    }

    fn seen(&self, method: &str) -> Vec<SeenRequest> {
        lock(&self.table)
            .seen
            .iter()
            .filter(|request| request.method == method)
            .cloned()
            .collect()
    }
}

fn lock(table: &Shared) -> MutexGuard<'_, UpstreamTable> {
    table.lock().unwrap_or_else(|poison| poison.into_inner())
}

fn new_record(table: &mut UpstreamTable, fields: Value) -> Value {
    table.next_id += 1;
    json!({
        "id": format!("rec{:04}", table.next_id),
        "createdTime": "2024-05-01T12:00:00.000Z",
        "fields": fields,
    })
}

fn unauthorized(headers: &HeaderMap) -> Option<Response> {
    let expected = format!("Bearer {TOKEN}");
    let ok = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);
    if ok {
        return None;
    }
    Some(
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": {"type": "AUTHENTICATION_REQUIRED", "message": "Authentication required"}
            })),
        )
            .into_response(),
    )
}

fn search_term(formula: &str) -> Option<String> {
    let start = formula.find("LOWER(\"")? + "LOWER(\"".len();
    let end = formula.find("\"), LOWER(")?;
    Some(formula[start..end].to_lowercase())
}

async fn list(
    State(table): State<Shared>,
    AxumPath((_base, _table)): AxumPath<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut guard = lock(&table);
    guard.seen.push(SeenRequest {
        method: "GET",
        path: String::new(),
        query: query.clone(),
        body: None,
    });
    if let Some(response) = unauthorized(&headers) {
        return response;
    }

    let term = query.get("filterByFormula").and_then(|f| search_term(f));
    let mut matching: Vec<Value> = guard
        .records
        .iter()
        .filter(|record| match &term {
            Some(term) => record["fields"]["nome"]
                .as_str()
                .is_some_and(|nome| nome.to_lowercase().contains(term.as_str())),
            None => true,
        })
        .cloned()
        .collect();
    matching.sort_by_key(|record| record["fields"]["nome"].as_str().unwrap_or("").to_string());

    let start = match query.get("offset") {
        Some(offset) => match offset.strip_prefix("itr").and_then(|n| n.parse().ok()) {
            Some(start) => start,
            None => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({"error": {"type": "LIST_RECORDS_ITERATOR_NOT_AVAILABLE"}})),
                )
                    .into_response();
            }
        },
        None => 0usize,
    };
    let size: usize = query
        .get("pageSize")
        .and_then(|size| size.parse().ok())
        .unwrap_or(100);
    let end = (start + size).min(matching.len());
    let records = matching.get(start..end).map(<[Value]>::to_vec).unwrap_or_default();
    let mut body = json!({ "records": records });
    if end < matching.len() {
        body["offset"] = json!(format!("itr{end}"));
    }
    Json(body).into_response()
}

async fn create(
    State(table): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut guard = lock(&table);
    guard.seen.push(SeenRequest {
        method: "POST",
        path: String::new(),
        query: HashMap::new(),
        body: Some(body.clone()),
    });
    if let Some(response) = unauthorized(&headers) {
        return response;
    }
    let record = new_record(&mut guard, body["fields"].clone());
    guard.records.push(record.clone());
    Json(record).into_response()
}

async fn update(
    State(table): State<Shared>,
    AxumPath((_base, _table, id)): AxumPath<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut guard = lock(&table);
    guard.seen.push(SeenRequest {
        method: "PATCH",
        path: id.clone(),
        query: HashMap::new(),
        body: Some(body.clone()),
    });
    if let Some(response) = unauthorized(&headers) {
        return response;
    }
    let Some(record) = guard.records.iter_mut().find(|record| record["id"] == id) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "NOT_FOUND"}))).into_response();
    };
    let changes = body["fields"].as_object().cloned().unwrap_or_default();
    let fields = record["fields"].as_object_mut();
    if let Some(fields) = fields {
        for (key, value) in changes {
            fields.insert(key, value);
        }
    }
    Json(record.clone()).into_response()
}

async fn remove(
    State(table): State<Shared>,
    AxumPath((_base, _table, id)): AxumPath<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut guard = lock(&table);
    guard.seen.push(SeenRequest {
        method: "DELETE",
        path: id.clone(),
        query: HashMap::new(),
        body: None,
    });
    if let Some(response) = unauthorized(&headers) {
        return response;
    }
    let before = guard.records.len();
    guard.records.retain(|record| record["id"] != id);
    if guard.records.len() == before {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "NOT_FOUND"}))).into_response();
    }
    Json(json!({"deleted": true, "id": id})).into_response()
}

struct TestRelay {
    child: Child,
    base_url: String,
    _server_guard: MutexGuard<'static, ()>,
}

impl TestRelay {
    fn start(upstream: &FakeUpstream) -> TestResult<Self> {
        Self::start_with_args(upstream, TOKEN, &[])
    }

    fn start_with_args(upstream: &FakeUpstream, token: &str, extra: &[&str]) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let addr: SocketAddr = format!("127.0.0.1:{port}").parse()?;

            let mut child = Command::new(env!("CARGO_BIN_EXE_rowrelay"))
                .arg("serve")
                .arg("--host")
                .arg("127.0.0.1")
                .arg("--port")
                .arg(port.to_string())
                .arg("--token")
                .arg(token)
                .arg("--base-id")
                .arg(BASE_ID)
                .arg("--table")
                .arg("Clientes")
                .arg("--api-url")
                .arg(&upstream.api_url)
                .args(extra)
                .env("RUST_LOG", "warn")
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()?;

            match wait_for_relay(&mut child, addr) {
                Ok(()) => {
                    return Ok(Self {
                        child,
                        base_url: format!("http://{addr}"),
                        _server_guard: guard,
                    });
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "relay failed to start".into()))
    }

    fn client(&self) -> TestResult<RelayClient> {
        Ok(RelayClient::new(self.base_url.clone())?)
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn health_reports_table() -> TestResult<()> {
    let upstream = FakeUpstream::start(&[])?;
    let relay = TestRelay::start(&upstream)?;
    let health = relay.client()?.health()?;
    assert_eq!(health, json!({"ok": true, "table": "Clientes"}));
    Ok(())
}

#[test]
fn list_clamps_page_size_and_sorts_by_name() -> TestResult<()> {
    let names: Vec<String> = (0..60).map(|n| format!("cliente {n:02}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let upstream = FakeUpstream::start(&refs)?;
    let relay = TestRelay::start(&upstream)?;

    let body: Value = ureq::get(&format!("{}/api/records?pageSize=500", relay.base_url))
        .call()?
        .into_json()?;
    let records = body["records"].as_array().ok_or("records array")?;
    assert_eq!(records.len(), 50);
    assert_eq!(body["offset"], "itr50");

    let seen = upstream.seen("GET");
    let query = &seen.last().ok_or("list request")?.query;
    assert_eq!(query.get("pageSize").map(String::as_str), Some("50"));
    assert_eq!(query.get("sort[0][field]").map(String::as_str), Some("nome"));
    assert_eq!(query.get("sort[0][direction]").map(String::as_str), Some("asc"));
    assert!(!query.contains_key("filterByFormula"));
    Ok(())
}

#[test]
fn search_sends_case_insensitive_formula() -> TestResult<()> {
    let upstream = FakeUpstream::start(&["Ana", "Bruno", "Mariana"])?;
    let relay = TestRelay::start(&upstream)?;

    let page = relay
        .client()?
        .list(&ListQuery::new(PageSize::default()).with_search("ANA"))?;
    let names: Vec<&str> = page.records.iter().map(|r| r.fields.nome.as_str()).collect();
    assert_eq!(names, vec!["Ana", "Mariana"]);

    let seen = upstream.seen("GET");
    let formula = seen
        .last()
        .and_then(|request| request.query.get("filterByFormula"))
        .ok_or("formula")?;
    assert_eq!(formula, "SEARCH(LOWER(\"ANA\"), LOWER({nome}))");
    Ok(())
}

#[test]
fn create_update_delete_round_trip() -> TestResult<()> {
    let upstream = FakeUpstream::start(&[])?;
    let relay = TestRelay::start(&upstream)?;
    let client = relay.client()?;

    let created = client.create(&NewRecord::new("Ana", "ana@example.com", None)?)?;
    assert_eq!(created.fields.nome, "Ana");
    let posted = upstream.seen("POST");
    assert_eq!(
        posted[0].body,
        Some(json!({"fields": {"nome": "Ana", "email": "ana@example.com"}}))
    );

    let mut body = Map::new();
    body.insert("telefone".to_string(), json!("123"));
    body.insert("id".to_string(), json!("recHacked"));
    let updated = client.update(&created.id, &FieldPatch::whitelist(&body)?)?;
    assert_eq!(updated.fields.telefone.as_deref(), Some("123"));
    let patched = upstream.seen("PATCH");
    assert_eq!(patched[0].path, created.id);
    assert_eq!(patched[0].body, Some(json!({"fields": {"telefone": "123"}})));

    let ack = client.delete(&created.id)?;
    assert!(ack.deleted);
    assert_eq!(ack.id, created.id);
    assert!(client.list(&ListQuery::new(PageSize::default()))?.records.is_empty());
    Ok(())
}

#[test]
fn invalid_writes_never_reach_upstream() -> TestResult<()> {
    let upstream = FakeUpstream::start(&["Ana"])?;
    let relay = TestRelay::start(&upstream)?;

    let result = ureq::post(&format!("{}/api/records", relay.base_url))
        .set("Content-Type", "application/json")
        .send_string(r#"{"nome":"Ana"}"#);
    match result {
        Err(ureq::Error::Status(code, resp)) => {
            assert_eq!(code, 400);
            let body: Value = resp.into_json()?;
            assert_eq!(body["error"]["message"], "Required fields: nome and email.");
        }
        other => return Err(format!("expected 400, got {other:?}").into()),
    }

    let result = ureq::request("PATCH", &format!("{}/api/records/rec0001", relay.base_url))
        .set("Content-Type", "application/json")
        .send_string(r#"{"cpf":"1"}"#);
    match result {
        Err(ureq::Error::Status(code, _)) => assert_eq!(code, 400),
        other => return Err(format!("expected 400, got {other:?}").into()),
    }

    assert!(upstream.seen("POST").is_empty());
    assert!(upstream.seen("PATCH").is_empty());
    Ok(())
}

#[test]
fn upstream_errors_are_relayed_with_status() -> TestResult<()> {
    let upstream = FakeUpstream::start(&["Ana"])?;
    let relay = TestRelay::start_with_args(&upstream, "patWrong", &[])?;
    let client = relay.client()?;

    let err = client
        .list(&ListQuery::new(PageSize::default()))
        .err()
        .ok_or("expected error")?;
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.message(), Some("Authentication required"));
    Ok(())
}

#[test]
fn unknown_record_is_not_found() -> TestResult<()> {
    let upstream = FakeUpstream::start(&[])?;
    let relay = TestRelay::start(&upstream)?;
    let err = relay
        .client()?
        .delete("recMissing")
        .err()
        .ok_or("expected error")?;
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.message(), Some("NOT_FOUND"));
    Ok(())
}

#[test]
fn console_session_pages_forward_and_back() -> TestResult<()> {
    let names: Vec<String> = (0..25).map(|n| format!("cliente {n:02}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let upstream = FakeUpstream::start(&refs)?;
    let relay = TestRelay::start(&upstream)?;
    let mut session = Session::new(relay.client()?, PageSize::new(10));

    let page_names = |session: &Session<RelayClient>| -> Vec<String> {
        session
            .view()
            .rows()
            .iter()
            .map(|row| row.record.fields.nome.clone())
            .collect()
    };

    assert!(session.start());
    assert_eq!(page_names(&session)[0], "cliente 00");
    assert!(session.next());
    let second = page_names(&session);
    assert_eq!(second[0], "cliente 10");
    assert!(session.next());
    assert_eq!(page_names(&session).len(), 5);
    assert_eq!(session.view().pagination().label, "Page 3");
    assert!(!session.view().pagination().next_enabled);

    assert!(session.previous());
    assert_eq!(page_names(&session), second);
    assert_eq!(session.state().current_cursor(), Some("itr10"));
    assert!(session.previous());
    assert_eq!(session.state().current_cursor(), None);
    assert!(!session.view().pagination().prev_enabled);
    Ok(())
}

#[test]
fn console_save_failure_keeps_draft() -> TestResult<()> {
    let upstream = FakeUpstream::start(&["Ana"])?;
    let relay = TestRelay::start(&upstream)?;
    let mut session = Session::new(relay.client()?, PageSize::default());
    assert!(session.start());

    session.begin_edit(0)?;
    session.edit_field(0, "telefone", "555")?;
    {
        let mut guard = lock(&upstream.table);
        guard.records.clear();
    }
    assert!(!session.save_edit(0)?);
    let row = session.view().row(0).ok_or("row")?;
    assert_eq!(row.draft().map(|draft| draft.telefone.as_str()), Some("555"));
    assert!(session.view_mut().take_alert().is_some());
    Ok(())
}

#[test]
fn static_dir_is_served_beside_api() -> TestResult<()> {
    let upstream = FakeUpstream::start(&[])?;
    let assets = tempfile::tempdir()?;
    std::fs::write(assets.path().join("index.html"), "<h1>clientes</h1>")?;
    let dir = assets.path().to_str().ok_or("utf8 path")?;
    let relay = TestRelay::start_with_args(&upstream, TOKEN, &["--static-dir", dir])?;

    let body = ureq::get(&format!("{}/index.html", relay.base_url))
        .call()?
        .into_string()?;
    assert!(body.contains("clientes"));
    let health = relay.client()?.health()?;
    assert_eq!(health["ok"], true);
    Ok(())
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn wait_for_relay(child: &mut Child, addr: SocketAddr) -> TestResult<()> {
    let url = format!("http://{addr}/health");
    let start = Instant::now();
    loop {
        if let Ok(resp) = ureq::get(&url).call() {
            if resp.status() == 200 {
                return Ok(());
            }
        }
        if let Some(status) = child.try_wait()? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let detail = stderr.trim();
            return Err(format!(
                "relay exited before ready (status: {status}, stderr: {})",
                if detail.is_empty() { "<empty>" } else { detail }
            )
            .into());
        }
        if start.elapsed() > Duration::from_secs(10) {
            return Err("relay did not become ready".into());
        }
        sleep(Duration::from_millis(25));
    }
}
