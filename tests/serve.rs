//! End-to-end over a real socket: routing, JSON in and out, CORS, and
//! graceful shutdown.

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use stack_gateway::{
    Context, Cors, Error, Registry, RegistryError, Router, Server, Service, health,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, oneshot};

#[derive(Debug, Deserialize, PartialEq, Serialize)]
struct Note {
    title: String,
    tags: Vec<String>,
}

async fn create_note(mut ctx: Context) -> Result<(), Error> {
    match ctx.bind::<Note>().await {
        Ok(note) => ctx.json(&note, StatusCode::CREATED),
        Err(e) => ctx.json(&serde_json::json!({ "_message": e.to_string() }), StatusCode::BAD_REQUEST),
    }
}

async fn show_note(mut ctx: Context) -> Result<(), Error> {
    let prefix = ctx.datastore::<String>().cloned().unwrap_or_default();
    let body = serde_json::json!({ "id": format!("{prefix}{}", ctx.param("id")) });
    ctx.json(&body, StatusCode::OK)
}

/// Sends one HTTP/1.1 request with `Connection: close` and returns the raw
/// response text.
async fn roundtrip(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

fn body_of(raw: &str) -> &str {
    raw.split_once("\r\n\r\n").map_or("", |(_, body)| body)
}

#[tokio::test]
async fn serves_routes_over_tcp_and_drains_on_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new()
        .with_datastore(String::from("note-"))
        .post("/notes", create_note)
        .get("/notes/{id}", show_note)
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(
        Server::from_listener(listener).cors(Cors::permissive()).serve_with_shutdown(app, async {
            let _ = stop_rx.await;
        }),
    );

    let raw = roundtrip(
        addr,
        "GET /notes/5 HTTP/1.1\r\nHost: x\r\nOrigin: https://app.example\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");
    assert!(raw.to_ascii_lowercase().contains("access-control-allow-origin: *"));
    assert!(raw.to_ascii_lowercase().contains("content-type: application/json"));
    let body: serde_json::Value = serde_json::from_str(body_of(&raw)).unwrap();
    assert_eq!(body, serde_json::json!({ "id": "note-5" }));

    let payload = r#"{"title":"groceries","tags":["home"]}"#;
    let raw = roundtrip(
        addr,
        &format!(
            "POST /notes HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{payload}",
            payload.len()
        ),
    )
    .await;
    assert!(raw.starts_with("HTTP/1.1 201"), "{raw}");
    let note: Note = serde_json::from_str(body_of(&raw)).unwrap();
    assert_eq!(note, Note { title: "groceries".into(), tags: vec!["home".into()] });

    let raw = roundtrip(
        addr,
        "POST /notes HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nConnection: close\r\n\r\n{oops",
    )
    .await;
    assert!(raw.starts_with("HTTP/1.1 400"), "{raw}");
    assert!(body_of(&raw).contains("_message"));

    let raw = roundtrip(
        addr,
        "OPTIONS /notes HTTP/1.1\r\nHost: x\r\nOrigin: https://app.example\r\n\
         Access-Control-Request-Method: POST\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(raw.starts_with("HTTP/1.1 204"), "{raw}");
    assert!(raw.to_ascii_lowercase().contains("access-control-allow-methods"));

    for (path, expected) in [("/healthz", r#"{"status":"ok"}"#), ("/readyz", r#"{"status":"ready"}"#)] {
        let raw = roundtrip(
            addr,
            &format!("GET {path} HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n"),
        )
        .await;
        assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");
        assert!(raw.to_ascii_lowercase().contains("content-type: application/json"));
        assert_eq!(body_of(&raw), expected);
    }

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn bind_failure_surfaces_as_io_error() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap();
    let err = Server::bind(addr)
        .serve_with_shutdown(Router::new(), async {})
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

struct Recording(Arc<Mutex<Vec<Service>>>);

#[async_trait]
impl Registry for Recording {
    async fn register(&self, service: &Service) -> Result<(), RegistryError> {
        if service.name.is_empty() {
            return Err(RegistryError::failed("service name required"));
        }
        self.0.lock().await.push(service.clone());
        Ok(())
    }
}

#[tokio::test]
async fn register_forwards_to_registry_without_retry() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().with_registry(Recording(Arc::clone(&seen)));

    let svc = Service::new("notes", "127.0.0.1", 8080).health_check("/healthz");
    app.register(&svc).await.unwrap();

    let err = app.register(&Service::new("", "127.0.0.1", 8080)).await.unwrap_err();
    assert!(matches!(err, Error::Registry(RegistryError::Failed(_))));
    assert_eq!(*seen.lock().await, vec![svc]);
}
