//! End-to-end tests driving the HTTP API through the router.

use axum::Router;
use axum::body::{Body, Bytes, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use cirrus::auth::JwtAuthenticator;
use cirrus::{AppState, router};
use cirrus_cache::{Database, Repository};
use cirrus_storage::backend::LocalBackend;
use cirrus_storage::{BackendHandle, Owner, validate_path};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "integration-secret";
const BOUNDARY: &str = "----cirrus-test-boundary";
const ALICE: &str = "alice@example.com";

struct Harness {
    _temp_dir: TempDir,
    _db: Database,
    app: Router,
    backend: BackendHandle,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}
impl Reply {
    fn text(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap()
    }

    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a [u8]),
}

fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
                body.extend_from_slice(value.as_bytes());
            },
            Part::File(file_name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            },
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn token(email: &str) -> String {
    JwtAuthenticator::new(SECRET).issue(email, Duration::from_secs(3600)).unwrap()
}

impl Harness {
    async fn new() -> Self {
        Self::with_public_url(None).await
    }

    async fn with_public_url(public_base_url: Option<&str>) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend: BackendHandle = Arc::new(LocalBackend::new("test", temp_dir.path()).unwrap());
        let db = Database::connect_in_memory().await.unwrap();
        let state = AppState {
            backend: backend.clone(),
            cache: Repository::from(&db),
            auth: Arc::new(JwtAuthenticator::new(SECRET)),
            summarizer: None,
            public_base_url: public_base_url.map(str::to_string),
        };
        let app = router(state, &[], 10 * 1024 * 1024).unwrap();
        Self { _temp_dir: temp_dir, _db: db, app, backend }
    }

    async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        Reply { status, headers, body }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> Reply {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token(ALICE)));
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            },
            None => Body::empty(),
        };
        self.send(request.body(body).unwrap()).await
    }

    async fn upload(&self, parts: &[Part<'_>]) -> Reply {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(header::AUTHORIZATION, format!("Bearer {}", token(ALICE)))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart(parts)))
            .unwrap();
        self.send(request).await
    }

    async fn list(&self, folder: &str) -> Vec<Value> {
        let reply = self.call(Method::GET, &format!("/files?folder={folder}"), None).await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.text());
        match reply.json() {
            Value::Array(entries) => entries,
            other => panic!("expected an array, got {other}"),
        }
    }

    async fn put(&self, path: &str, data: &[u8]) {
        let owner = Owner::new(ALICE).unwrap();
        self.backend.write(&owner, &validate_path(path).unwrap(), data).await.unwrap();
    }
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let h = Harness::new().await;
    let reply = h.send(Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "OK");
}

#[tokio::test]
async fn test_missing_and_invalid_tokens() {
    let h = Harness::new().await;
    let reply = h.send(Request::get("/files").body(Body::empty()).unwrap()).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    for value in ["Bearer not-a-token", "Basic YWxpY2U6cGFzcw==", "Bearer "] {
        let request = Request::get("/files").header(header::AUTHORIZATION, value).body(Body::empty()).unwrap();
        assert_eq!(h.send(request).await.status, StatusCode::FORBIDDEN, "{value}");
    }

    let foreign = JwtAuthenticator::new("some-other-secret").issue(ALICE, Duration::from_secs(60)).unwrap();
    let request = Request::get("/files")
        .header(header::AUTHORIZATION, format!("Bearer {foreign}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(h.send(request).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_upload_rename_delete() {
    let h = Harness::new().await;
    let reply = h.upload(&[Part::Text("folderPath", "docs"), Part::File("report.pdf", &[0u8; 2048])]).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text());
    assert_eq!(reply.text(), "File uploaded successfully!");
    assert!(reply.headers.get(header::LOCATION).is_none());

    let entries = h.list("docs").await;
    assert_eq!(entries.len(), 1);
    let stored = entries[0]["name"].as_str().unwrap().to_string();
    assert!(stored.ends_with("-report.pdf"), "{stored}");
    assert_eq!(entries[0]["isFolder"], json!(false));
    assert_eq!(entries[0]["size"], json!("2.00"));
    assert!(entries[0]["time"].as_str().unwrap().contains('T'));

    let reply = h
        .call(
            Method::POST,
            "/rename",
            Some(json!({"oldPath": format!("docs/{stored}"), "newPath": "docs/finalreport.pdf"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text());
    let entries = h.list("docs").await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], json!("finalreport.pdf"));
    assert_eq!(entries[0]["size"], json!("2.00"));

    let reply = h.call(Method::DELETE, "/delete/docs/finalreport.pdf", None).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text());
    assert!(h.list("docs").await.is_empty());

    let reply = h.call(Method::DELETE, "/delete/docs/finalreport.pdf", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_with_file_before_folder() {
    let h = Harness::new().await;
    let reply = h.upload(&[Part::File("notes.txt", b"hello"), Part::Text("folderPath", "later")]).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text());
    let entries = h.list("later").await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0]["name"].as_str().unwrap().ends_with("-notes.txt"));
    assert!(h.list("").await.iter().any(|e| e["name"] == json!("later")));
}

#[tokio::test]
async fn test_upload_without_file() {
    let h = Harness::new().await;
    let reply = h.upload(&[Part::Text("folderPath", "docs")]).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.text(), "no file uploaded");
}

#[tokio::test]
async fn test_upload_advertises_public_url() {
    let h = Harness::with_public_url(Some("https://files.example.com/")).await;
    let reply = h.upload(&[Part::Text("folderPath", "pics"), Part::File("cat.png", b"meow")]).await;
    assert_eq!(reply.status, StatusCode::OK);
    let location = reply.headers.get(header::LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with("https://files.example.com/alice%40example.com/pics/"), "{location}");
    assert!(location.ends_with("-cat.png"), "{location}");
}

#[tokio::test]
async fn test_traversal_is_rejected() {
    let h = Harness::new().await;
    let reply = h.call(Method::GET, "/files?folder=../../etc", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let reply = h.call(Method::GET, "/download/..%2F..%2Fetc%2Fpasswd", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let reply = h.upload(&[Part::Text("folderPath", "../escape"), Part::File("x.txt", b"x")]).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let reply = h
        .call(Method::POST, "/rename", Some(json!({"oldPath": "a.txt", "newPath": "../../b.txt"})))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rename_onto_occupied_folder_conflicts() {
    let h = Harness::new().await;
    h.put("a.txt", b"a").await;
    h.put("docs/keep.txt", b"k").await;
    let reply = h.call(Method::POST, "/rename", Some(json!({"oldPath": "a.txt", "newPath": "docs"}))).await;
    assert_eq!(reply.status, StatusCode::CONFLICT, "{}", reply.text());
}

#[tokio::test]
async fn test_download() {
    let h = Harness::new().await;
    h.put("docs/report.pdf", b"%PDF-1.4 body").await;
    let reply = h.call(Method::GET, "/download/docs/report.pdf", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(reply.headers[header::CONTENT_LENGTH], "13");
    assert_eq!(reply.headers[header::CONTENT_DISPOSITION], "attachment; filename=\"report.pdf\"");
    assert_eq!(&reply.body[..], b"%PDF-1.4 body");

    let reply = h.call(Method::GET, "/download/docs/missing.pdf", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_folder() {
    let h = Harness::new().await;
    let reply = h
        .call(Method::POST, "/create-folder", Some(json!({"folderPath": "docs", "folderName": "2024"})))
        .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text());
    let entries = h.list("docs").await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], json!("2024"));
    assert_eq!(entries[0]["isFolder"], json!(true));
    assert_eq!(entries[0]["size"], json!("0.00"));

    let reply = h.call(Method::POST, "/create-folder", Some(json!({"folderName": ".."}))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analytics() {
    let h = Harness::new().await;
    let reply = h.call(Method::GET, "/analytics?folder=docs", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["summary"], json!("This folder is empty."));
    assert_eq!(body["stats"]["totalFiles"], json!(0));
    assert!(body.get("prose").is_none());

    h.upload(&[Part::Text("folderPath", "docs"), Part::File("report.pdf", &[0u8; 2048])]).await;
    h.upload(&[Part::Text("folderPath", "docs/pics"), Part::File("cat.png", b"meow")]).await;
    h.list("docs").await;

    let body = h.call(Method::GET, "/analytics?folder=docs", None).await.json();
    assert_eq!(body["stats"]["totalFiles"], json!(2));
    assert_eq!(body["stats"]["totalFolders"], json!(1));
    assert_eq!(body["stats"]["totalSize"], json!(2052));
    assert_eq!(body["stats"]["pdfCount"], json!(1));
    assert_eq!(body["stats"]["imageCount"], json!(1));
}

#[tokio::test]
async fn test_owners_are_isolated() {
    let h = Harness::new().await;
    h.put("secret.txt", b"alice only").await;
    assert_eq!(h.list("").await.len(), 1);

    let request = Request::get("/files")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("bob@example.com")))
        .body(Body::empty())
        .unwrap();
    let reply = h.send(request).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!([]));

    let request = Request::get("/download/secret.txt")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("bob@example.com")))
        .body(Body::empty())
        .unwrap();
    assert_eq!(h.send(request).await.status, StatusCode::NOT_FOUND);
}
