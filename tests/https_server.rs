//! End-to-end tests over real TLS connections.
//!
//! Each test mints a self-signed certificate with rcgen, starts the server on
//! an ephemeral loopback port and talks to it with a reqwest client that
//! trusts that certificate.
//!
//! Run with: cargo test --test https_server
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use quizserve::http::{redirect, HttpsServer, ServerError, ServerHandle, ServerState};
use quizserve::{create_router, AppConfig, StartupError};
use tempfile::TempDir;
use tokio::task::JoinHandle;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

struct Certificate {
    cert_path: PathBuf,
    key_path: PathBuf,
    pem: String,
}

/// Write a self-signed certificate for localhost and 127.0.0.1 into `dir`.
fn write_certificate(dir: &Path) -> Certificate {
    let certified = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .expect("Failed to generate certificate");

    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    let pem = certified.cert.pem();
    std::fs::write(&cert_path, &pem).unwrap();
    std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

    Certificate {
        cert_path,
        key_path,
        pem,
    }
}

/// A document root resembling the quiz game page.
fn write_site(root: &Path) {
    std::fs::write(root.join("index.html"), "<h1>ArUco Quiz</h1>").unwrap();
    std::fs::write(root.join("aruco-detector.js"), "// detector").unwrap();
    std::fs::create_dir(root.join("markers")).unwrap();
    std::fs::write(root.join("markers").join("b.svg"), "<svg/>").unwrap();
    std::fs::write(root.join("markers").join("A <1>.svg"), "<svg/>").unwrap();
    std::fs::create_dir(root.join("markers").join("extra")).unwrap();
}

fn test_config(root: &Path, cert: &Certificate, port: u16) -> AppConfig {
    let mut config = AppConfig::default();
    config.http.host = "127.0.0.1".to_string();
    config.http.port = port;
    config.http.shutdown_grace_seconds = 1;
    config.tls.cert_path = cert.cert_path.clone();
    config.tls.key_path = cert.key_path.clone();
    config.files.root = root.to_path_buf();
    config
}

/// Running server plus everything it needs to stay alive.
struct TestServer {
    addr: SocketAddr,
    handle: ServerHandle,
    task: JoinHandle<Result<(), ServerError>>,
    client: reqwest::Client,
    _root: TempDir,
    _tls: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    async fn start_with(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let root = tempfile::tempdir().unwrap();
        let tls = tempfile::tempdir().unwrap();
        write_site(root.path());
        let cert = write_certificate(tls.path());

        let mut config = test_config(root.path(), &cert, 0);
        configure(&mut config);

        let server = HttpsServer::bind(&config, create_router(&config))
            .await
            .expect("Failed to bind test server");
        let addr = server.local_addr();
        let handle = server.handle();
        let task = tokio::spawn(server.serve());

        let state = tokio::time::timeout(STARTUP_TIMEOUT, handle.wait_for(ServerState::Listening))
            .await
            .expect("Server did not start listening in time");
        assert_eq!(state, ServerState::Listening);

        let client = reqwest::Client::builder()
            .add_root_certificate(reqwest::Certificate::from_pem(cert.pem.as_bytes()).unwrap())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            addr,
            handle,
            task,
            client,
            _root: root,
            _tls: tls,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("https://127.0.0.1:{}{}", self.addr.port(), path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Request failed")
    }
}

/// A port that was free a moment ago.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Poll `condition` until it holds, panicking after a few seconds.
async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..50 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("Timed out waiting for {}", what);
}

#[tokio::test]
async fn serves_existing_file_over_tls() {
    let server = TestServer::start().await;

    let response = server.get("/aruco-detector.js").await;
    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("javascript"), "got {}", content_type);
    assert_eq!(response.text().await.unwrap(), "// detector");
}

#[tokio::test]
async fn root_serves_index_html() {
    let server = TestServer::start().await;

    let response = server.get("/").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "<h1>ArUco Quiz</h1>");
}

#[tokio::test]
async fn missing_file_is_404_and_server_keeps_serving() {
    let server = TestServer::start().await;

    let response = server.get("/does-not-exist.html").await;
    assert_eq!(response.status(), 404);

    let response = server.get("/missing/dir/").await;
    assert_eq!(response.status(), 404);

    let response = server.get("/index.html").await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn responses_carry_cache_and_request_id_headers() {
    let server = TestServer::start().await;

    let response = server.get("/index.html").await;
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "no-cache, max-age=0"
    );
    let request_id = response.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(request_id.len(), 36);
}

#[tokio::test]
async fn directory_without_index_is_listed() {
    let server = TestServer::start().await;

    let response = server.get("/markers/").await;
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();

    assert!(body.contains("Directory listing for /markers/"));
    assert!(body.contains("<a href=\"A%20%3C1%3E.svg\">A &lt;1&gt;.svg</a>"));
    assert!(body.contains("<a href=\"extra/\">extra/</a>"));

    let first = body.find("A &lt;1&gt;.svg").unwrap();
    let second = body.find(">b.svg<").unwrap();
    let third = body.find(">extra/<").unwrap();
    assert!(first < second && second < third);
}

#[tokio::test]
async fn directory_without_trailing_slash_redirects() {
    let server = TestServer::start().await;

    let response = server.get("/markers").await;
    assert!(response.status().is_redirection());
    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert!(location.ends_with("/markers/"), "got {}", location);
}

#[tokio::test]
async fn directory_listing_can_be_disabled() {
    let server = TestServer::start_with(|config| config.files.directory_listing = false).await;

    let response = server.get("/markers/").await;
    assert_eq!(response.status(), 404);

    let response = server.get("/markers/b.svg").await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn shutdown_stops_accepting_connections() {
    let server = TestServer::start().await;
    assert_eq!(server.get("/").await.status(), 200);

    server.handle.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(5), server.task)
        .await
        .expect("Server did not stop in time")
        .expect("Server task panicked");
    assert!(result.is_ok());
    assert_eq!(server.handle.state(), ServerState::Stopped);

    assert!(TcpStream::connect(server.addr).is_err());
}

#[tokio::test]
async fn missing_certificate_fails_before_binding() {
    let root = tempfile::tempdir().unwrap();
    let tls = tempfile::tempdir().unwrap();
    let cert = Certificate {
        cert_path: tls.path().join("cert.pem"),
        key_path: tls.path().join("key.pem"),
        pem: String::new(),
    };
    let port = free_port();
    let config = test_config(root.path(), &cert, port);

    let err = match HttpsServer::bind(&config, create_router(&config)).await {
        Ok(_) => panic!("bind succeeded without a certificate"),
        Err(e) => e,
    };

    assert!(matches!(err, StartupError::Server(ServerError::Tls { .. })));
    assert_eq!(err.exit_code(), 3);
    assert!(err.to_string().contains("cert.pem"));

    // Nothing was left listening on the configured port
    assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
}

#[tokio::test]
async fn invalid_certificate_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let tls = tempfile::tempdir().unwrap();
    let cert = write_certificate(tls.path());
    std::fs::write(&cert.cert_path, "-----BEGIN CERTIFICATE-----\ngarbage\n").unwrap();
    let config = test_config(root.path(), &cert, 0);

    let err = match HttpsServer::bind(&config, create_router(&config)).await {
        Ok(_) => panic!("bind succeeded with a corrupt certificate"),
        Err(e) => e,
    };
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn port_in_use_is_a_bind_error() {
    let root = tempfile::tempdir().unwrap();
    let tls = tempfile::tempdir().unwrap();
    let cert = write_certificate(tls.path());

    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();
    let config = test_config(root.path(), &cert, port);

    let err = match HttpsServer::bind(&config, create_router(&config)).await {
        Ok(_) => panic!("bind succeeded on an occupied port"),
        Err(e) => e,
    };

    assert!(matches!(err, StartupError::Server(ServerError::Bind { .. })));
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn mismatched_certificate_and_key_are_rejected() {
    let root = tempfile::tempdir().unwrap();
    let tls = tempfile::tempdir().unwrap();
    let cert = write_certificate(tls.path());

    // Replace the key with one from an unrelated certificate
    let other = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    std::fs::write(&cert.key_path, other.key_pair.serialize_pem()).unwrap();
    let config = test_config(root.path(), &cert, 0);

    let err = match HttpsServer::bind(&config, create_router(&config)).await {
        Ok(_) => panic!("bind succeeded with a mismatched key"),
        Err(e) => e,
    };

    assert!(matches!(err, StartupError::Server(ServerError::Tls { .. })));
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn redirect_listener_points_to_https_and_stops_with_server() {
    let server = TestServer::start().await;
    let redirect_addr = SocketAddr::from(([127, 0, 0, 1], free_port()));

    redirect::spawn_redirect_server(redirect_addr, server.addr.port(), server.handle.clone());
    wait_until("redirect listener", || TcpStream::connect(redirect_addr).is_ok()).await;

    let response = server
        .client
        .get(format!("http://{}/x?y=1", redirect_addr))
        .send()
        .await
        .expect("Redirect request failed");
    assert_eq!(response.status(), 308);
    assert_eq!(
        response.headers().get("location").unwrap().to_str().unwrap(),
        format!("https://127.0.0.1:{}/x?y=1", server.addr.port())
    );

    server.handle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), server.task)
        .await
        .expect("Server did not stop in time")
        .expect("Server task panicked")
        .expect("Server returned an error");

    wait_until("redirect listener to close", || {
        TcpStream::connect(redirect_addr).is_err()
    })
    .await;
}
