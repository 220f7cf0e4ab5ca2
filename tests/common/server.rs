use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use polyglot::config::Config;
use polyglot::server::listener;
use polyglot::startup::build_app;

/// A polyglot server running in-process on an ephemeral port.
pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
    // Kept alive for the server's lifetime.
    _payload_dir: Option<tempfile::TempDir>,
}

impl TestServer {
    /// Stop accepting, drain, and wait for the accept loop to return.
    pub async fn stop(mut self) -> std::io::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.handle).await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Config with test-friendly bounds, reading payloads from `dir`.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.read_timeout_secs = 5;
    config.server.write_timeout_secs = 10;
    config.server.idle_timeout_secs = 30;
    config.server.max_connections = 1000;
    config.server.max_request_body_bytes = 1024 * 1024;
    config.server.shutdown_timeout_secs = 5;
    config.payloads.dir = dir.to_path_buf();
    config
}

/// Write `files` into a fresh temp directory.
pub fn payload_dir(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::TempDir::new().unwrap();
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

/// Three small localized payloads: de, en, fr.
pub fn default_payloads() -> tempfile::TempDir {
    payload_dir(&[
        ("de.json", r#"{"greeting":"Hallo","locale":"de"}"#),
        ("en.json", r#"{"greeting":"Hello","locale":"en"}"#),
        ("fr.json", r#"{"greeting":"Bonjour","locale":"fr"}"#),
    ])
}

/// Start a server on `config`. `config.payloads.dir` must already hold payloads.
pub async fn start_server(config: Config) -> TestServer {
    start_inner(config, None).await
}

/// Start a server that owns `dir`, with `tweak` applied to the test config.
pub async fn start_server_with(
    dir: tempfile::TempDir,
    tweak: impl FnOnce(&mut Config),
) -> TestServer {
    let mut config = test_config(dir.path());
    tweak(&mut config);
    start_inner(config, Some(dir)).await
}

/// Start a server with the default three payloads and default test bounds.
pub async fn start_test_server() -> TestServer {
    start_server_with(default_payloads(), |_| {}).await
}

async fn start_inner(config: Config, dir: Option<tempfile::TempDir>) -> TestServer {
    let limits = config.server.connection_limits();
    let drain = Duration::from_secs(config.server.shutdown_timeout_secs);
    let app = build_app(config).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        listener::serve(listener, app, limits, drain, async {
            let _ = rx.await;
        })
        .await
    });

    TestServer {
        base_url: format!("http://{addr}"),
        addr,
        shutdown: Some(tx),
        handle,
        _payload_dir: dir,
    }
}

/// Find a user id that `assign` maps to `index` out of `count` variants.
pub fn user_for_variant(prefix: &str, index: usize, count: usize) -> String {
    (0..)
        .map(|i| format!("{prefix}-{i}"))
        .find(|id| polyglot::assignment::assign(id, count) == index)
        .unwrap()
}
