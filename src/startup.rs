//! Application startup and bootstrap logic.
//!
//! Kept out of `main.rs` so the boot sequence can be exercised by tests.

use std::sync::Arc;

use axum::Router;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;
use crate::payload::PayloadStore;
use crate::server::routes::build_router;
use crate::server::AppState;

/// Resolve the configuration file path.
///
/// Priority:
/// 1. `POLYGLOT_CONFIG` environment variable
/// 2. `./polyglot.toml` if it exists
/// 3. None (use defaults)
pub fn resolve_config_path() -> Option<String> {
    std::env::var("POLYGLOT_CONFIG").ok().or_else(|| {
        let default = "polyglot.toml";
        std::path::Path::new(default)
            .exists()
            .then(|| default.to_string())
    })
}

/// Initialize tracing subscriber from logging config.
///
/// Supports JSON and plain text formats. Uses `RUST_LOG` env var if set,
/// otherwise falls back to `config.logging.level`.
pub fn init_logging(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

/// Load the payload store and build the application router.
///
/// Fails when the payload directory is unreadable or yields no variants;
/// the process must not start serving in that case.
pub fn build_app(config: Config) -> Result<Router> {
    tracing::info!("polyglot starting");
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        payload_dir = %config.payloads.dir.display(),
        read_timeout_secs = config.server.read_timeout_secs,
        write_timeout_secs = config.server.write_timeout_secs,
        idle_timeout_secs = config.server.idle_timeout_secs,
        max_connections = config.server.max_connections,
        max_request_body_bytes = config.server.max_request_body_bytes,
        "configuration loaded"
    );

    crate::metrics::init();

    let store = PayloadStore::build(&config.payloads.dir)?;
    crate::metrics::PAYLOAD_VARIANTS.set(store.len() as i64);
    tracing::info!(variants = store.len(), "payload store ready");

    let state = AppState {
        store: Arc::new(store),
        config: Arc::new(config),
    };

    Ok(build_router(state))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolyglotError;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.payloads.dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_resolve_config_path_from_env() {
        let original = std::env::var("POLYGLOT_CONFIG").ok();

        std::env::set_var("POLYGLOT_CONFIG", "foo.toml");
        let path = resolve_config_path();

        match original {
            Some(v) => std::env::set_var("POLYGLOT_CONFIG", v),
            None => std::env::remove_var("POLYGLOT_CONFIG"),
        }

        assert_eq!(path, Some("foo.toml".to_string()));
    }

    #[test]
    fn test_build_app_with_payloads() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("en.json"), r#"{"hello":"world"}"#).unwrap();

        assert!(build_app(test_config(tmp.path())).is_ok());
    }

    #[test]
    fn test_build_app_empty_dir_fails() {
        let tmp = tempfile::tempdir().unwrap();

        let err = build_app(test_config(tmp.path())).unwrap_err();
        assert!(matches!(err, PolyglotError::NoPayloads { .. }));
    }

    #[test]
    fn test_build_app_only_malformed_files_fails() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("broken.json"), "{").unwrap();

        let err = build_app(test_config(tmp.path())).unwrap_err();
        assert!(matches!(err, PolyglotError::NoPayloads { .. }));
    }

    #[test]
    fn test_build_app_missing_dir_fails() {
        let tmp = tempfile::tempdir().unwrap();

        let err = build_app(test_config(&tmp.path().join("nope"))).unwrap_err();
        assert!(matches!(err, PolyglotError::PayloadDirUnreadable { .. }));
    }
}
