//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own database and temp dir.

use super::constants::*;
use super::engine::{EngineBehavior, ScriptedEngine};
use super::fixtures::create_test_db_with_users;
use audio_humanizer_server::enhancement::{EnhancementPipeline, TempFileManager};
use audio_humanizer_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use audio_humanizer_server::user::{CreditStatus, FullUserStore, SqliteUserStore, UserManager};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Knobs for [`TestServer::spawn_with`].
#[derive(Debug, Clone)]
pub struct TestServerOptions {
    pub engine_behavior: EngineBehavior,
    pub engine_delay: Duration,
    pub charge_simulated: bool,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            engine_behavior: EngineBehavior::Enhance,
            engine_delay: Duration::ZERO,
            charge_simulated: true,
        }
    }
}

/// Test server instance with isolated database and temp dir
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// User store for direct database access in tests
    pub user_store: Arc<dyn FullUserStore>,

    /// The engine behind the pipeline
    pub engine: Arc<ScriptedEngine>,

    /// Where uploads and results are stored while a request is in flight
    pub temp_files_dir: PathBuf,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with a working engine
    pub async fn spawn() -> Self {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be created, the port cannot be bound,
    /// or the server doesn't become ready within the timeout.
    pub async fn spawn_with(options: TestServerOptions) -> Self {
        let (temp_db_dir, db_path) =
            create_test_db_with_users().expect("Failed to create test database");

        let user_store: Arc<dyn FullUserStore> =
            Arc::new(SqliteUserStore::new(&db_path).expect("Failed to open user store"));
        let user_manager = Arc::new(UserManager::new(user_store.clone(), TEST_FREE_CREDITS));

        let temp_files_dir = temp_db_dir.path().join("tmp");
        let temp_files = Arc::new(TempFileManager::new(
            &temp_files_dir,
            Duration::from_secs(60),
        ));
        temp_files
            .init()
            .await
            .expect("Failed to create temp files dir");

        let engine = Arc::new(ScriptedEngine::new(
            options.engine_behavior,
            options.engine_delay,
        ));
        let pipeline = Arc::new(EnhancementPipeline::new(
            engine.clone(),
            Duration::ZERO,
            temp_files,
        ));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            frontend_dir_path: None,
            max_upload_bytes: TEST_MAX_UPLOAD_BYTES,
            charge_simulated: options.charge_simulated,
        };

        let app = make_app(config, user_manager, pipeline).expect("Failed to build app");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            user_store,
            engine,
            temp_files_dir,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Credit balance of a fixture user, read straight from the database
    pub fn credit_status(&self, user_handle: &str) -> CreditStatus {
        let user_id = self
            .user_store
            .get_user_id(user_handle)
            .expect("Failed to look up user")
            .expect("Unknown user");
        self.user_store
            .get_credit_status(user_id)
            .expect("Failed to read credits")
            .expect("Unknown user")
    }

    /// Files currently present in the temp files dir
    pub fn temp_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.temp_files_dir)
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    /// Waits until every temporary file has been removed
    ///
    /// # Panics
    ///
    /// Panics if files are still around after the readiness timeout.
    pub async fn wait_for_temp_files_cleanup(&self) {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);
        loop {
            let remaining = self.temp_files();
            if remaining.is_empty() {
                return;
            }
            if start.elapsed() > timeout {
                panic!("Temporary files were not cleaned up: {:?}", remaining);
            }
            tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
        }
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
