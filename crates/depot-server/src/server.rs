use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use depot_index::{FileIndex, MemoryFileIndex, PersistentFileIndex};
use depot_protocol::Limits;
use depot_store::BlobStore;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::service::FileService;
use crate::session::run_session;

/// The depot TCP server.
///
/// Owns the shared blob store and index handles and hands each accepted
/// connection a session-scoped [`FileService`] over them. Session
/// concurrency is bounded by a semaphore sized to
/// `min(worker_threads, available_parallelism)`; when all permits are
/// taken, accepted connections wait in the listen backlog.
pub struct FileServer {
    config: ServerConfig,
    index: Arc<dyn FileIndex>,
    blobs: Arc<BlobStore>,
    state: Arc<ServerState>,
    acceptor: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

struct ServerState {
    running: AtomicBool,
    active: AtomicUsize,
    shutdown: Notify,
    sessions: Mutex<JoinSet<()>>,
}

impl FileServer {
    /// Build a server from configuration. Opens the persistent index if
    /// one is configured, otherwise the index lives in memory.
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let index: Arc<dyn FileIndex> = match &config.index_path {
            Some(path) => Arc::new(PersistentFileIndex::open(path).await?),
            None => Arc::new(MemoryFileIndex::new()),
        };
        let blobs = Arc::new(BlobStore::new(config.storage_root.clone()));
        Ok(Self {
            config,
            index,
            blobs,
            state: Arc::new(ServerState {
                running: AtomicBool::new(false),
                active: AtomicUsize::new(0),
                shutdown: Notify::new(),
                sessions: Mutex::new(JoinSet::new()),
            }),
            acceptor: None,
            local_addr: None,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The bound address, available once started. With a port of 0 in the
    /// config this is where the kernel actually put the listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Number of sessions currently in flight.
    pub fn active_connections(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Bind the listener and spawn the acceptor loop.
    pub async fn start(&mut self) -> ServerResult<()> {
        if self.state.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::Internal("server already running".into()));
        }

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local = listener.local_addr()?;
        self.local_addr = Some(local);

        let workers = self.config.effective_workers();
        tracing::info!(addr = %local, workers, "file server listening");

        let state = Arc::clone(&self.state);
        let index = Arc::clone(&self.index);
        let blobs = Arc::clone(&self.blobs);
        let limits = self.config.limits();
        let semaphore = Arc::new(Semaphore::new(workers));

        self.acceptor = Some(tokio::spawn(accept_loop(
            listener, state, index, blobs, limits, semaphore,
        )));
        Ok(())
    }

    /// Graceful shutdown: stop accepting, drain in-flight sessions up to
    /// the configured grace period, then abort whatever remains, and
    /// close the index.
    pub async fn stop(&mut self) -> ServerResult<()> {
        if !self.state.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("stopping file server");
        self.state.shutdown.notify_one();
        if let Some(handle) = self.acceptor.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "acceptor task failed");
            }
        }

        let deadline = Instant::now() + self.config.shutdown_grace();
        while self.state.active.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let leftover = self.state.active.load(Ordering::SeqCst);
        if leftover > 0 {
            tracing::warn!(sessions = leftover, "forcing shutdown of in-flight sessions");
            self.state.sessions.lock().expect("lock poisoned").abort_all();
            self.state.active.store(0, Ordering::SeqCst);
        }

        self.index.close().await?;
        tracing::info!("file server stopped");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    index: Arc<dyn FileIndex>,
    blobs: Arc<BlobStore>,
    limits: Limits,
    semaphore: Arc<Semaphore>,
) {
    loop {
        // Take a worker permit first; accepting waits while the pool is
        // saturated, which is the backpressure the bounded pool provides.
        let permit = tokio::select! {
            _ = state.shutdown.notified() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let (stream, peer) = tokio::select! {
            _ = state.shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    if !state.running.load(Ordering::SeqCst) {
                        break;
                    }
                    tracing::error!(error = %e, "error accepting connection");
                    continue;
                }
            },
        };
        tracing::debug!(%peer, "connection accepted");

        let service = FileService::new(Arc::clone(&index), Arc::clone(&blobs), limits);
        state.active.fetch_add(1, Ordering::SeqCst);
        let session_state = Arc::clone(&state);

        let mut sessions = state.sessions.lock().expect("lock poisoned");
        // Reap already-finished session entries before adding one.
        while sessions.try_join_next().is_some() {}
        sessions.spawn(async move {
            run_session(stream, peer, service).await;
            session_state.active.fetch_sub(1, Ordering::SeqCst);
            drop(permit);
        });
    }
    tracing::info!("acceptor stopped");
}

impl std::fmt::Debug for FileServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileServer")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .field("active", &self.active_connections())
            .finish()
    }
}
