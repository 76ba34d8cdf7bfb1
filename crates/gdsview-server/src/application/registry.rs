//! Shared render sessions, keyed by resolved file path.
//!
//! Every client viewing the same file shares one [`SharedSession`]. The
//! registry counts attached clients per file; a [`SessionLease`] is a
//! client's claim on a session and gives it back exactly once, either via
//! [`SessionLease::release`] or on drop. When the last lease of an unpinned
//! session goes, the session is removed and closed, which drops the engine's
//! file handle. A later attach to the same path starts a fresh session.
//!
//! # Locking
//!
//! The map sits behind a `std::sync::Mutex` that is never held across an
//! `.await`. Each session has its own `tokio::sync::Mutex` that serializes
//! mutations and renders, and publishes a [`SessionSnapshot`] on a `watch`
//! channel whenever a guard is dropped so read-only queries never wait for a
//! render.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gdsview_core::GeometryEngine;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::paths::resolve_under_root;
use crate::application::render_session::{RenderSession, SessionSnapshot, SessionState};
use crate::domain::{ServerConfig, ViewError};

// ── Shared session ────────────────────────────────────────────────────────────

/// One render session plus its published snapshot.
pub struct SharedSession {
    id: Uuid,
    path: PathBuf,
    inner: tokio::sync::Mutex<RenderSession>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl SharedSession {
    fn new(path: PathBuf, session: RenderSession) -> Self {
        let (snapshot, _) = watch::channel(session.snapshot());
        Self {
            id: Uuid::new_v4(),
            path,
            inner: tokio::sync::Mutex::new(session),
            snapshot,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Resolved path of the file this session shows.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exclusive access to the session. The snapshot is republished when the
    /// guard is dropped.
    pub async fn lock(&self) -> SessionGuard<'_> {
        SessionGuard {
            guard: self.inner.lock().await,
            snapshot: &self.snapshot,
        }
    }

    /// Latest published snapshot. Never waits for a render.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    fn close_now(&self) {
        // Only called once no client holds a lease, so the lock is free
        // unless a dropped connection's task is still unwinding; that task
        // drops the last reference and the session with it.
        if let Ok(mut session) = self.inner.try_lock() {
            session.close();
            self.snapshot.send_replace(session.snapshot());
        }
    }
}

/// Lock guard over a [`RenderSession`].
pub struct SessionGuard<'a> {
    guard: tokio::sync::MutexGuard<'a, RenderSession>,
    snapshot: &'a watch::Sender<SessionSnapshot>,
}

impl Deref for SessionGuard<'_> {
    type Target = RenderSession;

    fn deref(&self) -> &RenderSession {
        &self.guard
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut RenderSession {
        &mut self.guard
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.snapshot.send_replace(self.guard.snapshot());
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

struct Entry {
    session: Arc<SharedSession>,
    clients: usize,
    pinned: bool,
}

struct RegistryInner {
    engine: Arc<dyn GeometryEngine>,
    config: Arc<ServerConfig>,
    entries: Mutex<HashMap<PathBuf, Entry>>,
}

impl RegistryInner {
    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reference-counted table of open sessions. Cheap to clone.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(engine: Arc<dyn GeometryEngine>, config: Arc<ServerConfig>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                engine,
                config,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.inner.config
    }

    /// Attaches a client to the session for `requested`, opening the file if
    /// this is the first client.
    ///
    /// # Errors
    ///
    /// Path resolution errors, and whatever opening the file fails with. A
    /// failed attach leaves no trace in the registry.
    pub async fn attach(&self, requested: &Path) -> Result<SessionLease, ViewError> {
        let path = resolve_under_root(&self.inner.config.root, requested)?;
        let session = self.claim(&path, false);
        let lease = SessionLease {
            registry: Arc::clone(&self.inner),
            path,
            session,
            released: false,
        };
        ensure_open(&lease.session).await?;
        debug!("client attached to session {} ({})", lease.session.id(), lease.path.display());
        Ok(lease)
    }

    /// Opens `requested` and keeps its session alive with no clients
    /// attached, until [`unpin`](Self::unpin).
    pub async fn pin(&self, requested: &Path) -> Result<Arc<SharedSession>, ViewError> {
        let path = resolve_under_root(&self.inner.config.root, requested)?;
        let session = self.claim(&path, true);
        if let Err(e) = ensure_open(&session).await {
            self.unpin(&path);
            return Err(e);
        }
        info!("pinned session {} ({})", session.id(), path.display());
        Ok(session)
    }

    /// Drops the pin on the session for the resolved `path`; closes it if no
    /// client is attached.
    pub fn unpin(&self, path: &Path) {
        let removed = {
            let mut entries = self.inner.entries();
            match entries.get_mut(path) {
                Some(entry) => {
                    entry.pinned = false;
                    if entry.clients == 0 {
                        entries.remove(path).map(|e| e.session)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(session) = removed {
            session.close_now();
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.inner.entries().len()
    }

    /// Clients attached to the session for the resolved `path`.
    pub fn client_count(&self, path: &Path) -> usize {
        self.inner.entries().get(path).map_or(0, |e| e.clients)
    }

    /// Finds or creates the entry for `path`, counting a client or setting
    /// the pin.
    fn claim(&self, path: &Path, pin: bool) -> Arc<SharedSession> {
        let mut entries = self.inner.entries();
        let entry = entries.entry(path.to_path_buf()).or_insert_with(|| {
            let session = RenderSession::new(Arc::clone(&self.inner.engine), Arc::clone(&self.inner.config));
            Entry {
                session: Arc::new(SharedSession::new(path.to_path_buf(), session)),
                clients: 0,
                pinned: false,
            }
        });
        if pin {
            entry.pinned = true;
        } else {
            entry.clients += 1;
        }
        Arc::clone(&entry.session)
    }
}

/// Opens the session's file if nobody has yet. Concurrent first attaches
/// serialize on the session lock, so only one of them opens.
async fn ensure_open(session: &SharedSession) -> Result<(), ViewError> {
    let mut guard = session.lock().await;
    match guard.state() {
        SessionState::Unopened => guard.open(session.path()).await,
        SessionState::Closed => Err(ViewError::SessionClosed),
        _ => Ok(()),
    }
}

// ── Lease ─────────────────────────────────────────────────────────────────────

/// A client's claim on a shared session.
pub struct SessionLease {
    registry: Arc<RegistryInner>,
    path: PathBuf,
    session: Arc<SharedSession>,
    released: bool,
}

impl SessionLease {
    pub fn session(&self) -> &Arc<SharedSession> {
        &self.session
    }

    /// Resolved path of the leased file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gives the claim back, closing the session if this was the last one.
    pub async fn release(mut self) {
        if let Some(session) = self.detach() {
            session.lock().await.close();
        }
    }

    /// Decrements the client count once. Returns the session if the caller
    /// must close it.
    fn detach(&mut self) -> Option<Arc<SharedSession>> {
        if self.released {
            return None;
        }
        self.released = true;

        let mut entries = self.registry.entries();
        let entry = entries.get_mut(&self.path)?;
        if !Arc::ptr_eq(&entry.session, &self.session) {
            return None;
        }
        entry.clients = entry.clients.saturating_sub(1);
        if entry.clients > 0 || entry.pinned {
            return None;
        }
        let removed = entries.remove(&self.path).map(|e| e.session);
        drop(entries);
        info!("last client left session {} ({})", self.session.id(), self.path.display());
        removed
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Some(session) = self.detach() {
            session.close_now();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
