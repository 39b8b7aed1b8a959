//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-browser attendance desks.

use crate::config::Config;
use attendance_core::{
    AccountService, AttendanceSession, Clock, PortError, RosterService, SessionSettings, SyncError,
    SyncSummary, User,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::info;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountService>,
    pub roster: Arc<dyn RosterService>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
    pub desks: Arc<DeskRegistry>,
}

impl AppState {
    /// Returns the desk bound to this browser session, opening one on first use.
    pub async fn desk_for(&self, current: &CurrentUser) -> Arc<AttendanceDesk> {
        self.desks
            .get_or_open(&current.auth_session_id, || {
                AttendanceSession::new(
                    self.roster.clone(),
                    self.clock.clone(),
                    SessionSettings {
                        teacher_policy: self.config.teacher_scan_policy,
                        request_timeout: self.config.request_timeout,
                    },
                )
            })
            .await
    }
}

/// The signed-in operator, inserted into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub auth_session_id: String,
}

//=========================================================================================
// AttendanceDesk (Specific to One Browser Session)
//=========================================================================================

/// Owns one `AttendanceSession` behind a single async mutex.
///
/// The lock is held for the whole of a sync or a scan, including the awaited
/// remote call, so the two never interleave. Scans that arrive during a sync
/// queue on the lock in arrival order and run against the refreshed index.
///
/// A desk is closed when its auth session ends. Holders of an old `Arc` see
/// `lock_open` return `None` and can wait on `closed()`.
pub struct AttendanceDesk {
    session: Mutex<AttendanceSession>,
    pending_syncs: AtomicUsize,
    closed: CancellationToken,
}

impl AttendanceDesk {
    pub fn new(session: AttendanceSession) -> Self {
        Self {
            session: Mutex::new(session),
            pending_syncs: AtomicUsize::new(0),
            closed: CancellationToken::new(),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, AttendanceSession> {
        self.session.lock().await
    }

    /// Locks the session unless the desk has been closed. The check happens
    /// after the lock is taken, so nothing runs against a desk closed while waiting.
    pub async fn lock_open(&self) -> Option<MutexGuard<'_, AttendanceSession>> {
        let session = self.session.lock().await;
        (!self.is_closed()).then_some(session)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the desk is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Marks the desk closed and drops its ledgers and status map.
    pub async fn close(&self) {
        self.closed.cancel();
        self.session.lock().await.clear();
    }

    /// True while a sync is waiting for, or holding, the session lock.
    pub fn is_syncing(&self) -> bool {
        self.pending_syncs.load(Ordering::SeqCst) > 0
    }

    pub async fn sync(&self, sync_key: Option<&str>) -> Result<SyncSummary, SyncError> {
        let _pending = PendingSync::enter(&self.pending_syncs);
        let mut session = self
            .lock_open()
            .await
            .ok_or_else(|| SyncError::AuthError("the session has ended".to_string()))?;
        session.sync(sync_key).await
    }
}

// Decrements on drop so a cancelled request cannot leave the flag set.
struct PendingSync<'a>(&'a AtomicUsize);

impl<'a> PendingSync<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingSync<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Desks keyed by auth session id. Logging out drops the desk, which clears
/// its ledgers and status map.
#[derive(Default)]
pub struct DeskRegistry {
    desks: Mutex<HashMap<String, Arc<AttendanceDesk>>>,
}

impl DeskRegistry {
    pub async fn get_or_open<F>(&self, auth_session_id: &str, open: F) -> Arc<AttendanceDesk>
    where
        F: FnOnce() -> AttendanceSession,
    {
        let mut desks = self.desks.lock().await;
        desks
            .entry(auth_session_id.to_string())
            .or_insert_with(|| Arc::new(AttendanceDesk::new(open())))
            .clone()
    }

    /// Removes and closes the desk of an ended auth session.
    pub async fn close(&self, auth_session_id: &str) {
        let removed = self.desks.lock().await.remove(auth_session_id);
        if let Some(desk) = removed {
            desk.close().await;
            info!("Closed attendance desk for an ended session");
        }
    }

    /// Closes every desk whose auth session is no longer valid, covering
    /// cookies that expired or were abandoned without a logout.
    pub async fn sweep(&self, accounts: &dyn AccountService) -> usize {
        let ids: Vec<String> = self.desks.lock().await.keys().cloned().collect();
        let mut closed = 0;
        for id in ids {
            if let Err(PortError::Unauthorized) = accounts.validate_auth_session(&id).await {
                self.close(&id).await;
                closed += 1;
            }
        }
        closed
    }

    pub async fn len(&self) -> usize {
        self.desks.lock().await.len()
    }
}
