// libs/session-cell/src/services/session.rs
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use shared_config::DEFAULT_SESSION_IDLE_TTL_SECS;

use crate::models::{
    CurrentIdentity, Identity, IdentityError, IdentitySource, Principal, SessionEvent,
};
use crate::services::resolver::IdentityResolver;
use crate::services::snapshot::SnapshotStore;

#[derive(Debug, Default)]
struct Tiers {
    authoritative: Option<Identity>,
    restored: Option<Identity>,
    // Bumped on every invalidation so a resolution that started before a
    // sign-out cannot resurrect the identity when it finishes.
    generation: u64,
}

/// Two-tier identity store for one session: the authoritative value from the
/// profile tables, and a durable snapshot restored at startup. The
/// authoritative value always wins once present.
pub struct IdentitySession {
    key: String,
    tiers: RwLock<Tiers>,
    resolver: Arc<IdentityResolver>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl IdentitySession {
    pub fn new(
        key: impl Into<String>,
        resolver: Arc<IdentityResolver>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            key: key.into(),
            tiers: RwLock::new(Tiers::default()),
            resolver,
            snapshots,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Rebuild a provisional identity from the durable snapshot. A corrupt
    /// snapshot is discarded.
    pub fn restore(&self) -> Option<CurrentIdentity> {
        if let Some(current) = self.current_identity() {
            return Some(current);
        }

        match self.snapshots.load(&self.key) {
            Ok(Some(identity)) => {
                debug!("Restored {} identity for session {}", identity.role(), self.key);
                let mut tiers = self.tiers.write().unwrap_or_else(PoisonError::into_inner);
                if tiers.authoritative.is_none() {
                    tiers.restored = Some(identity);
                }
                drop(tiers);
                self.current_identity()
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Discarding unreadable identity snapshot for session {}: {}", self.key, e);
                if let Err(e) = self.snapshots.clear(&self.key) {
                    warn!("Failed to remove identity snapshot for session {}: {}", self.key, e);
                }
                None
            }
        }
    }

    /// Authoritative resolution. Success replaces both tiers and refreshes the
    /// snapshot; any failure invalidates the session entirely.
    pub async fn resolve(&self, principal: &Principal) -> Result<Identity, IdentityError> {
        let generation = self.generation();

        match self.resolver.resolve(principal).await {
            Ok(identity) => {
                {
                    let mut tiers = self.tiers.write().unwrap_or_else(PoisonError::into_inner);
                    if tiers.generation != generation {
                        info!("Session {} was invalidated during resolution, discarding result", self.key);
                        return Err(IdentityError::NoActiveSession);
                    }
                    tiers.authoritative = Some(identity.clone());
                    tiers.restored = None;
                }

                self.persist(&identity, generation).await;
                Ok(identity)
            }
            Err(e) => {
                warn!("Identity resolution failed for session {}: {}", self.key, e);
                self.invalidate();
                Err(e)
            }
        }
    }

    pub fn current_identity(&self) -> Option<CurrentIdentity> {
        let tiers = self.tiers.read().unwrap_or_else(PoisonError::into_inner);

        if let Some(identity) = &tiers.authoritative {
            return Some(CurrentIdentity {
                identity: identity.clone(),
                source: IdentitySource::Authoritative,
            });
        }

        tiers.restored.as_ref().map(|identity| CurrentIdentity {
            identity: identity.clone(),
            source: IdentitySource::Restored,
        })
    }

    /// Clear both tiers and the durable snapshot.
    pub fn invalidate(&self) {
        {
            let mut tiers = self.tiers.write().unwrap_or_else(PoisonError::into_inner);
            tiers.authoritative = None;
            tiers.restored = None;
            tiers.generation += 1;
        }

        if let Err(e) = self.snapshots.clear(&self.key) {
            warn!("Failed to remove identity snapshot for session {}: {}", self.key, e);
        }

        debug!("Session {} invalidated", self.key);
    }

    pub async fn handle_event(&self, event: SessionEvent) -> Result<Option<Identity>, IdentityError> {
        match event {
            SessionEvent::SignedIn(principal) => self.resolve(&principal).await.map(Some),
            SessionEvent::SignedOut => {
                self.invalidate();
                Ok(None)
            }
            SessionEvent::PasswordRecovery => {
                info!("Password recovery started for session {}", self.key);
                Ok(self.current_identity().map(|current| current.identity))
            }
        }
    }

    fn generation(&self) -> u64 {
        self.tiers.read().unwrap_or_else(PoisonError::into_inner).generation
    }

    // Snapshot writes touch the filesystem, so they run on the blocking pool.
    async fn persist(&self, identity: &Identity, generation: u64) {
        let snapshots = Arc::clone(&self.snapshots);
        let key = self.key.clone();
        let identity = identity.clone();

        match tokio::task::spawn_blocking(move || snapshots.save(&key, &identity)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to persist identity snapshot for session {}: {}", self.key, e),
            Err(e) => warn!("Identity snapshot task for session {} did not finish: {}", self.key, e),
        }

        // A sign-out that landed while the write was in flight must not leave
        // the snapshot behind.
        if self.generation() != generation {
            if let Err(e) = self.snapshots.clear(&self.key) {
                warn!("Failed to remove identity snapshot for session {}: {}", self.key, e);
            }
        }
    }
}

struct SessionEntry {
    session: Arc<IdentitySession>,
    last_seen: Instant,
}

/// Per-session identity stores for a multi-caller server. Sessions never share
/// an identity value; the map only routes callers to their own store. Sessions
/// idle for longer than the TTL are evicted, and a session whose resolution
/// failed is not kept at all.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    resolver: Arc<IdentityResolver>,
    snapshots: Arc<dyn SnapshotStore>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(resolver: Arc<IdentityResolver>, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            resolver,
            snapshots,
            idle_ttl: Duration::from_secs(DEFAULT_SESSION_IDLE_TTL_SECS),
        }
    }

    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    pub fn session(&self, session_key: &str) -> Arc<IdentitySession> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = sessions.get_mut(session_key) {
            entry.last_seen = now;
            return Arc::clone(&entry.session);
        }

        let evicted = self.evict_idle(&mut sessions, now);

        let session = Arc::new(IdentitySession::new(
            session_key,
            Arc::clone(&self.resolver),
            Arc::clone(&self.snapshots),
        ));
        sessions.insert(
            session_key.to_string(),
            SessionEntry {
                session: Arc::clone(&session),
                last_seen: now,
            },
        );
        drop(sessions);

        for stale in evicted {
            debug!("Evicting idle session {}", stale.key());
            stale.invalidate();
        }

        session
    }

    /// Identity for a request. Uses the authoritative value when cached; a
    /// restored snapshot is served immediately while a background resolution
    /// replaces it; otherwise resolves inline.
    pub async fn identity_for(
        &self,
        session_key: &str,
        principal: &Principal,
    ) -> Result<CurrentIdentity, IdentityError> {
        let session = self.session(session_key);

        if let Some(current) = session.current_identity() {
            if current.source == IdentitySource::Authoritative
                && current.identity.principal_id() == principal.id
            {
                return Ok(current);
            }
        }

        if let Some(restored) = session.restore() {
            if restored.source == IdentitySource::Restored
                && restored.identity.principal_id() == principal.id
            {
                let refresh = Arc::clone(&session);
                let principal = principal.clone();
                tokio::spawn(async move {
                    if let Err(e) = refresh.resolve(&principal).await {
                        warn!("Background identity refresh failed for session {}: {}", refresh.key(), e);
                    }
                });
                return Ok(restored);
            }
        }

        match session.resolve(principal).await {
            Ok(identity) => Ok(CurrentIdentity {
                identity,
                source: IdentitySource::Authoritative,
            }),
            Err(e) => {
                self.forget(&session);
                Err(e)
            }
        }
    }

    pub fn sign_out(&self, session_key: &str) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_key);

        match removed {
            Some(entry) => entry.session.invalidate(),
            None => {
                if let Err(e) = self.snapshots.clear(session_key) {
                    warn!("Failed to remove identity snapshot for session {}: {}", session_key, e);
                }
            }
        }

        info!("Session {} signed out", session_key);
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    // Drop the entry only if it still holds this session; a concurrent
    // request may already have replaced it.
    fn forget(&self, session: &Arc<IdentitySession>) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions
            .get(session.key())
            .is_some_and(|entry| Arc::ptr_eq(&entry.session, session))
        {
            sessions.remove(session.key());
        }
    }

    fn evict_idle(
        &self,
        sessions: &mut HashMap<String, SessionEntry>,
        now: Instant,
    ) -> Vec<Arc<IdentitySession>> {
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_seen) >= self.idle_ttl)
            .map(|(key, _)| key.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|key| sessions.remove(&key))
            .map(|entry| entry.session)
            .collect()
    }
}
