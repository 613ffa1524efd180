use std::{fmt, sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{Jwk, JwkSet, KeySetSource, VerifyError};

struct Snapshot {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

#[derive(Default)]
struct State {
    snapshot: Option<Snapshot>,
    /// Bumped on every successful fetch.
    generation: u64,
}

/// A relying party's local, time-bounded copy of the issuer's key set.
///
/// One instance per process, shared by every verification. A lookup is
/// served locally while the copy is younger than the TTL and holds the
/// requested `kid`. Otherwise the lookup fetches once: an empty or expired
/// copy is replaced, and a fresh copy missing the `kid` is refetched
/// regardless of its age so a newly rotated key is picked up at once.
///
/// Fetches are single-flight. Readers served from the current copy never
/// wait on the network, and lookups that miss while another fetch is in
/// flight wait for it and reuse its result.
pub struct JwksCache {
    source: Arc<dyn KeySetSource>,
    ttl: Duration,
    state: RwLock<State>,
    fetching: Mutex<()>,
}

impl fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl JwksCache {
    pub fn new(source: Arc<dyn KeySetSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            state: RwLock::new(State::default()),
            fetching: Mutex::new(()),
        }
    }

    pub async fn get_key(&self, kid: &str) -> Result<Jwk, VerifyError> {
        let observed = {
            let state = self.state.read().await;
            if let Some(snapshot) = &state.snapshot {
                if snapshot.fetched_at.elapsed() < self.ttl {
                    if let Some(jwk) = snapshot.keys.find(kid) {
                        return Ok(jwk.clone());
                    }
                    debug!(kid, "kid absent from fresh key set, refetching");
                }
            }
            state.generation
        };

        let keys = self.refetch(observed).await?;
        keys.find(kid).cloned().ok_or_else(|| {
            warn!(kid, "kid not published by issuer");
            VerifyError::UnknownSigningKey
        })
    }

    /// Drops the local copy; the next lookup fetches.
    pub async fn invalidate(&self) {
        self.state.write().await.snapshot = None;
    }

    /// Fetches unless a fetch completed after `observed` was read, in which
    /// case that result is reused.
    async fn refetch(&self, observed: u64) -> Result<Arc<JwkSet>, VerifyError> {
        let _flight = self.fetching.lock().await;
        {
            let state = self.state.read().await;
            if state.generation != observed {
                if let Some(snapshot) = &state.snapshot {
                    return Ok(Arc::clone(&snapshot.keys));
                }
            }
        }

        let keys = match self.source.fetch().await {
            Ok(keys) => Arc::new(keys),
            Err(err) => {
                warn!("key set fetch failed: {}", err);
                return Err(VerifyError::UnknownSigningKey);
            }
        };
        let mut state = self.state.write().await;
        state.generation += 1;
        state.snapshot = Some(Snapshot {
            keys: Arc::clone(&keys),
            fetched_at: Instant::now(),
        });
        info!(keys = keys.keys.len(), "key set refreshed");
        Ok(keys)
    }
}
