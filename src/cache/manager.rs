//! Cache manager that decides when to trust the local store and when to refetch.

use chrono::{DateTime, SubsecRound, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::storage::ReferenceStore;
use super::traits::{CacheStatus, ReferenceSource};
use crate::error::{CacheError, Result};
use crate::reference::{active_only, Language, ReferenceKind, Role};

/// Initialization shared by every caller that arrives while it runs.
type PendingInit = Shared<BoxFuture<'static, Result<()>>>;

/// In-memory state, never persisted.
#[derive(Default)]
struct ManagerState {
  initialized: bool,
  /// Mirror of the persisted `last_update` record
  last_sync_at: Option<DateTime<Utc>>,
  pending: Option<PendingInit>,
  forced_refreshes: usize,
  /// Bumped by `clear_cache`; refreshes started under an older value write nothing
  generation: u64,
}

impl ManagerState {
  fn loading(&self) -> bool {
    self.pending.is_some() || self.forced_refreshes > 0
  }
}

fn lock(state: &Mutex<ManagerState>) -> MutexGuard<'_, ManagerState> {
  state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts one forced refresh as in flight until dropped.
struct ForcedRefresh<'a>(&'a Mutex<ManagerState>);

impl<'a> ForcedRefresh<'a> {
  fn start(state: &'a Mutex<ManagerState>) -> Self {
    lock(state).forced_refreshes += 1;
    Self(state)
  }
}

impl Drop for ForcedRefresh<'_> {
  fn drop(&mut self) {
    lock(self.0).forced_refreshes -= 1;
  }
}

struct Inner<S, R> {
  store: S,
  source: R,
  /// How long before a fully populated cache is considered stale
  stale_after: Duration,
  state: Mutex<ManagerState>,
}

/// Outcome of refreshing a set of collections.
#[derive(Default)]
struct RefreshReport {
  refreshed: Vec<ReferenceKind>,
  failed: Vec<CacheError>,
}

impl RefreshReport {
  /// Any failure is an error.
  fn into_result(self) -> Result<()> {
    match self.failed.into_iter().next() {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }

  /// Startup tolerates partial failure; it fails only when nothing was refreshed.
  fn into_startup_result(self) -> Result<()> {
    match (self.refreshed.is_empty(), self.failed.into_iter().next()) {
      (true, Some(e)) => Err(e),
      _ => Ok(()),
    }
  }
}

/// Reference-data cache shared by every consumer in the process.
///
/// Construct one at startup and hand out clones; clones share the store,
/// the source and all in-memory state.
pub struct CacheManager<S: ReferenceStore, R: ReferenceSource> {
  inner: Arc<Inner<S, R>>,
}

impl<S: ReferenceStore, R: ReferenceSource> Clone for CacheManager<S, R> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<S: ReferenceStore, R: ReferenceSource> CacheManager<S, R> {
  /// Create a cache manager. Nothing is opened or fetched until the first read.
  pub fn new(store: S, source: R, stale_after: Duration) -> Self {
    Self {
      inner: Arc::new(Inner {
        store,
        source,
        stale_after,
        state: Mutex::new(ManagerState::default()),
      }),
    }
  }

  pub fn is_initialized(&self) -> bool {
    self.inner.state().initialized
  }

  pub fn is_loading(&self) -> bool {
    self.inner.state().loading()
  }

  pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
    self.inner.state().last_sync_at
  }

  pub fn store(&self) -> &S {
    &self.inner.store
  }

  /// Bring the local store up to date, at most once per process.
  ///
  /// Callers arriving while an initialization is running wait for that one
  /// instead of starting their own. The initialization runs as its own task,
  /// so it completes even if every caller stops waiting.
  pub async fn initialize_cache(&self) -> Result<()> {
    let pending = {
      let mut state = self.inner.state();
      if state.initialized {
        return Ok(());
      }

      match &state.pending {
        Some(pending) => pending.clone(),
        None => {
          let inner = Arc::clone(&self.inner);
          let task = tokio::spawn(inner.run_initialization(state.generation));
          let pending = async move {
            match task.await {
              Ok(outcome) => outcome,
              Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
              Err(e) => Err(CacheError::storage(format!("initialization aborted: {}", e))),
            }
          }
          .boxed()
          .shared();
          state.pending = Some(pending.clone());
          pending
        }
      }
    };

    pending.await
  }

  /// All languages, from the local store when possible.
  pub async fn get_cached_languages(&self) -> Result<Vec<Language>> {
    match self.read_local(|store| store.get_all::<Language>()).await {
      Ok(languages) => Ok(languages),
      Err(e) => {
        warn!(error = %e, "language cache unavailable, reading from remote");
        self.inner.source.fetch_all_languages().await
      }
    }
  }

  /// All roles, from the local store when possible.
  pub async fn get_cached_roles(&self) -> Result<Vec<Role>> {
    match self.read_local(|store| store.get_all::<Role>()).await {
      Ok(roles) => Ok(roles),
      Err(e) => {
        warn!(error = %e, "role cache unavailable, reading from remote");
        self.inner.source.fetch_all_roles().await
      }
    }
  }

  /// Languages whose `is_active` flag is exactly `true`.
  pub async fn get_cached_active_languages(&self) -> Result<Vec<Language>> {
    match self.read_local(|store| store.get_active_languages()).await {
      Ok(languages) => Ok(languages),
      Err(e) => {
        warn!(error = %e, "active language lookup failed, filtering full list");
        let languages = self.get_cached_languages().await?;
        Ok(active_only(languages))
      }
    }
  }

  /// Refetch both collections now, whatever their age.
  ///
  /// Collections that were fetched are persisted even if the other one fails;
  /// the first failure is returned.
  pub async fn force_update_cache(&self) -> Result<()> {
    let _in_flight = ForcedRefresh::start(&self.inner.state);
    let generation = {
      let mut state = self.inner.state();
      state.last_sync_at = None;
      state.generation
    };

    info!("forcing full reference cache refresh");
    self.inner.store.init()?;
    self
      .inner
      .refresh(&ReferenceKind::ALL, generation)
      .await
      .into_result()
  }

  /// Empty the local store and forget everything about the last sync.
  ///
  /// Refreshes still running discard their results, so the next read starts
  /// from an empty store.
  pub async fn clear_cache(&self) -> Result<()> {
    let cleared = {
      let mut state = self.inner.state();
      let cleared = self
        .inner
        .store
        .init()
        .and_then(|()| self.inner.store.clear());
      state.initialized = false;
      state.last_sync_at = None;
      state.pending = None;
      state.generation += 1;
      cleared
    };

    match &cleared {
      Ok(()) => info!("reference cache cleared"),
      Err(e) => warn!(error = %e, "failed to clear reference cache"),
    }
    cleared
  }

  /// Diagnostic snapshot, recomputed on every call.
  pub async fn get_cache_status(&self) -> Result<CacheStatus> {
    self.inner.store.init()?;
    let has_languages = self.inner.store.count(ReferenceKind::Languages)? > 0;
    let has_roles = self.inner.store.count(ReferenceKind::Roles)? > 0;

    let state = self.inner.state();
    Ok(CacheStatus {
      initialized: state.initialized,
      loading: state.loading(),
      last_update: state.last_sync_at,
      should_update: self.inner.should_update(state.last_sync_at),
      has_languages,
      has_roles,
      is_empty: !has_languages && !has_roles,
    })
  }

  /// Initialize, then read from the local store.
  async fn read_local<T>(&self, read: impl FnOnce(&S) -> Result<T>) -> Result<T> {
    self.initialize_cache().await?;
    read(&self.inner.store)
  }
}

/// Current time at the precision the store keeps.
fn sync_time() -> DateTime<Utc> {
  Utc::now().trunc_subsecs(6)
}

impl<S: ReferenceStore, R: ReferenceSource> Inner<S, R> {
  fn state(&self) -> MutexGuard<'_, ManagerState> {
    lock(&self.state)
  }

  fn should_update(&self, last_sync_at: Option<DateTime<Utc>>) -> bool {
    match last_sync_at {
      Some(last) => self.is_stale(last),
      None => true,
    }
  }

  fn is_stale(&self, last: DateTime<Utc>) -> bool {
    self.is_stale_at(last, Utc::now())
  }

  /// Stale once strictly older than `stale_after`.
  fn is_stale_at(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    // A timestamp in the future converts to Err and counts as fresh
    match (now - last).to_std() {
      Ok(age) => age > self.stale_after,
      Err(_) => false,
    }
  }

  async fn run_initialization(self: Arc<Self>, generation: u64) -> Result<()> {
    let outcome = self.sync_on_startup(generation).await;

    if let Err(e) = &outcome {
      error!(error = %e, "reference cache initialization failed");
    }

    let mut state = self.state();
    if state.generation == generation {
      state.pending = None;
      state.initialized = outcome.is_ok();
    }
    outcome
  }

  /// Pick between selective refresh, full refresh and no refresh.
  async fn sync_on_startup(&self, generation: u64) -> Result<()> {
    self.store.init()?;
    let persisted = self.store.get_meta()?;
    {
      let mut state = self.state();
      if state.generation == generation {
        state.last_sync_at = persisted;
      }
    }

    let missing: Vec<ReferenceKind> = ReferenceKind::ALL
      .into_iter()
      .map(|kind| self.store.count(kind).map(|n| (kind, n)))
      .collect::<Result<Vec<_>>>()?
      .into_iter()
      .filter(|(_, n)| *n == 0)
      .map(|(kind, _)| kind)
      .collect();

    if !missing.is_empty() {
      info!(?missing, "reference cache incomplete, running selective refresh");
      return self
        .refresh(&missing, generation)
        .await
        .into_startup_result();
    }

    match persisted {
      Some(last) if self.is_stale(last) => {
        info!(last_update = %last, "reference cache stale, running full refresh");
        self
          .refresh(&ReferenceKind::ALL, generation)
          .await
          .into_startup_result()
      }
      Some(_) => {
        debug!("reference cache fresh");
        Ok(())
      }
      None => {
        // Data from an older build without sync bookkeeping
        self.stamp_sync(generation)?;
        debug!("stamped existing reference cache");
        Ok(())
      }
    }
  }

  /// Fetch and persist the given collections concurrently.
  ///
  /// Each collection is replaced only if its own fetch succeeded. The sync
  /// timestamp moves forward when at least one collection was persisted.
  async fn refresh(&self, kinds: &[ReferenceKind], generation: u64) -> RefreshReport {
    let want_languages = kinds.contains(&ReferenceKind::Languages);
    let want_roles = kinds.contains(&ReferenceKind::Roles);

    let (languages, roles) = futures::join!(
      async {
        if want_languages {
          Some(self.refresh_languages(generation).await)
        } else {
          None
        }
      },
      async {
        if want_roles {
          Some(self.refresh_roles(generation).await)
        } else {
          None
        }
      },
    );

    let mut report = RefreshReport::default();
    let outcomes = [
      (ReferenceKind::Languages, languages),
      (ReferenceKind::Roles, roles),
    ];
    for (kind, outcome) in outcomes {
      match outcome {
        Some(Ok(count)) => {
          debug!(count, "refreshed {}", kind);
          report.refreshed.push(kind);
        }
        Some(Err(e)) => {
          warn!(error = %e, "failed to refresh {}", kind);
          report.failed.push(e);
        }
        None => {}
      }
    }

    if !report.refreshed.is_empty() {
      if let Err(e) = self.stamp_sync(generation) {
        warn!(error = %e, "failed to record sync time");
        report.failed.push(e);
      }
    }

    report
  }

  async fn refresh_languages(&self, generation: u64) -> Result<usize> {
    let languages = self.source.fetch_all_languages().await?;
    self.persist(generation, |store, _| store.replace_all(&languages))?;
    Ok(languages.len())
  }

  async fn refresh_roles(&self, generation: u64) -> Result<usize> {
    let roles = self.source.fetch_all_roles().await?;
    self.persist(generation, |store, _| store.replace_all(&roles))?;
    Ok(roles.len())
  }

  /// Record now as the last sync, in the store and in memory.
  fn stamp_sync(&self, generation: u64) -> Result<()> {
    let now = sync_time();
    self.persist(generation, |store, state| {
      store.put_meta(now)?;
      state.last_sync_at = Some(now);
      Ok(())
    })
  }

  /// Apply a store write unless the cache was cleared after `generation` was read.
  ///
  /// The state lock is held across the write, so a clear cannot land in between.
  fn persist(
    &self,
    generation: u64,
    write: impl FnOnce(&S, &mut ManagerState) -> Result<()>,
  ) -> Result<()> {
    let mut state = self.state();
    if state.generation != generation {
      debug!("reference cache cleared during refresh, discarding result");
      return Ok(());
    }
    write(&self.store, &mut *state)
  }
}
