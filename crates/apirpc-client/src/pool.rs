use apirpc_common::protocol::error::{ApiRpcError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

use crate::config::PoolConfig;

/// Creates, validates and disposes the items a [`Pool`] hands out.
#[async_trait]
pub trait PoolFactory: Send + Sync + 'static {
    type Item: Send + 'static;

    /// Creates a new item. Errors surface unchanged from [`Pool::acquire`].
    async fn create(&self) -> Result<Self::Item>;

    /// A broken item is disposed instead of being pooled.
    fn is_broken(&self, _item: &Self::Item) -> bool {
        false
    }

    /// Releases the item's resources.
    fn dispose(&self, item: Self::Item) {
        drop(item);
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Items waiting in the pool
    pub idle: usize,
    /// Items checked out or being created
    pub busy: usize,
    /// `idle + busy`, never above `max`
    pub live: usize,
    pub max: usize,
    /// Items created since the pool was built
    pub created: u64,
    /// Items disposed since the pool was built
    pub disposed: u64,
}

/// Generic bounded object pool.
///
/// # Architecture
///
/// - A semaphore with `max` permits bounds live items; every live item, idle
///   or checked out, owns one permit
/// - Idle items are reused LIFO; the oldest idle items beyond `min` are
///   disposed once they have been idle for `idle_timeout`
/// - When `max` is reached, [`acquire`](Self::acquire) waits for an item to
///   be returned or disposed, up to `acquire_timeout`
/// - Items are handed out as [`Pooled`] guards that return the item on drop,
///   so a caller cancelled mid-call still gives the item back (or disposes it
///   when the factory reports it broken)
///
/// # Example
///
/// ```rust
/// use apirpc_client::{Pool, PoolConfig, PoolFactory};
/// use apirpc_common::Result;
/// use async_trait::async_trait;
///
/// struct Numbers;
///
/// #[async_trait]
/// impl PoolFactory for Numbers {
///     type Item = u32;
///     async fn create(&self) -> Result<u32> {
///         Ok(7)
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<()> {
/// let pool = Pool::new(Numbers, PoolConfig::default());
/// {
///     let item = pool.acquire().await?;
///     assert_eq!(*item, 7);
/// }
/// assert_eq!(pool.stats().idle, 1);
/// # Ok(())
/// # }
/// ```
pub struct Pool<F: PoolFactory> {
    shared: Arc<Shared<F>>,
}

impl<F: PoolFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct Shared<F: PoolFactory> {
    factory: F,
    config: PoolConfig,
    max: usize,
    idle: Mutex<VecDeque<Idle<F::Item>>>,
    permits: Arc<Semaphore>,
    returned: Notify,
    closed: AtomicBool,
    created: AtomicU64,
    disposed: AtomicU64,
}

struct Idle<T> {
    item: T,
    permit: OwnedSemaphorePermit,
    since: Instant,
}

impl<F: PoolFactory> Pool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Self {
        let max = config.max.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            shared: Arc::new(Shared {
                factory,
                config,
                max,
                idle: Mutex::new(VecDeque::new()),
                permits: Arc::new(Semaphore::new(max)),
                returned: Notify::new(),
                closed: AtomicBool::new(false),
                created: AtomicU64::new(0),
                disposed: AtomicU64::new(0),
            }),
        }
    }

    pub fn factory(&self) -> &F {
        &self.shared.factory
    }

    /// Checks out an idle item or creates a new one.
    ///
    /// # Errors
    ///
    /// - the factory's error when creating an item fails
    /// - [`ApiRpcError::PoolTimeout`] when `max` items stay checked out for
    ///   longer than the acquire timeout
    /// - [`ApiRpcError::PoolClosed`] once [`close`](Self::close) was called
    pub async fn acquire(&self) -> Result<Pooled<F>> {
        let shared = &self.shared;
        let deadline = tokio::time::Instant::now() + shared.config.acquire_timeout();

        loop {
            // Registered before looking at the idle list so a return in
            // between still wakes us
            let notified = shared.returned.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if shared.closed.load(Ordering::Acquire) {
                return Err(ApiRpcError::PoolClosed);
            }

            if let Some(idle) = shared.take_idle() {
                return Ok(Pooled::new(shared.clone(), idle.item, idle.permit));
            }

            let permit = match shared.permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(TryAcquireError::Closed) => return Err(ApiRpcError::PoolClosed),
                Err(TryAcquireError::NoPermits) => {
                    tokio::select! {
                        permit = shared.permits.clone().acquire_owned() => {
                            permit.map_err(|_| ApiRpcError::PoolClosed)?
                        }
                        _ = notified.as_mut() => continue,
                        _ = tokio::time::sleep_until(deadline) => {
                            return Err(ApiRpcError::PoolTimeout(shared.config.acquire_timeout_ms));
                        }
                    }
                }
            };

            return self.create(permit).await;
        }
    }

    async fn create(&self, permit: OwnedSemaphorePermit) -> Result<Pooled<F>> {
        let shared = &self.shared;
        let item = shared.factory.create().await?;
        shared.created.fetch_add(1, Ordering::Relaxed);

        if shared.closed.load(Ordering::Acquire) {
            shared.dispose(item, permit);
            return Err(ApiRpcError::PoolClosed);
        }

        Ok(Pooled::new(shared.clone(), item, permit))
    }

    /// Returns an item to the pool. Same as dropping the guard.
    pub fn release(&self, item: Pooled<F>) {
        drop(item);
    }

    /// Disposes idle items that outlived the idle timeout.
    ///
    /// Runs on every acquire and release; returns the number of items
    /// disposed by this call.
    pub fn evict_idle(&self) -> usize {
        let expired = {
            let mut idle = self.shared.lock_idle();
            self.shared.drain_expired(&mut idle)
        };
        let count = expired.len();
        self.shared.dispose_all(expired);
        count
    }

    /// Disposes every idle item and rejects further acquisitions.
    ///
    /// Items still checked out are disposed when they are returned.
    /// Idempotent.
    pub fn close(&self) {
        let shared = &self.shared;
        if shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained: Vec<_> = shared.lock_idle().drain(..).collect();
        let count = drained.len();
        shared.dispose_all(drained);

        shared.permits.close();
        shared.returned.notify_waiters();
        debug!(disposed = count, "pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        let idle = shared.lock_idle().len();
        let live = shared.max.saturating_sub(shared.permits.available_permits());
        PoolStats {
            idle,
            busy: live.saturating_sub(idle),
            live,
            max: shared.max,
            created: shared.created.load(Ordering::Relaxed),
            disposed: shared.disposed.load(Ordering::Relaxed),
        }
    }
}

impl<F: PoolFactory> Shared<F> {
    fn lock_idle(&self) -> MutexGuard<'_, VecDeque<Idle<F::Item>>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pops the newest usable idle item, disposing expired and broken ones.
    fn take_idle(&self) -> Option<Idle<F::Item>> {
        let (found, stale) = {
            let mut idle = self.lock_idle();
            let mut stale = self.drain_expired(&mut idle);
            let found = loop {
                match idle.pop_back() {
                    Some(entry) if self.factory.is_broken(&entry.item) => stale.push(entry),
                    other => break other,
                }
            };
            (found, stale)
        };

        self.dispose_all(stale);
        found
    }

    fn drain_expired(&self, idle: &mut VecDeque<Idle<F::Item>>) -> Vec<Idle<F::Item>> {
        let timeout = self.config.idle_timeout();
        let mut expired = Vec::new();
        while idle.len() > self.config.min {
            match idle.front() {
                Some(entry) if entry.since.elapsed() >= timeout => expired.extend(idle.pop_front()),
                _ => break,
            }
        }
        expired
    }

    fn put_back(&self, item: F::Item, permit: OwnedSemaphorePermit, broken: bool) {
        if broken || self.factory.is_broken(&item) {
            self.dispose(item, permit);
            return;
        }

        let expired = {
            let mut idle = self.lock_idle();
            if self.closed.load(Ordering::Acquire) {
                drop(idle);
                self.dispose(item, permit);
                return;
            }
            idle.push_back(Idle {
                item,
                permit,
                since: Instant::now(),
            });
            self.drain_expired(&mut idle)
        };

        self.dispose_all(expired);
        self.returned.notify_one();
    }

    fn dispose(&self, item: F::Item, permit: OwnedSemaphorePermit) {
        self.factory.dispose(item);
        self.disposed.fetch_add(1, Ordering::Relaxed);
        // Permit goes back only after the item is gone
        drop(permit);
    }

    fn dispose_all(&self, entries: Vec<Idle<F::Item>>) {
        for entry in entries {
            self.dispose(entry.item, entry.permit);
        }
    }
}

/// Scoped checkout of a pool item.
///
/// Dropping the guard returns the item to its pool on every exit path.
/// [`discard`](Self::discard) disposes it instead.
pub struct Pooled<F: PoolFactory> {
    item: Option<F::Item>,
    permit: Option<OwnedSemaphorePermit>,
    shared: Arc<Shared<F>>,
    broken: bool,
}

impl<F: PoolFactory> Pooled<F> {
    fn new(shared: Arc<Shared<F>>, item: F::Item, permit: OwnedSemaphorePermit) -> Self {
        Self {
            item: Some(item),
            permit: Some(permit),
            shared,
            broken: false,
        }
    }

    /// Marks the item so it is disposed rather than pooled on drop.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Disposes the item now.
    pub fn discard(mut self) {
        self.broken = true;
    }
}

impl<F: PoolFactory> fmt::Debug for Pooled<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("present", &self.item.is_some())
            .field("broken", &self.broken)
            .finish()
    }
}

impl<F: PoolFactory> Deref for Pooled<F> {
    type Target = F::Item;

    fn deref(&self) -> &F::Item {
        self.item.as_ref().expect("pooled item is present until drop")
    }
}

impl<F: PoolFactory> DerefMut for Pooled<F> {
    fn deref_mut(&mut self) -> &mut F::Item {
        self.item.as_mut().expect("pooled item is present until drop")
    }
}

impl<F: PoolFactory> Drop for Pooled<F> {
    fn drop(&mut self) {
        if let (Some(item), Some(permit)) = (self.item.take(), self.permit.take()) {
            self.shared.put_back(item, permit, self.broken);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct Counting {
        next: AtomicUsize,
        fail: AtomicBool,
        disposed: Arc<Mutex<Vec<usize>>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl PoolFactory for Counting {
        type Item = usize;

        async fn create(&self) -> Result<usize> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ApiRpcError::Connection("refused".into()));
            }
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }

        fn dispose(&self, item: usize) {
            self.disposed.lock().unwrap().push(item);
        }
    }

    fn config(max: usize) -> PoolConfig {
        PoolConfig {
            min: 0,
            max,
            acquire_timeout_ms: 1_000,
            idle_timeout_ms: 60_000,
        }
    }

    #[tokio::test]
    async fn test_release_then_reuse() {
        let pool = Pool::new(Counting::default(), config(4));

        let first = pool.acquire().await.unwrap();
        assert_eq!(*first, 0);
        pool.release(first);

        let again = pool.acquire().await.unwrap();
        assert_eq!(*again, 0);
        assert_eq!(pool.stats().created, 1);
        assert_eq!(pool.stats().busy, 1);
    }

    #[tokio::test]
    async fn test_discarded_item_is_disposed_not_reused() {
        let factory = Counting::default();
        let disposed = factory.disposed.clone();
        let pool = Pool::new(factory, config(4));

        pool.acquire().await.unwrap().discard();
        assert_eq!(*disposed.lock().unwrap(), vec![0]);

        let next = pool.acquire().await.unwrap();
        assert_eq!(*next, 1);

        let stats = pool.stats();
        assert_eq!(stats.disposed, 1);
        assert_eq!(stats.live, 1);
    }

    #[tokio::test]
    async fn test_pooled_debug_shows_state() {
        let pool = Pool::new(Counting::default(), config(1));
        let mut item = pool.acquire().await.unwrap();
        assert_eq!(format!("{:?}", item), "Pooled { present: true, broken: false }");

        item.mark_broken();
        assert_eq!(format!("{:?}", item), "Pooled { present: true, broken: true }");
    }

    #[tokio::test]
    async fn test_acquire_times_out_at_max() {
        let mut cfg = config(2);
        cfg.acquire_timeout_ms = 50;
        let pool = Pool::new(Counting::default(), cfg);

        let _a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, ApiRpcError::PoolTimeout(50)));
        assert_eq!(pool.stats().live, 2);
    }

    #[tokio::test]
    async fn test_waiter_receives_returned_item() {
        let pool = Pool::new(Counting::default(), config(1));
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { *pool.acquire().await.unwrap() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        let item = waiter.await.unwrap();
        assert_eq!(item, 0);
        assert_eq!(pool.stats().created, 1);
    }

    #[tokio::test]
    async fn test_waiter_creates_after_dispose() {
        let pool = Pool::new(Counting::default(), config(1));
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { *pool.acquire().await.unwrap() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        held.discard();

        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_live_never_exceeds_max_under_load() {
        let factory = Counting {
            delay: Some(Duration::from_millis(1)),
            ..Default::default()
        };
        let pool = Pool::new(factory, config(3));
        let in_use = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let pool = pool.clone();
                let in_use = in_use.clone();
                tokio::spawn(async move {
                    for _ in 0..10 {
                        let item = pool.acquire().await.unwrap();
                        let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                        assert!(now <= 3, "{} items checked out", now);
                        assert!(pool.stats().live <= 3);
                        tokio::time::sleep(Duration::from_micros(200)).await;
                        in_use.fetch_sub(1, Ordering::SeqCst);
                        if i % 4 == 0 {
                            item.discard();
                        }
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let stats = pool.stats();
        assert!(stats.live <= 3);
        assert_eq!(stats.busy, 0);
    }

    #[tokio::test]
    async fn test_min_zero_with_zero_idle_timeout_keeps_nothing() {
        let mut cfg = config(4);
        cfg.idle_timeout_ms = 0;
        let pool = Pool::new(Counting::default(), cfg);

        drop(pool.acquire().await.unwrap());

        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.live, 0);
        assert_eq!(stats.disposed, 1);
    }

    #[tokio::test]
    async fn test_min_idle_items_are_retained() {
        let mut cfg = config(4);
        cfg.min = 1;
        cfg.idle_timeout_ms = 0;
        let pool = Pool::new(Counting::default(), cfg);

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        drop(a);
        drop(b);

        assert_eq!(pool.stats().idle, 1);
        assert_eq!(pool.evict_idle(), 0);
    }

    #[tokio::test]
    async fn test_idle_items_expire() {
        let mut cfg = config(4);
        cfg.idle_timeout_ms = 20;
        let pool = Pool::new(Counting::default(), cfg);

        drop(pool.acquire().await.unwrap());
        assert_eq!(pool.stats().idle, 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(pool.evict_idle(), 1);
        assert_eq!(pool.stats().live, 0);
    }

    #[tokio::test]
    async fn test_close_disposes_and_rejects() {
        let factory = Counting::default();
        let disposed = factory.disposed.clone();
        let pool = Pool::new(factory, config(4));

        let held = pool.acquire().await.unwrap();
        drop(pool.acquire().await.unwrap());

        pool.close();
        pool.close();
        assert!(pool.is_closed());
        assert_eq!(disposed.lock().unwrap().len(), 1);
        assert!(matches!(pool.acquire().await, Err(ApiRpcError::PoolClosed)));

        // Returned after close, disposed instead of pooled
        drop(held);
        assert_eq!(disposed.lock().unwrap().len(), 2);
        assert_eq!(pool.stats().idle, 0);
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let pool = Pool::new(Counting::default(), config(1));
        let _held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|item| *item) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.close();

        assert!(matches!(waiter.await.unwrap(), Err(ApiRpcError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_creation_failure_surfaces_and_frees_slot() {
        let factory = Counting::default();
        factory.fail.store(true, Ordering::SeqCst);
        let pool = Pool::new(factory, config(1));

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, ApiRpcError::Connection(_)));
        assert_eq!(pool.stats().live, 0);

        pool.factory().fail.store(false, Ordering::SeqCst);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_holder_returns_item() {
        let pool = Pool::new(Counting::default(), config(1));

        let result = tokio::time::timeout(Duration::from_millis(10), async {
            let _item = pool.acquire().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;
        assert!(result.is_err());

        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.busy, 0);
    }
}
