//! Free-list pool for per-request state

use parking_lot::Mutex;

/// Instances retained when no cap is given
pub const DEFAULT_RETAIN: usize = 1024;

/// Concurrent pool of reusable values
///
/// [`acquire`](Pool::acquire) pops a retained value or builds a new one with
/// the factory; [`release`](Pool::release) takes the value back by move, so a
/// released value cannot be touched again by the caller.
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    retain: usize,
}

impl<T> Pool<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_retain(DEFAULT_RETAIN, factory)
    }

    /// Pool keeping at most `retain` idle values
    pub fn with_retain<F>(retain: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            free: Mutex::new(Vec::new()),
            factory: Box::new(factory),
            retain,
        }
    }

    pub fn acquire(&self) -> T {
        let reused = self.free.lock().pop();
        reused.unwrap_or_else(|| (self.factory)())
    }

    /// Return `value`; it is dropped if the pool is full
    pub fn release(&self, value: T) {
        let mut free = self.free.lock();
        if free.len() < self.retain {
            free.push(value);
        }
    }

    /// Number of idle values
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}
