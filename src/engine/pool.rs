use anyhow::Result;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard};

/// Bounded checkout pool. Items are created lazily and handed back on guard
/// drop, so the capacity doubles as a concurrency limit.
pub struct Pool<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    capacity: usize,
    make: Box<dyn Fn() -> Result<T> + Send + Sync>,
}

struct State<T> {
    idle: Vec<T>,
    live: usize,
}

impl<T> Pool<T> {
    pub fn new(capacity: usize, make: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::new(State {
                idle: Vec::new(),
                live: 0,
            }),
            available: Condvar::new(),
            capacity: capacity.max(1),
            make: Box::new(make),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self) -> Result<PoolGuard<'_, T>> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.idle.pop() {
                return Ok(PoolGuard {
                    pool: self,
                    item: Some(item),
                });
            }
            if state.live < self.capacity {
                state.live += 1;
                drop(state);
                return match (self.make)() {
                    Ok(item) => Ok(PoolGuard {
                        pool: self,
                        item: Some(item),
                    }),
                    Err(err) => {
                        self.forget();
                        Err(err)
                    }
                };
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn give_back(&self, item: T) {
        self.lock().idle.push(item);
        self.available.notify_one();
    }

    fn forget(&self) {
        let mut state = self.lock();
        state.live = state.live.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }
}

pub struct PoolGuard<'a, T> {
    pool: &'a Pool<T>,
    item: Option<T>,
}

impl<T> Deref for PoolGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.item.as_ref().expect("pool item present until drop")
    }
}

impl<T> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pool item present until drop")
    }
}

impl<T> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.give_back(item);
        }
    }
}
