//! Bounded pool of exclusive resources.
//!
//! ONNX Runtime sessions need `&mut` access to run, so each concurrent
//! inference checks one out. Members are created on demand up to the
//! capacity; callers only wait once every member is busy.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

type Factory<T, E> = dyn Fn() -> Result<T, E> + Send + Sync;

pub struct Pool<T, E> {
    factory: Box<Factory<T, E>>,
    capacity: usize,
    state: Mutex<PoolState<T>>,
    returned: Condvar,
}

struct PoolState<T> {
    idle: Vec<T>,
    created: usize,
}

impl<T, E> Pool<T, E> {
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            capacity: capacity.max(1),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                created: 0,
            }),
            returned: Condvar::new(),
        }
    }

    /// Pool that starts with an already built member.
    pub fn seeded<F>(capacity: usize, first: T, factory: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        let pool = Self::new(capacity, factory);
        {
            let mut state = pool.lock();
            state.idle.push(first);
            state.created = 1;
        }
        pool
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Members built so far, busy or idle.
    pub fn created(&self) -> usize {
        self.lock().created
    }

    /// Runs `f` with exclusive access to one member. Fails only when a new
    /// member had to be built and the factory failed.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, E> {
        let mut item = self.acquire()?;
        let lease = Lease { pool: self };
        let result = f(&mut item);
        lease.release(item);
        Ok(result)
    }

    fn acquire(&self) -> Result<T, E> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.idle.pop() {
                return Ok(item);
            }
            if state.created < self.capacity {
                state.created += 1;
                drop(state);
                return (self.factory)().inspect_err(|_| self.give_back(None));
            }
            state = self
                .returned
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns a member, or frees its slot when the member was lost.
    fn give_back(&self, item: Option<T>) {
        let mut state = self.lock();
        match item {
            Some(item) => state.idle.push(item),
            None => state.created -= 1,
        }
        drop(state);
        self.returned.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frees the slot if the borrower unwinds before handing the member back.
struct Lease<'a, T, E> {
    pool: &'a Pool<T, E>,
}

impl<T, E> Lease<'_, T, E> {
    fn release(self, item: T) {
        let pool = self.pool;
        std::mem::forget(self);
        pool.give_back(Some(item));
    }
}

impl<T, E> Drop for Lease<'_, T, E> {
    fn drop(&mut self) {
        self.pool.give_back(None);
    }
}
