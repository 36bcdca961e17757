//! Reusable selection handles. A handle carries retry and hash context
//! across retries of one request; releasing it defuses the GC hook and
//! returns it to a bounded LIFO pool, while dropping it unreleased fires
//! the hook exactly once.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Hook fired exactly once when a handle is dropped without release.
pub type GcHook = Box<dyn FnOnce(&mut HandleData) + Send>;

pub struct HandleData {
    /// Stable identity, preserved across release and reuse.
    pub id: u64,
    pub retry_count: u32,
    pub hash_value: Option<u32>,
    pub(crate) address_id: Option<u64>,
    pub(crate) gc_hook: Option<GcHook>,
}

impl fmt::Debug for HandleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleData")
            .field("id", &self.id)
            .field("retry_count", &self.retry_count)
            .field("hash_value", &self.hash_value)
            .field("address_id", &self.address_id)
            .finish()
    }
}

impl HandleData {
    fn clear(&mut self) {
        self.retry_count = 0;
        self.hash_value = None;
        self.address_id = None;
        self.gc_hook = None;
    }
}

pub struct Handle {
    data: Option<Box<HandleData>>,
    pool: Arc<HandlePool>,
    released: bool,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("data", &self.data)
            .field("released", &self.released)
            .finish()
    }
}

impl Handle {
    pub fn id(&self) -> u64 {
        self.data().id
    }

    pub fn retry_count(&self) -> u32 {
        self.data().retry_count
    }

    pub fn hash_value(&self) -> Option<u32> {
        self.data().hash_value
    }

    pub(crate) fn data(&self) -> &HandleData {
        self.data.as_ref().expect("handle data present until drop")
    }

    pub(crate) fn data_mut(&mut self) -> &mut HandleData {
        self.data.as_mut().expect("handle data present until drop")
    }

    /// Return the handle to its pool without firing the GC hook.
    pub fn release(mut self) {
        self.released = true;
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let Some(mut data) = self.data.take() else {
            return;
        };
        if self.released {
            data.gc_hook = None;
            self.pool.put(data);
        } else if let Some(hook) = data.gc_hook.take() {
            hook(&mut data);
        }
    }
}

pub struct HandlePool {
    free: Mutex<Vec<Box<HandleData>>>,
    capacity: AtomicUsize,
    next_id: AtomicU64,
}

impl HandlePool {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            capacity: AtomicUsize::new(capacity),
            next_id: AtomicU64::new(1),
        })
    }

    /// Resize the pool; excess pooled handles are dropped.
    pub fn set_cache_size(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Relaxed);
        let mut free = self.free.lock().unwrap();
        free.truncate(capacity);
    }

    pub(crate) fn get(self: &Arc<Self>, gc_hook: Option<GcHook>) -> Handle {
        let data = self.free.lock().unwrap().pop();
        let mut data = data.unwrap_or_else(|| {
            Box::new(HandleData {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                retry_count: 0,
                hash_value: None,
                address_id: None,
                gc_hook: None,
            })
        });
        data.gc_hook = gc_hook;
        Handle {
            data: Some(data),
            pool: Arc::clone(self),
            released: false,
        }
    }

    fn put(&self, mut data: Box<HandleData>) {
        data.clear();
        let mut free = self.free.lock().unwrap();
        if free.len() < self.capacity.load(Ordering::Relaxed) {
            free.push(data);
        }
    }

    pub fn pooled(&self) -> usize {
        self.free.lock().unwrap().len()
    }
}
