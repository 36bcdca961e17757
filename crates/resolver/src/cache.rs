//! Record cache: keyed answer sets with ttl/stale/touch metadata, plus the
//! last-successful-type table and short-name aliases.
//!
//! Stale handling: an entry past its expiry is handed out exactly once,
//! flagged `expired`, so the caller can serve stale data while a refresh
//! runs. It then lingers for `stale_ttl` seconds, reachable only through
//! `get_stale`, before `purge` (or a later access) drops it.

use crate::clock;
use compact_str::CompactString;
use dashmap::DashMap;
use rudder_domain::{AnswerSet, RecordType};
use rustc_hash::FxBuildHasher;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum CacheKey {
    /// Full answer set for `(qtype, name)`.
    Answer(RecordType, CompactString),
    /// Answer for a short name, before search-list expansion. `None` is
    /// the untyped variant used when the caller gave no qtype.
    Short(Option<RecordType>, CompactString),
}

struct CacheEntry {
    set: Arc<AnswerSet>,
    /// The one-shot stale hand-out happened.
    stale_served: bool,
}

pub enum CacheAnswer {
    /// Valid entry.
    Hit(Arc<AnswerSet>),
    /// Entry just crossed its expiry; flagged `expired`, handed out once.
    Stale(Arc<AnswerSet>),
    /// A ttl=0 entry is present: the caller must query, without
    /// coalescing, and may use the entry as a fallback.
    MissTtl0,
    Miss,
}

pub struct RecordCache {
    answers: DashMap<CacheKey, CacheEntry, FxBuildHasher>,
    last_types: DashMap<CompactString, RecordType, FxBuildHasher>,
    bad_ttl: f64,
    empty_ttl: f64,
    stale_ttl: f64,
}

impl RecordCache {
    pub fn new(bad_ttl: f64, empty_ttl: f64, stale_ttl: f64) -> Self {
        Self {
            answers: DashMap::with_hasher(FxBuildHasher),
            last_types: DashMap::with_hasher(FxBuildHasher),
            bad_ttl,
            empty_ttl,
            stale_ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn get(&self, qname: &str, qtype: RecordType, peek: bool) -> CacheAnswer {
        let key = CacheKey::Answer(qtype, CompactString::from(qname));
        self.get_by_key(&key, peek)
    }

    pub(crate) fn get_by_key(&self, key: &CacheKey, peek: bool) -> CacheAnswer {
        let now = clock::now();
        let mut remove = false;
        let answer = match self.answers.get_mut(key) {
            None => CacheAnswer::Miss,
            Some(mut entry) => {
                entry.set.touch.store(now as u64, Ordering::Relaxed);
                if peek {
                    CacheAnswer::Hit(Arc::clone(&entry.set))
                } else if entry.set.all_zero_ttl() {
                    CacheAnswer::MissTtl0
                } else if entry.set.expire < now {
                    if !entry.stale_served {
                        entry.stale_served = true;
                        entry.set.expired.store(true, Ordering::Relaxed);
                        CacheAnswer::Stale(Arc::clone(&entry.set))
                    } else {
                        if now > entry.set.expire + self.stale_ttl {
                            remove = true;
                        }
                        CacheAnswer::Miss
                    }
                } else {
                    CacheAnswer::Hit(Arc::clone(&entry.set))
                }
            }
        };
        if remove {
            self.answers.remove(key);
        }
        answer
    }

    /// Entry without the ttl check, still subject to the stale window.
    pub fn get_stale(&self, qname: &str, qtype: RecordType) -> Option<Arc<AnswerSet>> {
        let key = CacheKey::Answer(qtype, CompactString::from(qname));
        let now = clock::now();
        let entry = self.answers.get(&key)?;
        if entry.set.expire < now && now > entry.set.expire + self.stale_ttl {
            drop(entry);
            self.answers.remove(&key);
            return None;
        }
        Some(Arc::clone(&entry.set))
    }

    /// Insert an answer set, computing its expiry from the record ttls or
    /// from the error ttl settings. Returns the stored set (the existing
    /// entry when a non-NXDOMAIN error refused to overwrite stale data).
    pub fn insert(&self, mut set: AnswerSet) -> Arc<AnswerSet> {
        let now = clock::now();
        set.touch.store(now as u64, Ordering::Relaxed);
        set.expire = if set.is_error() || set.is_empty() {
            if set.errcode == Some(3) {
                now + self.empty_ttl
            } else {
                now + self.bad_ttl
            }
        } else {
            now + set.min_ttl().unwrap_or(0) as f64
        };

        let (key_type, key_name) = match set.records.first() {
            Some(first) => (first.rtype(), CompactString::from(first.name.as_str())),
            None => (set.qtype, CompactString::from(set.qname.as_str())),
        };
        let key = CacheKey::Answer(key_type, key_name);

        // A name error may replace a stale positive entry; other errors
        // must leave it for continued stale serving.
        if set.is_error() && set.errcode != Some(3) {
            if let Some(existing) = self.answers.get(&key) {
                if !existing.set.is_error() && existing.set.expire < now {
                    trace!(
                        qname = %set.qname,
                        qtype = %set.qtype,
                        "keeping stale entry over server error"
                    );
                    return Arc::clone(&existing.set);
                }
            }
        }

        let arc = Arc::new(set);
        debug!(key = ?key, expire = arc.expire, records = arc.records.len(), "cache insert");
        self.answers.insert(
            key,
            CacheEntry {
                set: Arc::clone(&arc),
                stale_served: false,
            },
        );
        arc
    }

    /// Byproduct caching of additional-section records. Never touches the
    /// last-successful-type table.
    pub fn insert_additional(&self, set: AnswerSet) {
        let _ = self.insert(set);
    }

    /// Store an entry under an explicit expire, bypassing the ttl math.
    /// Used to seed hosts-file entries and by tests.
    pub fn seed(&self, mut set: AnswerSet, expire: f64) {
        set.touch.store(clock::now() as u64, Ordering::Relaxed);
        set.expire = expire;
        let key = CacheKey::Answer(set.qtype, CompactString::from(set.qname.as_str()));
        self.answers.insert(
            key,
            CacheEntry {
                set: Arc::new(set),
                stale_served: false,
            },
        );
    }

    pub(crate) fn set_short(
        &self,
        shortname: &str,
        qtype: Option<RecordType>,
        set: Arc<AnswerSet>,
    ) {
        let key = CacheKey::Short(qtype, CompactString::from(shortname));
        self.answers.insert(
            key,
            CacheEntry {
                set,
                stale_served: false,
            },
        );
    }

    pub(crate) fn get_short(
        &self,
        shortname: &str,
        qtype: Option<RecordType>,
    ) -> Option<Arc<AnswerSet>> {
        let key = CacheKey::Short(qtype, CompactString::from(shortname));
        match self.get_by_key(&key, false) {
            CacheAnswer::Hit(set) => Some(set),
            _ => None,
        }
    }

    pub fn get_last_type(&self, name: &str) -> Option<RecordType> {
        self.last_types
            .get(&CompactString::from(name))
            .map(|t| *t.value())
    }

    pub fn set_last_type(&self, name: &str, qtype: RecordType) {
        self.last_types.insert(CompactString::from(name), qtype);
    }

    /// Drop entries past their stale window, and optionally entries not
    /// touched for `max_untouched` seconds. Returns how many went.
    pub fn purge(&self, max_untouched: Option<f64>) -> usize {
        let now = clock::now();
        let before = self.answers.len();
        self.answers.retain(|_, entry| {
            if entry.set.expire < now && now > entry.set.expire + self.stale_ttl {
                return false;
            }
            if let Some(max) = max_untouched {
                let touch = entry.set.touch.load(Ordering::Relaxed) as f64;
                if now - touch > max {
                    return false;
                }
            }
            true
        });
        let removed = before - self.answers.len();
        if removed > 0 {
            debug!(removed, remaining = self.answers.len(), "cache purged");
        }
        removed
    }

    pub fn clear(&self) {
        self.answers.clear();
        self.last_types.clear();
    }
}
