use crate::record::{RData, Record, RecordType};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Answer sets are almost always a handful of records; keep them inline.
pub type RecordSet = SmallVec<[Record; 4]>;

/// Rotation cursor for weighted SRV selection. `list` holds indices into
/// the lowest-priority subset, each repeated `weight / gcd` times;
/// `pointer` is the length of the not-yet-served prefix.
#[derive(Debug, Default)]
pub struct SrvRotation {
    pub list: Vec<usize>,
    pub pointer: usize,
    pub started: bool,
}

/// Per-answer-set selection state used by `to_ip`. Rides the answer set so
/// that it resets naturally whenever the answer is refreshed.
#[derive(Debug, Default)]
pub struct RotationState {
    pub cursor: AtomicUsize,
    pub srv: Mutex<SrvRotation>,
}

/// An ordered list of records sharing (name, type), plus cache metadata.
///
/// A set with `errcode` present and no records is an error set: a cached
/// failure that is served until its (short) expire passes.
#[derive(Debug)]
pub struct AnswerSet {
    pub qname: String,
    pub qtype: RecordType,
    pub records: RecordSet,
    pub errcode: Option<u16>,
    pub errstr: Option<String>,

    /// Absolute expiry, seconds since the unix epoch.
    pub expire: f64,
    /// Last access, seconds since the unix epoch. Updated on cache hits.
    pub touch: AtomicU64,
    /// Set when the entry was served past its expiry (stale serving).
    pub expired: AtomicBool,
    /// Marks a synthetic SRV wrapper standing in for a ttl=0 answer.
    pub ttl0: bool,
    /// Marks a failed query result held by a balancer host, so the
    /// requery timer knows to retry it.
    pub error_query: bool,

    pub rotation: RotationState,
}

impl AnswerSet {
    pub fn positive(
        qname: impl Into<String>,
        qtype: RecordType,
        records: impl Into<RecordSet>,
    ) -> Self {
        Self {
            qname: qname.into(),
            qtype,
            records: records.into(),
            errcode: None,
            errstr: None,
            expire: 0.0,
            touch: AtomicU64::new(0),
            expired: AtomicBool::new(false),
            ttl0: false,
            error_query: false,
            rotation: RotationState::default(),
        }
    }

    pub fn error(
        qname: impl Into<String>,
        qtype: RecordType,
        errcode: u16,
        errstr: impl Into<String>,
    ) -> Self {
        Self {
            qname: qname.into(),
            qtype,
            records: RecordSet::new(),
            errcode: Some(errcode),
            errstr: Some(errstr.into()),
            expire: 0.0,
            touch: AtomicU64::new(0),
            expired: AtomicBool::new(false),
            ttl0: false,
            error_query: false,
            rotation: RotationState::default(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.errcode.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Smallest ttl across the set; `None` for empty/error sets.
    pub fn min_ttl(&self) -> Option<u32> {
        self.records.iter().map(|r| r.ttl).min()
    }

    /// True when every record carries ttl=0 (a set DNS declines to cache).
    pub fn all_zero_ttl(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.ttl == 0)
    }

    pub fn is_expired_flagged(&self) -> bool {
        self.expired.load(Ordering::Relaxed)
    }

    /// True when every SRV record points back at the queried name itself
    /// (e.g. a Kubernetes headless-service answer).
    pub fn srv_self_referential(&self) -> bool {
        if self.records.is_empty() {
            return false;
        }
        self.records.iter().all(|r| match &r.data {
            RData::Srv(srv) => srv.target.eq_ignore_ascii_case(&self.qname),
            _ => false,
        })
    }
}
