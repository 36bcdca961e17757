//! Scripted in-memory transport for tests: fixed or one-shot replies per
//! (name, type), an atomic query counter, and an optional artificial
//! latency so coalescing can be exercised deterministically.

use super::{DnsTransport, QueryReply};
use async_trait::async_trait;
use rudder_domain::{DiscoveryError, Record, RecordType};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type ScriptKey = (String, RecordType);
type ScriptReply = Result<QueryReply, DiscoveryError>;

#[derive(Default)]
struct Scripts {
    /// Consumed front-to-back before the sticky reply is considered.
    one_shot: FxHashMap<ScriptKey, VecDeque<ScriptReply>>,
    sticky: FxHashMap<ScriptKey, ScriptReply>,
}

#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<Scripts>,
    queries: AtomicUsize,
    log: Mutex<Vec<ScriptKey>>,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every query for (name, type) gets this reply.
    pub fn answer(&self, qname: &str, qtype: RecordType, records: Vec<Record>) -> &Self {
        self.reply(qname, qtype, Ok(QueryReply::answer(records)))
    }

    pub fn reply(&self, qname: &str, qtype: RecordType, reply: ScriptReply) -> &Self {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .sticky
            .insert((qname.to_ascii_lowercase(), qtype), reply);
        self
    }

    /// Queue a reply consumed by exactly one query, ahead of any sticky
    /// reply for the same key.
    pub fn reply_once(&self, qname: &str, qtype: RecordType, reply: ScriptReply) -> &Self {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .one_shot
            .entry((qname.to_ascii_lowercase(), qtype))
            .or_default()
            .push_back(reply);
        self
    }

    /// Artificial per-query latency.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    /// Queries seen so far, in order.
    pub fn query_log(&self) -> Vec<(String, RecordType)> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsTransport for MockTransport {
    async fn query(
        &self,
        qname: &str,
        qtype: RecordType,
    ) -> Result<QueryReply, DiscoveryError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.log
            .lock()
            .unwrap()
            .push((qname.to_ascii_lowercase(), qtype));

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let key = (qname.to_ascii_lowercase(), qtype);
        let mut scripts = self.scripts.lock().unwrap();
        if let Some(queue) = scripts.one_shot.get_mut(&key) {
            if let Some(reply) = queue.pop_front() {
                return reply;
            }
        }
        match scripts.sticky.get(&key) {
            Some(reply) => reply.clone(),
            None => Ok(QueryReply::nxdomain()),
        }
    }
}
