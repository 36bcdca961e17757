//! The resolver proper: orchestrates cache lookups, coalesced queries,
//! search-list expansion, type-order fallback with the LAST sentinel,
//! CNAME dereferencing, recursion detection, and the record-level load
//! balancing behind `to_ip`.

use crate::cache::{CacheAnswer, RecordCache};
use crate::clock;
use crate::hosts::HostsFile;
use crate::inflight::{InflightTable, JoinOutcome};
use crate::resolv_conf::ResolvConf;
use crate::transport::{DnsTransport, QueryReply, UdpTransport};
use compact_str::CompactString;
use rudder_domain::{
    rcode_text, AnswerSet, ConfigSource, DiscoveryError, OrderType, RData, Record, RecordType,
    ResolverConfig, SrvData,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hosts-file and IP-literal entries are cached for ten years.
const TEN_YEARS: u32 = 315_360_000;

/// Bound on CNAME / SRV-target dereferencing depth.
const MAX_RECURSION: u32 = 20;

/// Transport timing when neither the config nor resolv.conf says
/// otherwise.
const DEFAULT_TIMEOUT_MS: u64 = 2000;
const DEFAULT_RETRANS: u32 = 5;

/// How often a follower may take over a failed or timed-out in-flight
/// query before giving up.
const POOL_MAX_RETRY: u32 = 1;

type BoxedResolve<'a> =
    Pin<Box<dyn Future<Output = Result<Arc<AnswerSet>, DiscoveryError>> + Send + 'a>>;
type BoxedToIp<'a> =
    Pin<Box<dyn Future<Output = Result<(IpAddr, u16), DiscoveryError>> + Send + 'a>>;

/// Log of (name, type) pairs attempted during one resolution. Only pairs
/// that were actually queried count for recursion detection; cache hits
/// are recorded for diagnostics alone, so a cached CNAME loop is caught
/// by the depth bound instead.
#[derive(Default)]
struct TryList {
    queried: FxHashSet<(CompactString, RecordType)>,
    log: Vec<String>,
}

impl TryList {
    fn was_queried(&self, name: &str, qtype: RecordType) -> bool {
        self.queried.contains(&(CompactString::from(name), qtype))
    }

    fn mark_queried(&mut self, name: &str, qtype: RecordType) {
        self.queried.insert((CompactString::from(name), qtype));
        self.log.push(format!("{}:{}", qtype, name));
    }

    fn note(&mut self, entry: String) {
        self.log.push(entry);
    }
}

enum StepOutcome {
    Answer(Arc<AnswerSet>),
    /// The answer was a CNAME for a request that did not ask for one;
    /// the caller dereferences the target.
    Cname(String),
}

pub struct Resolver {
    cache: RecordCache,
    inflight: InflightTable,
    transport: Arc<dyn DnsTransport>,
    hosts: HostsFile,
    order: Vec<OrderType>,
    /// The concrete types named in `order`, for additional-section
    /// filtering and LAST dedup.
    order_types: Vec<RecordType>,
    search: Vec<String>,
    ndots: u32,
    pool_max_wait: Duration,
}

impl Resolver {
    /// Build a resolver with the UDP transport derived from the config
    /// and resolv.conf.
    pub fn new(config: ResolverConfig) -> Result<Arc<Self>, DiscoveryError> {
        let resolv = Self::load_resolv(&config)?;
        let (timeout, retrans) = Self::effective_timing(&config, &resolv);
        let servers = Self::nameserver_addrs(&config, &resolv)?;
        let transport = Arc::new(UdpTransport::new(servers, timeout, retrans));
        Self::build(config, resolv, transport)
    }

    /// Build a resolver over a caller-supplied transport. The embedder's
    /// seam for tests and alternative wire protocols.
    pub fn with_transport(
        config: ResolverConfig,
        transport: Arc<dyn DnsTransport>,
    ) -> Result<Arc<Self>, DiscoveryError> {
        let resolv = Self::load_resolv(&config)?;
        Self::build(config, resolv, transport)
    }

    fn build(
        config: ResolverConfig,
        resolv: ResolvConf,
        transport: Arc<dyn DnsTransport>,
    ) -> Result<Arc<Self>, DiscoveryError> {
        if config.order.is_empty() {
            return Err(DiscoveryError::InvalidName(
                "lookup order must not be empty".into(),
            ));
        }
        let order_types: Vec<RecordType> = config
            .order
            .iter()
            .filter_map(|o| match o {
                OrderType::Query(t) => Some(*t),
                OrderType::LastSuccess => None,
            })
            .collect();

        let search = match &config.search {
            Some(list) => list.iter().map(|d| d.to_ascii_lowercase()).collect(),
            None => resolv.effective_search(),
        };
        let ndots = config.ndots.or(resolv.ndots).unwrap_or(1);

        let cache = RecordCache::new(config.bad_ttl, config.empty_ttl, config.stale_ttl);
        let hosts = Self::load_hosts(&config);
        for (name, ip) in hosts.entries() {
            let qtype = match ip {
                IpAddr::V4(_) => RecordType::A,
                IpAddr::V6(_) => RecordType::AAAA,
            };
            let set = AnswerSet::positive(name, qtype, vec![Record::ip(name, ip, TEN_YEARS)]);
            cache.seed(set, clock::now() + TEN_YEARS as f64);
        }

        let (timeout, retrans) = Self::effective_timing(&config, &resolv);
        let pool_max_wait = timeout * retrans;

        info!(
            ndots,
            ?search,
            order = ?config.order,
            "resolver initialized"
        );

        Ok(Arc::new(Self {
            cache,
            inflight: InflightTable::new(),
            transport,
            hosts,
            order: config.order,
            order_types,
            search,
            ndots,
            pool_max_wait,
        }))
    }

    /// Transport timing: explicit config wins, then the resolv.conf
    /// `options`, then the defaults. The same override chain `ndots` and
    /// `search` use.
    fn effective_timing(config: &ResolverConfig, resolv: &ResolvConf) -> (Duration, u32) {
        let timeout_ms = config
            .timeout
            .or(resolv.timeout_secs.map(|secs| secs as u64 * 1000))
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let retrans = config
            .retrans
            .or(resolv.attempts)
            .unwrap_or(DEFAULT_RETRANS)
            .max(1);
        (Duration::from_millis(timeout_ms), retrans)
    }

    fn load_resolv(config: &ResolverConfig) -> Result<ResolvConf, DiscoveryError> {
        let lines = read_source(&config.resolv_conf)?;
        let mut resolv = ResolvConf::parse(&lines);
        resolv.apply_env();
        Ok(resolv)
    }

    fn load_hosts(config: &ResolverConfig) -> HostsFile {
        match read_source(&config.hosts) {
            Ok(lines) => HostsFile::parse(&lines),
            Err(e) => {
                warn!(error = %e, "hosts file unavailable, using built-in localhost only");
                HostsFile::parse::<&str>(&[])
            }
        }
    }

    fn nameserver_addrs(
        config: &ResolverConfig,
        resolv: &ResolvConf,
    ) -> Result<Vec<SocketAddr>, DiscoveryError> {
        let mut out = Vec::new();
        if !config.nameservers.is_empty() {
            for ns in &config.nameservers {
                out.push(parse_nameserver(ns)?);
            }
        } else {
            for ns in &resolv.nameservers {
                let addr = parse_nameserver(ns)?;
                if addr.is_ipv6() && !config.enable_ipv6 {
                    debug!(nameserver = %addr, "skipping IPv6 nameserver");
                    continue;
                }
                out.push(addr);
            }
        }
        if out.is_empty() {
            return Err(DiscoveryError::Transport("no nameservers configured".into()));
        }
        Ok(out)
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    pub fn purge_cache(&self, max_untouched: Option<f64>) -> usize {
        self.cache.purge(max_untouched)
    }

    /// Resolve a name trying each record type in the configured order.
    pub async fn resolve(
        self: &Arc<Self>,
        qname: &str,
        cache_only: bool,
    ) -> Result<Arc<AnswerSet>, DiscoveryError> {
        let mut try_list = TryList::default();
        let result = self
            .resolve_inner(qname.to_string(), None, cache_only, &mut try_list, 0)
            .await;
        if let Err(e) = &result {
            debug!(qname, error = %e, tried = ?try_list.log, "resolution failed");
        }
        result
    }

    /// Resolve a name for one specific record type.
    pub async fn resolve_type(
        self: &Arc<Self>,
        qname: &str,
        qtype: RecordType,
        cache_only: bool,
    ) -> Result<Arc<AnswerSet>, DiscoveryError> {
        let mut try_list = TryList::default();
        let result = self
            .resolve_inner(qname.to_string(), Some(qtype), cache_only, &mut try_list, 0)
            .await;
        if let Err(e) = &result {
            debug!(qname, %qtype, error = %e, tried = ?try_list.log, "resolution failed");
        }
        result
    }

    /// Resolve a name down to one (ip, port): round-robin over A/AAAA
    /// answers, weighted round-robin over the lowest-priority SRV subset,
    /// dereferencing SRV name targets as needed. An SRV port of 0 falls
    /// back to the caller's `port`.
    pub async fn to_ip(
        self: &Arc<Self>,
        qname: &str,
        port: u16,
        cache_only: bool,
    ) -> Result<(IpAddr, u16), DiscoveryError> {
        let mut try_list = TryList::default();
        self.to_ip_inner(qname.to_string(), port, cache_only, &mut try_list, 0)
            .await
    }

    fn resolve_inner<'a>(
        self: &'a Arc<Self>,
        qname: String,
        req_qtype: Option<RecordType>,
        cache_only: bool,
        try_list: &'a mut TryList,
        depth: u32,
    ) -> BoxedResolve<'a> {
        Box::pin(async move {
            if depth >= MAX_RECURSION {
                return Err(DiscoveryError::MaxRecursion);
            }
            let qname = normalize(&qname)?;

            if let Some(result) = self.ip_literal(&qname, req_qtype) {
                return result;
            }

            if let Some(set) = self.cache.get_short(&qname, req_qtype) {
                if !set.is_error() {
                    try_list.note(format!("short:{}", qname));
                    return Ok(set);
                }
            }

            let order = self.effective_order(req_qtype, &qname);
            let mut last_err = DiscoveryError::from_rcode(3);
            for qtype in order {
                match self
                    .resolve_name_type(&qname, qtype, req_qtype, cache_only, try_list)
                    .await
                {
                    Ok(StepOutcome::Answer(set)) => return Ok(set),
                    Ok(StepOutcome::Cname(target)) => {
                        try_list.note(format!("deref:{}", target));
                        return self
                            .resolve_inner(target, req_qtype, cache_only, try_list, depth + 1)
                            .await;
                    }
                    Err(e) => last_err = e,
                }
            }
            Err(last_err)
        })
    }

    async fn resolve_name_type(
        self: &Arc<Self>,
        qname: &str,
        qtype: RecordType,
        req_qtype: Option<RecordType>,
        cache_only: bool,
        try_list: &mut TryList,
    ) -> Result<StepOutcome, DiscoveryError> {
        let mut last_err = DiscoveryError::from_rcode(3);
        for name in self.search_names(qname, qtype) {
            if try_list.was_queried(&name, qtype) {
                try_list.note(format!("{}:{} (recursion)", qtype, name));
                last_err = DiscoveryError::RecursionDetected;
                continue;
            }
            let set = match self.lookup(&name, qtype, cache_only, try_list).await {
                Ok(set) => set,
                Err(e) => {
                    last_err = e;
                    continue;
                }
            };
            if set.is_error() {
                last_err = DiscoveryError::DnsServer {
                    code: set.errcode.unwrap_or(3),
                    text: set
                        .errstr
                        .clone()
                        .unwrap_or_else(|| rcode_text(set.errcode.unwrap_or(3)).to_string()),
                };
                continue;
            }

            let rtype = set.records.first().map(|r| r.rtype());
            if rtype == Some(RecordType::CNAME) && req_qtype != Some(RecordType::CNAME) {
                if let Some(Record {
                    data: RData::Cname(target),
                    ..
                }) = set.records.first()
                {
                    return Ok(StepOutcome::Cname(target.clone()));
                }
            }

            // An SRV set whose every target is the queried name itself
            // cannot be dereferenced; fail this type over to the next.
            if qtype == RecordType::SRV && set.srv_self_referential() {
                try_list.note(format!("SRV:{} (self-referential)", name));
                last_err = DiscoveryError::RecursionDetected;
                break;
            }

            self.cache.set_last_type(&name, qtype);
            if name != qname {
                self.cache.set_last_type(qname, qtype);
                self.cache.set_short(qname, req_qtype, Arc::clone(&set));
            }
            return Ok(StepOutcome::Answer(set));
        }
        Err(last_err)
    }

    async fn lookup(
        self: &Arc<Self>,
        name: &str,
        qtype: RecordType,
        cache_only: bool,
        try_list: &mut TryList,
    ) -> Result<Arc<AnswerSet>, DiscoveryError> {
        match self.cache.get(name, qtype, cache_only) {
            CacheAnswer::Hit(set) => {
                try_list.note(format!("{}:{} (cached)", qtype, name));
                Ok(set)
            }
            CacheAnswer::Stale(set) => {
                try_list.note(format!("{}:{} (stale)", qtype, name));
                let this = Arc::clone(self);
                let name = name.to_string();
                tokio::spawn(async move {
                    if let Err(e) = this.synchronized_query(&name, qtype).await {
                        debug!(name = %name, %qtype, error = %e, "background refresh failed");
                    }
                });
                Ok(set)
            }
            CacheAnswer::MissTtl0 => {
                // ttl=0 answers are queried on every access, uncoalesced
                try_list.mark_queried(name, qtype);
                self.individual_query(name, qtype).await
            }
            CacheAnswer::Miss => {
                if cache_only {
                    return Err(DiscoveryError::CacheOnlyMiss);
                }
                try_list.mark_queried(name, qtype);
                self.synchronized_query(name, qtype).await
            }
        }
    }

    pub(crate) async fn synchronized_query(
        self: &Arc<Self>,
        name: &str,
        qtype: RecordType,
    ) -> Result<Arc<AnswerSet>, DiscoveryError> {
        let mut cause = String::from("timeout");
        for _ in 0..=POOL_MAX_RETRY {
            match self.inflight.join(name, qtype) {
                JoinOutcome::Leader(guard) => {
                    let result = self.individual_query(name, qtype).await;
                    guard.publish(result.clone());
                    return result;
                }
                JoinOutcome::Follower(mut rx) => {
                    match tokio::time::timeout(self.pool_max_wait, rx.changed()).await {
                        Ok(Ok(())) => {
                            let value = rx.borrow().clone();
                            match value {
                                Some(Ok(set)) => return Ok(set),
                                Some(Err(e)) => cause = e.to_string(),
                                None => cause = "in-flight query was abandoned".to_string(),
                            }
                        }
                        Ok(Err(_)) => cause = "in-flight query was abandoned".to_string(),
                        Err(_) => cause = "timeout".to_string(),
                    }
                }
            }
        }
        Err(DiscoveryError::PoolExceeded {
            retries: POOL_MAX_RETRY,
            cause,
        })
    }

    async fn individual_query(
        self: &Arc<Self>,
        name: &str,
        qtype: RecordType,
    ) -> Result<Arc<AnswerSet>, DiscoveryError> {
        match self.transport.query(name, qtype).await {
            Ok(reply) => {
                let set = self.build_answer(name, qtype, reply);
                // insert() refuses to let a non-NXDOMAIN error evict a
                // stale positive entry, handing that entry back instead
                Ok(self.cache.insert(set))
            }
            Err(e) => {
                if let Some(stale) = self.cache.get_stale(name, qtype) {
                    if !stale.is_error() {
                        debug!(name, %qtype, error = %e, "serving stale records over transport error");
                        return Ok(stale);
                    }
                }
                Err(e)
            }
        }
    }

    fn build_answer(&self, name: &str, qtype: RecordType, reply: QueryReply) -> AnswerSet {
        self.cache_additionals(&reply.additionals);

        if reply.rcode != 0 {
            return AnswerSet::error(name, qtype, reply.rcode, rcode_text(reply.rcode));
        }

        let matching: Vec<Record> = reply
            .answers
            .iter()
            .filter(|r| r.rtype() == qtype)
            .cloned()
            .collect();
        if !matching.is_empty() {
            return AnswerSet::positive(name, qtype, matching);
        }

        if qtype != RecordType::CNAME {
            let cnames: Vec<Record> = reply
                .answers
                .iter()
                .filter(|r| r.rtype() == RecordType::CNAME)
                .cloned()
                .collect();
            if !cnames.is_empty() {
                return AnswerSet::positive(name, RecordType::CNAME, cnames);
            }
        }

        AnswerSet::error(name, qtype, 3, rcode_text(3))
    }

    /// Additional-section records of a type present in `order` are cached
    /// as a byproduct. The last-successful-type table is never touched.
    fn cache_additionals(&self, additionals: &[Record]) {
        if additionals.is_empty() {
            return;
        }
        let mut groups: FxHashMap<(String, RecordType), Vec<Record>> = FxHashMap::default();
        for record in additionals {
            let rtype = record.rtype();
            if self.order_types.contains(&rtype) {
                groups
                    .entry((record.name.clone(), rtype))
                    .or_default()
                    .push(record.clone());
            }
        }
        for ((name, rtype), records) in groups {
            self.cache
                .insert_additional(AnswerSet::positive(name, rtype, records));
        }
    }

    /// IP literals bypass DNS: synthesize a ten-year record of the
    /// matching family, rejecting an explicit qtype of the wrong kind.
    fn ip_literal(
        &self,
        qname: &str,
        req_qtype: Option<RecordType>,
    ) -> Option<Result<Arc<AnswerSet>, DiscoveryError>> {
        let bare = qname
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(qname);
        let ip: IpAddr = bare.parse().ok()?;
        let actual = match ip {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::AAAA,
        };
        if let Some(q) = req_qtype {
            if q != actual {
                return Some(Err(DiscoveryError::from_rcode(3)));
            }
        }
        let set = AnswerSet::positive(bare, actual, vec![Record::ip(bare, ip, TEN_YEARS)]);
        Some(Ok(self.cache.insert(set)))
    }

    /// The record types to try, in order. An explicit qtype wins; the
    /// LAST sentinel becomes the name's last-successful type, and later
    /// duplicates are dropped so no type is attempted twice.
    fn effective_order(&self, req_qtype: Option<RecordType>, qname: &str) -> Vec<RecordType> {
        if let Some(t) = req_qtype {
            return vec![t];
        }
        let mut out = Vec::with_capacity(self.order.len());
        for entry in &self.order {
            let t = match entry {
                OrderType::Query(t) => *t,
                OrderType::LastSuccess => match self.cache.get_last_type(qname) {
                    Some(t) => t,
                    None => continue,
                },
            };
            if !out.contains(&t) {
                out.push(t);
            }
        }
        out
    }

    /// Names to try for one type. A qname with fewer dots than `ndots`
    /// that is not defined in the hosts table gets the search expansions
    /// first and the bare name last; otherwise the bare name leads.
    fn search_names(&self, qname: &str, qtype: RecordType) -> Vec<String> {
        if self.search.is_empty() {
            return vec![qname.to_string()];
        }
        let dots = qname.matches('.').count() as u32;
        let expand_first = dots < self.ndots && !self.hosts.defines(qname, qtype);
        let mut names = Vec::with_capacity(self.search.len() + 1);
        if expand_first {
            for domain in &self.search {
                names.push(format!("{}.{}", qname, domain));
            }
            names.push(qname.to_string());
        } else {
            names.push(qname.to_string());
            for domain in &self.search {
                names.push(format!("{}.{}", qname, domain));
            }
        }
        names
    }

    fn to_ip_inner<'a>(
        self: &'a Arc<Self>,
        qname: String,
        port: u16,
        cache_only: bool,
        try_list: &'a mut TryList,
        depth: u32,
    ) -> BoxedToIp<'a> {
        Box::pin(async move {
            if depth >= MAX_RECURSION {
                return Err(DiscoveryError::MaxRecursion);
            }
            let set = self
                .resolve_inner(qname, None, cache_only, try_list, depth)
                .await?;
            match set.records.first().map(|r| r.rtype()) {
                Some(RecordType::SRV) => {
                    let srv = select_srv(&set)?;
                    let port = if srv.port == 0 { port } else { srv.port };
                    if let Ok(ip) = srv.target.parse::<IpAddr>() {
                        return Ok((ip, port));
                    }
                    self.to_ip_inner(srv.target, port, cache_only, try_list, depth + 1)
                        .await
                }
                Some(RecordType::A) | Some(RecordType::AAAA) => {
                    let record = select_round_robin(&set);
                    let ip = record.ip_addr().ok_or_else(|| {
                        DiscoveryError::Transport("mixed record types in answer".into())
                    })?;
                    Ok((ip, port))
                }
                _ => Err(DiscoveryError::from_rcode(3)),
            }
        })
    }
}

/// Deterministic cursor over the answer set; the first serve trusts the
/// DNS answer order.
fn select_round_robin(set: &AnswerSet) -> &Record {
    let n = set.rotation.cursor.fetch_add(1, Ordering::Relaxed);
    &set.records[n % set.records.len()]
}

/// Weighted round-robin over the lowest-priority SRV subset. Weight-0
/// entries count as weight 1. The rotation list holds record indices
/// expanded by weight reduced by their gcd; each cycle serves every slot
/// once, in random order, by swapping the pick to the consumed tail.
fn select_srv(set: &AnswerSet) -> Result<SrvData, DiscoveryError> {
    let srvs: Vec<(usize, &SrvData)> = set
        .records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| match &r.data {
            RData::Srv(s) => Some((i, s)),
            _ => None,
        })
        .collect();
    if srvs.is_empty() {
        return Err(DiscoveryError::from_rcode(3));
    }

    let min_prio = srvs.iter().map(|(_, s)| s.priority).min().unwrap_or(0);
    let prio: Vec<usize> = srvs
        .iter()
        .filter(|(_, s)| s.priority == min_prio)
        .map(|(i, _)| *i)
        .collect();
    if prio.len() == 1 {
        return match &set.records[prio[0]].data {
            RData::Srv(s) => Ok(s.clone()),
            _ => unreachable!(),
        };
    }

    let mut rotation = set.rotation.srv.lock().unwrap();
    if rotation.list.is_empty() {
        let weights: Vec<u64> = prio
            .iter()
            .map(|&i| match &set.records[i].data {
                RData::Srv(s) => (s.weight.max(1)) as u64,
                _ => 1,
            })
            .collect();
        let g = weights.iter().fold(0u64, |acc, &w| gcd(acc, w));
        let mut list = Vec::new();
        for (k, &idx) in prio.iter().enumerate() {
            for _ in 0..(weights[k] / g) {
                list.push(idx);
            }
        }
        rotation.pointer = list.len();
        rotation.list = list;
    }

    let pick = if !rotation.started {
        rotation.started = true;
        // first serve trusts DNS order: consume the first record's slot
        rotation.list[..rotation.pointer]
            .iter()
            .position(|&i| i == prio[0])
            .unwrap_or(0)
    } else {
        if rotation.pointer == 0 {
            rotation.pointer = rotation.list.len();
        }
        fastrand::usize(0..rotation.pointer)
    };

    let chosen = rotation.list[pick];
    let tail = rotation.pointer - 1;
    rotation.list.swap(pick, tail);
    rotation.pointer = tail;

    match &set.records[chosen].data {
        RData::Srv(s) => Ok(s.clone()),
        _ => unreachable!(),
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn normalize(name: &str) -> Result<String, DiscoveryError> {
    let n = name.trim().trim_end_matches('.').to_ascii_lowercase();
    if n.is_empty() {
        return Err(DiscoveryError::InvalidName(name.to_string()));
    }
    Ok(n)
}

fn parse_nameserver(s: &str) -> Result<SocketAddr, DiscoveryError> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, 53));
    }
    Err(DiscoveryError::InvalidName(format!(
        "invalid nameserver: {}",
        s
    )))
}

fn read_source(source: &ConfigSource) -> Result<Vec<String>, DiscoveryError> {
    match source {
        ConfigSource::Literal(lines) => Ok(lines.clone()),
        ConfigSource::Path(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| DiscoveryError::Io(format!("{}: {}", path, e)))?;
            Ok(content.lines().map(|l| l.to_string()).collect())
        }
    }
}
