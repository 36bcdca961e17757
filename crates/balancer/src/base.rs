//! The balancer tree: hosts owning addresses, weights derived from DNS
//! answers, sorted-answer diffing on refresh, and derived health. All
//! operations here are synchronous state manipulation; the ring layer
//! owns the locking and the DNS awaits.

use crate::events::BalancerEvent;
use rudder_domain::{AnswerSet, DiscoveryError, RData, Record, RecordType};
use rudder_resolver::clock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) type HostId = u64;
pub(crate) type AddrId = u64;

/// What an address points at: a concrete IP, or a name still to be
/// resolved per request (SRV targets, ttl=0 wrappers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerTarget {
    Ip(IpAddr),
    Name(String),
}

impl PeerTarget {
    pub fn is_name(&self) -> bool {
        matches!(self, PeerTarget::Name(_))
    }
}

impl fmt::Display for PeerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerTarget::Ip(ip) => write!(f, "{}", ip),
            PeerTarget::Name(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Address {
    pub id: AddrId,
    pub host: HostId,
    /// Sort key of the DNS entry this address was built from; weight is
    /// excluded so weight-only changes update in place.
    pub key: String,
    pub target: PeerTarget,
    pub port: u16,
    pub weight: u32,
    pub available: bool,
    /// One-way flag: a disabled address has weight 0 and is deleted at
    /// the end of the refresh cycle that disabled it.
    pub disabled: bool,
}

#[derive(Debug)]
pub(crate) struct Host {
    pub id: HostId,
    pub hostname: String,
    pub port: u16,
    pub node_weight: u32,
    pub weight: u32,
    pub addresses: Vec<AddrId>,
    pub last_query: Option<Arc<AnswerSet>>,
    /// Sorted (key, weight) pairs of the answer currently applied.
    pub last_entries: Vec<(String, u32)>,
    pub last_type: Option<RecordType>,
    /// The previous refresh observed ttl=0; two in a row switch the host
    /// to the synthetic SRV wrapper.
    pub ttl0_seen: bool,
    pub ttl0_mode: bool,
}

#[derive(Default)]
pub(crate) struct DnsDelta {
    pub changed: bool,
    pub failed: bool,
    /// Disabled this cycle; the caller deletes them after the
    /// redistribution hook has run.
    pub to_delete: SmallVec<[AddrId; 4]>,
}

pub(crate) struct BaseState {
    pub hosts: Vec<HostId>,
    pub host_map: FxHashMap<HostId, Host>,
    /// Flat address list in insertion order; the redistribution walk
    /// depends on it.
    pub addr_order: Vec<AddrId>,
    pub addr_map: FxHashMap<AddrId, Address>,
    next_id: u64,
    pub total_weight: u32,
    pub healthy: bool,
    pub log_prefix: String,
    pub health_threshold: f64,
}

impl BaseState {
    pub fn new(log_prefix: String, health_threshold: f64) -> Self {
        Self {
            hosts: Vec::new(),
            host_map: FxHashMap::default(),
            addr_order: Vec::new(),
            addr_map: FxHashMap::default(),
            next_id: 1,
            total_weight: 0,
            healthy: false,
            log_prefix,
            health_threshold,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn find_host(&self, hostname: &str, port: u16) -> Option<HostId> {
        self.hosts.iter().copied().find(|id| {
            self.host_map
                .get(id)
                .map(|h| h.hostname == hostname && h.port == port)
                .unwrap_or(false)
        })
    }

    pub fn add_host_entry(&mut self, hostname: &str, port: u16, node_weight: u32) -> HostId {
        let id = self.next_id();
        info!(
            prefix = %self.log_prefix,
            hostname, port, node_weight, "adding host"
        );
        self.host_map.insert(
            id,
            Host {
                id,
                hostname: hostname.to_string(),
                port,
                node_weight,
                weight: 0,
                addresses: Vec::new(),
                last_query: None,
                last_entries: Vec::new(),
                last_type: None,
                ttl0_seen: false,
                ttl0_mode: false,
            },
        );
        self.hosts.push(id);
        id
    }

    pub fn delete_host(&mut self, host_id: HostId) {
        self.hosts.retain(|&id| id != host_id);
        if let Some(host) = self.host_map.remove(&host_id) {
            info!(prefix = %self.log_prefix, hostname = %host.hostname, port = host.port, "host removed");
        }
        self.recompute_weights();
    }

    pub fn add_address(
        &mut self,
        host_id: HostId,
        key: String,
        target: PeerTarget,
        port: u16,
        weight: u32,
        events: &mut Vec<BalancerEvent>,
    ) -> AddrId {
        let id = self.next_id();
        let hostname = self
            .host_map
            .get(&host_id)
            .map(|h| h.hostname.clone())
            .unwrap_or_default();
        debug!(
            prefix = %self.log_prefix,
            hostname = %hostname, target = %target, port, weight, "adding address"
        );
        self.addr_map.insert(
            id,
            Address {
                id,
                host: host_id,
                key,
                target: target.clone(),
                port,
                weight,
                available: true,
                disabled: false,
            },
        );
        self.addr_order.push(id);
        if let Some(host) = self.host_map.get_mut(&host_id) {
            host.addresses.push(id);
        }
        events.push(BalancerEvent::Added {
            target,
            port,
            hostname,
        });
        id
    }

    pub fn disable_address(&mut self, addr_id: AddrId) {
        if let Some(addr) = self.addr_map.get_mut(&addr_id) {
            addr.weight = 0;
            addr.disabled = true;
        }
    }

    pub fn delete_address(&mut self, addr_id: AddrId, events: &mut Vec<BalancerEvent>) {
        let Some(addr) = self.addr_map.remove(&addr_id) else {
            return;
        };
        self.addr_order.retain(|&id| id != addr_id);
        let hostname = match self.host_map.get_mut(&addr.host) {
            Some(host) => {
                host.addresses.retain(|&id| id != addr_id);
                host.hostname.clone()
            }
            None => String::new(),
        };
        debug!(prefix = %self.log_prefix, target = %addr.target, port = addr.port, "address removed");
        events.push(BalancerEvent::Removed {
            target: addr.target,
            port: addr.port,
            hostname,
        });
    }

    pub fn recompute_weights(&mut self) {
        let mut total = 0u32;
        for host_id in self.hosts.clone() {
            let mut host_weight = 0u32;
            if let Some(host) = self.host_map.get(&host_id) {
                for addr_id in &host.addresses {
                    if let Some(addr) = self.addr_map.get(addr_id) {
                        if !addr.disabled {
                            host_weight += addr.weight;
                        }
                    }
                }
            }
            if let Some(host) = self.host_map.get_mut(&host_id) {
                host.weight = host_weight;
            }
            total += host_weight;
        }
        self.total_weight = total;
    }

    /// (total, available) weight over non-disabled addresses.
    pub fn weights(&self) -> (u32, u32) {
        let mut total = 0u32;
        let mut available = 0u32;
        for addr in self.addr_map.values() {
            if addr.disabled {
                continue;
            }
            total += addr.weight;
            if addr.available {
                available += addr.weight;
            }
        }
        (total, available)
    }

    pub fn refresh_health(&mut self, events: &mut Vec<BalancerEvent>) {
        let (total, available) = self.weights();
        let healthy = total > 0
            && (self.health_threshold <= 0.0
                || (available as f64) * 100.0 / (total as f64) >= self.health_threshold);
        if healthy != self.healthy {
            info!(prefix = %self.log_prefix, healthy, total, available, "balancer health changed");
            self.healthy = healthy;
            events.push(BalancerEvent::Health { healthy });
        }
    }

    /// Apply one DNS resolution outcome to a host: diff the sorted answer
    /// against the current addresses, adding, reweighting and disabling
    /// as needed. Disabled addresses are reported in the delta and
    /// deleted by the caller after the redistribution hook.
    pub fn apply_dns_answer(
        &mut self,
        host_id: HostId,
        result: Result<Arc<AnswerSet>, DiscoveryError>,
        ttl0_secs: u64,
        requery_secs: u64,
        events: &mut Vec<BalancerEvent>,
    ) -> DnsDelta {
        let mut delta = DnsDelta::default();
        if !self.host_map.contains_key(&host_id) {
            return delta;
        }

        match result {
            Err(e) => {
                self.apply_dns_failure(host_id, e, requery_secs, &mut delta);
            }
            Ok(set) => {
                self.apply_dns_success(host_id, set, ttl0_secs, &mut delta, events);
            }
        }
        self.recompute_weights();
        delta
    }

    fn apply_dns_failure(
        &mut self,
        host_id: HostId,
        error: DiscoveryError,
        requery_secs: u64,
        delta: &mut DnsDelta,
    ) {
        let host = self.host_map.get(&host_id).expect("checked by caller");
        let hostname = host.hostname.clone();
        let qtype = host.last_type.unwrap_or(RecordType::A);
        let addrs = host.addresses.clone();
        warn!(
            prefix = %self.log_prefix,
            hostname = %hostname, error = %error, "DNS resolution failed, disabling addresses"
        );

        for addr_id in addrs {
            let disabled = self
                .addr_map
                .get(&addr_id)
                .map(|a| a.disabled)
                .unwrap_or(true);
            if !disabled {
                self.disable_address(addr_id);
                delta.to_delete.push(addr_id);
                delta.changed = true;
            }
        }

        let mut marker = AnswerSet::error(&hostname, qtype, 100, error.to_string());
        marker.error_query = true;
        marker.expire = clock::now() + requery_secs as f64;
        let host = self.host_map.get_mut(&host_id).expect("checked by caller");
        host.last_query = Some(Arc::new(marker));
        host.last_entries.clear();
        host.ttl0_seen = false;
        host.ttl0_mode = false;
        delta.failed = true;
    }

    fn apply_dns_success(
        &mut self,
        host_id: HostId,
        set: Arc<AnswerSet>,
        ttl0_secs: u64,
        delta: &mut DnsDelta,
        events: &mut Vec<BalancerEvent>,
    ) {
        // ttl=0 answers switch the host to a synthetic SRV wrapper that
        // resolves per request, but only after two consecutive sightings.
        let answer = {
            let host = self.host_map.get_mut(&host_id).expect("checked by caller");
            let first_ttl = set.records.first().map(|r| r.ttl).unwrap_or(0);
            if first_ttl == 0 && !set.ttl0 {
                if host.ttl0_seen || host.ttl0_mode {
                    if !host.ttl0_mode {
                        info!(
                            prefix = %self.log_prefix,
                            hostname = %host.hostname,
                            "ttl=0 confirmed twice, switching to per-request resolution"
                        );
                    }
                    host.ttl0_mode = true;
                    let mut synth = AnswerSet::positive(
                        host.hostname.clone(),
                        RecordType::SRV,
                        vec![Record::srv(
                            host.hostname.clone(),
                            host.hostname.clone(),
                            host.port,
                            host.node_weight.min(u16::MAX as u32) as u16,
                            1,
                            ttl0_secs as u32,
                        )],
                    );
                    synth.ttl0 = true;
                    synth.expire = clock::now() + ttl0_secs as f64;
                    Arc::new(synth)
                } else {
                    host.ttl0_seen = true;
                    set
                }
            } else {
                host.ttl0_seen = false;
                host.ttl0_mode = false;
                set
            }
        };

        let host = self.host_map.get(&host_id).expect("checked by caller");
        let host_port = host.port;
        let node_weight = host.node_weight;
        let rtype = answer
            .records
            .first()
            .map(|r| r.rtype())
            .unwrap_or(RecordType::A);

        let entries = answer_entries(&answer, rtype);
        let new_list: Vec<(String, u32)> = entries
            .iter()
            .map(|(key, rec)| (key.clone(), entry_weight(rec, node_weight)))
            .collect();

        let type_changed = host.last_type.is_some() && host.last_type != Some(rtype);
        if !type_changed && new_list == host.last_entries {
            let host = self.host_map.get_mut(&host_id).expect("checked by caller");
            host.last_query = Some(answer);
            host.last_type = Some(rtype);
            return;
        }

        // plan first, then mutate: a record-type change drops everything,
        // otherwise diff by sort key
        enum Action {
            Add {
                key: String,
                target: PeerTarget,
                port: u16,
                weight: u32,
            },
            Reweight(AddrId, u32),
            Disable(AddrId),
        }
        let mut actions: Vec<Action> = Vec::new();

        let mut current: FxHashMap<String, AddrId> = FxHashMap::default();
        for addr_id in &host.addresses {
            if let Some(addr) = self.addr_map.get(addr_id) {
                if !addr.disabled {
                    current.insert(addr.key.clone(), addr.id);
                }
            }
        }

        if type_changed {
            debug!(
                prefix = %self.log_prefix,
                hostname = %host.hostname,
                old = ?host.last_type, new = ?rtype, "record type changed, replacing all addresses"
            );
            for (_, addr_id) in current.drain() {
                actions.push(Action::Disable(addr_id));
            }
        }

        for (key, rec) in &entries {
            match current.remove(key) {
                Some(addr_id) => {
                    let weight = entry_weight(rec, node_weight);
                    let current_weight = self
                        .addr_map
                        .get(&addr_id)
                        .map(|a| a.weight)
                        .unwrap_or(weight);
                    if current_weight != weight {
                        actions.push(Action::Reweight(addr_id, weight));
                    }
                }
                None => {
                    let (target, port) = entry_target(rec, host_port);
                    actions.push(Action::Add {
                        key: key.clone(),
                        target,
                        port,
                        weight: entry_weight(rec, node_weight),
                    });
                }
            }
        }
        for (_, addr_id) in current {
            actions.push(Action::Disable(addr_id));
        }

        for action in actions {
            delta.changed = true;
            match action {
                Action::Add {
                    key,
                    target,
                    port,
                    weight,
                } => {
                    self.add_address(host_id, key, target, port, weight, events);
                }
                Action::Reweight(addr_id, weight) => {
                    if let Some(addr) = self.addr_map.get_mut(&addr_id) {
                        debug!(
                            prefix = %self.log_prefix,
                            target = %addr.target, old = addr.weight, new = weight, "address weight updated"
                        );
                        addr.weight = weight;
                    }
                }
                Action::Disable(addr_id) => {
                    self.disable_address(addr_id);
                    delta.to_delete.push(addr_id);
                }
            }
        }

        let host = self.host_map.get_mut(&host_id).expect("checked by caller");
        host.last_query = Some(answer);
        host.last_entries = new_list;
        host.last_type = Some(rtype);
    }

    /// Re-apply node_weight to addresses whose weight derives from it
    /// (everything except real SRV answers, which carry their own).
    pub fn apply_node_weight(&mut self, host_id: HostId) {
        let Some(host) = self.host_map.get(&host_id) else {
            return;
        };
        if host.last_type == Some(RecordType::SRV) && !host.ttl0_mode {
            return;
        }
        let node_weight = host.node_weight;
        for addr_id in host.addresses.clone() {
            if let Some(addr) = self.addr_map.get_mut(&addr_id) {
                if !addr.disabled {
                    addr.weight = node_weight;
                }
            }
        }
        self.recompute_weights();
    }

    pub fn status(&self) -> BalancerStatus {
        let (total, available) = self.weights();
        let hosts = self
            .hosts
            .iter()
            .filter_map(|id| self.host_map.get(id))
            .map(|host| HostStatus {
                hostname: host.hostname.clone(),
                port: host.port,
                node_weight: host.node_weight,
                weight: host.weight,
                dns_failed: host
                    .last_query
                    .as_ref()
                    .map(|q| q.error_query)
                    .unwrap_or(false),
                addresses: host
                    .addresses
                    .iter()
                    .filter_map(|id| self.addr_map.get(id))
                    .filter(|a| !a.disabled)
                    .map(|a| AddressStatus {
                        ip: a.target.to_string(),
                        port: a.port,
                        weight: a.weight,
                        available: a.available,
                    })
                    .collect(),
            })
            .collect();
        BalancerStatus {
            healthy: self.healthy,
            weight: WeightStatus {
                total,
                available,
                unavailable: total - available,
            },
            hosts,
        }
    }
}

/// The sort key the DNS diff compares on. SRV keys order by priority and
/// omit the weight.
fn sort_key(record: &Record) -> String {
    match &record.data {
        RData::A(ip) => ip.to_string(),
        RData::Aaaa(ip) => ip.to_string(),
        RData::Srv(srv) => format!("{:06}:{}:{}", srv.priority, srv.target, srv.port),
        RData::Cname(target) => target.clone(),
        RData::Txt(_) => record.name.clone(),
    }
}

/// The entries a host materializes as addresses: the whole set for
/// A/AAAA, only the top-priority band for SRV. Sorted by key, duplicate
/// keys collapsed.
fn answer_entries(set: &AnswerSet, rtype: RecordType) -> SmallVec<[(String, Record); 4]> {
    let mut records: SmallVec<[&Record; 4]> = set.records.iter().collect();
    if rtype == RecordType::SRV {
        let min_prio = records
            .iter()
            .filter_map(|r| match &r.data {
                RData::Srv(s) => Some(s.priority),
                _ => None,
            })
            .min()
            .unwrap_or(0);
        records.retain(|r| matches!(&r.data, RData::Srv(s) if s.priority == min_prio));
    }
    let mut entries: SmallVec<[(String, Record); 4]> = SmallVec::with_capacity(records.len());
    for record in records {
        let key = sort_key(record);
        if !entries.iter().any(|(k, _)| k == &key) {
            entries.push((key, record.clone()));
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// SRV weights are the record's own (0 promoted to 1); anything else
/// uses the host's node_weight.
fn entry_weight(record: &Record, node_weight: u32) -> u32 {
    match &record.data {
        RData::Srv(srv) => srv.weight.max(1) as u32,
        _ => node_weight,
    }
}

fn entry_target(record: &Record, host_port: u16) -> (PeerTarget, u16) {
    match &record.data {
        RData::A(ip) => (PeerTarget::Ip(IpAddr::V4(*ip)), host_port),
        RData::Aaaa(ip) => (PeerTarget::Ip(IpAddr::V6(*ip)), host_port),
        RData::Srv(srv) => {
            let port = if srv.port == 0 { host_port } else { srv.port };
            match srv.target.parse::<IpAddr>() {
                Ok(ip) => (PeerTarget::Ip(ip), port),
                Err(_) => (PeerTarget::Name(srv.target.clone()), port),
            }
        }
        RData::Cname(target) => (PeerTarget::Name(target.clone()), host_port),
        RData::Txt(_) => (PeerTarget::Name(record.name.clone()), host_port),
    }
}

#[derive(Debug, Clone)]
pub struct BalancerStatus {
    pub healthy: bool,
    pub weight: WeightStatus,
    pub hosts: Vec<HostStatus>,
}

#[derive(Debug, Clone)]
pub struct WeightStatus {
    pub total: u32,
    pub available: u32,
    pub unavailable: u32,
}

#[derive(Debug, Clone)]
pub struct HostStatus {
    pub hostname: String,
    pub port: u16,
    pub node_weight: u32,
    pub weight: u32,
    pub dns_failed: bool,
    pub addresses: Vec<AddressStatus>,
}

#[derive(Debug, Clone)]
pub struct AddressStatus {
    pub ip: String,
    pub port: u16,
    pub weight: u32,
    pub available: bool,
}
