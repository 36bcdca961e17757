//! Consistent-hashing ring balancer. A fixed wheel of slots is divided
//! over the addresses proportionally to weight, with a LIFO unassigned
//! stack and a remaining-share recurrence that keep slot assignment
//! deterministic and minimally disruptive across membership changes.

use crate::base::{AddrId, BalancerStatus, BaseState, HostId, PeerTarget};
use crate::events::{BalancerCallback, BalancerEvent};
use crate::handle::{GcHook, Handle, HandlePool};
use rudder_domain::{BalancerConfig, DiscoveryError};
use rudder_resolver::{clock, Resolver};
use rustc_hash::FxHashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fixed shuffle seed: identical wheel sizes produce identical slot
/// orders on every instance, which cluster determinism depends on.
const WHEEL_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

const DEFAULT_HANDLE_POOL: usize = 1024;

/// 32-bit hash for consistent hashing: MD5, first four bytes folded into
/// the next four.
pub fn hash_md5(input: &str) -> u32 {
    let digest = md5::compute(input.as_bytes());
    let a = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let b = u32::from_be_bytes([digest[4], digest[5], digest[6], digest[7]]);
    a ^ b
}

pub fn hash_crc32(input: &str) -> u32 {
    crc32fast::hash(input.as_bytes())
}

pub(crate) struct RingState {
    pub wheel_size: usize,
    wheel: Vec<Option<AddrId>>,
    /// LIFO stack of free slots.
    unassigned: Vec<usize>,
    indices: FxHashMap<AddrId, Vec<usize>>,
    /// Round-robin position for hashless get_peer.
    pub pointer: usize,
}

impl RingState {
    pub fn new(wheel_size: usize, order: Option<Vec<usize>>) -> Result<Self, DiscoveryError> {
        if wheel_size == 0 {
            return Err(DiscoveryError::InvalidWheelOrder(
                "wheel size must be positive".into(),
            ));
        }
        let order = match order {
            Some(order) => {
                if order.len() != wheel_size {
                    return Err(DiscoveryError::InvalidWheelOrder(format!(
                        "expected {} entries, got {}",
                        wheel_size,
                        order.len()
                    )));
                }
                let mut seen = vec![false; wheel_size];
                for &slot in &order {
                    if slot >= wheel_size || seen[slot] {
                        return Err(DiscoveryError::InvalidWheelOrder(format!(
                            "index {} duplicate or out of range",
                            slot
                        )));
                    }
                    seen[slot] = true;
                }
                order
            }
            None => {
                let mut rng = fastrand::Rng::with_seed(WHEEL_SEED);
                let mut order: Vec<usize> = (0..wheel_size).collect();
                rng.shuffle(&mut order);
                order
            }
        };
        // the stack pops from the back, so reverse to assign in `order`
        let unassigned: Vec<usize> = order.into_iter().rev().collect();
        Ok(Self {
            wheel_size,
            wheel: vec![None; wheel_size],
            unassigned,
            indices: FxHashMap::default(),
            pointer: 0,
        })
    }

    /// Reassign wheel slots to match the current weights. Walking the
    /// addresses in insertion order, each target share is
    /// `floor(remaining_slots * weight / remaining_weight + 0.0001)`,
    /// which sums exactly to the wheel size. Excess slots are released
    /// LIFO from each owner's tail before any deficit is filled, so
    /// untouched shares never move and an equal-weight replacement picks
    /// up exactly the vacated slots.
    pub fn redistribute(&mut self, base: &BaseState) {
        let mut remaining_slots = self.wheel_size;
        let mut remaining_weight: u64 = base
            .addr_order
            .iter()
            .filter_map(|id| base.addr_map.get(id))
            .map(|a| a.weight as u64)
            .sum();

        let mut targets: Vec<(AddrId, usize)> = Vec::with_capacity(base.addr_order.len());
        for addr_id in &base.addr_order {
            let weight = base
                .addr_map
                .get(addr_id)
                .map(|a| a.weight as u64)
                .unwrap_or(0);
            let count = if remaining_weight == 0 {
                0
            } else {
                ((remaining_slots as f64) * (weight as f64) / (remaining_weight as f64) + 0.0001)
                    as usize
            };
            targets.push((*addr_id, count));
            remaining_slots -= count;
            remaining_weight -= weight;
        }

        for (addr_id, count) in &targets {
            let list = self.indices.entry(*addr_id).or_default();
            while list.len() > *count {
                let slot = list.pop().expect("length checked");
                self.wheel[slot] = None;
                self.unassigned.push(slot);
            }
        }
        for (addr_id, count) in &targets {
            let list = self.indices.entry(*addr_id).or_default();
            while list.len() < *count {
                let slot = self
                    .unassigned
                    .pop()
                    .expect("target counts sum to the wheel size");
                self.wheel[slot] = Some(*addr_id);
                list.push(slot);
            }
        }
        self.indices
            .retain(|addr_id, list| !list.is_empty() || base.addr_map.contains_key(addr_id));
    }

    pub fn after_host_update(&mut self, base: &BaseState) {
        self.redistribute(base);
    }

    pub fn before_host_delete(&mut self, base: &BaseState) {
        self.redistribute(base);
    }

    /// Release a deleted address's slots, LIFO.
    pub fn on_remove_address(&mut self, addr_id: AddrId) {
        if let Some(mut list) = self.indices.remove(&addr_id) {
            while let Some(slot) = list.pop() {
                self.wheel[slot] = None;
                self.unassigned.push(slot);
            }
        }
    }

    pub fn wheel(&self) -> &[Option<AddrId>] {
        &self.wheel
    }

    #[cfg(test)]
    fn integrity_ok(&self) -> bool {
        let mut owners = vec![0usize; self.wheel_size];
        for slot in &self.unassigned {
            owners[*slot] += 1;
        }
        for (addr_id, list) in &self.indices {
            for slot in list {
                if self.wheel[*slot] != Some(*addr_id) {
                    return false;
                }
                owners[*slot] += 1;
            }
        }
        owners.iter().all(|&n| n == 1)
    }
}

struct Inner {
    base: BaseState,
    ring: RingState,
}

struct Shared {
    inner: Mutex<Inner>,
    resolver: Arc<Resolver>,
    callback: Mutex<Option<BalancerCallback>>,
    pool: Arc<HandlePool>,
    requery_secs: u64,
    ttl0_secs: u64,
    requery_running: AtomicBool,
}

/// One selected peer: the endpoint to contact plus the handle to pass
/// back for retries or release.
#[derive(Debug)]
pub struct Peer {
    pub ip: IpAddr,
    pub port: u16,
    pub hostname: String,
    pub handle: Handle,
}

pub struct RingBalancer {
    shared: Arc<Shared>,
}

impl RingBalancer {
    pub fn new(resolver: Arc<Resolver>, config: BalancerConfig) -> Result<Self, DiscoveryError> {
        let ring = RingState::new(config.wheel_size, config.order.clone())?;
        info!(
            prefix = %config.log_prefix,
            wheel_size = config.wheel_size,
            requery = config.requery,
            "ring balancer created"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    base: BaseState::new(config.log_prefix, config.health_threshold),
                    ring,
                }),
                resolver,
                callback: Mutex::new(None),
                pool: HandlePool::new(DEFAULT_HANDLE_POOL),
                requery_secs: config.requery.max(1),
                ttl0_secs: config.ttl0.max(1),
                requery_running: AtomicBool::new(false),
            }),
        })
    }

    /// Build a balancer and register the configured initial host set.
    pub async fn with_hosts(
        resolver: Arc<Resolver>,
        config: BalancerConfig,
    ) -> Result<Self, DiscoveryError> {
        let hosts = config.hosts.clone();
        let balancer = Self::new(resolver, config)?;
        for host in hosts {
            balancer
                .add_host(&host.hostname, host.port, host.weight)
                .await?;
        }
        Ok(balancer)
    }

    pub fn set_callback(&self, callback: BalancerCallback) {
        *self.shared.callback.lock().unwrap() = Some(callback);
    }

    /// A fresh or pooled handle with an optional GC hook that fires if
    /// the handle is dropped without being released.
    pub fn get_handle(&self, gc_hook: Option<GcHook>) -> Handle {
        self.shared.pool.get(gc_hook)
    }

    pub fn set_handle_cache_size(&self, size: usize) {
        self.shared.pool.set_cache_size(size);
    }

    /// Add an upstream, or update its node weight when the (hostname,
    /// port) pair already exists. A failing DNS resolution still inserts
    /// the host, at weight 0, and arms the requery timer.
    pub async fn add_host(
        &self,
        hostname: &str,
        port: u16,
        node_weight: u32,
    ) -> Result<(), DiscoveryError> {
        let hostname = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
        if hostname.is_empty() {
            return Err(DiscoveryError::InvalidName(hostname));
        }

        let mut events = Vec::new();
        let new_host = {
            let mut inner = self.shared.inner.lock().unwrap();
            match inner.base.find_host(&hostname, port) {
                Some(host_id) => {
                    if let Some(host) = inner.base.host_map.get_mut(&host_id) {
                        host.node_weight = node_weight;
                    }
                    inner.base.apply_node_weight(host_id);
                    let Inner { base, ring } = &mut *inner;
                    ring.redistribute(base);
                    base.refresh_health(&mut events);
                    None
                }
                None => Some(inner.base.add_host_entry(&hostname, port, node_weight)),
            }
        };
        self.fire(&events);

        if let Some(host_id) = new_host {
            let failed = refresh_host(&self.shared, host_id).await;
            if failed {
                self.ensure_requery_timer();
            }
        }
        Ok(())
    }

    /// Remove an upstream and all its addresses. Unknown pairs are a
    /// no-op.
    pub fn remove_host(&self, hostname: &str, port: u16) {
        let hostname = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
        let mut events = Vec::new();
        {
            let mut inner = self.shared.inner.lock().unwrap();
            let Inner { base, ring } = &mut *inner;
            let Some(host_id) = base.find_host(&hostname, port) else {
                return;
            };
            let addrs = base
                .host_map
                .get(&host_id)
                .map(|h| h.addresses.clone())
                .unwrap_or_default();
            for addr_id in &addrs {
                base.disable_address(*addr_id);
            }
            base.recompute_weights();
            ring.before_host_delete(base);
            for addr_id in addrs {
                ring.on_remove_address(addr_id);
                base.delete_address(addr_id, &mut events);
            }
            base.delete_host(host_id);
            base.refresh_health(&mut events);
        }
        self.fire(&events);
    }

    /// Select a peer. Without a hash the wheel pointer round-robins;
    /// with one, the slot is `(hash + retry_count) % wheel_size` so
    /// retries walk away from the failing peer deterministically. Pass
    /// the previous handle to mark a retry of the same request.
    pub async fn get_peer(
        &self,
        cache_only: bool,
        handle: Option<Handle>,
        hash_value: Option<u32>,
    ) -> Result<Peer, DiscoveryError> {
        let mut handle = match handle {
            Some(mut handle) => {
                let data = handle.data_mut();
                data.retry_count = data.retry_count.saturating_add(1);
                if let Some(hash) = hash_value {
                    data.hash_value = Some(hash);
                }
                handle
            }
            None => {
                let mut handle = self.shared.pool.get(None);
                handle.data_mut().hash_value = hash_value;
                handle
            }
        };
        let (hash, retry) = {
            let data = handle.data();
            (data.hash_value, data.retry_count)
        };

        enum Step {
            Ready {
                addr_id: AddrId,
                ip: IpAddr,
                port: u16,
                hostname: String,
            },
            Refresh(HostId),
            Resolve {
                addr_id: AddrId,
                name: String,
                port: u16,
                hostname: String,
            },
            Unhealthy,
            NoPeers,
        }

        let mut idx: Option<usize> = None;
        let mut tried: usize = 0;
        let mut spins: usize = 0;
        loop {
            spins += 1;
            let step = {
                let mut inner = self.shared.inner.lock().unwrap();
                let Inner { base, ring } = &mut *inner;
                if base.total_weight == 0 {
                    Step::Unhealthy
                } else {
                    if spins > ring.wheel_size * 2 + 16 {
                        handle.release();
                        return Err(DiscoveryError::IndexReassigned);
                    }
                    let wheel_size = ring.wheel_size;
                    let mut i = match idx {
                        Some(i) => i,
                        None => match hash {
                            Some(h) => ((h as u64 + retry as u64) % wheel_size as u64) as usize,
                            None => {
                                let p = ring.pointer;
                                ring.pointer = (p + 1) % wheel_size;
                                p
                            }
                        },
                    };
                    let mut step = Step::NoPeers;
                    while tried < wheel_size {
                        // a slot either yields a step, or a sentinel:
                        // AddressUnavailable and DnsUpdated both mean
                        // "advance and try the next slot"
                        let slot: Result<Step, DiscoveryError> =
                            match ring.wheel[i].and_then(|id| base.addr_map.get(&id)) {
                                None => Err(DiscoveryError::DnsUpdated),
                                Some(addr) if addr.disabled || !addr.available => {
                                    Err(DiscoveryError::AddressUnavailable)
                                }
                                Some(addr) => match base.host_map.get(&addr.host) {
                                    None => Err(DiscoveryError::DnsUpdated),
                                    Some(host) => {
                                        let expired = host
                                            .last_query
                                            .as_ref()
                                            .map(|q| q.expire < clock::now())
                                            .unwrap_or(true);
                                        if expired && !cache_only {
                                            Ok(Step::Refresh(host.id))
                                        } else {
                                            Ok(match &addr.target {
                                                PeerTarget::Ip(ip) => Step::Ready {
                                                    addr_id: addr.id,
                                                    ip: *ip,
                                                    port: addr.port,
                                                    hostname: host.hostname.clone(),
                                                },
                                                PeerTarget::Name(name) => Step::Resolve {
                                                    addr_id: addr.id,
                                                    name: name.clone(),
                                                    port: addr.port,
                                                    hostname: host.hostname.clone(),
                                                },
                                            })
                                        }
                                    }
                                },
                            };
                        match slot {
                            Ok(found) => {
                                step = found;
                                break;
                            }
                            Err(
                                DiscoveryError::AddressUnavailable | DiscoveryError::DnsUpdated,
                            ) => {
                                i = (i + 1) % wheel_size;
                                tried += 1;
                            }
                            Err(other) => {
                                handle.release();
                                return Err(other);
                            }
                        }
                    }
                    idx = Some(i);
                    step
                }
            };

            match step {
                Step::Unhealthy => {
                    handle.release();
                    return Err(DiscoveryError::BalancerUnhealthy);
                }
                Step::NoPeers => {
                    handle.release();
                    return Err(DiscoveryError::NoPeersAvailable);
                }
                Step::Ready {
                    addr_id,
                    ip,
                    port,
                    hostname,
                } => {
                    handle.data_mut().address_id = Some(addr_id);
                    return Ok(Peer {
                        ip,
                        port,
                        hostname,
                        handle,
                    });
                }
                Step::Refresh(host_id) => {
                    let failed = refresh_host(&self.shared, host_id).await;
                    if failed {
                        self.ensure_requery_timer();
                    }
                    // loop re-reads the same slot: the refresh may have
                    // reassigned it
                }
                Step::Resolve {
                    addr_id,
                    name,
                    port,
                    hostname,
                } => {
                    match self.shared.resolver.to_ip(&name, port, cache_only).await {
                        Ok((ip, resolved_port)) => {
                            let still_there = {
                                let inner = self.shared.inner.lock().unwrap();
                                inner
                                    .base
                                    .addr_map
                                    .get(&addr_id)
                                    .map(|a| !a.disabled && a.available)
                                    .unwrap_or(false)
                            };
                            if still_there {
                                handle.data_mut().address_id = Some(addr_id);
                                return Ok(Peer {
                                    ip,
                                    port: resolved_port,
                                    hostname,
                                    handle,
                                });
                            }
                            debug!(name = %name, "address vanished during resolution, re-reading wheel");
                        }
                        Err(e) => {
                            handle.release();
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Toggle an address's availability by (ip, port, hostname). When the
    /// hostname only maps to name-typed addresses (SRV indirection), the
    /// lookup fails with the nested names listed; calling this with a
    /// name instead of an IP warns and is a no-op.
    pub fn set_peer_status(
        &self,
        available: bool,
        ip: &str,
        port: u16,
        hostname: Option<&str>,
    ) -> Result<(), DiscoveryError> {
        let Ok(parsed) = ip.parse::<IpAddr>() else {
            warn!(
                ip,
                "set_peer_status by name is not supported through SRV indirection"
            );
            return Ok(());
        };

        let mut events = Vec::new();
        let result = {
            let mut inner = self.shared.inner.lock().unwrap();
            let base = &mut inner.base;
            let mut nested: Vec<String> = Vec::new();
            let mut found: Option<AddrId> = None;
            for addr_id in &base.addr_order {
                let Some(addr) = base.addr_map.get(addr_id) else {
                    continue;
                };
                if addr.disabled {
                    continue;
                }
                if let Some(wanted) = hostname {
                    let matches = base
                        .host_map
                        .get(&addr.host)
                        .map(|h| h.hostname == wanted)
                        .unwrap_or(false);
                    if !matches {
                        continue;
                    }
                }
                match &addr.target {
                    PeerTarget::Ip(a) if *a == parsed && addr.port == port => {
                        found = Some(*addr_id);
                        break;
                    }
                    PeerTarget::Name(name) => nested.push(name.clone()),
                    _ => {}
                }
            }
            match found {
                Some(addr_id) => {
                    if let Some(addr) = base.addr_map.get_mut(&addr_id) {
                        addr.available = available;
                    }
                    base.refresh_health(&mut events);
                    Ok(())
                }
                None => Err(DiscoveryError::peer_not_found(hostname, ip, port, &nested)),
            }
        };
        self.fire(&events);
        result
    }

    /// O(1) variant using the handle returned from `get_peer`.
    pub fn set_peer_status_by_handle(
        &self,
        available: bool,
        handle: &Handle,
    ) -> Result<(), DiscoveryError> {
        let Some(addr_id) = handle.data().address_id else {
            return Err(DiscoveryError::PeerNotFound(
                "handle is not bound to an address".into(),
            ));
        };
        let mut events = Vec::new();
        let result = {
            let mut inner = self.shared.inner.lock().unwrap();
            match inner.base.addr_map.get_mut(&addr_id) {
                Some(addr) if !addr.disabled => {
                    addr.available = available;
                    inner.base.refresh_health(&mut events);
                    Ok(())
                }
                _ => Err(DiscoveryError::DnsUpdated),
            }
        };
        self.fire(&events);
        result
    }

    pub fn is_healthy(&self) -> bool {
        let inner = self.shared.inner.lock().unwrap();
        let (total, available) = inner.base.weights();
        total > 0
            && (inner.base.health_threshold <= 0.0
                || (available as f64) * 100.0 / (total as f64) >= inner.base.health_threshold)
    }

    pub fn get_status(&self) -> BalancerStatus {
        self.shared.inner.lock().unwrap().base.status()
    }

    /// Snapshot of the wheel as (endpoint, port) per slot, for
    /// introspection and determinism checks.
    pub fn wheel_endpoints(&self) -> Vec<Option<(String, u16)>> {
        let inner = self.shared.inner.lock().unwrap();
        inner
            .ring
            .wheel()
            .iter()
            .map(|slot| {
                slot.and_then(|addr_id| {
                    inner
                        .base
                        .addr_map
                        .get(&addr_id)
                        .map(|a| (a.target.to_string(), a.port))
                })
            })
            .collect()
    }

    fn fire(&self, events: &[BalancerEvent]) {
        if events.is_empty() {
            return;
        }
        let callback = self.shared.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            for event in events {
                callback(event);
            }
        }
    }

    /// Arm the recurring requery task if it is not already running. The
    /// task holds only a weak reference so dropping the balancer stops
    /// it, and it disarms itself on a tick with nothing to do.
    fn ensure_requery_timer(&self) {
        if self.shared.requery_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak = Arc::downgrade(&self.shared);
        let period = Duration::from_secs(self.shared.requery_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let failed_hosts: Vec<HostId> = {
                    let inner = shared.inner.lock().unwrap();
                    inner
                        .base
                        .hosts
                        .iter()
                        .filter(|id| {
                            inner
                                .base
                                .host_map
                                .get(id)
                                .and_then(|h| h.last_query.as_ref())
                                .map(|q| q.error_query)
                                .unwrap_or(false)
                        })
                        .copied()
                        .collect()
                };
                if failed_hosts.is_empty() {
                    debug!("requery timer idle, cancelling");
                    shared.requery_running.store(false, Ordering::SeqCst);
                    return;
                }
                debug!(hosts = failed_hosts.len(), "requerying failed hosts");
                for host_id in failed_hosts {
                    refresh_host(&shared, host_id).await;
                }
            }
        });
    }
}

/// Resolve a host's DNS and fold the result into the tree. The resolve
/// happens outside the lock; everything after re-validates against the
/// current state. Returns whether the query failed.
async fn refresh_host(shared: &Arc<Shared>, host_id: HostId) -> bool {
    let hostname = {
        let inner = shared.inner.lock().unwrap();
        match inner.base.host_map.get(&host_id) {
            Some(host) => host.hostname.clone(),
            None => return false,
        }
    };

    let result = shared.resolver.resolve(&hostname, false).await;

    let mut events = Vec::new();
    let failed;
    {
        let mut inner = shared.inner.lock().unwrap();
        let Inner { base, ring } = &mut *inner;
        if !base.host_map.contains_key(&host_id) {
            // the host was removed while the query was in flight
            return false;
        }
        let delta = base.apply_dns_answer(
            host_id,
            result,
            shared.ttl0_secs,
            shared.requery_secs,
            &mut events,
        );
        failed = delta.failed;
        if delta.changed {
            ring.after_host_update(base);
            for addr_id in &delta.to_delete {
                ring.on_remove_address(*addr_id);
                base.delete_address(*addr_id, &mut events);
            }
            base.recompute_weights();
        }
        base.refresh_health(&mut events);
    }

    if !events.is_empty() {
        let callback = shared.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            for event in &events {
                callback(event);
            }
        }
    }
    failed
}
