//! End-to-end scenarios across the resolver and balancer: the flows an
//! embedding gateway exercises when it picks upstream targets.

use rudder_balancer::{BalancerEvent, RingBalancer};
use rudder_domain::{
    BalancerConfig, ConfigSource, OrderType, Record, RecordType, ResolverConfig,
};
use rudder_resolver::{MockTransport, Resolver};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn resolver_with(mock: Arc<MockTransport>) -> Arc<Resolver> {
    let config = ResolverConfig {
        hosts: ConfigSource::literal::<&str>([]),
        resolv_conf: ConfigSource::literal(["nameserver 127.0.0.1"]),
        order: vec![
            OrderType::LastSuccess,
            OrderType::Query(RecordType::SRV),
            OrderType::Query(RecordType::A),
            OrderType::Query(RecordType::AAAA),
        ],
        search: Some(vec![]),
        ..ResolverConfig::default()
    };
    Resolver::with_transport(config, mock).unwrap()
}

fn seed_backends(mock: &MockTransport) {
    mock.answer(
        "web.example",
        RecordType::A,
        vec![
            Record::a("web.example", Ipv4Addr::new(10, 1, 0, 1), 300),
            Record::a("web.example", Ipv4Addr::new(10, 1, 0, 2), 300),
        ],
    );
    mock.answer(
        "api.example",
        RecordType::SRV,
        vec![
            Record::srv("api.example", "10.2.0.1", 9000, 5, 1, 300),
            Record::srv("api.example", "10.2.0.2", 9000, 5, 1, 300),
        ],
    );
    mock.answer(
        "cache.example",
        RecordType::A,
        vec![Record::a("cache.example", Ipv4Addr::new(10, 3, 0, 1), 300)],
    );
}

async fn build_gateway_balancer(mock: Arc<MockTransport>) -> RingBalancer {
    let balancer = RingBalancer::new(
        resolver_with(mock),
        BalancerConfig {
            wheel_size: 120,
            ..BalancerConfig::default()
        },
    )
    .unwrap();
    balancer.add_host("web.example", 80, 10).await.unwrap();
    balancer.add_host("api.example", 80, 10).await.unwrap();
    balancer.add_host("cache.example", 6379, 20).await.unwrap();
    balancer
}

#[tokio::test]
async fn test_gateway_selection_spread() {
    let mock = Arc::new(MockTransport::new());
    seed_backends(&mock);
    let balancer = build_gateway_balancer(mock).await;

    let mut seen: HashMap<(IpAddr, u16), usize> = HashMap::new();
    for _ in 0..120 {
        let peer = balancer.get_peer(false, None, None).await.unwrap();
        *seen.entry((peer.ip, peer.port)).or_default() += 1;
        peer.handle.release();
    }

    // weights: web 10+10, api 5+5, cache 20 -> slots 24/24/12/12/48
    assert_eq!(seen.len(), 5, "every endpoint serves traffic");
    assert_eq!(
        seen.get(&(IpAddr::V4(Ipv4Addr::new(10, 3, 0, 1)), 6379)),
        Some(&48),
        "a full wheel sweep matches slot shares exactly"
    );
    assert_eq!(
        seen.get(&(IpAddr::V4(Ipv4Addr::new(10, 2, 0, 1)), 9000)),
        Some(&12)
    );
}

#[tokio::test]
async fn test_two_instances_converge_identically() {
    let build = || async {
        let mock = Arc::new(MockTransport::new());
        seed_backends(&mock);
        let balancer = build_gateway_balancer(mock).await;
        // identical churn on both instances
        balancer.remove_host("api.example", 80);
        balancer.add_host("api.example", 80, 10).await.unwrap();
        balancer.add_host("web.example", 80, 15).await.unwrap();
        balancer
    };

    let one = build().await;
    let two = build().await;
    assert_eq!(one.wheel_endpoints(), two.wheel_endpoints());

    // and the same hash picks the same endpoint on both
    for key in ["alpha", "bravo", "charlie"] {
        let hash = rudder_balancer::hash_md5(key);
        let p1 = one.get_peer(false, None, Some(hash)).await.unwrap();
        let p2 = two.get_peer(false, None, Some(hash)).await.unwrap();
        assert_eq!(p1.ip, p2.ip);
        assert_eq!(p1.port, p2.port);
        p1.handle.release();
        p2.handle.release();
    }
}

#[tokio::test]
async fn test_membership_events_drive_connection_pools() {
    let mock = Arc::new(MockTransport::new());
    seed_backends(&mock);

    let added = Arc::new(Mutex::new(Vec::new()));
    let removed = Arc::new(Mutex::new(Vec::new()));
    let added_sink = Arc::clone(&added);
    let removed_sink = Arc::clone(&removed);

    let balancer = RingBalancer::new(
        resolver_with(Arc::clone(&mock)),
        BalancerConfig {
            wheel_size: 60,
            ..BalancerConfig::default()
        },
    )
    .unwrap();
    balancer.set_callback(Arc::new(move |event| match event {
        BalancerEvent::Added { target, port, .. } => {
            added_sink.lock().unwrap().push(format!("{}:{}", target, port));
        }
        BalancerEvent::Removed { target, port, .. } => {
            removed_sink
                .lock()
                .unwrap()
                .push(format!("{}:{}", target, port));
        }
        BalancerEvent::Health { .. } => {}
    }));

    balancer.add_host("web.example", 80, 10).await.unwrap();
    assert_eq!(
        *added.lock().unwrap(),
        vec!["10.1.0.1:80".to_string(), "10.1.0.2:80".to_string()]
    );

    balancer.remove_host("web.example", 80);
    let removed = removed.lock().unwrap();
    assert_eq!(removed.len(), 2);
    assert!(removed.contains(&"10.1.0.1:80".to_string()));
    assert!(removed.contains(&"10.1.0.2:80".to_string()));
}

#[tokio::test]
async fn test_handle_leak_accounting() {
    let mock = Arc::new(MockTransport::new());
    seed_backends(&mock);
    let balancer = build_gateway_balancer(Arc::clone(&mock)).await;

    let leaks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&leaks);
    let handle = balancer.get_handle(Some(Box::new(move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    })));

    let peer = balancer.get_peer(false, Some(handle), None).await.unwrap();
    drop(peer.handle);
    assert_eq!(
        leaks.load(Ordering::Relaxed),
        1,
        "dropping a peer handle without release fires the gc hook"
    );

    let handle = balancer.get_handle(None);
    let peer = balancer.get_peer(false, Some(handle), None).await.unwrap();
    peer.handle.release();
    assert_eq!(leaks.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_resolver_coalescing_under_balancer_load() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "web.example",
        RecordType::A,
        vec![Record::a("web.example", Ipv4Addr::new(10, 1, 0, 1), 300)],
    );
    mock.set_delay(Duration::from_millis(50));
    let resolver = resolver_with(Arc::clone(&mock));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let r = Arc::clone(&resolver);
        handles.push(tokio::spawn(async move {
            r.resolve_type("web.example", RecordType::A, false).await
        }));
    }
    for h in handles {
        assert!(h.await.unwrap().is_ok());
    }
    assert_eq!(
        mock.query_count(),
        1,
        "concurrent lookups of one name share a single wire query"
    );
}
