use rudder_domain::{ConfigSource, OrderType, Record, RecordType, ResolverConfig};
use rudder_resolver::{MockTransport, Resolver};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

fn new_resolver(order: &[OrderType], transport: Arc<MockTransport>) -> Arc<Resolver> {
    let config = ResolverConfig {
        hosts: ConfigSource::literal::<&str>([]),
        resolv_conf: ConfigSource::literal(["nameserver 127.0.0.1"]),
        order: order.to_vec(),
        search: Some(vec![]),
        ..ResolverConfig::default()
    };
    Resolver::with_transport(config, transport).unwrap()
}

fn a_order() -> Vec<OrderType> {
    vec![OrderType::Query(RecordType::A)]
}

fn srv_order() -> Vec<OrderType> {
    vec![
        OrderType::Query(RecordType::SRV),
        OrderType::Query(RecordType::A),
    ]
}

#[tokio::test]
async fn test_a_record_round_robin() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "atest.example",
        RecordType::A,
        vec![
            Record::a("atest.example", Ipv4Addr::new(1, 2, 3, 4), 300),
            Record::a("atest.example", Ipv4Addr::new(1, 2, 3, 5), 300),
        ],
    );
    let resolver = new_resolver(&a_order(), mock);

    let mut first_cycle = Vec::new();
    for _ in 0..2 {
        let (ip, port) = resolver.to_ip("atest.example", 80, false).await.unwrap();
        assert_eq!(port, 80);
        first_cycle.push(ip);
    }
    assert_eq!(
        first_cycle,
        vec![
            IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)),
            IpAddr::V4(Ipv4Addr::new(1, 2, 3, 5)),
        ],
        "two calls exhaust the answer set in DNS order"
    );

    // order is stable across wraps
    for _ in 0..3 {
        for expected in &first_cycle {
            let (ip, _) = resolver.to_ip("atest.example", 80, false).await.unwrap();
            assert_eq!(ip, *expected);
        }
    }
}

#[tokio::test]
async fn test_srv_weighted_round_robin_respects_priority() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "srvtest.example",
        RecordType::SRV,
        vec![
            Record::srv("srvtest.example", "1.1.1.1", 80, 10, 10, 300),
            Record::srv("srvtest.example", "2.2.2.2", 80, 10, 10, 300),
            Record::srv("srvtest.example", "3.3.3.3", 80, 10, 20, 300),
        ],
    );
    let resolver = new_resolver(&srv_order(), mock);

    let mut counts: HashMap<IpAddr, usize> = HashMap::new();
    for _ in 0..20 {
        let (ip, port) = resolver.to_ip("srvtest.example", 9999, false).await.unwrap();
        assert_eq!(port, 80);
        *counts.entry(ip).or_default() += 1;
    }

    assert_eq!(
        counts.get(&IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))),
        Some(&10)
    );
    assert_eq!(
        counts.get(&IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2))),
        Some(&10)
    );
    assert_eq!(
        counts.get(&IpAddr::V4(Ipv4Addr::new(3, 3, 3, 3))),
        None,
        "higher-priority entries are never used while lower ones exist"
    );
}

#[tokio::test]
async fn test_srv_weight_zero_promoted_to_one() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "zeros.example",
        RecordType::SRV,
        vec![
            Record::srv("zeros.example", "10.0.0.1", 80, 0, 1, 300),
            Record::srv("zeros.example", "10.0.0.2", 80, 0, 1, 300),
        ],
    );
    let resolver = new_resolver(&srv_order(), mock);

    let mut counts: HashMap<IpAddr, usize> = HashMap::new();
    for _ in 0..4 {
        let (ip, _) = resolver.to_ip("zeros.example", 80, false).await.unwrap();
        *counts.entry(ip).or_default() += 1;
    }
    assert_eq!(counts.len(), 2);
    assert!(counts.values().all(|&c| c == 2));
}

#[tokio::test]
async fn test_srv_port_zero_uses_caller_port() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "portless.example",
        RecordType::SRV,
        vec![Record::srv("portless.example", "10.0.0.9", 0, 10, 1, 300)],
    );
    let resolver = new_resolver(&srv_order(), mock);

    let (ip, port) = resolver.to_ip("portless.example", 8443, false).await.unwrap();
    assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)));
    assert_eq!(port, 8443);
}

#[tokio::test]
async fn test_srv_name_target_is_dereferenced() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "svc.example",
        RecordType::SRV,
        vec![Record::srv("svc.example", "node1.example", 8080, 10, 1, 300)],
    );
    mock.answer(
        "node1.example",
        RecordType::A,
        vec![Record::a("node1.example", Ipv4Addr::new(10, 0, 0, 11), 300)],
    );
    let resolver = new_resolver(&srv_order(), mock);

    let (ip, port) = resolver.to_ip("svc.example", 80, false).await.unwrap();
    assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 11)));
    assert_eq!(port, 8080, "the SRV port survives the dereference");
}

#[tokio::test]
async fn test_ip_literal_short_circuit() {
    let mock = Arc::new(MockTransport::new());
    let resolver = new_resolver(&a_order(), Arc::clone(&mock));

    let (ip, port) = resolver.to_ip("192.0.2.99", 443, false).await.unwrap();
    assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(192, 0, 2, 99)));
    assert_eq!(port, 443);
    assert_eq!(mock.query_count(), 0);
}
