use rudder_domain::{
    AnswerSet, ConfigSource, DiscoveryError, OrderType, RData, Record, RecordType, ResolverConfig,
};
use rudder_resolver::cache::CacheAnswer;
use rudder_resolver::{clock, DnsTransport, MockTransport, QueryReply, Resolver};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

fn test_config(order: &[OrderType]) -> ResolverConfig {
    ResolverConfig {
        hosts: ConfigSource::literal::<&str>([]),
        resolv_conf: ConfigSource::literal(["nameserver 127.0.0.1"]),
        order: order.to_vec(),
        search: Some(vec![]),
        ..ResolverConfig::default()
    }
}

fn a_only() -> Vec<OrderType> {
    vec![OrderType::Query(RecordType::A)]
}

fn new_resolver(order: &[OrderType], transport: Arc<MockTransport>) -> Arc<Resolver> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Resolver::with_transport(test_config(order), transport).unwrap()
}

#[tokio::test]
async fn test_simple_a_resolution_is_cached() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "app.example",
        RecordType::A,
        vec![Record::a("app.example", Ipv4Addr::new(192, 0, 2, 1), 300)],
    );
    let resolver = new_resolver(&a_only(), Arc::clone(&mock));

    let set = resolver.resolve("app.example", false).await.unwrap();
    assert_eq!(set.records.len(), 1);
    assert_eq!(mock.query_count(), 1);

    let again = resolver.resolve("app.example", false).await.unwrap();
    assert_eq!(again.records.len(), 1);
    assert_eq!(mock.query_count(), 1, "second resolve must hit the cache");
}

#[tokio::test]
async fn test_cname_dereference_populates_both_entries() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "a.example",
        RecordType::A,
        vec![Record::cname("a.example", "b.example", 300)],
    );
    mock.answer(
        "b.example",
        RecordType::A,
        vec![Record::a("b.example", Ipv4Addr::new(192, 0, 2, 7), 300)],
    );
    let resolver = new_resolver(&a_only(), mock);

    let set = resolver.resolve("a.example", false).await.unwrap();
    assert_eq!(set.records[0].rtype(), RecordType::A);
    assert_eq!(set.records[0].name, "b.example");

    assert!(matches!(
        resolver.cache().get("a.example", RecordType::CNAME, false),
        CacheAnswer::Hit(_)
    ));
    assert!(matches!(
        resolver.cache().get("b.example", RecordType::A, false),
        CacheAnswer::Hit(_)
    ));
}

#[tokio::test]
async fn test_explicit_cname_request_is_not_dereferenced() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "a.example",
        RecordType::CNAME,
        vec![Record::cname("a.example", "b.example", 300)],
    );
    let resolver = new_resolver(
        &[OrderType::Query(RecordType::CNAME)],
        mock,
    );

    let set = resolver
        .resolve_type("a.example", RecordType::CNAME, false)
        .await
        .unwrap();
    assert_eq!(set.records[0].rtype(), RecordType::CNAME);
}

#[tokio::test]
async fn test_stale_while_refresh() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "app.example",
        RecordType::A,
        vec![Record::a("app.example", Ipv4Addr::new(192, 0, 2, 2), 300)],
    );
    let resolver = new_resolver(&a_only(), Arc::clone(&mock));

    let old = AnswerSet::positive(
        "app.example",
        RecordType::A,
        vec![Record::a("app.example", Ipv4Addr::new(192, 0, 2, 1), 300)],
    );
    resolver.cache().seed(old, clock::now() - 1.0);

    let stale = resolver.resolve("app.example", false).await.unwrap();
    assert!(stale.is_expired_flagged(), "must be served as stale");
    assert_eq!(stale.records[0].data, RData::A(Ipv4Addr::new(192, 0, 2, 1)));

    // give the background refresh a chance to land
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mock.query_count(), 1);

    let fresh = resolver.resolve("app.example", false).await.unwrap();
    assert!(!fresh.is_expired_flagged());
    assert_eq!(fresh.records[0].data, RData::A(Ipv4Addr::new(192, 0, 2, 2)));
}

#[tokio::test]
async fn test_server_error_preserves_stale_name_error_overwrites() {
    let mock = Arc::new(MockTransport::new());
    mock.reply("app.example", RecordType::A, Ok(QueryReply::servfail()));
    let resolver = new_resolver(&a_only(), Arc::clone(&mock));

    let old = AnswerSet::positive(
        "app.example",
        RecordType::A,
        vec![Record::a("app.example", Ipv4Addr::new(192, 0, 2, 1), 300)],
    );
    resolver.cache().seed(old, clock::now() - 1.0);

    // first call consumes the one-shot stale hand-out
    let first = resolver.resolve("app.example", false).await.unwrap();
    assert!(first.is_expired_flagged());

    // the server failure must not evict the stale records
    let served = resolver.resolve("app.example", false).await.unwrap();
    assert!(!served.is_error());
    assert_eq!(served.records[0].data, RData::A(Ipv4Addr::new(192, 0, 2, 1)));

    // an NXDOMAIN may
    mock.reply("app.example", RecordType::A, Ok(QueryReply::nxdomain()));
    let err = resolver.resolve("app.example", false).await.unwrap_err();
    assert_eq!(
        err,
        DiscoveryError::DnsServer {
            code: 3,
            text: "name error".to_string()
        }
    );
    assert!(resolver
        .cache()
        .get_stale("app.example", RecordType::A)
        .map(|s| s.is_error())
        .unwrap_or(false));
}

#[tokio::test]
async fn test_error_message_format() {
    let mock = Arc::new(MockTransport::new());
    mock.reply("down.example", RecordType::A, Ok(QueryReply::servfail()));
    let resolver = new_resolver(&a_only(), mock);

    let err = resolver.resolve("down.example", false).await.unwrap_err();
    assert_eq!(err.to_string(), "dns server error: 2 server failure");
}

#[tokio::test]
async fn test_coalesced_queries_hit_transport_once() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "app.example",
        RecordType::A,
        vec![Record::a("app.example", Ipv4Addr::new(192, 0, 2, 1), 300)],
    );
    mock.set_delay(Duration::from_millis(100));
    let resolver = new_resolver(&a_only(), Arc::clone(&mock));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let r = Arc::clone(&resolver);
        handles.push(tokio::spawn(async move {
            r.resolve("app.example", false).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(mock.query_count(), 1, "ten callers, one wire query");
}

#[tokio::test]
async fn test_zero_ttl_bypasses_coalescing() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "flapping.example",
        RecordType::A,
        vec![Record::a("flapping.example", Ipv4Addr::new(192, 0, 2, 1), 0)],
    );
    let resolver = new_resolver(&a_only(), Arc::clone(&mock));

    for _ in 0..3 {
        let set = resolver.resolve("flapping.example", false).await.unwrap();
        assert!(set.all_zero_ttl());
    }
    assert_eq!(mock.query_count(), 3, "ttl=0 answers are queried every time");
}

#[tokio::test]
async fn test_recursive_cname_chain_is_bounded() {
    let mock = Arc::new(MockTransport::new());
    let resolver = new_resolver(
        &[OrderType::Query(RecordType::CNAME)],
        mock,
    );

    let far = clock::now() + 300.0;
    resolver.cache().seed(
        AnswerSet::positive(
            "a.example",
            RecordType::CNAME,
            vec![Record::cname("a.example", "b.example", 300)],
        ),
        far,
    );
    resolver.cache().seed(
        AnswerSet::positive(
            "b.example",
            RecordType::CNAME,
            vec![Record::cname("b.example", "a.example", 300)],
        ),
        far,
    );

    let err = resolver.resolve("a.example", false).await.unwrap_err();
    assert_eq!(err, DiscoveryError::MaxRecursion);
    assert_eq!(err.to_string(), "maximum dns recursion level reached");
}

#[tokio::test]
async fn test_srv_self_reference_fails_over_to_next_type() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "headless.example",
        RecordType::SRV,
        vec![Record::srv("headless.example", "headless.example", 80, 10, 1, 60)],
    );
    mock.answer(
        "headless.example",
        RecordType::A,
        vec![Record::a("headless.example", Ipv4Addr::new(192, 0, 2, 9), 60)],
    );
    let resolver = new_resolver(
        &[
            OrderType::Query(RecordType::SRV),
            OrderType::Query(RecordType::A),
        ],
        mock,
    );

    let set = resolver.resolve("headless.example", false).await.unwrap();
    assert_eq!(set.records[0].rtype(), RecordType::A);
}

#[tokio::test]
async fn test_search_list_expansion_and_short_names() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "api.prod.internal",
        RecordType::A,
        vec![Record::a("api.prod.internal", Ipv4Addr::new(10, 0, 0, 5), 300)],
    );
    let mut config = test_config(&a_only());
    config.search = Some(vec!["prod.internal".to_string()]);
    let resolver = Resolver::with_transport(config, Arc::clone(&mock) as Arc<dyn DnsTransport>).unwrap();

    let set = resolver.resolve("api", false).await.unwrap();
    assert_eq!(set.records[0].name, "api.prod.internal");
    assert_eq!(
        mock.query_log()[0],
        ("api.prod.internal".to_string(), RecordType::A),
        "a short name expands before the bare name is tried"
    );

    let queries_before = mock.query_count();
    let again = resolver.resolve("api", false).await.unwrap();
    assert_eq!(again.records[0].name, "api.prod.internal");
    assert_eq!(mock.query_count(), queries_before, "short-name entry hits");
}

#[tokio::test]
async fn test_last_successful_type_is_recorded() {
    let mock = Arc::new(MockTransport::new());
    mock.answer(
        "svc.example",
        RecordType::SRV,
        vec![Record::srv("svc.example", "node.example", 8080, 10, 1, 60)],
    );
    let resolver = new_resolver(
        &[
            OrderType::LastSuccess,
            OrderType::Query(RecordType::A),
            OrderType::Query(RecordType::SRV),
        ],
        mock,
    );

    resolver.resolve("svc.example", false).await.unwrap();
    assert_eq!(
        resolver.cache().get_last_type("svc.example"),
        Some(RecordType::SRV)
    );
}

#[tokio::test]
async fn test_ip_literals() {
    let mock = Arc::new(MockTransport::new());
    let resolver = new_resolver(&a_only(), Arc::clone(&mock));

    let set = resolver.resolve("10.1.2.3", false).await.unwrap();
    assert_eq!(set.records[0].rtype(), RecordType::A);
    assert_eq!(mock.query_count(), 0, "literals never reach the wire");

    let err = resolver
        .resolve_type("10.1.2.3", RecordType::AAAA, false)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DiscoveryError::DnsServer {
            code: 3,
            text: "name error".to_string()
        }
    );

    let set = resolver
        .resolve_type("::1", RecordType::AAAA, false)
        .await
        .unwrap();
    assert_eq!(set.records[0].rtype(), RecordType::AAAA);
}

#[tokio::test]
async fn test_cache_only_miss() {
    let mock = Arc::new(MockTransport::new());
    let resolver = new_resolver(&a_only(), Arc::clone(&mock));

    let err = resolver.resolve("nowhere.example", true).await.unwrap_err();
    assert_eq!(err, DiscoveryError::CacheOnlyMiss);
    assert_eq!(mock.query_count(), 0);
}

#[tokio::test]
async fn test_hosts_file_seeding() {
    let mock = Arc::new(MockTransport::new());
    let mut config = test_config(&a_only());
    config.hosts = ConfigSource::literal(["198.51.100.7 app.internal app"]);
    let resolver = Resolver::with_transport(config, Arc::clone(&mock) as Arc<dyn DnsTransport>).unwrap();

    let set = resolver.resolve("app.internal", false).await.unwrap();
    assert_eq!(
        set.records[0].data,
        RData::A(Ipv4Addr::new(198, 51, 100, 7))
    );
    let set = resolver.resolve("localhost", false).await.unwrap();
    assert_eq!(set.records[0].data, RData::A(Ipv4Addr::LOCALHOST));
    assert_eq!(mock.query_count(), 0);
}
