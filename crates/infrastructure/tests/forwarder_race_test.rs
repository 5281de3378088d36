use fanout_dns_application::ports::{BootstrapResolver, ExchangeSignal, QueryForwarder, Upstream};
use fanout_dns_application::use_cases::{ForwardQueryUseCase, QueryContext};
use fanout_dns_domain::{DomainError, ForwarderOptions, UpstreamSpec};
use fanout_dns_infrastructure::dns::Forwarder;
use hickory_proto::rr::RecordType;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

mod helpers;
use helpers::{query_for, MockFactory, MockResolver, MockUpstream};

fn specs(n: usize) -> Vec<UpstreamSpec> {
    (0..n)
        .map(|i| UpstreamSpec::new(format!("udp://10.0.0.{}:53", i + 1)))
        .collect()
}

fn bootstrap() -> Arc<dyn BootstrapResolver> {
    Arc::new(MockResolver::resolving(
        "mock",
        &["127.0.0.1".parse::<IpAddr>().unwrap()],
        None,
    ))
}

async fn forwarder_over(upstreams: Vec<Arc<MockUpstream>>) -> Forwarder {
    let factory = MockFactory::new(upstreams.clone());
    Forwarder::with_bootstrap(
        &specs(upstreams.len()),
        &ForwarderOptions::default(),
        bootstrap(),
        &factory,
    )
    .await
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_winner_can_be_at_any_position() {
    for winner in 0..3 {
        let upstreams: Vec<_> = (0..3)
            .map(|i| {
                let addr = format!("udp://10.0.0.{}:53", i + 1);
                if i == winner {
                    MockUpstream::answering(&addr, 30)
                } else {
                    MockUpstream::failing(&addr, 5)
                }
            })
            .collect();
        let forwarder = forwarder_over(upstreams.clone()).await;

        let outcome = forwarder
            .exchange(&query_for("example.com.", RecordType::A), &ExchangeSignal::new())
            .await
            .unwrap();

        assert_eq!(outcome.upstream.address(), upstreams[winner].address());
        assert_eq!(outcome.response.answers().len(), 1);
        assert_eq!(outcome.response.id(), 0x4f2a);
    }
}

#[tokio::test(start_paused = true)]
async fn test_fastest_success_wins_over_slower_success() {
    let slow = MockUpstream::answering("udp://10.0.0.1:53", 200);
    let fast = MockUpstream::answering("udp://10.0.0.2:53", 20);
    let forwarder = forwarder_over(vec![slow.clone(), fast.clone()]).await;

    let outcome = forwarder
        .exchange(&query_for("example.com.", RecordType::A), &ExchangeSignal::new())
        .await
        .unwrap();

    assert_eq!(outcome.upstream.address(), fast.address());
    assert_eq!(slow.exchanges(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_all_failures_are_aggregated_in_index_order() {
    // Later indices fail first.
    let upstreams = vec![
        MockUpstream::failing("udp://10.0.0.1:53", 30),
        MockUpstream::failing("udp://10.0.0.2:53", 20),
        MockUpstream::failing("udp://10.0.0.3:53", 10),
    ];
    let forwarder = forwarder_over(upstreams).await;

    let err = forwarder
        .exchange(&query_for("example.com.", RecordType::A), &ExchangeSignal::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::AllUpstreamsFailed(_)));
    let failures = err.failures();
    assert_eq!(failures.len(), 3);
    for (i, failure) in failures.iter().enumerate() {
        assert_eq!(failure.index, i);
        assert_eq!(&*failure.upstream, format!("udp://10.0.0.{}:53", i + 1));
        assert!(failure.error.is_transport_error());
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_returns_promptly() {
    let upstreams = vec![
        MockUpstream::hanging("udp://10.0.0.1:53"),
        MockUpstream::hanging("udp://10.0.0.2:53"),
    ];
    let forwarder = forwarder_over(upstreams).await;
    let signal = ExchangeSignal::new();

    let canceller = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let start = tokio::time::Instant::now();
    let err = forwarder
        .exchange(&query_for("example.com.", RecordType::A), &signal)
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::Cancelled));
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_exceeded_is_reported() {
    let forwarder = forwarder_over(vec![MockUpstream::hanging("udp://10.0.0.1:53")]).await;

    let err = forwarder
        .exchange(
            &query_for("example.com.", RecordType::A),
            &ExchangeSignal::with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::DeadlineExceeded));
    assert!(err.is_cancellation());
}

#[tokio::test(start_paused = true)]
async fn test_already_fired_signal_contacts_no_upstream() {
    let upstream = MockUpstream::answering("udp://10.0.0.1:53", 0);
    let forwarder = forwarder_over(vec![upstream.clone()]).await;
    let signal = ExchangeSignal::new();
    signal.cancel();

    let err = forwarder
        .exchange(&query_for("example.com.", RecordType::A), &signal)
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::Cancelled));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(upstream.exchanges(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_race_runs_to_completion() {
    let upstream = MockUpstream::answering("udp://10.0.0.1:53", 200);
    let forwarder = forwarder_over(vec![upstream.clone()]).await;

    let err = forwarder
        .exchange(
            &query_for("example.com.", RecordType::A),
            &ExchangeSignal::with_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::DeadlineExceeded));
    assert_eq!(upstream.completed(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(upstream.completed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_losers_are_aborted_after_a_winner() {
    let winner = MockUpstream::answering("udp://10.0.0.1:53", 5);
    let loser = MockUpstream::hanging("udp://10.0.0.2:53");
    let forwarder = forwarder_over(vec![winner, loser.clone()]).await;

    forwarder
        .exchange(&query_for("example.com.", RecordType::A), &ExchangeSignal::new())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(loser.exchanges(), 1);
    assert_eq!(loser.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_caller_query_is_never_modified() {
    let upstreams = vec![
        Arc::new(
            MockUpstream::new(
                "udp://10.0.0.1:53",
                helpers::Behavior::Answer(Duration::from_millis(5)),
            )
            .mutating(),
        ),
        Arc::new(
            MockUpstream::new(
                "udp://10.0.0.2:53",
                helpers::Behavior::Fail(Duration::from_millis(1)),
            )
            .mutating(),
        ),
    ];
    let forwarder = forwarder_over(upstreams).await;

    let query = query_for("example.com.", RecordType::A);
    let snapshot = query.clone();

    let outcome = forwarder
        .exchange(&query, &ExchangeSignal::new())
        .await
        .unwrap();

    assert_eq!(query, snapshot);
    assert_eq!(query.id(), 0x4f2a);
    assert!(query.recursion_desired());
    assert_ne!(outcome.response.id(), query.id());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_exchanges_share_one_forwarder() {
    let upstream = MockUpstream::answering("udp://10.0.0.1:53", 10);
    let forwarder = Arc::new(forwarder_over(vec![upstream.clone()]).await);

    let mut handles = Vec::new();
    for i in 0..8 {
        let forwarder = Arc::clone(&forwarder);
        handles.push(tokio::spawn(async move {
            let domain = format!("host{}.example.com.", i);
            forwarder
                .exchange(&query_for(&domain, RecordType::A), &ExchangeSignal::new())
                .await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(upstream.exchanges(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_forwarder_drives_forward_query_use_case() {
    let upstream = MockUpstream::answering("udp://10.0.0.1:53", 1);
    let forwarder: Arc<dyn QueryForwarder> = Arc::new(forwarder_over(vec![upstream]).await);
    let use_case = ForwardQueryUseCase::new(Arc::clone(&forwarder));

    let mut ctx = QueryContext::new(
        query_for("example.com.", RecordType::A),
        ExchangeSignal::with_timeout(Duration::from_secs(1)),
    );
    use_case.execute(&mut ctx).await.unwrap();

    assert_eq!(ctx.answered_by(), Some("udp://10.0.0.1:53"));
    assert_eq!(ctx.response().unwrap().answers().len(), 1);
}
