// Prober tests: TCP-connect latency ordering and bandwidth probe failure

use netscope::config::ProbeConfig;
use netscope::prober::{PingOutcome, Prober, ProbeError};
use tokio::net::TcpListener;

fn probe_config(endpoints: Vec<String>) -> ProbeConfig {
    ProbeConfig {
        ping_endpoints: endpoints,
        ping_timeout_ms: 200,
        download_url: "http://127.0.0.1:1/down".into(),
        upload_url: "http://127.0.0.1:1/up".into(),
        upload_bytes: 1000,
        timeout_secs: 2,
        interval_secs: 300,
    }
}

#[tokio::test]
async fn ping_reaches_a_listening_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let prober = Prober::new(&probe_config(vec![addr.to_string()])).unwrap();
    match prober.ping().await {
        PingOutcome::ReachedMs(ms) => assert!(ms >= 0.0),
        PingOutcome::Unreachable => panic!("local listener should be reachable"),
    }
}

#[tokio::test]
async fn ping_falls_through_to_next_endpoint_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // First endpoint refuses; the second answers
    let prober =
        Prober::new(&probe_config(vec!["127.0.0.1:1".into(), addr.to_string()])).unwrap();
    assert!(matches!(prober.ping().await, PingOutcome::ReachedMs(_)));
}

#[tokio::test]
async fn ping_reports_unreachable_when_all_endpoints_fail() {
    let prober =
        Prober::new(&probe_config(vec!["127.0.0.1:1".into(), "127.0.0.1:2".into()])).unwrap();
    assert!(matches!(prober.ping().await, PingOutcome::Unreachable));
}

#[tokio::test]
async fn bandwidth_probe_surfaces_http_failure() {
    let prober = Prober::new(&probe_config(vec!["127.0.0.1:1".into()])).unwrap();
    match prober.bandwidth_probe().await {
        Err(ProbeError::Http(_)) => {}
        other => panic!("expected http probe error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn prober_builds_from_default_config() {
    assert!(Prober::new(&ProbeConfig::default()).is_ok());
}

#[test]
fn prober_rejects_invalid_download_url() {
    let config = ProbeConfig {
        download_url: "not a url".into(),
        ..ProbeConfig::default()
    };
    assert!(Prober::new(&config).is_err());
}
