//! Web-preview client against a mock server

use channel_harvest::extract::CanonicalRef;
use channel_harvest::platform::{
    ChannelJoiner, ChannelResolver, JoinOutcome, PreviewClient, ResolveOutcome,
};
use channel_harvest::state::ChannelKind;
use channel_harvest::storage::ChannelRecord;
use chrono::Utc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHANNEL_PAGE: &str = r#"<html><head><title>Telegram: Contact @tech_news</title></head><body>
    <div class="tgme_page_title"><span dir="auto">科技资讯</span></div>
    <div class="tgme_page_extra">12 500 subscribers</div>
</body></html>"#;

const STREAM_PAGE: &str = r#"<html><body>
    <div class="tgme_widget_message" data-post="tech_news/1">hello</div>
</body></html>"#;

const EMPTY_STREAM_PAGE: &str = r#"<html><body><div class="tgme_channel_info"></div></body></html>"#;

fn client(server: &MockServer) -> PreviewClient {
    PreviewClient::new(&server.uri(), "harvest-test/1.0", Duration::from_secs(5)).unwrap()
}

fn handle(name: &str) -> CanonicalRef {
    CanonicalRef::Handle(name.to_string())
}

fn record(name: &str) -> ChannelRecord {
    ChannelRecord::discovered(&handle(name), Utc::now())
}

#[tokio::test]
async fn test_resolve_channel_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tech_news"))
        .and(header("user-agent", "harvest-test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHANNEL_PAGE))
        .mount(&server)
        .await;

    match client(&server).resolve(&handle("tech_news")).await {
        ResolveOutcome::Success(resolved) => {
            assert_eq!(resolved.kind, ChannelKind::Broadcast);
            assert_eq!(resolved.title.as_deref(), Some("科技资讯"));
            assert_eq!(resolved.member_count, Some(12500));
            assert_eq!(resolved.handle.as_deref(), Some("tech_news"));
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resolve_invite_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/+AbCdEf"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHANNEL_PAGE))
        .mount(&server)
        .await;

    let outcome = client(&server)
        .resolve(&CanonicalRef::Invite("AbCdEf".to_string()))
        .await;
    assert!(matches!(outcome, ResolveOutcome::Success(ref r) if r.handle.is_none()));
}

#[tokio::test]
async fn test_resolve_classifies_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone_channel"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy_channel"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "48"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky_channel"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(
        client.resolve(&handle("gone_channel")).await,
        ResolveOutcome::NotFound
    );
    assert_eq!(
        client.resolve(&handle("busy_channel")).await,
        ResolveOutcome::RateLimited(Duration::from_secs(48))
    );
    assert!(matches!(
        client.resolve(&handle("flaky_channel")).await,
        ResolveOutcome::TransientError(_)
    ));
}

#[tokio::test]
async fn test_private_id_is_not_resolvable() {
    let server = MockServer::start().await;
    let outcome = client(&server).resolve(&CanonicalRef::PrivateId(100100)).await;
    assert_eq!(outcome, ResolveOutcome::NotFound);
}

#[tokio::test]
async fn test_join_observes_message_stream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s/tech_news"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STREAM_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s/quiet_channel"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_STREAM_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s/gone_channel"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(client.join(&record("tech_news")).await, JoinOutcome::Success);
    assert!(matches!(
        client.join(&record("quiet_channel")).await,
        JoinOutcome::PermanentFailure(_)
    ));
    assert!(matches!(
        client.join(&record("gone_channel")).await,
        JoinOutcome::PermanentFailure(_)
    ));
}

#[tokio::test]
async fn test_join_rate_limit_without_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s/busy_channel"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    assert_eq!(
        client(&server).join(&record("busy_channel")).await,
        JoinOutcome::RateLimited(Duration::from_secs(60))
    );
}
