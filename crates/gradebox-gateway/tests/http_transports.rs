//! Gateway transports against a mock HTTP server.

use std::collections::BTreeMap;

use chrono::Utc;
use gradebox_core::{
    BlobStore, Broker, BuildSpecification, JobRequest, JobResponse, Profile, PubSub,
    QueueMessage, SessionId, TransportError, TransportSession, UploadOptions,
};
use gradebox_gateway::{Gateway, GatewayConfig};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> Gateway {
    let config = GatewayConfig::new(&server.uri()).unwrap().with_token("t0k");
    Gateway::new(config).unwrap()
}

fn session() -> TransportSession {
    TransportSession {
        session_id: SessionId::from("s-1"),
        access_key: "AK".to_string(),
        secret_key: "SK".to_string(),
        issued_at: Utc::now(),
    }
}

fn options() -> UploadOptions {
    UploadOptions {
        expires_at: Utc::now(),
        content_type: "application/gzip".to_string(),
        metadata: BTreeMap::from([
            ("id".to_string(), "s-1".to_string()),
            ("type".to_string(), "user_upload".to_string()),
        ]),
    }
}

fn message() -> QueueMessage {
    let profile = Profile {
        username: "alice".to_string(),
        access_key: "AK".to_string(),
        secret_key: "SK".to_string(),
        ..Default::default()
    };
    let request = JobRequest {
        id: "s-1".to_string(),
        created_at: Utc::now(),
        client_version: "0.4.0".to_string(),
        upload_key: "userdata/s-1.tar.gz".to_string(),
        user: profile.user(),
        build_specification: BuildSpecification::default(),
    };
    QueueMessage::for_request(&SessionId::from("s-1"), &request, &profile).unwrap()
}

#[tokio::test]
async fn upload_puts_archive_with_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v1/objects/.+$"))
        .and(header("authorization", "Bearer t0k"))
        .and(header("x-gradebox-access-key", "AK"))
        .and(header("x-gradebox-meta-type", "user_upload"))
        .and(header("content-type", "application/gzip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "key": "userdata/s-1.tar.gz" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let key = gateway(&server)
        .blob_store()
        .upload(&session(), b"archive".to_vec(), "userdata/s-1.tar.gz", options())
        .await
        .unwrap();
    assert_eq!(key, "userdata/s-1.tar.gz");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].body, b"archive".to_vec());
}

#[tokio::test]
async fn upload_rejection_maps_to_upload_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("expired credentials"))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .blob_store()
        .upload(&session(), Vec::new(), "userdata/s-1.tar.gz", options())
        .await
        .unwrap_err();
    match err {
        TransportError::Upload { key, reason } => {
            assert_eq!(key, "userdata/s-1.tar.gz");
            assert!(reason.contains("403"));
            assert!(reason.contains("expired credentials"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn publish_posts_message_to_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/queues/gradebox_amd64/messages"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server)
        .broker(Some("amd64"))
        .publish(&session(), "gradebox_amd64", message())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let sent: QueueMessage = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent.id, "s-1");
    assert_eq!(sent.header["username"], "alice");
    assert_eq!(sent.request().unwrap().upload_key, "userdata/s-1.tar.gz");
}

#[tokio::test]
async fn broker_is_selected_by_architecture() {
    let gateway_server = MockServer::start().await;
    let s390x_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/queues/gradebox_s390x/messages"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&s390x_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&gateway_server)
        .await;

    let config = GatewayConfig::new(&gateway_server.uri())
        .unwrap()
        .with_broker("S390X", &s390x_server.uri())
        .unwrap();
    let broker = Gateway::new(config).unwrap().broker(Some("s390x"));
    broker
        .publish(&session(), "gradebox_s390x", message())
        .await
        .unwrap();
}

#[tokio::test]
async fn connect_probes_health() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let broker = gateway(&server).broker(None);
    broker.connect().await.unwrap();
    assert!(broker.is_connected());
    broker.disconnect().await.unwrap();
    broker.disconnect().await.unwrap();
    assert!(!broker.is_connected());
}

#[tokio::test]
async fn unhealthy_broker_fails_connect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let broker = gateway(&server).broker(None);
    let err = broker.connect().await.unwrap_err();
    assert!(matches!(err, TransportError::Connect(_)));
    assert!(!broker.is_connected());
}

#[tokio::test]
async fn subscription_streams_ndjson_lines() {
    let server = MockServer::start().await;
    let first = String::from_utf8(JobResponse::stdout("New Inference").to_bytes().unwrap()).unwrap();
    let second =
        String::from_utf8(JobResponse::stderr("Op Time: 0.5").to_bytes().unwrap()).unwrap();
    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/channels/.+/stream$"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/x-ndjson")
                .set_body_string(format!("{}\n\n{}\n", first, second)),
        )
        .mount(&server)
        .await;

    let subscription = gateway(&server)
        .pubsub()
        .subscribe("gradebox/log-s-1")
        .await
        .unwrap();
    assert_eq!(subscription.channel(), "gradebox/log-s-1");
    let (_, mut rx, _) = subscription.into_parts();

    let a = JobResponse::from_bytes(&rx.recv().await.unwrap()).unwrap();
    let b = JobResponse::from_bytes(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(a.text(), "New Inference");
    assert_eq!(b.text(), "Op Time: 0.5");
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn missing_channel_fails_subscribe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .pubsub()
        .subscribe("gradebox/log-missing")
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Subscribe { .. }));
}

#[tokio::test]
async fn close_stops_open_subscriptions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let pubsub = gateway(&server).pubsub();
    let subscription = pubsub.subscribe("gradebox/log-s-1").await.unwrap();
    let stop = subscription.stop_handle();

    pubsub.close().await.unwrap();
    pubsub.close().await.unwrap();
    assert!(stop.is_cancelled());
}
