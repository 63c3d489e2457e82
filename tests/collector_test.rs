//! Integration tests for delivery to a mock HTTP Event Collector
//!
//! These tests verify:
//! - Wire format and auth header of delivered events
//! - Status handling (only 200 counts as success)
//! - Disabled delivery never touches the network
//! - Log records flowing through the handler end to end

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::{Arc, Mutex};

use splunk_logging::transport::{COLLECTOR_PATH, Outcome};
use splunk_logging::{
    Collector, DeliveryError, Dispatcher, FailureReporter, Frame, LogRecord, Obj, Principal, RequestInfo, Sink,
    SplunkConfig, SplunkEvent, SplunkHandler, with_request,
};

/// Reporter that keeps every failure for inspection
#[derive(Default)]
struct RecordingReporter(Mutex<Vec<String>>);

impl FailureReporter for RecordingReporter {
    fn report(&self, error: &DeliveryError) {
        self.0.lock().unwrap().push(error.to_string());
    }
}

impl RecordingReporter {
    fn reports(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

fn config_for(server: &ServerGuard) -> SplunkConfig {
    let addr = server.socket_address();
    SplunkConfig {
        address: addr.ip().to_string(),
        port: addr.port(),
        https: false,
        token: "test-token".to_string(),
        enabled: true,
        timeout_secs: 5,
        ..Default::default()
    }
}

fn collector(server: &ServerGuard) -> (Collector, Arc<RecordingReporter>) {
    let reporter = Arc::new(RecordingReporter::default());
    let collector = Collector::with_reporter(&config_for(server), reporter.clone());
    (collector, reporter)
}

#[test]
fn test_delivers_wire_format_with_auth_header() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", COLLECTOR_PATH)
        .match_header("authorization", "Splunk test-token")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "sourcetype": "orders",
            "event": {
                "request": {},
                "auth": null,
                "user": null,
                "eventData": {"sku": "A-1", "qty": 2},
                "event": "created"
            }
        })))
        .with_status(200)
        .with_body(r#"{"text":"Success","code":0}"#)
        .expect(1)
        .create();

    let (collector, reporter) = collector(&server);
    let doc = SplunkEvent::new("orders")
        .with_request(None)
        .with_name("created")
        .with_obj(Obj::mapping([("sku", json!("A-1")), ("qty", json!(2))]))
        .build();

    collector.deliver(&doc);

    mock.assert();
    assert!(reporter.reports().is_empty());
}

#[test]
fn test_status_200_is_success() {
    let mut server = Server::new();
    let mock = server.mock("POST", COLLECTOR_PATH).with_status(200).create();

    let (collector, reporter) = collector(&server);
    let outcome = collector.try_deliver(&SplunkEvent::new("ok").build()).unwrap();

    mock.assert();
    assert_eq!(outcome, Outcome::Delivered);
    assert!(reporter.reports().is_empty());
}

#[test]
fn test_status_201_is_reported_as_failure() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", COLLECTOR_PATH)
        .with_status(201)
        .with_body("created elsewhere")
        .create();

    let (collector, reporter) = collector(&server);
    collector.deliver(&SplunkEvent::new("created").build());

    mock.assert();
    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("201"));
    assert!(reports[0].contains("created elsewhere"));
}

#[test]
fn test_rejected_event_body_is_reported() {
    let mut server = Server::new();
    server
        .mock("POST", COLLECTOR_PATH)
        .with_status(403)
        .with_body(r#"{"text":"Invalid token","code":4}"#)
        .create();

    let (collector, reporter) = collector(&server);
    let err = collector.try_deliver(&SplunkEvent::new("denied").build()).unwrap_err();

    match err {
        DeliveryError::Rejected { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("Invalid token"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(reporter.reports().is_empty(), "try_deliver leaves reporting to the caller");
}

#[test]
fn test_disabled_makes_no_request() {
    let mut server = Server::new();
    let mock = server.mock("POST", Matcher::Any).expect(0).create();

    let config = SplunkConfig {
        enabled: false,
        ..config_for(&server)
    };
    let reporter = Arc::new(RecordingReporter::default());
    let collector = Collector::with_reporter(&config, reporter.clone());

    for key in ["a", "b", "c"] {
        collector.deliver(&SplunkEvent::new(key).build());
    }

    mock.assert();
    assert!(reporter.reports().is_empty());
}

#[test]
fn test_pooled_dispatch_delivers_after_shutdown() {
    let mut server = Server::new();
    let mock = server.mock("POST", COLLECTOR_PATH).with_status(200).expect(3).create();

    let config = SplunkConfig {
        threaded: true,
        workers: 2,
        queue_capacity: 8,
        ..config_for(&server)
    };
    let sink: Arc<dyn Sink> = Arc::new(Collector::new(&config));
    let dispatcher = Dispatcher::from_config(&config, sink);

    for i in 0..3 {
        SplunkEvent::new("pooled").with_field("i", i).send(&dispatcher);
    }
    dispatcher.shutdown();

    mock.assert();
    assert_eq!(dispatcher.stats().delivered, 3);
}

#[test]
fn test_handler_end_to_end() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", COLLECTOR_PATH)
        .match_body(Matcher::PartialJson(json!({
            "sourcetype": "server_log",
            "event": {
                "request": {"path": "/checkout", "method": "POST", "POST": {"sku": "A-1"}, "version": "9.9.9"},
                "auth": true,
                "user": 17,
                "eventData": {"method": "checkout", "status_code": 402},
                "event": "ERROR"
            }
        })))
        .with_status(200)
        .expect(1)
        .create();

    let config = SplunkConfig {
        version: Some("9.9.9".to_string()),
        ..config_for(&server)
    };
    let handler = SplunkHandler::from_config(&config);

    let request = RequestInfo::new("POST", "shop.example.com", "/checkout")
        .with_body_param("sku", "A-1")
        .with_principal(Principal::authenticated(17))
        .into_handle();

    // Error captured inside the handler, logged later with no request in scope
    let exception = with_request(request, || {
        let err = std::io::Error::other("card declined");
        splunk_logging::ExceptionInfo::from_error(&err, splunk_logging::frame!("checkout")).with_status(402)
    })
    .with_outer_frame(Frame::new("serve", "shop::server", "server.rs", 1));

    handler.handle(&LogRecord::new(log::Level::Error, "payment failed").with_exception(exception));

    mock.assert();
    assert_eq!(handler.dispatcher().stats().delivered, 1);
}
