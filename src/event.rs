//! Event envelope builder
//!
//! A [`SplunkEvent`] accumulates everything known about one occurrence and
//! [`SplunkEvent::build`] turns it into the [`EventDocument`] that goes on
//! the wire. Building is pure; sending is a separate step.

use chrono::Utc;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::time::Instant;

use crate::context::resolve_ambient_request;
use crate::dispatch::Dispatcher;
use crate::flatten::{Field, FieldSet, Obj, Payload, flatten};
use crate::request::{RequestHandle, RequestMeta};

/// Sourcetype used when none is given
pub const DEFAULT_SOURCETYPE: &str = "Generic";

/// Field the timer writes its result to
pub const EXECUTION_FIELD: &str = "execution";

/// HEC event document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDocument {
    /// Seconds since the epoch, decimal string
    pub time: String,
    pub sourcetype: String,
    pub event: EventBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBody {
    #[serde(serialize_with = "serialize_request")]
    pub request: Option<RequestMeta>,
    pub auth: Option<bool>,
    pub user: Option<Value>,
    #[serde(rename = "eventData")]
    pub event_data: Payload,
    pub event: Option<String>,
}

// A missing request is sent as an empty object, not null
fn serialize_request<S: Serializer>(meta: &Option<RequestMeta>, serializer: S) -> Result<S::Ok, S::Error> {
    match meta {
        Some(meta) => meta.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

/// Current time as HEC expects it
pub fn epoch_timestamp() -> String {
    let now = Utc::now();
    format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
}

/// Builder for a single event
pub struct SplunkEvent {
    key: String,
    timestamp: String,
    request: Option<RequestHandle>,
    user: Option<Value>,
    name: Option<String>,
    obj: Obj,
    fields: FieldSet,
    app_version: Option<String>,
    started: Option<Instant>,
}

impl SplunkEvent {
    /// Start an event. The request currently in scope, if any, is attached.
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            timestamp: epoch_timestamp(),
            request: resolve_ambient_request(),
            user: None,
            name: None,
            obj: Obj::None,
            fields: FieldSet::new(),
            app_version: None,
            started: None,
        }
    }

    /// Replace the attached request; `None` detaches it
    pub fn with_request(mut self, request: Option<RequestHandle>) -> Self {
        self.request = request;
        self
    }

    pub fn with_user(mut self, user: Option<Value>) -> Self {
        self.user = user;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_obj(mut self, obj: Obj) -> Self {
        self.obj = obj;
        self
    }

    pub fn with_app_version(mut self, version: Option<&str>) -> Self {
        self.app_version = version.map(str::to_string);
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Field>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a field directly on the event
    pub fn set(&mut self, key: &str, value: impl Into<Field>) {
        self.fields.insert(key.to_string(), value.into().coerce());
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn start_timer(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Record elapsed milliseconds since [`SplunkEvent::start_timer`]
    pub fn stop_timer(&mut self) {
        match self.started {
            Some(started) => {
                let ms = (started.elapsed().as_secs_f64() * 1000.0).round() as u64;
                self.fields.insert(EXECUTION_FIELD.to_string(), Value::from(ms));
            }
            None => log::error!("Timer stopped on '{}' event without being started", self.key),
        }
    }

    /// (auth, user) as seen through the attached request
    fn identity(&self) -> (Option<bool>, Option<Value>) {
        let Some(request) = &self.request else {
            return (None, self.user.clone());
        };
        match request.principal() {
            Ok(principal) => (Some(principal.authenticated), principal.id),
            Err(e) => {
                log::trace!("Treating request as unauthenticated: {}", e);
                (Some(false), self.user.clone())
            }
        }
    }

    /// Assemble the wire document
    pub fn build(&self) -> EventDocument {
        let event_data = match flatten(&self.obj) {
            Some(Payload::Many(items)) => Payload::Many(items),
            Some(Payload::Single(mut fields)) => {
                fields.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                Payload::Single(fields)
            }
            None => Payload::Single(self.fields.clone()),
        };

        let (auth, user) = self.identity();
        let request = self
            .request
            .as_deref()
            .map(|request| RequestMeta::capture(request, self.app_version.as_deref()));

        EventDocument {
            time: self.timestamp.clone(),
            sourcetype: self.key.clone(),
            event: EventBody {
                request,
                auth,
                user,
                event_data,
                event: self.name.clone(),
            },
        }
    }

    /// Build and hand off for delivery
    pub fn send(self, dispatcher: &Dispatcher) {
        dispatcher.dispatch(self.build());
    }
}

impl Default for SplunkEvent {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCETYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::with_request;
    use crate::flatten::Element;
    use crate::request::{Principal, RequestInfo};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn test_defaults() {
        let doc = SplunkEvent::default().build();
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["sourcetype"], json!("Generic"));
        assert_eq!(value["event"]["request"], json!({}));
        assert_eq!(value["event"]["auth"], Value::Null);
        assert_eq!(value["event"]["user"], Value::Null);
        assert_eq!(value["event"]["eventData"], json!({}));
        assert_eq!(value["event"]["event"], Value::Null);
    }

    #[test]
    fn test_timestamp_is_decimal_seconds() {
        let event = SplunkEvent::new("t");
        let secs: f64 = event.timestamp().parse().unwrap();
        assert!(secs > 1_600_000_000.0);
        assert!(event.timestamp().contains('.'));
    }

    #[test]
    fn test_mapping_payload_scenario() {
        let created = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(10, 30, 0).unwrap();
        let id = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000123").unwrap();
        let doc = SplunkEvent::new("orders")
            .with_obj(Obj::mapping([
                ("created", Field::from(created)),
                ("id", Field::from(id)),
                ("count", Field::from(3)),
            ]))
            .build();

        assert_eq!(
            serde_json::to_value(&doc.event.event_data).unwrap(),
            json!({"created": "01/15/2024 10:30:00", "id": "a1b2c3d4-0000-4000-8000-000000000123", "count": 3})
        );
    }

    #[test]
    fn test_sequence_payload_stays_sequence() {
        let doc = SplunkEvent::new("batch")
            .with_obj(Obj::sequence([Element::mapping([("n", 1)]), Element::mapping([("n", 2)])]))
            .with_field("ignored_for_sequences", true)
            .build();

        assert_eq!(
            serde_json::to_value(&doc.event.event_data).unwrap(),
            json!([{"n": 1}, {"n": 2}])
        );
    }

    #[test]
    fn test_direct_fields_without_obj() {
        let mut event = SplunkEvent::new("direct");
        event.set("step", "checkout");
        event.set("id", Uuid::nil());

        let doc = event.build();
        assert_eq!(
            serde_json::to_value(&doc.event.event_data).unwrap(),
            json!({"step": "checkout", "id": "00000000-0000-0000-0000-000000000000"})
        );
    }

    #[test]
    fn test_authenticated_request() {
        let req = RequestInfo::new("GET", "example.com", "/me").with_principal(Principal::authenticated(42));
        let doc = SplunkEvent::new("auth").with_request(Some(Arc::new(req))).build();

        assert_eq!(doc.event.auth, Some(true));
        assert_eq!(doc.event.user, Some(json!(42)));
        assert_eq!(doc.event.request.unwrap().path, "/me");
    }

    #[test]
    fn test_principal_error_is_unauthenticated() {
        let req = RequestInfo::new("GET", "example.com", "/");
        let doc = SplunkEvent::new("auth")
            .with_request(Some(Arc::new(req)))
            .with_user(Some(json!("explicit")))
            .build();

        assert_eq!(doc.event.auth, Some(false));
        assert_eq!(doc.event.user, Some(json!("explicit")));
    }

    #[test]
    fn test_ambient_request_attached() {
        let req: RequestHandle = Arc::new(RequestInfo::new("GET", "example.com", "/ambient"));
        let doc = with_request(req, || SplunkEvent::new("ambient").build());
        assert_eq!(doc.event.request.unwrap().path, "/ambient");
    }

    #[test]
    fn test_explicit_none_detaches_ambient_request() {
        let req: RequestHandle = Arc::new(RequestInfo::new("GET", "example.com", "/ambient"));
        let doc = with_request(req, || SplunkEvent::new("detached").with_request(None).build());
        assert!(doc.event.request.is_none());
        assert_eq!(doc.event.auth, None);
    }

    #[test]
    fn test_app_version_in_request_meta() {
        let req: RequestHandle = Arc::new(RequestInfo::new("GET", "example.com", "/"));
        let doc = SplunkEvent::new("v")
            .with_request(Some(req))
            .with_app_version(Some("2.0.1"))
            .build();
        assert_eq!(doc.event.request.unwrap().version.as_deref(), Some("2.0.1"));
    }

    #[test]
    fn test_timer() {
        let mut event = SplunkEvent::new("timed");
        event.start_timer();
        std::thread::sleep(std::time::Duration::from_millis(5));
        event.stop_timer();

        let doc = event.build();
        let Payload::Single(fields) = doc.event.event_data else {
            panic!("expected a single field-set");
        };
        assert!(fields[EXECUTION_FIELD].as_u64().unwrap() >= 5);
    }

    #[test]
    fn test_timer_stop_without_start() {
        let mut event = SplunkEvent::new("timed");
        event.stop_timer();

        let Payload::Single(fields) = event.build().event.event_data else {
            panic!("expected a single field-set");
        };
        assert!(!fields.contains_key(EXECUTION_FIELD));
    }
}
