//! Application events to Splunk HTTP Event Collector
//!
//! Pipeline: log record → context resolution → flattening → envelope →
//! delivery. Delivery is best-effort; nothing in here returns an error to
//! the code that logged the event.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod flatten;
pub mod handler;
pub mod request;
pub mod transport;

pub use config::{Config, SplunkConfig};
pub use context::{ExceptionInfo, Frame, RequestScope, resolve_ambient_request, resolve_request_frame, with_request};
pub use dispatch::{DeliveryStats, Dispatcher};
pub use error::DeliveryError;
pub use event::{EventDocument, SplunkEvent};
pub use flatten::{Element, Field, FieldSet, Loggable, Obj, Payload, flatten};
pub use handler::{LogRecord, SplunkHandler, SplunkLogger};
pub use request::{HttpRequest, Principal, RequestHandle, RequestInfo, RequestMeta};
pub use transport::{Collector, FailureReporter, Sink, StderrReporter};
