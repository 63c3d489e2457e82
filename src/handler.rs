//! Log record adapter
//!
//! Turns log records into `server_log` events. Plain records pick up the
//! request in scope on the current thread; records carrying an error use the
//! frames captured on the error to find both the request and the location
//! that best describes where it happened.

use log::kv::{Key, Source};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use serde_json::Value;
use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::config::SplunkConfig;
use crate::context::{ExceptionInfo, Frame, resolve_ambient_request, resolve_request_frame};
use crate::dispatch::Dispatcher;
use crate::event::SplunkEvent;
use crate::flatten::{Field, Obj};
use crate::request::RequestHandle;
use crate::transport::{Collector, Sink};

/// Sourcetype for everything coming through the logger
pub const SERVER_LOG_SOURCETYPE: &str = "server_log";

/// Targets whose records are never forwarded; they are emitted while delivering
const IGNORED_TARGETS: &[&str] = &["ureq", "ureq_proto", "rustls"];

/// Record key holding an error, as in `log::error!(error:err = e; "...")`
pub const ERROR_KEY: &str = "error";

/// A log record as seen by the adapter
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Severity level name, e.g. `ERROR`
    pub level: String,
    pub message: String,
    pub function: String,
    pub line: u32,
    pub module: String,
    pub file: String,
    pub exception: Option<ExceptionInfo>,
}

impl LogRecord {
    pub fn new(level: log::Level, message: &str) -> Self {
        Self {
            level: level.to_string(),
            message: message.to_string(),
            function: String::new(),
            line: 0,
            module: String::new(),
            file: String::new(),
            exception: None,
        }
    }

    pub fn with_location(mut self, function: &str, module: &str, file: &str, line: u32) -> Self {
        self.function = function.to_string();
        self.module = module.to_string();
        self.file = file.to_string();
        self.line = line;
        self
    }

    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }
}

impl From<&Record<'_>> for LogRecord {
    fn from(record: &Record<'_>) -> Self {
        let module = record.module_path().unwrap_or_else(|| record.target());
        // `log` has no notion of the calling function; the target is the closest thing
        let converted = Self::new(record.level(), &record.args().to_string()).with_location(
            record.target(),
            module,
            record.file().unwrap_or_default(),
            record.line().unwrap_or_default(),
        );

        match attached_error(record, &converted) {
            Some(exception) => converted.with_exception(exception),
            None => converted,
        }
    }
}

/// Error captured under [`ERROR_KEY`], located at the logging call site
fn attached_error(record: &Record<'_>, converted: &LogRecord) -> Option<ExceptionInfo> {
    let value = record.key_values().get(Key::from_str(ERROR_KEY))?;
    let err = value.to_borrowed_error()?;
    let frame = Frame::capture(&converted.function, &converted.module, &converted.file, converted.line);
    Some(ExceptionInfo::from_error(err, frame))
}

/// Fields and request for a record
pub fn record_fields(record: &LogRecord) -> (Vec<(String, Field)>, Option<RequestHandle>) {
    let Some(exception) = &record.exception else {
        let fields = vec![
            ("method".to_string(), record.function.clone().into()),
            ("line".to_string(), record.line.into()),
            ("module".to_string(), record.module.clone().into()),
            ("message".to_string(), record.message.clone().into()),
            ("path".to_string(), record.file.clone().into()),
        ];
        return (fields, resolve_ambient_request());
    };

    let (function, line, module, file, request) = match resolve_request_frame(&exception.frames) {
        Some(frame) => (
            frame.function.clone(),
            frame.line,
            frame.module.clone(),
            frame.file.clone(),
            frame.request.clone(),
        ),
        None => (
            record.function.clone(),
            record.line,
            record.module.clone(),
            record.file.clone(),
            resolve_ambient_request(),
        ),
    };

    let fields = vec![
        ("method".to_string(), function.into()),
        ("line".to_string(), line.into()),
        ("module".to_string(), module.into()),
        ("path".to_string(), file.into()),
        ("message".to_string(), record.message.clone().into()),
        ("status_code".to_string(), exception.status_code().into()),
        ("traceback".to_string(), exception.render_traceback().into()),
    ];
    (fields, request)
}

/// Id of the request's principal, when it is authenticated
fn authenticated_user(request: Option<&RequestHandle>) -> Option<Value> {
    let principal = request?.principal().ok()?;
    if principal.authenticated { principal.id } else { None }
}

/// Builds and dispatches an event per log record
pub struct SplunkHandler {
    dispatcher: Arc<Dispatcher>,
    app_version: Option<String>,
}

impl SplunkHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            app_version: None,
        }
    }

    /// Collector, dispatch mode and app version all from config
    pub fn from_config(config: &SplunkConfig) -> Self {
        let sink: Arc<dyn Sink> = Arc::new(Collector::new(config));
        Self::new(Arc::new(Dispatcher::from_config(config, sink))).with_app_version(config.version.as_deref())
    }

    pub fn with_app_version(mut self, version: Option<&str>) -> Self {
        self.app_version = version.map(str::to_string);
        self
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The event a record turns into, without sending it
    pub fn event_for(&self, record: &LogRecord) -> SplunkEvent {
        let (fields, request) = record_fields(record);
        let user = authenticated_user(request.as_ref());

        SplunkEvent::new(SERVER_LOG_SOURCETYPE)
            .with_name(&record.level)
            .with_request(request)
            .with_obj(Obj::mapping(fields))
            .with_user(user)
            .with_app_version(self.app_version.as_deref())
    }

    pub fn handle(&self, record: &LogRecord) {
        self.event_for(record).send(&self.dispatcher);
    }

    /// Report an error captured with [`ExceptionInfo`]
    pub fn handle_error(&self, level: log::Level, message: &str, exception: ExceptionInfo) {
        self.handle(&LogRecord::new(level, message).with_exception(exception));
    }
}

thread_local! {
    static EMITTING: Cell<bool> = const { Cell::new(false) };
}

/// Holds `EMITTING` for the current thread; released on drop, unwinding included
struct EmitGuard;

impl EmitGuard {
    fn acquire() -> Option<Self> {
        let free = EMITTING.try_with(|emitting| !emitting.replace(true)).ok()?;
        free.then_some(EmitGuard)
    }
}

impl Drop for EmitGuard {
    fn drop(&mut self) {
        let _ = EMITTING.try_with(|emitting| emitting.set(false));
    }
}

/// `log` facade bridge: forwards records to an optional inner logger and to Splunk
pub struct SplunkLogger {
    handler: SplunkHandler,
    level: LevelFilter,
    inner: Option<Box<dyn Log>>,
}

impl SplunkLogger {
    pub fn new(handler: SplunkHandler, level: LevelFilter) -> Self {
        Self {
            handler,
            level,
            inner: None,
        }
    }

    /// Also pass every record to `inner`, e.g. an env_logger
    pub fn with_inner(mut self, inner: Box<dyn Log>) -> Self {
        self.inner = Some(inner);
        self
    }

    /// Install as the global logger
    pub fn init(self, max_level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }

    fn forwards(&self, record: &Record<'_>) -> bool {
        if record.level() > self.level {
            return false;
        }
        let target = record.target();
        !IGNORED_TARGETS
            .iter()
            .any(|ignored| target == *ignored || target.strip_prefix(ignored).is_some_and(|rest| rest.starts_with("::")))
    }
}

impl Log for SplunkLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level || self.inner.as_ref().is_some_and(|inner| inner.enabled(metadata))
    }

    fn log(&self, record: &Record<'_>) {
        if let Some(inner) = &self.inner {
            inner.log(record);
        }

        if !self.forwards(record) {
            return;
        }

        // Anything logged while building or delivering must not come back here
        let Some(_guard) = EmitGuard::acquire() else {
            return;
        };
        // A panicking request accessor must not reach the code that logged
        let _ = catch_unwind(AssertUnwindSafe(|| self.handler.handle(&LogRecord::from(record))));
    }

    fn flush(&self) {
        if let Some(inner) = &self.inner {
            inner.flush();
        }
    }
}
