//! Request context resolution
//!
//! Requests are propagated explicitly: the framework integration enters a
//! [`RequestScope`] when it starts handling a request, and anything logged
//! on that thread can find it again with [`resolve_ambient_request`].
//!
//! Errors carry their own context. A [`Frame`] is captured wherever an error
//! is first caught or wrapped, recording the request that was in scope at
//! that point, so the log site does not need the request at all.

use std::cell::RefCell;
use std::error::Error;
use std::marker::PhantomData;

use crate::request::RequestHandle;

/// How many enclosing scopes are considered when resolving the ambient request
pub const MAX_FRAME_DEPTH: usize = 8;

thread_local! {
    static SCOPES: RefCell<Vec<RequestHandle>> = const { RefCell::new(Vec::new()) };
}

/// Marks a request as in scope for the current thread until dropped
#[must_use = "the request leaves scope as soon as the guard is dropped"]
pub struct RequestScope {
    pushed: bool,
    // Scopes are thread-bound; the guard must not move to another thread
    _not_send: PhantomData<*const ()>,
}

impl RequestScope {
    pub fn enter(request: RequestHandle) -> Self {
        let pushed = SCOPES
            .try_with(|scopes| match scopes.try_borrow_mut() {
                Ok(mut scopes) => {
                    scopes.push(request);
                    true
                }
                Err(_) => false,
            })
            .unwrap_or(false);

        Self {
            pushed,
            _not_send: PhantomData,
        }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if !self.pushed {
            return;
        }
        let _ = SCOPES.try_with(|scopes| {
            if let Ok(mut scopes) = scopes.try_borrow_mut() {
                scopes.pop();
            }
        });
    }
}

/// Run `f` with `request` in scope
pub fn with_request<R>(request: RequestHandle, f: impl FnOnce() -> R) -> R {
    let _scope = RequestScope::enter(request);
    f()
}

/// Find the request in scope for the current thread.
///
/// Only the innermost [`MAX_FRAME_DEPTH`] scopes are considered, and the
/// outermost of those wins. Never panics; any failure reads as "no request".
pub fn resolve_ambient_request() -> Option<RequestHandle> {
    SCOPES
        .try_with(|scopes| {
            let scopes = scopes.try_borrow().ok()?;
            let start = scopes.len().saturating_sub(MAX_FRAME_DEPTH);
            scopes.get(start).cloned()
        })
        .ok()
        .flatten()
}

/// Source location of a call site, plus the request it could see
#[derive(Debug, Clone)]
pub struct Frame {
    pub function: String,
    pub line: u32,
    pub module: String,
    pub file: String,
    pub request: Option<RequestHandle>,
}

impl Frame {
    pub fn new(function: &str, module: &str, file: &str, line: u32) -> Self {
        Self {
            function: function.to_string(),
            line,
            module: module.to_string(),
            file: file.to_string(),
            request: None,
        }
    }

    /// Like [`Frame::new`], binding whatever request is currently in scope
    pub fn capture(function: &str, module: &str, file: &str, line: u32) -> Self {
        Self::new(function, module, file, line).with_request(resolve_ambient_request())
    }

    pub fn with_request(mut self, request: Option<RequestHandle>) -> Self {
        self.request = request;
        self
    }
}

/// Capture a [`Frame`] for the calling function.
///
/// ```ignore
/// let frame = splunk_logging::frame!("create_order");
/// ```
#[macro_export]
macro_rules! frame {
    ($function:expr) => {
        $crate::context::Frame::capture($function, module_path!(), file!(), line!())
    };
}

/// Everything the log adapter needs to report an error
#[derive(Debug, Clone)]
pub struct ExceptionInfo {
    pub type_name: String,
    /// HTTP status the error maps to, if its type defines one
    pub http_status: Option<u16>,
    /// Outermost first
    pub frames: Vec<Frame>,
    pub traceback: Option<String>,
}

impl ExceptionInfo {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            http_status: None,
            frames: Vec::new(),
            traceback: None,
        }
    }

    /// Capture an error where it is first caught. The source chain becomes the traceback text.
    pub fn from_error<E: Error + ?Sized>(err: &E, frame: Frame) -> Self {
        let mut text = format!("{}: {}", std::any::type_name::<E>(), err);
        let mut source = err.source();
        while let Some(cause) = source {
            text.push_str(&format!("\n  caused by: {}", cause));
            source = cause.source();
        }

        Self {
            type_name: std::any::type_name::<E>().to_string(),
            http_status: None,
            frames: vec![frame],
            traceback: Some(text),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Record a frame the error propagated through on its way out
    pub fn with_outer_frame(mut self, frame: Frame) -> Self {
        self.frames.insert(0, frame);
        self
    }

    pub fn with_frames(mut self, frames: Vec<Frame>) -> Self {
        self.frames = frames;
        self
    }

    pub fn status_code(&self) -> u16 {
        self.http_status.unwrap_or(500)
    }

    /// Traceback text followed by the captured frames, outermost first
    pub fn render_traceback(&self) -> String {
        let mut out = self.traceback.clone().unwrap_or_else(|| self.type_name.clone());
        for frame in &self.frames {
            out.push_str(&format!(
                "\n  at {}::{} ({}:{})",
                frame.module, frame.function, frame.file, frame.line
            ));
        }
        out
    }
}

/// Pick the frame that best describes where an error happened.
///
/// Walks from the outermost frame inward and keeps the last frame that had a
/// request bound. Deep helpers rarely see the request, so this is usually
/// the handler or wrapper that called them rather than the innermost frame.
/// Falls back to the outermost frame; `None` only for an empty chain.
pub fn resolve_request_frame(frames: &[Frame]) -> Option<&Frame> {
    let (outermost, inner) = frames.split_first()?;
    Some(inner.iter().rfind(|frame| frame.request.is_some()).unwrap_or(outermost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{HttpRequest, RequestInfo};
    use std::sync::Arc;

    fn request(path: &str) -> RequestHandle {
        Arc::new(RequestInfo::new("GET", "example.com", path))
    }

    #[test]
    fn test_no_ambient_request() {
        assert!(resolve_ambient_request().is_none());
    }

    #[test]
    fn test_scope_enter_and_leave() {
        {
            let _scope = RequestScope::enter(request("/a"));
            let found = resolve_ambient_request().expect("request in scope");
            assert_eq!(found.full_path(), "/a");
        }
        assert!(resolve_ambient_request().is_none());
    }

    #[test]
    fn test_outermost_scope_wins() {
        with_request(request("/outer"), || {
            with_request(request("/inner"), || {
                let found = resolve_ambient_request().unwrap();
                assert_eq!(found.full_path(), "/outer");
            });
        });
    }

    #[test]
    fn test_depth_bound() {
        let guards: Vec<_> = (0..10)
            .map(|i| RequestScope::enter(request(&format!("/{}", i))))
            .collect();

        // Ten scopes deep, only the innermost eight are visible
        let found = resolve_ambient_request().unwrap();
        assert_eq!(found.full_path(), "/2");
        drop(guards);
    }

    #[test]
    fn test_scope_is_thread_local() {
        let _scope = RequestScope::enter(request("/main"));
        let seen = std::thread::spawn(|| resolve_ambient_request().is_some()).join().unwrap();
        assert!(!seen);
    }

    #[test]
    fn test_resolve_frame_picks_intermediate_frame_with_request() {
        let frames = vec![
            Frame::new("dispatch", "app::server", "server.rs", 10),
            Frame::new("create_order", "app::views", "views.rs", 42).with_request(Some(request("/orders"))),
            Frame::new("to_json", "app::serialize", "serialize.rs", 7),
        ];

        let frame = resolve_request_frame(&frames).unwrap();
        assert_eq!(frame.function, "create_order");
        assert_eq!(frame.request.as_ref().unwrap().full_path(), "/orders");
    }

    #[test]
    fn test_resolve_frame_defaults_to_outermost() {
        let frames = vec![
            Frame::new("dispatch", "app::server", "server.rs", 10),
            Frame::new("to_json", "app::serialize", "serialize.rs", 7),
        ];
        assert_eq!(resolve_request_frame(&frames).unwrap().function, "dispatch");
    }

    #[test]
    fn test_resolve_frame_empty_chain() {
        assert!(resolve_request_frame(&[]).is_none());
    }

    #[test]
    fn test_frame_macro_captures_ambient_request() {
        with_request(request("/macro"), || {
            let frame = crate::frame!("handler");
            assert_eq!(frame.function, "handler");
            assert_eq!(frame.module, module_path!());
            assert!(frame.request.is_some());
        });
    }

    #[test]
    fn test_exception_from_error_chain() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing fixture");
        let info = ExceptionInfo::from_error(&err, Frame::new("load", "app", "app.rs", 3));

        assert_eq!(info.status_code(), 500);
        assert!(info.type_name.contains("io::error::Error"));
        let rendered = info.render_traceback();
        assert!(rendered.contains("missing fixture"));
        assert!(rendered.contains("at app::load (app.rs:3)"));
    }

    #[test]
    fn test_exception_custom_status() {
        let info = ExceptionInfo::new("NotFound").with_status(404);
        assert_eq!(info.status_code(), 404);
    }
}
