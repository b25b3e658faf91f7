//! Blocking and asynchronous request entry points.
//!
//! # Design
//! `Client` is a bound engine plus configuration and carries no per-request
//! state. Each call runs encode, native call, decode, free:
//!
//! - `request` blocks the calling thread for the native round trip. The
//!   encoded buffers live on its stack frame until the engine returns, and
//!   the response is released through `OwnedResponse` on every exit path.
//! - `request_async` moves the encoded buffers into the callback registry,
//!   submits, and returns a `PendingResponse`. The engine later calls
//!   `on_complete` on a thread of its choosing, which takes the entry out of
//!   the registry, decodes, frees, and resolves the future. A submission
//!   the engine refuses, through its last-error export or by unwinding,
//!   resolves to `SubmissionError::Rejected` instead.
//!
//! Undecodable or null responses become `None`. Only encoding, construction
//! and submission failures are reported as errors.

use std::ffi::{c_void, OsStr};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::config::ClientConfig;
use crate::engine::NativeEngine;
use crate::error::{ConstructionError, DecodeFailure, EncodeError, SubmissionError};
use crate::layout::NativeResponse;
use crate::registry::{self, CallId, PendingCall};
use crate::request::{self, BodyArg, HeadersArg, HttpRequest};
use crate::response::{HttpResponse, OwnedResponse};

#[derive(Debug, Clone)]
pub struct Client {
    engine: NativeEngine,
    config: ClientConfig,
}

impl Client {
    pub fn new(engine: NativeEngine) -> Self {
        Self::with_config(engine, ClientConfig::default())
    }

    pub fn with_config(engine: NativeEngine, config: ClientConfig) -> Self {
        Self { engine, config }
    }

    /// Load the engine library at `path` using the default export names.
    pub fn load(path: impl AsRef<OsStr>) -> Result<Self, ConstructionError> {
        Self::load_with_config(path, ClientConfig::default())
    }

    pub fn load_with_config(path: impl AsRef<OsStr>, config: ClientConfig) -> Result<Self, ConstructionError> {
        let engine = NativeEngine::load(path, &config.symbols)?;
        Ok(Self::with_config(engine, config))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Perform a request, blocking until the engine returns.
    ///
    /// `Ok(None)` means the engine produced no usable response.
    pub fn request(
        &self,
        method: &str,
        url: &str,
        headers: impl Into<HeadersArg>,
        body: impl Into<BodyArg>,
    ) -> Result<Option<HttpResponse>, EncodeError> {
        let request = HttpRequest::new(method, url).headers(headers).body(body);
        self.send(&request)
    }

    pub fn send(&self, request: &HttpRequest) -> Result<Option<HttpResponse>, EncodeError> {
        let encoded = request::encode(request, self.config.empty_headers)?;
        debug!(method = %request.method, url = %request.url, "sending blocking request");

        let raw = unsafe {
            (self.engine.request)(
                encoded.method_ptr(),
                encoded.url_ptr(),
                encoded.headers_ptr(),
                encoded.body_ptr(),
            )
        };
        // Safe to release the request buffers from here on.
        drop(encoded);

        let response = unsafe { OwnedResponse::new(raw, self.engine.free) };
        Ok(settle(response.decode(), None))
    }

    /// Submit a request without blocking.
    ///
    /// The returned future resolves once the engine invokes its completion
    /// callback. Dropping the future does not cancel the native call.
    pub fn request_async(
        &self,
        method: &str,
        url: &str,
        headers: impl Into<HeadersArg>,
        body: impl Into<BodyArg>,
    ) -> PendingResponse {
        let request = HttpRequest::new(method, url).headers(headers).body(body);
        self.send_async(&request)
    }

    pub fn send_async(&self, request: &HttpRequest) -> PendingResponse {
        let encoded = match request::encode(request, self.config.empty_headers) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(method = %request.method, url = %request.url, error = %e, "request not submitted");
                return PendingResponse::failed(e.into());
            }
        };

        let (method, url) = (encoded.method_ptr(), encoded.url_ptr());
        let (headers, body) = (encoded.headers_ptr(), encoded.body_ptr());
        let (tx, rx) = oneshot::channel();

        let registry = registry::global();
        let call = PendingCall::new(encoded, self.engine.free, tx).retaining(self.engine.library());
        let id = registry.register(call);
        debug!(%id, method = %request.method, url = %request.url, "submitting request");

        let submit = self.engine.request_async;
        let submitted = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
            submit(on_complete, id.as_context(), method, url, headers, body)
        }));

        let refusal = match submitted {
            Ok(()) => self.engine.take_refusal(),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };
        match refusal {
            None => PendingResponse::waiting(id, rx),
            Some(reason) => {
                // No completion will ever fire for this id.
                registry.take(id);
                warn!(%id, %reason, "native engine rejected submission");
                PendingResponse::failed(SubmissionError::Rejected(reason))
            }
        }
    }
}

/// Completion callback handed to the engine for every asynchronous request.
unsafe extern "C" fn on_complete(response: *mut NativeResponse, context: *mut c_void) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| complete(response, context)));
    if outcome.is_err() {
        error!("panic while completing native request");
    }
}

fn complete(response: *mut NativeResponse, context: *mut c_void) {
    let Some(id) = CallId::from_context(context) else {
        warn!(null_response = response.is_null(), "completion without a call id; response leaked");
        return;
    };
    let Some(call) = registry::global().take(id) else {
        warn!(%id, null_response = response.is_null(), "completion for unknown call; response leaked");
        return;
    };

    let PendingCall {
        request,
        free,
        completion,
        library,
    } = call;
    let decoded = {
        let owned = unsafe { OwnedResponse::new(response, free) };
        settle(owned.decode(), Some(id))
    };
    drop(request);
    drop(library);

    debug!(%id, status = ?decoded.as_ref().map(|r| r.status), "request completed");
    if completion.send(decoded).is_err() {
        debug!(%id, "response dropped; caller stopped waiting");
    }
}

fn settle(result: Result<HttpResponse, DecodeFailure>, id: Option<CallId>) -> Option<HttpResponse> {
    match result {
        Ok(response) => Some(response),
        Err(DecodeFailure::NullResponse) => {
            debug!(id = ?id, "engine returned no response");
            None
        }
        Err(e) => {
            warn!(id = ?id, error = %e, "discarding undecodable response");
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Future returned by `Client::request_async`.
#[derive(Debug)]
pub struct PendingResponse {
    state: Pending,
}

#[derive(Debug)]
enum Pending {
    Waiting {
        id: CallId,
        rx: oneshot::Receiver<Option<HttpResponse>>,
    },
    Failed(Option<SubmissionError>),
}

impl PendingResponse {
    fn waiting(id: CallId, rx: oneshot::Receiver<Option<HttpResponse>>) -> Self {
        Self {
            state: Pending::Waiting { id, rx },
        }
    }

    fn failed(error: SubmissionError) -> Self {
        Self {
            state: Pending::Failed(Some(error)),
        }
    }

    /// Registry id of the submitted call; `None` if submission failed.
    pub fn call_id(&self) -> Option<CallId> {
        match &self.state {
            Pending::Waiting { id, .. } => Some(*id),
            Pending::Failed(_) => None,
        }
    }
}

impl Future for PendingResponse {
    type Output = Result<Option<HttpResponse>, SubmissionError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            Pending::Waiting { rx, .. } => Pin::new(rx)
                .poll(cx)
                .map(|received| received.map_err(|_| SubmissionError::Abandoned)),
            Pending::Failed(error) => Poll::Ready(Err(error.take().unwrap_or(SubmissionError::Abandoned))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{CompletionFn, NativeHeaderTable};
    use std::cell::Cell;
    use std::ffi::CStr;
    use std::os::raw::c_char;
    use std::ptr;

    thread_local! {
        static SEEN_BODY: Cell<bool> = const { Cell::new(false) };
        static FREED: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "C" fn echo_status(
        method: *const c_char,
        _: *const c_char,
        _: *const NativeHeaderTable,
        body: *const c_char,
    ) -> *mut NativeResponse {
        SEEN_BODY.with(|s| s.set(!body.is_null()));
        let method = unsafe { CStr::from_ptr(method) }.to_str().unwrap();
        let status = if method == "GET" { 200 } else { 405 };
        Box::into_raw(Box::new(NativeResponse {
            body: ptr::null(),
            status,
            content_type: ptr::null(),
            headers: ptr::null(),
        }))
    }

    unsafe extern "C-unwind" fn complete_inline(
        callback: CompletionFn,
        context: *mut c_void,
        _: *const c_char,
        _: *const c_char,
        _: *const NativeHeaderTable,
        _: *const c_char,
    ) {
        unsafe { callback(ptr::null_mut(), context) };
    }

    unsafe extern "C-unwind" fn refuse(
        _: CompletionFn,
        _: *mut c_void,
        _: *const c_char,
        _: *const c_char,
        _: *const NativeHeaderTable,
        _: *const c_char,
    ) {
        panic!("queue full");
    }

    unsafe extern "C-unwind" fn drop_on_floor(
        _: CompletionFn,
        _: *mut c_void,
        _: *const c_char,
        _: *const c_char,
        _: *const NativeHeaderTable,
        _: *const c_char,
    ) {
    }

    unsafe extern "C" fn busy() -> *const c_char {
        c"engine busy".as_ptr()
    }

    unsafe extern "C" fn accepted() -> *const c_char {
        ptr::null()
    }

    unsafe extern "C" fn free_box(resp: *mut NativeResponse) {
        FREED.with(|f| f.set(f.get() + 1));
        drop(unsafe { Box::from_raw(resp) });
    }

    fn client(request_async: crate::layout::RequestAsyncFn) -> Client {
        Client::new(unsafe { NativeEngine::from_fns(echo_status, request_async, free_box) })
    }

    #[test]
    fn blocking_request_decodes_and_frees() {
        let before = FREED.with(Cell::get);
        let resp = client(complete_inline).request("GET", "stub://x", (), "payload").unwrap().unwrap();
        assert_eq!(resp.status, 200);
        assert!(SEEN_BODY.with(Cell::get));
        assert_eq!(FREED.with(Cell::get) - before, 1);
    }

    #[test]
    fn encode_error_is_returned_before_native_call() {
        let err = client(complete_inline).request("GET", "stub://\0", (), ()).unwrap_err();
        assert!(matches!(err, EncodeError::InteriorNul { .. }));
    }

    #[tokio::test]
    async fn inline_completion_resolves_to_absent() {
        let pending = client(complete_inline).request_async("GET", "stub://x", (), ());
        let id = pending.call_id().unwrap();
        assert_eq!(pending.await, Ok(None));
        assert!(!registry::global().contains(id));
    }

    #[tokio::test]
    async fn rejected_submission_is_deregistered() {
        let pending = client(refuse).request_async("GET", "stub://x", (), ());
        assert!(pending.call_id().is_none());
        assert_eq!(pending.await, Err(SubmissionError::Rejected("queue full".to_string())));
    }

    #[tokio::test]
    async fn refusal_through_last_error_is_rejected() {
        let engine = unsafe { NativeEngine::from_fns(echo_status, drop_on_floor, free_box).with_last_error(busy) };
        let pending = Client::new(engine).request_async("GET", "stub://x", (), ());
        assert!(pending.call_id().is_none());
        assert_eq!(pending.await, Err(SubmissionError::Rejected("engine busy".to_string())));
    }

    #[tokio::test]
    async fn null_last_error_means_accepted() {
        let engine = unsafe { NativeEngine::from_fns(echo_status, complete_inline, free_box).with_last_error(accepted) };
        let pending = Client::new(engine).request_async("GET", "stub://x", (), ());
        assert!(pending.call_id().is_some());
        assert_eq!(pending.await, Ok(None));
    }

    #[tokio::test]
    async fn encode_failure_rejects_without_registering() {
        let pending = client(complete_inline).request_async("G\0ET", "stub://x", (), ());
        assert!(pending.call_id().is_none());
        assert!(matches!(pending.await, Err(SubmissionError::Encode(_))));
    }

    #[test]
    fn completion_with_unknown_context_is_ignored() {
        unsafe { on_complete(ptr::null_mut(), ptr::null_mut()) };
        unsafe { on_complete(ptr::null_mut(), usize::MAX as *mut c_void) };
    }
}
