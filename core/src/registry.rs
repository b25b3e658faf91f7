//! Process-wide table of in-flight asynchronous requests.
//!
//! # Design
//! Every asynchronous submission registers a `PendingCall` that owns the
//! encoded request buffers and the sender half of the caller's future. The
//! entry is the only thing keeping those alive while the engine works, and it
//! is removed exactly once: by the completion callback, or by the client when
//! submission fails.
//!
//! The engine gets the call's `CallId` as its opaque context pointer. The id is
//! a value, not an address, so a stray or repeated completion can only miss
//! the lookup; it never touches freed memory.

use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use libloading::Library;
use tokio::sync::oneshot;

use crate::layout::FreeFn;
use crate::request::EncodedRequest;
use crate::response::HttpResponse;

/// Identity of one asynchronous request. Never zero, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(usize);

impl CallId {
    fn next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(1);
        CallId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_context(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    /// Recover an id from a context pointer. Null is never a valid id.
    pub fn from_context(context: *mut c_void) -> Option<Self> {
        let raw = context as usize;
        (raw != 0).then_some(CallId(raw))
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// State kept alive between submission and completion.
#[derive(Debug)]
pub struct PendingCall {
    pub(crate) request: EncodedRequest,
    pub(crate) free: FreeFn,
    pub(crate) completion: oneshot::Sender<Option<HttpResponse>>,
    /// Keeps a loaded engine mapped until its `free` has run.
    pub(crate) library: Option<Arc<Library>>,
}

impl PendingCall {
    pub fn new(request: EncodedRequest, free: FreeFn, completion: oneshot::Sender<Option<HttpResponse>>) -> Self {
        Self {
            request,
            free,
            completion,
            library: None,
        }
    }

    pub(crate) fn retaining(mut self, library: Option<Arc<Library>>) -> Self {
        self.library = library;
        self
    }
}

#[derive(Debug, Default)]
pub struct CallbackRegistry {
    calls: DashMap<CallId, PendingCall>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `call` under a fresh id.
    pub fn register(&self, call: PendingCall) -> CallId {
        let id = CallId::next();
        self.calls.insert(id, call);
        id
    }

    /// Remove and return the call registered under `id`.
    pub fn take(&self, id: CallId) -> Option<PendingCall> {
        self.calls.remove(&id).map(|(_, call)| call)
    }

    pub fn contains(&self, id: CallId) -> bool {
        self.calls.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

static GLOBAL: LazyLock<CallbackRegistry> = LazyLock::new(CallbackRegistry::new);

/// The registry every client submits through.
pub fn global() -> &'static CallbackRegistry {
    &GLOBAL
}

/// Number of asynchronous requests awaiting completion, process-wide.
pub fn pending() -> usize {
    GLOBAL.len()
}
