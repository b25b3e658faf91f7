//! Binding to the native engine's exported entry points.
//!
//! # Design
//! Binding happens once, up front. `NativeEngine` holds the three resolved
//! function pointers, and a value only exists if all three resolved; a
//! missing export is a `ConstructionError`, never a per-call failure. The
//! last-error export is optional: without it, submissions are never refused.
//!
//! Exports can come from anywhere that maps a name to an address: a shared
//! library opened with `libloading` (`load`), or any other lookup (`resolve`).
//! When loaded from a library, the library handle is shared by every clone of
//! the engine and by every in-flight asynchronous call, so the code stays
//! mapped while any of them is alive.

use std::ffi::{c_void, CStr, OsStr};
use std::sync::Arc;

use libloading::Library;
use tracing::debug;

use crate::config::EngineSymbols;
use crate::error::ConstructionError;
use crate::layout::{FreeFn, LastErrorFn, RequestAsyncFn, RequestFn};

#[derive(Debug, Clone)]
pub struct NativeEngine {
    pub(crate) request: RequestFn,
    pub(crate) request_async: RequestAsyncFn,
    pub(crate) free: FreeFn,
    last_error: Option<LastErrorFn>,
    library: Option<Arc<Library>>,
}

impl NativeEngine {
    /// Bind to entry points that are already known, e.g. declared in an
    /// `extern` block of a statically linked engine.
    ///
    /// # Safety
    /// The three functions must implement the engine contract: `free`
    /// releases responses produced by the other two, and `request_async`
    /// invokes its callback exactly once per accepted call.
    pub unsafe fn from_fns(request: RequestFn, request_async: RequestAsyncFn, free: FreeFn) -> Self {
        Self {
            request,
            request_async,
            free,
            last_error: None,
            library: None,
        }
    }

    /// Attach the engine's refusal channel.
    ///
    /// # Safety
    /// `last_error` must follow the [`LastErrorFn`] contract for this engine.
    pub unsafe fn with_last_error(mut self, last_error: LastErrorFn) -> Self {
        self.last_error = Some(last_error);
        self
    }

    /// Resolve each export in `symbols` through `lookup`.
    ///
    /// A lookup returning `None` or a null address is a `MissingExport`,
    /// except for the optional last-error export, which is then left unbound.
    ///
    /// # Safety
    /// Every address `lookup` returns for these names must be a function
    /// with the corresponding engine signature, and must stay valid for as
    /// long as the returned engine (or any clone) is used.
    pub unsafe fn resolve<F>(symbols: &EngineSymbols, mut lookup: F) -> Result<Self, ConstructionError>
    where
        F: FnMut(&str) -> Option<*const c_void>,
    {
        let mut find = |name: &str| match lookup(name) {
            Some(addr) if !addr.is_null() => {
                debug!(symbol = name, ?addr, "resolved engine export");
                Some(addr)
            }
            _ => None,
        };
        let mut require = |name: &str| {
            find(name).ok_or_else(|| ConstructionError::MissingExport {
                symbol: name.to_string(),
            })
        };

        let request = require(&symbols.request)?;
        let request_async = require(&symbols.request_async)?;
        let free = require(&symbols.free)?;
        let last_error = symbols.last_error.as_deref().and_then(&mut find);
        if last_error.is_none() {
            debug!("engine has no last-error export; submissions cannot be refused");
        }

        Ok(Self {
            request: unsafe { std::mem::transmute::<*const c_void, RequestFn>(request) },
            request_async: unsafe { std::mem::transmute::<*const c_void, RequestAsyncFn>(request_async) },
            free: unsafe { std::mem::transmute::<*const c_void, FreeFn>(free) },
            last_error: last_error.map(|addr| unsafe { std::mem::transmute::<*const c_void, LastErrorFn>(addr) }),
            library: None,
        })
    }

    /// Open the shared library at `path` and resolve the engine exports.
    ///
    /// Loading runs the library's initialisers; only load trusted engines.
    /// A loaded engine must refuse submissions through its last-error export:
    /// unwinding out of `request_async` across the library boundary aborts
    /// the host process.
    pub fn load(path: impl AsRef<OsStr>, symbols: &EngineSymbols) -> Result<Self, ConstructionError> {
        let path = path.as_ref();
        let library = unsafe { Library::new(path) }.map_err(|e| ConstructionError::Load {
            path: path.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;

        let engine = unsafe {
            Self::resolve(symbols, |name| {
                library
                    .get::<*const c_void>(name.as_bytes())
                    .ok()
                    .map(|symbol| *symbol)
            })
        }?;

        debug!(path = %path.to_string_lossy(), "loaded native engine");
        Ok(Self {
            library: Some(Arc::new(library)),
            ..engine
        })
    }

    /// Whether the engine can report refused submissions.
    pub fn reports_refusals(&self) -> bool {
        self.last_error.is_some()
    }

    /// The refusal reason left by the last `request_async` on this thread.
    pub(crate) fn take_refusal(&self) -> Option<String> {
        let last_error = self.last_error?;
        let reason = unsafe { last_error() };
        if reason.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(reason) }.to_string_lossy().into_owned())
    }

    pub(crate) fn library(&self) -> Option<Arc<Library>> {
        self.library.clone()
    }
}
