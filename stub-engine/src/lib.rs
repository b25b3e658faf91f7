//! Scriptable native HTTP engine with no network I/O.
//!
//! # Overview
//! Exports the C entry points a host binds to (`httpc`, `httpc_async`,
//! `httpc_free`, `httpc_last_error`) and answers requests from a URL routing
//! table. Hosts and
//! their tests use it in place of a real engine.
//!
//! # Design
//! - `httpc` and `httpc_free` wrap their bodies in `catch_unwind` so panics
//!   never cross the boundary.
//! - `httpc_async` never unwinds. It refuses `stub://reject` (or any call
//!   that panics during submission) by setting the thread-local error read
//!   through `httpc_last_error` and returning without scheduling. Accepted
//!   calls run on their own thread and read the argument buffers there,
//!   after any delay, so they rely on the host keeping those buffers alive
//!   until completion.
//! - Every response handed out is recorded by address. `httpc_free` releases
//!   only recorded addresses and counts anything else as a double free.

mod routes;
pub mod types;

use std::cell::RefCell;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::panic::catch_unwind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use std::thread;

use dashmap::DashMap;

pub use routes::{script, script_null};
pub use types::StubResponse;

use routes::Call;
use types::*;

/// Completion callback the host passes to `httpc_async`.
pub type HttpCallback = unsafe extern "C" fn(response: *mut FfiHttpResponse, context: *mut c_void);

// ---------------------------------------------------------------------------
// Accounting
// ---------------------------------------------------------------------------

/// Address of every response not yet freed, with the URL that produced it.
static LIVE: LazyLock<DashMap<usize, String>> = LazyLock::new(DashMap::new);
static FREED: LazyLock<DashMap<String, usize>> = LazyLock::new(DashMap::new);
static DOUBLE_FREES: AtomicUsize = AtomicUsize::new(0);

/// Responses for `url` handed out and not yet freed.
pub fn live(url: &str) -> usize {
    LIVE.iter().filter(|entry| entry.value() == url).count()
}

/// Responses for `url` released through `httpc_free`.
pub fn freed(url: &str) -> usize {
    FREED.get(url).map(|n| *n).unwrap_or(0)
}

/// Frees of pointers this engine never handed out or already released.
pub fn double_frees() -> usize {
    DOUBLE_FREES.load(Ordering::SeqCst)
}

/// Address of an exported entry point by its C name.
pub fn symbol(name: &str) -> Option<*const c_void> {
    match name {
        "httpc" => Some(httpc as *const c_void),
        "httpc_async" => Some(httpc_async as *const c_void),
        "httpc_free" => Some(httpc_free as *const c_void),
        "httpc_last_error" => Some(httpc_last_error as *const c_void),
        _ => None,
    }
}

fn respond(call: &Call) -> *mut FfiHttpResponse {
    match routes::route(call) {
        None => std::ptr::null_mut(),
        Some(reply) => {
            let raw = reply.into_raw();
            LIVE.insert(raw as usize, call.url.clone());
            raw
        }
    }
}

// ---------------------------------------------------------------------------
// Last error
// ---------------------------------------------------------------------------

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: String) {
    let message = CString::new(message.replace('\0', "")).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

// ---------------------------------------------------------------------------
// Argument reading
// ---------------------------------------------------------------------------

unsafe fn read_bytes(s: *const c_char) -> Option<Vec<u8>> {
    if s.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(s) }.to_bytes().to_vec())
}

unsafe fn read_string(s: *const c_char) -> String {
    unsafe { read_bytes(s) }
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}

unsafe fn read_headers(table: *const FfiHeaders) -> Option<Vec<RawHeader>> {
    if table.is_null() {
        return None;
    }
    let table = unsafe { &*table };
    if table.items.is_null() || table.count == 0 {
        return Some(Vec::new());
    }
    let items = unsafe { std::slice::from_raw_parts(table.items, table.count) };
    Some(
        items
            .iter()
            .map(|item| unsafe { (read_bytes(item.key), read_bytes(item.value)) })
            .collect(),
    )
}

/// The four request arguments as the host passed them.
#[derive(Clone, Copy)]
struct Args {
    method: *const c_char,
    url: *const c_char,
    headers: *const FfiHeaders,
    body: *const c_char,
}

// The host keeps every argument buffer alive until the completion fires.
unsafe impl Send for Args {}

impl Args {
    unsafe fn read(self) -> Call {
        unsafe {
            Call {
                method: read_string(self.method),
                url: read_string(self.url),
                headers: read_headers(self.headers),
                body: read_bytes(self.body),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Exported entry points
// ---------------------------------------------------------------------------

/// Perform a request and return the response, or null.
///
/// The caller must release a non-null result with `httpc_free`.
#[unsafe(no_mangle)]
pub extern "C" fn httpc(
    method: *const c_char,
    url: *const c_char,
    headers: *const FfiHeaders,
    body: *const c_char,
) -> *mut FfiHttpResponse {
    catch_unwind(|| {
        let call = unsafe { Args { method, url, headers, body }.read() };
        if let Some(wait) = routes::delay(&call.url) {
            thread::sleep(wait);
        }
        respond(&call)
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Schedule a request; `callback(response, context)` runs exactly once on a
/// worker thread.
///
/// Refuses `stub://reject` without scheduling anything: the callback never
/// runs and `httpc_last_error` returns the reason on this thread.
#[unsafe(no_mangle)]
pub extern "C" fn httpc_async(
    callback: Option<HttpCallback>,
    context: *mut c_void,
    method: *const c_char,
    url: *const c_char,
    headers: *const FfiHeaders,
    body: *const c_char,
) {
    clear_last_error();
    let submitted = catch_unwind(|| {
        let target = unsafe { read_string(url) };
        if routes::is_reject(&target) {
            return Err(format!("stub engine refused {target}"));
        }
        let Some(callback) = callback else {
            return Err("no completion callback".to_string());
        };

        let args = Args { method, url, headers, body };
        let context = context as usize;
        thread::spawn(move || {
            if let Some(wait) = routes::delay(&target) {
                thread::sleep(wait);
            }
            let response = catch_unwind(|| respond(&unsafe { args.read() })).unwrap_or(std::ptr::null_mut());
            unsafe { callback(response, context as *mut c_void) };
        });
        Ok(())
    });

    match submitted {
        Ok(Ok(())) => {}
        Ok(Err(reason)) => set_last_error(reason),
        Err(_) => set_last_error("stub engine panicked during submission".to_string()),
    }
}

/// Reason the last `httpc_async` call on this thread was refused, or null if
/// it was accepted. Valid until the next `httpc_async` call on this thread.
#[unsafe(no_mangle)]
pub extern "C" fn httpc_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(std::ptr::null(), |message| message.as_ptr()))
}

/// Release a response returned by `httpc` or passed to a callback. Safe to
/// call with null.
#[unsafe(no_mangle)]
pub extern "C" fn httpc_free(response: *mut FfiHttpResponse) {
    if response.is_null() {
        return;
    }
    let _ = catch_unwind(|| match LIVE.remove(&(response as usize)) {
        Some((_, url)) => {
            unsafe { free_raw(response) };
            *FREED.entry(url).or_insert(0) += 1;
        }
        None => {
            DOUBLE_FREES.fetch_add(1, Ordering::SeqCst);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    #[test]
    fn httpc_status_then_free() {
        let (method, url) = (c("GET"), c("stub://status/418"));
        let resp = httpc(method.as_ptr(), url.as_ptr(), std::ptr::null(), std::ptr::null());
        assert!(!resp.is_null());
        assert_eq!(unsafe { (*resp).status }, 418);
        assert_eq!(live("stub://status/418"), 1);

        httpc_free(resp);
        assert_eq!(live("stub://status/418"), 0);
        assert_eq!(freed("stub://status/418"), 1);
    }

    #[test]
    fn httpc_null_route() {
        let (method, url) = (c("GET"), c("stub://null"));
        let resp = httpc(method.as_ptr(), url.as_ptr(), std::ptr::null(), std::ptr::null());
        assert!(resp.is_null());
    }

    #[test]
    fn httpc_free_null_is_noop() {
        httpc_free(std::ptr::null_mut());
    }

    #[test]
    fn untracked_free_is_counted_not_released() {
        let foreign = StubResponse::new(200).into_raw();
        let before = double_frees();
        httpc_free(foreign);
        assert!(double_frees() > before);
        unsafe { free_raw(foreign) };
    }

    #[test]
    fn echo_reads_header_table() {
        let (key, value) = (c("Accept"), c("*/*"));
        let mut items = [FfiHeaderItem {
            key: key.as_ptr() as *mut c_char,
            value: value.as_ptr() as *mut c_char,
        }];
        let table = FfiHeaders {
            items: items.as_mut_ptr(),
            count: 1,
        };
        let (method, url, body) = (c("POST"), c("stub://echo"), c("ping"));
        let resp = httpc(method.as_ptr(), url.as_ptr(), &table, body.as_ptr());

        let r = unsafe { &*resp };
        assert_eq!(unsafe { CStr::from_ptr(r.body) }.to_str().unwrap(), "ping");
        let echoed = unsafe { &*r.headers };
        assert_eq!(echoed.count, 1);
        let item = unsafe { &*echoed.items };
        assert_eq!(unsafe { CStr::from_ptr(item.key) }.to_str().unwrap(), "Accept");
        httpc_free(resp);
    }

    static DONE: LazyLock<std::sync::Mutex<Option<mpsc::Sender<usize>>>> =
        LazyLock::new(|| std::sync::Mutex::new(None));

    unsafe extern "C" fn record(response: *mut FfiHttpResponse, context: *mut c_void) {
        let status = if response.is_null() { 0 } else { unsafe { (*response).status } };
        httpc_free(response);
        if let Some(tx) = DONE.lock().unwrap().as_ref() {
            let _ = tx.send(context as usize * 1000 + status as usize);
        }
    }

    #[test]
    fn async_calls_back_once_with_context() {
        let (tx, rx) = mpsc::channel();
        *DONE.lock().unwrap() = Some(tx);

        let (method, url) = (c("GET"), c("stub://delay/10/x"));
        httpc_async(
            Some(record),
            7 as *mut c_void,
            method.as_ptr(),
            url.as_ptr(),
            std::ptr::null(),
            std::ptr::null(),
        );
        let got = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(got, 7200);
        assert!(rx.recv_timeout(std::time::Duration::from_millis(50)).is_err());
    }

    #[test]
    fn async_reject_sets_last_error() {
        let (method, url) = (c("GET"), c("stub://reject"));
        httpc_async(
            Some(record),
            std::ptr::null_mut(),
            method.as_ptr(),
            url.as_ptr(),
            std::ptr::null(),
            std::ptr::null(),
        );
        let reason = httpc_last_error();
        assert!(!reason.is_null());
        assert_eq!(
            unsafe { CStr::from_ptr(reason) }.to_str().unwrap(),
            "stub engine refused stub://reject"
        );

        let ok = c("stub://null");
        httpc_async(
            Some(record),
            std::ptr::null_mut(),
            method.as_ptr(),
            ok.as_ptr(),
            std::ptr::null(),
            std::ptr::null(),
        );
        assert!(httpc_last_error().is_null());
    }

    #[test]
    fn async_without_callback_is_refused() {
        let (method, url) = (c("GET"), c("stub://status/200"));
        httpc_async(None, std::ptr::null_mut(), method.as_ptr(), url.as_ptr(), std::ptr::null(), std::ptr::null());
        assert!(!httpc_last_error().is_null());
    }

    #[test]
    fn symbols_resolve() {
        assert!(symbol("httpc").is_some());
        assert!(symbol("httpc_async").is_some());
        assert!(symbol("httpc_free").is_some());
        assert!(symbol("httpc_last_error").is_some());
        assert!(symbol("httpc_v2").is_none());
    }
}
