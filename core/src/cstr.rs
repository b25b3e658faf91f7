//! C string conversions shared by the encoder and decoder.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::error::{DecodeFailure, EncodeError, RequestField, ResponseField};

/// Copy `bytes` into a freshly allocated NUL-terminated buffer.
pub(crate) fn to_c_string(bytes: impl Into<Vec<u8>>, field: RequestField) -> Result<CString, EncodeError> {
    CString::new(bytes).map_err(|e| EncodeError::InteriorNul {
        field,
        position: e.nul_position(),
    })
}

/// Read a borrowed NUL-terminated UTF-8 string. Null decodes to `None`.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated buffer that stays valid
/// for the duration of the call.
pub(crate) unsafe fn read_utf8(ptr: *const c_char, field: ResponseField) -> Result<Option<String>, DecodeFailure> {
    if ptr.is_null() {
        return Ok(None);
    }
    let raw = unsafe { CStr::from_ptr(ptr) };
    raw.to_str()
        .map(|s| Some(s.to_owned()))
        .map_err(|_| DecodeFailure::InvalidUtf8 { field })
}
