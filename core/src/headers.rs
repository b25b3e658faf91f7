//! Header mapping and its native header-table codec.
//!
//! # Design
//! `HeaderMap` is an ordered list of pairs, like the plain `Vec<(String, String)>`
//! headers of a request, with one rule on top: inserting an existing key
//! replaces the value where the key first appeared. Decoding therefore yields
//! "last native entry wins, first position kept" when lower-cased keys collide.
//!
//! Encoding keeps the caller's key casing; the engine decides wire casing.
//! Decoding lower-cases keys so lookups are case-insensitive.

use std::collections::HashMap;
use std::ffi::CString;
use std::ptr;

use serde::{Deserialize, Serialize};

use crate::config::EmptyHeaders;
use crate::cstr::{read_utf8, to_c_string};
use crate::error::{DecodeFailure, EncodeError, RequestField, ResponseField};
use crate::layout::{NativeHeaderItem, NativeHeaderTable};

/// Ordered header mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderMap<V = String> {
    entries: Vec<(String, V)>,
}

impl<V> HeaderMap<V> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Insert or replace. An identical key keeps its original position.
    ///
    /// Linear in the number of entries.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// ASCII-case-insensitive lookup. An exact match wins over a folded one.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .or_else(|| self.entries.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)))
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<V> Default for HeaderMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for HeaderMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V> IntoIterator for HeaderMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A native header table together with every buffer it points into.
///
/// The table pointer is valid for as long as this value is alive. Moving it
/// does not move the heap buffers the pointer refers to.
#[derive(Debug)]
pub struct EncodedHeaders {
    table: Box<NativeHeaderTable>,
    _items: Box<[NativeHeaderItem]>,
    _strings: Vec<CString>,
}

// The raw pointers only refer to buffers owned by the same value, and
// nothing mutates them after construction.
unsafe impl Send for EncodedHeaders {}
unsafe impl Sync for EncodedHeaders {}

impl EncodedHeaders {
    pub fn as_ptr(&self) -> *const NativeHeaderTable {
        &*self.table
    }

    pub fn len(&self) -> usize {
        self.table.count
    }

    pub fn is_empty(&self) -> bool {
        self.table.count == 0
    }
}

/// Encode `headers` into a native table.
///
/// Returns `Ok(None)` (a null table argument) for an empty mapping unless
/// `empty` asks for a zero-length table.
pub fn encode(headers: &HeaderMap<String>, empty: EmptyHeaders) -> Result<Option<EncodedHeaders>, EncodeError> {
    if headers.is_empty() && empty == EmptyHeaders::Null {
        return Ok(None);
    }

    let mut strings = Vec::with_capacity(headers.len() * 2);
    let mut items = Vec::with_capacity(headers.len());
    for (key, value) in headers.iter() {
        let key = to_c_string(key, RequestField::HeaderKey)?;
        let value = to_c_string(value.as_str(), RequestField::HeaderValue)?;
        items.push(NativeHeaderItem {
            key: key.as_ptr(),
            value: value.as_ptr(),
        });
        strings.push(key);
        strings.push(value);
    }

    let items = items.into_boxed_slice();
    let table = Box::new(NativeHeaderTable {
        items: if items.is_empty() { ptr::null() } else { items.as_ptr() },
        count: items.len(),
    });

    Ok(Some(EncodedHeaders {
        table,
        _items: items,
        _strings: strings,
    }))
}

/// Decode a native header table into a mapping keyed by lower-cased names.
///
/// A null table (or a null item array) decodes to an empty mapping. Items
/// with a null key are skipped; a null value decodes to `None`.
///
/// # Safety
/// `table` must be null or point to a valid table whose `items` array holds
/// at least `count` entries, each pointing to null or a NUL-terminated string.
pub unsafe fn decode(table: *const NativeHeaderTable) -> Result<HeaderMap<Option<String>>, DecodeFailure> {
    let mut headers = HeaderMap::new();
    if table.is_null() {
        return Ok(headers);
    }

    let table = unsafe { &*table };
    if table.items.is_null() {
        return Ok(headers);
    }

    // Position of each key in `headers`, so large tables decode in linear time.
    let mut index: HashMap<String, usize> = HashMap::new();
    for i in 0..table.count {
        let item = unsafe { &*table.items.add(i) };
        let Some(key) = (unsafe { read_utf8(item.key, ResponseField::HeaderKey(i)) })? else {
            continue;
        };
        let value = unsafe { read_utf8(item.value, ResponseField::HeaderValue(i)) }?;

        let key = key.to_lowercase();
        match index.get(&key) {
            Some(&at) => headers.entries[at].1 = value,
            None => {
                index.insert(key.clone(), headers.entries.len());
                headers.entries.push((key, value));
            }
        }
    }
    Ok(headers)
}
