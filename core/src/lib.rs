//! Host-side marshalling layer for a C-ABI HTTP engine.
//!
//! # Overview
//! The engine does the network work and exposes three entry points:
//! a blocking request, an asynchronous request with a completion callback,
//! and a free function for the responses it returns. This crate turns host
//! values into the flat native arguments those entry points take, reads the
//! native response structures back into host values, and keeps every buffer
//! alive exactly as long as the engine may read it.
//!
//! # Design
//! - `layout` pins the byte layout shared with the engine.
//! - `headers` encodes a header mapping to a native table and back.
//! - `request` builds the four call arguments; `response` decodes the result.
//! - `registry` holds in-flight asynchronous calls until their single
//!   completion fires.
//! - `engine` binds the exports once; `client` runs encode, call, decode,
//!   free for both calling conventions.
//! - Every allocation made for a request is owned by an `EncodedRequest`;
//!   every engine response is released by an `OwnedResponse`.

pub mod client;
pub mod config;
mod cstr;
pub mod engine;
pub mod error;
pub mod headers;
pub mod layout;
pub mod registry;
pub mod request;
pub mod response;

pub use client::{Client, PendingResponse};
pub use config::{ClientConfig, EmptyHeaders, EngineSymbols};
pub use engine::NativeEngine;
pub use error::{ConstructionError, DecodeFailure, EncodeError, SubmissionError};
pub use headers::HeaderMap;
pub use registry::CallId;
pub use request::{BodyArg, HeadersArg, HttpRequest, RawBody, RawHeaderTable};
pub use response::HttpResponse;
