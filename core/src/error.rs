//! Error types for the marshalling layer.
//!
//! # Design
//! Only construction and submission failures reach the caller as errors.
//! `DecodeFailure` exists so the decoder has an explicit result type, but
//! the client maps it (and a null native response) to an absent response
//! instead of propagating it.

use std::fmt;

/// Binding to the native engine failed. Fatal: no client is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    /// The shared library could not be opened.
    Load { path: String, reason: String },

    /// A required export was not found, or resolved to null.
    MissingExport { symbol: String },
}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructionError::Load { path, reason } => {
                write!(f, "failed to load native engine \"{path}\": {reason}")
            }
            ConstructionError::MissingExport { symbol } => {
                write!(f, "export \"{symbol}\" not found in native engine")
            }
        }
    }
}

impl std::error::Error for ConstructionError {}

/// Which part of a request a host string belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestField {
    Method,
    Url,
    HeaderKey,
    HeaderValue,
    Body,
}

impl fmt::Display for RequestField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestField::Method => "method",
            RequestField::Url => "url",
            RequestField::HeaderKey => "header key",
            RequestField::HeaderValue => "header value",
            RequestField::Body => "body",
        };
        f.write_str(name)
    }
}

/// A request argument could not be turned into a C string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The value contains a NUL byte at `position`.
    InteriorNul { field: RequestField, position: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::InteriorNul { field, position } => {
                write!(f, "{field} contains a NUL byte at offset {position}")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Which string of a native response failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseField {
    Body,
    ContentType,
    HeaderKey(usize),
    HeaderValue(usize),
}

impl fmt::Display for ResponseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseField::Body => f.write_str("body"),
            ResponseField::ContentType => f.write_str("content type"),
            ResponseField::HeaderKey(i) => write!(f, "key of header #{i}"),
            ResponseField::HeaderValue(i) => write!(f, "value of header #{i}"),
        }
    }
}

/// The native response could not be turned into an `HttpResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    /// The engine returned a null response pointer.
    NullResponse,

    /// A string field was not valid UTF-8.
    InvalidUtf8 { field: ResponseField },
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeFailure::NullResponse => write!(f, "native engine returned no response"),
            DecodeFailure::InvalidUtf8 { field } => write!(f, "{field} is not valid UTF-8"),
        }
    }
}

impl std::error::Error for DecodeFailure {}

/// An asynchronous request never reached the engine's completion path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    /// The request could not be encoded; nothing was submitted.
    Encode(EncodeError),

    /// The engine raised before scheduling the request.
    Rejected(String),

    /// The pending call was discarded without its completion firing.
    Abandoned,
}

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionError::Encode(e) => write!(f, "request encoding failed: {e}"),
            SubmissionError::Rejected(msg) => write!(f, "native engine rejected submission: {msg}"),
            SubmissionError::Abandoned => write!(f, "pending request was abandoned before completion"),
        }
    }
}

impl std::error::Error for SubmissionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubmissionError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EncodeError> for SubmissionError {
    fn from(e: EncodeError) -> Self {
        SubmissionError::Encode(e)
    }
}
