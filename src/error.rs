//! Crate-level error types.
//!
//! The consensus core itself has no panic path: protocol rejection is data,
//! not error, and is fed back into the proposer's retry loop. Errors live at
//! the edges — decoding a malformed line, loading a bad config file, parsing
//! the CLI — where `thiserror` gives us a real `std::error::Error` instead of
//! the `unwrap()`s the original prototype relied on.

use std::fmt;

/// Errors produced while decoding a wire line into a [`crate::message::Message`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed key=value pair: {0:?}")]
    MalformedPair(String),

    #[error("missing required field {0:?}")]
    MissingField(&'static str),

    #[error("unknown message type {0:?}")]
    UnknownType(String),

    #[error("field {field:?} is not a valid integer: {value:?}")]
    InvalidInt { field: &'static str, value: String },

    #[error("value field must not be empty")]
    EmptyValue,

    #[error("field {field:?} is not a valid member id: {value:?}")]
    InvalidMember { field: &'static str, value: String },
}

/// Errors produced while loading `memberId,host,port` configuration files.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: expected `memberId,host,port`, got {text:?}")]
    MalformedLine {
        path: String,
        line: usize,
        text: String,
    },

    #[error("{path}:{line}: invalid socket address {text:?}: {source}")]
    InvalidAddress {
        path: String,
        line: usize,
        text: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("{path}:{line}: invalid member id {text:?}: {source}")]
    InvalidMemberId {
        path: String,
        line: usize,
        text: String,
        #[source]
        source: IdentityError,
    },

    #[error("config file {path:?} does not list all 9 members (found {found})")]
    IncompleteMembership { path: String, found: usize },
}

/// Errors produced while validating a participant identity string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("member id {0:?} must match M<1..=9>")]
    Invalid(String),
}

/// Errors from parsing the process command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError(pub String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UsageError {}
