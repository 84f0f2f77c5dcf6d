#![allow(dead_code)]

//! Shared identifier and error primitives used across the orchestration
//! workspace. Mirrors the teacher's `core-types` crate: small newtypes
//! around UUIDs, a minimal shared error, nothing behavioural.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Minimal shared error for cross-crate plumbing that doesn't warrant a
/// bespoke error enum of its own.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("{message}")]
    Message { message: String },
}

impl CoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

macro_rules! uuid_id {
    ($name:ident) => {
        #[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
        #[derive(Clone, Debug, Eq, PartialEq, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(TaskId);
uuid_id!(TabId);
uuid_id!(StepId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(TaskId::new().0, TaskId::new().0);
    }

    #[test]
    fn core_error_formats_message() {
        let err = CoreError::new("boom");
        assert_eq!(err.to_string(), "boom");
    }
}
