//! Error types for dispatch failures
//!
//! Every failure is returned to the caller of `dispatch`; the store never
//! retries or swallows an error. [`DispatchError`] carries the action type
//! (and the failing middleware or subscription) as context around the
//! underlying cause.

use thiserror::Error;

use crate::action::ActionType;
use crate::store::SubscriptionId;

/// Boxed error used as an optional cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Raised when an action lacks a valid, non-empty type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidActionError {
    /// The type identifier was the empty string.
    #[error("action type must not be empty")]
    EmptyType,
    /// A serialized action had no `type` field.
    #[error("action is missing a `type` field")]
    MissingType,
    /// A serialized action could not be decoded.
    #[error("malformed action: {0}")]
    Malformed(String),
}

macro_rules! message_error {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Error)]
        #[error("{message}")]
        pub struct $name {
            message: String,
            #[source]
            source: Option<BoxError>,
        }

        impl $name {
            /// Create an error with a message.
            pub fn new(message: impl Into<String>) -> Self {
                Self {
                    message: message.into(),
                    source: None,
                }
            }

            /// Create an error with a message and an underlying cause.
            pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
                Self {
                    message: message.into(),
                    source: Some(source.into()),
                }
            }

            /// The error message, without the cause.
            pub fn message(&self) -> &str {
                &self.message
            }
        }
    };
}

message_error! {
    /// Failure raised by a reducer. The pre-dispatch state is kept.
    ReducerError
}

message_error! {
    /// Failure raised by a middleware before the reducer ran.
    MiddlewareError
}

message_error! {
    /// Failure raised by a subscriber callback during notification.
    SubscriberError
}

impl From<serde_json::Error> for ReducerError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source("failed to decode action payload", err)
    }
}

impl From<DispatchError> for SubscriberError {
    fn from(err: DispatchError) -> Self {
        Self::with_source("nested dispatch failed", err)
    }
}

impl From<DispatchError> for MiddlewareError {
    fn from(err: DispatchError) -> Self {
        Self::with_source("nested dispatch failed", err)
    }
}

/// Error returned by [`Store::dispatch`](crate::Store::dispatch).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The action was rejected before entering the pipeline.
    #[error("invalid action: {0}")]
    InvalidAction(#[from] InvalidActionError),

    /// The root reducer failed; state is unchanged.
    #[error("reducer failed on `{action}`: {source}")]
    Reducer {
        action: ActionType,
        #[source]
        source: ReducerError,
    },

    /// A middleware failed; the rest of the chain did not run.
    #[error("middleware `{middleware}` failed on `{action}`: {source}")]
    Middleware {
        middleware: &'static str,
        action: ActionType,
        #[source]
        source: MiddlewareError,
    },

    /// A subscriber failed; state was already replaced.
    #[error("subscriber {subscription} failed after `{action}`: {source}")]
    Subscriber {
        subscription: SubscriptionId,
        action: ActionType,
        #[source]
        source: SubscriberError,
    },
}

impl DispatchError {
    /// Build a [`DispatchError::Middleware`] for the named middleware.
    pub fn middleware(
        middleware: &'static str,
        action: &ActionType,
        source: impl Into<MiddlewareError>,
    ) -> Self {
        Self::Middleware {
            middleware,
            action: action.clone(),
            source: source.into(),
        }
    }

    /// The action type the failure happened on, if known.
    pub fn action(&self) -> Option<&ActionType> {
        match self {
            Self::InvalidAction(_) => None,
            Self::Reducer { action, .. }
            | Self::Middleware { action, .. }
            | Self::Subscriber { action, .. } => Some(action),
        }
    }
}
