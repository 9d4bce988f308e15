//! Errors raised while building a schema or resolving a request.

use async_graphql::ErrorExtensions;
use snafu::Snafu;
use std::fmt::Display;

/// Errors raised by schema construction and by resolvers.
///
/// Build-time errors (metadata and type errors) are fatal: a schema which fails to build cannot be
/// served. Request-time errors are reported by the execution engine against the field whose
/// resolver raised them.
#[derive(Clone, Debug, Snafu)]
pub enum Error {
    /// The policy backend denied the caller.
    #[snafu(display("{message}"))]
    Authorization { message: String },

    #[snafu(display("error parsing metadata of {model} at `{line}`: {reason}"))]
    MetadataParse {
        model: String,
        line: String,
        reason: String,
    },

    #[snafu(display("property {model}.{property} has unsupported type {ty}"))]
    UnsupportedType {
        model: String,
        property: String,
        ty: String,
    },

    #[snafu(display("filter nests relations {depth} levels deep, at most 1 is allowed"))]
    NestedFilterDepthExceeded { depth: usize },

    #[snafu(display("order nests relations {depth} levels deep, at most 1 is allowed"))]
    NestedOrderDepthExceeded { depth: usize },

    #[snafu(display("order must name exactly one field, found {count}"))]
    OrderFieldCount { count: usize },

    #[snafu(display("invalid order direction {direction:?}, expected asc or desc"))]
    InvalidOrderDirection { direction: String },

    #[snafu(display("ordering is not supported on a materialized collection"))]
    OrderingUnsupported,

    #[snafu(display("filtering is not supported on a materialized collection"))]
    FilteringUnsupported,

    #[snafu(display("{reason}"))]
    InvalidFilter { reason: String },

    #[snafu(display("invalid input: {reason}"))]
    InvalidInput { reason: String },

    #[snafu(display("unknown model {model}"))]
    UnknownModel { model: String },

    #[snafu(display("model {model} has no property {property}"))]
    UnknownProperty { model: String, property: String },

    #[snafu(display("invalid schema: {error}"))]
    Schema { error: String },

    #[snafu(display("{error}"))]
    Sql { error: String },
}

impl Error {
    /// An error in the SQL layer.
    pub fn sql(error: impl Display) -> Self {
        Self::Sql {
            error: error.to_string(),
        }
    }

    /// A malformed argument value.
    pub fn input(reason: impl Display) -> Self {
        Self::InvalidInput {
            reason: reason.to_string(),
        }
    }

    /// A machine-readable code identifying the kind of error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authorization { .. } => "UNAUTHORIZED",
            Self::MetadataParse { .. } => "METADATA_PARSE",
            Self::UnsupportedType { .. } => "UNSUPPORTED_TYPE",
            Self::NestedFilterDepthExceeded { .. } => "NESTED_FILTER_DEPTH_EXCEEDED",
            Self::NestedOrderDepthExceeded { .. } => "NESTED_ORDER_DEPTH_EXCEEDED",
            Self::OrderFieldCount { .. } => "ORDER_FIELD_COUNT",
            Self::InvalidOrderDirection { .. } => "INVALID_ORDER_DIRECTION",
            Self::OrderingUnsupported => "ORDERING_UNSUPPORTED",
            Self::FilteringUnsupported => "FILTERING_UNSUPPORTED",
            Self::InvalidFilter { .. } => "INVALID_FILTER",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::UnknownModel { .. } => "UNKNOWN_MODEL",
            Self::UnknownProperty { .. } => "UNKNOWN_PROPERTY",
            Self::Schema { .. } => "SCHEMA",
            Self::Sql { .. } => "SQL",
        }
    }

    /// Whether this is an authorization failure.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization { .. })
    }
}

impl ErrorExtensions for Error {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("code", self.code()))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
