//! The closed error taxonomy surfaced by [`DirectoryClient`] operations.
//!
//! Every failure a client call can hit maps to exactly one [`QueryError`]
//! kind; nothing is retried, suppressed, or logged-and-continued, and no
//! partial result is ever returned alongside an error.
//!
//! [`DirectoryClient`]: crate::client::DirectoryClient

use muster_proto::error::ParseError;
use muster_proto::ResultStatus;
use thiserror::Error;

use crate::net::NetError;

#[derive(Debug, Error)]
pub enum QueryError {
    /// An unknown daemon-type name reached the client's string boundary.
    #[error("Unknown daemon type: {0}.")]
    InvalidArgument(String),

    /// The service does not support the queried record category.
    #[error("Category not supported by query type.")]
    CategoryUnsupported,

    /// The service ran out of memory answering the query.
    #[error("Memory allocation error in the directory service.")]
    OutOfMemory,

    /// The service could not parse the query's constraint predicate.
    #[error("Query constraint could not be parsed.")]
    BadConstraint,

    /// The round trip failed, the session could not be opened, or the
    /// service reported a communication error of its own.
    #[error("Failed communication with the directory service: {0}")]
    Communication(String),

    /// The service rejected the query as malformed.
    #[error("Invalid query.")]
    InvalidQuery,

    /// No pool is configured, or the pool name does not resolve to a host.
    #[error("Unable to determine the directory-service host.")]
    NoServiceHost,

    /// The service answered with a status code this client does not know.
    #[error("Unknown error from the directory service (status {0}).")]
    UnknownStatus(u16),

    /// A named `locate` matched no record.
    #[error("Unable to find daemon.")]
    NotFound,

    /// The local-daemon probe failed; the message names what went wrong.
    #[error("{0}")]
    LocalProbe(String),
}

/// Translates a service-reported status into the matching error kind.
///
/// [`ResultStatus::Ok`] yields no error; every other value maps 1:1, and the
/// match is exhaustive so that a new status variant is a
/// compile-time-visible gap here.
pub fn check_status(status: ResultStatus) -> Result<(), QueryError> {
    match status {
        ResultStatus::Ok => Ok(()),
        ResultStatus::CategoryUnsupported => Err(QueryError::CategoryUnsupported),
        ResultStatus::OutOfMemory => Err(QueryError::OutOfMemory),
        ResultStatus::ParseError => Err(QueryError::BadConstraint),
        ResultStatus::CommunicationError => Err(QueryError::Communication(
            "the service reported a communication error".to_string(),
        )),
        ResultStatus::InvalidQuery => Err(QueryError::InvalidQuery),
        ResultStatus::NoServiceHost => Err(QueryError::NoServiceHost),
        ResultStatus::Unknown(code) => Err(QueryError::UnknownStatus(code)),
    }
}

impl From<NetError> for QueryError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::NoPool | NetError::Resolve(_) => QueryError::NoServiceHost,
            other => QueryError::Communication(other.to_string()),
        }
    }
}

impl From<ParseError> for QueryError {
    fn from(err: ParseError) -> Self {
        QueryError::Communication(format!("malformed response ({})", err))
    }
}

#[cfg(test)]
mod tests {
    use muster_proto::ResultStatus;

    use crate::net::NetError;

    use super::{check_status, QueryError};

    #[test]
    fn every_status_maps_to_its_documented_kind() {
        assert!(check_status(ResultStatus::Ok).is_ok());

        let cases = [
            (ResultStatus::CategoryUnsupported, "Category not supported"),
            (ResultStatus::OutOfMemory, "Memory allocation error"),
            (ResultStatus::ParseError, "constraint could not be parsed"),
            (ResultStatus::CommunicationError, "Failed communication"),
            (ResultStatus::InvalidQuery, "Invalid query"),
            (ResultStatus::NoServiceHost, "directory-service host"),
            (ResultStatus::Unknown(42), "status 42"),
        ];
        for (status, needle) in cases {
            let err = check_status(status).unwrap_err();
            assert!(
                err.to_string().contains(needle),
                "{:?} mapped to {:?}",
                status,
                err
            );
        }
    }

    #[test]
    fn unknown_statuses_keep_their_code() {
        match check_status(ResultStatus::Unknown(204)).unwrap_err() {
            QueryError::UnknownStatus(204) => {}
            other => panic!("expected UnknownStatus(204), got {:?}", other),
        }
    }

    #[test]
    fn unresolvable_pools_are_no_service_host() {
        assert!(matches!(
            QueryError::from(NetError::NoPool),
            QueryError::NoServiceHost
        ));
        assert!(matches!(
            QueryError::from(NetError::Resolve("nowhere:5525".to_string())),
            QueryError::NoServiceHost
        ));
        assert!(matches!(
            QueryError::from(NetError::IdMismatch { sent: 1, got: 2 }),
            QueryError::Communication(_)
        ));
    }
}
