//! The directory-service query client and the daemon location operations
//! built on top of it.

use std::io::Cursor;
use std::str::FromStr;

use muster_proto::ad::{Ad, ATTR_NAME};
use muster_proto::error::ParseError;
use muster_proto::{DaemonType, Query, RawAdStream};
use tracing::debug;

use crate::error::{check_status, QueryError};
use crate::net::Session;
use crate::ConnectionType;

/// A client for one directory-service pool.
///
/// The client owns a single [`Session`] (and thereby at most one socket) for
/// its whole lifetime; see [`Session`] for the connection and threading
/// model. Queries are neither cached nor retried.
///
/// # Examples
/// ```rust,no_run
/// use muster::DirectoryClient;
/// use muster_proto::DaemonType;
///
/// let mut client = DirectoryClient::new(Some("pool.cluster.example"));
/// let schedulers = client.locate_all(DaemonType::Schedule)?;
/// for ad in &schedulers {
///     println!("{}", ad);
/// }
/// # Ok::<(), muster::QueryError>(())
/// ```
#[derive(Debug)]
pub struct DirectoryClient {
    session: Session,
}

impl DirectoryClient {
    /// Creates a client bound to the given pool, or to the locally
    /// configured default pool if `pool` is [`None`], speaking TCP.
    ///
    /// Construction cannot fail; an unresolvable pool surfaces as
    /// [`QueryError::NoServiceHost`] (and an unreachable one as
    /// [`QueryError::Communication`]) on the first query.
    pub fn new(pool: Option<&str>) -> Self {
        Self::with_connection(pool, ConnectionType::Tcp)
    }

    /// The same as [`new()`](Self::new), but with an explicit connection
    /// type.
    pub fn with_connection(pool: Option<&str>, connection_type: ConnectionType) -> Self {
        Self {
            session: Session::new(pool, connection_type),
        }
    }

    /// The pool name this client was constructed with, if any.
    pub fn pool(&self) -> Option<&str> {
        self.session.pool()
    }

    /// Executes a query and materializes every matching ad, in the order the
    /// service sent them. An empty result is a successful one.
    pub fn query(&mut self, query: &Query) -> Result<Vec<Ad>, QueryError> {
        let (status, ads) = self.session.execute(query)?;
        check_status(status)?;
        let ads = materialize(ads)?;
        debug!(count = ads.len(), "materialized query result");
        Ok(ads)
    }

    /// Fetches every ad of the given daemon type. Finding none is not an
    /// error.
    pub fn locate_all(&mut self, daemon_type: DaemonType) -> Result<Vec<Ad>, QueryError> {
        self.query(&Query::new(daemon_type.into()))
    }

    /// Resolves the daemon of the given type with the given logical name.
    ///
    /// The generated constraint compares the name attribute with the
    /// grammar's meta-equality operator `=?=` (an undefined name attribute is
    /// a comparable value, not a poison), which is deliberate: records
    /// without a name must not make the whole query undefined. When several
    /// records match, the first in arrival order wins; when none does, the
    /// call fails with [`QueryError::NotFound`].
    pub fn locate(&mut self, daemon_type: DaemonType, name: &str) -> Result<Ad, QueryError> {
        let constraint = format!("{} =?= {:?}", ATTR_NAME, name);
        let query = Query::new(daemon_type.into()).and_constraint(constraint);
        let ads = self.query(&query)?;
        match ads.into_iter().next() {
            Some(ad) => Ok(ad),
            None => Err(QueryError::NotFound),
        }
    }

    /// Resolves the *local* daemon of the given type, bypassing the
    /// directory service in favor of a direct probe (see [`crate::probe`]).
    pub fn locate_local(&self, daemon_type: DaemonType) -> Result<Ad, QueryError> {
        let mut probe = crate::probe::LocalDaemon::new(daemon_type);
        crate::probe::synthesize_ad(&mut probe)
    }
}

/// Consumes a raw ad stream to exhaustion, decoding every frame
/// attribute-by-attribute into an independently owned [`Ad`].
///
/// The returned ads are in arrival order and share no storage with the
/// stream's buffer, which is dropped here.
pub fn materialize(mut ads: RawAdStream) -> Result<Vec<Ad>, ParseError> {
    let mut out = Vec::new();
    while let Some(frame) = ads.next_frame() {
        let frame = frame?;
        out.push(Ad::parse(&mut Cursor::new(frame))?);
    }
    Ok(out)
}

/// Parses a daemon-type name, e.g. one arriving from a command line or a
/// host-language binding. Unknown names fail with
/// [`QueryError::InvalidArgument`].
pub fn parse_daemon_type(name: &str) -> Result<DaemonType, QueryError> {
    DaemonType::from_str(name).map_err(|_| QueryError::InvalidArgument(name.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
    use muster_proto::ad::{Ad, AttrValue, ATTR_NAME};
    use muster_proto::{AdType, DaemonType, Query, Response, ResultStatus};

    use crate::error::QueryError;

    use super::{parse_daemon_type, DirectoryClient};

    /// Serves exactly one query round trip on a loopback listener and
    /// answers it with the given status and ads. Returns the pool spec to
    /// point a client at.
    fn serve_once(status: ResultStatus, ads: Vec<Ad>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let len = stream.read_u32::<NetworkEndian>().unwrap();
            let mut buf = vec![0; len as usize];
            stream.read_exact(&mut buf).unwrap();
            let (msg_id, _query) = Query::parse(&mut Cursor::new(buf.as_slice())).unwrap();

            let response = Response::encode(msg_id, status, &ads).unwrap();
            stream
                .write_u32::<NetworkEndian>(response.len() as u32)
                .unwrap();
            stream.write_all(&response).unwrap();
        });
        addr.to_string()
    }

    fn named_ad(name: &str) -> Ad {
        let mut ad = Ad::new();
        assert!(ad.insert(ATTR_NAME, AttrValue::from(name)));
        ad
    }

    #[test]
    fn locate_all_returns_ads_in_arrival_order() {
        let pool = serve_once(
            ResultStatus::Ok,
            vec![named_ad("master@node1"), named_ad("master@node2")],
        );
        let mut client = DirectoryClient::new(Some(&pool));

        let ads = client.locate_all(DaemonType::Master).unwrap();
        assert_eq!(ads.len(), 2);
        assert_eq!(ads[0].get(ATTR_NAME), Some(&AttrValue::from("master@node1")));
        assert_eq!(ads[1].get(ATTR_NAME), Some(&AttrValue::from("master@node2")));
    }

    #[test]
    fn an_empty_result_is_not_an_error() {
        let pool = serve_once(ResultStatus::Ok, Vec::new());
        let mut client = DirectoryClient::new(Some(&pool));

        let ads = client.locate_all(DaemonType::Master).unwrap();
        assert!(ads.is_empty());
    }

    #[test]
    fn locate_takes_the_first_of_tied_matches() {
        let mut winner = named_ad("sched1");
        assert!(winner.insert("Machine", AttrValue::from("node1")));
        let mut loser = named_ad("sched1");
        assert!(loser.insert("Machine", AttrValue::from("node2")));

        let pool = serve_once(ResultStatus::Ok, vec![winner.clone(), loser]);
        let mut client = DirectoryClient::new(Some(&pool));

        let ad = client.locate(DaemonType::Schedule, "sched1").unwrap();
        assert_eq!(ad, winner);
    }

    #[test]
    fn locate_with_no_match_fails_with_not_found() {
        let pool = serve_once(ResultStatus::Ok, Vec::new());
        let mut client = DirectoryClient::new(Some(&pool));

        assert!(matches!(
            client.locate(DaemonType::Schedule, "sched1"),
            Err(QueryError::NotFound)
        ));
    }

    #[test]
    fn a_failing_status_surfaces_as_its_error_kind() {
        let pool = serve_once(ResultStatus::InvalidQuery, Vec::new());
        let mut client = DirectoryClient::new(Some(&pool));

        assert!(matches!(
            client.query(&Query::any()),
            Err(QueryError::InvalidQuery)
        ));
    }

    #[test]
    fn unknown_daemon_type_names_are_invalid_arguments() {
        assert!(matches!(parse_daemon_type("schedule"), Ok(DaemonType::Schedule)));
        match parse_daemon_type("janitor") {
            Err(QueryError::InvalidArgument(name)) => assert_eq!(name, "janitor"),
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn locate_attaches_a_meta_equality_constraint() {
        let query = Query::new(AdType::Schedule)
            .and_constraint(format!("{} =?= {:?}", ATTR_NAME, "sched1"));
        assert_eq!(query.constraint(), Some(r#"Name =?= "sched1""#));
    }
}
