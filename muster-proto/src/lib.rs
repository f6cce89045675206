//! `muster-proto` provides the definition of the muster directory-service
//! protocol's data types as well as the means to de-/serialize them from/to
//! the wire format. In simpler terms, you can construct, encode, and decode
//! directory queries and responses with it.
//!
//! It is used as the backend for [`muster`], a client for querying the
//! daemons registered in a cluster's directory-service pool, but you can use
//! this library on its own as well, e.g. in a daemon that answers queries or
//! publishes its own ad.
//!
//! # Basic usage example
//! ```rust
//! use muster_proto::{AdType, DaemonType, Query};
//!
//! let query = Query::new(AdType::from(DaemonType::Schedule))
//!     .and_constraint(r#"Name =?= "sched1@cluster""#)
//!     .project(["Name", "Address"]);
//! let _encoded = query.encode(0x1234).unwrap();
//! ```
//!
//! If you're also looking for utilities to actually open a session to a pool
//! and execute queries, please take a look at [`muster`].
//!
//! [`muster`]: https://docs.rs/muster

use std::fmt::{self, Display};
use std::io::{Cursor, Write};

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use repr_with_fallback::repr_with_fallback;
use strum_macros::EnumString;

#[cfg(feature = "serde")]
use serde::Serialize;

pub mod ad;
pub mod error;

use ad::{read_string, write_string};
use error::{EncodeError, ParseError};

pub use ad::{Ad, AttrValue};

const FLAG_CONSTRAINT: u8 = 1;
const FLAG_PROJECTION: u8 = 1 << 1;

/// Represents a category of cluster daemon, as used by callers to say *what
/// kind* of daemon they are talking about.
///
/// A `DaemonType` never crosses the network; queries carry the corresponding
/// [`AdType`] instead (see the `From` impl below).
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(PartialEq, Eq, Copy, Clone, EnumString, Debug)]
#[strum(ascii_case_insensitive)]
pub enum DaemonType {
    /// The per-machine supervisor daemon.
    Master,
    /// The execution daemon that starts and monitors work on a machine.
    Start,
    /// The scheduler daemon that queues and places work.
    Schedule,
    /// The matchmaking daemon.
    Negotiator,
    /// The directory service itself.
    Directory,
}

/// Represents a category of record stored in the directory service.
///
/// One value exists per [`DaemonType`], plus the wildcard [`AdType::Any`] and
/// categories that are not daemon-derived ([`AdType::Generic`],
/// [`AdType::Submitter`]).
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(PartialEq, Eq, Copy, Clone, EnumString, Debug)]
#[strum(ascii_case_insensitive)]
pub enum AdType {
    /// Matches every record category.
    Any,
    /// Free-form records not tied to a daemon.
    Generic,
    Master,
    Start,
    Schedule,
    Negotiator,
    /// Per-submitter accounting records published by schedulers.
    Submitter,
    Directory,
}

repr_with_fallback! {
    /// The result of a directory-service query round trip, as reported by
    /// the service in its response header.
    ///
    /// `Unknown` captures status codes this library does not recognize, so
    /// that talking to a newer service degrades into a reportable error
    /// instead of a parse failure.
    #[cfg_attr(feature = "serde", derive(Serialize))]
    #[derive(PartialEq, Eq, Copy, Clone, Debug)]
    pub enum ResultStatus {
        Ok = 0,
        CategoryUnsupported = 1,
        OutOfMemory = 2,
        ParseError = 3,
        CommunicationError = 4,
        InvalidQuery = 5,
        NoServiceHost = 6,
        Unknown(u16),
    }
}

/// A directory-service query descriptor.
///
/// A `Query` names a record category, at most one conjunctive constraint
/// predicate, and an optional projection of attribute names. It is immutable
/// once built; all four call shapes (everything, category only, category +
/// constraint, all three) go through the same builder with defaulted fields.
///
/// # Examples
/// ```rust
/// use muster_proto::{AdType, Query};
///
/// // the wildcard "give me everything" query
/// let all = Query::any();
/// assert_eq!(all.ad_type(), AdType::Any);
/// assert_eq!(all.constraint(), None);
/// assert!(all.projection().is_empty());
///
/// // an empty constraint means "match all" and attaches no predicate
/// let masters = Query::new(AdType::Master).and_constraint("");
/// assert_eq!(masters.constraint(), None);
///
/// let drained = Query::new(AdType::Start)
///     .and_constraint("Draining == true")
///     .project(["Name"]);
/// assert_eq!(drained.constraint(), Some("Draining == true"));
/// ```
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Query {
    ad_type: AdType,
    constraint: Option<String>,
    projection: Vec<String>,
}

/// A parsed directory-service response: the echoed message id, the service's
/// [`ResultStatus`], and the stream of raw ad frames.
#[derive(Debug)]
pub struct Response {
    /// The message id of the query this response answers.
    pub msg_id: u16,
    /// The service's verdict on the query.
    pub status: ResultStatus,
    /// The raw, not yet materialized ads.
    pub ads: RawAdStream,
}

/// The raw document stream of a [`Response`].
///
/// The stream owns the response buffer it was parsed from and hands out each
/// ad as a borrowed byte frame in arrival order. Callers that want to keep a
/// record past the next [`next_frame()`](Self::next_frame) call must decode
/// it into an owned [`Ad`]; no returned record may alias this buffer.
#[derive(Debug)]
pub struct RawAdStream {
    buf: Vec<u8>,
    pos: usize,
    remaining: u32,
}

impl Display for DaemonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<DaemonType> for AdType {
    /// Maps a daemon category to the record category the directory service
    /// files its ads under. The match is exhaustive so that a new
    /// [`DaemonType`] variant is a compile-time-visible gap here.
    fn from(daemon_type: DaemonType) -> Self {
        match daemon_type {
            DaemonType::Master => AdType::Master,
            DaemonType::Start => AdType::Start,
            DaemonType::Schedule => AdType::Schedule,
            DaemonType::Negotiator => AdType::Negotiator,
            DaemonType::Directory => AdType::Directory,
        }
    }
}

impl AdType {
    /// Encodes an `AdType` as a two-byte wire code.
    pub fn encode(&self) -> u16 {
        match self {
            AdType::Any => 0,
            AdType::Generic => 1,
            AdType::Master => 2,
            AdType::Start => 3,
            AdType::Schedule => 4,
            AdType::Negotiator => 5,
            AdType::Submitter => 6,
            AdType::Directory => 7,
        }
    }

    /// Parses an encoded `AdType` from a two-byte wire code.
    ///
    /// Returns an error if the given value does not denote a known record
    /// category.
    pub fn parse(val: u16) -> Result<AdType, ParseError> {
        Ok(match val {
            0 => AdType::Any,
            1 => AdType::Generic,
            2 => AdType::Master,
            3 => AdType::Start,
            4 => AdType::Schedule,
            5 => AdType::Negotiator,
            6 => AdType::Submitter,
            7 => AdType::Directory,
            x => return Err(ParseError::InvalidAdType(x)),
        })
    }
}

impl Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultStatus::Unknown(x) => write!(f, "UNKNOWN({})", x),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl Query {
    /// Creates the wildcard query that matches every record of every
    /// category.
    pub fn any() -> Self {
        Self::new(AdType::Any)
    }

    /// Creates a match-all query for one record category.
    pub fn new(ad_type: AdType) -> Self {
        Query {
            ad_type,
            constraint: None,
            projection: Vec::new(),
        }
    }

    /// Attaches the query's single conjunctive constraint predicate.
    ///
    /// The predicate string is treated as opaque; its grammar is the
    /// directory service's business. An empty string attaches nothing and
    /// leaves the query matching all records of its category.
    pub fn and_constraint(mut self, constraint: impl Into<String>) -> Self {
        let constraint = constraint.into();
        self.constraint = if constraint.is_empty() {
            None
        } else {
            Some(constraint)
        };
        self
    }

    /// Requests that only the named attributes be returned per matching
    /// record. An empty projection requests the full record as stored.
    /// Honoring the projection is the service's responsibility; it is not
    /// enforced client-side.
    pub fn project<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = attrs.into_iter().map(Into::into).collect();
        self
    }

    /// The record category this query matches.
    pub fn ad_type(&self) -> AdType {
        self.ad_type
    }

    /// The attached constraint predicate, if any.
    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    /// The requested attribute projection (empty means "full record").
    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    /// Encodes a `Query` as a series of bytes, under the given message id.
    pub fn encode(&self, msg_id: u16) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        self.encode_into(msg_id, &mut buf)?;
        Ok(buf)
    }

    /// The same as [`encode()`](Self::encode()), but encoded bytes are
    /// appended to the given writer instead of to a newly allocated one.
    pub fn encode_into(&self, msg_id: u16, buf: &mut impl Write) -> Result<(), EncodeError> {
        buf.write_u16::<NetworkEndian>(msg_id)?;
        buf.write_u16::<NetworkEndian>(self.ad_type.encode())?;

        let mut flags = 0u8;
        if self.constraint.is_some() {
            flags |= FLAG_CONSTRAINT;
        }
        if !self.projection.is_empty() {
            flags |= FLAG_PROJECTION;
        }
        buf.write_u8(flags)?;

        if let Some(constraint) = &self.constraint {
            write_string(buf, constraint)?;
        }
        if !self.projection.is_empty() {
            if self.projection.len() > u16::MAX as usize {
                return Err(EncodeError::TooManyAttrs(self.projection.len()));
            }
            buf.write_u16::<NetworkEndian>(self.projection.len() as u16)?;
            for attr in &self.projection {
                write_string(buf, attr)?;
            }
        }
        Ok(())
    }

    /// Parses an encoded `Query` from a series of bytes, returning the
    /// message id it was sent under alongside the query itself.
    ///
    /// The client never parses queries; directory services and test fixtures
    /// do.
    pub fn parse(msg: &mut Cursor<&[u8]>) -> Result<(u16, Query), ParseError> {
        let msg_id = msg.read_u16::<NetworkEndian>()?;
        let ad_type = AdType::parse(msg.read_u16::<NetworkEndian>()?)?;
        let flags = msg.read_u8()?;
        if flags & !(FLAG_CONSTRAINT | FLAG_PROJECTION) != 0 {
            return Err(ParseError::InvalidQueryFlags(flags));
        }

        let constraint = if flags & FLAG_CONSTRAINT != 0 {
            Some(read_string(msg)?)
        } else {
            None
        };
        let projection = if flags & FLAG_PROJECTION != 0 {
            let count = msg.read_u16::<NetworkEndian>()?;
            let mut attrs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                attrs.push(read_string(msg)?);
            }
            attrs
        } else {
            Vec::new()
        };

        Ok((
            msg_id,
            Query {
                ad_type,
                constraint,
                projection,
            },
        ))
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Query for {} ads (constraint: {}, projection: {} attrs)",
            self.ad_type,
            self.constraint.as_deref().unwrap_or("<none>"),
            self.projection.len()
        )
    }
}

impl Response {
    /// Parses a response buffer into its header fields and the raw ad
    /// stream. The stream takes ownership of the buffer; individual ads are
    /// decoded lazily from it.
    pub fn parse(buf: Vec<u8>) -> Result<Self, ParseError> {
        let (msg_id, status, remaining, pos) = {
            let mut msg = Cursor::new(buf.as_slice());
            let msg_id = msg.read_u16::<NetworkEndian>()?;
            let status: ResultStatus = msg.read_u16::<NetworkEndian>()?.into();
            let remaining = msg.read_u32::<NetworkEndian>()?;
            (msg_id, status, remaining, msg.position() as usize)
        };
        Ok(Response {
            msg_id,
            status,
            ads: RawAdStream {
                buf,
                pos,
                remaining,
            },
        })
    }

    /// Encodes a response as a directory service would produce it: header
    /// fields followed by one length-prefixed frame per ad.
    ///
    /// The client never sends responses; this exists for directory services
    /// and test fixtures.
    pub fn encode(msg_id: u16, status: ResultStatus, ads: &[Ad]) -> Result<Vec<u8>, EncodeError> {
        if ads.len() > u32::MAX as usize {
            return Err(EncodeError::TooManyAds(ads.len()));
        }
        let mut buf = Vec::new();
        buf.write_u16::<NetworkEndian>(msg_id)?;
        buf.write_u16::<NetworkEndian>(status.into())?;
        buf.write_u32::<NetworkEndian>(ads.len() as u32)?;
        for ad in ads {
            let frame = ad.encode()?;
            if frame.len() > u32::MAX as usize {
                return Err(EncodeError::AdTooLarge(frame.len()));
            }
            buf.write_u32::<NetworkEndian>(frame.len() as u32)?;
            buf.extend_from_slice(&frame);
        }
        Ok(buf)
    }
}

impl RawAdStream {
    /// The number of ad frames not yet consumed.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Yields the next raw ad frame, or [`None`] once the stream is
    /// exhausted.
    ///
    /// The frame borrows the stream's buffer and is only valid until the
    /// next call; decode it into an [`Ad`] to keep it.
    pub fn next_frame(&mut self) -> Option<Result<&[u8], ParseError>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        if self.buf.len() - self.pos < 4 {
            return Some(Err(ParseError::Truncated));
        }
        let mut lenbuf = [0u8; 4];
        lenbuf.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        let len = u32::from_be_bytes(lenbuf) as usize;
        self.pos += 4;

        if self.buf.len() - self.pos < len {
            return Some(Err(ParseError::Truncated));
        }
        let frame = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Some(Ok(frame))
    }
}
