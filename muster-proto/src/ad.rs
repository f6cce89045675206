//! Definition and implementation of the [`Ad`] attribute record type.

use std::fmt::{self, Display};
use std::io::{Cursor, Read, Write};

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use owo_colors::OwoColorize;
use smartstring::SmartString;

use crate::error::{EncodeError, ParseError};

#[cfg(feature = "serde")]
use serde::ser::{SerializeMap, Serializer};
#[cfg(feature = "serde")]
use serde::Serialize;

/// The attribute holding a daemon's logical name.
pub const ATTR_NAME: &str = "Name";
/// The attribute holding a daemon's network address.
pub const ATTR_ADDRESS: &str = "Address";
/// The attribute holding the full host name of the machine a daemon runs on.
pub const ATTR_MACHINE: &str = "Machine";
/// The attribute holding a daemon's version string.
pub const ATTR_VERSION: &str = "Version";

/// A single typed attribute value.
///
/// Values carry no unit or schema information; the directory service stores
/// them as-is and hands them back as-is.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(PartialEq, Clone, Debug)]
pub enum AttrValue {
    /// The explicit "no value" value. Distinct from an absent attribute only
    /// in that it occupies a slot in the record.
    Undefined,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

/// An attribute document ("ad") describing one daemon or entity.
///
/// An `Ad` is an ordered mapping from attribute names to [`AttrValue`]s.
/// Attribute names compare case-insensitively; iteration yields attributes in
/// first-insertion order, and overwriting a value keeps its original position.
/// [`Clone`] produces a deep, independently owned copy.
///
/// # Examples
/// ```rust
/// use muster_proto::ad::{Ad, AttrValue, ATTR_NAME};
///
/// let mut ad = Ad::new();
/// assert!(ad.insert(ATTR_NAME, AttrValue::from("sched1@cluster")));
/// assert!(ad.insert("CpusTotal", AttrValue::from(64_i64)));
///
/// // names are matched case-insensitively
/// assert_eq!(ad.get("name"), Some(&AttrValue::from("sched1@cluster")));
///
/// // an invalid attribute name is rejected
/// assert!(!ad.insert("1stCpu", AttrValue::from(0_i64)));
/// ```
#[derive(PartialEq, Clone, Debug, Default)]
pub struct Ad {
    attrs: Vec<(SmartString<smartstring::LazyCompact>, AttrValue)>,
}

impl AttrValue {
    /// Compares two values with the meta-equality ("is identical") semantics
    /// of the `=?=` constraint operator: `Undefined` is treated as a defined,
    /// comparable value, so two `Undefined`s are meta-equal while a defined
    /// value never meta-equals `Undefined`. There is no numeric coercion;
    /// `Int(1)` and `Real(1.0)` are not meta-equal.
    ///
    /// The client never evaluates constraints itself. This exists for
    /// directory services and test fixtures that do.
    pub fn meta_eq(&self, other: &AttrValue) -> bool {
        self == other
    }

    /// Encodes an `AttrValue` as a tag byte followed by its payload.
    pub fn encode_into(&self, buf: &mut impl Write) -> Result<(), EncodeError> {
        match self {
            AttrValue::Undefined => buf.write_u8(0)?,
            AttrValue::Bool(val) => {
                buf.write_u8(1)?;
                buf.write_u8(*val as u8)?;
            }
            AttrValue::Int(val) => {
                buf.write_u8(2)?;
                buf.write_i64::<NetworkEndian>(*val)?;
            }
            AttrValue::Real(val) => {
                buf.write_u8(3)?;
                buf.write_f64::<NetworkEndian>(*val)?;
            }
            AttrValue::Str(val) => {
                buf.write_u8(4)?;
                write_string(buf, val)?;
            }
        }
        Ok(())
    }

    /// Parses an encoded `AttrValue` from a series of bytes.
    ///
    /// Returns an error if the tag byte does not denote a valid value kind.
    pub fn parse(msg: &mut Cursor<&[u8]>) -> Result<Self, ParseError> {
        Ok(match msg.read_u8()? {
            0 => AttrValue::Undefined,
            1 => AttrValue::Bool(msg.read_u8()? != 0),
            2 => AttrValue::Int(msg.read_i64::<NetworkEndian>()?),
            3 => AttrValue::Real(msg.read_f64::<NetworkEndian>()?),
            4 => AttrValue::Str(read_string(msg)?),
            x => return Err(ParseError::InvalidValueTag(x)),
        })
    }
}

impl From<&str> for AttrValue {
    fn from(val: &str) -> Self {
        AttrValue::Str(val.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(val: String) -> Self {
        AttrValue::Str(val)
    }
}

impl From<bool> for AttrValue {
    fn from(val: bool) -> Self {
        AttrValue::Bool(val)
    }
}

impl From<i64> for AttrValue {
    fn from(val: i64) -> Self {
        AttrValue::Int(val)
    }
}

impl From<f64> for AttrValue {
    fn from(val: f64) -> Self {
        AttrValue::Real(val)
    }
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Undefined => write!(f, "undefined"),
            AttrValue::Bool(val) => write!(f, "{}", val),
            AttrValue::Int(val) => write!(f, "{}", val),
            AttrValue::Real(val) => write!(f, "{}", val),
            AttrValue::Str(val) => write!(f, "{:?}", val),
        }
    }
}

impl Ad {
    /// Creates an empty ad.
    pub fn new() -> Self {
        Self { attrs: Vec::new() }
    }

    /// Returns the number of attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Returns true if the ad holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Inserts an attribute, returning whether the insertion succeeded.
    ///
    /// A name is valid if it starts with an ASCII letter or underscore and
    /// otherwise contains only ASCII letters, digits, underscores, and dots.
    /// Inserting under an existing name (compared case-insensitively)
    /// replaces the value in place, keeping the attribute's position and its
    /// original spelling.
    pub fn insert(&mut self, name: &str, value: AttrValue) -> bool {
        if !valid_attr_name(name) {
            return false;
        }
        match self
            .attrs
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, slot)) => *slot = value,
            None => self.attrs.push((SmartString::from(name), value)),
        }
        true
    }

    /// Looks up an attribute by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attrs
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Iterates over the attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attrs.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Encodes an `Ad` as a series of bytes.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// The same as [`encode()`](Self::encode()), but encoded bytes are
    /// appended to the given writer instead of to a newly allocated one.
    pub fn encode_into(&self, buf: &mut impl Write) -> Result<(), EncodeError> {
        if self.attrs.len() > u16::MAX as usize {
            return Err(EncodeError::TooManyAttrs(self.attrs.len()));
        }
        buf.write_u16::<NetworkEndian>(self.attrs.len() as u16)?;
        for (name, value) in &self.attrs {
            write_string(buf, name)?;
            value.encode_into(buf)?;
        }
        Ok(())
    }

    /// Parses an encoded `Ad` from a series of bytes.
    ///
    /// Every attribute is copied out of the source buffer into freshly owned
    /// storage; the returned ad shares nothing with `msg`. Returns an error
    /// on an invalid attribute name or value tag.
    pub fn parse(msg: &mut Cursor<&[u8]>) -> Result<Self, ParseError> {
        let count = msg.read_u16::<NetworkEndian>()?;
        let mut ad = Ad::new();
        for _ in 0..count {
            let name = read_string(msg)?;
            let value = AttrValue::parse(msg)?;
            if !ad.insert(&name, value) {
                return Err(ParseError::InvalidAttrName(name));
            }
        }
        Ok(ad)
    }

    /// Returns a multi-line `Attribute = value` rendering of the ad.
    ///
    /// If `pad_names` is true, attribute names are padded to a common width.
    /// If `output` is [`Some`] and the specified output stream supports
    /// colours, the output will be colourized.
    pub fn as_string(&self, pad_names: bool, output: Option<owo_colors::Stream>) -> String {
        let width = if pad_names {
            self.attrs.iter().map(|(name, _)| name.len()).max().unwrap_or(0)
        } else {
            0
        };

        let mut lines = Vec::with_capacity(self.attrs.len());
        for (name, value) in &self.attrs {
            let mut name = name.to_string();
            while name.len() < width {
                name.push(' ');
            }
            if let Some(stream) = output {
                name = name.if_supports_color(stream, |s| s.green()).to_string();
            }
            lines.push(format!("{} = {}", name, value));
        }
        lines.join("\n")
    }
}

impl Display for Ad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string(false, None))
    }
}

#[cfg(feature = "serde")]
impl Serialize for Ad {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.attrs.len()))?;
        for (name, value) in &self.attrs {
            map.serialize_entry(name.as_str(), value)?;
        }
        map.end()
    }
}

fn valid_attr_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

pub(crate) fn write_string(buf: &mut impl Write, val: &str) -> Result<(), EncodeError> {
    if val.len() > u16::MAX as usize {
        return Err(EncodeError::StringTooLong(val.len()));
    }
    buf.write_u16::<NetworkEndian>(val.len() as u16)?;
    buf.write_all(val.as_bytes())?;
    Ok(())
}

pub(crate) fn read_string(msg: &mut Cursor<&[u8]>) -> Result<String, ParseError> {
    let len = msg.read_u16::<NetworkEndian>()?;
    let mut buf = vec![0; len as usize];
    msg.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{Ad, AttrValue, ATTR_ADDRESS, ATTR_NAME};

    fn sample_ad() -> Ad {
        let mut ad = Ad::new();
        assert!(ad.insert(ATTR_NAME, AttrValue::from("startd@node7")));
        assert!(ad.insert(ATTR_ADDRESS, AttrValue::from("10.0.3.7:5525")));
        assert!(ad.insert("CpusTotal", AttrValue::from(64_i64)));
        assert!(ad.insert("LoadAvg", AttrValue::from(0.25)));
        assert!(ad.insert("Draining", AttrValue::from(false)));
        assert!(ad.insert("LastHeardFrom", AttrValue::Undefined));
        ad
    }

    #[test]
    fn insertion_order_is_preserved() {
        let ad = sample_ad();
        let names: Vec<_> = ad.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            [ATTR_NAME, ATTR_ADDRESS, "CpusTotal", "LoadAvg", "Draining", "LastHeardFrom"]
        );
    }

    #[test]
    fn overwrite_keeps_position_and_spelling() {
        let mut ad = sample_ad();
        assert!(ad.insert("cpustotal", AttrValue::from(128_i64)));
        assert_eq!(ad.len(), 6);
        assert_eq!(ad.get("CpusTotal"), Some(&AttrValue::from(128_i64)));
        let names: Vec<_> = ad.iter().map(|(name, _)| name).collect();
        assert_eq!(names[2], "CpusTotal");
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut ad = Ad::new();
        assert!(!ad.insert("", AttrValue::Undefined));
        assert!(!ad.insert("7thHeaven", AttrValue::Undefined));
        assert!(!ad.insert("has space", AttrValue::Undefined));
        assert!(ad.insert("_ok.Name2", AttrValue::Undefined));
    }

    #[test]
    fn materialized_copies_are_independent() {
        let source = sample_ad();
        let frame = source.encode().unwrap();

        let mut first = Ad::parse(&mut Cursor::new(frame.as_slice())).unwrap();
        let second = Ad::parse(&mut Cursor::new(frame.as_slice())).unwrap();
        assert_eq!(first, source);
        assert_eq!(second, source);

        assert!(first.insert(ATTR_NAME, AttrValue::from("imposter")));
        assert_eq!(second.get(ATTR_NAME), Some(&AttrValue::from("startd@node7")));
    }

    #[test]
    fn meta_equality_treats_undefined_as_comparable() {
        assert!(AttrValue::Undefined.meta_eq(&AttrValue::Undefined));
        assert!(!AttrValue::Undefined.meta_eq(&AttrValue::from("x")));
        assert!(!AttrValue::from("x").meta_eq(&AttrValue::Undefined));
        // no numeric coercion
        assert!(!AttrValue::from(1_i64).meta_eq(&AttrValue::from(1.0)));
        assert!(AttrValue::from("sched1").meta_eq(&AttrValue::from("sched1")));
    }
}
