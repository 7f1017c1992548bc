//! Typed parameters and their nibble-level codecs.
//!
//! VISCA packs parameter values into 4-bit halves of payload bytes, so every
//! codec here works on arrays of *nibbles* (`u8` values in `0..=0xF`) rather
//! than bytes. A [`ParameterGroup`] bundles one or more [`Parameter`]s with a
//! single encode/decode function pair and a fixed output width
//! ([`n_hex`][ParameterGroup::n_hex]).

use crate::{Error, Result};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

/// Parameter values, keyed by parameter name.
pub type ParameterMap = BTreeMap<String, Value>;

/// A domain value supplied by (or decoded for) a caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Uint(u32),
    Text(String),
}

impl Value {
    pub fn as_uint(&self) -> Option<u32> {
        match self {
            Value::Uint(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Uint(_) => None,
            Value::Text(s) => Some(s),
        }
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// The domain of a [`Parameter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    /// An integer in `min..=max`.
    Bounded { min: u32, max: u32 },

    /// One of a fixed set of names.
    Enumeration { names: Vec<String> },

    /// A literal hex string of exactly `n_hex` digits. The encoded bytes may
    /// not contain `0xFF`, which would collide with the payload terminator.
    FixedHex { n_hex: usize },

    /// A dotted-quad IPv4 address string.
    Ipv4,

    /// An ASCII string of exactly `n_chars` characters.
    Ascii { n_chars: usize },
}

/// A named, validatable parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameter {
    name: String,
    kind: ParameterKind,
}

impl Parameter {
    pub fn bounded(name: &str, min: u32, max: u32) -> Self {
        assert!(min <= max, "minimum must not exceed maximum");
        Self {
            name: name.to_string(),
            kind: ParameterKind::Bounded { min, max },
        }
    }

    pub fn enumeration(name: &str, names: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Enumeration {
                names: names.into_iter().collect(),
            },
        }
    }

    pub fn fixed_hex(name: &str, n_hex: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::FixedHex { n_hex },
        }
    }

    pub fn ipv4(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Ipv4,
        }
    }

    pub fn ascii(name: &str, n_chars: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Ascii { n_chars },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks a value against this parameter's domain.
    pub fn validate(&self, value: &Value) -> bool {
        match (&self.kind, value) {
            (ParameterKind::Bounded { min, max }, Value::Uint(v)) => (min..=max).contains(&v),
            (ParameterKind::Enumeration { names }, Value::Text(s)) => {
                names.iter().any(|n| n == s)
            }
            (ParameterKind::FixedHex { n_hex }, Value::Text(s)) => {
                s.len() == *n_hex
                    && s.chars().all(|c| c.is_ascii_hexdigit())
                    && parse_hex_digits(s)
                        .chunks(2)
                        .all(|pair| pair.len() != 2 || pair[0] != 0xF || pair[1] != 0xF)
            }
            (ParameterKind::Ipv4, Value::Text(s)) => {
                let octets: Vec<&str> = s.split('.').collect();
                octets.len() == 4 && octets.iter().all(|o| o.parse::<u8>().is_ok())
            }
            (ParameterKind::Ascii { n_chars }, Value::Text(s)) => {
                s.len() == *n_chars && s.is_ascii()
            }
            _ => false,
        }
    }
}

/// Encode/decode behaviour of a [`ParameterGroup`].
#[derive(Clone, Debug, PartialEq, Eq)]
enum Codec {
    /// Big-endian nibbles, truncated to the group width.
    Uint,

    /// Name ↔ code table lookup.
    Lookup {
        by_name: HashMap<String, u32>,
        by_code: HashMap<u32, String>,
    },

    /// Literal hex digits, one per nibble.
    HexBlob,

    /// Four octets, two nibbles each.
    Ipv4,

    /// ASCII characters, two nibbles each.
    Ascii,

    /// Value plus a constant offset, e.g. sender addresses on the wire are
    /// the device address plus 8.
    Offset { offset: u32 },

    /// A bank nibble followed by the remainder as a byte:
    /// `[v / modulus, (v % modulus) >> 4, (v % modulus) & 0xF]`.
    Banked { modulus: u32 },
}

/// One or more [`Parameter`]s sharing a codec and a fixed nibble width.
///
/// Groups are handed around as [`Arc`]s: a [`Pattern`][crate::Pattern]
/// identifies the groups it references by pointer, so the same group can be
/// shared between a command and its reply patterns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterGroup {
    parameters: Vec<Parameter>,
    n_hex: usize,
    codec: Codec,
}

impl ParameterGroup {
    /// A bounded integer encoded as big-endian nibbles.
    ///
    /// The width defaults to the minimum number of nibbles needed to
    /// represent the parameter's maximum.
    pub fn uint(parameter: Parameter, n_hex: Option<usize>) -> Arc<Self> {
        let n_hex = n_hex.unwrap_or(match &parameter.kind {
            ParameterKind::Bounded { max, .. } => nibble_width(*max),
            _ => 1,
        });
        Arc::new(Self {
            parameters: vec![parameter],
            n_hex,
            codec: Codec::Uint,
        })
    }

    /// An enumeration with a bidirectional name ↔ code table.
    ///
    /// The width defaults to the minimum number of nibbles needed to
    /// represent the largest code.
    pub fn lookup(name: &str, items: &[(&str, u32)], n_hex: Option<usize>) -> Arc<Self> {
        let n_hex =
            n_hex.unwrap_or_else(|| nibble_width(items.iter().map(|(_, c)| *c).max().unwrap_or(0)));
        let by_name: HashMap<String, u32> =
            items.iter().map(|(n, c)| (n.to_string(), *c)).collect();
        let by_code: HashMap<u32, String> =
            items.iter().map(|(n, c)| (*c, n.to_string())).collect();
        let parameter = Parameter::enumeration(name, items.iter().map(|(n, _)| n.to_string()));
        Arc::new(Self {
            parameters: vec![parameter],
            n_hex,
            codec: Codec::Lookup { by_name, by_code },
        })
    }

    /// A fixed-width literal hex blob.
    pub fn hex_blob(name: &str, n_hex: usize) -> Arc<Self> {
        Arc::new(Self {
            parameters: vec![Parameter::fixed_hex(name, n_hex)],
            n_hex,
            codec: Codec::HexBlob,
        })
    }

    /// An IPv4 address; each octet encodes as two nibbles.
    pub fn ipv4(name: &str) -> Arc<Self> {
        Arc::new(Self {
            parameters: vec![Parameter::ipv4(name)],
            n_hex: 8,
            codec: Codec::Ipv4,
        })
    }

    /// A fixed-length ASCII string; each character encodes as two nibbles.
    pub fn ascii(name: &str, n_chars: usize) -> Arc<Self> {
        Arc::new(Self {
            parameters: vec![Parameter::ascii(name, n_chars)],
            n_hex: n_chars * 2,
            codec: Codec::Ascii,
        })
    }

    /// A bounded integer carried on the wire with a constant offset.
    pub fn offset(parameter: Parameter, offset: u32) -> Arc<Self> {
        Arc::new(Self {
            parameters: vec![parameter],
            n_hex: 1,
            codec: Codec::Offset { offset },
        })
    }

    /// A bounded integer split into a bank nibble and a remainder byte.
    pub fn banked(parameter: Parameter, modulus: u32) -> Arc<Self> {
        Arc::new(Self {
            parameters: vec![parameter],
            n_hex: 3,
            codec: Codec::Banked { modulus },
        })
    }

    pub const fn n_hex(&self) -> usize {
        self.n_hex
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Encodes the group's parameters from `values` into exactly
    /// [`n_hex`][Self::n_hex] nibbles.
    pub fn encode(&self, values: &ParameterMap) -> Result<Vec<u8>> {
        for parameter in &self.parameters {
            let value = values
                .get(parameter.name())
                .ok_or_else(|| Error::MissingParameter {
                    name: parameter.name().to_string(),
                })?;
            if !parameter.validate(value) {
                return Err(Error::InvalidParameter {
                    name: parameter.name().to_string(),
                });
            }
        }

        let nibbles = match &self.codec {
            Codec::Uint => uint_to_nibbles(self.uint_value(values)?, self.n_hex),
            Codec::Lookup { by_name, .. } => {
                let name = self.text_value(values)?;
                // Membership was validated above.
                let code = by_name.get(name).copied().ok_or(Error::InvalidParameter {
                    name: self.parameters[0].name().to_string(),
                })?;
                uint_to_nibbles(code, self.n_hex)
            }
            Codec::HexBlob => parse_hex_digits(self.text_value(values)?),
            Codec::Ipv4 => self
                .text_value(values)?
                .split('.')
                .flat_map(|o| {
                    let octet: u8 = o.parse().unwrap_or_default();
                    [octet >> 4, octet & 0xF]
                })
                .collect(),
            Codec::Ascii => self
                .text_value(values)?
                .bytes()
                .flat_map(|b| [b >> 4, b & 0xF])
                .collect(),
            Codec::Offset { offset } => {
                uint_to_nibbles(self.uint_value(values)? + offset, self.n_hex)
            }
            Codec::Banked { modulus } => {
                let v = self.uint_value(values)?;
                let rem = v % modulus;
                vec![(v / modulus) as u8, (rem >> 4) as u8 & 0xF, rem as u8 & 0xF]
            }
        };

        debug_assert_eq!(nibbles.len(), self.n_hex);
        Ok(nibbles)
    }

    /// Decodes exactly [`n_hex`][Self::n_hex] nibbles back into parameter
    /// values, re-validating the result.
    pub fn decode(&self, nibbles: &[u8]) -> Result<ParameterMap> {
        if nibbles.len() != self.n_hex {
            return Err(Error::NibbleCount {
                expected: self.n_hex,
                actual: nibbles.len(),
            });
        }

        let name = self.parameters[0].name().to_string();
        let value = match &self.codec {
            Codec::Uint => Value::Uint(nibbles_to_uint(nibbles)),
            Codec::Lookup { by_code, .. } => {
                let code = nibbles_to_uint(nibbles);
                Value::Text(
                    by_code
                        .get(&code)
                        .cloned()
                        .ok_or(Error::UnknownCode { code })?,
                )
            }
            Codec::HexBlob => Value::Text(
                nibbles
                    .iter()
                    .map(|n| char::from_digit(u32::from(*n), 16).unwrap_or('0'))
                    .collect::<String>()
                    .to_uppercase(),
            ),
            Codec::Ipv4 => Value::Text(
                nibbles
                    .chunks(2)
                    .map(|pair| (pair[0] << 4 | pair[1]).to_string())
                    .collect::<Vec<_>>()
                    .join("."),
            ),
            Codec::Ascii => Value::Text(
                nibbles
                    .chunks(2)
                    .map(|pair| char::from(pair[0] << 4 | pair[1]))
                    .collect(),
            ),
            Codec::Offset { offset } => Value::Uint(
                nibbles_to_uint(nibbles)
                    .checked_sub(*offset)
                    .ok_or_else(|| Error::InvalidParameter { name: name.clone() })?,
            ),
            Codec::Banked { modulus } => Value::Uint(
                u32::from(nibbles[0]) * modulus
                    + u32::from(nibbles[1] << 4 | nibbles[2]),
            ),
        };

        if !self.parameters[0].validate(&value) {
            return Err(Error::InvalidParameter { name });
        }

        let mut values = ParameterMap::new();
        values.insert(name, value);
        Ok(values)
    }

    fn uint_value(&self, values: &ParameterMap) -> Result<u32> {
        let name = self.parameters[0].name();
        values
            .get(name)
            .and_then(Value::as_uint)
            .ok_or_else(|| Error::InvalidParameter {
                name: name.to_string(),
            })
    }

    fn text_value<'a>(&self, values: &'a ParameterMap) -> Result<&'a str> {
        let name = self.parameters[0].name();
        values
            .get(name)
            .and_then(Value::as_text)
            .ok_or_else(|| Error::InvalidParameter {
                name: name.to_string(),
            })
    }
}

/// Minimum number of nibbles needed to represent `v`.
const fn nibble_width(v: u32) -> usize {
    if v == 0 {
        return 1;
    }
    ((32 - v.leading_zeros() as usize) + 3) / 4
}

/// Big-endian nibble encoding, truncating overflow to `width`.
fn uint_to_nibbles(v: u32, width: usize) -> Vec<u8> {
    (0..width)
        .map(|i| (v >> (4 * (width - i - 1))) as u8 & 0xF)
        .collect()
}

fn nibbles_to_uint(nibbles: &[u8]) -> u32 {
    nibbles.iter().fold(0, |acc, n| acc << 4 | u32::from(*n))
}

fn parse_hex_digits(s: &str) -> Vec<u8> {
    s.chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn values(entries: &[(&str, Value)]) -> ParameterMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn bounded_validation() {
        let speed = Parameter::bounded("Speed", 0, 7);
        assert!(speed.validate(&Value::Uint(0)));
        assert!(speed.validate(&Value::Uint(7)));
        assert!(!speed.validate(&Value::Uint(8)));
        assert!(!speed.validate(&Value::Text("7".to_string())));
    }

    #[test]
    fn uint_default_width() {
        let group = ParameterGroup::uint(Parameter::bounded("Zoom Position", 0, 0x4000), None);
        assert_eq!(4, group.n_hex());

        let group = ParameterGroup::uint(Parameter::bounded("Speed", 0, 7), None);
        assert_eq!(1, group.n_hex());
    }

    #[test]
    fn uint_round_trip() {
        let group = ParameterGroup::uint(Parameter::bounded("Zoom Position", 0, 0x4000), Some(4));
        let d = values(&[("Zoom Position", Value::Uint(0x1234))]);
        let nibbles = group.encode(&d).unwrap();
        assert_eq!(vec![1, 2, 3, 4], nibbles);
        assert_eq!(d, group.decode(&nibbles).unwrap());
    }

    #[test]
    fn uint_missing_and_invalid() {
        let group = ParameterGroup::uint(Parameter::bounded("Speed", 0, 7), None);
        assert!(matches!(
            group.encode(&ParameterMap::new()),
            Err(Error::MissingParameter { .. })
        ));
        assert!(matches!(
            group.encode(&values(&[("Speed", Value::Uint(9))])),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn lookup_round_trip() {
        let group = ParameterGroup::lookup("Power", &[("On", 0x2), ("Off", 0x3)], None);
        assert_eq!(1, group.n_hex());
        let d = values(&[("Power", Value::Text("On".to_string()))]);
        let nibbles = group.encode(&d).unwrap();
        assert_eq!(vec![2], nibbles);
        assert_eq!(d, group.decode(&nibbles).unwrap());
    }

    #[test]
    fn lookup_unknown_code() {
        let group = ParameterGroup::lookup("Power", &[("On", 0x2), ("Off", 0x3)], None);
        assert!(matches!(
            group.decode(&[0x4]),
            Err(Error::UnknownCode { code: 4 })
        ));
    }

    #[test]
    fn lookup_decode_wrong_length() {
        let group = ParameterGroup::lookup("Power", &[("On", 0x2), ("Off", 0x3)], None);
        assert!(matches!(
            group.decode(&[0, 2]),
            Err(Error::NibbleCount {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn ipv4_round_trip() {
        let group = ParameterGroup::ipv4("Address");
        assert_eq!(8, group.n_hex());
        let d = values(&[("Address", Value::Text("192.168.0.10".to_string()))]);
        let nibbles = group.encode(&d).unwrap();
        assert_eq!(vec![0xC, 0x0, 0xA, 0x8, 0x0, 0x0, 0x0, 0xA], nibbles);
        assert_eq!(d, group.decode(&nibbles).unwrap());
    }

    #[test]
    fn ipv4_rejects_bad_octets() {
        let address = Parameter::ipv4("Address");
        assert!(!address.validate(&Value::Text("192.168.0".to_string())));
        assert!(!address.validate(&Value::Text("192.168.0.256".to_string())));
    }

    #[test]
    fn ascii_round_trip() {
        let group = ParameterGroup::ascii("Name", 4);
        assert_eq!(8, group.n_hex());
        let d = values(&[("Name", Value::Text("CAM1".to_string()))]);
        let nibbles = group.encode(&d).unwrap();
        assert_eq!(vec![0x4, 0x3, 0x4, 0x1, 0x4, 0xD, 0x3, 0x1], nibbles);
        assert_eq!(d, group.decode(&nibbles).unwrap());
    }

    #[test]
    fn hex_blob_round_trip() {
        let group = ParameterGroup::hex_blob("Rom Version", 4);
        let d = values(&[("Rom Version", Value::Text("01A5".to_string()))]);
        let nibbles = group.encode(&d).unwrap();
        assert_eq!(vec![0x0, 0x1, 0xA, 0x5], nibbles);
        assert_eq!(d, group.decode(&nibbles).unwrap());
    }

    #[test]
    fn hex_blob_rejects_terminator_byte() {
        let blob = Parameter::fixed_hex("Blob", 4);
        assert!(blob.validate(&Value::Text("01FE".to_string())));
        assert!(!blob.validate(&Value::Text("01FF".to_string())));
        assert!(!blob.validate(&Value::Text("015".to_string())));
        assert!(!blob.validate(&Value::Text("01G5".to_string())));
    }

    #[test]
    fn offset_round_trip() {
        let group = ParameterGroup::offset(Parameter::bounded("Address", 1, 7), 8);
        let d = values(&[("Address", Value::Uint(1))]);
        let nibbles = group.encode(&d).unwrap();
        assert_eq!(vec![9], nibbles);
        assert_eq!(d, group.decode(&nibbles).unwrap());
    }

    #[test]
    fn offset_decode_out_of_range() {
        let group = ParameterGroup::offset(Parameter::bounded("Address", 1, 7), 8);
        // 8 decodes to address 0, which is outside 1..=7.
        assert!(matches!(
            group.decode(&[8]),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn banked_round_trip() {
        let group = ParameterGroup::banked(Parameter::bounded("Memory Number", 0, 255), 128);
        let d = values(&[("Memory Number", Value::Uint(130))]);
        let nibbles = group.encode(&d).unwrap();
        assert_eq!(vec![1, 0, 2], nibbles);
        assert_eq!(d, group.decode(&nibbles).unwrap());

        let d = values(&[("Memory Number", Value::Uint(127))]);
        let nibbles = group.encode(&d).unwrap();
        assert_eq!(vec![0, 7, 0xF], nibbles);
        assert_eq!(d, group.decode(&nibbles).unwrap());
    }
}
