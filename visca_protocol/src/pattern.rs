//! Hex-template patterns with embedded parameter slots.
//!
//! A pattern is compiled from a compact template string such as
//! `"8x 01 04 07 2p FF"`: hex digits become literal nibbles, any other
//! letter is a *marker* standing in for one nibble of a bound
//! [`ParameterGroup`]'s output. Whitespace is ignored.
//!
//! Patterns compose: command framing is expressed by concatenating an
//! inherited prefix, a command-specific core, and an inherited postfix
//! (see [`crate::packet`]).

use crate::{
    param::{ParameterGroup, ParameterMap},
    Error, Result,
};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

/// One nibble position of a [`Pattern`].
#[derive(Clone, Debug, PartialEq, Eq)]
enum Slot {
    /// A fixed nibble value (`0..=0xF`).
    Literal(u8),

    /// The `nibble`-th output nibble of the `group`-th referenced group.
    Group { group: usize, nibble: usize },
}

/// Binds the marker letters of a template to a [`ParameterGroup`].
///
/// `markers` names one marker letter per output nibble of the group, in
/// order; `"pqrs"` maps the group's four nibbles to the markers `p`, `q`,
/// `r` and `s`. Repeating a letter (`"pp"`) consumes successive
/// occurrences of that letter in the template.
#[derive(Clone, Debug)]
pub struct Binding {
    markers: String,
    group: Arc<ParameterGroup>,
}

impl Binding {
    pub fn new(markers: &str, group: &Arc<ParameterGroup>) -> Self {
        Self {
            markers: markers.to_string(),
            group: group.clone(),
        }
    }
}

/// An ordered sequence of wire slots, referencing zero or more
/// [`ParameterGroup`]s.
#[derive(Clone, Debug, Default)]
pub struct Pattern {
    slots: Vec<Slot>,
    groups: Vec<Arc<ParameterGroup>>,
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.slots == other.slots
            && self.groups.len() == other.groups.len()
            && self
                .groups
                .iter()
                .zip(&other.groups)
                .all(|(a, b)| Arc::ptr_eq(a, b) || a == b)
    }
}

impl Pattern {
    /// A zero-length pattern; the identity element of [`Pattern::concat`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compiles a template string against its marker bindings.
    ///
    /// Fails if a binding's width does not match its group, a marker has no
    /// binding, or a bound marker is never consumed by the template. These
    /// are protocol-definition faults: callers treat them as fatal at
    /// start-up.
    pub fn compile(template: &str, bindings: &[Binding]) -> Result<Self> {
        let mut groups: Vec<Arc<ParameterGroup>> = Vec::new();
        let mut pending: HashMap<char, VecDeque<(usize, usize)>> = HashMap::new();

        for binding in bindings {
            if binding.markers.len() != binding.group.n_hex() {
                return Err(Error::MarkerCount {
                    markers: binding.markers.clone(),
                    expected: binding.group.n_hex(),
                });
            }
            let group = intern_group(&mut groups, &binding.group);
            for (nibble, marker) in binding.markers.chars().enumerate() {
                if marker.is_ascii_hexdigit() || marker.is_whitespace() {
                    return Err(Error::InvalidMarker { marker });
                }
                pending.entry(marker).or_default().push_back((group, nibble));
            }
        }

        let mut slots = Vec::new();
        for c in template.chars().filter(|c| !c.is_whitespace()) {
            match c.to_digit(16) {
                Some(v) => slots.push(Slot::Literal(v as u8)),
                None => {
                    let (group, nibble) = pending
                        .get_mut(&c)
                        .and_then(VecDeque::pop_front)
                        .ok_or(Error::UnboundMarker { marker: c })?;
                    slots.push(Slot::Group { group, nibble });
                }
            }
        }

        if let Some((marker, _)) = pending.iter().find(|(_, q)| !q.is_empty()) {
            return Err(Error::UnusedBinding { marker: *marker });
        }

        Ok(Self { slots, groups })
    }

    /// A pattern consisting of nothing but one group's nibbles.
    pub fn from_group(group: &Arc<ParameterGroup>) -> Self {
        Self {
            slots: (0..group.n_hex())
                .map(|nibble| Slot::Group { group: 0, nibble })
                .collect(),
            groups: vec![group.clone()],
        }
    }

    /// Concatenates patterns in order, unioning their group references.
    ///
    /// Concatenating with [`Pattern::empty`] is a no-op, which is how
    /// optional prefix/postfix fragments compose.
    pub fn concat(parts: &[&Pattern]) -> Pattern {
        let mut out = Pattern::default();
        for part in parts {
            let remap: Vec<usize> = part
                .groups
                .iter()
                .map(|g| intern_group(&mut out.groups, g))
                .collect();
            out.slots.extend(part.slots.iter().map(|slot| match slot {
                Slot::Literal(v) => Slot::Literal(*v),
                Slot::Group { group, nibble } => Slot::Group {
                    group: remap[*group],
                    nibble: *nibble,
                },
            }));
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Pattern length in nibbles.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Encodes every referenced group once, fills the template slots, and
    /// packs adjacent nibble pairs into bytes (first nibble high).
    pub fn write_payload(&self, values: &ParameterMap) -> Result<Vec<u8>> {
        if self.slots.len() % 2 != 0 {
            return Err(Error::OddPatternLength {
                nibbles: self.slots.len(),
            });
        }

        let encoded: Vec<Vec<u8>> = self
            .groups
            .iter()
            .map(|g| g.encode(values))
            .collect::<Result<_>>()?;

        Ok(self
            .slots
            .chunks(2)
            .map(|pair| self.nibble(&pair[0], &encoded) << 4 | self.nibble(&pair[1], &encoded))
            .collect())
    }

    /// Matches a payload against this pattern and decodes the referenced
    /// groups.
    ///
    /// A length difference or a literal-slot mismatch returns
    /// [`Error::Mismatch`]; callers iterating candidate reply patterns
    /// treat that as "try the next one".
    pub fn read_payload(&self, payload: &[u8]) -> Result<ParameterMap> {
        if payload.len() * 2 != self.slots.len() {
            return Err(Error::Mismatch);
        }

        let mut collected: Vec<Vec<u8>> =
            self.groups.iter().map(|g| vec![0; g.n_hex()]).collect();
        for (i, slot) in self.slots.iter().enumerate() {
            let nibble = if i % 2 == 0 {
                payload[i / 2] >> 4
            } else {
                payload[i / 2] & 0xF
            };
            match slot {
                Slot::Literal(v) => {
                    if *v != nibble {
                        return Err(Error::Mismatch);
                    }
                }
                Slot::Group { group, nibble: idx } => collected[*group][*idx] = nibble,
            }
        }

        let mut values = ParameterMap::new();
        for (group, nibbles) in self.groups.iter().zip(&collected) {
            values.append(&mut group.decode(nibbles)?);
        }
        Ok(values)
    }

    fn nibble(&self, slot: &Slot, encoded: &[Vec<u8>]) -> u8 {
        match slot {
            Slot::Literal(v) => *v,
            Slot::Group { group, nibble } => encoded[*group][*nibble],
        }
    }
}

/// Appends `group` to `groups` unless an identical reference is already
/// present, returning its index.
fn intern_group(groups: &mut Vec<Arc<ParameterGroup>>, group: &Arc<ParameterGroup>) -> usize {
    match groups.iter().position(|g| Arc::ptr_eq(g, group)) {
        Some(i) => i,
        None => {
            groups.push(group.clone());
            groups.len() - 1
        }
    }
}
