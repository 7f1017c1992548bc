//! Packets, commands, and the command hierarchy builder.
//!
//! VISCA command sets nest: the root declares the addressing byte and the
//! `FF` terminator, a family like `command` adds the `01` domain selector
//! and the Ack/Completion reply family, and leaf commands contribute only
//! their core byte sequence. [`Scope`] models that nesting; everything is
//! resolved to flat, immutable [`Command`]s when the tree is built, so a
//! lookup never recomputes framing.

use crate::{param::ParameterMap, pattern::Pattern, Error, Result};
use std::{collections::HashMap, sync::Arc};

/// Semantic role of a packet on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketKind {
    /// Device error reply.
    Error,
    /// Command accepted, execution started on a device socket.
    Ack,
    /// Command execution finished.
    Completion,
    /// Inquiry or device-setting reply carrying data.
    Answer,
    /// An action command (Ack-then-Completion semantics).
    Command,
    /// A read-only inquiry (single answer).
    Inquiry,
    /// Interface-level command (single answer, no device socket).
    DeviceSettingCommand,
}

impl PacketKind {
    /// Whether sending a packet of this kind occupies one of the device's
    /// finite command sockets.
    pub const fn consumes_socket(self) -> bool {
        matches!(self, PacketKind::Command)
    }
}

/// A named, fully-resolved wire pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    name: String,
    kind: PacketKind,
    pattern: Pattern,
}

impl Packet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn kind(&self) -> PacketKind {
        self.kind
    }

    pub const fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}

/// A sendable packet together with its legal replies.
#[derive(Clone, Debug)]
pub struct Command {
    path: Vec<String>,
    kind: PacketKind,
    pattern: Pattern,
    replies: Vec<Arc<Packet>>,
}

impl Command {
    /// Hierarchical name path, e.g. `["command", "CAM_Power", "On"]`.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub const fn kind(&self) -> PacketKind {
        self.kind
    }

    pub const fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Candidate replies, ancestors' first, in declaration order.
    pub fn replies(&self) -> &[Arc<Packet>] {
        &self.replies
    }

    /// Matches a reply payload against each candidate in order; the first
    /// pattern that decodes without error wins.
    pub fn identify_reply(&self, payload: &[u8]) -> Option<(Arc<Packet>, ParameterMap)> {
        self.replies
            .iter()
            .find_map(|reply| match reply.pattern.read_payload(payload) {
                Ok(values) => Some((reply.clone(), values)),
                Err(_) => None,
            })
    }
}

/// A reply declaration, resolved against the declaring scope's reply
/// framing when the tree is built.
#[derive(Clone, Debug)]
pub struct ReplySpec {
    name: String,
    kind: PacketKind,
    pattern: Pattern,
    /// When set, `pattern` is used verbatim instead of being wrapped in the
    /// scope's reply framing.
    raw: bool,
}

impl ReplySpec {
    pub fn new(name: &str, kind: PacketKind, core: Pattern) -> Self {
        Self {
            name: name.to_string(),
            kind,
            pattern: core,
            raw: false,
        }
    }

    /// A reply matched against its full payload, bypassing the scope's
    /// reply framing (e.g. the echoed broadcast `IF_Clear`).
    pub fn raw(name: &str, kind: PacketKind, pattern: Pattern) -> Self {
        Self {
            name: name.to_string(),
            kind,
            pattern,
            raw: true,
        }
    }
}

/// Configuration of the root [`Scope`].
pub struct RootSpec {
    /// Shared command prefix (the addressing byte).
    pub prefix: Pattern,
    /// Shared command postfix (the terminator).
    pub postfix: Pattern,
    /// Default kind for commands that do not override it.
    pub kind: PacketKind,
    /// Framing for non-error replies.
    pub answer_prefix: Pattern,
    pub answer_postfix: Pattern,
    /// Framing for error replies.
    pub error_prefix: Pattern,
    pub error_postfix: Pattern,
    /// The domain's generic replies, inherited by every command.
    pub replies: Vec<ReplySpec>,
}

/// Extensions a child family applies to its parent scope.
#[derive(Default)]
pub struct FamilySpec {
    /// Appended to the inherited prefix.
    pub prefix: Pattern,
    /// Prepended to the inherited postfix.
    pub postfix: Pattern,
    /// Overrides the inherited command kind.
    pub kind: Option<PacketKind>,
    /// Appended to the inherited answer framing.
    pub answer_prefix: Pattern,
    pub answer_postfix: Pattern,
    /// Appended to the inherited error framing.
    pub error_prefix: Pattern,
    pub error_postfix: Pattern,
    /// Additional replies, unioned with the inherited set.
    pub replies: Vec<ReplySpec>,
}

/// Declaration of a terminal command.
#[derive(Default)]
pub struct CommandSpec {
    /// Core fragment, wrapped in the scope's prefix/postfix.
    pub core: Pattern,
    /// Full-pattern override; when set, `core` and the scope framing are
    /// ignored (e.g. the broadcast `IF_Clear`, which escapes the addressed
    /// prefix).
    pub pattern: Option<Pattern>,
    /// Overrides the scope's command kind.
    pub kind: Option<PacketKind>,
    /// Command-specific replies, unioned with the inherited set.
    pub replies: Vec<ReplySpec>,
}

impl CommandSpec {
    pub fn core(core: Pattern) -> Self {
        Self {
            core,
            ..Default::default()
        }
    }

    pub fn raw(pattern: Pattern) -> Self {
        Self {
            pattern: Some(pattern),
            ..Default::default()
        }
    }

    pub fn with_replies(mut self, replies: Vec<ReplySpec>) -> Self {
        self.replies = replies;
        self
    }
}

enum ScopeEntry {
    Family(Scope),
    Command(Arc<Command>),
}

/// A node of the command hierarchy while it is being built.
///
/// Prefixes, postfixes, reply framing and the inherited reply set are
/// computed once, when the child scope or command is declared.
pub struct Scope {
    path: Vec<String>,
    prefix: Pattern,
    postfix: Pattern,
    kind: PacketKind,
    answer_prefix: Pattern,
    answer_postfix: Pattern,
    error_prefix: Pattern,
    error_postfix: Pattern,
    replies: Vec<Arc<Packet>>,
    children: HashMap<String, ScopeEntry>,
}

impl Scope {
    pub fn root(spec: RootSpec) -> Self {
        let mut scope = Self {
            path: Vec::new(),
            prefix: spec.prefix,
            postfix: spec.postfix,
            kind: spec.kind,
            answer_prefix: spec.answer_prefix,
            answer_postfix: spec.answer_postfix,
            error_prefix: spec.error_prefix,
            error_postfix: spec.error_postfix,
            replies: Vec::new(),
            children: HashMap::new(),
        };
        scope.replies = spec
            .replies
            .into_iter()
            .map(|r| scope.resolve_reply(r))
            .collect();
        scope
    }

    /// Declares a nested command family, returning its scope.
    pub fn family(&mut self, name: &str, spec: FamilySpec) -> &mut Scope {
        let mut path = self.path.clone();
        path.push(name.to_string());

        let mut child = Scope {
            path,
            prefix: Pattern::concat(&[&self.prefix, &spec.prefix]),
            postfix: Pattern::concat(&[&spec.postfix, &self.postfix]),
            kind: spec.kind.unwrap_or(self.kind),
            answer_prefix: Pattern::concat(&[&self.answer_prefix, &spec.answer_prefix]),
            answer_postfix: Pattern::concat(&[&spec.answer_postfix, &self.answer_postfix]),
            error_prefix: Pattern::concat(&[&self.error_prefix, &spec.error_prefix]),
            error_postfix: Pattern::concat(&[&spec.error_postfix, &self.error_postfix]),
            replies: self.replies.clone(),
            children: HashMap::new(),
        };
        let additions: Vec<Arc<Packet>> = spec
            .replies
            .into_iter()
            .map(|r| child.resolve_reply(r))
            .collect();
        child.replies.extend(additions);

        if self
            .children
            .insert(name.to_string(), ScopeEntry::Family(child))
            .is_some()
        {
            warn!("replacing existing entry {name:?}");
        }
        let Some(ScopeEntry::Family(scope)) = self.children.get_mut(name) else {
            unreachable!("family {name:?} was just inserted");
        };
        scope
    }

    /// Declares a terminal command, resolving its final pattern and
    /// candidate reply list.
    pub fn command(&mut self, name: &str, spec: CommandSpec) -> Arc<Command> {
        let pattern = match spec.pattern {
            Some(pattern) => pattern,
            None => Pattern::concat(&[&self.prefix, &spec.core, &self.postfix]),
        };

        let mut replies = self.replies.clone();
        replies.extend(spec.replies.into_iter().map(|r| self.resolve_reply(r)));

        let mut path = self.path.clone();
        path.push(name.to_string());

        let command = Arc::new(Command {
            path,
            kind: spec.kind.unwrap_or(self.kind),
            pattern,
            replies,
        });
        if self
            .children
            .insert(name.to_string(), ScopeEntry::Command(command.clone()))
            .is_some()
        {
            warn!("replacing existing entry {name:?}");
        }
        command
    }

    /// Freezes the (root) scope into an immutable, lookup-only tree.
    pub fn finish(self) -> CommandSet {
        CommandSet { root: freeze(self) }
    }

    fn resolve_reply(&self, spec: ReplySpec) -> Arc<Packet> {
        let pattern = if spec.raw {
            spec.pattern
        } else if spec.kind == PacketKind::Error {
            Pattern::concat(&[&self.error_prefix, &spec.pattern, &self.error_postfix])
        } else {
            Pattern::concat(&[&self.answer_prefix, &spec.pattern, &self.answer_postfix])
        };
        Arc::new(Packet {
            name: spec.name,
            kind: spec.kind,
            pattern,
        })
    }
}

fn freeze(scope: Scope) -> Node {
    Node {
        children: scope
            .children
            .into_iter()
            .map(|(name, entry)| {
                let entry = match entry {
                    ScopeEntry::Family(child) => NodeEntry::Family(freeze(child)),
                    ScopeEntry::Command(command) => NodeEntry::Command(command),
                };
                (name, entry)
            })
            .collect(),
    }
}

struct Node {
    children: HashMap<String, NodeEntry>,
}

enum NodeEntry {
    Family(Node),
    Command(Arc<Command>),
}

/// An immutable, fully-resolved command tree.
pub struct CommandSet {
    root: Node,
}

impl CommandSet {
    /// Looks up a command by hierarchical name path.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Result<Arc<Command>> {
        let mut node = &self.root;
        for (i, segment) in path.iter().enumerate() {
            let segment = segment.as_ref();
            match node.children.get(segment) {
                Some(NodeEntry::Command(command)) if i == path.len() - 1 => {
                    return Ok(command.clone())
                }
                Some(NodeEntry::Family(child)) if i < path.len() - 1 => node = child,
                _ => {
                    return Err(Error::CommandNotFound {
                        segment: segment.to_string(),
                    })
                }
            }
        }
        Err(Error::CommandNotFound {
            segment: path
                .last()
                .map(|s| s.as_ref().to_string())
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        param::{Parameter, ParameterGroup, ParameterMap, Value},
        pattern::Binding,
    };

    fn values(entries: &[(&str, Value)]) -> ParameterMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// A minimal two-level tree with the real VISCA framing.
    fn tiny_set() -> CommandSet {
        let address = ParameterGroup::uint(Parameter::bounded("Address", 1, 7), None);
        let sender = ParameterGroup::offset(Parameter::bounded("Address", 1, 7), 8);
        let socket = ParameterGroup::uint(Parameter::bounded("Socket", 1, 2), None);

        let mut root = Scope::root(RootSpec {
            prefix: Pattern::compile("8x", &[Binding::new("x", &address)]).unwrap(),
            postfix: Pattern::compile("FF", &[]).unwrap(),
            kind: PacketKind::Command,
            answer_prefix: Pattern::compile("X0", &[Binding::new("X", &sender)]).unwrap(),
            answer_postfix: Pattern::compile("FF", &[]).unwrap(),
            error_prefix: Pattern::compile("X0", &[Binding::new("X", &sender)]).unwrap(),
            error_postfix: Pattern::compile("FF", &[]).unwrap(),
            replies: vec![ReplySpec::new(
                "Syntax Error",
                PacketKind::Error,
                Pattern::compile("60 02", &[]).unwrap(),
            )],
        });

        {
            let command = root.family(
                "command",
                FamilySpec {
                    prefix: Pattern::compile("01", &[]).unwrap(),
                    replies: vec![
                        ReplySpec::new(
                            "Ack",
                            PacketKind::Ack,
                            Pattern::compile("4y", &[Binding::new("y", &socket)]).unwrap(),
                        ),
                        ReplySpec::new(
                            "Completion",
                            PacketKind::Completion,
                            Pattern::compile("5y", &[Binding::new("y", &socket)]).unwrap(),
                        ),
                    ],
                    ..Default::default()
                },
            );
            let power = command.family(
                "CAM_Power",
                FamilySpec {
                    prefix: Pattern::compile("04 00", &[]).unwrap(),
                    ..Default::default()
                },
            );
            power.command("On", CommandSpec::core(Pattern::compile("02", &[]).unwrap()));
            power.command("Off", CommandSpec::core(Pattern::compile("03", &[]).unwrap()));
        }

        root.finish()
    }

    #[test]
    fn resolved_pattern_includes_all_framing() {
        let set = tiny_set();
        let on = set.lookup(&["command", "CAM_Power", "On"]).unwrap();

        assert_eq!(PacketKind::Command, on.kind());
        assert_eq!(vec!["command", "CAM_Power", "On"], on.path().to_vec());
        let payload = on
            .pattern()
            .write_payload(&values(&[("Address", Value::Uint(1))]))
            .unwrap();
        assert_eq!(vec![0x81, 0x01, 0x04, 0x00, 0x02, 0xFF], payload);
    }

    #[test]
    fn replies_are_unioned_in_declaration_order() {
        let set = tiny_set();
        let on = set.lookup(&["command", "CAM_Power", "On"]).unwrap();
        let names: Vec<&str> = on.replies().iter().map(|r| r.name()).collect();
        assert_eq!(vec!["Syntax Error", "Ack", "Completion"], names);
    }

    #[test]
    fn identify_reply_is_deterministic() {
        let set = tiny_set();
        let on = set.lookup(&["command", "CAM_Power", "On"]).unwrap();

        // Ack on socket 1 from address 1.
        let (packet, values) = on.identify_reply(&[0x90, 0x41, 0xFF]).unwrap();
        assert_eq!("Ack", packet.name());
        assert_eq!(PacketKind::Ack, packet.kind());
        assert_eq!(Some(1), values.get("Socket").and_then(Value::as_uint));

        // Completion on socket 2.
        let (packet, _) = on.identify_reply(&[0x90, 0x52, 0xFF]).unwrap();
        assert_eq!("Completion", packet.name());

        // Syntax error.
        let (packet, _) = on.identify_reply(&[0x90, 0x60, 0x02, 0xFF]).unwrap();
        assert_eq!("Syntax Error", packet.name());

        // Unrecognisable.
        assert!(on.identify_reply(&[0x90, 0x7F, 0xFF]).is_none());
    }

    #[test]
    fn lookup_unknown_segment() {
        let set = tiny_set();
        assert!(matches!(
            set.lookup(&["command", "CAM_Zoom", "Stop"]),
            Err(Error::CommandNotFound { .. })
        ));
    }

    #[test]
    fn lookup_family_is_not_a_command() {
        let set = tiny_set();
        assert!(matches!(
            set.lookup(&["command", "CAM_Power"]),
            Err(Error::CommandNotFound { .. })
        ));
        assert!(matches!(
            set.lookup::<&str>(&[]),
            Err(Error::CommandNotFound { .. })
        ));
    }

    #[test]
    fn raw_command_override() {
        let mut root = Scope::root(RootSpec {
            prefix: Pattern::compile("8", &[]).unwrap(),
            postfix: Pattern::compile("FF", &[]).unwrap(),
            kind: PacketKind::DeviceSettingCommand,
            answer_prefix: Pattern::empty(),
            answer_postfix: Pattern::empty(),
            error_prefix: Pattern::empty(),
            error_postfix: Pattern::empty(),
            replies: Vec::new(),
        });
        let broadcast = root.command(
            "IF_Clear (broadcast)",
            CommandSpec::raw(Pattern::compile("88 01 00 01 FF", &[]).unwrap()).with_replies(vec![
                ReplySpec::raw(
                    "Ack",
                    PacketKind::Answer,
                    Pattern::compile("88 01 00 01 FF", &[]).unwrap(),
                ),
            ]),
        );

        let payload = broadcast
            .pattern()
            .write_payload(&ParameterMap::new())
            .unwrap();
        assert_eq!(vec![0x88, 0x01, 0x00, 0x01, 0xFF], payload);
        let (packet, _) = broadcast.identify_reply(&payload).unwrap();
        assert_eq!("Ack", packet.name());
    }
}
