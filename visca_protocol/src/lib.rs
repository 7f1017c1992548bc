#![doc = include_str!("../README.md")]

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate tracing;

mod error;
pub mod frame;
pub mod marshall;
pub mod packet;
pub mod param;
pub mod pattern;

pub use crate::{
    error::Error,
    frame::{Frame, PayloadKind},
    packet::{
        Command, CommandSet, CommandSpec, FamilySpec, Packet, PacketKind, ReplySpec, RootSpec,
        Scope,
    },
    param::{Parameter, ParameterGroup, ParameterMap, Value},
    pattern::{Binding, Pattern},
};

/// Result type.
pub type Result<T = ()> = std::result::Result<T, Error>;
