#![doc = include_str!("../README.md")]

#[macro_use]
extern crate tracing;

mod camera;
mod error;
mod request;
mod udp;

pub use {
    crate::{
        camera::ViscaCamera,
        error::{Error, RequestError},
        request::{Reply, RequestHandle, Stage},
        udp::ViscaUdpChannel,
    },
    visca_protocol as protocol,
};

/// Result type.
pub type Result<T = ()> = std::result::Result<T, Error>;
