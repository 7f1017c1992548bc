//! UDP wire framing for VISCA-over-IP.
//!
//! Each datagram carries exactly one frame:
//!
//! * `u16`: [payload kind tag][PayloadKind]
//! * `u16`: payload length
//! * `u32`: sequence number
//! * payload bytes (the VISCA command/reply sequence, itself terminated by
//!   `0xFF`)
//!
//! All integers are big-endian.

use crate::{packet::PacketKind, Result};
use binrw::{binrw, BinRead, BinWrite};
use std::io::Cursor;

/// Payload kind tag of a [`Frame`].
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    #[brw(magic = 0x0100u16)]
    Command,
    #[brw(magic = 0x0110u16)]
    Inquiry,
    #[brw(magic = 0x0111u16)]
    Reply,
    #[brw(magic = 0x0120u16)]
    DeviceSettingCommand,
    #[brw(magic = 0x0200u16)]
    ControlCommand,
    #[brw(magic = 0x0201u16)]
    ControlReply,
}

impl PayloadKind {
    /// Tag used when sending a packet of the given kind, or [`None`] for
    /// kinds which only ever appear inside reply payloads.
    pub const fn for_packet(kind: PacketKind) -> Option<Self> {
        match kind {
            PacketKind::Command => Some(Self::Command),
            PacketKind::Inquiry => Some(Self::Inquiry),
            PacketKind::DeviceSettingCommand => Some(Self::DeviceSettingCommand),
            _ => None,
        }
    }
}

/// Payload of the sequence-reset control command and its acknowledgement.
pub const RESET_PAYLOAD: [u8; 1] = [0x01];

/// [`Frame`] is the unit of communication with the camera over UDP.
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: PayloadKind,

    #[br(temp)]
    #[bw(try_calc(u16::try_from(payload.len())))]
    length: u16,

    /// Sequence number correlating replies with requests. `0` is only used
    /// by the reset handshake.
    pub sequence: u32,

    #[br(count = length)]
    pub payload: Vec<u8>,
}

impl Frame {
    /// Header length in bytes.
    pub const HEADERS_LENGTH: usize = 8;
    /// Maximum frame size accepted from the wire, including headers.
    pub const MAX_FRAME_LENGTH: usize = Self::HEADERS_LENGTH + 512;

    pub fn new(kind: PayloadKind, sequence: u32, payload: Vec<u8>) -> Self {
        Self {
            kind,
            sequence,
            payload,
        }
    }

    /// The control command opening a sequence-number epoch.
    pub fn control_reset() -> Self {
        Self::new(PayloadKind::ControlCommand, 0, RESET_PAYLOAD.to_vec())
    }

    /// Whether this frame acknowledges [`Frame::control_reset`].
    pub fn is_reset_ack(&self) -> bool {
        self.kind == PayloadKind::ControlReply
            && self.sequence == 0
            && self.payload == RESET_PAYLOAD
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::with_capacity(Self::HEADERS_LENGTH + self.payload.len()));
        self.write(&mut out)?;
        Ok(out.into_inner())
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(Self::read(&mut Cursor::new(data))?)
    }
}
