//! Transport channel for VISCA-over-IP.
//!
//! Cameras typically listen on UDP port 52381. One [`Frame`] per datagram.

use crate::{Error, Result};
use binrw::{BinRead, BinWrite};
use std::{
    io::Cursor,
    net::{Ipv4Addr, SocketAddrV4},
};
use tokio::net::{ToSocketAddrs, UdpSocket};
use visca_protocol::Frame;

pub struct ViscaUdpChannel {
    sock: Option<UdpSocket>,
}

impl ViscaUdpChannel {
    pub fn new() -> Self {
        Self { sock: None }
    }

    pub async fn connect<A: ToSocketAddrs>(&mut self, addr: A) -> Result {
        let sock = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
        sock.connect(addr).await?;
        self.sock = Some(sock);
        Ok(())
    }

    pub async fn send(&self, frame: &Frame) -> Result {
        let sock = self.sock.as_ref().ok_or(Error::ChannelUnavailable)?;
        let mut out = Cursor::new(Vec::new());
        frame.write(&mut out)?;
        let out = out.into_inner();
        trace!(">>> {}", hex::encode(&out));
        sock.send(&out).await?;
        Ok(())
    }

    pub async fn recv(&self) -> Result<Frame> {
        let sock = self.sock.as_ref().ok_or(Error::ChannelUnavailable)?;
        let mut b = [0u8; Frame::MAX_FRAME_LENGTH];
        let l = sock.recv(&mut b).await?;
        let b = &b[..l];
        trace!("<<< {}", hex::encode(b));

        Ok(Frame::read(&mut Cursor::new(b))?)
    }
}

impl Default for ViscaUdpChannel {
    fn default() -> Self {
        Self::new()
    }
}
