//! Camera connection, request admission, and the transport event loop.
//!
//! [`ViscaCamera`] is the caller-facing half: it resolves commands, encodes
//! payloads, and enforces the admission bound. The socket itself, the
//! in-flight correlation table and the sequence counter are owned by a
//! single receiver task ([`ViscaReceiver`]), so none of that state needs
//! locking; callers talk to the task over an mpsc channel.

use crate::{
    error::{Error, RequestError},
    request::{Request, RequestHandle},
    udp::ViscaUdpChannel,
    Result,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    net::ToSocketAddrs,
    select,
    sync::{mpsc, Semaphore},
};
use visca_protocol::{Command, CommandSet, Frame, ParameterMap, PayloadKind, Value};

/// Internal type for asynchronous message passing.
enum AsyncCommand {
    /// Transmit a request and track its replies.
    Send(Request),

    /// Shut the connection down, rejecting everything in flight.
    Close,
}

/// A connection to one camera.
///
/// ## General design
///
/// Each connection is serviced by a single receiver task which owns the
/// UDP socket, issues sequence numbers (including the reset handshake),
/// and demultiplexes inbound frames to in-flight requests. Requests whose
/// kind occupies one of the camera's command sockets are admitted through
/// a semaphore sized to the camera's socket count; the slot is released
/// when the request reaches a terminal state, which is when the camera
/// frees its socket too.
pub struct ViscaCamera {
    cmd_tx: mpsc::Sender<AsyncCommand>,
    command_set: Arc<CommandSet>,
    address: u8,
    sockets: Arc<Semaphore>,
}

impl ViscaCamera {
    /// Depth of the command transmit buffer.
    const COMMAND_CHANNEL_SIZE: usize = 16;

    /// Connects to a camera over UDP.
    ///
    /// ## Args
    ///
    /// * `addr`: the camera's UDP socket address
    /// * `command_set`: the camera's command table
    /// * `address`: VISCA receiver address (1–7)
    /// * `n_sockets`: the camera's advertised command socket count
    pub async fn connect_udp<A: ToSocketAddrs>(
        addr: A,
        command_set: Arc<CommandSet>,
        address: u8,
        n_sockets: usize,
    ) -> Result<Self> {
        let mut channel = ViscaUdpChannel::new();
        channel.connect(addr).await?;

        let (cmd_tx, cmd_rx) = mpsc::channel(Self::COMMAND_CHANNEL_SIZE);
        let sockets = Arc::new(Semaphore::new(n_sockets));

        let receiver = ViscaReceiver {
            channel,
            cmd_rx,
            in_flight: HashMap::new(),
            sequence: SequenceCounter::new(),
            sockets: sockets.clone(),
        };
        debug!("spawning receiver task");
        tokio::task::spawn(receiver.run());

        Ok(Self {
            cmd_tx,
            command_set,
            address,
            sockets,
        })
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    pub fn command_set(&self) -> &Arc<CommandSet> {
        &self.command_set
    }

    /// Sends a command, returning a handle to its lifecycle stages.
    ///
    /// Parameter validation happens here, before anything is transmitted.
    /// Socket-consuming commands wait for a free admission slot first;
    /// inquiries and device-setting commands are sent immediately.
    pub async fn send(
        &self,
        command: &Arc<Command>,
        mut parameters: ParameterMap,
    ) -> Result<RequestHandle> {
        let payload_kind =
            PayloadKind::for_packet(command.kind()).ok_or(Error::UnsupportedCommandKind)?;

        parameters
            .entry("Address".to_string())
            .or_insert(Value::Uint(self.address.into()));
        let payload = command.pattern().write_payload(&parameters)?;

        let permit = if command.kind().consumes_socket() {
            Some(
                self.sockets
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::ChannelUnavailable)?,
            )
        } else {
            None
        };

        let (request, handle) = Request::new(command.clone(), parameters, payload, payload_kind, permit);
        self.cmd_tx
            .send(AsyncCommand::Send(request))
            .await
            .map_err(|_| Error::ChannelUnavailable)?;
        Ok(handle)
    }

    /// Resolves a path through the command table and sends it.
    pub async fn send_path<S: AsRef<str>>(
        &self,
        path: &[S],
        parameters: ParameterMap,
    ) -> Result<RequestHandle> {
        let command = self.command_set.lookup(path)?;
        self.send(&command, parameters).await
    }

    /// Sends an action command (`command` family).
    pub async fn send_command(
        &self,
        path: &[&str],
        parameters: ParameterMap,
    ) -> Result<RequestHandle> {
        self.send_path(&family_path("command", path), parameters)
            .await
    }

    /// Sends an inquiry (`inquiry` family).
    pub async fn send_inquiry(&self, path: &[&str]) -> Result<RequestHandle> {
        self.send_path(&family_path("inquiry", path), ParameterMap::new())
            .await
    }

    /// Sends a device-setting command (`device setting command` family).
    pub async fn send_device_setting(
        &self,
        path: &[&str],
        parameters: ParameterMap,
    ) -> Result<RequestHandle> {
        self.send_path(&family_path("device setting command", path), parameters)
            .await
    }

    /// Closes the connection. All in-flight requests are rejected with
    /// [`RequestError::ConnectionClosed`].
    pub async fn close(&self) {
        // Fail admission waiters immediately; the receiver task rejects
        // whatever is already in flight.
        self.sockets.close();
        let _ = self.cmd_tx.send(AsyncCommand::Close).await;
    }
}

fn family_path<'a>(family: &'a str, path: &[&'a str]) -> Vec<&'a str> {
    let mut full = Vec::with_capacity(path.len() + 1);
    full.push(family);
    full.extend_from_slice(path);
    full
}

/// Sequence numbers are issued from `1..=0xFFFF_FFFE` within an epoch;
/// `0` is reserved for the reset handshake that opens each epoch.
struct SequenceCounter {
    next: u32,
}

impl SequenceCounter {
    fn new() -> Self {
        // First use runs the reset handshake.
        Self { next: 0 }
    }

    /// The next sequence number, or [`None`] when a reset handshake must
    /// run first (first use, and after wraparound).
    fn take(&mut self) -> Option<u32> {
        if self.next == 0 || self.next == u32::MAX {
            return None;
        }
        let n = self.next;
        self.next += 1;
        Some(n)
    }

    fn reset_complete(&mut self) {
        self.next = 1;
    }
}

/// Owns the connection state and runs the event loop.
struct ViscaReceiver {
    channel: ViscaUdpChannel,
    cmd_rx: mpsc::Receiver<AsyncCommand>,
    /// In-flight correlation table, keyed by sequence number. Entries are
    /// dropped as soon as their request reaches a terminal state.
    in_flight: HashMap<u32, Request>,
    sequence: SequenceCounter,
    sockets: Arc<Semaphore>,
}

impl ViscaReceiver {
    const RESET_TIMEOUT: Duration = Duration::from_secs(1);

    async fn run(mut self) {
        let r = self.main_loop().await;
        let fault = match &r {
            Ok(()) => RequestError::ConnectionClosed,
            Err(Error::SequenceResetFailed) => RequestError::SequenceReset,
            Err(e) => {
                error!("transport loop terminated: {e:?}");
                RequestError::ConnectionClosed
            }
        };
        self.reject_in_flight(fault);
        // Callers blocked on admission must not wait for slots that will
        // never be released.
        self.sockets.close();
    }

    /// The event loop: queued requests to transmit, and inbound datagrams
    /// to demultiplex.
    async fn main_loop(&mut self) -> Result {
        loop {
            select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(AsyncCommand::Close) => {
                        info!("closing connection");
                        return Ok(());
                    }
                    Some(AsyncCommand::Send(request)) => {
                        self.handle_queued_request(request).await?;
                    }
                },

                r = self.channel.recv() => match r {
                    Ok(frame) => self.handle_frame(frame),
                    Err(Error::BinRwError(e)) => {
                        warn!("discarding malformed datagram: {e}");
                    }
                    Err(e) => return Err(e),
                },
            }
        }
    }

    /// Transmits one request under a fresh sequence number and registers it
    /// in the in-flight table.
    async fn handle_queued_request(&mut self, request: Request) -> Result {
        let sequence = match self.sequence.take() {
            Some(sequence) => sequence,
            None => {
                if let Err(e) = self.reset_sequence().await {
                    request.fail(RequestError::SequenceReset);
                    return Err(e);
                }
                self.sequence.reset_complete();
                self.sequence
                    .take()
                    .expect("a fresh epoch has sequence numbers available")
            }
        };

        request.mark_sending();

        // Unreachable while the counter's epoch invariant holds; superseding
        // the stale entry keeps its waiters from hanging if it is not.
        if let Some(old) = self.in_flight.remove(&sequence) {
            warn!("sequence number {sequence} already in flight, superseding");
            old.fail(RequestError::Superseded);
        }

        let frame = Frame::new(request.payload_kind(), sequence, request.payload().to_vec());
        trace!(
            sequence,
            command = ?request.command().path(),
            parameters = ?request.parameters(),
            "sending request"
        );
        if let Err(e) = self.channel.send(&frame).await {
            request.fail(RequestError::ConnectionClosed);
            return Err(e);
        }
        request.mark_sent();

        if !request.is_terminal() {
            self.in_flight.insert(sequence, request);
        }
        Ok(())
    }

    /// Demultiplexes one inbound frame by sequence number.
    fn handle_frame(&mut self, frame: Frame) {
        let Some(request) = self.in_flight.get(&frame.sequence) else {
            // Stray or late replies are normal; not a fault.
            debug!(
                "discarding frame with unknown sequence number {}",
                frame.sequence
            );
            return;
        };

        if let Err(e) = request.receive_reply(&frame.payload) {
            warn!(sequence = frame.sequence, "request failed: {e}");
        }
        if request.is_terminal() {
            self.in_flight.remove(&frame.sequence);
        }
    }

    /// Opens a sequence-number epoch: sends the 1-byte reset payload under
    /// the control-command kind at sequence number 0 and waits for the
    /// matching acknowledgement, demultiplexing unrelated inbound frames
    /// in the meantime.
    async fn reset_sequence(&mut self) -> Result {
        debug!("performing sequence reset handshake");
        self.channel.send(&Frame::control_reset()).await?;

        match tokio::time::timeout(Self::RESET_TIMEOUT, self.await_reset_ack()).await {
            Ok(r) => r,
            Err(_) => {
                error!("timeout waiting for sequence reset acknowledgement");
                Err(Error::SequenceResetFailed)
            }
        }
    }

    async fn await_reset_ack(&mut self) -> Result {
        loop {
            match self.channel.recv().await {
                Ok(frame) if frame.is_reset_ack() => return Ok(()),
                Ok(frame)
                    if frame.kind == PayloadKind::ControlReply && frame.sequence == 0 =>
                {
                    warn!(
                        "unexpected control reply payload: {}",
                        hex::encode(&frame.payload)
                    );
                    return Err(Error::SequenceResetFailed);
                }
                Ok(frame) => self.handle_frame(frame),
                Err(Error::BinRwError(e)) => warn!("discarding malformed datagram: {e}"),
                Err(e) => return Err(e),
            }
        }
    }

    fn reject_in_flight(&mut self, fault: RequestError) {
        for (_, request) in self.in_flight.drain() {
            request.fail(fault.clone());
        }
    }
}
