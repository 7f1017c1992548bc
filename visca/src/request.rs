//! Per-request lifecycle tracking.
//!
//! Every outgoing command gets a [`Request`] (owned by the transport and
//! its in-flight table) and a [`RequestHandle`] (owned by the caller). The
//! two sides share a [`watch`] channel carrying the request's progress:
//! waiters simply observe the channel until their target stage has been
//! reached or passed, or a fault has been published. This replaces
//! per-state callback lists with one broadcast point per request.

use crate::error::RequestError;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, OwnedSemaphorePermit};
use visca_protocol::{Command, Packet, PacketKind, ParameterMap, PayloadKind};

/// Lifecycle stages, in order. A request only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Pending,
    Sending,
    Sent,
    Ack,
    Completed,
}

/// A decoded reply packet.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub packet: Arc<Packet>,
    pub values: ParameterMap,
}

impl Reply {
    pub fn name(&self) -> &str {
        self.packet.name()
    }

    pub fn kind(&self) -> PacketKind {
        self.packet.kind()
    }
}

/// Snapshot of a request's progress, published through the watch channel.
#[derive(Clone, Debug)]
struct Progress {
    stage: Stage,
    ack: Option<Reply>,
    completion: Option<Reply>,
    failure: Option<RequestError>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            stage: Stage::Pending,
            ack: None,
            completion: None,
            failure: None,
        }
    }
}

impl Progress {
    fn is_terminal(&self) -> bool {
        self.failure.is_some() || self.stage == Stage::Completed
    }
}

/// Transport-side view of an in-flight command.
///
/// Dropping the request (after it reached a terminal state) closes the
/// watch channel; handles that are still waiting then observe the final
/// snapshot and resolve from it.
pub(crate) struct Request {
    command: Arc<Command>,
    parameters: ParameterMap,
    payload: Vec<u8>,
    payload_kind: PayloadKind,
    tx: watch::Sender<Progress>,
    /// Admission slot held while the camera-side socket is occupied.
    /// Released when the request reaches a terminal state.
    permit: Mutex<Option<OwnedSemaphorePermit>>,
}

impl Request {
    pub(crate) fn new(
        command: Arc<Command>,
        parameters: ParameterMap,
        payload: Vec<u8>,
        payload_kind: PayloadKind,
        permit: Option<OwnedSemaphorePermit>,
    ) -> (Self, RequestHandle) {
        let (tx, rx) = watch::channel(Progress::default());
        let request = Self {
            command: command.clone(),
            parameters,
            payload,
            payload_kind,
            tx,
            permit: Mutex::new(permit),
        };
        (request, RequestHandle { command, rx })
    }

    pub(crate) fn command(&self) -> &Arc<Command> {
        &self.command
    }

    pub(crate) fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub(crate) const fn payload_kind(&self) -> PayloadKind {
        self.payload_kind
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.tx.borrow().is_terminal()
    }

    pub(crate) fn mark_sending(&self) {
        self.advance(Stage::Sending, None);
    }

    pub(crate) fn mark_sent(&self) {
        self.advance(Stage::Sent, None);
    }

    /// Publishes a fault, rejecting all outstanding stage waiters.
    ///
    /// A no-op once the request is terminal: reaching `Completed`
    /// permanently forecloses failure.
    pub(crate) fn fail(&self, error: RequestError) {
        self.tx.send_modify(|progress| {
            if progress.is_terminal() {
                return;
            }
            progress.failure = Some(error);
        });
        self.release_permit();
    }

    /// Matches an inbound payload against the command's candidate replies
    /// and advances the lifecycle accordingly.
    pub(crate) fn receive_reply(&self, payload: &[u8]) -> Result<(), RequestError> {
        if self.is_terminal() {
            // The in-flight table drops terminal entries, so this payload
            // cannot belong to us.
            return Err(RequestError::ProtocolViolation);
        }

        let Some((packet, values)) = self.command.identify_reply(payload) else {
            let error = RequestError::ProtocolViolation;
            self.fail(error.clone());
            return Err(error);
        };
        let reply = Reply { packet, values };

        match reply.kind() {
            PacketKind::Error => {
                let error = RequestError::Device {
                    name: reply.name().to_string(),
                    values: reply.values,
                };
                self.fail(error.clone());
                Err(error)
            }
            PacketKind::Ack if self.stage() < Stage::Ack => {
                self.advance(Stage::Ack, Some(reply));
                Ok(())
            }
            PacketKind::Completion | PacketKind::Answer => {
                self.advance(Stage::Completed, Some(reply));
                Ok(())
            }
            _ => {
                // A duplicate Ack, or a reply table declaring an outbound
                // kind. Either way the device and our state disagree.
                let error = RequestError::ProtocolViolation;
                self.fail(error.clone());
                Err(error)
            }
        }
    }

    fn stage(&self) -> Stage {
        self.tx.borrow().stage
    }

    /// Moves the lifecycle forward. Transitions that do not advance it are
    /// programming errors; device-driven transitions are filtered by
    /// [`Request::receive_reply`] before they get here.
    fn advance(&self, target: Stage, reply: Option<Reply>) {
        {
            let progress = self.tx.borrow();
            assert!(
                !progress.is_terminal() && target > progress.stage,
                "illegal lifecycle transition: {:?} -> {target:?}",
                progress.stage,
            );
        }
        self.tx.send_modify(move |progress| {
            progress.stage = target;
            match target {
                Stage::Ack => progress.ack = reply,
                Stage::Completed => progress.completion = reply,
                _ => {}
            }
        });
        if target == Stage::Completed {
            self.release_permit();
        }
    }

    fn release_permit(&self) {
        if let Ok(mut permit) = self.permit.lock() {
            permit.take();
        }
    }
}

/// Caller-side view of an in-flight command.
///
/// The stage futures resolve immediately when the request has already
/// reached or passed the requested stage, and reject with the request's
/// fault if it failed first.
pub struct RequestHandle {
    command: Arc<Command>,
    rx: watch::Receiver<Progress>,
}

impl RequestHandle {
    pub fn command(&self) -> &Arc<Command> {
        &self.command
    }

    /// Current lifecycle stage.
    pub fn stage(&self) -> Stage {
        self.rx.borrow().stage
    }

    /// Waits for the device's Ack.
    ///
    /// Returns `Ok(None)` for requests whose lifecycle skips the Ack stage
    /// (inquiries and device-setting commands complete in a single reply).
    pub async fn ack(&mut self) -> Result<Option<Reply>, RequestError> {
        self.wait(Stage::Ack, |progress| progress.ack.clone()).await
    }

    /// Waits for the completing reply.
    pub async fn completion(&mut self) -> Result<Reply, RequestError> {
        let reply = self
            .wait(Stage::Completed, |progress| progress.completion.clone())
            .await?;
        Ok(reply.expect("completed request carries its completing reply"))
    }

    /// Waits for an inquiry's answer. Identical to
    /// [`completion`][Self::completion]; inquiries complete on their answer.
    pub async fn answer(&mut self) -> Result<Reply, RequestError> {
        self.completion().await
    }

    async fn wait(
        &mut self,
        stage: Stage,
        data: impl Fn(&Progress) -> Option<Reply>,
    ) -> Result<Option<Reply>, RequestError> {
        loop {
            {
                let progress = self.rx.borrow_and_update();
                if let Some(failure) = &progress.failure {
                    return Err(failure.clone());
                }
                if progress.stage >= stage {
                    return Ok(data(&progress));
                }
            }
            // A closed channel without a terminal snapshot means the
            // transport went away without rejecting us.
            self.rx
                .changed()
                .await
                .map_err(|_| RequestError::ConnectionClosed)?;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Result;
    use visca_protocol::{marshall::MARSHALL, Value};

    fn request_for(path: &[&str], extra: &[(&str, Value)]) -> (Request, RequestHandle) {
        let command = MARSHALL.lookup(path).unwrap();
        let mut parameters: ParameterMap = extra
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        parameters.insert("Address".to_string(), Value::Uint(1));
        let payload = command.pattern().write_payload(&parameters).unwrap();
        let payload_kind = PayloadKind::for_packet(command.kind()).unwrap();
        Request::new(command, parameters, payload, payload_kind, None)
    }

    #[tokio::test]
    async fn command_ack_then_completion() -> Result {
        let (request, mut handle) = request_for(&["command", "CAM_Power", "On"], &[]);
        assert_eq!(Stage::Pending, handle.stage());

        request.mark_sending();
        request.mark_sent();
        assert_eq!(Stage::Sent, handle.stage());

        request.receive_reply(&hex::decode("9041ff")?).unwrap();
        let ack = handle.ack().await.unwrap().expect("commands are acked");
        assert_eq!("Ack", ack.name());
        assert_eq!(Some(1), ack.values.get("Socket").and_then(Value::as_uint));
        assert!(!request.is_terminal());

        request.receive_reply(&hex::decode("9051ff")?).unwrap();
        assert!(request.is_terminal());
        let completion = handle.completion().await.unwrap();
        assert_eq!("Completion", completion.name());
        Ok(())
    }

    #[tokio::test]
    async fn waiter_registered_before_the_stage_is_reached() -> Result {
        let (request, mut handle) = request_for(&["command", "CAM_Power", "On"], &[]);
        request.mark_sending();
        request.mark_sent();

        let waiter = tokio::spawn(async move { handle.completion().await });

        request.receive_reply(&hex::decode("9041ff")?).unwrap();
        request.receive_reply(&hex::decode("9051ff")?).unwrap();

        let completion = waiter.await.expect("waiter panicked").unwrap();
        assert_eq!("Completion", completion.name());
        Ok(())
    }

    #[tokio::test]
    async fn inquiry_completes_in_one_reply() -> Result {
        let (request, mut handle) = request_for(&["inquiry", "CAM_PowerInq"], &[]);
        request.mark_sending();
        request.mark_sent();

        request.receive_reply(&hex::decode("905002ff")?).unwrap();
        assert!(request.is_terminal());

        let answer = handle.answer().await.unwrap();
        assert_eq!("On", answer.name());
        // The Ack stage was skipped entirely.
        assert_eq!(None, handle.ack().await.unwrap());
        Ok(())
    }

    #[tokio::test]
    async fn device_error_rejects_all_stages() -> Result {
        let (request, mut handle) = request_for(&["command", "CAM_Power", "On"], &[]);
        request.mark_sending();
        request.mark_sent();

        let err = request
            .receive_reply(&hex::decode("906002ff")?)
            .unwrap_err();
        assert!(matches!(err, RequestError::Device { ref name, .. } if name == "Syntax Error"));
        assert!(request.is_terminal());

        assert_eq!(Err(err.clone()), handle.ack().await.map(|_| ()));
        assert_eq!(err, handle.completion().await.unwrap_err());
        Ok(())
    }

    #[tokio::test]
    async fn unrecognised_payload_is_a_protocol_violation() -> Result {
        let (request, mut handle) = request_for(&["command", "CAM_Power", "On"], &[]);
        request.mark_sending();
        request.mark_sent();

        assert_eq!(
            Err(RequestError::ProtocolViolation),
            request.receive_reply(&[0x12, 0x34])
        );
        assert_eq!(
            RequestError::ProtocolViolation,
            handle.completion().await.unwrap_err()
        );
        Ok(())
    }

    #[tokio::test]
    async fn completion_forecloses_failure() -> Result {
        let (request, mut handle) = request_for(&["command", "CAM_Power", "On"], &[]);
        request.mark_sending();
        request.mark_sent();
        request.receive_reply(&hex::decode("9041ff")?).unwrap();
        request.receive_reply(&hex::decode("9051ff")?).unwrap();

        // Late faults must not reach a completed request's waiters.
        request.fail(RequestError::ConnectionClosed);
        assert!(handle.completion().await.is_ok());

        // Nor can a stray reply disturb it.
        assert_eq!(
            Err(RequestError::ProtocolViolation),
            request.receive_reply(&hex::decode("9051ff")?)
        );
        assert!(handle.completion().await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_ack_is_a_protocol_violation() -> Result {
        let (request, _handle) = request_for(&["command", "CAM_Power", "On"], &[]);
        request.mark_sending();
        request.mark_sent();
        request.receive_reply(&hex::decode("9041ff")?).unwrap();

        assert_eq!(
            Err(RequestError::ProtocolViolation),
            request.receive_reply(&hex::decode("9041ff")?)
        );
        assert!(request.is_terminal());
        Ok(())
    }

    #[tokio::test]
    #[should_panic(expected = "illegal lifecycle transition")]
    async fn backwards_transition_panics() {
        let (request, _handle) = request_for(&["command", "CAM_Power", "On"], &[]);
        request.mark_sending();
        request.mark_sent();
        // Sent -> Sending is a programming error.
        request.mark_sending();
    }

    #[tokio::test]
    async fn handle_outlives_request() -> Result {
        let (request, mut handle) = request_for(&["command", "CAM_Power", "On"], &[]);
        request.mark_sending();
        request.mark_sent();
        request.receive_reply(&hex::decode("9041ff")?).unwrap();
        request.receive_reply(&hex::decode("9051ff")?).unwrap();
        drop(request);

        // The final snapshot stays observable after the transport side
        // released its reference.
        assert!(handle.completion().await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn dropped_without_terminal_state_rejects_waiters() {
        let (request, mut handle) = request_for(&["command", "CAM_Power", "On"], &[]);
        drop(request);
        assert_eq!(
            RequestError::ConnectionClosed,
            handle.completion().await.unwrap_err()
        );
    }
}
