use crate::error::DecodeError;
use crate::message::ControlMessage;
use crate::peer::state::ConnectivityState;
use crate::peer::types::Candidate;
use tokio::sync::mpsc;

/// Consumer of session events.
///
/// Always invoked on the session's egress context, one call at a time, in
/// the order the events were accepted from the transport.
pub trait CallDelegate: Send + Sync + 'static {
    fn on_connectivity_changed(&self, state: ConnectivityState);

    fn on_local_candidate_ready(&self, candidate: Candidate);

    fn on_control_message_received(&self, message: ControlMessage);

    /// Inbound data-channel bytes that did not decode. Whether that is fatal
    /// is the consumer's call.
    fn on_control_message_rejected(&self, _error: DecodeError) {}

    fn on_local_video_track_changed(&self, _present: bool) {}

    fn on_remote_video_track_changed(&self, _present: bool) {}
}

/// One consumer-visible event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    ConnectivityChanged(ConnectivityState),
    LocalCandidateReady(Candidate),
    ControlMessageReceived(ControlMessage),
    ControlMessageRejected(DecodeError),
    LocalVideoTrackChanged(bool),
    RemoteVideoTrackChanged(bool),
}

impl CallEvent {
    /// Invokes the matching delegate method.
    pub fn deliver_to(self, delegate: &dyn CallDelegate) {
        match self {
            CallEvent::ConnectivityChanged(state) => delegate.on_connectivity_changed(state),
            CallEvent::LocalCandidateReady(candidate) => {
                delegate.on_local_candidate_ready(candidate)
            }
            CallEvent::ControlMessageReceived(message) => {
                delegate.on_control_message_received(message)
            }
            CallEvent::ControlMessageRejected(error) => {
                delegate.on_control_message_rejected(error)
            }
            CallEvent::LocalVideoTrackChanged(present) => {
                delegate.on_local_video_track_changed(present)
            }
            CallEvent::RemoteVideoTrackChanged(present) => {
                delegate.on_remote_video_track_changed(present)
            }
        }
    }
}

/// Delegate that forwards every event onto a channel, for consumers that
/// run their own event loop.
#[derive(Debug, Clone)]
pub struct ChannelDelegate {
    tx: mpsc::UnboundedSender<CallEvent>,
}

impl ChannelDelegate {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CallEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: CallEvent) {
        // получатель мог уже уйти, событие просто теряется
        let _ = self.tx.send(event);
    }
}

impl CallDelegate for ChannelDelegate {
    fn on_connectivity_changed(&self, state: ConnectivityState) {
        self.forward(CallEvent::ConnectivityChanged(state));
    }

    fn on_local_candidate_ready(&self, candidate: Candidate) {
        self.forward(CallEvent::LocalCandidateReady(candidate));
    }

    fn on_control_message_received(&self, message: ControlMessage) {
        self.forward(CallEvent::ControlMessageReceived(message));
    }

    fn on_control_message_rejected(&self, error: DecodeError) {
        self.forward(CallEvent::ControlMessageRejected(error));
    }

    fn on_local_video_track_changed(&self, present: bool) {
        self.forward(CallEvent::LocalVideoTrackChanged(present));
    }

    fn on_remote_video_track_changed(&self, present: bool) {
        self.forward(CallEvent::RemoteVideoTrackChanged(present));
    }
}
