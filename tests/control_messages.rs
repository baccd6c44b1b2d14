mod common;

use bytes::Bytes;
use call_signaling::{
    message, CallEvent, CallId, ConnectivityState, ControlMessage, DecodeError,
    RawConnectionState, SessionPhase, TransportHandle, TransportObserver,
};
use common::*;

#[test]
fn hangup_survives_the_wire() {
    let sent = message::encode(&ControlMessage::Hangup { call_id: CallId(123) });
    let received = message::decode(&sent).unwrap();
    assert_eq!(received, ControlMessage::Hangup { call_id: CallId(123) });
}

#[tokio::test]
async fn inbound_messages_reach_the_delegate() {
    let transport = MockTransport::new();
    let (session, mut rx) = outgoing(&transport);
    session.initiate().unwrap();

    transport.emit_data(ControlMessage::Connected.encode());
    transport.emit_data(
        ControlMessage::VideoStreamingStatus {
            call_id: CALL_ID,
            enabled: true,
        }
        .encode(),
    );
    session.drain().await;

    assert_eq!(
        delivered(&mut rx),
        vec![
            CallEvent::ControlMessageReceived(ControlMessage::Connected),
            CallEvent::ControlMessageReceived(ControlMessage::VideoStreamingStatus {
                call_id: CALL_ID,
                enabled: true,
            }),
        ]
    );
}

#[tokio::test]
async fn undecodable_bytes_are_reported_and_session_survives() {
    let transport = MockTransport::new();
    let (session, mut rx) = outgoing(&transport);
    session.initiate().unwrap();

    transport.emit_data(Bytes::new());
    transport.emit_data(vec![0x7f, 0x00]);
    transport.emit_states(&[RawConnectionState::Connected]);
    session.drain().await;

    let events = delivered(&mut rx);
    assert!(matches!(
        events[0],
        CallEvent::ControlMessageRejected(DecodeError::Malformed { .. })
    ));
    assert_eq!(
        events[1],
        CallEvent::ControlMessageRejected(DecodeError::UnknownVariant(0x7f))
    );
    assert_eq!(
        events[2],
        CallEvent::ConnectivityChanged(ConnectivityState::Connected)
    );
    assert_eq!(session.phase(), SessionPhase::Active);
}

#[tokio::test]
async fn messages_for_another_call_are_ignored() {
    let transport = MockTransport::new();
    let (session, mut rx) = outgoing(&transport);
    session.initiate().unwrap();

    transport.emit_data(ControlMessage::Hangup { call_id: CallId(999) }.encode());
    transport.emit_data(ControlMessage::Busy { call_id: CallId(999) }.encode());
    session.drain().await;

    assert!(delivered(&mut rx).is_empty());
    assert_eq!(session.phase(), SessionPhase::Active);
    assert!(transport.closed().is_empty());
}

#[tokio::test]
async fn remote_hangup_tears_the_session_down() {
    let transport = MockTransport::new();
    let (session, mut rx) = outgoing(&transport);
    session.initiate().unwrap();
    let observer = transport.observer();

    transport.emit_states(&[RawConnectionState::Connected]);
    transport.emit_data(ControlMessage::Hangup { call_id: CALL_ID }.encode());
    observer.on_raw_state_change(RawConnectionState::Disconnected);
    session.terminated().await;

    assert_eq!(
        delivered(&mut rx),
        vec![
            CallEvent::ConnectivityChanged(ConnectivityState::Connected),
            CallEvent::ControlMessageReceived(ControlMessage::Hangup { call_id: CALL_ID }),
            CallEvent::ConnectivityChanged(ConnectivityState::Terminated),
        ]
    );
    assert_eq!(transport.closed(), vec![TransportHandle(1)]);
    assert_eq!(session.phase(), SessionPhase::Terminated);

    // a late local terminate has nothing left to do
    session.terminate();
    assert_eq!(transport.closed().len(), 1);
}

#[tokio::test]
async fn outbound_helpers_encode_onto_the_data_channel() {
    let transport = MockTransport::new();
    let (session, _rx) = outgoing(&transport);
    session.initiate().unwrap();

    session.send_connected().unwrap();
    session.set_local_video_enabled(false).unwrap();
    session.send_busy().unwrap();
    session.send_hangup().unwrap();

    let sent: Vec<ControlMessage> = transport
        .sent()
        .iter()
        .map(|bytes| message::decode(bytes).unwrap())
        .collect();
    assert_eq!(
        sent,
        vec![
            ControlMessage::Connected,
            ControlMessage::VideoStreamingStatus {
                call_id: CALL_ID,
                enabled: false,
            },
            ControlMessage::Busy { call_id: CALL_ID },
            ControlMessage::Hangup { call_id: CALL_ID },
        ]
    );
    // sending a hangup does not end the session by itself
    assert_eq!(session.phase(), SessionPhase::Active);
}

#[tokio::test]
async fn sends_outside_an_active_session_are_no_ops() {
    let transport = MockTransport::new();
    let (session, _rx) = outgoing(&transport);

    session.send_connected().unwrap();
    session.initiate().unwrap();
    session.terminate();
    session.send_hangup().unwrap();
    session.terminated().await;
    session.send_busy().unwrap();

    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn video_track_changes_are_forwarded() {
    let transport = MockTransport::new();
    let (session, mut rx) = incoming(&transport);
    session.accept().unwrap();

    let observer = transport.observer();
    observer.on_remote_video_track(true);
    observer.on_local_video_track(false);
    session.drain().await;

    assert_eq!(
        delivered(&mut rx),
        vec![
            CallEvent::RemoteVideoTrackChanged(true),
            CallEvent::LocalVideoTrackChanged(false),
        ]
    );
}
