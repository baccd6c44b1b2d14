mod common;

use call_signaling::config::GRACE_PERIOD;
use call_signaling::{CallEvent, ConnectivityState, RawConnectionState as Raw, SessionConfig};
use common::*;
use std::time::Duration;
use tokio::time::sleep;

use CallEvent::ConnectivityChanged as Changed;

#[tokio::test(start_paused = true)]
async fn disconnect_without_recovery_fails() {
    let transport = MockTransport::new();
    let (session, mut rx) = outgoing(&transport);
    session.initiate().unwrap();

    transport.emit_states(&[Raw::Connected, Raw::Disconnected]);
    session.drain().await;
    sleep(GRACE_PERIOD + Duration::from_secs(1)).await;
    session.drain().await;

    assert_eq!(
        delivered(&mut rx),
        vec![
            Changed(ConnectivityState::Connected),
            Changed(ConnectivityState::Disconnected),
            Changed(ConnectivityState::Failed),
        ]
    );

    // Failed absorbs a late recovery
    transport.emit_states(&[Raw::Connected]);
    session.drain().await;
    assert!(delivered(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn checking_during_grace_is_not_a_recovery() {
    let transport = MockTransport::new();
    let (session, mut rx) = outgoing(&transport);
    session.initiate().unwrap();

    transport.emit_states(&[Raw::Connected, Raw::Disconnected, Raw::Checking]);
    session.drain().await;
    assert_eq!(session.connectivity_state(), ConnectivityState::Checking);

    transport.emit_states(&[Raw::Disconnected]);
    session.drain().await;
    assert_eq!(session.connectivity_state(), ConnectivityState::Disconnected);

    sleep(GRACE_PERIOD + Duration::from_secs(1)).await;
    session.drain().await;

    assert_eq!(
        delivered(&mut rx),
        vec![
            Changed(ConnectivityState::Connected),
            Changed(ConnectivityState::Disconnected),
            Changed(ConnectivityState::Failed),
        ]
    );
    assert_eq!(session.connectivity_state(), ConnectivityState::Failed);
}

#[tokio::test(start_paused = true)]
async fn checking_left_pending_still_fails_after_grace() {
    let transport = MockTransport::new();
    let (session, mut rx) = outgoing(&transport);
    session.initiate().unwrap();

    transport.emit_states(&[Raw::Connected, Raw::Disconnected, Raw::Checking]);
    session.drain().await;
    sleep(GRACE_PERIOD + Duration::from_secs(1)).await;
    session.drain().await;

    assert_eq!(
        delivered(&mut rx).last(),
        Some(&Changed(ConnectivityState::Failed))
    );
}

#[tokio::test(start_paused = true)]
async fn recovery_within_grace_cancels_the_timer() {
    let transport = MockTransport::new();
    let (session, mut rx) = outgoing(&transport);
    session.initiate().unwrap();

    transport.emit_states(&[Raw::Connected, Raw::Disconnected]);
    session.drain().await;
    sleep(Duration::from_secs(5)).await;
    transport.emit_states(&[Raw::Connected]);
    session.drain().await;
    sleep(GRACE_PERIOD * 2).await;
    session.drain().await;

    assert_eq!(
        delivered(&mut rx),
        vec![
            Changed(ConnectivityState::Connected),
            Changed(ConnectivityState::Disconnected),
            Changed(ConnectivityState::Connected),
        ]
    );
    assert_eq!(session.connectivity_state(), ConnectivityState::Connected);
}

#[tokio::test(start_paused = true)]
async fn each_disconnect_gets_a_fresh_grace_period() {
    let transport = MockTransport::new();
    let (session, mut rx) = outgoing(&transport);
    session.initiate().unwrap();

    transport.emit_states(&[Raw::Connected, Raw::Disconnected]);
    session.drain().await;
    sleep(Duration::from_secs(8)).await;
    transport.emit_states(&[Raw::Connected, Raw::Disconnected]);
    session.drain().await;

    // first timer would have fired here
    sleep(Duration::from_secs(4)).await;
    session.drain().await;
    assert_eq!(session.connectivity_state(), ConnectivityState::Disconnected);

    sleep(Duration::from_secs(7)).await;
    session.drain().await;
    assert_eq!(session.connectivity_state(), ConnectivityState::Failed);
    assert_eq!(
        delivered(&mut rx).last(),
        Some(&Changed(ConnectivityState::Failed))
    );
}

#[tokio::test(start_paused = true)]
async fn custom_grace_period_is_honoured() {
    let transport = MockTransport::new();
    let config =
        SessionConfig::outgoing(CALL_ID).with_disconnect_grace(Some(Duration::from_secs(2)));
    let (session, _rx) = common::session(config, &transport);
    session.initiate().unwrap();

    transport.emit_states(&[Raw::Connected, Raw::Disconnected]);
    session.drain().await;
    sleep(Duration::from_secs(3)).await;
    session.drain().await;

    assert_eq!(session.connectivity_state(), ConnectivityState::Failed);
}

#[tokio::test(start_paused = true)]
async fn disabled_grace_waits_for_the_transport() {
    let transport = MockTransport::new();
    let config = SessionConfig::outgoing(CALL_ID).with_disconnect_grace(None);
    let (session, _rx) = common::session(config, &transport);
    session.initiate().unwrap();

    transport.emit_states(&[Raw::Connected, Raw::Disconnected]);
    session.drain().await;
    sleep(Duration::from_secs(120)).await;
    session.drain().await;

    assert_eq!(session.connectivity_state(), ConnectivityState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn terminate_during_grace_surfaces_terminated_only() {
    let transport = MockTransport::new();
    let (session, mut rx) = outgoing(&transport);
    session.initiate().unwrap();

    transport.emit_states(&[Raw::Connected, Raw::Disconnected]);
    session.drain().await;
    session.terminate();
    session.terminated().await;
    sleep(GRACE_PERIOD * 2).await;

    assert_eq!(
        delivered(&mut rx),
        vec![
            Changed(ConnectivityState::Connected),
            Changed(ConnectivityState::Disconnected),
            Changed(ConnectivityState::Terminated),
        ]
    );
}
