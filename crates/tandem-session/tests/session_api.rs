//! Start-up checks, buffer lifetime and read-only views.

mod common;

use common::{MockTransport, SERVER, config, ms};
use tandem_common::{ConnectTarget, SessionCode, TransportEvent};
use tandem_editor_core::MemorySurface;
use tandem_session::{
    HostTarget, Instant, Role, SessionConfig, SessionCoordinator, SessionError, SessionNotice,
};

#[test]
fn test_inactive_views() {
    let session: SessionCoordinator = SessionCoordinator::default();
    assert_eq!(session.statusline(), "");
    let info = session.info();
    assert!(!info.active);
    assert!(info.code.is_none());
    assert!(info.started_at.is_none());
    assert_eq!(session.pending_tasks(), 0);
}

#[test]
fn test_host_reports_code_and_info() {
    let transport = MockTransport::relay();
    let t0 = Instant::now();
    let mut session: SessionCoordinator = SessionCoordinator::new(config());
    let code = session
        .host(
            MemorySurface::new("notes"),
            HostTarget::default_relay(),
            transport.clone(),
            t0,
        )
        .unwrap()
        .unwrap();

    let SessionCode::Relay { server, key, .. } = &code else {
        panic!("expected a relay code");
    };
    assert_eq!(server, SERVER);
    assert!(key.is_none());
    assert_eq!(transport.last_target(), Some(code.target()));

    let info = session.info();
    assert!(info.active);
    assert_eq!(info.role, Some(Role::Host));
    assert_eq!(info.code, Some(code.encode().unwrap()));
    assert_eq!(info.status, "connecting");
    assert!(info.pending_update);
    assert!(info.client_id.is_some());
    assert_eq!(info.max_reconnect_attempts, 10);
    assert_eq!(info.started_at, Some(t0));

    let notices = session.take_notices();
    assert!(matches!(
        notices.as_slice(),
        [SessionNotice::Started { role: Role::Host, code: Some(_) }]
    ));
}

#[test]
fn test_explicit_server_and_encryption() {
    let transport = MockTransport::relay();
    let mut session: SessionCoordinator =
        SessionCoordinator::new(SessionConfig::default().with_encryption(true));
    let code = session
        .host(
            MemorySurface::default(),
            HostTarget::relay("wss://collab.example.org/"),
            transport.clone(),
            Instant::now(),
        )
        .unwrap()
        .unwrap();

    assert!(code.key().is_some());
    assert!(transport.last_had_key());
    let Some(ConnectTarget::Relay { url }) = transport.last_target() else {
        panic!("expected a relay target");
    };
    assert!(url.starts_with("wss://collab.example.org/ws/"));
}

#[test]
fn test_start_refusals() {
    let mut session: SessionCoordinator = SessionCoordinator::new(SessionConfig::default());
    let err = session
        .host(
            MemorySurface::default(),
            HostTarget::default_relay(),
            MockTransport::relay(),
            Instant::now(),
        )
        .unwrap_err();
    assert!(matches!(err, SessionError::MissingServer));

    let closed = MemorySurface::default();
    closed.invalidate();
    let err = session
        .host(
            closed,
            HostTarget::relay(SERVER),
            MockTransport::relay(),
            Instant::now(),
        )
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidSurface));

    let err = session
        .join(
            MemorySurface::default(),
            "definitely not a code",
            MockTransport::relay(),
            Instant::now(),
        )
        .unwrap_err();
    assert!(matches!(err, SessionError::Code(_)));

    let mut broken: SessionCoordinator =
        SessionCoordinator::new(config().with_flush_interval_ms(0));
    let err = broken
        .host(
            MemorySurface::default(),
            HostTarget::default_relay(),
            MockTransport::relay(),
            Instant::now(),
        )
        .unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"invalid configuration: flush_interval_ms must be greater than zero"
    );
    assert_eq!(session.pending_tasks() + broken.pending_tasks(), 0);
}

#[test]
fn test_second_session_refused() {
    let mut session: SessionCoordinator = SessionCoordinator::new(config());
    let t0 = Instant::now();
    session
        .host(
            MemorySurface::default(),
            HostTarget::default_relay(),
            MockTransport::relay(),
            t0,
        )
        .unwrap();
    let code = session.info().code.unwrap();
    let err = session
        .join(MemorySurface::default(), &code, MockTransport::relay(), t0)
        .unwrap_err();
    assert!(matches!(err, SessionError::AlreadyActive));
    assert_eq!(session.info().role, Some(Role::Host));
}

#[test]
fn test_closed_buffer_ends_session() {
    let buffer = MemorySurface::new("text");
    let transport = MockTransport::relay();
    let t0 = Instant::now();
    let mut session: SessionCoordinator = SessionCoordinator::new(config());
    session
        .host(buffer.clone(), HostTarget::default_relay(), transport.clone(), t0)
        .unwrap();
    transport.emit(TransportEvent::Connected);
    session.poll(t0);

    buffer.invalidate();
    session.poll(t0 + ms(60));
    assert!(!session.is_active());
    assert_eq!(session.pending_tasks(), 0);
    assert_eq!(transport.disconnect_count(), 1);
    assert_eq!(
        session.take_notices().last(),
        Some(&SessionNotice::BufferClosed)
    );
}

#[test]
fn test_closed_buffer_noticed_on_change() {
    let buffer = MemorySurface::new("text");
    let t0 = Instant::now();
    let mut session: SessionCoordinator = SessionCoordinator::new(config());
    session
        .host(buffer.clone(), HostTarget::default_relay(), MockTransport::relay(), t0)
        .unwrap();

    buffer.invalidate();
    session.on_buffer_changed(t0 + ms(1));
    assert!(!session.is_active());
    assert!(!session.leave());
}
