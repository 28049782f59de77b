//! Integration tests for `Session` against a real loopback TCP listener.
//!
//! A background thread plays the part of tev: it accepts one connection,
//! reads until the client closes it, and decodes everything it received.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tev_client::{show_image_at, Session, SessionConfig, SessionError, SessionState};
use tev_core::{
    decode_stream, normalize,
    protocol::packets::{CloseImage, CreateImage, OpenImage, ReloadImage},
    FloatImage, Layer, Packet,
};

/// Starts a one-shot fake viewer and returns its port and the packets it saw.
fn fake_viewer() -> (u16, JoinHandle<Vec<Packet>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let port = listener.local_addr().expect("local addr").port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).expect("read to EOF");
        decode_stream(&bytes).expect("client must send well-formed packets")
    });
    (port, handle)
}

/// A port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}

#[test]
fn test_full_lifecycle_arrives_in_call_order() {
    // Arrange
    let (port, viewer) = fake_viewer();
    let image = Arc::new(FloatImage::from_fn(30, 20, 4, |c, r, ch| {
        (c + r * 30) as f32 + ch as f32 / 4.0
    }));
    let config = SessionConfig {
        budget_floats: 300,
        ..SessionConfig::default()
    };

    // Act
    let mut session = Session::connect_with("127.0.0.1", port, config).expect("connect");
    session.open("scans/a.exr").unwrap();
    session
        .register("live", vec![Layer::new("beauty", image)])
        .unwrap();
    session.push("live").unwrap();
    session.reload("scans/a.exr").unwrap();
    session.close("live").unwrap();
    session.disconnect().unwrap();
    let packets = viewer.join().expect("viewer thread");

    // Assert – 20 rows at 10 rows per block, 4 channels each
    assert_eq!(packets.len(), 1 + 1 + 2 * 4 + 1 + 1);
    assert_eq!(
        packets[0],
        Packet::OpenImage(OpenImage {
            grab_focus: false,
            image_name: normalize("scans/a.exr"),
        })
    );
    assert_eq!(
        packets[1],
        Packet::CreateImage(CreateImage {
            grab_focus: false,
            image_name: "live".to_string(),
            width: 30,
            height: 20,
            channel_names: ["beauty.R", "beauty.G", "beauty.B", "beauty.A"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        })
    );
    for (i, packet) in packets[2..10].iter().enumerate() {
        let Packet::UpdateImage(u) = packet else {
            panic!("expected UpdateImage at {}, got {packet:?}", i + 2);
        };
        assert_eq!(u.top, if i < 4 { 0 } else { 10 });
        assert_eq!(u.height, 10);
        assert_eq!(u.data.len(), 300);
    }
    assert_eq!(
        packets[10],
        Packet::ReloadImage(ReloadImage {
            grab_focus: false,
            image_name: normalize("scans/a.exr"),
        })
    );
    assert_eq!(
        packets[11],
        Packet::CloseImage(CloseImage {
            image_name: "live".to_string(),
        })
    );
}

#[test]
fn test_show_image_replaces_and_pushes_single_layer() {
    // Arrange
    let (port, viewer) = fake_viewer();
    let image = Arc::new(FloatImage::filled(20, 10, 1, 0.5));

    // Act
    show_image_at("127.0.0.1", port, "quick", image).expect("show image");
    let packets = viewer.join().expect("viewer thread");

    // Assert
    assert_eq!(packets.len(), 3);
    assert!(matches!(&packets[0], Packet::CloseImage(c) if c.image_name == "quick"));
    assert!(matches!(&packets[1], Packet::CreateImage(c) if c.channel_names == [".Y"]));
    let Packet::UpdateImage(update) = &packets[2] else {
        panic!("expected UpdateImage, got {:?}", packets[2]);
    };
    assert_eq!(update.channel_name, ".Y");
    assert_eq!(update.data, vec![0.5; 200]);
}

#[test]
fn test_connect_to_closed_port_fails_with_connection_failed() {
    let port = closed_port();

    let err = Session::connect("127.0.0.1", port).unwrap_err();

    assert!(matches!(
        err,
        SessionError::ConnectionFailed { ref addr, .. } if addr.ends_with(&port.to_string())
    ));
}

#[test]
fn test_connect_timeout_is_applied_to_failed_connect() {
    let port = closed_port();
    let config = SessionConfig {
        connect_timeout: Some(Duration::from_millis(500)),
        ..SessionConfig::default()
    };

    let err = Session::connect_with("127.0.0.1", port, config).unwrap_err();

    assert!(matches!(err, SessionError::ConnectionFailed { .. }));
}

#[test]
fn test_peer_hangup_surfaces_as_write_failure_and_disposes() {
    // Arrange – a viewer that accepts and immediately drops the connection
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let acceptor = thread::spawn(move || {
        let (stream, _): (TcpStream, _) = listener.accept().expect("accept");
        drop(stream);
    });
    let mut session = Session::connect("127.0.0.1", port).expect("connect");
    acceptor.join().expect("acceptor thread");
    let big = Arc::new(FloatImage::new(1024, 1024, 4));
    session
        .register("doomed", vec![Layer::new("", big)])
        .or_else(|e| match e {
            SessionError::TransportWriteFailed(_) => Ok(()),
            other => Err(other),
        })
        .expect("register either succeeds or reports a write failure");

    // Act – keep writing until the reset is observed
    let mut failure = None;
    for _ in 0..50 {
        if session.state() == SessionState::Disposed {
            break;
        }
        if let Err(e) = session.push("doomed") {
            failure = Some(e);
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    // Assert
    assert_eq!(session.state(), SessionState::Disposed);
    if let Some(e) = failure {
        assert!(matches!(
            e,
            SessionError::TransportWriteFailed(_) | SessionError::SessionClosed
        ));
    }
    assert!(matches!(session.open("x"), Err(SessionError::SessionClosed)));
}
