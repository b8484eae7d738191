//! UDP tests for the Miniserver listener and sender.
//!
//! Tests include:
//! - Listener event dispatch for real datagrams
//! - Liveness kept by undecodable datagrams
//! - Initialization guard and bind failures
//! - Sender wire output, ordering and drop-before-initialize
//! - Sender address selection for hostnames and IPv6 hosts

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loxbridge_core::{ActionMessage, Component, ComponentState, StatusMessage};
use loxbridge_miniserver::{MiniserverListener, MiniserverOption, MiniserverSender};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

async fn started_listener(outdated: Duration) -> (MiniserverListener, SocketAddr) {
    let listener = MiniserverListener::with_outdated(MiniserverOption::new("127.0.0.1", 0), outdated);
    listener.initialize().await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, SocketAddr::from(([127, 0, 0, 1], port)))
}

async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_listener_raises_status_event() {
    let (listener, addr) = started_listener(Duration::from_secs(65)).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    listener
        .on_status_message_event()
        .subscribe(move |_, message: &StatusMessage| {
            let _ = tx.send(message.clone());
        });
    let actions = Arc::new(AtomicUsize::new(0));
    let a = actions.clone();
    listener.on_action_message_event().subscribe(move |_, _| {
        a.fetch_add(1, Ordering::SeqCst);
    });

    client()
        .await
        .send_to(b"home/kitchen/light1/power=on", addr)
        .await
        .unwrap();

    let received = timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        received,
        StatusMessage::new("home", "kitchen", "light1", "power", "on")
    );

    sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(actions.load(Ordering::SeqCst), 0);

    listener.close().await;
}

#[tokio::test]
async fn test_listener_raises_action_event() {
    let (listener, addr) = started_listener(Duration::from_secs(65)).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    listener
        .on_action_message_event()
        .subscribe(move |_, message: &ActionMessage| {
            let _ = tx.send(message.clone());
        });

    client()
        .await
        .send_to(b"home/livingroom/blind/position/set/50", addr)
        .await
        .unwrap();

    let received = timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.action, "set/50");

    listener.close().await;
}

#[tokio::test]
async fn test_garbage_keeps_listener_active() {
    let (listener, addr) = started_listener(Duration::from_millis(1000)).await;
    let events = Arc::new(AtomicUsize::new(0));
    let e = events.clone();
    listener.on_status_message_event().subscribe(move |_, _| {
        e.fetch_add(1, Ordering::SeqCst);
    });

    sleep(Duration::from_millis(700)).await;
    client().await.send_to(b"garbage", addr).await.unwrap();
    wait_for(|| listener.metrics().malformed == 1).await;

    // Past the window measured from initialize, inside it measured from the garbage.
    sleep(Duration::from_millis(600)).await;
    assert_eq!(listener.lifecycle().state(), ComponentState::Active);
    assert_eq!(events.load(Ordering::SeqCst), 0);

    sleep(Duration::from_millis(1200)).await;
    assert_eq!(listener.lifecycle().state(), ComponentState::Stale);

    listener.close().await;
}

#[tokio::test]
async fn test_listener_double_initialize() {
    let (listener, addr) = started_listener(Duration::from_secs(65)).await;

    listener.initialize().await.unwrap();
    assert_eq!(listener.local_addr().map(|a| a.port()), Some(addr.port()));
    assert!(listener.is_initialized());

    listener.close().await;
    assert_eq!(listener.lifecycle().state(), ComponentState::Unbound);
}

#[tokio::test]
async fn test_listener_bind_failure() {
    let blocker = UdpSocket::bind("0.0.0.0:0").await.unwrap();
    let port = blocker.local_addr().unwrap().port();

    let listener = MiniserverListener::new(MiniserverOption::new("127.0.0.1", port));
    assert!(listener.initialize().await.is_err());
    assert!(!listener.is_initialized());
    assert_eq!(listener.lifecycle().state(), ComponentState::Uninitialized);

    drop(blocker);
    listener.initialize().await.unwrap();
    assert!(listener.is_initialized());
    listener.close().await;
}

#[tokio::test]
async fn test_sender_transmits_exact_bytes() {
    let peer = client().await;
    let port = peer.local_addr().unwrap().port();

    let sender = MiniserverSender::new(MiniserverOption::new("127.0.0.1", port));
    sender.initialize().await.unwrap();
    sender.send_action(&ActionMessage::new("home", "kitchen", "light1", "power", "toggle"));

    let mut buf = [0u8; 1024];
    let (len, _) = timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..len], b"home/kitchen/light1/power/toggle");

    sender.send_status(&StatusMessage::new("home", "kitchen", "light1", "power", "on"));
    let (len, _) = timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..len], b"home/kitchen/light1/power=on");

    wait_for(|| sender.metrics().sent == 2).await;
    sender.close().await;
}

#[tokio::test]
async fn test_sender_keeps_call_order() {
    let peer = client().await;
    let port = peer.local_addr().unwrap().port();

    let sender = MiniserverSender::new(MiniserverOption::new("127.0.0.1", port));
    sender.initialize().await.unwrap();
    for step in ["1", "2", "3"] {
        sender.send_action(&ActionMessage::new("home", "hall", "dimmer", "level", step));
    }

    let mut buf = [0u8; 1024];
    for step in ["1", "2", "3"] {
        let (len, _) = timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            std::str::from_utf8(&buf[..len]).unwrap(),
            format!("home/hall/dimmer/level/{step}")
        );
    }

    sender.close().await;
}

#[tokio::test]
async fn test_sender_drops_before_initialize() {
    let peer = client().await;
    let port = peer.local_addr().unwrap().port();

    let sender = MiniserverSender::new(MiniserverOption::new("127.0.0.1", port));
    sender.send_action(&ActionMessage::new("home", "kitchen", "light1", "power", "toggle"));

    let mut buf = [0u8; 1024];
    let result = timeout(Duration::from_millis(300), peer.recv_from(&mut buf)).await;
    assert!(result.is_err());
    assert_eq!(sender.metrics().dropped, 1);
    assert_eq!(sender.metrics().sent, 0);
}

#[tokio::test]
async fn test_listener_to_sender_loop() {
    let (listener, addr) = started_listener(Duration::from_secs(65)).await;
    let sender = MiniserverSender::new(MiniserverOption::new("127.0.0.1", addr.port()));
    sender.initialize().await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    listener
        .on_status_message_event()
        .subscribe(move |_, message: &StatusMessage| {
            let _ = tx.send(message.clone());
        });

    let status = StatusMessage::new("home", "livingroom", "thermostat", "temp", "21.5");
    sender.send_status(&status);

    let received = timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, status);

    sender.close().await;
    listener.close().await;
}

#[tokio::test]
async fn test_sender_double_initialize() {
    let peer = client().await;
    let port = peer.local_addr().unwrap().port();

    let sender = MiniserverSender::new(MiniserverOption::new("127.0.0.1", port));
    sender.initialize().await.unwrap();
    let remote = sender.remote_addr();

    sender.initialize().await.unwrap();
    assert!(sender.is_initialized());
    assert_eq!(sender.remote_addr(), remote);

    // The writer task from the first initialize still drains the queue.
    sender.send_action(&ActionMessage::new("home", "kitchen", "light1", "power", "toggle"));
    let mut buf = [0u8; 1024];
    let (len, _) = timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..len], b"home/kitchen/light1/power/toggle");

    wait_for(|| sender.metrics().sent == 1).await;
    assert_eq!(sender.metrics().dropped, 0);

    sender.close().await;
    assert_eq!(sender.lifecycle().state(), ComponentState::Unbound);
}

#[tokio::test]
async fn test_sender_hostname_uses_ipv4() {
    // `localhost` may list ::1 before 127.0.0.1; the peer only listens on IPv4.
    let peer = client().await;
    let port = peer.local_addr().unwrap().port();

    let sender = MiniserverSender::new(MiniserverOption::new("localhost", port));
    sender.initialize().await.unwrap();
    assert_eq!(
        sender.remote_addr(),
        Some(SocketAddr::from(([127, 0, 0, 1], port)))
    );

    sender.send_action(&ActionMessage::new("home", "hall", "blind", "position", "up"));
    let mut buf = [0u8; 1024];
    let (len, _) = timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..len], b"home/hall/blind/position/up");

    wait_for(|| sender.metrics().sent == 1).await;
    assert_eq!(sender.metrics().send_errors, 0);
    sender.close().await;
}

#[tokio::test]
async fn test_sender_ipv6_only_host() {
    let peer = UdpSocket::bind("[::1]:0").await.unwrap();
    let port = peer.local_addr().unwrap().port();

    let sender = MiniserverSender::new(MiniserverOption::new("::1", port));
    sender.initialize().await.unwrap();
    assert!(sender.remote_addr().unwrap().is_ipv6());

    sender.send_action(&ActionMessage::new("home", "kitchen", "light1", "power", "off"));
    let mut buf = [0u8; 1024];
    let (len, _) = timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..len], b"home/kitchen/light1/power/off");

    wait_for(|| sender.metrics().sent == 1).await;
    assert_eq!(sender.metrics().send_errors, 0);
    sender.close().await;
}
