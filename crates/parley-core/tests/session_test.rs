//! Session pipeline tests over in-memory duplex streams.

use std::{
    io,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use parley_core::{
    Delivery, DeliveryPolicy, Participant, Room, RoomConfig, RoomError, Session, SessionConfig,
    SessionError, SessionHandle, SessionId,
};
use parley_proto::{Frame, HEADER_LEN, ProtocolError, decode_header};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf},
    task::JoinHandle,
};

const BUFFER: usize = 64 * 1024;

type SessionTask = JoinHandle<Result<(), SessionError>>;

fn id(s: &str) -> SessionId {
    SessionId::parse(s).unwrap()
}

fn start(room: &Arc<Room>, name: &str) -> (DuplexStream, Arc<SessionHandle>, SessionTask) {
    start_with(room, name, SessionConfig::default())
}

fn start_with(
    room: &Arc<Room>,
    name: &str,
    config: SessionConfig,
) -> (DuplexStream, Arc<SessionHandle>, SessionTask) {
    let (client, server) = tokio::io::duplex(BUFFER);
    let session = Session::with_config(id(name), server, Arc::clone(room), config);
    let handle = session.handle();
    let task = tokio::spawn(session.run());
    (client, handle, task)
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Frame {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await.unwrap();
    let len = decode_header(&header).unwrap();
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.unwrap();
    Frame::new(body).unwrap()
}

async fn read_text<R: AsyncRead + Unpin>(reader: &mut R) -> String {
    read_frame(reader).await.body_text().into_owned()
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) {
    let bytes = Frame::from_text(text).unwrap().to_bytes().unwrap();
    writer.write_all(&bytes).await.unwrap();
}

/// Transport whose reads never complete and whose writes always fail.
struct BrokenPipe;

impl AsyncRead for BrokenPipe {
    fn poll_read(self: Pin<&mut Self>, _: &mut Context<'_>, _: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for BrokenPipe {
    fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

#[tokio::test]
async fn greeting_is_first_frame() {
    let room = Arc::new(Room::default());
    let (mut client, _handle, _task) = start(&room, "AAAAA");

    assert_eq!(read_text(&mut client).await, "Your ID: AAAAA");
    assert!(room.contains("AAAAA"));
}

#[tokio::test]
async fn greeting_can_be_disabled() {
    let room = Arc::new(Room::default());
    let (mut client, handle, _task) =
        start_with(&room, "AAAAA", SessionConfig { greeting: false });

    handle.enqueue_outbound(Frame::from_text("first").unwrap()).unwrap();
    assert_eq!(read_text(&mut client).await, "first");
}

#[tokio::test]
async fn enqueued_frames_arrive_in_order() {
    let room = Arc::new(Room::default());
    let (mut client, handle, _task) = start(&room, "AAAAA");

    for text in ["f1", "f2", "f3"] {
        handle.enqueue_outbound(Frame::from_text(text).unwrap()).unwrap();
    }

    assert_eq!(read_text(&mut client).await, "Your ID: AAAAA");
    assert_eq!(read_text(&mut client).await, "f1");
    assert_eq!(read_text(&mut client).await, "f2");
    assert_eq!(read_text(&mut client).await, "f3");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_never_interleave_writes() {
    const PRODUCERS: usize = 4;
    const FRAMES: usize = 50;

    let room = Arc::new(Room::default());
    let (mut client, handle, _task) =
        start_with(&room, "AAAAA", SessionConfig { greeting: false });

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                for i in 0..FRAMES {
                    let body = format!("{p}:{i}:{}", "x".repeat(i * 7));
                    handle.enqueue_outbound(Frame::from_text(&body).unwrap()).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    // Every frame decodes cleanly, so no two writes overlapped on the wire.
    let mut next = [0usize; PRODUCERS];
    for _ in 0..PRODUCERS * FRAMES {
        let text = read_text(&mut client).await;
        let mut parts = text.splitn(3, ':');
        let p: usize = parts.next().unwrap().parse().unwrap();
        let i: usize = parts.next().unwrap().parse().unwrap();
        assert_eq!(parts.next().unwrap().len(), i * 7);
        assert_eq!(i, next[p], "producer {p} out of order");
        next[p] += 1;
    }
    assert_eq!(next, [FRAMES; PRODUCERS]);
}

#[tokio::test]
async fn addressed_message_reaches_only_recipient() {
    let room = Arc::new(Room::default());
    let (mut a, _ha, _ta) = start(&room, "AAAAA");
    let (mut b, _hb, _tb) = start(&room, "BBBBB");
    let (mut c, _hc, _tc) = start(&room, "CCCCC");
    for client in [&mut a, &mut b, &mut c] {
        read_frame(client).await;
    }

    send(&mut c, "Sender:CCCCC Recipient:BBBBB psst").await;

    assert_eq!(read_text(&mut b).await, "Sender:CCCCC Recipient:BBBBB psst");
    for other in [&mut a, &mut c] {
        let nothing = tokio::time::timeout(Duration::from_millis(50), read_frame(other)).await;
        assert!(nothing.is_err(), "only the tagged recipient should receive the frame");
    }
}

#[tokio::test]
async fn broadcast_reaches_every_session() {
    let room = Arc::new(Room::new(RoomConfig {
        delivery: DeliveryPolicy::Broadcast { include_sender: true },
        ..RoomConfig::default()
    }));
    let (mut a, _ha, _ta) = start(&room, "AAAAA");
    let (mut b, _hb, _tb) = start(&room, "BBBBB");
    read_frame(&mut a).await;
    read_frame(&mut b).await;

    send(&mut a, "hello room").await;

    assert_eq!(read_text(&mut a).await, "hello room");
    assert_eq!(read_text(&mut b).await, "hello room");
}

#[tokio::test]
async fn greeting_precedes_replayed_history() {
    let room = Arc::new(Room::new(RoomConfig { replay_history: true, ..RoomConfig::default() }));
    let (mut a, _ha, _ta) = start(&room, "AAAAA");
    read_frame(&mut a).await;

    send(&mut a, "one").await;
    send(&mut a, "two").await;
    wait_until(|| room.history_len() == 2).await;

    let (mut b, _hb, _tb) = start(&room, "BBBBB");
    assert_eq!(read_text(&mut b).await, "Your ID: BBBBB");
    assert_eq!(read_text(&mut b).await, "one");
    assert_eq!(read_text(&mut b).await, "two");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn greeting_is_first_during_concurrent_broadcast() {
    let room = Arc::new(Room::new(RoomConfig {
        delivery: DeliveryPolicy::Broadcast { include_sender: true },
        ..RoomConfig::default()
    }));
    let stop = Arc::new(AtomicBool::new(false));

    let flood = {
        let room = Arc::clone(&room);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            let sender = id("ZZZZZ");
            let frame = Frame::from_text("flood").unwrap();
            while !stop.load(Ordering::Relaxed) {
                room.deliver(&sender, frame.clone());
            }
        })
    };

    for i in 0..50 {
        let name = format!("S{i:04}");
        let (mut client, handle, _task) = start(&room, &name);
        assert_eq!(read_text(&mut client).await, format!("Your ID: {name}"));
        handle.close();
    }

    stop.store(true, Ordering::Relaxed);
    flood.join().unwrap();
}

#[tokio::test]
async fn write_error_closes_session() {
    let room = Arc::new(Room::default());
    let session = Session::new(id("AAAAA"), BrokenPipe, Arc::clone(&room));
    let handle = session.handle();

    let result = session.run().await;

    assert!(matches!(result, Err(SessionError::Transport(ref e)) if e.kind() == io::ErrorKind::BrokenPipe));
    assert!(handle.is_closed());
    assert_eq!(room.member_count(), 0);
    assert!(matches!(
        handle.enqueue_outbound(Frame::from_text("late").unwrap()),
        Err(SessionError::Closed)
    ));
}

#[tokio::test]
async fn malformed_header_closes_session() {
    let room = Arc::new(Room::default());
    let (mut client, handle, task) = start(&room, "AAAAA");
    wait_until(|| room.contains("AAAAA")).await;

    client.write_all(b"abcd").await.unwrap();

    let result = task.await.unwrap();
    assert!(matches!(
        result,
        Err(SessionError::Protocol(ProtocolError::MalformedHeader { header })) if &header == b"abcd"
    ));
    assert!(handle.is_closed());
    assert_eq!(room.member_count(), 0);
}

#[tokio::test]
async fn oversized_header_closes_session() {
    let room = Arc::new(Room::default());
    let (mut client, _handle, task) = start(&room, "AAAAA");

    client.write_all(b" 513").await.unwrap();

    let result = task.await.unwrap();
    assert!(matches!(
        result,
        Err(SessionError::Protocol(ProtocolError::OversizedBody { len: 513, max: 512 }))
    ));
    assert_eq!(room.member_count(), 0);
}

#[tokio::test]
async fn clean_disconnect_leaves_room() {
    let room = Arc::new(Room::default());
    let (mut client, _handle, task) = start(&room, "AAAAA");
    read_frame(&mut client).await;
    send(&mut client, "bye").await;

    drop(client);

    task.await.unwrap().unwrap();
    assert_eq!(room.member_count(), 0);
    assert_eq!(room.history_len(), 1);
}

#[tokio::test]
async fn frames_for_disconnected_peer_are_dropped() {
    let room = Arc::new(Room::default());
    let (mut client, handle, task) = start(&room, "AAAAA");
    read_frame(&mut client).await;

    drop(client);
    task.await.unwrap().unwrap();

    assert!(handle.is_closed());
    assert!(matches!(
        handle.enqueue_outbound(Frame::from_text("Recipient:AAAAA late").unwrap()),
        Err(SessionError::Closed)
    ));
    let late = Frame::from_text("Recipient:AAAAA late").unwrap();
    assert_eq!(room.deliver(&id("BBBBB"), late), Delivery::RoutingMiss);
}

#[tokio::test]
async fn disconnect_inside_frame_is_transport_error() {
    let room = Arc::new(Room::default());
    let (mut client, _handle, task) = start(&room, "AAAAA");

    client.write_all(b"  10half").await.unwrap();
    drop(client);

    let result = task.await.unwrap();
    assert!(matches!(result, Err(SessionError::Transport(_))));
    assert_eq!(room.member_count(), 0);
}

#[tokio::test]
async fn close_is_idempotent() {
    let room = Arc::new(Room::default());
    let (_other_client, _other, _other_task) = start(&room, "BBBBB");
    let (_client, handle, task) = start(&room, "AAAAA");
    wait_until(|| room.member_count() == 2).await;

    assert!(handle.close());
    assert!(!handle.close());

    task.await.unwrap().unwrap();
    assert!(!handle.close());
    assert_eq!(room.member_ids(), vec![id("BBBBB")]);

    let err = handle.enqueue_outbound(Frame::from_text("late").unwrap()).unwrap_err();
    assert!(matches!(err, SessionError::Closed));
}

#[tokio::test]
async fn closed_waiters_all_wake() {
    let room = Arc::new(Room::default());
    let (_client, handle, _task) = start(&room, "AAAAA");

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.closed().await })
        })
        .collect();
    tokio::task::yield_now().await;

    handle.close();
    for waiter in waiters {
        tokio::time::timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
    }

    // Already closed: returns immediately.
    handle.closed().await;
}

#[tokio::test]
async fn duplicate_id_is_refused_without_evicting_member() {
    let room = Arc::new(Room::default());
    let (mut first, _h1, _t1) = start(&room, "AAAAA");
    read_frame(&mut first).await;

    let (_second, second_handle, second_task) = start(&room, "AAAAA");

    let result = second_task.await.unwrap();
    assert!(matches!(result, Err(SessionError::Room(RoomError::IdInUse(_)))));
    assert!(second_handle.is_closed());
    assert!(room.contains("AAAAA"));

    send(&mut first, "Recipient:AAAAA still here").await;
    assert_eq!(read_text(&mut first).await, "Recipient:AAAAA still here");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_senders_are_all_recorded() {
    const SESSIONS: usize = 8;
    const FRAMES: usize = 25;

    let room = Arc::new(Room::new(RoomConfig {
        history_capacity: SESSIONS * FRAMES,
        ..RoomConfig::default()
    }));

    let clients: Vec<_> = (0..SESSIONS)
        .map(|s| {
            let (mut client, _handle, _task) = start(&room, &format!("sess{s}"));
            tokio::spawn(async move {
                read_frame(&mut client).await;
                for i in 0..FRAMES {
                    send(&mut client, &format!("{s}:{i}")).await;
                }
                client
            })
        })
        .collect();

    let mut connected = Vec::new();
    for client in clients {
        connected.push(client.await.unwrap());
    }

    wait_until(|| room.history_len() == SESSIONS * FRAMES).await;

    let history: Vec<String> = room.history().iter().map(|f| f.body_text().into_owned()).collect();
    for s in 0..SESSIONS {
        let prefix = format!("{s}:");
        let seq: Vec<usize> = history
            .iter()
            .filter_map(|body| body.strip_prefix(&prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(seq, (0..FRAMES).collect::<Vec<_>>(), "session {s}");
    }
}
