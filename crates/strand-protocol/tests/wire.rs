//! Integration tests: framed messages over a real loopback socket.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use strand_protocol::{DEFAULT_MAX_MESSAGE_SIZE, Message, MessageKind, MessagePool, MessageQueue, ProtocolError};
use strand_transport::{ListenerSocket, Socket, SocketStream};

fn connected_pair() -> (Arc<Socket>, Arc<Socket>) {
    let mut listener = ListenerSocket::bind("127.0.0.1", 0, None).expect("bind");
    listener.set_accept_timeout(Duration::from_secs(2));
    let port = listener.local_addr().unwrap().port();

    let client = Socket::connect("127.0.0.1", port).expect("connect");
    let server = listener.accept().expect("accept").expect("connection");
    (Arc::new(client), Arc::new(server))
}

#[test]
fn test_messages_cross_the_socket_in_order() {
    let (client, server) = connected_pair();
    let pool = MessagePool::new("wire", 8);

    let writer = thread::spawn(move || {
        let mut out = SocketStream::new(client, "client");
        for i in 0..20u32 {
            let payload = format!("message {i}");
            Message::new(MessageKind(i), payload.into_bytes())
                .send("client", &mut out)
                .unwrap();
        }
    });

    let mut input = SocketStream::new(server, "server");
    for i in 0..20u32 {
        let msg = Message::receive(&mut input, &pool, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(msg.kind(), MessageKind(i));
        assert_eq!(msg.payload(), format!("message {i}").as_bytes());
    }
    writer.join().unwrap();

    // Every received message was dropped right away, so later ones reused
    // the first buffer.
    assert!(pool.stats().reused > 0);
}

#[test]
fn test_peer_close_between_messages_is_eof() {
    let (client, server) = connected_pair();
    let mut out = SocketStream::new(Arc::clone(&client), "client");
    Message::new(MessageKind(1), b"last".to_vec())
        .send("client", &mut out)
        .unwrap();
    client.close();

    let pool = MessagePool::default();
    let mut input = SocketStream::new(server, "server");
    let msg = Message::receive(&mut input, &pool, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
    assert_eq!(msg.payload(), b"last");

    let err = Message::receive(&mut input, &pool, DEFAULT_MAX_MESSAGE_SIZE).unwrap_err();
    assert!(err.is_eof(), "expected eof, got {err:?}");
}

#[test]
fn test_receive_timeout_is_reported_as_timeout() {
    let (_client, server) = connected_pair();
    server.set_read_timeout(Duration::from_millis(30));

    let pool = MessagePool::default();
    let mut input = SocketStream::new(server, "server");
    let err = Message::receive(&mut input, &pool, DEFAULT_MAX_MESSAGE_SIZE).unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    assert!(matches!(err, ProtocolError::Transport(_)));
}

#[test]
fn test_queue_feeds_a_writer_thread() {
    let (client, server) = connected_pair();
    let queue = Arc::new(MessageQueue::new());

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut out = SocketStream::new(client, "writer");
            while let Some(msg) = queue.block_until_next_message() {
                msg.send("writer", &mut out).unwrap();
            }
        })
    };

    let shared = Message::new(MessageKind(5), b"broadcast".to_vec()).into_ptr();
    for _ in 0..3 {
        queue.post(Arc::clone(&shared)).unwrap();
    }

    let pool = MessagePool::default();
    let mut input = SocketStream::new(server, "reader");
    for _ in 0..3 {
        let msg = Message::receive(&mut input, &pool, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(msg.payload(), b"broadcast");
    }

    queue.wake_up();
    consumer.join().unwrap();
    assert_eq!(Arc::strong_count(&shared), 1);
}
