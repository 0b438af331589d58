//! Integration tests for the blocking socket and its stream adapter.
//!
//! These tests run real loopback connections. Threads stand in for the
//! session's input and output sides: one blocks reading while another
//! writes or closes.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use strand_transport::{ListenerSocket, Socket, SocketStream};

/// Connects a client to a fresh listener and returns both ends.
fn connected_pair() -> (Arc<Socket>, Arc<Socket>) {
    let mut listener = ListenerSocket::bind("127.0.0.1", 0, None).expect("bind");
    listener.set_accept_timeout(Duration::from_secs(2));
    let port = listener.local_addr().unwrap().port();

    let client = Socket::connect("127.0.0.1", port).expect("connect");
    let server = listener.accept().expect("accept").expect("connection");
    (Arc::new(client), Arc::new(server))
}

#[test]
fn test_stream_round_trips_bytes() {
    let (client, server) = connected_pair();
    let mut out = SocketStream::new(Arc::clone(&client), "client");
    let mut input = SocketStream::new(Arc::clone(&server), "server");

    out.write_all(b"ping").unwrap();
    out.flush().unwrap();

    let mut buf = [0u8; 4];
    input.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ping");
    assert_eq!(input.name(), "server");
}

#[test]
fn test_close_unblocks_reader_on_other_thread() {
    let (_client, server) = connected_pair();
    let reader_socket = Arc::clone(&server);

    let reader = thread::spawn(move || {
        let mut stream = SocketStream::new(reader_socket, "reader");
        let mut buf = [0u8; 8];
        stream.read(&mut buf)
    });

    thread::sleep(Duration::from_millis(50));
    let start = Instant::now();
    server.close();

    let result = reader.join().expect("reader thread");
    // A locally shut down read side reports EOF (0 bytes).
    assert!(matches!(result, Ok(0)), "unexpected read result: {result:?}");
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_concurrent_read_and_write_on_one_socket() {
    let (client, server) = connected_pair();

    let echo_socket = Arc::clone(&server);
    let echo = thread::spawn(move || {
        let mut buf = [0u8; 1];
        for _ in 0..100 {
            echo_socket.read(&mut buf).unwrap();
            echo_socket.write(&buf).unwrap();
        }
    });

    let reader_socket = Arc::clone(&client);
    let collector = thread::spawn(move || {
        let mut received = Vec::new();
        let mut buf = [0u8; 1];
        for _ in 0..100 {
            reader_socket.read(&mut buf).unwrap();
            received.push(buf[0]);
        }
        received
    });

    for i in 0..100u8 {
        client.write(&[i]).unwrap();
    }

    echo.join().unwrap();
    let received = collector.join().unwrap();
    assert_eq!(received, (0..100u8).collect::<Vec<_>>());
    assert_eq!(server.bytes_read(), 100);
    assert_eq!(server.bytes_written(), 100);
}

#[test]
fn test_stream_timeout_surfaces_as_timed_out() {
    let (_client, server) = connected_pair();
    server.set_read_timeout(Duration::from_millis(30));

    let mut stream = SocketStream::new(server, "timeout");
    let mut buf = [0u8; 1];
    let err = stream.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimedOut);
}

#[test]
fn test_stream_read_exact_eof_is_unexpected_eof() {
    let (client, server) = connected_pair();
    client.write(b"ab").unwrap();
    client.close();

    let mut stream = SocketStream::new(server, "eof");
    let mut buf = [0u8; 4];
    let err = stream.read_exact(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
}

#[test]
fn test_idle_time_resets_on_activity() {
    let (client, server) = connected_pair();
    thread::sleep(Duration::from_millis(60));
    assert!(client.idle_time() >= Duration::from_millis(50));

    client.write(b"x").unwrap();
    assert!(client.idle_time() < Duration::from_millis(50));

    let mut buf = [0u8; 1];
    server.read(&mut buf).unwrap();
}
