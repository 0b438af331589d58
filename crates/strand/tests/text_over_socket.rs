//! Line-oriented traffic over a Strand socket.

use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use strand::prelude::*;

#[test]
fn test_text_lines_over_socket() {
    let mut listener = ListenerSocket::bind("127.0.0.1", 0, None).unwrap();
    listener.set_accept_timeout(Duration::from_secs(2));
    let port = listener.local_addr().unwrap().port();

    let client = Arc::new(Socket::connect("127.0.0.1", port).unwrap());
    let server = Arc::new(listener.accept().unwrap().unwrap());
    server.set_read_timeout(Duration::from_secs(5));

    let mut writer = TextWriter::with_line_ending(
        SocketStream::new(Arc::clone(&client), "client"),
        LineEnding::CrLf,
    );
    writer.write_line(b"HELO strand").unwrap();
    writer.write_line_with(b"bare", LineEnding::Cr).unwrap();
    writer.write_string(b"tail").unwrap();
    writer.flush().unwrap();
    client.close();

    let stream = SocketStream::new(server, "server");
    let mut reader = TextReader::new(BufReader::new(stream));
    assert_eq!(reader.read_line(false).unwrap(), b"HELO strand");
    assert_eq!(reader.detected_line_endings(), DetectedLineEndings::CrLf);
    assert_eq!(reader.read_line(true).unwrap(), b"bare\r");
    assert_eq!(reader.read_line(false).unwrap(), b"tail");
    assert_eq!(reader.detected_line_endings(), DetectedLineEndings::Mixed);
    assert!(matches!(reader.read_line(false), Err(TextError::Eof)));
}
