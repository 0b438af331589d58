use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strand::prelude::*;

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// `Login` (JSON payload) → `Welcome`, then the client is online.
const LOGIN: MessageKind = MessageKind(1);
const WELCOME: MessageKind = MessageKind(2);
/// Echoed back unchanged.
const ECHO: MessageKind = MessageKind(3);
/// Reversed on the worker pool, then sent back.
const REVERSE: MessageKind = MessageKind(4);
/// Broadcast to every session as `Chat`.
const SAY: MessageKind = MessageKind(5);
const CHAT: MessageKind = MessageKind(6);

#[derive(Serialize, Deserialize)]
struct Login {
    name: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Chat {
    from: String,
    text: String,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

struct EchoHandler {
    workers: WorkerPool,
}

impl MessageHandler<LoginGate> for EchoHandler {
    fn handle_message(
        &self,
        session: &Arc<ClientSession<LoginGate>>,
        message: Message,
    ) -> Result<(), SessionError> {
        match message.kind() {
            LOGIN => {
                let login: Login = message.to_value(&JsonCodec)?;
                tracing::info!(session = %session.name(), user = %login.name, "login");
                let welcome = Message::from_value(WELCOME, &login.name, &JsonCodec)?;
                session.post_output_message(welcome.into_ptr(), false);
                session.bring_client_online(|gate| gate.set_online(true));
            }
            _ if !session.is_client_online() => {
                return Err(SessionError::InvalidState(format!(
                    "{} before login",
                    message.kind()
                )));
            }
            ECHO => session.post_output_message(message.into_ptr(), false),
            REVERSE => {
                let session = Arc::clone(session);
                self.workers.post(move || {
                    let mut reversed = message.payload().to_vec();
                    reversed.reverse();
                    session.post_output_message(Message::new(REVERSE, reversed).into_ptr(), false);
                });
            }
            SAY => {
                let chat = Chat {
                    from: session.name().to_string(),
                    text: String::from_utf8_lossy(message.payload()).into_owned(),
                };
                let chat = Message::from_value(CHAT, &chat, &JsonCodec)?.into_ptr();
                if let Some(registry) = session.registry() {
                    registry.broadcast(chat);
                }
            }
            other => return Err(SessionError::Rejected(format!("unknown message {other}"))),
        }
        Ok(())
    }
}

fn build_server(config: ServerConfig) -> Result<Server<LoginGate>, StrandError> {
    let handler = EchoHandler {
        workers: WorkerPool::new("echo-workers", 2)?,
    };
    Server::<LoginGate>::builder()
        .config(config)
        .handler(handler)
        .factory(|_: &Socket| LoginGate::new())
        .build()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    strand::logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig {
            session_base_name: "echo".into(),
            ..ServerConfig::default()
        },
    };

    let server = build_server(config)?;
    tracing::info!(addr = %server.local_addr(), "echo server running");
    server.run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use strand::protocol::DEFAULT_MAX_MESSAGE_SIZE;

    fn start() -> Server<LoginGate> {
        let mut server = build_server(ServerConfig {
            bind_address: "127.0.0.1".into(),
            port: 0,
            accept_timeout: Duration::from_millis(100),
            ..ServerConfig::default()
        })
        .unwrap();
        server.start().unwrap();
        server
    }

    struct Client {
        stream: SocketStream,
    }

    impl Client {
        fn connect(server: &Server<LoginGate>) -> Self {
            let socket = Socket::connect("127.0.0.1", server.local_addr().port()).unwrap();
            socket.set_read_timeout(Duration::from_secs(5));
            Self {
                stream: SocketStream::new(Arc::new(socket), "client"),
            }
        }

        fn send(&mut self, message: Message) {
            message.send("client", &mut self.stream).unwrap();
        }

        fn recv(&mut self) -> Message {
            Message::receive(&mut self.stream, &MessagePool::default(), DEFAULT_MAX_MESSAGE_SIZE)
                .unwrap()
        }

        fn login(&mut self, name: &str) {
            let login = Login { name: name.into() };
            self.send(Message::from_value(LOGIN, &login, &JsonCodec).unwrap());
            let welcome = self.recv();
            assert_eq!(welcome.kind(), WELCOME);
            assert_eq!(welcome.to_value::<String>(&JsonCodec).unwrap(), name);
        }
    }

    #[test]
    fn test_echo_and_reverse_after_login() {
        let server = start();
        let mut client = Client::connect(&server);
        client.login("ada");

        client.send(Message::new(ECHO, b"hello".to_vec()));
        assert_eq!(client.recv().payload(), b"hello");

        client.send(Message::new(REVERSE, b"hello".to_vec()));
        let reversed = client.recv();
        assert_eq!(reversed.kind(), REVERSE);
        assert_eq!(reversed.payload(), b"olleh");
    }

    #[test]
    fn test_echo_before_login_is_ignored() {
        let server = start();
        let mut client = Client::connect(&server);

        client.send(Message::new(ECHO, b"too early".to_vec()));
        client.login("bob");
        client.send(Message::new(ECHO, b"now".to_vec()));
        assert_eq!(client.recv().payload(), b"now");
    }

    #[test]
    fn test_say_reaches_every_logged_in_client() {
        let server = start();
        let mut alice = Client::connect(&server);
        let mut bob = Client::connect(&server);
        alice.login("alice");
        bob.login("bob");

        alice.send(Message::new(SAY, b"hi all".to_vec()));
        for client in [&mut alice, &mut bob] {
            let chat = client.recv();
            assert_eq!(chat.kind(), CHAT);
            let chat: Chat = chat.to_value(&JsonCodec).unwrap();
            assert_eq!(chat.text, "hi all");
        }
    }
}
