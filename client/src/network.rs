//! Websocket driver and the public client handle
//!
//! Each connection runs on its own task. The task exclusively owns the socket
//! and the `Session`, and multiplexes three event sources with `select!`:
//! inbound frames, commands from the `Client` handle, and keep-alive ticks.
//! Handlers run to completion one at a time, so the session needs no locking.

use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::session::{PacketHandler, Session, SessionState, SessionStatus};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ForwardedPacket, Outbound, GAME_DOMAIN};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Desktop browser headers; the server rejects handshakes without them.
const BROWSER_HEADERS: [(&str, &str); 5] = [
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36",
    ),
    ("cache-control", "no-cache"),
    ("accept-encoding", "gzip, deflate, br"),
    ("accept-language", "en-US,en;q=0.9"),
    ("pragma", "no-cache"),
];

#[derive(Debug)]
enum Command {
    Move(f32),
    Boost(bool),
    Disconnect,
}

struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<Result<(), ClientError>>,
}

impl Connection {
    fn is_live(&self) -> bool {
        !self.task.is_finished() && self.status.borrow().state.owns_socket()
    }
}

/// Handle to one game session. Holds at most one live connection.
pub struct Client {
    config: SessionConfig,
    handler: Option<PacketHandler>,
    connection: Option<Connection>,
}

impl Client {
    pub fn new(config: SessionConfig) -> Result<Self, ClientError> {
        config.validate()?;

        Ok(Client {
            config,
            handler: None,
            connection: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registers the gameplay packet handler used by subsequent connections.
    pub fn on_packet<F>(&mut self, handler: F)
    where
        F: Fn(ForwardedPacket) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
    }

    pub fn state(&self) -> SessionState {
        self.connection
            .as_ref()
            .map_or(SessionState::Disconnected, |conn| conn.status.borrow().state)
    }

    /// Round trip of the last acknowledged keep-alive.
    pub fn latency(&self) -> Option<Duration> {
        self.connection
            .as_ref()
            .and_then(|conn| conn.status.borrow().latency)
    }

    /// Opens the socket and starts the login sequence.
    ///
    /// Returns once StartLogin has been sent; the rest of the handshake runs in
    /// the background.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        if self.connection.as_ref().is_some_and(Connection::is_live) {
            return Err(ClientError::AlreadyConnected);
        }
        // reap a connection that ended on its own
        if let Some(stale) = self.connection.take() {
            if let Ok(Err(e)) = stale.task.await {
                debug!("Previous connection ended with: {}", e);
            }
        }

        let mut session = Session::new(self.config.clone())?;
        if let Some(handler) = &self.handler {
            session.set_handler(Arc::clone(handler));
        }

        let url = session.connect()?;
        info!("Connecting to {}", url);

        let mut socket = match open_socket(&url).await {
            Ok(socket) => socket,
            Err(e) => {
                error!("Failed to connect to {}: {}", url, e);
                session.closed();
                return Err(e);
            }
        };
        info!("Connected to {}", url);

        let greeting = session.opened();
        if let Err(e) = send_all(&mut socket, greeting).await {
            session.closed();
            return Err(e);
        }

        let (status_tx, status_rx) = watch::channel(session.status());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_session(session, socket, command_rx, status_tx));

        self.connection = Some(Connection {
            commands: command_tx,
            status: status_rx,
            task,
        });

        Ok(())
    }

    /// Resolves once the session reaches `target`.
    pub async fn wait_for_state(&self, target: SessionState) -> Result<(), ClientError> {
        let mut status = self
            .connection
            .as_ref()
            .map(|conn| conn.status.clone())
            .ok_or(ClientError::NotConnected)?;

        let reached = status
            .wait_for(|s| s.state == target || s.state == SessionState::Disconnected)
            .await
            .map(|s| s.state)
            .unwrap_or(SessionState::Disconnected);

        if reached == target {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    pub fn move_to(&self, angle_degrees: f32) -> Result<(), ClientError> {
        self.command(Command::Move(angle_degrees))
    }

    pub fn boost(&self, on: bool) -> Result<(), ClientError> {
        self.command(Command::Boost(on))
    }

    fn command(&self, command: Command) -> Result<(), ClientError> {
        let conn = self
            .connection
            .as_ref()
            .filter(|conn| conn.is_live())
            .ok_or(ClientError::NotConnected)?;

        conn.commands
            .send(command)
            .map_err(|_| ClientError::NotConnected)
    }

    /// Stops the keep-alive, closes the socket and waits for the session task.
    /// No-op when already disconnected. An error that ended the connection
    /// earlier is only logged; `closed()` is where it gets reported.
    pub async fn disconnect(&mut self) -> Result<(), ClientError> {
        let Some(conn) = self.connection.take() else {
            return Ok(());
        };

        // the task may already be gone
        let _ = conn.commands.send(Command::Disconnect);
        if let Err(e) = conn.task.await? {
            debug!("Connection had already ended with: {}", e);
        }
        Ok(())
    }

    /// Waits until the connection ends on its own and returns the error that
    /// ended it, if any.
    pub async fn closed(&mut self) -> Result<(), ClientError> {
        let Some(conn) = self.connection.as_mut() else {
            return Ok(());
        };

        let result = (&mut conn.task).await;
        self.connection = None;
        result?
    }
}

async fn open_socket(url: &str) -> Result<Socket, ClientError> {
    let request = browser_request(url)?;
    let (socket, response) = connect_async(request).await?;
    debug!("Handshake response: {}", response.status());
    Ok(socket)
}

fn browser_request(url: &str) -> Result<Request, ClientError> {
    let mut request = url.into_client_request()?;
    let headers = request.headers_mut();

    for (name, value) in BROWSER_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    let origin = format!("http://{}", GAME_DOMAIN);
    headers.insert(
        "origin",
        HeaderValue::from_str(&origin).map_err(|e| ClientError::InvalidConfig(e.to_string()))?,
    );

    Ok(request)
}

async fn send(socket: &mut Socket, packet: Outbound) -> Result<(), ClientError> {
    debug!("Sending {}", packet.name());
    socket.send(Message::Binary(packet.encode())).await?;
    Ok(())
}

async fn send_all(socket: &mut Socket, packets: Vec<Outbound>) -> Result<(), ClientError> {
    for packet in packets {
        send(socket, packet).await?;
    }
    Ok(())
}

async fn run_session(
    mut session: Session,
    mut socket: Socket,
    mut commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<SessionStatus>,
) -> Result<(), ClientError> {
    let result = drive(&mut session, &mut socket, &mut commands, &status).await;

    if let Err(e) = &result {
        error!("Session ended: {}", e);
        if let Err(e) = socket.close(None).await {
            debug!("Error closing socket: {}", e);
        }
    }

    session.closed();
    status.send_replace(session.status());
    result
}

async fn drive(
    session: &mut Session,
    socket: &mut Socket,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    status: &watch::Sender<SessionStatus>,
) -> Result<(), ClientError> {
    loop {
        tokio::select! {
            frame = socket.next() => match frame {
                Some(Ok(Message::Binary(data))) => {
                    let replies = session.message_received(&data)?;
                    send_all(socket, replies).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Server closed the connection: {:?}", frame);
                    return Ok(());
                }
                Some(Ok(other)) => debug!("Ignoring non-binary frame: {:?}", other),
                Some(Err(e)) => return Err(e.into()),
                None => {
                    info!("Connection closed");
                    return Ok(());
                }
            },

            command = commands.recv() => match command {
                Some(Command::Move(angle)) => match session.steer(angle) {
                    Ok(packet) => send(socket, packet).await?,
                    Err(e) => warn!("Dropping move: {}", e),
                },
                Some(Command::Boost(on)) => match session.boost(on) {
                    Ok(packet) => send(socket, packet).await?,
                    Err(e) => warn!("Dropping boost: {}", e),
                },
                Some(Command::Disconnect) | None => {
                    info!("Disconnecting");
                    session.disconnect();
                    // fire-and-forget: a failed close still ends the session
                    if let Err(e) = socket.close(None).await {
                        debug!("Error closing socket: {}", e);
                    }
                    return Ok(());
                }
            },

            packet = session.keep_alive_tick() => send(socket, packet).await?,
        }

        status.send_replace(session.status());
    }
}
