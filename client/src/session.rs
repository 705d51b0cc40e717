//! Connection lifecycle state machine
//!
//! `Session` performs no I/O. The network driver feeds it socket events
//! (`opened`, `message_received`, `closed`) and keep-alive ticks, and writes
//! whatever packets it returns. This keeps every transition testable without a
//! server.

use crate::config::SessionConfig;
use crate::error::ClientError;
use log::{debug, info, trace, warn};
use shared::{decode_challenge, ForwardedPacket, Inbound, Outbound, KEEP_ALIVE_PERIOD_MS};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Receives every inbound packet the session does not consume itself.
pub type PacketHandler = Arc<dyn Fn(ForwardedPacket) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingChallenge,
    AwaitingSpawnAck,
    Spawned,
}

impl SessionState {
    /// Whether a socket is owned in this state.
    pub fn owns_socket(&self) -> bool {
        !matches!(self, SessionState::Disconnected)
    }

    /// Whether the socket is open and accepts steering packets.
    pub fn accepts_controls(&self) -> bool {
        matches!(
            self,
            SessionState::AwaitingChallenge | SessionState::AwaitingSpawnAck | SessionState::Spawned
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingChallenge => "awaiting challenge",
            SessionState::AwaitingSpawnAck => "awaiting spawn",
            SessionState::Spawned => "spawned",
        };
        f.write_str(name)
    }
}

/// Observable view of a session, published by the network driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub latency: Option<Duration>,
}

/// Periodic keep-alive ticker. Exists only while the session is spawned.
pub struct KeepAliveTimer {
    interval: Interval,
    ticks: u64,
}

impl KeepAliveTimer {
    /// First tick fires one full period after start.
    pub fn start(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, ticks: 0 }
    }

    pub async fn tick(&mut self) -> u64 {
        self.interval.tick().await;
        self.ticks += 1;
        self.ticks
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

pub struct Session {
    config: SessionConfig,
    state: SessionState,
    keep_alive: Option<KeepAliveTimer>,
    keep_alive_period: Duration,
    ping_sent_at: Option<Instant>,
    latency: Option<Duration>,
    handler: Option<PacketHandler>,
}

impl Session {
    /// Fails with `InvalidConfig` when the settings cannot be put on the wire.
    pub fn new(config: SessionConfig) -> Result<Self, ClientError> {
        config.validate()?;

        Ok(Self {
            config,
            state: SessionState::Disconnected,
            keep_alive: None,
            keep_alive_period: Duration::from_millis(KEEP_ALIVE_PERIOD_MS),
            ping_sent_at: None,
            latency: None,
            handler: None,
        })
    }

    pub fn set_handler(&mut self, handler: PacketHandler) {
        self.handler = Some(handler);
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            latency: self.latency,
        }
    }

    pub fn keep_alive_active(&self) -> bool {
        self.keep_alive.is_some()
    }

    /// Keep-alive packets sent since the timer last started.
    pub fn keep_alive_ticks(&self) -> u64 {
        self.keep_alive.as_ref().map_or(0, KeepAliveTimer::ticks)
    }

    /// Claims the socket slot and returns the URL to open.
    pub fn connect(&mut self) -> Result<String, ClientError> {
        if self.state.owns_socket() {
            return Err(ClientError::AlreadyConnected);
        }

        self.transition(SessionState::Connecting);
        Ok(self.config.endpoint.ws_url())
    }

    /// Socket handshake completed.
    pub fn opened(&mut self) -> Vec<Outbound> {
        if self.state != SessionState::Connecting {
            warn!("Socket opened while {}, ignoring", self.state);
            return Vec::new();
        }

        self.transition(SessionState::AwaitingChallenge);
        vec![Outbound::StartLogin]
    }

    /// Handles one inbound binary frame and returns the packets to send.
    pub fn message_received(&mut self, frame: &[u8]) -> Result<Vec<Outbound>, ClientError> {
        let packet = match Inbound::parse(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                return Ok(Vec::new());
            }
        };

        match packet {
            Inbound::PreInitChallenge(payload) => self.answer_challenge(payload),
            Inbound::SpawnAcknowledged => {
                self.spawned();
                Ok(Vec::new())
            }
            Inbound::KeepAliveAck => {
                if let Some(sent_at) = self.ping_sent_at.take() {
                    let rtt = sent_at.elapsed();
                    trace!("Keep-alive acknowledged after {:?}", rtt);
                    self.latency = Some(rtt);
                }
                Ok(Vec::new())
            }
            Inbound::Gameplay { tag, payload } => {
                if let Some(handler) = &self.handler {
                    handler(ForwardedPacket {
                        tag,
                        payload: payload.to_vec(),
                    });
                }
                Ok(Vec::new())
            }
        }
    }

    fn answer_challenge(&mut self, payload: &[u8]) -> Result<Vec<Outbound>, ClientError> {
        if self.state != SessionState::AwaitingChallenge {
            warn!("Challenge received while {}, ignoring", self.state);
            return Ok(Vec::new());
        }

        debug!("Solving {}-byte challenge", payload.len());
        let answer = decode_challenge(payload)?;
        self.transition(SessionState::AwaitingSpawnAck);

        Ok(vec![
            Outbound::ChallengeAnswer(answer),
            Outbound::SetUsernameAndSkin {
                protocol_version: self.config.protocol_version,
                skin_id: self.config.skin_id,
                nickname: self.config.nickname.clone(),
            },
        ])
    }

    fn spawned(&mut self) {
        if self.state != SessionState::AwaitingSpawnAck {
            warn!("Spawn acknowledgement received while {}, ignoring", self.state);
            return;
        }

        self.transition(SessionState::Spawned);
        if self.keep_alive.is_none() {
            info!("Starting keep-alive every {:?}", self.keep_alive_period);
            self.keep_alive = Some(KeepAliveTimer::start(self.keep_alive_period));
        }
    }

    /// Resolves at the next keep-alive tick; never resolves without a timer.
    pub async fn keep_alive_tick(&mut self) -> Outbound {
        match self.keep_alive.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }

        self.ping_sent_at = Some(Instant::now());
        Outbound::KeepAlive
    }

    /// Socket closed or failed.
    pub fn closed(&mut self) {
        self.release();
    }

    /// Returns whether there was a socket to close. Safe to call repeatedly.
    pub fn disconnect(&mut self) -> bool {
        let owned = self.state.owns_socket();
        self.release();
        owned
    }

    fn release(&mut self) {
        if self.keep_alive.take().is_some() {
            info!("Keep-alive stopped");
        }
        self.ping_sent_at = None;
        if self.state != SessionState::Disconnected {
            self.transition(SessionState::Disconnected);
        }
    }

    pub fn steer(&self, angle_degrees: f32) -> Result<Outbound, ClientError> {
        self.control(Outbound::Move(angle_degrees))
    }

    pub fn boost(&self, on: bool) -> Result<Outbound, ClientError> {
        self.control(Outbound::Boost(on))
    }

    fn control(&self, packet: Outbound) -> Result<Outbound, ClientError> {
        if self.state.accepts_controls() {
            Ok(packet)
        } else {
            Err(ClientError::NotConnected)
        }
    }

    fn transition(&mut self, next: SessionState) {
        info!("Session {} -> {}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoint;
    use shared::{GameTag, MIN_CHALLENGE_LEN};
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    fn config() -> SessionConfig {
        SessionConfig {
            endpoint: Endpoint::new("127.0.0.1", 444),
            nickname: "snek".to_string(),
            skin_id: 7,
            protocol_version: 11,
        }
    }

    fn challenge_frame() -> Vec<u8> {
        let mut frame = vec![0, 0, b'6'];
        frame.extend(std::iter::repeat(b'q').take(MIN_CHALLENGE_LEN));
        frame
    }

    /// Drives a fresh session up to the given state.
    fn session_in(state: SessionState) -> Session {
        let mut session = Session::new(config()).unwrap();
        if state == SessionState::Disconnected {
            return session;
        }
        session.connect().unwrap();
        if state == SessionState::Connecting {
            return session;
        }
        session.opened();
        if state == SessionState::AwaitingChallenge {
            return session;
        }
        session.message_received(&challenge_frame()).unwrap();
        if state == SessionState::AwaitingSpawnAck {
            return session;
        }
        session.message_received(&[0, 0, b'a']).unwrap();
        session
    }

    #[test]
    fn test_new_session_is_disconnected() {
        let session = Session::new(config()).unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.keep_alive_active());
        assert_eq!(session.latency(), None);
    }

    #[test]
    fn test_new_session_validates_config() {
        let mut oversized = config();
        oversized.nickname = "é".repeat(128);
        assert!(matches!(
            Session::new(oversized),
            Err(ClientError::InvalidConfig(_))
        ));

        let mut unencodable = config();
        unencodable.protocol_version = 257;
        assert!(matches!(
            Session::new(unencodable),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_connect_returns_socket_url() {
        let mut session = Session::new(config()).unwrap();
        let url = assert_ok!(session.connect());
        assert_eq!(url, "ws://127.0.0.1:444/slither");
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn test_second_connect_fails() {
        for state in [
            SessionState::Connecting,
            SessionState::AwaitingChallenge,
            SessionState::AwaitingSpawnAck,
        ] {
            let mut session = session_in(state);
            assert!(matches!(
                session.connect(),
                Err(ClientError::AlreadyConnected)
            ));
            assert_eq!(session.state(), state);
        }
    }

    #[test]
    fn test_open_sends_start_login() {
        let mut session = session_in(SessionState::Connecting);
        assert_eq!(session.opened(), vec![Outbound::StartLogin]);
        assert_eq!(session.state(), SessionState::AwaitingChallenge);
    }

    #[test]
    fn test_challenge_answer_then_username() {
        let mut session = session_in(SessionState::AwaitingChallenge);
        let replies = session.message_received(&challenge_frame()).unwrap();

        assert_eq!(replies.len(), 2);
        let answer = replies[0].encode();
        assert_eq!(answer.len(), 24);
        assert!(answer.iter().all(u8::is_ascii_alphabetic));

        let username = replies[1].encode();
        assert_eq!(username[0], b's');
        assert_eq!(username[1], 10);
        assert_eq!(username[2], 7);
        assert_eq!(username[3], 4);
        assert_eq!(&username[4..], b"snek");

        assert_eq!(session.state(), SessionState::AwaitingSpawnAck);
    }

    #[test]
    fn test_challenge_is_answered_once() {
        let mut session = session_in(SessionState::AwaitingSpawnAck);
        let replies = session.message_received(&challenge_frame()).unwrap();
        assert!(replies.is_empty());
        assert_eq!(session.state(), SessionState::AwaitingSpawnAck);
    }

    #[test]
    fn test_short_challenge_is_an_error() {
        let mut session = session_in(SessionState::AwaitingChallenge);
        let frame = [0, 0, b'6', b'a', b'b', b'c'];
        let err = session.message_received(&frame).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(shared::ProtocolError::MalformedChallenge(3))
        ));
        assert_eq!(session.state(), SessionState::AwaitingChallenge);
    }

    #[test]
    fn test_spawn_ack_before_challenge_is_ignored() {
        let mut session = session_in(SessionState::AwaitingChallenge);
        session.message_received(&[0, 0, b'a']).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingChallenge);
        assert!(!session.keep_alive_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_starts_keep_alive() {
        let session = session_in(SessionState::Spawned);
        assert_eq!(session.state(), SessionState::Spawned);
        assert!(session.keep_alive_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_ticks_every_period() {
        let mut session = session_in(SessionState::Spawned);
        let start = Instant::now();

        for expected in 1..=3u64 {
            assert_eq!(session.keep_alive_tick().await, Outbound::KeepAlive);
            assert_eq!(session.keep_alive_ticks(), expected);
        }

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3 * KEEP_ALIVE_PERIOD_MS));
        assert!(elapsed < Duration::from_millis(4 * KEEP_ALIVE_PERIOD_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_keep_alive() {
        let mut session = session_in(SessionState::Spawned);
        session.keep_alive_tick().await;

        assert!(session.disconnect());
        assert!(!session.keep_alive_active());
        assert_eq!(session.state(), SessionState::Disconnected);

        let next = tokio::time::timeout(Duration::from_secs(5), session.keep_alive_tick()).await;
        assert_err!(next);

        // idempotent
        assert!(!session.disconnect());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_releases_everything() {
        let mut session = session_in(SessionState::Spawned);
        session.closed();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.keep_alive_active());

        // a fresh login is possible afterwards
        assert_ok!(session.connect());
        assert_eq!(session.opened(), vec![Outbound::StartLogin]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_ack_measures_latency() {
        let mut session = session_in(SessionState::Spawned);
        session.keep_alive_tick().await;
        tokio::time::advance(Duration::from_millis(40)).await;

        session.message_received(&[0, 0, b'p']).unwrap();
        assert_eq!(session.latency(), Some(Duration::from_millis(40)));

        // an unsolicited ack leaves the measurement alone
        session.message_received(&[0, 0, b'p']).unwrap();
        assert_eq!(session.latency(), Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_gameplay_packets_are_forwarded() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        let mut session = session_in(SessionState::AwaitingChallenge);
        session.set_handler(Arc::new(move |packet: ForwardedPacket| sink.lock().unwrap().push(packet)));

        let replies = session.message_received(&[1, 2, b'l', 9, 8, 7]).unwrap();
        assert!(replies.is_empty());
        session.message_received(&[1, 2, b'p']).unwrap();
        session.message_received(&[1, 2]).unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].tag, GameTag::Leaderboard);
        assert_eq!(received[0].tag.as_char(), 'l');
        assert_eq!(received[0].payload, vec![9, 8, 7]);
    }

    #[test]
    fn test_controls_need_open_socket() {
        for state in [SessionState::Disconnected, SessionState::Connecting] {
            let session = session_in(state);
            assert!(matches!(session.steer(90.0), Err(ClientError::NotConnected)));
            assert!(matches!(session.boost(true), Err(ClientError::NotConnected)));
        }

        let session = session_in(SessionState::AwaitingChallenge);
        assert_eq!(assert_ok!(session.steer(90.0)), Outbound::Move(90.0));
        assert_eq!(assert_ok!(session.boost(false)), Outbound::Boost(false));
    }
}
