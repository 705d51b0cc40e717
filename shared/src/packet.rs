//! Outbound control packets and inbound tag classification.
//!
//! Outbound packets are a single tag byte, optionally followed by a payload.
//! Inbound frames carry their tag at offset 2; the two bytes before it are
//! framing the client does not use.

use crate::challenge::CHALLENGE_ANSWER_LEN;
use crate::ProtocolError;

pub const TAG_START_LOGIN: u8 = b'c';
pub const TAG_SET_USERNAME: u8 = b's';
pub const TAG_KEEP_ALIVE: u8 = 0xfb;
pub const TAG_BOOST_ON: u8 = 253;
pub const TAG_BOOST_OFF: u8 = 254;

/// Largest value a move packet carries (a full turn).
pub const MOVE_SCALE: f32 = 250.0;

const INBOUND_TAG_OFFSET: usize = 2;

/// Packets the client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    StartLogin,
    ChallengeAnswer([u8; CHALLENGE_ANSWER_LEN]),
    SetUsernameAndSkin {
        protocol_version: u16,
        skin_id: u8,
        nickname: String,
    },
    KeepAlive,
    Boost(bool),
    /// Heading in degrees; any value, normalized on encode.
    Move(f32),
}

impl Outbound {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Outbound::StartLogin => vec![TAG_START_LOGIN],
            Outbound::ChallengeAnswer(answer) => answer.to_vec(),
            Outbound::SetUsernameAndSkin {
                protocol_version,
                skin_id,
                nickname,
            } => {
                let nick = truncate_nickname(nickname).as_bytes();
                let version = u8::try_from(protocol_version.saturating_sub(1)).unwrap_or(u8::MAX);

                let mut buf = Vec::with_capacity(4 + nick.len());
                buf.push(TAG_SET_USERNAME);
                buf.push(version);
                buf.push(*skin_id);
                buf.push(nick.len() as u8);
                buf.extend_from_slice(nick);
                buf
            }
            Outbound::KeepAlive => vec![TAG_KEEP_ALIVE],
            Outbound::Boost(true) => vec![TAG_BOOST_ON],
            Outbound::Boost(false) => vec![TAG_BOOST_OFF],
            Outbound::Move(angle) => vec![encode_heading(*angle)],
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Outbound::StartLogin => "StartLogin",
            Outbound::ChallengeAnswer(_) => "ChallengeAnswer",
            Outbound::SetUsernameAndSkin { .. } => "SetUsernameAndSkin",
            Outbound::KeepAlive => "KeepAlive",
            Outbound::Boost(_) => "Boost",
            Outbound::Move(_) => "Move",
        }
    }
}

/// Longest prefix of `nickname` that fits the one-byte length field without
/// splitting a character.
fn truncate_nickname(nickname: &str) -> &str {
    let mut end = nickname.len().min(u8::MAX as usize);
    while !nickname.is_char_boundary(end) {
        end -= 1;
    }
    &nickname[..end]
}

/// Scales a heading in degrees to the `0..=250` move byte.
pub fn encode_heading(angle_degrees: f32) -> u8 {
    let normalized = angle_degrees.rem_euclid(360.0);
    (normalized / 360.0 * MOVE_SCALE).round() as u8
}

/// Heading in degrees that a move byte stands for.
pub fn decode_heading(value: u8) -> f32 {
    f32::from(value) / MOVE_SCALE * 360.0
}

/// Inbound tags the game layer consumes. The client never looks inside
/// their payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameTag {
    SnakeRotation(u8),
    MoveSnake(u8),
    IncreaseSnake(u8),
    UpdateFullness,
    RemoveSnakePart,
    AddOrRemoveSnake,
    AddFood(u8),
    FoodEaten,
    UpdatePrey,
    AddOrRemovePrey,
    Leaderboard,
    AddSector,
    RemoveSector,
    GlobalHighscore,
    UpdateMinimap,
    DeadOrDisconnect,
    VerifyCodeResponse,
    Kill,
    Unknown(u8),
}

impl GameTag {
    pub fn from_byte(tag: u8) -> Self {
        match tag {
            b'e' | b'E' | b'3' | b'4' | b'5' => GameTag::SnakeRotation(tag),
            b'g' | b'G' => GameTag::MoveSnake(tag),
            b'n' | b'N' => GameTag::IncreaseSnake(tag),
            b'h' => GameTag::UpdateFullness,
            b'r' => GameTag::RemoveSnakePart,
            b's' => GameTag::AddOrRemoveSnake,
            b'F' | b'b' | b'f' => GameTag::AddFood(tag),
            b'c' => GameTag::FoodEaten,
            b'j' => GameTag::UpdatePrey,
            b'y' => GameTag::AddOrRemovePrey,
            b'l' => GameTag::Leaderboard,
            b'W' => GameTag::AddSector,
            b'w' => GameTag::RemoveSector,
            b'm' => GameTag::GlobalHighscore,
            b'u' => GameTag::UpdateMinimap,
            b'v' => GameTag::DeadOrDisconnect,
            b'o' => GameTag::VerifyCodeResponse,
            b'k' => GameTag::Kill,
            other => GameTag::Unknown(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match *self {
            GameTag::SnakeRotation(tag)
            | GameTag::MoveSnake(tag)
            | GameTag::IncreaseSnake(tag)
            | GameTag::AddFood(tag)
            | GameTag::Unknown(tag) => tag,
            GameTag::UpdateFullness => b'h',
            GameTag::RemoveSnakePart => b'r',
            GameTag::AddOrRemoveSnake => b's',
            GameTag::FoodEaten => b'c',
            GameTag::UpdatePrey => b'j',
            GameTag::AddOrRemovePrey => b'y',
            GameTag::Leaderboard => b'l',
            GameTag::AddSector => b'W',
            GameTag::RemoveSector => b'w',
            GameTag::GlobalHighscore => b'm',
            GameTag::UpdateMinimap => b'u',
            GameTag::DeadOrDisconnect => b'v',
            GameTag::VerifyCodeResponse => b'o',
            GameTag::Kill => b'k',
        }
    }

    pub fn as_char(&self) -> char {
        self.as_byte() as char
    }
}

/// A classified inbound frame, borrowing its payload from the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    PreInitChallenge(&'a [u8]),
    SpawnAcknowledged,
    KeepAliveAck,
    Gameplay { tag: GameTag, payload: &'a [u8] },
}

impl<'a> Inbound<'a> {
    pub fn parse(frame: &'a [u8]) -> Result<Self, ProtocolError> {
        let tag = *frame
            .get(INBOUND_TAG_OFFSET)
            .ok_or(ProtocolError::TruncatedFrame(frame.len()))?;
        let payload = &frame[INBOUND_TAG_OFFSET + 1..];

        Ok(match tag {
            b'6' => Inbound::PreInitChallenge(payload),
            b'a' => Inbound::SpawnAcknowledged,
            b'p' => Inbound::KeepAliveAck,
            other => Inbound::Gameplay {
                tag: GameTag::from_byte(other),
                payload,
            },
        })
    }
}

/// An inbound packet handed to the gameplay layer untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedPacket {
    pub tag: GameTag,
    pub payload: Vec<u8>,
}
