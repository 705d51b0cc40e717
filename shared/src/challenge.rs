//! Decoder for the anti-bot challenge carried by the pre-init packet.
//!
//! The server sends an obfuscated run of letters. Each pair of letters is
//! folded into the lower-case band, shifted by a round-dependent offset and
//! merged into one value; a running accumulator then chains every output
//! letter to all letters before it. The rounds must run in order.

use crate::ProtocolError;

/// Number of bytes in a challenge answer.
pub const CHALLENGE_ANSWER_LEN: usize = 24;

/// Shortest payload the decoder can read (last index touched is 64).
pub const MIN_CHALLENGE_LEN: usize = 65;

const PAYLOAD_OFFSET: usize = 17;
const ROUND_SHIFT: i32 = 34;

/// Computes the 24-byte answer for a challenge payload.
///
/// `challenge` is the pre-init packet body, starting right after the tag.
/// Every output byte is an ASCII letter.
pub fn decode_challenge(challenge: &[u8]) -> Result<[u8; CHALLENGE_ANSWER_LEN], ProtocolError> {
    if challenge.len() < MIN_CHALLENGE_LEN {
        return Err(ProtocolError::MalformedChallenge(challenge.len()));
    }

    let mut answer = [0u8; CHALLENGE_ANSWER_LEN];
    let mut acc: i32 = 0;

    for (i, slot) in answer.iter_mut().enumerate() {
        let round = i as i32;
        let first = fold_case(challenge[PAYLOAD_OFFSET + 2 * i]);
        let second = fold_case(challenge[PAYLOAD_OFFSET + 1 + 2 * i]);

        let v1 = (first - 98 - ROUND_SHIFT * round).rem_euclid(26);
        let v2 = (second - 115 - ROUND_SHIFT * round).rem_euclid(26);

        let merged = (v1 << 4) | v2;
        let base = if merged >= 97 { 97 } else { 65 };
        let letter = merged - base;

        if i == 0 {
            acc = 2 + letter;
        }

        *slot = ((letter + acc).rem_euclid(26) + base) as u8;
        acc += 3 + letter;
    }

    Ok(answer)
}

/// Moves upper-case (and anything below) into the lower-case band.
fn fold_case(byte: u8) -> i32 {
    let value = i32::from(byte);
    if value <= 96 {
        value + 32
    } else {
        value
    }
}
