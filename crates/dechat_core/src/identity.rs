//! crates/dechat_core/src/identity.rs
//!
//! Pure derivation of room and participant identifiers from the shared
//! phrase pair. No I/O; every other component builds on these two functions.
//!
//! The identifiers are non-cryptographic fingerprints: short, lowercase,
//! path-safe strings that are deterministic across calls and process
//! restarts. They are collision-unlikely, not collision-resistant.

use crate::domain::{ParticipantId, RoomId};

const ROOM_ID_LEN: usize = 12;
const PARTICIPANT_ID_LEN: usize = 16;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Derives the room identifier from the ordered phrase pair.
///
/// Order is significant: `derive_room_id("a", "b")` and
/// `derive_room_id("b", "a")` produce different identifiers.
pub fn derive_room_id(first_phrase: &str, second_phrase: &str) -> RoomId {
    let normalized: String = joined(first_phrase, second_phrase)
        .chars()
        .filter(|&c| matches!(c, 'a'..='z' | '0'..='9'))
        .collect();
    RoomId::from(encode(fold(&normalized), ROOM_ID_LEN))
}

/// Derives the participant identifier from the phrase pair plus the role
/// flag. The role tag is appended before stripping, and the stripping keeps
/// dashes, so a host and a guest always fold different inputs.
pub fn derive_participant_id(
    first_phrase: &str,
    second_phrase: &str,
    is_host: bool,
) -> ParticipantId {
    let role = if is_host { "-host" } else { "-guest" };
    let normalized: String = format!("{}{}", joined(first_phrase, second_phrase), role)
        .chars()
        .filter(|&c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
        .collect();
    ParticipantId::from(encode(fold(&normalized), PARTICIPANT_ID_LEN))
}

fn joined(first_phrase: &str, second_phrase: &str) -> String {
    format!("{first_phrase}-{second_phrase}").to_lowercase()
}

/// Polynomial rolling hash with multiplier 31 over a wrapping 32-bit signed
/// accumulator: `acc = (acc << 5) - acc + byte`. The empty string folds to 0.
fn fold(input: &str) -> i32 {
    input.bytes().fold(0i32, |acc, byte| {
        acc.wrapping_shl(5)
            .wrapping_sub(acc)
            .wrapping_add(i32::from(byte))
    })
}

/// Base-36 encoding of the signed accumulator, with a leading `-` for
/// negative values, truncated to `max_len` characters.
fn encode(value: i32, max_len: usize) -> String {
    let mut digits = Vec::new();
    let mut remainder = value.unsigned_abs();
    loop {
        digits.push(BASE36[(remainder % 36) as usize] as char);
        remainder /= 36;
        if remainder == 0 {
            break;
        }
    }
    if value < 0 {
        digits.push('-');
    }
    let mut encoded: String = digits.into_iter().rev().collect();
    encoded.truncate(max_len);
    encoded
}
