//! Verifiable random identifiers.
//!
//! An identifier is 24 random bytes with a 48-bit millisecond time signature
//! and a 24-bit checksum folded in at fixed positions. Anyone holding the
//! bytes can check that they were produced by [`generate`] without sharing a
//! secret; the check is a sanity guard against garbled or hand-made ids, not
//! an authentication mechanism.
//!
//! The textual form is RFC 4648 base32, lowercase and unpadded.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use data_encoding::BASE32_NOPAD;
use rand::RngCore;

use crate::error::{Result, TransactionError};

/// Length of a raw identifier in bytes.
pub const ID_LEN: usize = 24;

/// Byte positions of the time signature, least significant first.
const TIME_POSITIONS: [usize; 6] = [3, 9, 15, 6, 12, 18];

/// Byte positions of the checksum, least significant first.
const CHECKSUM_POSITIONS: [usize; 3] = [11, 20, 0];

/// Tolerated clock skew for time signatures from the future.
const MAX_CLOCK_SKEW_MS: i64 = 1000;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn checksum(raw: &[u8; ID_LEN], time: i64) -> i32 {
    let mut hash = time as i32;
    for (i, b) in raw.iter().enumerate().take(20).skip(1) {
        if i != CHECKSUM_POSITIONS[0] {
            hash = hash.wrapping_mul(47).wrapping_add(*b as i8 as i32);
        }
    }
    hash
}

/// Generates a new raw identifier.
pub fn generate() -> [u8; ID_LEN] {
    let mut raw = [0u8; ID_LEN];
    rand::thread_rng().fill_bytes(&mut raw);

    let now = now_millis();
    for (shift, pos) in TIME_POSITIONS.iter().enumerate() {
        raw[*pos] = (now >> (8 * shift)) as u8;
    }

    let hash = checksum(&raw, now);
    for (shift, pos) in CHECKSUM_POSITIONS.iter().enumerate() {
        raw[*pos] = (hash >> (8 * shift)) as u8;
    }
    raw
}

/// Verifies a raw identifier produced by [`generate`].
///
/// When `ttl` is given, identifiers older than `ttl` are rejected as expired.
pub fn verify(raw: &[u8], ttl: Option<Duration>) -> Result<()> {
    let raw: &[u8; ID_LEN] = raw
        .try_into()
        .map_err(|_| TransactionError::illegal_argument("invalid identifier length"))?;

    let time = TIME_POSITIONS
        .iter()
        .enumerate()
        .fold(0i64, |acc, (shift, pos)| acc | (i64::from(raw[*pos]) << (8 * shift)));

    let age = now_millis() - time;
    if age < -MAX_CLOCK_SKEW_MS {
        return Err(TransactionError::illegal_argument(
            "invalid identifier time signature",
        ));
    }
    if let Some(ttl) = ttl {
        if age > ttl.as_millis() as i64 {
            return Err(TransactionError::illegal_argument(
                "expired identifier time signature",
            ));
        }
    }

    let expected = CHECKSUM_POSITIONS
        .iter()
        .enumerate()
        .fold(0i32, |acc, (shift, pos)| acc | (i32::from(raw[*pos]) << (8 * shift)));
    if checksum(raw, time) & 0x00ff_ffff != expected {
        return Err(TransactionError::illegal_argument(
            "invalid identifier checksum",
        ));
    }
    Ok(())
}

/// Encodes bytes as lowercase unpadded base32.
pub fn encode(bytes: &[u8]) -> String {
    let mut text = BASE32_NOPAD.encode(bytes);
    text.make_ascii_lowercase();
    text
}

/// Decodes lowercase unpadded base32.
///
/// Rejects characters outside the alphabet and trailing bits that are not zero.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    if let Some(c) = text.chars().find(|c| c.is_ascii_uppercase()) {
        return Err(TransactionError::illegal_argument(format!(
            "invalid base32 character {c:?}"
        )));
    }
    BASE32_NOPAD
        .decode(text.to_ascii_uppercase().as_bytes())
        .map_err(|e| TransactionError::illegal_argument(format!("invalid base32 text: {e}")))
}
