//! Framing and payload codec for the SkyWatcher motor-controller protocol.
//!
//! Requests are colon-prefixed ASCII, carriage-return terminated:
//! `:<cmd><channel><payload>\r`. Responses start with `=` on success or
//! `!` followed by a single error digit. Multi-byte values travel as hex
//! with the least significant byte first, so 0x123456 is the string
//! `"563412"`.

use num_enum::TryFromPrimitive;

use crate::util::{Axis, DriverError};

pub const LEAD: u8 = b':';
pub const TERM: u8 = b'\r';
pub const OK: u8 = b'=';
pub const ERR: u8 = b'!';

/// Position counters are offset so the power-on position reads mid-range.
pub const COUNTER_OFFSET: i64 = 0x80_0000;
const COUNTER_MASK: i64 = 0xFF_FFFF;

pub fn channel(axis: Axis) -> char {
    match axis {
        Axis::Primary => '1',
        Axis::Secondary => '2',
    }
}

/// Error digits the controller returns after `!`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum McError {
    UnknownCommand = 0,
    CommandLength = 1,
    MotorNotStopped = 2,
    InvalidCharacter = 3,
    NotInitialized = 4,
    DriverSleeping = 5,
    PecTrainingRunning = 7,
    NoValidPecData = 8,
}

impl From<McError> for DriverError {
    fn from(e: McError) -> Self {
        match e {
            McError::MotorNotStopped => DriverError::AxisBusy,
            McError::NotInitialized => DriverError::NotConnected,
            McError::UnknownCommand => DriverError::Unimplemented,
            other => DriverError::InvalidData(format!("mount error: {:?}", other)),
        }
    }
}

pub fn frame(cmd: char, axis: Axis, payload: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.push(LEAD);
    out.push(cmd as u8);
    out.push(channel(axis) as u8);
    out.extend_from_slice(payload.as_bytes());
    out.push(TERM);
    out
}

/// Strips framing from a raw response line, returning the payload on
/// success or the controller's error.
pub fn parse_response(line: &[u8]) -> Result<String, DriverError> {
    match line.first() {
        Some(&OK) => {
            let payload = &line[1..];
            let text = std::str::from_utf8(payload)
                .map_err(|_| DriverError::InvalidData("non-ascii response".to_string()))?;
            Ok(text.trim_end_matches('\r').to_string())
        }
        Some(&ERR) => {
            let digit = line
                .get(1)
                .and_then(|b| (*b as char).to_digit(16))
                .ok_or_else(|| DriverError::InvalidData("bad error frame".to_string()))?;
            let code = McError::try_from(digit as u8)
                .map_err(|_| DriverError::InvalidData(format!("unknown error code {}", digit)))?;
            Err(code.into())
        }
        _ => Err(DriverError::InvalidData(format!(
            "unframed response: {:?}",
            String::from_utf8_lossy(line)
        ))),
    }
}

/// 24-bit value as six hex chars, least significant byte first.
pub fn encode_u24(value: u32) -> String {
    let v = value & 0xFF_FFFF;
    format!(
        "{:02X}{:02X}{:02X}",
        v & 0xFF,
        (v >> 8) & 0xFF,
        (v >> 16) & 0xFF
    )
}

pub fn decode_u24(payload: &str) -> Result<u32, DriverError> {
    if payload.len() < 6 {
        return Err(DriverError::InvalidData(format!(
            "short payload: {:?}",
            payload
        )));
    }
    let byte = |range: std::ops::Range<usize>| {
        u32::from_str_radix(&payload[range], 16)
            .map_err(|_| DriverError::InvalidData(format!("bad hex payload: {:?}", payload)))
    };
    Ok(byte(0..2)? | byte(2..4)? << 8 | byte(4..6)? << 16)
}

/// Eight-bit value, two hex chars.
pub fn encode_u8(value: u8) -> String {
    format!("{:02X}", value)
}

pub fn decode_u8(payload: &str) -> Result<u8, DriverError> {
    if payload.len() < 2 {
        return Err(DriverError::InvalidData(format!(
            "short payload: {:?}",
            payload
        )));
    }
    u8::from_str_radix(&payload[0..2], 16)
        .map_err(|_| DriverError::InvalidData(format!("bad hex payload: {:?}", payload)))
}

pub fn encode_counter(steps: i64) -> String {
    let counter = (COUNTER_OFFSET + steps) & COUNTER_MASK;
    encode_u24(counter as u32)
}

pub fn decode_counter(payload: &str) -> Result<i64, DriverError> {
    let raw = decode_u24(payload)? as i64;
    // Values wrap within the 24-bit window; re-centre around the offset.
    let mut steps = raw - COUNTER_OFFSET;
    if steps > COUNTER_MASK / 2 {
        steps -= COUNTER_MASK + 1;
    } else if steps < -(COUNTER_MASK / 2) {
        steps += COUNTER_MASK + 1;
    }
    Ok(steps)
}

/// Decoded `:f` extended-status word, three hex nibbles.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct McStatus {
    pub tracking_mode: bool,
    pub ccw: bool,
    pub fast: bool,
    pub running: bool,
    pub blocked: bool,
    pub init_done: bool,
    pub level_switch: bool,
}

pub fn decode_status(payload: &str) -> Result<McStatus, DriverError> {
    let mut nibbles = payload.chars().filter_map(|c| c.to_digit(16));
    let (a, b, c) = match (nibbles.next(), nibbles.next(), nibbles.next()) {
        (Some(a), Some(b), Some(c)) => (a, b, c),
        _ => {
            return Err(DriverError::InvalidData(format!(
                "bad status payload: {:?}",
                payload
            )))
        }
    };
    Ok(McStatus {
        tracking_mode: a & 0x1 != 0,
        ccw: a & 0x2 != 0,
        fast: a & 0x4 != 0,
        running: b & 0x1 != 0,
        blocked: b & 0x2 != 0,
        init_done: c & 0x1 != 0,
        level_switch: c & 0x2 != 0,
    })
}

/// Motion-mode byte pair for `:G`: mode nibble then direction nibble.
pub fn encode_motion_mode(goto: bool, fast: bool, ccw: bool) -> String {
    let mode = match (goto, fast) {
        (true, true) => 0u8,
        (true, false) => 2,
        (false, false) => 1,
        (false, true) => 3,
    };
    let dir = u8::from(ccw);
    format!("{:X}{:X}", mode, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_colon_prefixed_and_cr_terminated() {
        assert_eq!(frame('j', Axis::Primary, ""), b":j1\r");
        assert_eq!(frame('S', Axis::Secondary, "563412"), b":S2563412\r");
    }

    #[test]
    fn u24_codec_swaps_bytes() {
        assert_eq!(encode_u24(0x12_3456), "563412");
        assert_eq!(decode_u24("563412").unwrap(), 0x12_3456);
        assert_eq!(decode_u24(&encode_u24(0)).unwrap(), 0);
        assert_eq!(decode_u24(&encode_u24(0xFF_FFFF)).unwrap(), 0xFF_FFFF);
    }

    #[test]
    fn counter_is_offset_and_signed() {
        assert_eq!(encode_counter(0), "000080");
        assert_eq!(decode_counter("000080").unwrap(), 0);
        let steps = -42_000;
        assert_eq!(decode_counter(&encode_counter(steps)).unwrap(), steps);
        let steps = 3_000_000;
        assert_eq!(decode_counter(&encode_counter(steps)).unwrap(), steps);
    }

    #[test]
    fn parse_success_and_error_frames() {
        assert_eq!(parse_response(b"=563412\r").unwrap(), "563412");
        assert_eq!(
            parse_response(b"!2\r").unwrap_err(),
            DriverError::AxisBusy,
        );
        assert!(matches!(
            parse_response(b"?\r").unwrap_err(),
            DriverError::InvalidData(_)
        ));
    }

    #[test]
    fn status_bits() {
        let st = decode_status("111").unwrap();
        assert!(st.tracking_mode && st.running && st.init_done);
        assert!(!st.ccw && !st.fast && !st.blocked);

        let st = decode_status("701").unwrap();
        assert!(st.tracking_mode && st.ccw && st.fast);
        assert!(!st.running);
    }

    #[test]
    fn motion_mode_nibbles() {
        assert_eq!(encode_motion_mode(true, true, false), "00");
        assert_eq!(encode_motion_mode(false, false, true), "11");
        assert_eq!(encode_motion_mode(true, false, false), "20");
        assert_eq!(encode_motion_mode(false, true, true), "31");
    }
}
