use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};

use crate::types::*;

/// Total encoded size of a frame of the given kind.
pub fn frame_len(kind: SignalKind) -> usize {
    HEADER_LEN + kind.payload_len()
}

/// Build a signal frame.
///
/// Format: "SG" marker + u8(tag) + payload, where the payload is an
/// f64 BE for duration frames and an i32 BE for command frames.
pub fn encode(value: SignalValue) -> Vec<u8> {
    let mut buf = Vec::with_capacity(frame_len(value.kind()));
    buf.extend_from_slice(SIGNAL_MARKER);
    buf.push(value.kind().tag());
    match value {
        SignalValue::Duration(seconds) => buf.write_f64::<BigEndian>(seconds).unwrap(),
        SignalValue::Command(cmd) => buf.write_i32::<BigEndian>(cmd.as_i32()).unwrap(),
    }
    buf
}

/// Validate a frame header and return the payload kind it announces.
pub fn parse_header(header: &[u8]) -> io::Result<SignalKind> {
    if header.len() < HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "signal header truncated",
        ));
    }
    if &header[..2] != SIGNAL_MARKER {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "expected marker {:?}, got {:?}",
                String::from_utf8_lossy(SIGNAL_MARKER),
                String::from_utf8_lossy(&header[..2])
            ),
        ));
    }
    SignalKind::from_tag(header[2]).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown signal tag 0x{:02x}", header[2]),
        )
    })
}

/// Decode the payload that follows a header of the given kind.
pub fn parse_payload(kind: SignalKind, payload: &[u8]) -> io::Result<SignalValue> {
    let mut cursor = Cursor::new(payload);
    let value = match kind {
        SignalKind::Duration => {
            let seconds = cursor.read_f64::<BigEndian>()?;
            if !seconds.is_finite() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("duration is not finite: {seconds}"),
                ));
            }
            SignalValue::Duration(seconds)
        }
        SignalKind::Command => {
            let raw = cursor.read_i32::<BigEndian>()?;
            let cmd = Command::from_i32(raw).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("command must be +1 or -1, got {raw}"),
                )
            })?;
            SignalValue::Command(cmd)
        }
    };
    Ok(value)
}

/// Check that `value` has the shape a role expects.
pub fn expect_kind(value: SignalValue, kind: SignalKind) -> io::Result<SignalValue> {
    if value.kind() == kind {
        Ok(value)
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected a {kind:?} signal, got {value}"),
        ))
    }
}

/// Parse exactly one frame from `data`. Trailing bytes are an error.
pub fn parse(data: &[u8]) -> io::Result<SignalValue> {
    let kind = parse_header(data)?;
    let mut cursor = Cursor::new(&data[HEADER_LEN..]);
    let mut payload = vec![0u8; kind.payload_len()];
    cursor.read_exact(&mut payload)?;
    if (cursor.position() as usize) < cursor.get_ref().len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "{} trailing bytes after signal frame",
                data.len() - frame_len(kind)
            ),
        ));
    }
    parse_payload(kind, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_frame_layout() {
        let msg = encode(SignalValue::Duration(5.0));
        assert_eq!(msg.len(), 11);
        assert_eq!(&msg[..2], b"SG");
        assert_eq!(msg[2], TAG_DURATION);
        let mut cursor = Cursor::new(&msg[3..]);
        assert_eq!(cursor.read_f64::<BigEndian>().unwrap(), 5.0);
    }

    #[test]
    fn command_frame_layout() {
        let msg = encode(SignalValue::Command(Command::Stop));
        assert_eq!(msg, vec![b'S', b'G', TAG_COMMAND, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn parse_keeps_stop_durations() {
        let value = parse(&encode(SignalValue::STOP_DURATION)).unwrap();
        assert_eq!(value, SignalValue::Duration(-1.0));
        let value = parse(&encode(SignalValue::Duration(0.0))).unwrap();
        assert_eq!(value, SignalValue::Duration(0.0));
    }

    #[test]
    fn parse_rejects_bad_marker() {
        let mut msg = encode(SignalValue::Duration(1.0));
        msg[0] = b'X';
        let err = parse(&msg).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn parse_rejects_unknown_tag() {
        let mut msg = encode(SignalValue::Duration(1.0));
        msg[2] = 0x7f;
        let err = parse(&msg).unwrap_err();
        assert!(err.to_string().contains("0x7f"));
    }

    #[test]
    fn parse_rejects_out_of_range_command() {
        let mut data = Vec::new();
        data.extend_from_slice(SIGNAL_MARKER);
        data.push(TAG_COMMAND);
        data.write_i32::<BigEndian>(2).unwrap();
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("+1 or -1"));
    }

    #[test]
    fn parse_rejects_non_finite_duration() {
        let err = parse(&encode(SignalValue::Duration(f64::NAN))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let err = parse(&encode(SignalValue::Duration(f64::INFINITY))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn expect_kind_checks_shape() {
        let start = SignalValue::Command(Command::Start);
        assert_eq!(expect_kind(start, SignalKind::Command).unwrap(), start);
        let err = expect_kind(start, SignalKind::Duration).unwrap_err();
        assert!(err.to_string().contains("Duration"));
    }

    #[test]
    fn parse_rejects_truncated_and_trailing() {
        let msg = encode(SignalValue::Duration(2.5));
        let err = parse(&msg[..msg.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err = parse(&msg[..2]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let mut long = msg.clone();
        long.push(0);
        let err = parse(&long).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }
}
