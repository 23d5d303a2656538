// src/io/slcan/codec.rs
//
// slcan (Serial Line CAN) ASCII frame codec.
//
// Protocol reference: http://www.can232.com/docs/can232_v3.pdf
//
// Frame formats:
//   Standard: t<ID:3hex><DLC:1><DATA:2hex*DLC>\r
//   Extended: T<ID:8hex><DLC:1><DATA:2hex*DLC>\r
//   RTR:      r<ID:3hex><DLC:1>\r / R<ID:8hex><DLC:1>\r
//
// Decoding is permissive: a malformed field decodes to zero instead of
// failing, so line noise on the serial link never stops the receive loop.

use super::frame::CanFrame;

/// Line terminator used by the device in both directions.
pub const TERMINATOR: char = '\r';

/// Frame type prefix for the given flags.
fn type_char(extended: bool, rtr: bool) -> char {
    match (extended, rtr) {
        (true, true) => 'R',
        (true, false) => 'T',
        (false, true) => 'r',
        (false, false) => 't',
    }
}

/// Encode a frame to its wire line, without terminator.
///
/// Examples:
///   id 0x123, no data          -> `t1230`
///   id 0x12345678, data [0x97] -> `T12345678197`
///   standard RTR id 0x3, dlc 7 -> `r0037`
pub fn encode_frame(frame: &CanFrame) -> String {
    let mut line = String::with_capacity(27);

    line.push(type_char(frame.is_extended(), frame.is_rtr()));
    if frame.is_extended() {
        line.push_str(&format!("{:08X}", frame.id()));
    } else {
        line.push_str(&format!("{:03X}", frame.id()));
    }

    line.push_str(&format!("{:X}", frame.dlc()));

    if !frame.is_rtr() {
        line.push_str(&hex::encode_upper(frame.data()));
    }

    line
}

/// Encode a frame as bytes ready for the transport (terminator appended).
pub fn encode_line(frame: &CanFrame) -> Vec<u8> {
    let mut line = encode_frame(frame);
    line.push(TERMINATOR);
    line.into_bytes()
}

/// Parse `len` characters at `start` as hex; anything missing or malformed is `None`.
fn hex_field(line: &str, start: usize, len: usize) -> Option<u32> {
    let field = line.get(start..start + len)?;
    if !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(field, 16).ok()
}

/// Decode a wire line (terminator optional) into a frame.
///
/// Never fails. An unknown or missing type character decodes as a standard
/// data frame; an unparsable id or length decodes as 0; an unparsable data
/// byte decodes as 0 without shifting the bytes after it.
pub fn decode_frame(line: &str) -> CanFrame {
    let line = line.strip_suffix(TERMINATOR).unwrap_or(line);

    let (extended, rtr) = match line.chars().next() {
        Some('T') => (true, false),
        Some('r') => (false, true),
        Some('R') => (true, true),
        _ => (false, false),
    };

    let mut index = 1;
    let id_len = if extended { 8 } else { 3 };
    let id = hex_field(line, index, id_len).unwrap_or(0);
    index += id_len;

    // The length is a single decimal digit
    let dlc = line
        .get(index..index + 1)
        .and_then(|c| c.parse::<u8>().ok())
        .unwrap_or(0);
    index += 1;

    let mut data = Vec::with_capacity(dlc as usize);
    if !rtr {
        for _ in 0..dlc {
            let byte = hex_field(line, index, 2).unwrap_or(0) as u8;
            data.push(byte);
            index += 2;
        }
    }

    CanFrame::with_flags(id, extended, rtr, &data, dlc)
}

/// Strict counterpart of [`decode_frame`] for user-typed lines.
///
/// Returns `None` unless the line is exactly what [`encode_frame`] would
/// produce for the decoded frame (hex digits may be lowercase).
pub fn parse_frame(line: &str) -> Option<CanFrame> {
    let line = line.strip_suffix(TERMINATOR).unwrap_or(line);
    let mut chars = line.chars();
    let type_char = chars.next()?;
    let normalized = format!("{}{}", type_char, chars.as_str().to_ascii_uppercase());

    let frame = decode_frame(line);
    (encode_frame(&frame) == normalized).then_some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_standard_zero_dlc() {
        let frame = decode_frame("t1230\r");
        assert_eq!(frame.id(), 0x123);
        assert_eq!(frame.dlc(), 0);
        assert!(frame.data().is_empty());
        assert!(!frame.is_extended());
        assert!(!frame.is_rtr());
    }

    #[test]
    fn test_decode_standard_with_data() {
        let frame = decode_frame("t00121122\r");
        assert_eq!(frame.id(), 0x001);
        assert_eq!(frame.dlc(), 2);
        assert_eq!(frame.data(), &[0x11, 0x22]);
    }

    #[test]
    fn test_decode_extended() {
        let frame = decode_frame("T12345678197\r");
        assert!(frame.is_extended());
        assert_eq!(frame.id(), 0x12345678);
        assert_eq!(frame.dlc(), 1);
        assert_eq!(frame.data(), &[0x97]);
    }

    #[test]
    fn test_decode_rtr_has_no_data() {
        let frame = decode_frame("r0037\r");
        assert!(frame.is_rtr());
        assert!(!frame.is_extended());
        assert_eq!(frame.id(), 0x003);
        assert_eq!(frame.dlc(), 7);
        assert!(frame.data().is_empty());
    }

    #[test]
    fn test_decode_extended_rtr() {
        let frame = decode_frame("R1ABCDEF02");
        assert!(frame.is_rtr());
        assert!(frame.is_extended());
        assert_eq!(frame.id(), 0x1ABCDEF0);
        assert_eq!(frame.dlc(), 2);
    }

    #[test]
    fn test_decode_empty_and_unknown_prefix() {
        let empty = CanFrame::with_flags(0, false, false, &[], 0);
        assert_eq!(decode_frame(""), empty);
        assert_eq!(decode_frame("X"), empty);
    }

    #[test]
    fn test_decode_bad_id_is_zero() {
        let frame = decode_frame("tXYZ2AABB");
        assert_eq!(frame.id(), 0);
        assert_eq!(frame.data(), &[0xAA, 0xBB]);
    }

    #[test]
    fn test_decode_bad_length_is_zero() {
        let frame = decode_frame("t123Q");
        assert_eq!(frame.id(), 0x123);
        assert_eq!(frame.dlc(), 0);
    }

    #[test]
    fn test_decode_hex_length_is_not_decimal() {
        // Length is a decimal digit; 'A' does not parse
        assert_eq!(decode_frame("t123A").dlc(), 0);
    }

    #[test]
    fn test_decode_garbled_byte_does_not_shift() {
        let frame = decode_frame("t1233AAZZCC");
        assert_eq!(frame.data(), &[0xAA, 0x00, 0xCC]);
    }

    #[test]
    fn test_decode_truncated_data_zero_fills() {
        let frame = decode_frame("t1234AA");
        assert_eq!(frame.dlc(), 4);
        assert_eq!(frame.data(), &[0xAA, 0, 0, 0]);
    }

    #[test]
    fn test_decode_clamps_dlc_above_eight() {
        let frame = decode_frame("t1239");
        assert_eq!(frame.dlc(), 8);
        assert_eq!(frame.data().len(), 8);
    }

    #[test]
    fn test_encode_vectors() {
        assert_eq!(encode_frame(&CanFrame::new(0x123, &[])), "t1230");
        assert_eq!(encode_frame(&CanFrame::new(0x001, &[0x11, 0x22])), "t00121122");
        assert_eq!(
            encode_frame(&CanFrame::with_flags(0x12345678, true, false, &[0x97], 1)),
            "T12345678197"
        );
        assert_eq!(encode_frame(&CanFrame::remote(0x003, false, 7)), "r0037");
        assert_eq!(encode_frame(&CanFrame::remote(0x10, true, 0)), "R000000100");
    }

    #[test]
    fn test_encode_small_extended_id_is_padded() {
        let frame = CanFrame::with_flags(0x5, true, false, &[0xAB], 1);
        assert_eq!(encode_frame(&frame), "T000000051AB");
    }

    #[test]
    fn test_encode_oversized_standard_id_saturates() {
        let frame = CanFrame::with_flags(0x800, false, false, &[0xAA], 1);
        assert_eq!(encode_frame(&frame), "t7FF1AA");
        assert_eq!(decode_frame("t7FF1AA").id(), 0x7FF);
        assert_eq!(decode_frame("t8000").id(), 0x7FF);
    }

    #[test]
    fn test_parse_frame_accepts_canonical_lines() {
        assert_eq!(parse_frame("t1232AABB"), Some(CanFrame::new(0x123, &[0xAA, 0xBB])));
        assert_eq!(parse_frame("t1232aabb\r"), Some(CanFrame::new(0x123, &[0xAA, 0xBB])));
        assert_eq!(parse_frame("r0037"), Some(CanFrame::remote(0x3, false, 7)));
        assert_eq!(
            parse_frame("T12345678197"),
            Some(CanFrame::with_flags(0x12345678, true, false, &[0x97], 1))
        );
    }

    #[test]
    fn test_parse_frame_rejects_typos() {
        assert_eq!(parse_frame("t12G2AABB"), None);
        assert_eq!(parse_frame("t1232AA"), None);
        assert_eq!(parse_frame("t1232AABBCC"), None);
        assert_eq!(parse_frame("t8000"), None);
        assert_eq!(parse_frame("t1239"), None);
        assert_eq!(parse_frame("x1230"), None);
        assert_eq!(parse_frame(""), None);
    }

    #[test]
    fn test_decode_rejects_signed_hex() {
        assert_eq!(decode_frame("t+121FF").id(), 0);
    }

    #[test]
    fn test_encode_line_appends_terminator() {
        assert_eq!(encode_line(&CanFrame::new(0x7FF, &[0xDE, 0xAD])), b"t7FF2DEAD\r");
    }

    #[test]
    fn test_roundtrip_edge_frames() {
        let frames = [
            CanFrame::new(0x0, &[]),
            CanFrame::new(0x7FF, &[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 0x02, 0xFF]),
            CanFrame::with_flags(0x1FFFFFFF, true, false, &[0x55], 1),
            CanFrame::with_flags(0x7FF, true, false, &[], 0),
            CanFrame::remote(0x123, false, 8),
            CanFrame::remote(0x1FFFFFFF, true, 3),
        ];

        for frame in frames {
            let mut line = encode_frame(&frame);
            line.push(TERMINATOR);
            assert_eq!(decode_frame(&line), frame, "line {:?}", line);
        }
    }

    #[test]
    fn test_oversized_id_is_clamped_through_codec() {
        let frame = CanFrame::with_flags(0x3FFF_FFFF, true, false, &[], 0);
        let decoded = decode_frame(&encode_frame(&frame));
        assert_eq!(decoded.id(), 0x1FFF_FFFF);
    }
}
