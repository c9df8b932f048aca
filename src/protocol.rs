//! Binary codec for the simple message set CAM layout.
//!
//! # Wire Format
//!
//! Fixed size, big-endian, fields in [`CamField::ALL`] order:
//!
//! ```text
//! ┌────────────┬────────────┬────────────┬─────────────────────────┐
//! │ message_id │ station_id │ gen_delta  │ 19 optional fields      │
//! │ i8         │ i32        │ i32        │ i32 each                │
//! └────────────┴────────────┴────────────┴─────────────────────────┘
//!   offset 0     offset 1     offset 5     offset 9 .. 85
//! ```

use crate::time;
use crate::types::{Cam, CamBuilder, CamError, CamField, FIELD_COUNT};
use thiserror::Error;

/// Errors from decoding a datagram.
///
/// Both `MalformedBuffer` and `FieldOutOfRange` mean the bytes are not a
/// well formed CAM; use [`ParseError::is_malformed`] to match either.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Wrong buffer length.
    #[error("Malformed buffer: need {need} bytes, got {got}")]
    MalformedBuffer { need: usize, got: usize },
    /// A slot holds a value its field cannot take, such as a GDT above 65535.
    #[error("Malformed buffer: {field} has unrepresentable value {value}")]
    FieldOutOfRange { field: CamField, value: i32 },
    #[error("Invalid CAM: {0}")]
    Cam(#[from] CamError),
    #[error("Base64 decode failed: {0}")]
    Base64Error(#[from] base64::DecodeError),
}

impl ParseError {
    /// Whether the buffer itself is malformed, by length or by content.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedBuffer { .. } | Self::FieldOutOfRange { .. }
        )
    }
}

/// Size of an encoded CAM in bytes.
pub const WIRE_SIZE: usize = 1 + (FIELD_COUNT - 1) * 4;

/// Byte offset of a field inside an encoded CAM.
const fn offset_of(field: CamField) -> usize {
    match field.index() {
        0 => 0,
        i => 1 + (i - 1) * 4,
    }
}

/// Encode a CAM into its wire representation.
pub fn encode(cam: &Cam) -> [u8; WIRE_SIZE] {
    let mut buf = [0u8; WIRE_SIZE];

    // message_id is the only single byte field
    buf[0] = cam.message_id() as i8 as u8;

    for (field, value) in cam.fields().skip(1) {
        let off = offset_of(field);
        buf[off..off + 4].copy_from_slice(&value.to_be_bytes());
    }

    buf
}

/// Decode a CAM received just now.
pub fn decode(data: &[u8]) -> Result<Cam, ParseError> {
    decode_at(data, time::now_its())
}

/// Decode a CAM as if received at ITS timestamp `now`.
pub fn decode_at(data: &[u8], now: u64) -> Result<Cam, ParseError> {
    if data.len() != WIRE_SIZE {
        return Err(ParseError::MalformedBuffer {
            need: WIRE_SIZE,
            got: data.len(),
        });
    }

    let i32_at = |off: usize| -> i32 {
        i32::from_be_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
    };

    let gdt = i32_at(offset_of(CamField::GenDeltaTimeMillis));
    if !(0..=u16::MAX as i32).contains(&gdt) {
        return Err(ParseError::FieldOutOfRange {
            field: CamField::GenDeltaTimeMillis,
            value: gdt,
        });
    }

    let builder = CamField::ALL
        .iter()
        .fold(CamBuilder::new(), |b, &field| match field {
            CamField::MessageId => b.message_id(data[0] as i8),
            CamField::StationId => b.station_id(i32_at(offset_of(field)) as u32),
            _ => b.set(field, i32_at(offset_of(field))),
        });

    let cam = builder.build_at(now)?;
    tracing::trace!(station_id = %cam.station_id(), "decoded CAM");
    Ok(cam)
}

/// Decode a datagram or capture file holding either raw bytes or their
/// base64 text form.
pub fn parse_datagram(data: &[u8]) -> Result<Cam, ParseError> {
    if data.len() == WIRE_SIZE {
        return decode(data);
    }

    let trimmed: Vec<u8> = data
        .iter()
        .copied()
        .filter(|&b| !b.is_ascii_whitespace())
        .collect();

    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD.decode(&trimmed)?;
    decode(&decoded)
}

impl Cam {
    /// Wire representation of the message.
    pub fn to_bytes(&self) -> [u8; WIRE_SIZE] {
        encode(self)
    }

    /// Build a message from its wire representation.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        decode(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StationId;
    use proptest::prelude::*;

    const NOW: u64 = 65_536 * 10_000 + 40_000;

    fn full_cam() -> Cam {
        // every field gets a distinct value
        CamField::ALL
            .iter()
            .enumerate()
            .skip(1)
            .fold(Cam::builder().message_id(2), |b, (i, &f)| b.set(f, i as i32))
            .build_at(NOW)
            .unwrap()
    }

    #[test]
    fn test_wire_size() {
        assert_eq!(WIRE_SIZE, 85);
        assert_eq!(offset_of(CamField::StationId), 1);
        assert_eq!(offset_of(CamField::VehicleRole), 81);
    }

    #[test]
    fn test_layout_is_big_endian() {
        let cam = Cam::builder()
            .station_id(0x0102_0304)
            .gen_delta_time(0xBEEF)
            .set(CamField::Latitude, -1)
            .build_at(NOW)
            .unwrap();
        let b = encode(&cam);

        assert_eq!(b.len(), WIRE_SIZE);
        assert_eq!(b[0], 2);
        assert_eq!(&b[1..5], &[1, 2, 3, 4]);
        assert_eq!(&b[5..9], &[0, 0, 0xBE, 0xEF]);
        assert_eq!(&b[17..21], &[0xFF; 4]);
    }

    #[test]
    fn test_round_trip() {
        let cam = full_cam();
        let b = cam.to_bytes();
        let back = decode_at(&b, NOW).unwrap();
        assert_eq!(back, cam);
        assert_eq!(back.to_bytes(), b);
    }

    #[test]
    fn test_round_trip_with_sentinels() {
        let cam = Cam::builder()
            .station_id(u32::MAX)
            .gen_delta_time(65_535)
            .build_at(NOW)
            .unwrap();
        let back = decode(&encode(&cam)).unwrap();
        assert_eq!(back, cam);
        assert_eq!(back.station_id(), StationId(u32::MAX));
        assert_eq!(back.latitude(), None);
    }

    #[test]
    fn test_decode_rederives_timestamp() {
        let cam = full_cam();
        let back = decode_at(&cam.to_bytes(), NOW + 65_536).unwrap();
        assert_eq!(back, cam);
        assert_eq!(back.timestamp(), cam.timestamp() + 65_536);
    }

    #[test]
    fn test_malformed_length() {
        let b = full_cam().to_bytes();

        let err = decode(&b[..WIRE_SIZE - 1]).unwrap_err();
        assert!(matches!(err, ParseError::MalformedBuffer { need: 85, got: 84 }));

        let mut long = b.to_vec();
        long.push(0);
        let err = decode(&long).unwrap_err();
        assert!(matches!(err, ParseError::MalformedBuffer { got: 86, .. }));
        assert!(err.is_malformed());

        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_decode_bad_message_id() {
        let mut b = full_cam().to_bytes();
        b[0] = 3;
        let err = decode(&b).unwrap_err();
        assert!(matches!(err, ParseError::Cam(CamError::InvalidMessageId(3))));
    }

    #[test]
    fn test_decode_bad_gdt() {
        let mut b = full_cam().to_bytes();
        b[5..9].copy_from_slice(&70_000i32.to_be_bytes());
        let err = decode(&b).unwrap_err();
        assert!(matches!(
            err,
            ParseError::FieldOutOfRange {
                field: CamField::GenDeltaTimeMillis,
                value: 70_000
            }
        ));
        assert!(err.is_malformed());

        b[5..9].copy_from_slice(&(-1i32).to_be_bytes());
        assert!(decode(&b).unwrap_err().is_malformed());
    }

    #[test]
    fn test_invalid_cam_is_not_malformed() {
        let mut b = full_cam().to_bytes();
        b[0] = 0;
        assert!(!decode(&b).unwrap_err().is_malformed());
    }

    #[test]
    fn test_parse_datagram_base64() {
        use base64::Engine;

        let cam = full_cam();
        let text = base64::engine::general_purpose::STANDARD.encode(cam.to_bytes());
        let with_newline = format!("{}\n", text);

        assert_eq!(parse_datagram(with_newline.as_bytes()).unwrap(), cam);
        assert_eq!(parse_datagram(&cam.to_bytes()).unwrap(), cam);
        assert!(matches!(
            parse_datagram(b"not base64 at all!"),
            Err(ParseError::Base64Error(_))
        ));
    }

    fn optional_values() -> impl Strategy<Value = Vec<Option<i32>>> {
        prop::collection::vec(
            prop_oneof![
                Just(None),
                Just(Some(i32::MIN)),
                Just(Some(-1)),
                Just(Some(0)),
                Just(Some(i32::MAX)),
                any::<i32>().prop_map(Some),
            ],
            FIELD_COUNT - 3,
        )
    }

    proptest! {
        #[test]
        fn test_round_trip_any_cam(
            station in any::<u32>(),
            gdt in any::<u16>(),
            explicit_id in any::<bool>(),
            values in optional_values(),
        ) {
            let base = Cam::builder().station_id(station).gen_delta_time(gdt);
            let base = if explicit_id { base.message_id(2) } else { base };
            let cam = CamField::ALL[3..]
                .iter()
                .zip(values)
                .fold(base, |b, (&f, v)| b.set_opt(f, v))
                .build_at(NOW)
                .unwrap();

            let bytes = encode(&cam);
            let back = decode_at(&bytes, NOW).unwrap();

            prop_assert_eq!(back, cam);
            prop_assert_eq!(back.timestamp(), cam.timestamp());
            prop_assert_eq!(back.station_id(), StationId(station));
            prop_assert_eq!(encode(&back), bytes);
        }

        #[test]
        fn test_wrong_length_is_malformed(data in prop::collection::vec(any::<u8>(), 0..200)) {
            prop_assume!(data.len() != WIRE_SIZE);
            let err = decode_at(&data, NOW).unwrap_err();
            prop_assert!(err.is_malformed());
        }
    }
}
