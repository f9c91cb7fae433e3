use sitewatch::protocol::{self, crc16, decode, encode, MAX_PAYLOAD_LEN, MIN_FRAME_LEN, SOF};
use sitewatch::FrameError;

/// Small deterministic generator so the sweeps below are reproducible
struct Lcg(u64);

impl Lcg {
    fn next_u8(&mut self) -> u8 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 56) as u8
    }

    fn bytes(&mut self, n: usize) -> Vec<u8> {
        (0..n).map(|_| self.next_u8()).collect()
    }
}

#[test]
fn test_crc16_reference_vector() {
    // MODBUS check value for "123456789"
    assert_eq!(crc16(b"123456789"), 0x4B37);
    assert_eq!(crc16(&[]), 0xFFFF);
}

#[test]
fn test_encode_decode_preserves_fields() {
    let mut rng = Lcg(7);
    for len in [0usize, 1, 2, 8, 31, 64, 200, MAX_PAYLOAD_LEN] {
        let payload = rng.bytes(len);
        let (cmd, seq, ty) = (rng.next_u8(), rng.next_u8(), rng.next_u8());

        let frame = encode(cmd, seq, ty, &payload).unwrap();
        let parsed = decode(&frame).unwrap();

        assert_eq!(parsed.command, cmd);
        assert_eq!(parsed.sequence, seq);
        assert_eq!(parsed.frame_type, ty);
        assert_eq!(parsed.payload, payload);
    }
}

#[test]
fn test_frame_length_matches_len_field() {
    let mut rng = Lcg(11);
    for len in 0..=MAX_PAYLOAD_LEN {
        let frame = encode(0x10, 0, 0, &rng.bytes(len)).unwrap();
        assert_eq!(frame[0], SOF);
        assert_eq!(frame.len(), frame[1] as usize + 2);
        assert_eq!(frame.len(), len + MIN_FRAME_LEN);
        assert_eq!(protocol::frame_len_from_header(frame[1]), frame.len());
    }
}

#[test]
fn test_oversized_payload_is_refused() {
    let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
    assert_eq!(
        encode(0x10, 0, 0, &payload),
        Err(FrameError::PayloadTooLarge(MAX_PAYLOAD_LEN + 1))
    );
}

#[test]
fn test_every_single_bit_flip_is_rejected() {
    let frame = encode(0x11, 0x2A, 0x01, &[0x01, 0x00, 0x34, 0x12, 0, 0, 0xC8, 0x41]).unwrap();

    for byte in 0..frame.len() {
        for bit in 0..8 {
            let mut corrupted = frame.clone();
            corrupted[byte] ^= 1 << bit;
            assert!(
                decode(&corrupted).is_err(),
                "flip of bit {} in byte {} was accepted",
                bit,
                byte
            );
        }
    }
}

#[test]
fn test_truncation_and_extension_are_rejected() {
    let frame = encode(0x12, 3, 0, &[9, 9, 9]).unwrap();

    for cut in 0..frame.len() {
        assert!(decode(&frame[..cut]).is_err(), "prefix of {} bytes accepted", cut);
    }

    let mut longer = frame.clone();
    longer.push(0x00);
    assert!(matches!(
        decode(&longer),
        Err(FrameError::LengthMismatch { .. })
    ));
}

#[test]
fn test_error_kinds_are_specific() {
    assert_eq!(decode(&[SOF, 5, 0x10]), Err(FrameError::TooShort(3)));

    let mut frame = encode(0x10, 0, 0, &[]).unwrap();
    frame[0] = 0x7F;
    assert_eq!(decode(&frame), Err(FrameError::BadMarker(0x7F)));

    let mut frame = encode(0x10, 0, 0, &[]).unwrap();
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;
    assert!(matches!(
        decode(&frame),
        Err(FrameError::ChecksumMismatch { .. })
    ));
}
