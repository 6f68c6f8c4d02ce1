//! Binary frame codec.
//!
//! Encoding is infallible once the payload is serialized. Decoding reads
//! one frame at a time from any `Read` and reports the byte offset of the
//! frame it failed on.

use std::io::{self, Read};

use crate::error::{WalError, WalResult};
use crate::record::{Op, WalRecord};

pub const MAGIC: u16 = 0xCAFE;
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 8;
pub const TRAILER_LEN: usize = 4;

/// Upper bound on a single payload. A larger length field means the
/// header is damaged.
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

/// Serialize `record` into a complete frame.
pub fn encode(record: &WalRecord) -> WalResult<Vec<u8>> {
    let payload = record.encode_payload().map_err(WalError::Encode)?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_PAYLOAD_LEN)
        .ok_or(WalError::PayloadTooLarge { len: payload.len() })?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    frame.extend_from_slice(&MAGIC.to_be_bytes());
    frame.push(VERSION);
    frame.push(record.op().code());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
    Ok(frame)
}

/// Sequential frame decoder.
pub struct FrameReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Offset of the next frame to be read.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next frame. `Ok(None)` at a clean end of file.
    pub fn next_frame(&mut self) -> WalResult<Option<(u64, WalRecord)>> {
        let offset = self.offset;

        let mut header = [0u8; HEADER_LEN];
        match read_full(&mut self.inner, &mut header)? {
            0 => return Ok(None),
            n if n < HEADER_LEN => return Err(WalError::Truncated { offset }),
            _ => {}
        }

        let magic = u16::from_be_bytes([header[0], header[1]]);
        if magic != MAGIC {
            return Err(WalError::Corrupt {
                offset,
                reason: format!("invalid magic {magic:#06x}"),
            });
        }
        let version = header[2];
        if version != VERSION {
            return Err(WalError::UnsupportedVersion { offset, version });
        }
        let op = Op::from_code(header[3]).ok_or(WalError::UnknownOp {
            offset,
            op: header[3],
        })?;
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if len > MAX_PAYLOAD_LEN {
            return Err(WalError::Corrupt {
                offset,
                reason: format!("payload length {len} exceeds limit"),
            });
        }

        let mut body = vec![0u8; len as usize + TRAILER_LEN];
        if read_full(&mut self.inner, &mut body)? < body.len() {
            return Err(WalError::Truncated { offset });
        }
        let (payload, trailer) = body.split_at(len as usize);

        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = crc32fast::hash(payload);
        if expected != actual {
            return Err(WalError::Corrupt {
                offset,
                reason: format!("crc mismatch (stored {expected:#010x}, computed {actual:#010x})"),
            });
        }

        let record = WalRecord::decode_payload(op, payload).map_err(|e| WalError::Corrupt {
            offset,
            reason: format!("payload does not decode as {op:?}: {e}"),
        })?;

        self.offset += (HEADER_LEN + body.len()) as u64;
        Ok(Some((offset, record)))
    }
}

/// Fill `buf` as far as the reader allows. Returns bytes read, which is
/// less than `buf.len()` only at end of file.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshreg_state::{AgentRegistration, Capacity, GatewayRegistration};

    fn gateway_record() -> WalRecord {
        WalRecord::put_gateway(
            "us-east",
            "10.0.0.1:9000",
            &GatewayRegistration {
                ip: "10.0.0.1".to_string(),
                port: 9000,
                capacity: Capacity {
                    cpu: 4,
                    memory: 2048,
                    storage: 10240,
                    bandwidth: 100,
                },
                credential_hash: "cred".to_string(),
                wss_port: None,
            },
        )
    }

    fn agent_record() -> WalRecord {
        WalRecord::put_agent(
            "us-east",
            &AgentRegistration {
                domain: "a1.example.com".to_string(),
                gateway_key: "10.0.0.1:9000".to_string(),
                credential_hash: "cred".to_string(),
            },
        )
    }

    #[test]
    fn header_and_trailer_layout() {
        let frame = encode(&agent_record()).unwrap();
        let payload_len = u32::from_be_bytes(frame[4..8].try_into().unwrap()) as usize;

        assert_eq!(&frame[0..2], &[0xCA, 0xFE]);
        assert_eq!(frame[2], VERSION);
        assert_eq!(frame[3], Op::PutAgent.code());
        assert_eq!(frame.len(), HEADER_LEN + payload_len + TRAILER_LEN);

        let payload = &frame[HEADER_LEN..HEADER_LEN + payload_len];
        let crc = u32::from_be_bytes(frame[HEADER_LEN + payload_len..].try_into().unwrap());
        assert_eq!(crc, crc32fast::hash(payload));
    }

    #[test]
    fn reader_tracks_offsets() {
        let first = encode(&gateway_record()).unwrap();
        let second = encode(&agent_record()).unwrap();
        let mut bytes = first.clone();
        bytes.extend_from_slice(&second);

        let mut reader = FrameReader::new(bytes.as_slice());
        let (off1, rec1) = reader.next_frame().unwrap().unwrap();
        let (off2, rec2) = reader.next_frame().unwrap().unwrap();
        assert!(reader.next_frame().unwrap().is_none());

        assert_eq!((off1, rec1), (0, gateway_record()));
        assert_eq!((off2, rec2), (first.len() as u64, agent_record()));
        assert_eq!(reader.offset(), bytes.len() as u64);
    }

    #[test]
    fn empty_input_is_clean_eof() {
        let mut reader = FrameReader::new(io::empty());
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut frame = encode(&agent_record()).unwrap();
        frame[0] = 0xBE;
        let err = FrameReader::new(frame.as_slice()).next_frame().unwrap_err();
        assert!(matches!(err, WalError::Corrupt { offset: 0, .. }), "{err}");
    }

    #[test]
    fn unknown_version_and_op() {
        let mut frame = encode(&agent_record()).unwrap();
        frame[2] = 7;
        let err = FrameReader::new(frame.as_slice()).next_frame().unwrap_err();
        assert!(matches!(err, WalError::UnsupportedVersion { version: 7, .. }));
        assert!(err.is_corruption());
        assert_eq!(err.offset(), Some(0));

        let mut frame = encode(&agent_record()).unwrap();
        frame[3] = 9;
        let err = FrameReader::new(frame.as_slice()).next_frame().unwrap_err();
        assert!(matches!(err, WalError::UnknownOp { op: 9, .. }));
    }

    #[test]
    fn swapped_op_fails_to_decode() {
        let mut frame = encode(&agent_record()).unwrap();
        frame[3] = Op::PutGateway.code();
        let err = FrameReader::new(frame.as_slice()).next_frame().unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn partial_frames_are_truncation() {
        let frame = encode(&agent_record()).unwrap();
        for cut in [3, HEADER_LEN, frame.len() - 1] {
            let err = FrameReader::new(&frame[..cut]).next_frame().unwrap_err();
            assert!(matches!(err, WalError::Truncated { offset: 0 }), "cut {cut}: {err}");
        }
    }

    #[test]
    fn oversized_length_is_rejected_before_allocating() {
        let mut frame = encode(&agent_record()).unwrap();
        frame[4..8].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = FrameReader::new(frame.as_slice()).next_frame().unwrap_err();
        assert!(matches!(err, WalError::Corrupt { .. }));
    }
}
