//! Frames carried in broker message bodies
//!
//! The frame kind is decided once, when the body is decoded; callers match
//! on [`Frame`] instead of probing the payload type. Correlation ids and
//! reply destinations travel in broker message headers, not in the frame.

use crate::constants::{FRAME_MAGIC, FRAME_VERSION, HEADER_SIZE, MAX_BODY_SIZE};
use crate::error::{CodecError, Result};
use cells_types::{Envelope, TopologyAnnouncement};
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// Actor envelope crossing between domains
    Envelope(Envelope),
    /// Who hosts `actor`?
    DiscoveryRequest { actor: String },
    /// `actor` lives in `domain`; an empty domain means nobody claimed it
    DiscoveryReply { actor: String, domain: String },
    /// Well-known actors of one domain
    Topology(TopologyAnnouncement),
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Envelope(_) => "envelope",
            Frame::DiscoveryRequest { .. } => "discovery-request",
            Frame::DiscoveryReply { .. } => "discovery-reply",
            Frame::Topology(_) => "topology",
        }
    }

    /// Serialize into header + body
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self).map_err(|e| CodecError::encode(e.to_string()))?;
        if body.len() > MAX_BODY_SIZE {
            return Err(CodecError::TooLarge {
                size: body.len(),
                max: MAX_BODY_SIZE,
            });
        }

        let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
        out.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
        out.push(FRAME_VERSION);
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&crc32fast::hash(&body).to_be_bytes());
        out.extend_from_slice(&body);
        trace!(kind = self.kind(), size = out.len(), "encoded frame");
        Ok(out)
    }

    /// Validate header and checksum, then decode the body
    pub fn decode(bytes: &[u8]) -> Result<Frame> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::truncated(HEADER_SIZE, bytes.len(), "frame header"));
        }

        let magic = read_u32(&bytes[0..4]);
        if magic != FRAME_MAGIC {
            return Err(CodecError::bad_magic(FRAME_MAGIC, magic));
        }

        let version = bytes[4];
        if version != FRAME_VERSION {
            return Err(CodecError::UnsupportedVersion {
                version,
                supported: FRAME_VERSION,
            });
        }

        let body_len = read_u32(&bytes[5..9]) as usize;
        if body_len > MAX_BODY_SIZE {
            return Err(CodecError::TooLarge {
                size: body_len,
                max: MAX_BODY_SIZE,
            });
        }

        let end = HEADER_SIZE + body_len;
        if bytes.len() < end {
            return Err(CodecError::truncated(end, bytes.len(), "frame body"));
        }

        let body = &bytes[HEADER_SIZE..end];
        let expected = read_u32(&bytes[9..13]);
        let calculated = crc32fast::hash(body);
        if expected != calculated {
            return Err(CodecError::checksum_mismatch(expected, calculated, body_len));
        }

        bincode::deserialize(body).map_err(|e| CodecError::decode(e.to_string()))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    u32::from_be_bytes(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cells_types::ActorPath;

    fn sample() -> Frame {
        Frame::Envelope(Envelope::data(
            "client@A".parse::<ActorPath>().unwrap(),
            "pool@B".parse::<ActorPath>().unwrap(),
            b"stage file".to_vec(),
        ))
    }

    #[test]
    fn encodes_header_fields() {
        let bytes = sample().encode().unwrap();
        assert_eq!(read_u32(&bytes[0..4]), FRAME_MAGIC);
        assert_eq!(bytes[4], FRAME_VERSION);
        assert_eq!(read_u32(&bytes[5..9]) as usize, bytes.len() - HEADER_SIZE);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let frame = Frame::DiscoveryReply {
            actor: "PoolManager".into(),
            domain: "dCacheDomain".into(),
        };
        assert_eq!(Frame::decode(&frame.encode().unwrap()).unwrap(), frame);
    }

    #[test]
    fn short_buffer_is_truncated() {
        let err = Frame::decode(&[0xCE, 0x11]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { need: HEADER_SIZE, got: 2, .. }));

        let bytes = sample().encode().unwrap();
        let err = Frame::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    #[test]
    fn text_body_reports_foreign_producer() {
        let err = Frame::decode(b"PoolManager-and-more").unwrap_err();
        match err {
            CodecError::BadMagic { diagnosis, .. } => {
                assert!(diagnosis.contains("foreign producer"))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn flipped_body_bit_fails_checksum() {
        let mut bytes = sample().encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut bytes = sample().encode().unwrap();
        bytes[4] = FRAME_VERSION + 1;
        assert_eq!(
            Frame::decode(&bytes),
            Err(CodecError::UnsupportedVersion {
                version: FRAME_VERSION + 1,
                supported: FRAME_VERSION
            })
        );
    }
}
