//! Fingerprint templates and the template codec
//!
//! A `Template` is the immutable reference for one enrolled finger. Its raw
//! payload is opaque to this crate beyond the leading format tag: `XYT1`
//! (native multi-sample container) or `FP3` (libfprint serialized print).
//! `TemplateCodec` wraps a template in a versioned, checksummed envelope for
//! the persistence layer.

pub mod fp3;
pub mod minutiae;

use crate::error::DecodeError;
use crate::validation::validate_owner_id;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub use minutiae::{AlgorithmFamily, Minutia, MinutiaeSet, MAX_MINUTIAE};

/// Envelope magic
const ENVELOPE_MAGIC: &[u8; 4] = b"FPTE";

/// Current envelope version
pub const ENVELOPE_VERSION: u8 = 1;

const DIGEST_LEN: usize = 32;

/// Upper bound for raw payloads (a 200-point, 16-sample container is ~40 KiB)
pub const MAX_PAYLOAD_LEN: usize = 1 << 20;

/// Finger label, the second half of the persistence key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finger {
    Unknown,
    LeftThumb,
    LeftIndex,
    LeftMiddle,
    LeftRing,
    LeftPinky,
    RightThumb,
    RightIndex,
    RightMiddle,
    RightRing,
    RightPinky,
}

impl Finger {
    const ALL: [Finger; 11] = [
        Finger::Unknown,
        Finger::LeftThumb,
        Finger::LeftIndex,
        Finger::LeftMiddle,
        Finger::LeftRing,
        Finger::LeftPinky,
        Finger::RightThumb,
        Finger::RightIndex,
        Finger::RightMiddle,
        Finger::RightRing,
        Finger::RightPinky,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Finger::Unknown => "unknown",
            Finger::LeftThumb => "left_thumb",
            Finger::LeftIndex => "left_index",
            Finger::LeftMiddle => "left_middle",
            Finger::LeftRing => "left_ring",
            Finger::LeftPinky => "left_pinky",
            Finger::RightThumb => "right_thumb",
            Finger::RightIndex => "right_index",
            Finger::RightMiddle => "right_middle",
            Finger::RightRing => "right_ring",
            Finger::RightPinky => "right_pinky",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        let wanted = s.to_lowercase().replace('-', "_");
        Self::ALL.iter().copied().find(|f| f.label() == wanted)
    }
}

impl fmt::Display for Finger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Recognized raw payload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Xyt,
    Fp3,
}

impl PayloadFormat {
    /// Identify a payload by its leading tag
    pub fn detect(raw: &[u8]) -> Option<Self> {
        if raw.starts_with(minutiae::XYT_TAG) {
            Some(PayloadFormat::Xyt)
        } else if raw.starts_with(fp3::FP3_TAG) {
            Some(PayloadFormat::Fp3)
        } else {
            None
        }
    }
}

/// Immutable biometric reference for one enrolled finger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    owner_id: String,
    finger: Finger,
    #[serde(skip)]
    raw: Vec<u8>,
    sample_count: u16,
    created_at: DateTime<Utc>,
}

impl Template {
    /// Validate and assemble a template. `created_at` is truncated to
    /// milliseconds, the precision the envelope stores.
    pub(crate) fn new(
        owner_id: &str,
        finger: Finger,
        raw: Vec<u8>,
        sample_count: u16,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DecodeError> {
        validate_owner_id(owner_id).map_err(|e| DecodeError::InvalidField(e.to_string()))?;

        if raw.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }
        if raw.len() > MAX_PAYLOAD_LEN {
            return Err(DecodeError::InvalidField(format!(
                "payload of {} bytes exceeds {} bytes",
                raw.len(),
                MAX_PAYLOAD_LEN
            )));
        }
        if PayloadFormat::detect(&raw).is_none() {
            return Err(DecodeError::UnknownFormatTag);
        }
        if sample_count == 0 {
            return Err(DecodeError::InvalidField(
                "sample count must be at least 1".to_string(),
            ));
        }

        let created_at = millis_to_datetime(created_at.timestamp_millis())?;

        Ok(Self {
            owner_id: owner_id.to_string(),
            finger,
            raw,
            sample_count,
            created_at,
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn finger(&self) -> Finger {
        self.finger
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn sample_count(&self) -> u16 {
        self.sample_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn format(&self) -> PayloadFormat {
        // Construction guarantees a recognized tag
        PayloadFormat::detect(&self.raw).unwrap_or(PayloadFormat::Xyt)
    }

    /// Unpack the samples held in the payload
    pub fn minutiae_sets(&self) -> Result<Vec<MinutiaeSet>, DecodeError> {
        match self.format() {
            PayloadFormat::Xyt => minutiae::unpack_sets(&self.raw),
            PayloadFormat::Fp3 => fp3::parse_fp3(&self.raw).map(|(_, sets)| sets),
        }
    }
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, DecodeError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| DecodeError::InvalidField(format!("timestamp {} out of range", ms)))
}

/// Serializer for the persisted template envelope
///
/// Layout (little-endian): magic `FPTE`, version, finger, owner id (u16
/// length + UTF-8), sample count (u16), created-at (i64 unix millis), payload
/// (u32 length + bytes), then a SHA-256 digest over everything before it.
pub struct TemplateCodec;

impl TemplateCodec {
    pub fn encode(template: &Template) -> Vec<u8> {
        let owner = template.owner_id.as_bytes();
        let mut out =
            Vec::with_capacity(4 + 1 + 1 + 2 + owner.len() + 2 + 8 + 4 + template.raw.len() + 32);

        out.extend_from_slice(ENVELOPE_MAGIC);
        out.push(ENVELOPE_VERSION);
        out.push(template.finger.as_u8());
        // Owner ids are at most 64 bytes and payloads at most MAX_PAYLOAD_LEN
        out.extend_from_slice(&(owner.len() as u16).to_le_bytes());
        out.extend_from_slice(owner);
        out.extend_from_slice(&template.sample_count.to_le_bytes());
        out.extend_from_slice(&template.created_at.timestamp_millis().to_le_bytes());
        out.extend_from_slice(&(template.raw.len() as u32).to_le_bytes());
        out.extend_from_slice(&template.raw);

        let digest = Sha256::digest(&out);
        out.extend_from_slice(&digest);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Template, DecodeError> {
        let mut reader = ByteReader::new(bytes);

        if reader.take(ENVELOPE_MAGIC.len())? != ENVELOPE_MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let version = reader.u8()?;
        if version != ENVELOPE_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let finger_byte = reader.u8()?;
        let finger = Finger::from_u8(finger_byte)
            .ok_or_else(|| DecodeError::InvalidField(format!("unknown finger {}", finger_byte)))?;

        let owner_len = reader.u16_le()? as usize;
        let owner = std::str::from_utf8(reader.take(owner_len)?)
            .map_err(|e| DecodeError::InvalidField(format!("owner id is not UTF-8: {}", e)))?
            .to_string();

        let sample_count = reader.u16_le()?;
        let created_ms = reader.i64_le()?;
        let raw_len = reader.u32_le()? as usize;
        let raw = reader.take(raw_len)?.to_vec();

        let body_len = reader.position();
        let digest = reader.take(DIGEST_LEN)?;
        if reader.remaining() > 0 {
            return Err(DecodeError::TrailingBytes(reader.remaining()));
        }
        if Sha256::digest(&bytes[..body_len]).as_slice() != digest {
            return Err(DecodeError::ChecksumMismatch);
        }

        Template::new(
            &owner,
            finger,
            raw,
            sample_count,
            millis_to_datetime(created_ms)?,
        )
    }

    /// Wrap a legacy libfprint print (raw FP3 bytes, no envelope) as a template
    pub fn import_fp3(owner_id: &str, finger: Finger, raw: &[u8]) -> Result<Template, DecodeError> {
        let (_, sets) = fp3::parse_fp3(raw)?;
        let sample_count = u16::try_from(sets.len())
            .map_err(|_| DecodeError::InvalidField(format!("{} prints", sets.len())))?;

        log::info!(
            "Imported FP3 print for '{}' ({}): {} scan(s)",
            owner_id,
            finger,
            sample_count
        );
        Template::new(owner_id, finger, raw.to_vec(), sample_count, Utc::now())
    }
}

/// Bounds-checked little-endian reader shared by the codecs
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn peek(&self, n: usize) -> Option<&'a [u8]> {
        self.data.get(self.pos..self.pos.checked_add(n)?)
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let slice = self.peek(n).ok_or(DecodeError::Truncated {
            offset: self.pos,
            needed: n.saturating_sub(self.remaining()),
        })?;
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16_le(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32_le(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn i32_le(&mut self) -> Result<i32, DecodeError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn i64_le(&mut self) -> Result<i64, DecodeError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_le_bytes(arr))
    }

    /// Skip padding up to the next multiple of `to`
    pub(crate) fn align(&mut self, to: usize) -> Result<(), DecodeError> {
        let pad = (to - self.pos % to) % to;
        self.take(pad).map(|_| ())
    }

    /// NUL-terminated UTF-8 string of at most `max` bytes
    pub(crate) fn cstr(&mut self, max: usize) -> Result<String, DecodeError> {
        let start = self.pos;
        let rest = &self.data[start..];
        let len = rest
            .iter()
            .take(max + 1)
            .position(|&b| b == 0)
            .ok_or_else(|| {
                if rest.len() <= max {
                    DecodeError::Truncated {
                        offset: start,
                        needed: 1,
                    }
                } else {
                    DecodeError::InvalidField(format!("string longer than {} bytes", max))
                }
            })?;

        let s = std::str::from_utf8(&rest[..len])
            .map_err(|e| DecodeError::InvalidField(format!("invalid UTF-8 string: {}", e)))?
            .to_string();
        self.pos += len + 1;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xyt_template() -> Template {
        let sets = vec![
            MinutiaeSet::new(
                AlgorithmFamily::NbisXyt,
                vec![Minutia::new(1, 2, 3), Minutia::new(4, 5, 6)],
            ),
            MinutiaeSet::new(AlgorithmFamily::NbisXyt, vec![Minutia::new(7, 8, 9)]),
        ];
        let raw = minutiae::pack_sets(&sets).unwrap();
        Template::new("user7", Finger::RightIndex, raw, 2, Utc::now()).unwrap()
    }

    #[test]
    fn test_json_fields_are_camel_case() {
        let json = serde_json::to_value(xyt_template()).unwrap();
        assert_eq!(json["ownerId"], "user7");
        assert_eq!(json["finger"], "right_index");
        assert_eq!(json["sampleCount"], 2);
        assert!(json.get("createdAt").is_some());
        assert!(json.get("owner_id").is_none());
        assert!(json.get("raw").is_none());
    }

    #[test]
    fn test_round_trip() {
        let t = xyt_template();
        let bytes = TemplateCodec::encode(&t);
        let decoded = TemplateCodec::decode(&bytes).unwrap();

        assert_eq!(decoded, t);
        assert_eq!(decoded.owner_id(), "user7");
        assert_eq!(decoded.sample_count(), 2);
        assert_eq!(decoded.raw_bytes(), t.raw_bytes());
        assert_eq!(decoded.minutiae_sets().unwrap().len(), 2);
    }

    #[test]
    fn test_decode_rejects_bad_framing() {
        let bytes = TemplateCodec::encode(&xyt_template());

        let mut bad = bytes.clone();
        bad[0] = b'X';
        assert_eq!(TemplateCodec::decode(&bad), Err(DecodeError::BadMagic));

        let mut bad = bytes.clone();
        bad[4] = 9;
        assert_eq!(
            TemplateCodec::decode(&bad),
            Err(DecodeError::UnsupportedVersion(9))
        );

        let mut bad = bytes.clone();
        let last = bad.len() - 40;
        bad[last] ^= 0xff;
        assert_eq!(
            TemplateCodec::decode(&bad),
            Err(DecodeError::ChecksumMismatch)
        );

        let mut bad = bytes.clone();
        bad.push(0);
        assert_eq!(
            TemplateCodec::decode(&bad),
            Err(DecodeError::TrailingBytes(1))
        );

        assert!(TemplateCodec::decode(&[]).is_err());
    }

    #[test]
    fn test_decode_every_truncation_fails() {
        let bytes = TemplateCodec::encode(&xyt_template());
        for cut in 0..bytes.len() {
            assert!(
                TemplateCodec::decode(&bytes[..cut]).is_err(),
                "truncation at {} decoded",
                cut
            );
        }
    }

    #[test]
    fn test_new_enforces_invariants() {
        let now = Utc::now();
        assert_eq!(
            Template::new("u", Finger::Unknown, vec![], 1, now),
            Err(DecodeError::EmptyPayload)
        );
        assert_eq!(
            Template::new("u", Finger::Unknown, b"JUNKDATA".to_vec(), 1, now),
            Err(DecodeError::UnknownFormatTag)
        );
        assert!(Template::new("u", Finger::Unknown, b"XYT1".to_vec(), 0, now).is_err());
        assert!(Template::new("bad owner", Finger::Unknown, b"XYT1".to_vec(), 1, now).is_err());
    }

    #[test]
    fn test_codec_checks_framing_not_internals() {
        // A recognized tag with a garbage body still encodes and decodes
        let t = Template::new("u1", Finger::LeftThumb, b"XYT1garbage".to_vec(), 1, Utc::now())
            .unwrap();
        let decoded = TemplateCodec::decode(&TemplateCodec::encode(&t)).unwrap();
        assert_eq!(decoded, t);
        assert!(decoded.minutiae_sets().is_err());
    }

    #[test]
    fn test_import_fp3() {
        let raw = fp3::tests::sample_fp3(&[vec![(1, 2, 3)], vec![(4, 5, 6)], vec![(7, 8, 9)]]);
        let t = TemplateCodec::import_fp3("legacy-42", Finger::LeftIndex, &raw).unwrap();
        assert_eq!(t.format(), PayloadFormat::Fp3);
        assert_eq!(t.sample_count(), 3);
        assert_eq!(t.minutiae_sets().unwrap()[2].points()[0], Minutia::new(7, 8, 9));
    }

    #[test]
    fn test_finger_labels() {
        assert_eq!(Finger::from_label("right-index"), Some(Finger::RightIndex));
        assert_eq!(Finger::from_label("LEFT_PINKY"), Some(Finger::LeftPinky));
        assert_eq!(Finger::from_label("toe"), None);
        for f in Finger::ALL {
            assert_eq!(Finger::from_u8(f.as_u8()), Some(f));
        }
        assert_eq!(Finger::from_u8(11), None);
    }
}
