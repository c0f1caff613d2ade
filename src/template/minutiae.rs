//! Minutiae samples and the native `XYT1` multi-sample container

use super::ByteReader;
use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Format tag of the native container
pub const XYT_TAG: &[u8; 4] = b"XYT1";

/// bozorth3 compares at most this many minutiae per sample
pub const MAX_MINUTIAE: usize = 200;

/// One ridge feature: position in pixels and direction in degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct Minutia {
    pub x: i32,
    pub y: i32,
    pub theta: i32,
}

impl Minutia {
    pub fn new(x: i32, y: i32, theta: i32) -> Self {
        Self { x, y, theta }
    }
}

/// Algorithm family a sample was extracted with
///
/// Raw scores are only comparable between samples of the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmFamily {
    /// NIST NBIS mindtct output, scored by bozorth3 (libfprint)
    NbisXyt,
    /// Synthetic samples from the simulated reader
    Simulated,
}

impl AlgorithmFamily {
    pub fn as_byte(self) -> u8 {
        match self {
            AlgorithmFamily::NbisXyt => 1,
            AlgorithmFamily::Simulated => 0x7f,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(AlgorithmFamily::NbisXyt),
            0x7f => Some(AlgorithmFamily::Simulated),
            _ => None,
        }
    }
}

impl fmt::Display for AlgorithmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmFamily::NbisXyt => write!(f, "nbis-xyt"),
            AlgorithmFamily::Simulated => write!(f, "simulated"),
        }
    }
}

/// One decoded biometric sample
#[derive(Debug, Clone, PartialEq, Eq, Zeroize)]
pub struct MinutiaeSet {
    #[zeroize(skip)]
    family: AlgorithmFamily,
    points: Vec<Minutia>,
}

impl MinutiaeSet {
    /// Build a sample, keeping at most `MAX_MINUTIAE` points
    pub fn new(family: AlgorithmFamily, mut points: Vec<Minutia>) -> Self {
        points.truncate(MAX_MINUTIAE);
        Self { family, points }
    }

    pub fn family(&self) -> AlgorithmFamily {
        self.family
    }

    pub fn points(&self) -> &[Minutia] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Pack samples of one family into an `XYT1` payload
pub fn pack_sets(sets: &[MinutiaeSet]) -> Result<Vec<u8>, DecodeError> {
    let first = sets.first().ok_or(DecodeError::EmptyPayload)?;
    let family = first.family();

    if sets.iter().any(|s| s.family() != family) {
        return Err(DecodeError::InvalidField(
            "samples from mixed algorithm families".to_string(),
        ));
    }
    if sets.len() > u16::MAX as usize {
        return Err(DecodeError::InvalidField(format!(
            "too many samples: {}",
            sets.len()
        )));
    }

    let points: usize = sets.iter().map(|s| s.len()).sum();
    let mut out = Vec::with_capacity(7 + sets.len() * 2 + points * 12);
    out.extend_from_slice(XYT_TAG);
    out.push(family.as_byte());
    out.extend_from_slice(&(sets.len() as u16).to_le_bytes());

    for set in sets {
        // MinutiaeSet::new caps the count at MAX_MINUTIAE
        out.extend_from_slice(&(set.len() as u16).to_le_bytes());
        for m in set.points() {
            out.extend_from_slice(&m.x.to_le_bytes());
            out.extend_from_slice(&m.y.to_le_bytes());
            out.extend_from_slice(&m.theta.to_le_bytes());
        }
    }

    Ok(out)
}

/// Unpack an `XYT1` payload into its samples
pub fn unpack_sets(raw: &[u8]) -> Result<Vec<MinutiaeSet>, DecodeError> {
    let mut reader = ByteReader::new(raw);

    if reader.take(XYT_TAG.len())? != XYT_TAG {
        return Err(DecodeError::UnknownFormatTag);
    }

    let family_byte = reader.u8()?;
    let family = AlgorithmFamily::from_byte(family_byte).ok_or_else(|| {
        DecodeError::InvalidField(format!("unknown algorithm family {}", family_byte))
    })?;

    let count = reader.u16_le()? as usize;
    if count == 0 {
        return Err(DecodeError::EmptyPayload);
    }

    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        let n = reader.u16_le()? as usize;
        if n > MAX_MINUTIAE {
            return Err(DecodeError::InvalidField(format!(
                "sample holds {} minutiae (max {})",
                n, MAX_MINUTIAE
            )));
        }

        let mut points = Vec::with_capacity(n);
        for _ in 0..n {
            let x = reader.i32_le()?;
            let y = reader.i32_le()?;
            let theta = reader.i32_le()?;
            points.push(Minutia { x, y, theta });
        }
        sets.push(MinutiaeSet { family, points });
    }

    if reader.remaining() > 0 {
        return Err(DecodeError::TrailingBytes(reader.remaining()));
    }

    Ok(sets)
}
