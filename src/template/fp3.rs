//! Reader for libfprint-serialized NBIS prints ("FP3" payloads)
//!
//! libfprint stores an enrolled print as `"FP3"` followed by a GVariant of
//! shape `(issbymsmsia{sv}v)`: print type, driver, device id, device-stored
//! flag, finger, optional username and description, enroll date, an empty
//! metadata dictionary and finally the print data. For NBIS prints the data
//! is `a(aiaiai)`, one `(x[], y[], theta[])` tuple per enrolled scan.
//!
//! Only the minutiae are extracted. Metadata is skipped, and prints with a
//! non-empty metadata dictionary are rejected because their layout is not
//! self-describing enough to skip safely.

use super::minutiae::{AlgorithmFamily, Minutia, MinutiaeSet, MAX_MINUTIAE};
use super::ByteReader;
use crate::error::DecodeError;

/// Format tag of libfprint serialized prints
pub const FP3_TAG: &[u8; 3] = b"FP3";

const MAX_STRING_LEN: usize = 256;

/// Metadata fields preceding the print data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fp3Header {
    pub print_type: i32,
    pub driver: String,
    pub device_id: String,
    pub finger: u8,
    pub username: Option<String>,
    pub description: Option<String>,
}

/// Parse an FP3 payload into its header and per-scan minutiae sets
pub fn parse_fp3(raw: &[u8]) -> Result<(Fp3Header, Vec<MinutiaeSet>), DecodeError> {
    if raw.len() < FP3_TAG.len() || &raw[..FP3_TAG.len()] != FP3_TAG {
        return Err(DecodeError::UnknownFormatTag);
    }

    // Offsets and alignment are relative to the GVariant body
    let body = &raw[FP3_TAG.len()..];
    if body.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    let mut reader = ByteReader::new(body);

    let print_type = reader.i32_le()?;
    // 1 = FPI_PRINT_NBIS, 2 = uru4000 prints that also carry NBIS data
    if print_type != 1 && print_type != 2 {
        return Err(DecodeError::InvalidField(format!(
            "unsupported print type {} (only NBIS prints carry minutiae)",
            print_type
        )));
    }

    let driver = reader.cstr(MAX_STRING_LEN)?;
    let device_id = reader.cstr(MAX_STRING_LEN)?;
    let _device_stored = reader.u8()?;
    let finger = reader.u8()?;
    let username = read_maybe_string(&mut reader)?;
    let description = read_maybe_string(&mut reader)?;
    let _julian_date = reader.i32_le()?;

    let dict_len = reader.u32_le()?;
    if dict_len != 0 {
        return Err(DecodeError::InvalidField(format!(
            "metadata dictionary with {} entries is not supported",
            dict_len
        )));
    }

    let header = Fp3Header {
        print_type,
        driver,
        device_id,
        finger,
        username,
        description,
    };
    log::debug!(
        "FP3 header: type={}, driver='{}', finger={}",
        header.print_type,
        header.driver,
        header.finger
    );

    let sets = read_nbis_prints(&mut reader)?;
    Ok((header, sets))
}

/// `ms` field: four zero bytes encode Nothing, otherwise a NUL-terminated
/// string optionally followed by one alignment byte
fn read_maybe_string(reader: &mut ByteReader<'_>) -> Result<Option<String>, DecodeError> {
    if reader.peek(4) == Some(&[0u8; 4][..]) {
        reader.take(4)?;
        return Ok(None);
    }

    let s = reader.cstr(MAX_STRING_LEN)?;
    if reader.peek(1) == Some(&[0u8][..]) {
        reader.take(1)?;
    }

    Ok(if s.is_empty() { None } else { Some(s) })
}

fn read_nbis_prints(reader: &mut ByteReader<'_>) -> Result<Vec<MinutiaeSet>, DecodeError> {
    let count = reader.u32_le()? as usize;
    if count == 0 {
        return Err(DecodeError::EmptyPayload);
    }

    // Each print needs at least three 4-byte array lengths
    if count > reader.remaining() / 12 {
        return Err(DecodeError::InvalidField(format!(
            "print count {} exceeds payload size",
            count
        )));
    }

    let mut sets = Vec::with_capacity(count);
    for idx in 0..count {
        let xs = read_i32_array(reader)?;
        let ys = read_i32_array(reader)?;
        let thetas = read_i32_array(reader)?;

        if xs.len() != ys.len() || xs.len() != thetas.len() {
            return Err(DecodeError::InvalidField(format!(
                "print {}: xyt arrays differ in length (x={}, y={}, theta={})",
                idx,
                xs.len(),
                ys.len(),
                thetas.len()
            )));
        }

        let points: Vec<Minutia> = xs
            .iter()
            .zip(ys.iter())
            .zip(thetas.iter())
            .take(MAX_MINUTIAE)
            .map(|((&x, &y), &theta)| Minutia { x, y, theta })
            .collect();
        log::trace!("FP3 print {}: {} minutiae", idx, points.len());

        sets.push(MinutiaeSet::new(AlgorithmFamily::NbisXyt, points));
    }

    Ok(sets)
}

/// `ai` array: 4-byte aligned u32 length followed by i32 elements
fn read_i32_array(reader: &mut ByteReader<'_>) -> Result<Vec<i32>, DecodeError> {
    reader.align(4)?;
    let len = reader.u32_le()? as usize;
    if len > reader.remaining() / 4 {
        return Err(DecodeError::Truncated {
            offset: reader.position(),
            needed: len * 4 - reader.remaining(),
        });
    }

    (0..len).map(|_| reader.i32_le()).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn push_i32_array(buf: &mut Vec<u8>, values: &[i32]) {
        // Offsets are relative to the body, which starts after the 3-byte tag
        while (buf.len() - 3) % 4 != 0 {
            buf.push(0);
        }
        buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    /// Build an FP3 payload the way libfprint lays it out
    pub(crate) fn sample_fp3(prints: &[Vec<(i32, i32, i32)>]) -> Vec<u8> {
        let mut buf = FP3_TAG.to_vec();
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(b"uru4000\0");
        buf.extend_from_slice(b"virtual-image\0");
        buf.push(0); // device_stored
        buf.push(7); // finger
        buf.extend_from_slice(b"user\0\0");
        buf.extend_from_slice(&[0, 0, 0, 0]); // description: Nothing
        buf.extend_from_slice(&2_460_000i32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&(prints.len() as u32).to_le_bytes());
        for print in prints {
            let xs: Vec<i32> = print.iter().map(|p| p.0).collect();
            let ys: Vec<i32> = print.iter().map(|p| p.1).collect();
            let ts: Vec<i32> = print.iter().map(|p| p.2).collect();
            push_i32_array(&mut buf, &xs);
            push_i32_array(&mut buf, &ys);
            push_i32_array(&mut buf, &ts);
        }
        buf
    }

    #[test]
    fn test_parse_header_and_prints() {
        let raw = sample_fp3(&[
            vec![(10, 20, 30), (40, 50, 60)],
            vec![(11, 21, 31), (41, 51, 61), (71, 81, 91)],
        ]);
        let (header, sets) = parse_fp3(&raw).unwrap();

        assert_eq!(header.print_type, 1);
        assert_eq!(header.driver, "uru4000");
        assert_eq!(header.device_id, "virtual-image");
        assert_eq!(header.finger, 7);
        assert_eq!(header.username.as_deref(), Some("user"));
        assert_eq!(header.description, None);

        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].points()[1], Minutia::new(40, 50, 60));
        assert_eq!(sets[1].len(), 3);
        assert!(sets
            .iter()
            .all(|s| s.family() == AlgorithmFamily::NbisXyt));
    }

    #[test]
    fn test_rejects_wrong_tag_and_type() {
        assert_eq!(
            parse_fp3(b"FP2abc").unwrap_err(),
            DecodeError::UnknownFormatTag
        );

        let mut raw = sample_fp3(&[vec![(1, 2, 3)]]);
        raw[3] = 9;
        assert!(matches!(
            parse_fp3(&raw),
            Err(DecodeError::InvalidField(_))
        ));
    }

    #[test]
    fn test_truncated_print_data() {
        let raw = sample_fp3(&[vec![(1, 2, 3), (4, 5, 6)]]);
        let cut = &raw[..raw.len() - 4];
        assert!(matches!(
            parse_fp3(cut),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
