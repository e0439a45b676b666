//! Minimal ustar encoding for the engine's archive endpoints.
//!
//! The engine's copy-in/copy-out API moves tar streams. Uploads only ever
//! carry a single regular file, and downloads extract a single entry, so a
//! full archive library is unnecessary; this module implements exactly that
//! subset of the ustar format.

use crate::error::{ProvisionError, Result};

const BLOCK: usize = 512;

/// Encode a single regular file as a tar archive.
#[must_use]
pub fn encode_file(name: &str, data: &[u8]) -> Vec<u8> {
    let mut header = [0u8; BLOCK];

    let name_bytes = name.as_bytes();
    let name_len = name_bytes.len().min(100);
    header[..name_len].copy_from_slice(&name_bytes[..name_len]);

    write_octal(&mut header[100..108], 0o644); // mode
    write_octal(&mut header[108..116], 0); // uid
    write_octal(&mut header[116..124], 0); // gid
    write_octal12(&mut header[124..136], data.len() as u64); // size
    write_octal12(&mut header[136..148], 0); // mtime
    header[156] = b'0'; // typeflag: regular file
    header[257..262].copy_from_slice(b"ustar");
    header[263..265].copy_from_slice(b"00");

    // Checksum is computed with the checksum field set to spaces.
    header[148..156].copy_from_slice(b"        ");
    let sum: u64 = header.iter().map(|b| u64::from(*b)).sum();
    let checksum = format!("{sum:06o}\0 ");
    header[148..156].copy_from_slice(checksum.as_bytes());

    let padded_len = data.len().div_ceil(BLOCK) * BLOCK;
    let mut archive = Vec::with_capacity(BLOCK + padded_len + 2 * BLOCK);
    archive.extend_from_slice(&header);
    archive.extend_from_slice(data);
    archive.resize(BLOCK + padded_len, 0);
    // End-of-archive marker: two zero blocks.
    archive.resize(archive.len() + 2 * BLOCK, 0);
    archive
}

/// Extract the first regular file from a tar archive.
///
/// # Errors
///
/// Returns a protocol error if the archive is truncated or holds no
/// regular file.
pub fn extract_first_file(archive: &[u8]) -> Result<Vec<u8>> {
    let mut offset = 0;

    while offset + BLOCK <= archive.len() {
        let header = &archive[offset..offset + BLOCK];
        if header.iter().all(|b| *b == 0) {
            break;
        }

        let size = parse_octal(&header[124..136])?;
        let data_start = offset + BLOCK;
        let data_end = data_start + usize::try_from(size).unwrap_or(usize::MAX);
        if data_end > archive.len() {
            return Err(ProvisionError::Protocol(
                "truncated tar archive".to_string(),
            ));
        }

        let typeflag = header[156];
        if typeflag == b'0' || typeflag == 0 {
            return Ok(archive[data_start..data_end].to_vec());
        }

        let padded = usize::try_from(size).unwrap_or(0).div_ceil(BLOCK) * BLOCK;
        offset = data_start + padded;
    }

    Err(ProvisionError::Protocol(
        "tar archive holds no regular file".to_string(),
    ))
}

fn write_octal(field: &mut [u8], value: u64) {
    let s = format!("{value:0width$o}\0", width = field.len() - 1);
    field.copy_from_slice(&s.as_bytes()[..field.len()]);
}

fn write_octal12(field: &mut [u8], value: u64) {
    let s = format!("{value:011o}\0");
    field.copy_from_slice(&s.as_bytes()[..12]);
}

fn parse_octal(field: &[u8]) -> Result<u64> {
    let text: String = field
        .iter()
        .take_while(|b| **b != 0 && **b != b' ')
        .map(|b| *b as char)
        .collect();
    u64::from_str_radix(text.trim(), 8)
        .map_err(|_| ProvisionError::Protocol("bad octal field in tar header".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_file_roundtrip() {
        let data = b"hello from the sandbox\n";
        let archive = encode_file("greeting.txt", data);

        assert_eq!(archive.len() % BLOCK, 0);
        let extracted = extract_first_file(&archive).unwrap();
        assert_eq!(extracted, data);
    }

    #[test]
    fn empty_file_roundtrip() {
        let archive = encode_file("empty", b"");
        assert_eq!(extract_first_file(&archive).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn block_sized_payload() {
        let data = vec![0x42u8; BLOCK];
        let archive = encode_file("block", &data);
        assert_eq!(extract_first_file(&archive).unwrap(), data);
    }

    #[test]
    fn truncated_archive_rejected() {
        let mut archive = encode_file("f", b"some data");
        archive.truncate(BLOCK + 4);
        assert!(matches!(
            extract_first_file(&archive),
            Err(ProvisionError::Protocol(_))
        ));
    }

    #[test]
    fn empty_archive_rejected() {
        assert!(extract_first_file(&[0u8; 1024]).is_err());
    }

    #[test]
    fn checksum_is_valid_octal() {
        let archive = encode_file("f", b"x");
        let checksum_field = &archive[148..156];
        // Format: six octal digits, NUL, space.
        assert_eq!(checksum_field[6], 0);
        assert_eq!(checksum_field[7], b' ');
    }
}
