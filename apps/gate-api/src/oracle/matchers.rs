use gatehouse_common::Plate;
use sha2::{Digest, Sha256};

use super::{FaceMatcher, PlateReader};

/// Reads a plate sample that already carries recognised text (UTF-8), as
/// produced by an OCR-capable camera at the gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPlateReader;

impl PlateReader for TextPlateReader {
    fn read_plate(&self, sample: &[u8]) -> Option<Plate> {
        std::str::from_utf8(sample).ok().and_then(Plate::parse)
    }
}

/// Exact-sample face matching by SHA-256 digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestFaceMatcher;

impl FaceMatcher for DigestFaceMatcher {
    fn enroll(&self, sample: &[u8]) -> String {
        Sha256::digest(sample)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    fn matches(&self, sample: &[u8], reference: &str) -> bool {
        self.enroll(sample).eq_ignore_ascii_case(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_hex_sha256() {
        let reference = DigestFaceMatcher.enroll(b"abc");
        assert_eq!(
            reference,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(DigestFaceMatcher.matches(b"abc", &reference.to_uppercase()));
        assert!(!DigestFaceMatcher.matches(b"abd", &reference));
    }

    #[test]
    fn text_reader_rejects_non_utf8() {
        assert!(TextPlateReader.read_plate(&[0xc3, 0x28]).is_none());
        assert_eq!(
            TextPlateReader.read_plate(b" xy-12 ").unwrap().as_str(),
            "XY12"
        );
    }
}
