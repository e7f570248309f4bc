//! Synthetic FITS files for tests.
//!
//! Shared by the unit tests and the integration tests under `tests/`, so it
//! must not depend on anything else in the crate.

#![allow(dead_code)]

use std::io;
use std::path::Path;

const BLOCK: usize = 2880;

/// Integer-valued card.
pub fn card_int(key: &str, value: i64) -> String {
    format!("{:<8}= {:>20}", key, value)
}

/// Real-valued card.
pub fn card_real(key: &str, value: f64) -> String {
    format!("{:<8}= {:>20}", key, format!("{:?}", value).to_uppercase())
}

/// String-valued card.
pub fn card_str(key: &str, value: &str) -> String {
    format!("{:<8}= '{:<8}'", key, value.replace('\'', "''"))
}

/// Logical card.
pub fn card_bool(key: &str, value: bool) -> String {
    format!("{:<8}= {:>20}", key, if value { "T" } else { "F" })
}

/// Card with a value indicator but no value.
pub fn card_undefined(key: &str) -> String {
    format!("{:<8}= {:>20} / no value", key, "")
}

/// Incrementally assembled FITS file.
#[derive(Debug, Default, Clone)]
pub struct FitsBuilder {
    bytes: Vec<u8>,
}

impl FitsBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary header without data.
    pub fn primary(&mut self, extra: &[String]) -> &mut Self {
        let mut cards = vec![
            card_bool("SIMPLE", true),
            card_int("BITPIX", 8),
            card_int("NAXIS", 0),
            card_bool("EXTEND", true),
        ];
        cards.extend_from_slice(extra);
        self.push_header(&cards);
        self
    }

    /// Binary table extension with zero-filled rows.
    pub fn bintable(&mut self, rows: usize, row_len: usize, extra: &[String]) -> &mut Self {
        let mut cards = vec![
            card_str("XTENSION", "BINTABLE"),
            card_int("BITPIX", 8),
            card_int("NAXIS", 2),
            card_int("NAXIS1", row_len as i64),
            card_int("NAXIS2", rows as i64),
            card_int("PCOUNT", 0),
            card_int("GCOUNT", 1),
            card_int("TFIELDS", 1),
            card_str("TTYPE1", "TIME"),
            card_str("TFORM1", &format!("{}B", row_len)),
        ];
        cards.extend_from_slice(extra);
        self.push_header(&cards);
        self.push_data(&vec![0u8; rows * row_len]);
        self
    }

    /// Image extension from raw big-endian data.
    pub fn raw_image(
        &mut self,
        bitpix: i64,
        shape: &[usize],
        extra: &[String],
        data: &[u8],
    ) -> &mut Self {
        let mut cards = vec![
            card_str("XTENSION", "IMAGE"),
            card_int("BITPIX", bitpix),
            card_int("NAXIS", shape.len() as i64),
        ];
        for (i, len) in shape.iter().enumerate() {
            cards.push(card_int(&format!("NAXIS{}", i + 1), *len as i64));
        }
        cards.push(card_int("PCOUNT", 0));
        cards.push(card_int("GCOUNT", 1));
        cards.extend_from_slice(extra);
        self.push_header(&cards);
        self.push_data(data);
        self
    }

    /// 32-bit integer image extension.
    pub fn image_i32(&mut self, shape: &[usize], extra: &[String], values: &[i32]) -> &mut Self {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.raw_image(32, shape, extra, &data)
    }

    /// A K2 target pixel file: primary header, pixel table, aperture image.
    pub fn target_pixel_file(keplerid: i64, aperture: &[i32]) -> Self {
        let mut builder = Self::new();
        builder
            .primary(&[
                card_str("TELESCOP", "Kepler"),
                card_str("OBJECT", &format!("EPIC {}", keplerid)),
                card_int("KEPLERID", keplerid),
                card_str("OBSMODE", "long cadence"),
                card_int("CAMPAIGN", 1),
                card_int("DATA_REL", 4),
                card_int("CHANNEL", 24),
                card_int("MODULE", 8),
                card_int("OUTPUT", 4),
                card_real("RA_OBJ", 170.5),
                card_real("DEC_OBJ", 2.25),
                card_real("KEPMAG", 12.345),
            ])
            .bintable(
                4,
                8,
                &[
                    card_real("LC_START", 56808.5),
                    card_real("LC_END", 56888.25),
                    card_real("GAIN", 112.5),
                    card_real("READNOIS", 83.0),
                    card_int("MEANBLCK", 738),
                    card_undefined("CDPP3_0"),
                    card_real("CDPP6_0", 40.5),
                    card_real("CDPP12_0", 31.25),
                ],
            )
            .image_i32(
                &[aperture.len(), 1],
                &[
                    card_real("CRPIX1", 5.0),
                    card_real("CRPIX2", 3.0),
                    card_real("CRVAL1", 170.5),
                    card_real("CRVAL2", 2.25),
                    card_real("CDELT1", -0.0011),
                    card_real("CDELT2", 0.0011),
                    card_real("PC1_1", 0.5),
                    card_real("PC1_2", -0.8),
                    card_real("PC2_1", 0.8),
                    card_real("PC2_2", 0.5),
                    card_int("CRVAL1P", 100),
                    card_int("CRVAL2P", 200),
                ],
                aperture,
            );
        builder
    }

    /// The file contents so far.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Write the file to disk.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, &self.bytes)
    }

    fn push_header(&mut self, cards: &[String]) {
        let mut text = String::new();
        for card in cards.iter().map(String::as_str).chain(["END"]) {
            text.push_str(&format!("{:<80}", card));
        }
        let mut block = text.into_bytes();
        block.resize(block.len().div_ceil(BLOCK) * BLOCK, b' ');
        self.bytes.extend_from_slice(&block);
    }

    fn push_data(&mut self, data: &[u8]) {
        let mut block = data.to_vec();
        block.resize(data.len().div_ceil(BLOCK) * BLOCK, 0);
        self.bytes.extend_from_slice(&block);
    }
}
