//! Metadata record extraction
//!
//! A [`MetadataRecord`] is one row of the campaign table: identity fields,
//! primary header scalars, pixel table scalars, the number of downlinked
//! pixels and the aperture image WCS. The field list is fixed; every record
//! carries every field, with the empty string standing in for anything that
//! could not be read.

use crate::fits::FitsReader;
use std::path::Path;
use tracing::warn;

/// Header-row field names, in output order.
pub const FIELDS: [&str; 38] = [
    "filename", "url", "filesize", "object", "keplerid", "obsmode", "campaign", "data_rel",
    "channel", "module", "output", "ra_obj", "dec_obj", "kepmag", "cadences", "lc_start",
    "lc_end", "gain", "readnois", "meanblck", "cdpp3_0", "cdpp6_0", "cdpp12_0", "npix", "naxis1",
    "naxis2", "crpix1", "crpix2", "crval1", "crval2", "cdelt1", "cdelt2", "pc1_1", "pc1_2",
    "pc2_1", "pc2_2", "crval1p", "crval2p",
];

/// Primary header keywords, copied verbatim.
const PRIMARY_KEYWORDS: [&str; 11] = [
    "OBJECT", "KEPLERID", "OBSMODE", "CAMPAIGN", "DATA_REL", "CHANNEL", "MODULE", "OUTPUT",
    "RA_OBJ", "DEC_OBJ", "KEPMAG",
];

/// Pixel table (extension 1) keywords.
const TABLE_KEYWORDS: [&str; 8] = [
    "LC_START", "LC_END", "GAIN", "READNOIS", "MEANBLCK", "CDPP3_0", "CDPP6_0", "CDPP12_0",
];

/// Aperture image (extension 2) keywords.
const APERTURE_KEYWORDS: [&str; 14] = [
    "NAXIS1", "NAXIS2", "CRPIX1", "CRPIX2", "CRVAL1", "CRVAL2", "CDELT1", "CDELT2", "PC1_1",
    "PC1_2", "PC2_1", "PC2_2", "CRVAL1P", "CRVAL2P",
];

const PRIMARY_SEGMENT: usize = 0;
const TABLE_SEGMENT: usize = 1;
const APERTURE_SEGMENT: usize = 2;

const BYTES_PER_MIB: f64 = 1_048_576.0;

/// One row of the metadata table, values in [`FIELDS`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    values: Vec<String>,
}

impl MetadataRecord {
    /// Field values in [`FIELDS`] order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Value of one field by (lower-case) name.
    pub fn get(&self, field: &str) -> Option<&str> {
        FIELDS
            .iter()
            .position(|name| *name == field)
            .map(|i| self.values[i].as_str())
    }

    /// `(name, value)` pairs in output order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        FIELDS
            .iter()
            .copied()
            .zip(self.values.iter().map(String::as_str))
    }

    /// The header row: lower-case field names joined by commas.
    pub fn header_line() -> String {
        FIELDS.join(",")
    }

    /// The data row: values joined by commas, without quoting.
    pub fn data_line(&self) -> String {
        self.values.join(",")
    }
}

/// Build the metadata record of one file.
///
/// `url` is the public location of the file (kept even when it was read from
/// the mirror or a scratch copy); `path` is where it was read from and is only
/// used for the file size. Failures of individual lookups leave that field
/// empty and never abort the extraction.
pub fn extract(reader: &FitsReader, url: &str, path: &Path) -> MetadataRecord {
    let mut values = Vec::with_capacity(FIELDS.len());

    values.push(url_filename(url));
    values.push(url.to_string());
    values.push(match std::fs::metadata(path) {
        Ok(meta) => format!("{:.1}", meta.len() as f64 / BYTES_PER_MIB),
        Err(e) => {
            warn!(url, path = %path.display(), error = %e, "could not stat file");
            String::new()
        }
    });

    for keyword in PRIMARY_KEYWORDS {
        values.push(reader.header(keyword, PRIMARY_SEGMENT));
    }

    values.push(reader.header("NAXIS2", TABLE_SEGMENT));
    for keyword in TABLE_KEYWORDS {
        values.push(reader.header(keyword, TABLE_SEGMENT));
    }

    values.push(match reader.count_positive(APERTURE_SEGMENT) {
        Ok(npix) => npix.to_string(),
        Err(e) => {
            warn!(url, error = %e, error_code = e.error_code(), "could not count aperture pixels");
            String::new()
        }
    });

    for keyword in APERTURE_KEYWORDS {
        values.push(reader.header(keyword, APERTURE_SEGMENT));
    }

    debug_assert_eq!(values.len(), FIELDS.len());
    MetadataRecord { values }
}

/// Last path component of a URL (the part after the final `/`).
pub fn url_filename(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::test_support::{FitsBuilder, card_int, card_str};

    const URL: &str = "http://archive.stsci.edu/missions/k2/target_pixel_files/c1/201300000/67000/ktwo201367065-c01_lpd-targ.fits.gz";

    #[test]
    fn header_line_is_fixed() {
        assert_eq!(
            MetadataRecord::header_line(),
            "filename,url,filesize,object,keplerid,obsmode,campaign,data_rel,channel,module,output,\
             ra_obj,dec_obj,kepmag,cadences,lc_start,lc_end,gain,readnois,meanblck,cdpp3_0,\
             cdpp6_0,cdpp12_0,npix,naxis1,naxis2,crpix1,crpix2,crval1,crval2,cdelt1,cdelt2,\
             pc1_1,pc1_2,pc2_1,pc2_2,crval1p,crval2p"
        );
    }

    #[test]
    fn extracts_full_record_from_target_pixel_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local-copy.fits");
        FitsBuilder::target_pixel_file(201367065, &[0, 1, 1, 0, 3, 0, 0, 2])
            .write_to(&path)
            .unwrap();

        let reader = FitsReader::open(&path).unwrap();
        let record = extract(&reader, URL, &path);

        assert_eq!(record.values().len(), FIELDS.len());
        assert_eq!(
            record.get("filename"),
            Some("ktwo201367065-c01_lpd-targ.fits.gz")
        );
        assert_eq!(record.get("url"), Some(URL));
        assert_eq!(record.get("filesize"), Some("0.0"));
        assert_eq!(record.get("object"), Some("EPIC 201367065"));
        assert_eq!(record.get("keplerid"), Some("201367065"));
        assert_eq!(record.get("obsmode"), Some("long cadence"));
        assert_eq!(record.get("kepmag"), Some("12.345"));
        assert_eq!(record.get("cadences"), Some("4"));
        assert_eq!(record.get("lc_start"), Some("56808.5"));
        assert_eq!(record.get("readnois"), Some("83.0"));
        assert_eq!(record.get("meanblck"), Some("738"));
        assert_eq!(record.get("cdpp3_0"), Some(""));
        assert_eq!(record.get("npix"), Some("4"));
        assert_eq!(record.get("naxis1"), Some("8"));
        assert_eq!(record.get("naxis2"), Some("1"));
        assert_eq!(record.get("cdelt1"), Some("-0.0011"));
        assert_eq!(record.get("crval2p"), Some("200"));
    }

    #[test]
    fn missing_extensions_leave_empty_fields_without_shifting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary-only.fits");
        FitsBuilder::new()
            .primary(&[card_str("OBJECT", "EPIC 1"), card_int("CAMPAIGN", 3)])
            .write_to(&path)
            .unwrap();

        let reader = FitsReader::open(&path).unwrap();
        let record = extract(&reader, "http://x/a.fits", &path);

        assert_eq!(record.values().len(), FIELDS.len());
        assert_eq!(record.get("object"), Some("EPIC 1"));
        assert_eq!(record.get("campaign"), Some("3"));
        assert_eq!(record.get("keplerid"), Some(""));
        assert_eq!(record.get("cadences"), Some(""));
        assert_eq!(record.get("npix"), Some(""));
        assert_eq!(record.get("crval2p"), Some(""));
        assert_eq!(record.data_line().matches(',').count(), FIELDS.len() - 1);
    }

    #[test]
    fn filesize_is_mebibytes_with_one_decimal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.fits");
        let mut builder = FitsBuilder::target_pixel_file(1, &[1]);
        // 1.5 MiB of table rows
        builder.bintable(1024, 1536, &[]);
        builder.write_to(&path).unwrap();

        let reader = FitsReader::open(&path).unwrap();
        let size = std::fs::metadata(&path).unwrap().len() as f64 / BYTES_PER_MIB;
        let record = extract(&reader, "http://x/big.fits", &path);
        assert_eq!(record.get("filesize"), Some(format!("{:.1}", size).as_str()));
        assert_eq!(record.get("filesize"), Some("1.5"));
    }

    #[test]
    fn fields_pair_names_with_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.fits");
        FitsBuilder::target_pixel_file(7, &[1]).write_to(&path).unwrap();
        let reader = FitsReader::open(&path).unwrap();
        let record = extract(&reader, "http://x/t.fits", &path);

        let names: Vec<&str> = record.fields().map(|(name, _)| name).collect();
        assert_eq!(names, FIELDS);
        assert_eq!(record.fields().nth(4), Some(("keplerid", "7")));
    }

    #[test]
    fn url_filename_takes_last_component() {
        assert_eq!(url_filename("http://a/b/c.fits"), "c.fits");
        assert_eq!(url_filename("c.fits"), "c.fits");
        assert_eq!(url_filename("http://a/b/"), "");
    }
}
