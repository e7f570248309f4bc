//! Segment-addressable FITS reader.
//!
//! Opening a file walks the header units only: each header is decoded block
//! by block, the size of the following data unit is computed from its
//! structural keywords (`BITPIX`, `NAXISn`, `PCOUNT`, `GCOUNT`) and the reader
//! seeks over it to the next header. The result is a table of segments with
//! their byte offsets; data is only ever read by [`FitsReader::count_positive`],
//! which seeks to one segment and streams through it in bounded chunks.

use super::header::{BLOCK_LEN, Header, HeaderValue};
use crate::error::FormatError;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read buffer for data scans; a multiple of every element size.
const SCAN_CHUNK: usize = BLOCK_LEN * 8;

/// One header + data unit and its location in the file.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Decoded header
    pub header: Header,
    /// Byte offset of the first header block
    pub header_offset: u64,
    /// Byte offset of the data unit
    pub data_offset: u64,
    /// Size of the data unit in bytes, without block padding
    pub data_len: u64,
}

impl Segment {
    /// Whether the data unit is an image array (primary array or `IMAGE` extension)
    pub fn is_image(&self) -> bool {
        match self.header.get("XTENSION") {
            None => self.header.get("GROUPS") != Some(&HeaderValue::Logical(true)),
            Some(value) => value.as_str().map(str::trim) == Some("IMAGE"),
        }
    }
}

/// Lazily reading FITS container.
///
/// ```no_run
/// use tpf_harvest::fits::FitsReader;
///
/// let reader = FitsReader::open("ktwo201367065-c01_lpd-targ.fits")?;
/// println!("target {}", reader.header("KEPLERID", 0));
/// println!("pixels {}", reader.count_positive(2)?);
/// # Ok::<(), tpf_harvest::error::FormatError>(())
/// ```
#[derive(Debug)]
pub struct FitsReader {
    file: File,
    path: PathBuf,
    file_len: u64,
    segments: Vec<Segment>,
}

impl FitsReader {
    /// Open a file and index its segments.
    ///
    /// Only header blocks are read. Bytes after the last complete segment that
    /// do not start a new extension are ignored.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let mut segments = Vec::new();
        let mut offset = 0u64;

        while offset < file_len {
            let index = segments.len();
            file.seek(SeekFrom::Start(offset))?;

            let Some((header, header_len)) = read_header(&mut file, offset, file_len, index)?
            else {
                debug!(path = %path.display(), offset, "ignoring trailing bytes after last segment");
                break;
            };

            let data_offset = offset + header_len;
            let data_len = data_size(&header, index)?;
            let truncated = || {
                FormatError::Truncated(format!(
                    "segment {index} data needs {data_len} bytes at offset {data_offset}, file has {file_len}"
                ))
            };
            let next_offset = data_offset
                .checked_add(data_len)
                .filter(|end| *end <= file_len)
                .and_then(|_| padded(data_len))
                .and_then(|len| data_offset.checked_add(len))
                .ok_or_else(truncated)?;

            segments.push(Segment {
                header,
                header_offset: offset,
                data_offset,
                data_len,
            });
            offset = next_offset;
        }

        if segments.is_empty() {
            return Err(FormatError::NotFits(format!(
                "{}: empty file",
                path.display()
            )));
        }

        debug!(path = %path.display(), segments = segments.len(), "indexed FITS file");
        Ok(Self {
            file,
            path,
            file_len,
            segments,
        })
    }

    /// Path the reader was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the file in bytes.
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Number of segments (primary + extensions).
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Access one segment by index (0 = primary).
    pub fn segment(&self, index: usize) -> Result<&Segment, FormatError> {
        self.segments
            .get(index)
            .ok_or(FormatError::SegmentOutOfRange {
                index,
                count: self.segments.len(),
            })
    }

    /// Value of a keyword in a segment's header, rendered as a string.
    ///
    /// Returns the empty string if the segment or keyword does not exist or
    /// the value is undefined.
    pub fn header(&self, keyword: &str, segment: usize) -> String {
        self.segments
            .get(segment)
            .and_then(|s| s.header.get(keyword))
            .map(|value| value.to_string())
            .unwrap_or_default()
    }

    /// Count strictly positive elements of an image segment's data array.
    ///
    /// `BSCALE`/`BZERO` are applied when present. NaN never counts.
    pub fn count_positive(&self, segment: usize) -> Result<u64, FormatError> {
        let seg = self.segment(segment)?;
        if !seg.is_image() {
            return Err(FormatError::NotAnImage(segment));
        }

        let bitpix = structural(&seg.header, "BITPIX", segment)?;
        let elem_size = match bitpix {
            8 => 1,
            16 => 2,
            32 | -32 => 4,
            64 | -64 => 8,
            _ => return Err(FormatError::UnsupportedBitpix { segment, bitpix }),
        };
        let bscale = seg.header.real("BSCALE").unwrap_or(1.0);
        let bzero = seg.header.real("BZERO").unwrap_or(0.0);
        let positive = |raw: f64| raw * bscale + bzero > 0.0;

        let mut file = &self.file;
        file.seek(SeekFrom::Start(seg.data_offset))?;

        let mut remaining = seg.data_len;
        let mut buf = vec![0u8; SCAN_CHUNK];
        let mut count = 0u64;

        while remaining > 0 {
            let n = remaining.min(SCAN_CHUNK as u64) as usize;
            file.read_exact(&mut buf[..n]).map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => FormatError::Truncated(format!(
                    "segment {segment} data ends early"
                )),
                _ => FormatError::Io(e),
            })?;

            for elem in buf[..n].chunks_exact(elem_size) {
                let raw = match bitpix {
                    8 => elem[0] as f64,
                    16 => i16::from_be_bytes([elem[0], elem[1]]) as f64,
                    32 => i32::from_be_bytes([elem[0], elem[1], elem[2], elem[3]]) as f64,
                    -32 => f32::from_be_bytes([elem[0], elem[1], elem[2], elem[3]]) as f64,
                    64 => i64::from_be_bytes(eight(elem)) as f64,
                    _ => f64::from_be_bytes(eight(elem)),
                };
                if positive(raw) {
                    count += 1;
                }
            }
            remaining -= n as u64;
        }

        Ok(count)
    }
}

fn eight(elem: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&elem[..8]);
    out
}

/// Decode the header starting at the current position.
///
/// Returns `None` when an extension position does not start with `XTENSION`.
fn read_header(
    file: &mut File,
    offset: u64,
    file_len: u64,
    index: usize,
) -> Result<Option<(Header, u64)>, FormatError> {
    let mut header = Header::default();
    let mut block = vec![0u8; BLOCK_LEN];
    let mut consumed = 0u64;

    loop {
        let available = file_len.saturating_sub(offset + consumed);
        let n = available.min(BLOCK_LEN as u64) as usize;
        file.read_exact(&mut block[..n])?;

        if consumed == 0 {
            if index == 0 && !block[..n].starts_with(b"SIMPLE") {
                return Err(FormatError::NotFits(
                    "primary header does not start with SIMPLE".into(),
                ));
            }
            if index > 0 && !block[..n].starts_with(b"XTENSION") {
                return Ok(None);
            }
        }
        if n < BLOCK_LEN {
            return Err(FormatError::Truncated(format!(
                "segment {index} header runs past end of file"
            )));
        }

        consumed += BLOCK_LEN as u64;
        let done = header.push_block(&block)?;

        if index == 0
            && consumed == BLOCK_LEN as u64
            && header.get("SIMPLE") != Some(&HeaderValue::Logical(true))
        {
            return Err(FormatError::NotFits("SIMPLE is not T".into()));
        }

        if done {
            return Ok(Some((header, consumed)));
        }
    }
}

/// Size in bytes of a segment's data unit, without padding.
fn data_size(header: &Header, segment: usize) -> Result<u64, FormatError> {
    let bitpix = structural(header, "BITPIX", segment)?;
    if !matches!(bitpix, 8 | 16 | 32 | 64 | -32 | -64) {
        return Err(invalid(segment, "BITPIX", bitpix));
    }
    let naxis = structural(header, "NAXIS", segment)?;
    if !(0..=999).contains(&naxis) {
        return Err(invalid(segment, "NAXIS", naxis));
    }
    if naxis == 0 {
        return Ok(0);
    }

    let random_groups = header.get("XTENSION").is_none()
        && header.get("GROUPS") == Some(&HeaderValue::Logical(true));

    let mut elements = 1u64;
    for axis in 1..=naxis {
        let keyword = format!("NAXIS{axis}");
        let len = structural(header, &keyword, segment)?;
        if len < 0 {
            return Err(invalid(segment, &keyword, len));
        }
        // Random groups store NAXIS1 = 0 and leave it out of the product
        if axis == 1 && random_groups && len == 0 {
            continue;
        }
        elements = elements
            .checked_mul(len as u64)
            .ok_or_else(|| invalid(segment, &keyword, len))?;
    }

    let pcount = header.integer("PCOUNT").unwrap_or(0);
    let gcount = header.integer("GCOUNT").unwrap_or(1);
    if pcount < 0 {
        return Err(invalid(segment, "PCOUNT", pcount));
    }
    if gcount < 0 {
        return Err(invalid(segment, "GCOUNT", gcount));
    }

    let elem_bytes = bitpix.unsigned_abs() / 8;
    elements
        .checked_add(pcount as u64)
        .and_then(|n| n.checked_mul(gcount as u64))
        .and_then(|n| n.checked_mul(elem_bytes))
        .ok_or_else(|| invalid(segment, "NAXIS", naxis))
}

fn structural(header: &Header, keyword: &str, segment: usize) -> Result<i64, FormatError> {
    match header.get(keyword) {
        None => Err(FormatError::MissingKeyword {
            segment,
            keyword: keyword.to_string(),
        }),
        Some(value) => value
            .as_integer()
            .ok_or_else(|| FormatError::InvalidValue {
                segment,
                keyword: keyword.to_string(),
                value: value.to_string(),
            }),
    }
}

fn invalid(segment: usize, keyword: &str, value: i64) -> FormatError {
    FormatError::InvalidValue {
        segment,
        keyword: keyword.to_string(),
        value: value.to_string(),
    }
}

/// `len` rounded up to whole blocks, `None` on overflow.
fn padded(len: u64) -> Option<u64> {
    len.div_ceil(BLOCK_LEN as u64).checked_mul(BLOCK_LEN as u64)
}
