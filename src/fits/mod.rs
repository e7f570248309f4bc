//! Minimal FITS container access
//!
//! Supports exactly what target pixel files need: header units (primary and
//! extensions) addressed by index, and a positive-element count over one image
//! data unit. Table contents and compressed files are not decoded.

pub mod header;
pub mod reader;

#[cfg(test)]
pub(crate) mod test_support;

pub use header::{Card, Header, HeaderValue};
pub use reader::{FitsReader, Segment};
