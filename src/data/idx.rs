//! IDX binary format (MNIST and derivatives: Fashion-MNIST, EMNIST, ...).
//!
//! # IDX3 image file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x03        (number of dimensions = 3)
//! bytes  4-7:   N           (number of images, big-endian u32)
//! bytes  8-11:  rows        (image height in pixels, big-endian u32)
//! bytes 12-15:  cols        (image width in pixels, big-endian u32)
//! bytes 16..:   N * rows * cols bytes, row-major, uint8
//! ```
//!
//! # IDX1 label file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x01        (number of dimensions = 1)
//! bytes  4-7:   N           (number of labels, big-endian u32)
//! bytes  8..:   N bytes, each a class index in [0, n_classes)
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdxError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IDX {file} file too short: need at least {needed} bytes, got {found}")]
    TooShort { file: &'static str, needed: usize, found: usize },

    #[error("IDX {file} file: byte {byte} must be 0x{expected:02X}, got 0x{found:02X}")]
    BadHeader { file: &'static str, byte: usize, expected: u8, found: u8 },

    #[error("IDX {file} file: declared size overflows usize")]
    Overflow { file: &'static str },

    #[error("IDX file mismatch: {images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },

    #[error("IDX label at index {index}: class {class} is out of range for {classes} classes")]
    LabelOutOfRange { index: usize, class: usize, classes: usize },

    #[error("n_classes must be at least 2, got {0}")]
    TooFewClasses(usize),
}

/// Parsed samples: pixels scaled to `[0, 1]`, labels as class indices.
#[derive(Debug, Clone, PartialEq)]
pub struct IdxData {
    pub inputs: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    pub rows: usize,
    pub cols: usize,
}

pub fn load_idx_pair(images: &Path, labels: &Path, n_classes: usize) -> Result<IdxData, IdxError> {
    let read = |path: &Path| {
        std::fs::read(path).map_err(|source| IdxError::Io { path: path.to_path_buf(), source })
    };
    parse_idx_pair(&read(images)?, &read(labels)?, n_classes)
}

fn check_header(bytes: &[u8], file: &'static str, dims: u8, header_len: usize) -> Result<(), IdxError> {
    if bytes.len() < header_len {
        return Err(IdxError::TooShort { file, needed: header_len, found: bytes.len() });
    }
    for (byte, expected) in [(0, 0x00), (1, 0x00), (2, 0x08), (3, dims)] {
        if bytes[byte] != expected {
            return Err(IdxError::BadHeader { file, byte, expected, found: bytes[byte] });
        }
    }
    Ok(())
}

fn be_u32(bytes: &[u8], at: usize) -> usize {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

/// Parses an IDX3 image file and its IDX1 label file.
pub fn parse_idx_pair(image_bytes: &[u8], label_bytes: &[u8], n_classes: usize) -> Result<IdxData, IdxError> {
    if n_classes < 2 {
        return Err(IdxError::TooFewClasses(n_classes));
    }

    check_header(image_bytes, "image", 0x03, 16)?;
    let n_items = be_u32(image_bytes, 4);
    let rows = be_u32(image_bytes, 8);
    let cols = be_u32(image_bytes, 12);

    let n_pixels = rows.checked_mul(cols).ok_or(IdxError::Overflow { file: "image" })?;
    let image_len = n_items
        .checked_mul(n_pixels)
        .and_then(|n| n.checked_add(16))
        .ok_or(IdxError::Overflow { file: "image" })?;
    if image_bytes.len() < image_len {
        return Err(IdxError::TooShort { file: "image", needed: image_len, found: image_bytes.len() });
    }

    check_header(label_bytes, "label", 0x01, 8)?;
    let label_count = be_u32(label_bytes, 4);
    if label_count != n_items {
        return Err(IdxError::CountMismatch { images: n_items, labels: label_count });
    }
    if label_bytes.len() < 8 + n_items {
        return Err(IdxError::TooShort { file: "label", needed: 8 + n_items, found: label_bytes.len() });
    }

    let inputs: Vec<Vec<f64>> = if n_pixels == 0 {
        vec![Vec::new(); n_items]
    } else {
        image_bytes[16..image_len]
            .chunks_exact(n_pixels)
            .map(|chunk| chunk.iter().map(|&px| px as f64 / 255.0).collect())
            .collect()
    };

    let labels = label_bytes[8..8 + n_items]
        .iter()
        .enumerate()
        .map(|(index, &class)| {
            let class = class as usize;
            if class >= n_classes {
                Err(IdxError::LabelOutOfRange { index, class, classes: n_classes })
            } else {
                Ok(class)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IdxData { inputs, labels, rows, cols })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(n: u32, rows: u32, cols: u32, pixels: &[u8]) -> Vec<u8> {
        let mut out = vec![0x00, 0x00, 0x08, 0x03];
        for v in [n, rows, cols] {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out.extend_from_slice(pixels);
        out
    }

    fn labels(values: &[u8]) -> Vec<u8> {
        let mut out = vec![0x00, 0x00, 0x08, 0x01];
        out.extend_from_slice(&(values.len() as u32).to_be_bytes());
        out.extend_from_slice(values);
        out
    }

    #[test]
    fn parses_scaled_pixels_and_labels() {
        let data = parse_idx_pair(&images(2, 1, 2, &[0, 255, 51, 102]), &labels(&[1, 0]), 10).unwrap();
        assert_eq!(data.inputs, vec![vec![0.0, 1.0], vec![0.2, 0.4]]);
        assert_eq!(data.labels, vec![1, 0]);
        assert_eq!((data.rows, data.cols), (1, 2));
    }

    #[test]
    fn rejects_wrong_dimension_byte() {
        let mut bytes = images(1, 1, 1, &[0]);
        bytes[3] = 0x02;
        assert!(matches!(
            parse_idx_pair(&bytes, &labels(&[0]), 2),
            Err(IdxError::BadHeader { file: "image", byte: 3, .. })
        ));
    }

    #[test]
    fn rejects_count_mismatch_and_bad_labels() {
        assert!(matches!(
            parse_idx_pair(&images(2, 1, 1, &[0, 0]), &labels(&[0]), 2),
            Err(IdxError::CountMismatch { images: 2, labels: 1 })
        ));
        assert!(matches!(
            parse_idx_pair(&images(1, 1, 1, &[0]), &labels(&[7]), 3),
            Err(IdxError::LabelOutOfRange { index: 0, class: 7, classes: 3 })
        ));
    }

    #[test]
    fn rejects_truncated_pixels() {
        assert!(matches!(
            parse_idx_pair(&images(2, 2, 2, &[0; 5]), &labels(&[0, 1]), 2),
            Err(IdxError::TooShort { file: "image", .. })
        ));
    }
}
