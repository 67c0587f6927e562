//! MNIST IDX file reader
//!
//! Expected files under the data directory (either `.` or `-` before `idx`):
//!
//! ```text
//! train-images.idx3-ubyte   train-labels.idx1-ubyte
//! t10k-images.idx3-ubyte    t10k-labels.idx1-ubyte
//! ```
//!
//! Pixels are scaled to `[0, 1]`; images stay flat 28×28 in row-major order.

use super::Dataset;
use crate::architecture::{IMAGE_SIDE, NUM_INPUTS};
use crate::error::DataError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const IMAGES_MAGIC: u32 = 2051;
pub const LABELS_MAGIC: u32 = 2049;

const HEADER_IMAGES: usize = 16;
const HEADER_LABELS: usize = 8;

fn read_be_u32(data: &[u8], offset: &mut usize) -> Option<u32> {
    let bytes = data.get(*offset..*offset + 4)?;
    *offset += 4;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_file(path: &Path) -> Result<Vec<u8>, DataError> {
    fs::read(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn check_magic(path: &Path, expected: u32, found: u32) -> Result<(), DataError> {
    if found == expected {
        Ok(())
    } else {
        Err(DataError::BadMagic {
            path: path.to_path_buf(),
            expected,
            found,
        })
    }
}

/// Decode an IDX3 image buffer, keeping at most `limit` images.
pub fn parse_images(path: &Path, data: &[u8], limit: Option<usize>) -> Result<Vec<f32>, DataError> {
    let truncated = || DataError::Truncated {
        path: path.to_path_buf(),
    };
    // Magic first, so a swapped file is reported as such even when short.
    let mut offset = 0usize;
    let magic = read_be_u32(data, &mut offset).ok_or_else(truncated)?;
    check_magic(path, IMAGES_MAGIC, magic)?;
    if data.len() < HEADER_IMAGES {
        return Err(truncated());
    }
    let total = read_be_u32(data, &mut offset).ok_or_else(truncated)? as usize;
    let rows = read_be_u32(data, &mut offset).ok_or_else(truncated)? as usize;
    let cols = read_be_u32(data, &mut offset).ok_or_else(truncated)? as usize;

    if rows != IMAGE_SIDE || cols != IMAGE_SIDE {
        return Err(DataError::UnexpectedShape {
            path: path.to_path_buf(),
            rows,
            cols,
        });
    }

    let count = limit.map_or(total, |l| l.min(total));
    let total_bytes = count * NUM_INPUTS;
    let pixels = data
        .get(offset..offset + total_bytes)
        .ok_or_else(truncated)?;

    Ok(pixels.iter().map(|&p| f32::from(p) / 255.0).collect())
}

/// Decode an IDX1 label buffer, keeping at most `limit` labels.
pub fn parse_labels(path: &Path, data: &[u8], limit: Option<usize>) -> Result<Vec<u8>, DataError> {
    let truncated = || DataError::Truncated {
        path: path.to_path_buf(),
    };
    let mut offset = 0usize;
    let magic = read_be_u32(data, &mut offset).ok_or_else(truncated)?;
    check_magic(path, LABELS_MAGIC, magic)?;
    if data.len() < HEADER_LABELS {
        return Err(truncated());
    }
    let total = read_be_u32(data, &mut offset).ok_or_else(truncated)? as usize;

    let count = limit.map_or(total, |l| l.min(total));
    let labels = data.get(offset..offset + count).ok_or_else(truncated)?;
    Ok(labels.to_vec())
}

pub fn read_images(path: &Path, limit: Option<usize>) -> Result<Vec<f32>, DataError> {
    let data = read_file(path)?;
    parse_images(path, &data, limit)
}

pub fn read_labels(path: &Path, limit: Option<usize>) -> Result<Vec<u8>, DataError> {
    let data = read_file(path)?;
    parse_labels(path, &data, limit)
}

/// Resolve `{prefix}-{kind}.idx?-ubyte`, accepting both the dotted and the
/// dashed spelling. Falls back to the dotted path so the error names it.
fn locate(dir: &Path, prefix: &str, kind: &str, idx: u8) -> PathBuf {
    let dotted = dir.join(format!("{}-{}.idx{}-ubyte", prefix, kind, idx));
    if dotted.exists() {
        return dotted;
    }
    let dashed = dir.join(format!("{}-{}-idx{}-ubyte", prefix, kind, idx));
    if dashed.exists() {
        dashed
    } else {
        dotted
    }
}

/// Load one split (`"train"` or `"t10k"`) from `dir`.
pub fn load_split(dir: &Path, prefix: &str, limit: Option<usize>) -> Result<Dataset, DataError> {
    let images_path = locate(dir, prefix, "images", 3);
    let labels_path = locate(dir, prefix, "labels", 1);
    debug!(images = %images_path.display(), labels = %labels_path.display(), "reading MNIST split");

    let images = read_images(&images_path, limit)?;
    let labels = read_labels(&labels_path, limit)?;
    Dataset::new(images, labels, NUM_INPUTS)
}

/// Training and test splits, each optionally capped.
pub fn load_mnist(
    dir: &Path,
    max_train: Option<usize>,
    max_test: Option<usize>,
) -> Result<(Dataset, Dataset), DataError> {
    let train = load_split(dir, "train", max_train)?;
    let test = load_split(dir, "t10k", max_test)?;
    info!(train = train.len(), test = test.len(), dir = %dir.display(), "loaded MNIST");
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(magic: u32, dims: &[u32]) -> Vec<u8> {
        let mut bytes = magic.to_be_bytes().to_vec();
        for d in dims {
            bytes.extend_from_slice(&d.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_parse_images_scales_pixels() {
        let mut data = header(IMAGES_MAGIC, &[2, 28, 28]);
        data.extend(std::iter::repeat(255u8).take(NUM_INPUTS));
        data.extend(std::iter::repeat(0u8).take(NUM_INPUTS));

        let images = parse_images(Path::new("img"), &data, None).unwrap();
        assert_eq!(images.len(), 2 * NUM_INPUTS);
        assert_eq!(images[0], 1.0);
        assert_eq!(images[NUM_INPUTS], 0.0);

        let one = parse_images(Path::new("img"), &data, Some(1)).unwrap();
        assert_eq!(one.len(), NUM_INPUTS);
    }

    #[test]
    fn test_parse_images_errors() {
        let data = header(LABELS_MAGIC, &[1, 28, 28]);
        assert!(matches!(
            parse_images(Path::new("img"), &data, None),
            Err(DataError::BadMagic { found: LABELS_MAGIC, .. })
        ));

        let data = header(IMAGES_MAGIC, &[1, 32, 32]);
        assert!(matches!(
            parse_images(Path::new("img"), &data, None),
            Err(DataError::UnexpectedShape { rows: 32, cols: 32, .. })
        ));

        let mut data = header(IMAGES_MAGIC, &[1, 28, 28]);
        data.extend_from_slice(&[0u8; 10]);
        assert!(matches!(
            parse_images(Path::new("img"), &data, None),
            Err(DataError::Truncated { .. })
        ));
    }

    #[test]
    fn test_parse_labels() {
        let mut data = header(LABELS_MAGIC, &[3]);
        data.extend_from_slice(&[7, 0, 9]);
        assert_eq!(parse_labels(Path::new("lbl"), &data, None).unwrap(), vec![7, 0, 9]);
        assert_eq!(parse_labels(Path::new("lbl"), &data, Some(2)).unwrap(), vec![7, 0]);
        assert!(parse_labels(Path::new("lbl"), &data[..9], None).is_err());
    }

    #[test]
    fn test_short_swapped_file_reports_magic() {
        // A one-label IDX1 file is shorter than an image header.
        let mut data = header(LABELS_MAGIC, &[1]);
        data.push(3);
        assert!(matches!(
            parse_images(Path::new("img"), &data, None),
            Err(DataError::BadMagic { found: LABELS_MAGIC, .. })
        ));

        let data = header(IMAGES_MAGIC, &[1]);
        assert!(matches!(
            parse_images(Path::new("img"), &data, None),
            Err(DataError::Truncated { .. })
        ));
        assert!(matches!(
            parse_labels(Path::new("lbl"), &[0, 0], None),
            Err(DataError::Truncated { .. })
        ));
    }
}
