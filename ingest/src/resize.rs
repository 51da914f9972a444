//! This module provides the [resize_all] function, which writes medium and small derivatives of each candidate
//! next to its original.

use {
    crate::{candidate::Candidate, error::IngestError},
    anyhow::{anyhow, Result},
    image::{
        codecs::jpeg::JpegEncoder, imageops::FilterType, ColorType, DynamicImage, GenericImageView,
        ImageFormat, ImageOutputFormat,
    },
    rexiv2::{Metadata as ExifMetadata, Orientation},
    std::{
        fs::{self, File},
        io::{BufReader, BufWriter, ErrorKind, Write},
        path::{Path, PathBuf},
    },
    tempfile::NamedTempFile,
    tokio::task,
    tracing::{debug, info},
};

pub const MEDIUM_WIDTH: u32 = 600;

pub const SMALL_WIDTH: u32 = 300;

const JPEG_QUALITY: u8 = 100;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Size {
    Medium,
    Small,
}

pub const SIZES: &[Size] = &[Size::Medium, Size::Small];

impl Size {
    /// Marker appended to the file stem of a derivative of this size
    pub fn suffix(self) -> &'static str {
        match self {
            Size::Medium => "-medium",
            Size::Small => "-small",
        }
    }

    pub fn width(self) -> u32 {
        match self {
            Size::Medium => MEDIUM_WIDTH,
            Size::Small => SMALL_WIDTH,
        }
    }
}

/// Calculate the path of the `size` derivative of the image at `path`, e.g. "/photos/cat-small.jpg" for
/// "/photos/cat.jpg".
pub fn derivative_path(path: &Path, size: Size) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| anyhow!("bad file name: {}", path.display()))?;

    Ok(path.with_file_name(
        if let Some(extension) = path.extension().and_then(|extension| extension.to_str()) {
            format!("{}{}.{}", stem, size.suffix(), extension)
        } else {
            format!("{}{}", stem, size.suffix())
        },
    ))
}

fn format(path: &Path) -> Result<ImageFormat> {
    match path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => Ok(ImageFormat::Jpeg),
        Some("png") => Ok(ImageFormat::Png),
        _ => Err(IngestError::UnsupportedFormat(path.to_owned()).into()),
    }
}

/// Scale `native` to `width`, preserving the aspect ratio.
fn bound((native_width, native_height): (u32, u32), width: u32) -> (u32, u32) {
    let height = (u64::from(native_height) * u64::from(width) + u64::from(native_width) / 2)
        / u64::from(native_width.max(1));

    (width, u32::try_from(height.max(1)).unwrap_or(u32::MAX))
}

fn orient(image: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Normal | Orientation::Unspecified => image,
        Orientation::HorizontalFlip => image.fliph(),
        Orientation::Rotate180 => image.rotate180(),
        Orientation::VerticalFlip => image.flipv(),
        Orientation::Rotate90HorizontalFlip => image.rotate90().fliph(),
        Orientation::Rotate90 => image.rotate90(),
        Orientation::Rotate90VerticalFlip => image.rotate90().flipv(),
        Orientation::Rotate270 => image.rotate270(),
    }
}

fn encode(image: &DynamicImage, format: ImageFormat, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("no parent directory: {}", path.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)?;

    {
        let mut output = BufWriter::new(tmp.as_file_mut());

        match format {
            ImageFormat::Jpeg => {
                let rgb = image.to_rgb8();

                JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY).encode(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ColorType::Rgb8,
                )?
            }
            _ => image.write_to(&mut output, ImageOutputFormat::Png)?,
        }

        output.flush()?;
    }

    tmp.persist(path)?;

    Ok(())
}

/// Write the `size` derivative of the image at `path`, returning the path of the derivative.
///
/// If a file already exists at the derivative path, it is assumed to be the output of an earlier run and is reused
/// as-is.
pub fn resize(path: &Path, size: Size) -> Result<PathBuf> {
    let resized = derivative_path(path, size)?;

    match fs::metadata(&resized) {
        Ok(metadata) if metadata.is_dir() => {
            return Err(IngestError::DerivativeIsDirectory(resized).into())
        }
        Ok(_) => {
            debug!("derivative {} already exists", resized.display());

            return Ok(resized);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => (),
        Err(e) => return Err(e.into()),
    }

    let format = format(path)?;

    let original = image::load(BufReader::new(File::open(path)?), format)?;

    let orientation = ExifMetadata::new_from_path(path)
        .map(|metadata| metadata.get_orientation())
        .unwrap_or(Orientation::Normal);

    let oriented = orient(original, orientation);

    let (width, height) = bound(oriented.dimensions(), size.width());

    encode(
        &oriented.resize_exact(width, height, FilterType::CatmullRom),
        format,
        &resized,
    )?;

    Ok(resized)
}

/// Write medium and small derivatives for each candidate, recording their paths.
pub async fn resize_all(candidates: &mut [Candidate]) -> Result<()> {
    info!("resizing images");

    let len = candidates.len();

    for (index, candidate) in candidates.iter_mut().enumerate() {
        let path = &candidate.path;

        candidate.medium_path = Some(task::block_in_place(|| resize(path, Size::Medium))?);
        candidate.small_path = Some(task::block_in_place(|| resize(path, Size::Small))?);

        info!("({} of {}) resized {}", index + 1, len, candidate.path.display());
    }

    Ok(())
}
