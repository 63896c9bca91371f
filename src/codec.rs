//! The image codec seam and the bundled native codec.
//!
//! The repository engine never decodes pixels itself; it hands image
//! payloads to an [`ImageCodec`] together with the target filename and,
//! on read, an optional extract geometry it forwards verbatim. The
//! bundled [`MpcCodec`] stores images in a native format that needs no
//! decode on read: a small header file plus a raw pixel sibling
//! (`<id>.cache`) that can be memory-mapped and sampled directly.

use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use binrw::{binrw, BinRead, BinWrite};
use bytes::Bytes;
use log::trace;

use crate::{
    error::{CacheResult, CodecErrorKind},
    filesystem,
};

/// Bytes per pixel; pixels are row-major RGBA8.
const PIXEL_EXTENT: u64 = 4;

/// A decoded image: dimensions plus raw RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    columns: u64,
    rows: u64,
    pixels: Bytes,
}

impl Image {
    /// Builds an image from dimensions and raw RGBA8 pixels.
    ///
    /// # Errors
    ///
    /// * [`CodecErrorKind::InconsistentDimensions`] - If the pixel buffer does not hold `columns * rows` pixels
    pub fn new(columns: u64, rows: u64, pixels: impl Into<Bytes>) -> CacheResult<Self> {
        let pixels = pixels.into();
        let extent = columns.saturating_mul(rows).saturating_mul(PIXEL_EXTENT);
        if extent != pixels.len() as u64 {
            return Err(CodecErrorKind::InconsistentDimensions.into());
        }
        Ok(Self {
            columns,
            rows,
            pixels,
        })
    }

    /// Image width in pixels.
    #[must_use]
    pub fn columns(&self) -> u64 {
        self.columns
    }

    /// Image height in pixels.
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// The raw RGBA8 pixel bytes, row-major.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn pixel(&self, x: u64, y: u64) -> &[u8] {
        let offset = ((y * self.columns + x) * PIXEL_EXTENT) as usize;
        &self.pixels[offset..offset + PIXEL_EXTENT as usize]
    }
}

/// The adapter through which the repository engine reads and writes image
/// payloads.
///
/// Implementations own the on-disk format, the extract-geometry syntax and
/// the (optional) passphrase handling; the engine merely forwards both
/// opaquely.
pub trait ImageCodec: std::fmt::Debug + Send + Sync {
    /// Writes `image` to `path` in the codec's native format.
    fn write_image(
        &self,
        image: &Image,
        path: &Path,
        passphrase: Option<&[u8]>,
    ) -> CacheResult<()>;

    /// Reads the image stored at `path`, optionally reduced by an extract
    /// geometry (`WxH+X+Y` crops, `WxH` resizes preserving aspect).
    fn read_image(
        &self,
        path: &Path,
        extract: Option<&str>,
        passphrase: Option<&[u8]>,
    ) -> CacheResult<Image>;
}

/// An extract geometry, as understood by the bundled codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Geometry {
    /// Crop to the `width x height` rectangle at offset `(x, y)`
    Crop { width: u64, height: u64, x: u64, y: u64 },
    /// Resize into a `width x height` box, preserving aspect
    Resize { width: u64, height: u64 },
}

impl Geometry {
    fn parse(geometry: &str) -> Result<Self, CodecErrorKind> {
        let invalid = || CodecErrorKind::InvalidGeometry(geometry.to_string());

        let (extent, offsets) = match geometry.split_once('+') {
            Some((extent, offsets)) => (extent, Some(offsets)),
            None => (geometry, None),
        };
        let (width, height) = extent.split_once('x').ok_or_else(invalid)?;
        let width = width.parse().map_err(|_| invalid())?;
        let height = height.parse().map_err(|_| invalid())?;

        match offsets {
            None => Ok(Self::Resize { width, height }),
            Some(offsets) => {
                let (x, y) = offsets.split_once('+').ok_or_else(invalid)?;
                let x = x.parse().map_err(|_| invalid())?;
                let y = y.parse().map_err(|_| invalid())?;
                Ok(Self::Crop {
                    width,
                    height,
                    x,
                    y,
                })
            }
        }
    }
}

/// The header file layout of the bundled codec.
#[binrw]
#[brw(little, magic = b"MPCF")]
struct MpcHeader {
    columns: u64,
    rows: u64,
}

/// The bundled native codec.
///
/// `<path>` holds the header, `<path>.cache` the raw pixels. Reads map the
/// pixel sibling when the platform allows it. A passphrase is accepted for
/// interface compatibility and ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct MpcCodec;

impl MpcCodec {
    fn pixel_path(path: &Path) -> PathBuf {
        let mut sibling = path.as_os_str().to_os_string();
        sibling.push(".cache");
        sibling.into()
    }

    fn crop(image: &Image, width: u64, height: u64, x: u64, y: u64) -> CacheResult<Image> {
        let columns = width.min(image.columns.saturating_sub(x));
        let rows = height.min(image.rows.saturating_sub(y));
        let mut pixels = Vec::with_capacity((columns * rows * PIXEL_EXTENT) as usize);
        for row in y..y + rows {
            let offset = ((row * image.columns + x) * PIXEL_EXTENT) as usize;
            pixels.extend_from_slice(&image.pixels[offset..offset + (columns * PIXEL_EXTENT) as usize]);
        }
        Image::new(columns, rows, pixels)
    }

    fn resize(image: &Image, width: u64, height: u64) -> CacheResult<Image> {
        if width == 0 || height == 0 || image.columns == 0 || image.rows == 0 {
            return Err(
                CodecErrorKind::InvalidGeometry(format!("{width}x{height}")).into(),
            );
        }
        // fit into the requested box, preserving aspect
        let scale = (width as f64 / image.columns as f64).min(height as f64 / image.rows as f64);
        let columns = ((image.columns as f64 * scale).round() as u64).max(1);
        let rows = ((image.rows as f64 * scale).round() as u64).max(1);
        let mut pixels = Vec::with_capacity((columns * rows * PIXEL_EXTENT) as usize);
        for y in 0..rows {
            let source_y = (y * image.rows / rows).min(image.rows - 1);
            for x in 0..columns {
                let source_x = (x * image.columns / columns).min(image.columns - 1);
                pixels.extend_from_slice(image.pixel(source_x, source_y));
            }
        }
        Image::new(columns, rows, pixels)
    }
}

impl ImageCodec for MpcCodec {
    fn write_image(
        &self,
        image: &Image,
        path: &Path,
        _passphrase: Option<&[u8]>,
    ) -> CacheResult<()> {
        trace!("writing {}x{} image to {path:?}", image.columns, image.rows);
        let header = MpcHeader {
            columns: image.columns,
            rows: image.rows,
        };
        let mut cursor = Cursor::new(Vec::new());
        header
            .write(&mut cursor)
            .map_err(CodecErrorKind::MalformedImageHeader)?;
        filesystem::bytes_to_file(path, &cursor.into_inner())?;
        filesystem::bytes_to_file(&Self::pixel_path(path), image.pixels())?;
        Ok(())
    }

    fn read_image(
        &self,
        path: &Path,
        extract: Option<&str>,
        _passphrase: Option<&[u8]>,
    ) -> CacheResult<Image> {
        trace!("reading image from {path:?}, extract {extract:?}");
        let header_bytes = filesystem::file_to_bytes(path)?;
        let header = MpcHeader::read(&mut Cursor::new(&header_bytes[..])).map_err(|err| {
            match err {
                binrw::Error::BadMagic { .. } => CodecErrorKind::WrongImageMagic(path.to_path_buf()),
                err => CodecErrorKind::MalformedImageHeader(err),
            }
        })?;

        let pixel_path = Self::pixel_path(path);
        let pixels = match filesystem::map_file(&pixel_path) {
            Some(region) => Bytes::copy_from_slice(&region[..]),
            None => filesystem::file_to_bytes(&pixel_path)?,
        };
        let extent = header
            .columns
            .saturating_mul(header.rows)
            .saturating_mul(PIXEL_EXTENT);
        if pixels.len() as u64 != extent {
            return Err(CodecErrorKind::TruncatedPixels { path: pixel_path }.into());
        }
        let image = Image::new(header.columns, header.rows, pixels)?;

        match extract {
            None => Ok(image),
            Some(geometry) => match Geometry::parse(geometry)? {
                Geometry::Crop {
                    width,
                    height,
                    x,
                    y,
                } => Self::crop(&image, width, height, x, y),
                Geometry::Resize { width, height } => Self::resize(&image, width, height),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::tempdir;

    use super::*;

    /// A deterministic gradient so resampled pixels are easy to predict.
    fn gradient(columns: u64, rows: u64) -> Image {
        let mut pixels = Vec::with_capacity((columns * rows * PIXEL_EXTENT) as usize);
        for y in 0..rows {
            for x in 0..columns {
                pixels.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 0x7f, 0xff]);
            }
        }
        Image::new(columns, rows, pixels).unwrap()
    }

    #[test]
    fn test_image_rejects_inconsistent_dimensions() {
        assert!(Image::new(2, 2, vec![0u8; 15]).is_err());
    }

    #[test]
    fn test_write_read_round_trip_passes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rose");
        let rose = gradient(70, 46);

        MpcCodec.write_image(&rose, &path, None).unwrap();
        let read_back = MpcCodec.read_image(&path, None, None).unwrap();

        assert_eq!(read_back, rose);
        assert!(path.exists());
        assert!(MpcCodec::pixel_path(&path).exists());
    }

    #[test]
    fn test_crop_extract_returns_tile() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rose");
        let rose = gradient(70, 46);
        MpcCodec.write_image(&rose, &path, None).unwrap();

        let tile = MpcCodec.read_image(&path, Some("35x23+0+0"), None).unwrap();

        assert_eq!((tile.columns(), tile.rows()), (35, 23));
        assert_eq!(tile.pixel(3, 7), rose.pixel(3, 7));
    }

    #[test]
    fn test_crop_is_clamped_to_bounds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rose");
        MpcCodec.write_image(&gradient(70, 46), &path, None).unwrap();

        let tile = MpcCodec.read_image(&path, Some("100x100+60+40"), None).unwrap();

        assert_eq!((tile.columns(), tile.rows()), (10, 6));
    }

    #[test]
    fn test_resize_extract_preserves_aspect() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rose");
        MpcCodec.write_image(&gradient(70, 46), &path, None).unwrap();

        let resized = MpcCodec.read_image(&path, Some("35x23"), None).unwrap();

        assert_eq!((resized.columns(), resized.rows()), (35, 23));
    }

    #[rstest]
    #[case("")]
    #[case("35")]
    #[case("axb")]
    #[case("35x23+1")]
    #[case("35x23+1+2+3")]
    fn test_invalid_geometry_fails(#[case] geometry: &str) {
        assert!(Geometry::parse(geometry).is_err(), "{geometry:?} parsed");
    }

    #[test]
    fn test_wrong_magic_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("not-an-image");
        filesystem::bytes_to_file(&path, b"PNG\x0d\x0a\x1a\x0arubbish").unwrap();

        let err = MpcCodec.read_image(&path, None, None).unwrap_err();

        assert!(
            matches!(
                err,
                crate::error::MagickCacheError::CodecError(CodecErrorKind::WrongImageMagic(_))
            ),
            "unexpected error: {err}"
        );
    }
}
