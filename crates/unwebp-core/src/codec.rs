//! Pixel decode/encode behind a small trait.
//!
//! The pipeline only needs "bytes in, RGBA pixels out" and "RGBA pixels in,
//! file on disk out". [`ImageCodec`] implements that with the `image` crate;
//! tests swap in a fake that needs no real image data.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, ImageReader};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Cursor};
use std::path::Path;

use crate::error::CodecError;

/// Decoded RGBA8 image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Row-major RGBA pixels, 4 bytes per pixel
    pub pixels: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

/// Source decoder and destination encoder.
///
/// Both methods are blocking; callers run them on the blocking pool.
pub trait Codec: Send + Sync {
    /// Decode source file bytes into RGBA pixels.
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError>;

    /// Write `image` to `destination`. Must fail rather than overwrite an
    /// existing file.
    fn encode(&self, image: &DecodedImage, destination: &Path) -> Result<(), CodecError>;
}

/// `image`-crate codec: decodes one source format, encodes PNG.
#[derive(Debug, Clone, Copy)]
pub struct ImageCodec {
    source_format: ImageFormat,
}

impl Default for ImageCodec {
    fn default() -> Self {
        Self {
            source_format: ImageFormat::WebP,
        }
    }
}

impl ImageCodec {
    /// Codec for sources with the given file extension, if `image` knows it.
    pub fn for_extension(extension: &str) -> Option<Self> {
        ImageFormat::from_extension(extension).map(|source_format| Self { source_format })
    }

    /// The format sources are decoded as.
    pub fn source_format(&self) -> ImageFormat {
        self.source_format
    }
}

impl Codec for ImageCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
        let reader = ImageReader::with_format(Cursor::new(bytes), self.source_format);
        let image = reader.decode().map_err(|e| CodecError(e.to_string()))?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(DecodedImage {
            pixels: rgba.into_raw(),
            width,
            height,
        })
    }

    fn encode(&self, image: &DecodedImage, destination: &Path) -> Result<(), CodecError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(|e| CodecError(format!("cannot create {}: {e}", destination.display())))?;

        let result = write_png(file, image);
        if result.is_err() {
            // We created the file, so a partial one is ours to remove.
            if let Err(e) = std::fs::remove_file(destination) {
                tracing::warn!(
                    file = %destination.display(),
                    error = %e,
                    "Failed to remove partial output"
                );
            }
        }
        result
    }
}

fn write_png(file: File, image: &DecodedImage) -> Result<(), CodecError> {
    let expected = image.width as usize * image.height as usize * 4;
    if image.pixels.len() != expected {
        return Err(CodecError(format!(
            "pixel buffer is {} bytes, expected {expected} for {}x{} RGBA",
            image.pixels.len(),
            image.width,
            image.height
        )));
    }

    let mut writer = BufWriter::new(file);
    PngEncoder::new(&mut writer)
        .write_image(
            &image.pixels,
            image.width,
            image.height,
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| CodecError(e.to_string()))?;

    let file = writer
        .into_inner()
        .map_err(|e| CodecError(e.into_error().to_string()))?;
    file.sync_all().map_err(|e| CodecError(e.to_string()))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use image::{DynamicImage, Rgba, RgbaImage};

    /// Encode a solid-colour lossless WebP.
    pub fn webp_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buffer, ImageFormat::WebP)
            .unwrap();
        buffer.into_inner()
    }

    /// Codec double: bytes starting with `GOOD` decode to a 1x1 pixel, anything
    /// else is corrupt. Encoding writes a marker file unless `fail_encode` is set.
    #[derive(Default)]
    pub struct FakeCodec {
        pub fail_encode: bool,
    }

    impl FakeCodec {
        pub fn failing_encode() -> Self {
            Self { fail_encode: true }
        }
    }

    impl Codec for FakeCodec {
        fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
            if bytes.starts_with(b"GOOD") {
                Ok(DecodedImage {
                    pixels: vec![255, 0, 0, 255],
                    width: 1,
                    height: 1,
                })
            } else {
                Err(CodecError("not a fake image".into()))
            }
        }

        fn encode(&self, _image: &DecodedImage, destination: &Path) -> Result<(), CodecError> {
            if self.fail_encode {
                return Err(CodecError("disk full".into()));
            }
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(destination)
                .map_err(|e| CodecError(e.to_string()))?;
            std::io::Write::write_all(&mut file, b"PNG").map_err(|e| CodecError(e.to_string()))
        }
    }

    /// `FakeCodec` whose decode takes `delay` and tracks how many decodes
    /// overlap.
    pub struct SlowCodec {
        inner: FakeCodec,
        delay: Duration,
        started: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowCodec {
        pub fn new(delay: Duration) -> Self {
            Self {
                inner: FakeCodec::default(),
                delay,
                started: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        /// Decodes begun so far.
        pub fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        /// Most decodes ever running at the same time.
        pub fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    impl Codec for SlowCodec {
        fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.inner.decode(bytes)
        }

        fn encode(&self, image: &DecodedImage, destination: &Path) -> Result<(), CodecError> {
            self.inner.encode(image, destination)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::webp_bytes;
    use super::*;

    #[test]
    fn test_for_extension() {
        let codec = ImageCodec::for_extension("webp").unwrap();
        assert_eq!(codec.source_format(), ImageFormat::WebP);
        assert!(ImageCodec::for_extension("definitely-not-an-image").is_none());
    }

    #[test]
    fn test_webp_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let codec = ImageCodec::default();

        let decoded = codec.decode(&webp_bytes(8, 4)).unwrap();
        assert_eq!((decoded.width, decoded.height), (8, 4));
        assert_eq!(decoded.pixels.len(), 8 * 4 * 4);
        assert_eq!(&decoded.pixels[..4], &[10, 20, 30, 255]);

        let dest = dir.path().join("out.png");
        codec.encode(&decoded, &dest).unwrap();
        let written = std::fs::read(&dest).unwrap();
        assert_eq!(&written[1..4], b"PNG");

        let reloaded = image::open(&dest).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (8, 4));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = ImageCodec::default();
        assert!(codec.decode(b"RIFF\0\0\0\0garbage").is_err());
        assert!(codec.decode(&[]).is_err());
    }

    #[test]
    fn test_failed_encode_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("short.png");
        let truncated = DecodedImage {
            pixels: vec![0; 7],
            width: 2,
            height: 2,
        };

        let err = ImageCodec::default().encode(&truncated, &dest).unwrap_err();
        assert!(err.to_string().contains("pixel buffer"));
        assert!(!dest.exists());
    }

    #[test]
    fn test_encode_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("taken.png");
        std::fs::write(&dest, b"existing").unwrap();

        let codec = ImageCodec::default();
        let decoded = codec.decode(&webp_bytes(2, 2)).unwrap();
        assert!(codec.encode(&decoded, &dest).is_err());
        assert_eq!(std::fs::read(&dest).unwrap(), b"existing");
    }
}
