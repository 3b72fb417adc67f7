//! Compressed frames and the image codec.

use image::codecs::{jpeg::JpegEncoder, png::PngEncoder};
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("unsupported frame format `{0}`")]
    UnsupportedFormat(String),
    #[error("empty frame payload")]
    Empty,
    #[error("frame decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("frame encode failed: {0}")]
    Encode(#[source] image::ImageError),
}

/// Wall-clock timestamp, nanoseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stamp(pub u64);

impl Stamp {
    pub fn now() -> Self {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(u64::try_from(since.as_nanos()).unwrap_or(u64::MAX))
    }
}

/// Compressed image encodings understood by the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameFormat {
    Jpeg,
    Png,
}

impl FrameFormat {
    /// Parse a message format tag.
    ///
    /// Matching is case-insensitive and by substring, so ROS-style tags like
    /// `"rgb8; jpeg compressed bgr8"` are accepted.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.to_ascii_lowercase();
        if tag.contains("jpeg") || tag.contains("jpg") {
            Some(Self::Jpeg)
        } else if tag.contains("png") {
            Some(Self::Png)
        } else {
            None
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
        }
    }
}

/// Compressed image message as carried by ingress and egress channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedImage {
    pub format: String,
    pub data: Vec<u8>,
    pub stamp: Stamp,
}

impl CompressedImage {
    pub fn new(format: impl Into<String>, data: Vec<u8>, stamp: Stamp) -> Self {
        Self {
            format: format.into(),
            data,
            stamp,
        }
    }
}

/// A compressed image accepted by the mailbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedFrame {
    /// Mailbox sequence number, starting at 1.
    pub seq: u64,
    /// When the frame reached the mailbox.
    pub arrived: Stamp,
    pub image: CompressedImage,
}

/// Decode a compressed message into an RGB image.
pub fn decode_frame(msg: &CompressedImage) -> Result<(FrameFormat, RgbImage), FrameError> {
    let format = FrameFormat::from_tag(&msg.format)
        .ok_or_else(|| FrameError::UnsupportedFormat(msg.format.clone()))?;
    if msg.data.is_empty() {
        return Err(FrameError::Empty);
    }
    let decoded = image::load_from_memory_with_format(&msg.data, format.image_format())
        .map_err(FrameError::Decode)?;
    Ok((format, decoded.to_rgb8()))
}

/// Encode an RGB image; `jpeg_quality` is clamped to `1..=100`.
pub fn encode_frame(
    img: &RgbImage,
    format: FrameFormat,
    jpeg_quality: u8,
) -> Result<Vec<u8>, FrameError> {
    let mut buf = Vec::new();
    let written = match format {
        FrameFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality.clamp(1, 100));
            img.write_with_encoder(encoder)
        }
        FrameFormat::Png => img.write_with_encoder(PngEncoder::new(&mut buf)),
    };
    written.map_err(FrameError::Encode)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn format_tags() {
        assert_eq!(FrameFormat::from_tag("jpeg"), Some(FrameFormat::Jpeg));
        assert_eq!(FrameFormat::from_tag("JPG"), Some(FrameFormat::Jpeg));
        assert_eq!(
            FrameFormat::from_tag("rgb8; jpeg compressed bgr8"),
            Some(FrameFormat::Jpeg)
        );
        assert_eq!(FrameFormat::from_tag("png"), Some(FrameFormat::Png));
        assert_eq!(FrameFormat::from_tag("h264"), None);
    }

    #[test]
    fn png_is_lossless() {
        let img = RgbImage::from_fn(17, 9, |x, y| Rgb([x as u8 * 10, y as u8 * 20, 7]));
        let bytes = encode_frame(&img, FrameFormat::Png, 90).expect("encode");
        let msg = CompressedImage::new("png", bytes, Stamp(1));
        let (format, back) = decode_frame(&msg).expect("decode");
        assert_eq!(format, FrameFormat::Png);
        assert_eq!(back, img);
    }

    #[test]
    fn corrupt_payloads_are_errors() {
        let garbage = CompressedImage::new("jpeg", vec![0xFF, 0xD8, 0x00, 0x13], Stamp(0));
        assert!(matches!(decode_frame(&garbage), Err(FrameError::Decode(_))));

        let empty = CompressedImage::new("jpeg", Vec::new(), Stamp(0));
        assert!(matches!(decode_frame(&empty), Err(FrameError::Empty)));

        let unknown = CompressedImage::new("bmp", vec![1, 2, 3], Stamp(0));
        assert!(matches!(
            decode_frame(&unknown),
            Err(FrameError::UnsupportedFormat(_))
        ));
    }
}
