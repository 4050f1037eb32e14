use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;

/// Per-frame decode failures. Reported back to the client for the failed
/// frame only; they never terminate the connection.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty frame payload")]
    EmptyPayload,
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("undecodable image: {0}")]
    InvalidImage(#[from] image::ImageError),
}

/// Decodes the textual wire payload into owned compressed-image bytes.
/// Runs on the receive path, so it does no pixel work. Payloads produced by
/// `canvas.toDataURL()` carry a `data:image/jpeg;base64,` prefix which is
/// stripped here.
pub fn decode_payload(data: &str) -> Result<Vec<u8>, DecodeError> {
    let b64 = match data.split_once(',') {
        Some((_, tail)) => tail,
        None => data,
    };
    let b64 = b64.trim();
    if b64.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    Ok(BASE64.decode(b64)?)
}

/// Decodes compressed image bytes into the canonical RGB frame.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Bilinear resize to the dimensions picked by the scaler.
pub fn resize(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    image::imageops::resize(image, width, height, FilterType::Triangle)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(image)?;
    Ok(buf.into_inner())
}

pub fn encode_jpeg_base64(image: &RgbImage, quality: u8) -> Result<String, DecodeError> {
    Ok(BASE64.encode(encode_jpeg(image, quality)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn sample_image() -> RgbImage {
        RgbImage::from_fn(16, 12, |x, _| {
            if x < 8 {
                Rgb([200, 120, 90])
            } else {
                Rgb([10, 10, 10])
            }
        })
    }

    #[test]
    fn test_payload_data_url_prefix_stripped() -> anyhow::Result<()> {
        let jpeg = encode_jpeg(&sample_image(), 90)?;
        let plain = BASE64.encode(&jpeg);
        let with_prefix = format!("data:image/jpeg;base64,{}", plain);
        assert_eq!(decode_payload(&plain)?, decode_payload(&with_prefix)?);
        Ok(())
    }

    #[test]
    fn test_payload_rejects_garbage() {
        assert!(matches!(
            decode_payload("@@not-base64@@"),
            Err(DecodeError::InvalidBase64(_))
        ));
        assert!(matches!(decode_payload(""), Err(DecodeError::EmptyPayload)));
    }

    #[test]
    fn test_image_decode_roundtrip_dimensions() -> anyhow::Result<()> {
        let jpeg = encode_jpeg(&sample_image(), 90)?;
        let decoded = decode_image(&jpeg)?;
        assert_eq!(decoded.dimensions(), (16, 12));
        Ok(())
    }

    #[test]
    fn test_image_decode_rejects_non_image() {
        assert!(matches!(
            decode_image(b"definitely not a jpeg"),
            Err(DecodeError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_resize_dimensions() {
        let resized = resize(&sample_image(), 8, 6);
        assert_eq!(resized.dimensions(), (8, 6));
    }
}
