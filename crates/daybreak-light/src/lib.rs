use image::imageops::FilterType;
use thiserror::Error;

/// Calibrated approval band, inclusive on both ends. Below the minimum the
/// shot is judged indoor/underexposed; above the maximum it is washed out
/// (camera pointed at a lamp or a white wall), which would be an easy way
/// to cheat the check. Values are product-calibrated; do not retune here.
pub const MIN_BRIGHTNESS: u8 = 80;
pub const MAX_BRIGHTNESS: u8 = 250;

/// Inputs are downsampled to this square canvas before scoring, so cost is
/// bounded regardless of source resolution.
pub const SAMPLE_DIM: u32 = 100;

/// Hard cap on the encoded payload we are willing to decode.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Brightness score and verdict for one submitted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightReading {
    pub brightness: u8,
    pub approved: bool,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("image of {0} bytes exceeds the processing limit")]
    TooLarge(usize),

    #[error("could not decode image: {0}")]
    Undecodable(String),
}

/// Scores raw image bytes for natural-light exposure.
///
/// Trait seam exists so the lifecycle engine can be exercised with a
/// deterministic double; production wiring uses [`LumaAnalyzer`].
pub trait LightAnalyzer: Send + Sync {
    fn analyze(&self, bytes: &[u8]) -> Result<LightReading, AnalyzeError>;
}

/// Production analyzer: decode, downsample to SAMPLE_DIM², take the mean
/// Rec.601 luma over all samples. Pure — same bytes, same reading.
#[derive(Debug, Default, Clone, Copy)]
pub struct LumaAnalyzer;

impl LightAnalyzer for LumaAnalyzer {
    fn analyze(&self, bytes: &[u8]) -> Result<LightReading, AnalyzeError> {
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(AnalyzeError::TooLarge(bytes.len()));
        }

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| AnalyzeError::Undecodable(e.to_string()))?;

        let samples = decoded
            .resize_exact(SAMPLE_DIM, SAMPLE_DIM, FilterType::Nearest)
            .to_rgb8();

        let mut total = 0.0f64;
        for px in samples.pixels() {
            let [r, g, b] = px.0;
            total += 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
        }
        let mean = total / (SAMPLE_DIM * SAMPLE_DIM) as f64;
        let brightness = mean.round().clamp(0.0, 255.0) as u8;

        let (approved, message) = verdict(brightness);
        Ok(LightReading {
            brightness,
            approved,
            message,
        })
    }
}

/// Verdict for a given brightness score against the approval band.
pub fn verdict(brightness: u8) -> (bool, String) {
    if brightness < MIN_BRIGHTNESS {
        (
            false,
            "Image too dark. Take the selfie somewhere with more natural light.".into(),
        )
    } else if brightness > MAX_BRIGHTNESS {
        (
            false,
            "Image too bright. Avoid pointing the camera straight at a light source.".into(),
        )
    } else {
        (true, "Natural light verified.".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Solid-color PNG; for gray pixels (v, v, v) the Rec.601 luma is
    /// exactly v, which makes band edges easy to pin down.
    fn solid_png(r: u8, g: u8, b: u8) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([r, g, b]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn analyze(bytes: &[u8]) -> LightReading {
        LumaAnalyzer.analyze(bytes).unwrap()
    }

    #[test]
    fn dark_image_rejected() {
        let reading = analyze(&solid_png(10, 10, 10));
        assert_eq!(reading.brightness, 10);
        assert!(!reading.approved);
        assert!(reading.message.contains("too dark"));
    }

    #[test]
    fn just_below_band_rejected() {
        let reading = analyze(&solid_png(79, 79, 79));
        assert_eq!(reading.brightness, 79);
        assert!(!reading.approved);
        assert!(reading.message.contains("too dark"));
    }

    #[test]
    fn band_edges_approved() {
        for v in [MIN_BRIGHTNESS, 120, 200, MAX_BRIGHTNESS] {
            let reading = analyze(&solid_png(v, v, v));
            assert_eq!(reading.brightness, v);
            assert!(reading.approved, "brightness {} should pass", v);
        }
    }

    #[test]
    fn overexposed_image_rejected() {
        let reading = analyze(&solid_png(255, 255, 255));
        assert_eq!(reading.brightness, 255);
        assert!(!reading.approved);
        assert!(reading.message.contains("too bright"));
    }

    #[test]
    fn just_above_band_rejected() {
        let reading = analyze(&solid_png(251, 251, 251));
        assert_eq!(reading.brightness, 251);
        assert!(!reading.approved);
    }

    #[test]
    fn color_weighting_follows_rec601() {
        // Pure green: 0.587 * 255 ≈ 150 — inside the band.
        let reading = analyze(&solid_png(0, 255, 0));
        assert_eq!(reading.brightness, 150);
        assert!(reading.approved);

        // Pure blue: 0.114 * 255 ≈ 29 — too dark despite full saturation.
        let reading = analyze(&solid_png(0, 0, 255));
        assert_eq!(reading.brightness, 29);
        assert!(!reading.approved);
    }

    #[test]
    fn analysis_is_deterministic() {
        let bytes = solid_png(137, 90, 201);
        let a = analyze(&bytes);
        let b = analyze(&bytes);
        assert_eq!(a, b);
    }

    #[test]
    fn garbage_bytes_are_undecodable() {
        let err = LumaAnalyzer.analyze(b"definitely not an image").unwrap_err();
        assert!(matches!(err, AnalyzeError::Undecodable(_)));
    }

    #[test]
    fn truncated_stream_is_undecodable() {
        let mut bytes = solid_png(128, 128, 128);
        bytes.truncate(bytes.len() / 2);
        let err = LumaAnalyzer.analyze(&bytes).unwrap_err();
        assert!(matches!(err, AnalyzeError::Undecodable(_)));
    }

    #[test]
    fn oversized_payload_rejected_before_decode() {
        let bytes = vec![0u8; MAX_IMAGE_BYTES + 1];
        let err = LumaAnalyzer.analyze(&bytes).unwrap_err();
        assert!(matches!(err, AnalyzeError::TooLarge(_)));
    }
}
