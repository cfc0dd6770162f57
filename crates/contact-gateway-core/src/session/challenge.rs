//! QR challenge rendering

use std::io::Cursor;

use anyhow::{Context, Result};
use base64::Engine;
use image::{ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};

/// Minimum edge length of the rendered QR image in pixels
const MIN_DIMENSION: u32 = 280;

/// A rendered challenge, ready to embed in a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    data_url: String,
}

impl Challenge {
    /// Wrap an already encoded data URL
    pub fn from_data_url(data_url: String) -> Self {
        Self { data_url }
    }

    /// `data:image/png;base64,...` payload
    pub fn data_url(&self) -> &str {
        &self.data_url
    }
}

/// Render a challenge token as a PNG data URL
pub fn render_challenge(token: &str) -> Result<Challenge> {
    let code = QrCode::with_error_correction_level(token.as_bytes(), EcLevel::M)
        .map_err(|e| anyhow::anyhow!("QR encoding failed: {}", e))?;

    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(MIN_DIMENSION, MIN_DIMENSION)
        .build();

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("PNG encoding failed")?;

    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
    Ok(Challenge::from_data_url(format!(
        "data:image/png;base64,{}",
        encoded
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_produces_png_data_url() {
        let challenge = render_challenge("2@Zm9vYmFy,aGVsbG8=,d29ybGQ=,1").unwrap();
        let payload = challenge
            .data_url()
            .strip_prefix("data:image/png;base64,")
            .expect("data URL prefix");

        let png = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));

        let decoded = image::load_from_memory(&png).unwrap();
        assert!(decoded.width() >= MIN_DIMENSION);
        assert!(decoded.height() >= MIN_DIMENSION);
    }

    #[test]
    fn test_render_rejects_oversized_token() {
        let token = "x".repeat(5000);
        assert!(render_challenge(&token).is_err());
    }
}
