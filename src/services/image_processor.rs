// src/services/image_processor.rs
use crate::canvas::transform::{Position, Size};
use crate::errors::DesignError;
use crate::models::{CropRegion, CropUnit, SampledColor};
use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, GenericImageView, ImageFormat as ImgFormat};

const MAX_DIMENSION: u32 = 4096;

pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_image(&self, data: &[u8]) -> Result<(u32, u32), DesignError> {
        let img = image::load_from_memory(data)
            .map_err(|e| DesignError::Validation(format!("Invalid image format: {}", e)))?;

        let (width, height) = img.dimensions();

        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(DesignError::Validation(format!(
                "Image dimensions exceed {}x{}",
                MAX_DIMENSION, MAX_DIMENSION
            )));
        }

        Ok((width, height))
    }

    pub fn resize_if_needed(&self, data: &[u8], max_size: u32) -> Result<Vec<u8>, DesignError> {
        let img = self.decode(data)?;
        let (width, height) = img.dimensions();

        if width <= max_size && height <= max_size {
            return Ok(data.to_vec());
        }

        let ratio = (max_size as f32 / width.max(height) as f32).min(1.0);
        let new_width = ((width as f32 * ratio) as u32).max(1);
        let new_height = ((height as f32 * ratio) as u32).max(1);

        let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);
        self.encode_png(&resized)
    }

    pub fn decode(&self, data: &[u8]) -> Result<DynamicImage, DesignError> {
        image::load_from_memory(data)
            .map_err(|e| DesignError::LocalProcessing(format!("Failed to load image: {}", e)))
    }

    pub fn encode_png(&self, img: &DynamicImage) -> Result<Vec<u8>, DesignError> {
        let mut output = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut output), ImgFormat::Png)
            .map_err(|e| DesignError::LocalProcessing(format!("Failed to encode image: {}", e)))?;
        Ok(output)
    }

    /// Reads the pixel under `point`, given in the displayed coordinate space
    /// of an element laid out at `displayed`. Returns `None` when nothing
    /// sensible can be read.
    pub fn sample_color(
        &self,
        img: &DynamicImage,
        displayed: Size,
        point: Position,
    ) -> Option<SampledColor> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 || !displayed.is_measured() {
            return None;
        }
        if !point.x.is_finite() || !point.y.is_finite() {
            return None;
        }

        let scale_x = width as f32 / displayed.width;
        let scale_y = height as f32 / displayed.height;

        // Points on the far border map one past the last pixel.
        let x = ((point.x * scale_x).floor().max(0.0) as u32).min(width - 1);
        let y = ((point.y * scale_y).floor().max(0.0) as u32).min(height - 1);

        let pixel = img.get_pixel(x, y);
        Some(SampledColor::from_rgb(pixel[0], pixel[1], pixel[2]))
    }

    /// Crops `img` to `region` and encodes the result as PNG. `Ok(None)` means
    /// the region selects nothing and the image should be left alone.
    pub fn crop_to_png(
        &self,
        img: &DynamicImage,
        displayed: Size,
        region: &CropRegion,
    ) -> Result<Option<Vec<u8>>, DesignError> {
        if region.is_empty() {
            return Ok(None);
        }
        if !displayed.is_measured() {
            return Err(DesignError::LocalProcessing(
                "Design element has not been measured".to_string(),
            ));
        }

        let (left, top, region_width, region_height) = match region.unit {
            CropUnit::Px => (region.x, region.y, region.width, region.height),
            CropUnit::Percent => (
                region.x / 100.0 * displayed.width,
                region.y / 100.0 * displayed.height,
                region.width / 100.0 * displayed.width,
                region.height / 100.0 * displayed.height,
            ),
        };

        let (natural_width, natural_height) = img.dimensions();
        let scale_x = natural_width as f32 / displayed.width;
        let scale_y = natural_height as f32 / displayed.height;

        // Clamped while still floats so oversized regions cannot overflow.
        let x = (left * scale_x).round().max(0.0).min(natural_width as f32);
        let y = (top * scale_y).round().max(0.0).min(natural_height as f32);
        let width = (region_width * scale_x)
            .round()
            .max(0.0)
            .min(natural_width as f32 - x) as u32;
        let height = (region_height * scale_y)
            .round()
            .max(0.0)
            .min(natural_height as f32 - y) as u32;
        let (x, y) = (x as u32, y as u32);

        if width == 0 || height == 0 {
            return Ok(None);
        }

        let cropped = img.crop_imm(x, y, width, height);
        self.encode_png(&cropped).map(Some)
    }
}

pub fn sniff_mime(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(ImgFormat::Png) => "image/png",
        Ok(ImgFormat::Jpeg) => "image/jpeg",
        Ok(ImgFormat::WebP) => "image/webp",
        Ok(ImgFormat::Gif) => "image/gif",
        Ok(ImgFormat::Bmp) => "image/bmp",
        _ => "application/octet-stream",
    }
}

pub fn to_data_uri(data: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        sniff_mime(data),
        general_purpose::STANDARD.encode(data)
    )
}

/// Normalises `image_data` from the services: either a full data URI or
/// bare base64.
pub fn normalize_image_data(raw: &str) -> Result<String, DesignError> {
    let trimmed = raw.trim();
    if trimmed.starts_with("data:") {
        return Ok(trimmed.to_string());
    }
    let bytes = general_purpose::STANDARD
        .decode(trimmed)
        .map_err(|e| DesignError::InvalidResponse(format!("Failed to decode image: {}", e)))?;
    Ok(to_data_uri(&bytes))
}

pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, DesignError> {
    let (header, payload) = uri
        .split_once(',')
        .ok_or_else(|| DesignError::LocalProcessing("Malformed data URI".to_string()))?;

    if !header.starts_with("data:") || !header.ends_with(";base64") {
        return Err(DesignError::LocalProcessing(
            "Only base64 data URIs are supported".to_string(),
        ));
    }

    general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| DesignError::LocalProcessing(format!("Failed to decode data URI: {}", e)))
}
