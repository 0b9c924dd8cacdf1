// src/services/processing_service.rs
use crate::errors::DesignError;
use crate::models::EncodedImage;
use crate::services::http::{check_status, endpoint};
use crate::services::image_processor::sniff_mime;
use base64::{Engine as _, engine::general_purpose};
use log::info;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url, header};

pub struct ProcessingService {
    client: Client,
    base_url: Url,
}

fn image_part(image: Vec<u8>) -> Result<Part, DesignError> {
    let mime = sniff_mime(&image);
    let extension = mime.rsplit('/').next().unwrap_or("png");
    Part::bytes(image)
        .file_name(format!("design.{}", extension))
        .mime_str(mime)
        .map_err(|e| DesignError::LocalProcessing(format!("Invalid image part: {}", e)))
}

/// `rrggbb` without `#`, lowercased. Rejects anything that is not six hex digits.
pub fn normalize_hex(color: &str) -> Result<String, DesignError> {
    let digits = color.trim().trim_start_matches('#').to_ascii_lowercase();
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DesignError::Validation(format!("Invalid color: {}", color)));
    }
    Ok(digits)
}

impl ProcessingService {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Asks the service to make pixels near `color` transparent. Larger
    /// `tolerance` (0..=1) widens the neighbourhood.
    pub async fn make_transparent(
        &self,
        image: Vec<u8>,
        color: &str,
        tolerance: f32,
    ) -> Result<Vec<u8>, DesignError> {
        let color = normalize_hex(color)?;
        let tolerance = if tolerance.is_finite() {
            tolerance.clamp(0.0, 1.0)
        } else {
            0.0
        };

        info!(
            "Requesting transparency for #{} (tolerance {}, {} bytes)",
            color,
            tolerance,
            image.len()
        );

        let form = Form::new()
            .part("file", image_part(image)?)
            .text("color", color)
            .text("tolerance", tolerance.to_string());

        let response = self
            .client
            .post(endpoint(&self.base_url, "color_transparency")?)
            .header(header::ACCEPT, "image/png")
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response, "Color transparency").await?;

        read_image(response).await
    }

    pub async fn remove_background(&self, image: Vec<u8>) -> Result<Vec<u8>, DesignError> {
        info!("Requesting background removal ({} bytes)", image.len());

        let form = Form::new().part("file", image_part(image)?);
        let response = self
            .client
            .post(endpoint(&self.base_url, "remove-background")?)
            .header(header::ACCEPT, "image/png")
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response, "Background removal").await?;

        read_image(response).await
    }

    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, DesignError> {
        let response = self.client.get(url).send().await?;
        let response = check_status(response, "Image download").await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Image bytes, or `{"image": <base64>}` when the service answers in JSON.
async fn read_image(response: Response) -> Result<Vec<u8>, DesignError> {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if is_json {
        let body: EncodedImage = response.json().await.map_err(|e| {
            DesignError::InvalidResponse(format!("Failed to parse image response: {}", e))
        })?;
        let payload = match body.image.split_once(',') {
            Some((header, data)) if header.starts_with("data:") => data,
            _ => body.image.as_str(),
        };
        return general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| DesignError::InvalidResponse(format!("Failed to decode image: {}", e)));
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(DesignError::InvalidResponse(
            "Service returned an empty image".to_string(),
        ));
    }
    Ok(bytes.to_vec())
}
