// src/services/design_store.rs
use crate::errors::DesignError;
use crate::models::{HealthStatus, SavedDesign};
use crate::services::http::{check_status, endpoint};
use log::debug;
use reqwest::{Client, Url};
use serde_json::json;

/// Saved designs and service health. Callers treat every failure here as
/// advisory.
pub struct DesignStore {
    client: Client,
    base_url: Url,
}

impl DesignStore {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub async fn save(&self, image_data: &str) -> Result<(), DesignError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "designs/save")?)
            .json(&json!({ "image_data": image_data }))
            .send()
            .await?;
        check_status(response, "Design save").await?;
        debug!("Saved design ({} chars)", image_data.len());
        Ok(())
    }

    pub async fn history(&self) -> Result<Vec<SavedDesign>, DesignError> {
        let response = self
            .client
            .get(endpoint(&self.base_url, "designs/history")?)
            .send()
            .await?;
        let response = check_status(response, "Design history").await?;

        let body: serde_json::Value = response.json().await.map_err(|e| {
            DesignError::InvalidResponse(format!("Failed to parse design history: {}", e))
        })?;

        // Either a bare list or `{"designs": [...]}`.
        let list = match body {
            serde_json::Value::Array(_) => body,
            serde_json::Value::Object(mut map) => map
                .remove("designs")
                .unwrap_or(serde_json::Value::Array(Vec::new())),
            _ => serde_json::Value::Array(Vec::new()),
        };

        serde_json::from_value(list)
            .map_err(|e| DesignError::InvalidResponse(format!("Malformed design history: {}", e)))
    }

    pub async fn health(&self) -> Result<HealthStatus, DesignError> {
        let response = self
            .client
            .get(endpoint(&self.base_url, "health")?)
            .send()
            .await?;
        let response = check_status(response, "Health check").await?;

        response
            .json()
            .await
            .map_err(|e| DesignError::InvalidResponse(format!("Failed to parse health: {}", e)))
    }
}
