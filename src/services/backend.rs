// src/services/backend.rs
use crate::canvas::epoch::EpochToken;
use crate::config::Config;
use crate::errors::DesignError;
use crate::models::*;
use crate::services::design_store::DesignStore;
use crate::services::generation_service::GenerationService;
use crate::services::http::{build_client, parse_base_url};
use crate::services::processing_service::ProcessingService;
use async_trait::async_trait;

/// Everything the design session needs from the outside world.
#[async_trait]
pub trait DesignBackend: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        token: &EpochToken,
    ) -> Result<GenerationJob, DesignError>;

    async fn remove_background(&self, image: Vec<u8>) -> Result<Vec<u8>, DesignError>;

    async fn make_transparent(
        &self,
        image: Vec<u8>,
        color: &str,
        tolerance: f32,
    ) -> Result<Vec<u8>, DesignError>;

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, DesignError>;

    async fn save_design(&self, image_data: &str) -> Result<(), DesignError>;

    async fn design_history(&self) -> Result<Vec<SavedDesign>, DesignError>;

    async fn health(&self) -> Result<HealthStatus, DesignError>;
}

pub struct HttpBackend {
    generation: GenerationService,
    processing: ProcessingService,
    store: DesignStore,
}

impl HttpBackend {
    pub fn new(
        generation: GenerationService,
        processing: ProcessingService,
        store: DesignStore,
    ) -> Self {
        Self {
            generation,
            processing,
            store,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, DesignError> {
        let client = build_client(config.request_timeout)?;
        let design_url = parse_base_url(&config.design_api_url)?;
        let processing_url = parse_base_url(&config.processing_api_url)?;

        Ok(Self::new(
            GenerationService::new(
                client.clone(),
                design_url.clone(),
                config.protocol,
                config.generation_defaults.clone(),
            ),
            ProcessingService::new(client.clone(), processing_url),
            DesignStore::new(client, design_url),
        ))
    }
}

#[async_trait]
impl DesignBackend for HttpBackend {
    async fn generate(
        &self,
        request: &GenerationRequest,
        token: &EpochToken,
    ) -> Result<GenerationJob, DesignError> {
        self.generation.generate(request, token).await
    }

    async fn remove_background(&self, image: Vec<u8>) -> Result<Vec<u8>, DesignError> {
        self.processing.remove_background(image).await
    }

    async fn make_transparent(
        &self,
        image: Vec<u8>,
        color: &str,
        tolerance: f32,
    ) -> Result<Vec<u8>, DesignError> {
        self.processing.make_transparent(image, color, tolerance).await
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, DesignError> {
        self.processing.fetch_image(url).await
    }

    async fn save_design(&self, image_data: &str) -> Result<(), DesignError> {
        self.store.save(image_data).await
    }

    async fn design_history(&self) -> Result<Vec<SavedDesign>, DesignError> {
        self.store.history().await
    }

    async fn health(&self) -> Result<HealthStatus, DesignError> {
        self.store.health().await
    }
}
