// src/services/generation_service.rs
use crate::canvas::epoch::EpochToken;
use crate::errors::DesignError;
use crate::models::*;
use crate::services::http::{check_status, endpoint};
use crate::services::image_processor::normalize_image_data;
use log::{debug, info, warn};
use reqwest::{Client, Url};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GenerationProtocol {
    /// `POST /generate` answers with the finished image.
    Direct,
    /// `POST /design` answers with a task id, `GET /status/{id}` is polled.
    Polling { interval: Duration, max_attempts: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDefaults {
    pub negative_prompt: Option<String>,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            negative_prompt: None,
            num_inference_steps: 30,
            guidance_scale: 7.5,
        }
    }
}

pub struct GenerationService {
    client: Client,
    base_url: Url,
    protocol: GenerationProtocol,
    defaults: GenerationDefaults,
}

fn ensure_current(token: &EpochToken) -> Result<(), DesignError> {
    if token.is_current() {
        Ok(())
    } else {
        Err(DesignError::Superseded)
    }
}

impl GenerationService {
    pub fn new(
        client: Client,
        base_url: Url,
        protocol: GenerationProtocol,
        defaults: GenerationDefaults,
    ) -> Self {
        Self {
            client,
            base_url,
            protocol,
            defaults,
        }
    }

    pub fn with_defaults(&self, request: &GenerationRequest) -> GenerationRequest {
        GenerationRequest {
            prompt: request.prompt.trim().to_string(),
            negative_prompt: request
                .negative_prompt
                .clone()
                .or_else(|| self.defaults.negative_prompt.clone()),
            style: request.style.clone(),
            num_inference_steps: request
                .num_inference_steps
                .or(Some(self.defaults.num_inference_steps)),
            guidance_scale: request.guidance_scale.or(Some(self.defaults.guidance_scale)),
        }
    }

    /// Runs one generation to completion. Gives up with `Superseded` as soon
    /// as `token` is no longer current.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        token: &EpochToken,
    ) -> Result<GenerationJob, DesignError> {
        if request.prompt.trim().is_empty() {
            return Err(DesignError::Validation("Prompt must not be empty".to_string()));
        }
        ensure_current(token)?;

        let request = self.with_defaults(request);
        match self.protocol {
            GenerationProtocol::Direct => self.generate_direct(&request, token).await,
            GenerationProtocol::Polling {
                interval,
                max_attempts,
            } => {
                self.generate_polling(&request, token, interval, max_attempts)
                    .await
            }
        }
    }

    async fn generate_direct(
        &self,
        request: &GenerationRequest,
        token: &EpochToken,
    ) -> Result<GenerationJob, DesignError> {
        let mut job = GenerationJob::new(Uuid::new_v4().to_string());
        info!("Generating design {} for prompt {:?}", job.id, request.prompt);

        let response = self
            .client
            .post(endpoint(&self.base_url, "generate")?)
            .json(request)
            .send()
            .await?;
        let response = check_status(response, "Generation request").await?;

        let body: DirectResponse = response.json().await.map_err(|e| {
            DesignError::InvalidResponse(format!("Failed to parse generation response: {}", e))
        })?;
        ensure_current(token)?;

        job.attempts = 1;
        job.transition(JobStatus::Processing);
        let image = self.resolve_result(&body.result)?;
        job.complete(image);
        Ok(job)
    }

    async fn generate_polling(
        &self,
        request: &GenerationRequest,
        token: &EpochToken,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<GenerationJob, DesignError> {
        let submitted = self.submit(request).await?;
        ensure_current(token)?;

        let mut job = GenerationJob::new(submitted.task_id);
        if let Some(status) = submitted.status {
            job.transition(status);
        }
        info!("Submitted design task {}", job.id);

        for attempt in 1..=max_attempts {
            let status = self.poll_status(&job.id).await?;
            ensure_current(token)?;
            job.attempts = attempt;

            match status.status {
                JobStatus::Completed => {
                    let result = status.result.ok_or_else(|| {
                        DesignError::InvalidResponse("Completed task carries no result".to_string())
                    })?;
                    let image = self.resolve_result(&result)?;
                    job.complete(image);
                    info!("Task {} completed after {} polls", job.id, attempt);
                    return Ok(job);
                }
                JobStatus::Failed => {
                    let reason = status
                        .error
                        .or_else(|| status.result.and_then(|r| r.error))
                        .unwrap_or_else(|| "Generation failed".to_string());
                    warn!("Task {} failed: {}", job.id, reason);
                    job.fail(reason.clone());
                    return Err(DesignError::JobFailed(reason));
                }
                other => {
                    if job.transition(other) {
                        info!("Task {} is {:?}", job.id, other);
                    } else {
                        debug!("Task {} still {:?} (poll {})", job.id, job.status, attempt);
                    }
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
                ensure_current(token)?;
            }
        }

        job.fail("Task timed out");
        warn!("Task {} timed out after {} polls", job.id, max_attempts);
        Err(DesignError::Timeout {
            attempts: max_attempts,
        })
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<SubmitResponse, DesignError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "design")?)
            .json(request)
            .send()
            .await?;
        let response = check_status(response, "Design submission").await?;

        response.json().await.map_err(|e| {
            DesignError::InvalidResponse(format!("Failed to parse submission response: {}", e))
        })
    }

    async fn poll_status(&self, task_id: &str) -> Result<StatusResponse, DesignError> {
        let response = self
            .client
            .get(endpoint(&self.base_url, &format!("status/{}", task_id))?)
            .send()
            .await?;
        let response = check_status(response, "Status poll").await?;

        response.json().await.map_err(|e| {
            DesignError::InvalidResponse(format!("Failed to parse status response: {}", e))
        })
    }

    fn resolve_result(&self, result: &GenerationResult) -> Result<DesignImage, DesignError> {
        if let Some(data) = result.image_data.as_deref().filter(|d| !d.is_empty()) {
            return normalize_image_data(data).map(DesignImage::DataUri);
        }
        if let Some(url) = result.image_url.as_deref().filter(|u| !u.is_empty()) {
            let resolved = endpoint(&self.base_url, url)?;
            return Ok(DesignImage::Remote(resolved.to_string()));
        }
        match &result.error {
            Some(reason) => Err(DesignError::JobFailed(reason.clone())),
            None => Err(DesignError::InvalidResponse(
                "No image data in response".to_string(),
            )),
        }
    }
}
