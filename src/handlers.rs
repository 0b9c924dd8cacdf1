// src/handlers.rs
use crate::canvas::transform::{Position, Size};
use crate::{AppState, errors::DesignError, models::*};
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures_util::TryStreamExt;
use log::warn;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LayoutBody {
    pub container: Size,
    pub design: Size,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransformBody {
    #[serde(default)]
    pub dx: Option<f32>,
    #[serde(default)]
    pub dy: Option<f32>,
    #[serde(default)]
    pub scale: Option<f32>,
    #[serde(default)]
    pub rotate_by: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct TransparencyBody {
    pub value: f32,
}

pub async fn get_state(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.snapshot().await)
}

pub async fn get_image(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    match data.session.current_image().await? {
        Some((bytes, mime)) => Ok(HttpResponse::Ok().content_type(mime).body(bytes)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": "No design",
            "message": "Generate or upload a design first"
        }))),
    }
}

pub async fn set_layout(data: web::Data<AppState>, body: web::Json<LayoutBody>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.set_layout(body.container, body.design).await)
}

pub async fn generate(
    data: web::Data<AppState>,
    body: web::Json<GenerationRequest>,
) -> HttpResponse {
    HttpResponse::Ok().json(data.session.generate(body.into_inner()).await)
}

pub async fn upload_design(
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let mut image_data = Vec::new();

    // Only the first file field is used
    while let Some(mut field) = payload.try_next().await? {
        if field.content_disposition().get_filename().is_none() {
            continue;
        }
        while let Some(chunk) = field.try_next().await? {
            image_data.extend_from_slice(&chunk);
        }
        break;
    }

    if image_data.is_empty() {
        return Err(DesignError::Validation("No image file provided".to_string()).into());
    }

    let snapshot = data.session.upload(image_data).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

pub async fn pointer_down(data: web::Data<AppState>, body: web::Json<Position>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.pointer_down(body.into_inner()).await)
}

pub async fn pointer_move(data: web::Data<AppState>, body: web::Json<Position>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.pointer_move(body.into_inner()).await)
}

pub async fn pointer_up(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.pointer_up().await)
}

pub async fn transform(data: web::Data<AppState>, body: web::Json<TransformBody>) -> HttpResponse {
    let session = &data.session;
    if body.dx.is_some() || body.dy.is_some() {
        session
            .move_by(body.dx.unwrap_or(0.0), body.dy.unwrap_or(0.0))
            .await;
    }
    if let Some(scale) = body.scale {
        session.set_scale(scale).await;
    }
    if let Some(delta) = body.rotate_by {
        session.rotate_by(delta).await;
    }
    HttpResponse::Ok().json(session.snapshot().await)
}

pub async fn toggle_color_pick(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.toggle_color_pick().await)
}

pub async fn pick_color(data: web::Data<AppState>, body: web::Json<Position>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.pick_color_at(body.into_inner()).await)
}

pub async fn set_transparency(
    data: web::Data<AppState>,
    body: web::Json<TransparencyBody>,
) -> HttpResponse {
    HttpResponse::Ok().json(data.session.set_transparency(body.value).await)
}

pub async fn commit_transparency(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.commit_transparency().await)
}

pub async fn toggle_background(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.toggle_background().await)
}

pub async fn begin_crop(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.begin_crop().await)
}

pub async fn apply_crop(data: web::Data<AppState>, body: web::Json<CropRegion>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.apply_crop(body.into_inner()).await)
}

pub async fn cancel_crop(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.cancel_crop().await)
}

pub async fn undo(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.undo().await)
}

pub async fn reset(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.reset().await)
}

pub async fn dismiss_error(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.dismiss_error().await)
}

/// Saved designs from the design service. An unreachable store yields an
/// empty list rather than an error.
pub async fn design_history(data: web::Data<AppState>) -> HttpResponse {
    let designs = data.session.design_history().await.unwrap_or_else(|e| {
        warn!("Could not load design history: {}", e);
        Vec::new()
    });
    HttpResponse::Ok().json(serde_json::json!({
        "designs": designs,
        "count": designs.len()
    }))
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthStatus {
        status: "healthy".to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        timestamp: Some(chrono::Utc::now().to_rfc3339()),
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/state", web::get().to(get_state))
            .route("/image", web::get().to(get_image))
            .route("/layout", web::post().to(set_layout))
            .route("/generate", web::post().to(generate))
            .route("/upload", web::post().to(upload_design))
            .route("/pointer/down", web::post().to(pointer_down))
            .route("/pointer/move", web::post().to(pointer_move))
            .route("/pointer/up", web::post().to(pointer_up))
            .route("/transform", web::post().to(transform))
            .route("/color-pick/toggle", web::post().to(toggle_color_pick))
            .route("/color-pick", web::post().to(pick_color))
            .route("/transparency", web::post().to(set_transparency))
            .route("/transparency/commit", web::post().to(commit_transparency))
            .route("/background/toggle", web::post().to(toggle_background))
            .route("/crop/begin", web::post().to(begin_crop))
            .route("/crop/apply", web::post().to(apply_crop))
            .route("/crop/cancel", web::post().to(cancel_crop))
            .route("/undo", web::post().to(undo))
            .route("/reset", web::post().to(reset))
            .route("/error/dismiss", web::post().to(dismiss_error))
            .route("/designs/history", web::get().to(design_history)),
    )
    .route("/health", web::get().to(health_check));
}
