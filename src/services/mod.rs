// src/services/mod.rs
pub mod backend;
pub mod blob_store;
pub mod design_store;
pub mod generation_service;
pub mod http;
pub mod image_processor;
pub mod processing_service;

#[cfg(test)]
pub mod mock_server;

pub use backend::{DesignBackend, HttpBackend};
pub use blob_store::BlobStore;
pub use image_processor::ImageProcessor;
