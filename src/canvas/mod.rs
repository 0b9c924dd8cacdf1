// src/canvas/mod.rs
pub mod controller;
pub mod epoch;
pub mod history;
pub mod transform;

pub use controller::{CanvasController, CanvasSnapshot};
