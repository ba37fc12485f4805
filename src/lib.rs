//! Virtual try-on proxy
//!
//! Accepts a shopper photo and a product image URL, fetches the product image
//! from an allowlisted host and forwards both to a configurable image
//! generation backend (Google Gemini or a HuggingFace Gradio space). The
//! active backend and its credentials can be changed at runtime through an
//! authenticated admin API.

pub mod ai;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod server;
pub mod settings;
pub mod tryon;
pub mod url_guard;

pub use error::{Error, Result};
