pub mod client;
pub mod tryon;
pub mod types;

pub use client::GeminiHttpClient;
pub use tryon::{GeminiTryOnProvider, DEFAULT_MODEL};
