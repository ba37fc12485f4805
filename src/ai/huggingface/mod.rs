pub mod gradio;
pub mod tryon;

pub use gradio::GradioClient;
pub use tryon::HuggingFaceTryOnProvider;
