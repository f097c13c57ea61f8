mod client;
mod extract;
mod rotator;

pub use client::{ApiClient, LlmClient};
pub use extract::extract_json_object;
pub use rotator::ModelRotator;
