pub mod client;
pub mod models;

pub use client::{ApiClient, ClientConfig, SoundClassifier, TransportError};
pub use models::{
    ClassificationResponse, HealthResponse, Prediction, ServerFeedback, SupportedClassesResponse,
};
