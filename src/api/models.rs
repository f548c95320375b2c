use serde::{Deserialize, Serialize};

/// Response from `POST /classify`.
///
/// `success: true` carries both `prediction` and `feedback`; `success: false`
/// carries `error`. The controller treats a success with missing payloads as
/// a classification error rather than trusting the flag alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResponse {
    pub success: bool,
    #[serde(default)]
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub feedback: Option<ServerFeedback>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class label, e.g. "car_horn"
    #[serde(rename = "class")]
    pub label: String,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    pub timestamp: String,
}

/// Server-assigned feedback parameters for a prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerFeedback {
    pub alert_level: String,
    /// Flash color as "#RRGGBB"
    pub color: String,
    /// Alternating off/on durations in milliseconds
    pub vibration_pattern: Vec<u64>,
    pub message: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub model_loaded: bool,
}

impl HealthResponse {
    /// Readiness gate: the UI only enables once the model is loaded.
    pub fn is_ready(&self) -> bool {
        self.model_loaded
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedClassesResponse {
    pub success: bool,
    pub classes: Vec<String>,
    pub total_classes: i32,
}

impl ClassificationResponse {
    /// Synthesized result for an HTTP error with an unusable body.
    pub fn server_error(status: u16) -> Self {
        Self {
            success: false,
            prediction: None,
            feedback: None,
            error: Some(format!("Server error: {}", status)),
        }
    }
}
