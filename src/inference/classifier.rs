//! Model runtime client and class decoding.
//!
//! The trained network is served out of process. [`TfServingClassifier`]
//! talks to a TensorFlow Serving REST endpoint:
//!
//! ```text
//! POST {endpoint}/v1/models/{model}:predict
//! {"instances": [[[[r, g, b], ...], ...]]}
//!   ──► {"predictions": [[p_glioma, p_meningioma, p_no_tumor, p_pituitary]]}
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::ModelError;

use super::preprocess::ImageTensor;

/// Default request timeout for the model runtime.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Classes
// =============================================================================

/// The four diagnostic classes, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TumorClass {
    Glioma,
    Meningioma,
    NoTumor,
    Pituitary,
}

impl TumorClass {
    /// All classes in the order the model emits probabilities.
    pub const ALL: [TumorClass; 4] = [
        TumorClass::Glioma,
        TumorClass::Meningioma,
        TumorClass::NoTumor,
        TumorClass::Pituitary,
    ];

    /// Class for an output index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Display label stored with predictions.
    pub fn label(&self) -> &'static str {
        match self {
            TumorClass::Glioma => "Glioma",
            TumorClass::Meningioma => "Meningioma",
            TumorClass::NoTumor => "No Tumor",
            TumorClass::Pituitary => "Pituitary",
        }
    }
}

impl fmt::Display for TumorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Arg-max of a probability vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub class: TumorClass,

    /// Probability of `class`, in `[0, 1]`
    pub confidence: f32,
}

impl Classification {
    /// Pick the most probable class.
    ///
    /// NaN entries never win and ties go to the lower index. The vector must
    /// have exactly one entry per class.
    pub fn from_probabilities(probabilities: &[f32]) -> Result<Self, ModelError> {
        if probabilities.len() != TumorClass::ALL.len() {
            return Err(ModelError::UnexpectedShape {
                expected: TumorClass::ALL.len(),
                actual: probabilities.len(),
            });
        }

        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| !p.is_nan())
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
            .ok_or_else(|| ModelError::Response("all probabilities are NaN".to_string()))?;

        let class = TumorClass::from_index(index).ok_or(ModelError::UnexpectedShape {
            expected: TumorClass::ALL.len(),
            actual: index + 1,
        })?;

        Ok(Self { class, confidence })
    }

    /// Confidence as a percentage rounded to two decimals.
    pub fn confidence_percent(&self) -> f64 {
        (f64::from(self.confidence) * 100.0 * 100.0).round() / 100.0
    }
}

// =============================================================================
// Classifier Trait
// =============================================================================

/// A model that maps a preprocessed image to class probabilities.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Run a single forward pass and return one probability per class.
    async fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError>;

    /// Check that the runtime is reachable and the model is loaded.
    async fn ready(&self) -> Result<(), ModelError>;
}

// =============================================================================
// TensorFlow Serving
// =============================================================================

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: Vec<Vec<Vec<&'a [f32]>>>,
}

#[derive(Deserialize)]
struct PredictResponse {
    predictions: Vec<Vec<f32>>,
}

/// [`Classifier`] backed by a TensorFlow Serving REST API.
///
/// The underlying `reqwest::Client` pools connections and is safe to share
/// across concurrent requests.
#[derive(Clone)]
pub struct TfServingClassifier {
    client: reqwest::Client,
    predict_url: Url,
    status_url: Url,
}

impl TfServingClassifier {
    /// Create a client for `model` served at `endpoint`.
    pub fn new(endpoint: &Url, model: &str, timeout: Duration) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let base = endpoint.as_str().trim_end_matches('/');
        let status_url = Url::parse(&format!("{}/v1/models/{}", base, model))
            .map_err(|e| ModelError::Request(e.to_string()))?;
        let predict_url = Url::parse(&format!("{}/v1/models/{}:predict", base, model))
            .map_err(|e| ModelError::Request(e.to_string()))?;

        Ok(Self {
            client,
            predict_url,
            status_url,
        })
    }

    /// URL used for inference requests.
    pub fn predict_url(&self) -> &Url {
        &self.predict_url
    }
}

#[async_trait]
impl Classifier for TfServingClassifier {
    async fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        let body = PredictRequest {
            instances: input.instances(),
        };

        let response = self
            .client
            .post(self.predict_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::Response(format!("status {}: {}", status, text)));
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Response(e.to_string()))?;

        let probabilities = parsed
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Response("empty predictions".to_string()))?;

        debug!(?probabilities, "Model returned probabilities");
        Ok(probabilities)
    }

    async fn ready(&self) -> Result<(), ModelError> {
        let response = self
            .client
            .get(self.status_url.clone())
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ModelError::Response(format!(
                "model status returned {}",
                response.status()
            )))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
