//! Prediction pipeline for uploaded scans.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       PredictionService                          │
//! │  1. Resolve user        4. Confidence gate (>= threshold)        │
//! │  2. Preprocess image    5. Upload original to the asset store    │
//! │  3. Run the classifier  6. Persist and return the prediction     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Below the threshold nothing is uploaded or persisted.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use tracing::{debug, error, info};

use crate::assets::AssetStore;
use crate::error::{PredictionError, PreprocessError};
use crate::store::{Prediction, PredictionStore, UserStore};

use super::classifier::{Classification, Classifier};
use super::preprocess::{detect_image_format, ImagePreprocessor};

/// Minimum confidence for a prediction to be accepted.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Offset applied to UTC when rendering `displayTime`, in minutes (UTC+5).
pub const DEFAULT_DISPLAY_OFFSET_MINUTES: i32 = 5 * 60;

const DISPLAY_TIME_FORMAT: &str = "%I:%M %p";

/// Runs the preprocessing, inference, and persistence steps for predictions.
pub struct PredictionService {
    users: Arc<dyn UserStore>,
    predictions: Arc<dyn PredictionStore>,
    classifier: Arc<dyn Classifier>,
    assets: Arc<dyn AssetStore>,
    preprocessor: ImagePreprocessor,
    threshold: f32,
    display_offset: TimeDelta,
}

impl PredictionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        predictions: Arc<dyn PredictionStore>,
        classifier: Arc<dyn Classifier>,
        assets: Arc<dyn AssetStore>,
    ) -> Self {
        Self {
            users,
            predictions,
            classifier,
            assets,
            preprocessor: ImagePreprocessor::new(),
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            display_offset: TimeDelta::minutes(i64::from(DEFAULT_DISPLAY_OFFSET_MINUTES)),
        }
    }

    /// Set the acceptance threshold, a probability in `[0, 1]`.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the offset from UTC used for `displayTime`.
    pub fn with_display_offset_minutes(mut self, minutes: i32) -> Self {
        self.display_offset = TimeDelta::minutes(i64::from(minutes));
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: ImagePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    pub fn assets(&self) -> &Arc<dyn AssetStore> {
        &self.assets
    }

    /// Classify a scan for `email`, then upload and persist it.
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if the email has no account
    /// - `Preprocess` if the bytes are not a decodable image
    /// - `LowConfidence` if the top class is below the threshold
    /// - `Model` / `Asset` / `Store` for collaborator failures
    pub async fn predict_and_save(
        &self,
        image: Bytes,
        email: &str,
    ) -> Result<Prediction, PredictionError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(PredictionError::UserNotFound)?;

        let classification = self.classify(image.clone()).await?;

        let (content_type, extension) =
            detect_image_format(&image).unwrap_or(("application/octet-stream", "bin"));
        let image_url = self.assets.upload(image, content_type, extension).await?;

        let prediction = Prediction {
            user_id: user.user_id,
            email: user.email,
            label: classification.class.label().to_string(),
            confidence: classification.confidence_percent(),
            image_url,
            // Stored at microsecond precision, matching TIMESTAMPTZ
            timestamp: Utc::now().trunc_subsecs(6),
        };

        if let Err(e) = self.predictions.insert_prediction(&prediction).await {
            error!(
                user_id = prediction.user_id,
                image_url = %prediction.image_url,
                error = %e,
                "Prediction not saved; uploaded scan is orphaned"
            );
            return Err(e.into());
        }

        info!(
            user_id = prediction.user_id,
            label = %prediction.label,
            confidence = prediction.confidence,
            "Prediction saved"
        );

        Ok(prediction)
    }

    /// Classify a scan without uploading or persisting anything.
    pub async fn predict_guest(&self, image: Bytes) -> Result<Classification, PredictionError> {
        self.classify(image).await
    }

    /// Prediction history for `email`, newest first.
    pub async fn history(&self, email: &str) -> Result<Vec<Prediction>, PredictionError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(PredictionError::UserNotFound)?;

        Ok(self.predictions.predictions_for_user(user.user_id).await?)
    }

    /// Render a timestamp as a 12-hour clock time in the display offset.
    pub fn display_time(&self, timestamp: &DateTime<Utc>) -> String {
        (*timestamp + self.display_offset)
            .format(DISPLAY_TIME_FORMAT)
            .to_string()
    }

    async fn classify(&self, image: Bytes) -> Result<Classification, PredictionError> {
        if image.is_empty() {
            return Err(PreprocessError::Empty.into());
        }

        let tensor = self.preprocessor.preprocess_blocking(image).await?;
        let probabilities = self.classifier.predict(&tensor).await?;
        let classification = Classification::from_probabilities(&probabilities)?;

        if classification.confidence < self.threshold {
            debug!(
                class = %classification.class,
                confidence = classification.confidence,
                threshold = self.threshold,
                "Rejected low-confidence prediction"
            );
            return Err(PredictionError::LowConfidence {
                confidence: classification.confidence,
            });
        }

        Ok(classification)
    }
}

// =============================================================================
// Tests
// =============================================================================
