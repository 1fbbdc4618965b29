//! Brain MRI classification.
//!
//! - [`preprocess`] turns encoded image bytes into the model's input tensor
//! - [`classifier`] talks to the model runtime and decodes class probabilities
//! - [`service`] applies the confidence gate and records accepted predictions

pub mod classifier;
pub mod preprocess;
pub mod service;

pub use classifier::{
    Classification, Classifier, TfServingClassifier, TumorClass, DEFAULT_MODEL_TIMEOUT,
};
pub use preprocess::{
    detect_image_format, ImagePreprocessor, ImageTensor, MODEL_INPUT_CHANNELS, MODEL_INPUT_SIZE,
};
pub use service::{
    PredictionService, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_DISPLAY_OFFSET_MINUTES,
};
