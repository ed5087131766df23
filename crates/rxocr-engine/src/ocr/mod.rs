//! OCR (Optical Character Recognition) module.
//!
//! Reads handwritten prescriptions: page detection, word detection,
//! character segmentation and per-character classification.

pub mod charset;
pub mod classifier;
mod engine;
pub mod normalize;
pub mod page;
pub mod segment;
pub mod words;

pub use classifier::{CharClassifier, ModelError, RtenCharClassifier};
pub use engine::OcrService;
pub use words::{ContourWordDetector, ModelWordDetector, WordDetector};
