//! Recognition settings and model discovery.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable overriding the models directory.
pub const MODELS_DIR_ENV: &str = "RXOCR_MODELS_DIR";

/// Language of the character classifier and its alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Czech alphabet (English plus accented letters).
    #[default]
    Cz,
    /// English alphabet.
    En,
}

impl Language {
    /// Directory name under `char-clas/`.
    pub fn code(&self) -> &'static str {
        match self {
            Language::Cz => "cz",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cz" | "cs" => Ok(Language::Cz),
            "en" => Ok(Language::En),
            other => anyhow::bail!("Unknown language '{}' (expected 'cz' or 'en')", other),
        }
    }
}

/// Strategy used to find word regions on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordDetectorKind {
    /// Edge map + morphology + contours.
    #[default]
    Contour,
    /// ocrs text-detection model (`text-detection.rten`).
    Model,
}

impl WordDetectorKind {
    pub fn name(&self) -> &'static str {
        match self {
            WordDetectorKind::Contour => "contour",
            WordDetectorKind::Model => "model",
        }
    }
}

impl fmt::Display for WordDetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings for one recognition pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Classifier language.
    pub language: Language,
    /// Root directory containing `char-clas/<lang>/CharClassifier.rten`.
    pub models_dir: PathBuf,
    /// Height every word crop is normalized to.
    pub word_height: u32,
    /// Black columns added on both sides of a word before segmentation.
    pub char_border: u32,
    /// Characters must be strictly wider and taller than this.
    pub min_char_dim: u32,
    /// Side of the square classifier input.
    pub char_size: u32,
    /// Run page detection before word detection.
    pub detect_page: bool,
    /// Word detection strategy.
    pub word_detector: WordDetectorKind,
}

impl OcrConfig {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            language: Language::default(),
            models_dir: models_dir.into(),
            word_height: 60,
            char_border: 30,
            min_char_dim: 4,
            char_size: 64,
            detect_page: true,
            word_detector: WordDetectorKind::default(),
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Path of the character classifier for the configured language.
    pub fn classifier_model_path(&self) -> PathBuf {
        self.models_dir
            .join("char-clas")
            .join(self.language.code())
            .join("CharClassifier.rten")
    }

    /// Path of the ocrs word detection model.
    pub fn detection_model_path(&self) -> PathBuf {
        self.models_dir.join("text-detection.rten")
    }
}

/// Find the models directory.
///
/// Checked in order: the explicit path, `./models` relative to the working
/// directory, then `models` next to the executable's `bin/` directory.
pub fn find_models_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        if !dir.is_dir() {
            anyhow::bail!("Models directory {:?} does not exist", dir);
        }
        debug!("Using models directory {:?}", dir);
        return Ok(dir.to_path_buf());
    }

    let mut candidates = vec![PathBuf::from("models")];

    let exe_path = std::env::current_exe().context("Failed to get executable path")?;
    if let Some(root) = exe_path.parent().and_then(|p| p.parent()) {
        candidates.push(root.join("models"));
    }

    for dir in &candidates {
        if dir.join("char-clas").is_dir() {
            debug!("Found models directory at {:?}", dir);
            return Ok(dir.clone());
        }
    }

    anyhow::bail!(
        "Could not find recognition models (searched {:?}). Pass --models-dir or set {}.",
        candidates,
        MODELS_DIR_ENV
    )
}
