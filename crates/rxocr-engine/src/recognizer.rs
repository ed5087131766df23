//! Lazily loaded, serialized access to the OCR service.
//!
//! The daemon shares one `Recognizer` between all client connections. The
//! models are loaded on the first request; a failed load is retried on the
//! next one. Recognitions run one at a time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use image::RgbImage;
use parking_lot::Mutex;
use rxocr_protocol::{ErrorCode, RecognitionResult};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::OcrConfig;
use crate::ocr::OcrService;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("Recognition models unavailable: {0:#}")]
    ModelUnavailable(anyhow::Error),

    #[error("Failed to read image: {0:#}")]
    Image(anyhow::Error),

    #[error("Recognition failed: {0:#}")]
    Failed(anyhow::Error),
}

impl RecognizeError {
    /// Wire error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            RecognizeError::ModelUnavailable(_) => ErrorCode::ModelUnavailable,
            RecognizeError::Image(_) => ErrorCode::ImageError,
            RecognizeError::Failed(_) => ErrorCode::RecognitionFailed,
        }
    }
}

/// Where the image to recognize comes from.
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// A file readable by this process.
    Path(PathBuf),
    /// Encoded PNG or JPEG bytes.
    Bytes(Vec<u8>),
}

impl ImageInput {
    fn load(&self) -> anyhow::Result<RgbImage> {
        use anyhow::Context;

        let image = match self {
            ImageInput::Path(path) => image::open(path)
                .with_context(|| format!("Failed to read image {:?}", path))?,
            ImageInput::Bytes(bytes) => {
                image::load_from_memory(bytes).context("Failed to decode image")?
            }
        };
        Ok(image.into_rgb8())
    }
}

type Loader = Box<dyn Fn(&OcrConfig) -> anyhow::Result<OcrService> + Send + Sync>;

/// Shared recognition entry point.
pub struct Recognizer {
    config: OcrConfig,
    loader: Loader,
    /// Held for a whole recognition; only `recognize` locks it.
    service: Mutex<Option<OcrService>>,
    loaded: AtomicBool,
    served: AtomicU64,
}

impl Recognizer {
    /// Create a recognizer that loads its models from `config` on first use.
    pub fn new(config: OcrConfig) -> Self {
        Self::with_loader(config, Box::new(OcrService::new))
    }

    /// Create a recognizer with a custom service constructor.
    pub fn with_loader(config: OcrConfig, loader: Loader) -> Self {
        Self {
            config,
            loader,
            service: Mutex::new(None),
            loaded: AtomicBool::new(false),
            served: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Whether the OCR service has been loaded.
    ///
    /// Never waits for a recognition in progress.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Number of successfully completed recognitions.
    pub fn requests_served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Recognize an image, loading the models first if needed.
    ///
    /// Blocks for the duration of the recognition; concurrent callers wait
    /// for their turn.
    pub fn recognize(&self, input: &ImageInput) -> Result<RecognitionResult, RecognizeError> {
        let image = input.load().map_err(RecognizeError::Image)?;

        let mut slot = self.service.lock();
        if slot.is_none() {
            info!(
                "Loading recognition models from {:?} ({})",
                self.config.models_dir, self.config.language
            );
            let service = (self.loader)(&self.config).map_err(RecognizeError::ModelUnavailable)?;
            *slot = Some(service);
            self.loaded.store(true, Ordering::Release);
        }
        let Some(service) = slot.as_ref() else {
            return Err(RecognizeError::ModelUnavailable(anyhow::anyhow!(
                "OCR service not initialized"
            )));
        };

        let result = service.recognize(&image).map_err(RecognizeError::Failed)?;
        self.served.fetch_add(1, Ordering::Relaxed);
        debug!("Recognition #{} complete", self.requests_served());
        Ok(result)
    }
}
