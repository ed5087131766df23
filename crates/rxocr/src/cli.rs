//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rxocr_engine::{Language, OcrConfig, WordDetectorKind};

pub mod commands;

/// Read the text of a handwritten prescription photo.
#[derive(Parser)]
#[command(name = "rxocr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Prescription image (PNG or JPEG)
    #[arg(default_value = "test/1.jpg")]
    pub image: PathBuf,

    /// Alphabet and classifier model to use
    #[arg(long, value_enum, default_value_t = Language::Cz, env = "RXOCR_LANG", global = true)]
    pub lang: Language,

    /// Directory holding the recognition models
    #[arg(long, env = "RXOCR_MODELS_DIR", global = true)]
    pub models_dir: Option<PathBuf>,

    /// Output in JSON format (words, boxes and page info)
    #[arg(long, global = true)]
    pub json: bool,

    /// Skip page detection and read the whole image
    #[arg(long)]
    pub no_page: bool,

    /// Word detection strategy
    #[arg(long, value_enum, default_value_t = WordDetectorKind::Contour)]
    pub word_detector: WordDetectorKind,

    /// Recognize through the resident daemon instead of loading models in-process
    #[arg(long)]
    pub daemon: bool,

    /// Daemon session name
    #[arg(long, default_value = "default", env = "RXOCR_SESSION", global = true)]
    pub session: String,

    /// Daemon request timeout in milliseconds
    #[arg(long, default_value = "60000", global = true)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Build the recognition config from the command line.
    pub fn ocr_config(&self) -> anyhow::Result<OcrConfig> {
        let models_dir = rxocr_engine::find_models_dir(self.models_dir.as_deref())?;
        let mut config = OcrConfig::new(models_dir).with_language(self.lang);
        config.detect_page = !self.no_page;
        config.word_detector = self.word_detector;
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Daemon session management
    Session(SessionArgs),
}

/// Session command arguments.
#[derive(Parser)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub action: SessionAction,
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// List active sessions
    List,

    /// Get current session info
    Info,

    /// Stop the session daemon
    Stop,

    /// Run as daemon (internal use)
    #[command(hide = true)]
    Daemon {
        /// Skip page detection
        #[arg(long)]
        no_page: bool,

        /// Word detection strategy
        #[arg(long, value_enum, default_value_t = WordDetectorKind::Contour)]
        word_detector: WordDetectorKind,
    },
}
