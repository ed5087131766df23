//! Character classification.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::Tensor;
use thiserror::Error;
use tracing::{debug, trace};

use super::normalize::NormalizedChar;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model file {0:?} not found")]
    NotFound(PathBuf),

    #[error("Model has no {0}")]
    MissingNode(&'static str),

    #[error("Unexpected model output: {0}")]
    UnexpectedOutput(String),
}

/// Maps normalized character images to class indices.
pub trait CharClassifier: Send + Sync {
    /// Classify a batch, returning one class index per character.
    fn classify(&self, chars: &[NormalizedChar]) -> Result<Vec<usize>>;
}

/// Character classifier running a frozen `.rten` graph.
pub struct RtenCharClassifier {
    model: Model,
    size: usize,
    /// Number of classes the alphabet expects from the model.
    classes: usize,
    /// Whether the model takes `[n, 1, size, size]` rather than `[n, size * size]`.
    image_input: bool,
}

impl RtenCharClassifier {
    /// Load the classifier and inspect its input shape.
    ///
    /// `classes` is the size of the alphabet the predictions index into.
    pub fn load(path: &Path, size: u32, classes: usize) -> Result<Self> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()).into());
        }

        debug!("Loading character classifier from {:?}", path);
        let model = Model::load_file(path)
            .with_context(|| format!("Failed to load character classifier from {:?}", path))?;

        let input_id = model
            .input_ids()
            .first()
            .copied()
            .ok_or(ModelError::MissingNode("inputs"))?;
        if model.output_ids().is_empty() {
            return Err(ModelError::MissingNode("outputs").into());
        }

        let image_input = model
            .node_info(input_id)
            .and_then(|info| info.shape())
            .map(|shape| shape.len() == 4)
            .unwrap_or(false);

        debug!(
            "Character classifier ready ({} input, {} classes)",
            if image_input { "image" } else { "flat" },
            classes
        );

        Ok(Self {
            model,
            size: size as usize,
            classes,
            image_input,
        })
    }
}

impl CharClassifier for RtenCharClassifier {
    fn classify(&self, chars: &[NormalizedChar]) -> Result<Vec<usize>> {
        if chars.is_empty() {
            return Ok(Vec::new());
        }

        let input = build_input(chars, self.size, self.image_input)?;
        let output = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| anyhow::anyhow!("Character classifier failed: {}", e))?;
        let logits: Tensor<f32> = output
            .try_into()
            .map_err(|e| ModelError::UnexpectedOutput(format!("{:?}", e)))?;

        let predictions = decode_logits(logits.shape(), &logits.to_vec(), chars.len(), self.classes)?;
        trace!("Classified {} characters: {:?}", chars.len(), predictions);
        Ok(predictions)
    }
}

/// Stack character pixels into the model input tensor.
fn build_input(chars: &[NormalizedChar], size: usize, image_input: bool) -> Result<Tensor<f32>> {
    let pixels_per_char = size * size;
    let mut data = Vec::with_capacity(chars.len() * pixels_per_char);
    for ch in chars {
        if ch.pixels.len() != pixels_per_char {
            anyhow::bail!(
                "Character has {} pixels, classifier expects {}",
                ch.pixels.len(),
                pixels_per_char
            );
        }
        data.extend_from_slice(&ch.pixels);
    }

    let shape: &[usize] = if image_input {
        &[chars.len(), 1, size, size]
    } else {
        &[chars.len(), pixels_per_char]
    };
    Ok(Tensor::from_data(shape, data))
}

/// Arg-max each row of a `[rows, classes]` score matrix.
fn decode_logits(shape: &[usize], scores: &[f32], rows: usize, classes: usize) -> Result<Vec<usize>> {
    match *shape {
        [r, c] if r == rows && c == classes && scores.len() == r * c => {
            Ok(scores.chunks(c).map(argmax).collect())
        }
        [r, c] if r == rows && scores.len() == r * c => Err(ModelError::UnexpectedOutput(format!(
            "{} classes, alphabet has {}",
            c, classes
        ))
        .into()),
        _ => Err(ModelError::UnexpectedOutput(format!(
            "shape {:?} for {} characters",
            shape, rows
        ))
        .into()),
    }
}

fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
