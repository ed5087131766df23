//! Recognition result types.

use serde::{Deserialize, Serialize};

/// Axis-aligned word region in page coordinates.
///
/// `x2` and `y2` are exclusive, so a box covers `x2 - x1` columns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct BoundingBox {
    /// Left edge.
    pub x1: u32,
    /// Top edge.
    pub y1: u32,
    /// Right edge (exclusive).
    pub x2: u32,
    /// Bottom edge (exclusive).
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// True when the box covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }

    /// Restrict the box to an image of the given size.
    pub fn clamp(&self, width: u32, height: u32) -> Self {
        Self {
            x1: self.x1.min(width),
            y1: self.y1.min(height),
            x2: self.x2.min(width),
            y2: self.y2.min(height),
        }
    }
}

/// A single recognized word.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecognizedWord {
    /// Word region on the page crop.
    pub bbox: BoundingBox,
    /// Decoded text (may be empty when no character survived filtering).
    pub text: String,
    /// Number of character crops sent to the classifier.
    pub chars: u32,
}

/// Page crop information.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageInfo {
    /// Width of the page crop.
    pub width: u32,
    /// Height of the page crop.
    pub height: u32,
    /// Whether a page outline was found. When false the whole image was used.
    pub detected: bool,
}

/// Result of recognizing one image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecognitionResult {
    /// Words joined by single spaces, in reading order.
    pub text: String,
    /// Individual words in reading order.
    pub words: Vec<RecognizedWord>,
    /// Page crop the word boxes refer to.
    pub page: PageInfo,
}

impl RecognitionResult {
    /// Build a result, joining the word texts with single spaces.
    ///
    /// Empty words still contribute a separator: `n` words are joined by
    /// `n - 1` spaces, and no words give an empty string.
    pub fn new(words: Vec<RecognizedWord>, page: PageInfo) -> Self {
        let text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self { text, words, page }
    }
}
