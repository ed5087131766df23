//! Recognition pipeline: page, words, characters, text.

use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops, RgbImage};
use rxocr_protocol::{BoundingBox, RecognitionResult, RecognizedWord};
use tracing::{debug, trace};

use super::charset;
use super::classifier::{CharClassifier, RtenCharClassifier};
use super::normalize::{image_norm, letter_norm, pad_horizontal, WordNorm};
use super::page::{self, PageCrop, PageParams};
use super::segment::{segmentation, SegmentParams};
use super::words::{ContourWordDetector, ModelWordDetector, WordDetector};
use crate::config::{OcrConfig, WordDetectorKind};

/// OCR service for handwritten prescriptions.
pub struct OcrService {
    config: OcrConfig,
    detector: Box<dyn WordDetector>,
    classifier: Box<dyn CharClassifier>,
}

impl OcrService {
    /// Create a new OCR service by loading models from the configured directory.
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let classifier = RtenCharClassifier::load(
            &config.classifier_model_path(),
            config.char_size,
            charset::class_count(config.language),
        )?;

        let detector: Box<dyn WordDetector> = match config.word_detector {
            WordDetectorKind::Contour => Box::new(ContourWordDetector::default()),
            WordDetectorKind::Model => Box::new(ModelWordDetector::new(&config.detection_model_path())?),
        };

        debug!(
            "OCR service initialized (language {}, {:?} word detector)",
            config.language, config.word_detector
        );
        Ok(Self::with_components(config.clone(), detector, Box::new(classifier)))
    }

    /// Assemble a service from already constructed stages.
    pub fn with_components(
        config: OcrConfig,
        detector: Box<dyn WordDetector>,
        classifier: Box<dyn CharClassifier>,
    ) -> Self {
        Self {
            config,
            detector,
            classifier,
        }
    }

    /// Recognize an image file.
    pub fn recognize_file(&self, path: &Path) -> Result<RecognitionResult> {
        let image = image::open(path)
            .with_context(|| format!("Failed to read image {:?}", path))?
            .into_rgb8();
        self.recognize(&image)
    }

    /// Recognize PNG or JPEG bytes.
    pub fn recognize_bytes(&self, image_data: &[u8]) -> Result<RecognitionResult> {
        let image = image::load_from_memory(image_data)
            .context("Failed to decode image")?
            .into_rgb8();
        self.recognize(&image)
    }

    /// Run the full pipeline on an RGB image.
    pub fn recognize(&self, image: &RgbImage) -> Result<RecognitionResult> {
        trace!("Image loaded: {}x{}", image.width(), image.height());

        let page = if self.config.detect_page {
            page::detection(image, &PageParams::default())
        } else {
            PageCrop::full(image)
        };

        let boxes = self.detector.detect(&page.image)?;
        debug!("Detected {} word regions", boxes.len());

        let (width, height) = page.image.dimensions();
        let mut words = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let bbox = bbox.clamp(width, height);
            if bbox.is_empty() {
                continue;
            }
            words.push(self.recognize_word(&page.image, bbox)?);
        }

        let result = RecognitionResult::new(words, page.info());
        debug!("Recognized {} words", result.words.len());
        Ok(result)
    }

    fn recognize_word(&self, page: &RgbImage, bbox: BoundingBox) -> Result<RecognizedWord> {
        let crop = imageops::crop_imm(page, bbox.x1, bbox.y1, bbox.width(), bbox.height()).to_image();

        let norm = image_norm(
            &crop,
            &WordNorm {
                height: self.config.word_height,
                border: false,
                tilt: true,
                hyst_norm: true,
            },
        );
        let padded = pad_horizontal(&norm, self.config.char_border);
        let gaps = segmentation(&padded, &SegmentParams::default());

        let min_dim = self.config.min_char_dim;
        let chars: Vec<_> = gaps
            .windows(2)
            .filter_map(|pair| {
                let slice = imageops::crop_imm(&padded, pair[0], 0, pair[1] - pair[0], padded.height())
                    .to_image();
                letter_norm(&slice, self.config.char_size, true)
            })
            .filter(|ch| ch.dim.0 > min_dim && ch.dim.1 > min_dim)
            .collect();

        let text = if chars.is_empty() {
            String::new()
        } else {
            let classes = self
                .classifier
                .classify(&chars)
                .context("Failed to classify characters")?;
            charset::decode(self.config.language, &classes)
        };

        trace!("Word at {:?}: {} chars -> {:?}", bbox, chars.len(), text);
        Ok(RecognizedWord {
            bbox,
            text,
            chars: chars.len() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Language;
    use crate::ocr::normalize::NormalizedChar;
    use image::Rgb;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns fixed boxes.
    struct FixedWords(Vec<BoundingBox>);

    impl WordDetector for FixedWords {
        fn detect(&self, _page: &RgbImage) -> Result<Vec<BoundingBox>> {
            Ok(self.0.clone())
        }
    }

    /// Predicts class 1 ("A") for every character and counts calls.
    struct CountingClassifier {
        calls: Arc<AtomicUsize>,
        seen: Arc<AtomicUsize>,
    }

    impl CharClassifier for CountingClassifier {
        fn classify(&self, chars: &[NormalizedChar]) -> Result<Vec<usize>> {
            assert!(!chars.is_empty(), "empty batches must not reach the classifier");
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.fetch_add(chars.len(), Ordering::SeqCst);
            Ok(vec![1; chars.len()])
        }
    }

    fn service(boxes: Vec<BoundingBox>) -> (OcrService, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicUsize::new(0));
        let mut config = OcrConfig::new("models").with_language(Language::En);
        config.detect_page = false;
        let service = OcrService::with_components(
            config,
            Box::new(FixedWords(boxes)),
            Box::new(CountingClassifier {
                calls: Arc::clone(&calls),
                seen: Arc::clone(&seen),
            }),
        );
        (service, calls, seen)
    }

    /// White page with three well separated letters inside (20..200, 20..80)
    /// and a blank area at (220..300, 20..80).
    fn sample_page() -> RgbImage {
        let mut page = RgbImage::from_pixel(320, 100, Rgb([250, 250, 250]));
        for &(x0, x1) in &[(30u32, 50u32), (90, 110), (150, 170)] {
            for y in 30..70 {
                for x in x0..x1 {
                    page.put_pixel(x, y, Rgb([10, 10, 10]));
                }
            }
        }
        // A speck far too small to be a character.
        page.put_pixel(190, 50, Rgb([10, 10, 10]));
        page
    }

    #[test]
    fn test_pipeline_classifies_letters() {
        let (service, calls, seen) = service(vec![BoundingBox::new(20, 20, 200, 80)]);
        let result = service.recognize(&sample_page()).unwrap();

        assert_eq!(result.words.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(result.words[0].text, "AAA");
        assert_eq!(result.words[0].chars, 3);
        assert_eq!(result.text, "AAA");
        assert!(!result.page.detected);
    }

    #[test]
    fn test_blank_word_is_empty_and_skips_classifier() {
        let (service, calls, _) = service(vec![
            BoundingBox::new(20, 20, 200, 80),
            BoundingBox::new(220, 20, 300, 80),
        ]);
        let result = service.recognize(&sample_page()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.words[1].text, "");
        assert_eq!(result.words[1].chars, 0);
        assert_eq!(result.text, "AAA ");
    }

    #[test]
    fn test_empty_and_out_of_page_boxes_are_skipped() {
        let (service, calls, _) = service(vec![
            BoundingBox::new(50, 50, 50, 80),
            BoundingBox::new(400, 10, 500, 90),
        ]);
        let result = service.recognize(&sample_page()).unwrap();
        assert!(result.words.is_empty());
        assert_eq!(result.text, "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_recognize_bytes_rejects_garbage() {
        let (service, _, _) = service(Vec::new());
        assert!(service.recognize_bytes(b"definitely not an image").is_err());
    }

    #[test]
    fn test_recognize_file_missing() {
        let (service, _, _) = service(Vec::new());
        assert!(service.recognize_file(Path::new("/nonexistent/1.jpg")).is_err());
    }
}
