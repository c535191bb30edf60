//! Face Detector/Embedder (C4). See §4.4.
//!
//! [`FaceEmbedder`] is the pluggable-backend seam: [`OnnxFaceEmbedder`] runs
//! real ONNX detector/embedder models via `ort`, loading a `Session` and
//! running inference; tests use [`StubFaceEmbedder`] instead of requiring
//! model files on disk.

use std::path::Path;

use image::GenericImageView;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;

use facegate_core::{Error, FaceQuality};

/// Result of analyzing one image for a face. Mirrors §4.4's
/// `analyze()` success shape.
#[derive(Debug, Clone)]
pub struct FaceAnalysis {
    pub embedding: Vec<f32>,
    pub detection_score: f32,
    pub quality: FaceQuality,
}

#[derive(Debug, Clone, Copy)]
struct BoundingBox {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    score: f32,
}

impl BoundingBox {
    fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
}

/// Pluggable face detection + embedding backend.
pub trait FaceEmbedder: Send + Sync {
    fn analyze(&self, image_bytes: &[u8]) -> Result<FaceAnalysis, Error>;
}

const EMBEDDER_INPUT_SIZE: u32 = 112;
const DETECTOR_INPUT_SIZE: u32 = 320;

/// Two-stage ONNX backend: a detector model produces bounding boxes, the
/// largest one (ties broken by score, per §4.4) is cropped and passed
/// to an embedder model which produces the 512-d identity vector.
pub struct OnnxFaceEmbedder {
    detector: Mutex<Session>,
    embedder: Mutex<Session>,
    detection_threshold: f32,
}

impl OnnxFaceEmbedder {
    pub fn load(
        detector_model_path: impl AsRef<Path>,
        embedder_model_path: impl AsRef<Path>,
        detection_threshold: f32,
    ) -> Result<Self, Error> {
        let detector = build_session(detector_model_path)?;
        let embedder = build_session(embedder_model_path)?;
        Ok(OnnxFaceEmbedder {
            detector: Mutex::new(detector),
            embedder: Mutex::new(embedder),
            detection_threshold,
        })
    }

    fn detect(&self, image: &image::DynamicImage) -> Result<Vec<BoundingBox>, Error> {
        let resized = image.resize_exact(
            DETECTOR_INPUT_SIZE,
            DETECTOR_INPUT_SIZE,
            image::imageops::FilterType::Triangle,
        );
        let input = image_to_chw_tensor(&resized, DETECTOR_INPUT_SIZE);
        let input_tensor = Tensor::from_array(input)
            .map_err(|e| Error::ModelUnavailable(format!("preparing detector input: {e}")))?;

        let mut session = self.detector.lock();
        let outputs = session
            .run(ort::inputs!["input" => input_tensor])
            .map_err(|e| Error::ModelUnavailable(format!("running face detector: {e}")))?;

        // Expected layout: a [N, 5] tensor of (x, y, w, h, score) in
        // normalized [0,1] detector-space coordinates.
        let (shape, data) = outputs
            .get("detections")
            .ok_or_else(|| Error::ModelUnavailable("detector missing 'detections' output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::ModelUnavailable(format!("reading detector output: {e}")))?;

        if shape.len() != 2 || shape[1] != 5 {
            return Err(Error::ModelUnavailable(
                "detector output has unexpected shape".to_string(),
            ));
        }

        let (img_w, img_h) = image.dimensions();
        let mut boxes = Vec::new();
        for row in data.chunks_exact(5) {
            let score = row[4];
            if score < self.detection_threshold {
                continue;
            }
            boxes.push(BoundingBox {
                x: (row[0] * img_w as f32) as u32,
                y: (row[1] * img_h as f32) as u32,
                w: (row[2] * img_w as f32).max(1.0) as u32,
                h: (row[3] * img_h as f32).max(1.0) as u32,
                score,
            });
        }
        Ok(boxes)
    }

    fn embed(&self, crop: &image::DynamicImage) -> Result<Vec<f32>, Error> {
        let resized = crop.resize_exact(
            EMBEDDER_INPUT_SIZE,
            EMBEDDER_INPUT_SIZE,
            image::imageops::FilterType::Triangle,
        );
        let input = image_to_chw_tensor(&resized, EMBEDDER_INPUT_SIZE);
        let input_tensor = Tensor::from_array(input)
            .map_err(|e| Error::ModelUnavailable(format!("preparing embedder input: {e}")))?;

        let mut session = self.embedder.lock();
        let outputs = session
            .run(ort::inputs!["input" => input_tensor])
            .map_err(|e| Error::ModelUnavailable(format!("running face embedder: {e}")))?;

        let (_, data) = outputs
            .get("embedding")
            .ok_or_else(|| Error::ModelUnavailable("embedder missing 'embedding' output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::ModelUnavailable(format!("reading embedder output: {e}")))?;

        Ok(l2_normalize(data.to_vec()))
    }
}

impl FaceEmbedder for OnnxFaceEmbedder {
    fn analyze(&self, image_bytes: &[u8]) -> Result<FaceAnalysis, Error> {
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| Error::DecodeError(e.to_string()))?;

        let mut boxes = self.detect(&image)?;
        if boxes.is_empty() {
            return Err(Error::NoFaceDetected);
        }

        // Largest bounding box wins; ties broken by highest detection score
        // (§4.4).
        boxes.sort_by(|a, b| {
            b.area()
                .cmp(&a.area())
                .then(b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
        });
        let best = boxes[0];
        if boxes.len() > 1 && boxes[1].area() == best.area() && (boxes[1].score - best.score).abs() < f32::EPSILON {
            return Err(Error::MultipleFaces);
        }

        let (img_w, img_h) = image.dimensions();
        let crop = image.crop_imm(
            best.x.min(img_w.saturating_sub(1)),
            best.y.min(img_h.saturating_sub(1)),
            best.w.min(img_w - best.x.min(img_w.saturating_sub(1))).max(1),
            best.h.min(img_h - best.y.min(img_h.saturating_sub(1))).max(1),
        );

        let sharpness = estimate_sharpness(&crop);
        let embedding = self.embed(&crop)?;

        Ok(FaceAnalysis {
            embedding,
            detection_score: best.score,
            quality: FaceQuality {
                bbox_area: best.area() as f32 / (img_w as f32 * img_h as f32),
                sharpness,
                pose: 0.0,
            },
        })
    }
}

fn build_session(model_path: impl AsRef<Path>) -> Result<Session, Error> {
    Session::builder()
        .map_err(|e| Error::ModelUnavailable(format!("creating session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| Error::ModelUnavailable(format!("setting optimization level: {e}")))?
        .with_intra_threads(1)
        .map_err(|e| Error::ModelUnavailable(format!("setting intra threads: {e}")))?
        .commit_from_file(model_path)
        .map_err(|e| Error::ModelUnavailable(format!("loading model: {e}")))
}

fn image_to_chw_tensor(image: &image::DynamicImage, size: u32) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let mut array = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            array[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    array
}

fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
    vector
}

/// Variance-of-Laplacian sharpness estimate on the grayscale crop; higher
/// means sharper. Used only as a quality metric recorded alongside the
/// embedding, never to gate acceptance.
fn estimate_sharpness(crop: &image::DynamicImage) -> f32 {
    let gray = crop.to_luma8();
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = gray.get_pixel(x, y)[0] as f64;
            let up = gray.get_pixel(x, y - 1)[0] as f64;
            let down = gray.get_pixel(x, y + 1)[0] as f64;
            let left = gray.get_pixel(x - 1, y)[0] as f64;
            let right = gray.get_pixel(x + 1, y)[0] as f64;
            let laplacian = up + down + left + right - 4.0 * center;
            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0) as f32
}

/// Deterministic stand-in used by tests and by environments without model
/// files: derives a stable pseudo-embedding from the image bytes so the
/// same input always analyzes to the same vector.
pub struct StubFaceEmbedder {
    pub dims: usize,
    pub fixed_score: f32,
}

impl Default for StubFaceEmbedder {
    fn default() -> Self {
        StubFaceEmbedder {
            dims: 512,
            fixed_score: 0.95,
        }
    }
}

impl FaceEmbedder for StubFaceEmbedder {
    fn analyze(&self, image_bytes: &[u8]) -> Result<FaceAnalysis, Error> {
        if image_bytes.is_empty() {
            return Err(Error::DecodeError("empty image payload".to_string()));
        }
        if image_bytes == b"no-face" {
            return Err(Error::NoFaceDetected);
        }
        if image_bytes == b"multiple-faces" {
            return Err(Error::MultipleFaces);
        }

        let mut embedding = vec![0.0f32; self.dims];
        for (i, byte) in image_bytes.iter().enumerate() {
            embedding[i % self.dims] += *byte as f32;
        }
        let embedding = l2_normalize(embedding);

        Ok(FaceAnalysis {
            embedding,
            detection_score: self.fixed_score,
            quality: FaceQuality {
                bbox_area: 0.3,
                sharpness: 120.0,
                pose: 0.0,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_embedder_is_deterministic() {
        let embedder = StubFaceEmbedder::default();
        let a = embedder.analyze(b"some-jpeg-bytes").unwrap();
        let b = embedder.analyze(b"some-jpeg-bytes").unwrap();
        assert_eq!(a.embedding, b.embedding);
    }

    #[test]
    fn stub_embedder_produces_unit_vectors() {
        let embedder = StubFaceEmbedder::default();
        let analysis = embedder.analyze(b"some-jpeg-bytes").unwrap();
        let norm: f32 = analysis.embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn stub_embedder_reports_no_face_sentinel() {
        let embedder = StubFaceEmbedder::default();
        assert!(matches!(
            embedder.analyze(b"no-face"),
            Err(Error::NoFaceDetected)
        ));
    }

    #[test]
    fn stub_embedder_reports_multiple_faces_sentinel() {
        let embedder = StubFaceEmbedder::default();
        assert!(matches!(
            embedder.analyze(b"multiple-faces"),
            Err(Error::MultipleFaces)
        ));
    }
}
