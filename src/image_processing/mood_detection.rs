use anyhow::{anyhow, Result};
use image::RgbImage;

use super::preprocess::Preprocessor;
use super::ImageInput;
use crate::mood::{Mood, MoodPrediction};

/// A model that maps a prepared `pixel_values` tensor to one logit per mood
///
/// Implementations hold no per-request state; they are shared read-only
/// between every classification call.
pub trait MoodClassifier: Send + Sync {
    /// Run one forward pass over an NCHW tensor
    fn logits(&self, pixel_values: Vec<f32>, shape: [usize; 4]) -> Result<Vec<f32>>;

    /// Mood for each logit index
    fn labels(&self) -> &[Mood];
}

/// Classify one image: normalize to RGB, preprocess, forward pass, softmax, argmax
pub fn detect_mood(
    image: &ImageInput<'_>,
    model: &dyn MoodClassifier,
    preprocessor: &Preprocessor,
) -> Result<MoodPrediction> {
    let rgb = image.to_rgb()?;
    classify_rgb(&rgb, model, preprocessor)
}

/// Classify an already-normalized RGB image
pub fn classify_rgb(
    rgb: &RgbImage,
    model: &dyn MoodClassifier,
    preprocessor: &Preprocessor,
) -> Result<MoodPrediction> {
    let (pixel_values, shape) = preprocessor.prepare(rgb)?;
    classify_tensor(pixel_values, shape, model)
}

/// Classify a tensor produced by [`Preprocessor::prepare`]
pub fn classify_tensor(
    pixel_values: Vec<f32>,
    shape: [usize; 4],
    model: &dyn MoodClassifier,
) -> Result<MoodPrediction> {
    let logits = model.logits(pixel_values, shape)?;
    predict_from_logits(&logits, model.labels())
}

/// Turn a logit vector into the winning mood and its softmax probability
pub fn predict_from_logits(logits: &[f32], labels: &[Mood]) -> Result<MoodPrediction> {
    if logits.len() != labels.len() {
        return Err(anyhow!(
            "Model produced {} logits but {} labels are configured",
            logits.len(),
            labels.len()
        ));
    }
    if logits.iter().any(|l| !l.is_finite()) {
        return Err(anyhow!("Model produced non-finite logits"));
    }

    let probabilities = softmax(logits);

    // First maximum wins on ties, like argmax
    let mut best = 0;
    for (index, probability) in probabilities.iter().enumerate() {
        if *probability > probabilities[best] {
            best = index;
        }
    }

    let scores = labels.iter().copied().zip(probabilities.iter().copied()).collect();

    Ok(MoodPrediction {
        mood: labels[best],
        confidence: probabilities[best],
        scores,
    })
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let exp_sum: f32 = exp.iter().sum();
    exp.iter().map(|&x| x / exp_sum).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::image_processing::ChannelOrder;
    use crate::mood::MOOD_COUNT;
    use image::{ImageBuffer, Rgb};

    /// Deterministic stand-in for the ONNX model: logits derived from channel means
    pub(crate) struct ChannelMeanClassifier {
        labels: Vec<Mood>,
    }

    impl ChannelMeanClassifier {
        pub(crate) fn new() -> Self {
            Self {
                labels: Mood::default_order(),
            }
        }
    }

    impl MoodClassifier for ChannelMeanClassifier {
        fn logits(&self, pixel_values: Vec<f32>, shape: [usize; 4]) -> Result<Vec<f32>> {
            let plane = shape[2] * shape[3];
            let mean = |c: usize| {
                pixel_values[c * plane..(c + 1) * plane].iter().sum::<f32>() / plane as f32
            };
            let (r, g, b) = (mean(0), mean(1), mean(2));
            Ok(vec![2.0 * r, g, b, -r, -g, -b, 0.5])
        }

        fn labels(&self) -> &[Mood] {
            &self.labels
        }
    }

    fn small_preprocessor() -> Preprocessor {
        serde_json::from_str(r#"{"size": {"height": 8, "width": 8}}"#).unwrap()
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probabilities = softmax(&[1.0, 2.0, 3.0, -1.0, 0.0, 0.5, 10.0]);
        let sum: f32 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_softmax_handles_large_logits() {
        let probabilities = softmax(&[1000.0, 1000.0]);
        assert!((probabilities[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_predict_from_logits_picks_argmax() {
        let prediction =
            predict_from_logits(&[0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0], &Mood::default_order())
                .unwrap();
        assert_eq!(prediction.mood, Mood::Happy);
        let expected = 5.0f32.exp() / (5.0f32.exp() + 6.0);
        assert!((prediction.confidence - expected).abs() < 1e-6);
        assert_eq!(prediction.scores.len(), MOOD_COUNT);
    }

    #[test]
    fn test_confidence_matches_label_probability() {
        let prediction = predict_from_logits(
            &[0.3, -1.2, 2.2, 0.1, 1.9, -0.4, 0.0],
            &Mood::default_order(),
        )
        .unwrap();
        let (_, score) = prediction
            .scores
            .iter()
            .find(|(mood, _)| *mood == prediction.mood)
            .unwrap();
        assert_eq!(*score, prediction.confidence);
        assert!(prediction.scores.iter().all(|(_, p)| *p <= prediction.confidence));
    }

    #[test]
    fn test_ties_resolve_to_first_index() {
        let prediction =
            predict_from_logits(&[1.0; MOOD_COUNT], &Mood::default_order()).unwrap();
        assert_eq!(prediction.mood, Mood::Angry);
    }

    #[test]
    fn test_logit_count_mismatch_is_error() {
        assert!(predict_from_logits(&[0.0, 1.0], &Mood::default_order()).is_err());
        assert!(predict_from_logits(&[f32::NAN; MOOD_COUNT], &Mood::default_order()).is_err());
    }

    #[test]
    fn test_detect_mood_is_deterministic() {
        let model = ChannelMeanClassifier::new();
        let preprocessor = small_preprocessor();
        let img: RgbImage = ImageBuffer::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 90]));
        let input = ImageInput::Pixels {
            data: img.as_raw(),
            width: 16,
            height: 16,
            order: ChannelOrder::Rgb,
        };

        let first = detect_mood(&input, &model, &preprocessor).unwrap();
        let second = detect_mood(&input, &model, &preprocessor).unwrap();
        assert_eq!(first, second);
        assert!((0.0..=1.0).contains(&first.confidence));
    }

    #[test]
    fn test_bgr_input_matches_rgb_input() {
        let model = ChannelMeanClassifier::new();
        let preprocessor = small_preprocessor();
        let rgb: Vec<u8> = [230u8, 20, 40].repeat(4 * 4);
        let bgr: Vec<u8> = [40u8, 20, 230].repeat(4 * 4);

        let from_rgb = detect_mood(
            &ImageInput::Pixels { data: &rgb, width: 4, height: 4, order: ChannelOrder::Rgb },
            &model,
            &preprocessor,
        )
        .unwrap();
        let from_bgr = detect_mood(
            &ImageInput::Pixels { data: &bgr, width: 4, height: 4, order: ChannelOrder::Bgr },
            &model,
            &preprocessor,
        )
        .unwrap();

        assert_eq!(from_rgb, from_bgr);
        // A strongly red image drives the first logit
        assert_eq!(from_rgb.mood, Mood::Angry);
    }

    #[test]
    fn test_detect_mood_from_encoded_bytes() {
        let model = ChannelMeanClassifier::new();
        let preprocessor = small_preprocessor();
        let img: RgbImage = ImageBuffer::from_pixel(10, 10, Rgb([128, 128, 255]));
        let mut png = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let prediction = detect_mood(&ImageInput::Bytes(&png), &model, &preprocessor).unwrap();
        // Only the blue channel is far from mid-gray
        assert_eq!(prediction.mood, Mood::Fear);
    }
}
