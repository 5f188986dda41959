/// The linear (multinomial logistic) classifier. A model is an affine
/// transform over a feature vector followed by a numerically stable softmax
/// and a stable arg-max; prediction is a pure function of its inputs.

use ndarray::{Array1, Array2};

use crate::error::{Error, Result};

/// Trained weights for one feature strategy: a D x C weight matrix and a
/// length-C bias vector, where C is the number of classes. Loaded once at
/// startup and read-only afterwards, so one instance is safely shared by
/// any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct Model {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

/// The classifier's decision: the winning class index and the full
/// probability vector it was drawn from, index-aligned to class labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub probabilities: Array1<f32>,
}

impl Model {
    pub fn new(weights: Array2<f32>, bias: Array1<f32>) -> Model {
        Model { weights, bias }
    }

    /// Feature vector length this model expects (rows of the weight matrix).
    pub fn input_len(&self) -> usize {
        self.weights.nrows()
    }

    pub fn class_count(&self) -> usize {
        self.bias.len()
    }

    /// Classify a feature vector.
    ///
    /// The feature length must equal the weight matrix row count; a mismatch
    /// is a `ShapeMismatch` error, never a reshape, since a silent reshape
    /// could misalign data and still produce a plausible-looking answer.
    pub fn predict(&self, features: &Array1<f32>) -> Result<Prediction> {
        if features.len() != self.weights.nrows() {
            return Err(Error::ShapeMismatch {
                expected: self.weights.nrows(),
                actual: features.len(),
            });
        }

        let logits = features.dot(&self.weights) + &self.bias;
        let probabilities = softmax(&logits);
        let class_index = argmax(&probabilities);

        Ok(Prediction {
            class_index,
            probabilities,
        })
    }
}

/// Shifted softmax: subtracting the maximum logit before exponentiating
/// keeps the exponentials in range, so large logits normalize instead of
/// overflowing to infinity.
fn softmax(logits: &Array1<f32>) -> Array1<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exponentials = logits.mapv(|logit| (logit - max).exp());
    let sum = exponentials.sum();
    exponentials / sum
}

/// First maximal index wins: scan left to right, replace only on a strictly
/// greater value.
fn argmax(values: &Array1<f32>) -> usize {
    let mut best = 0;
    for (index, &value) in values.iter().enumerate() {
        if value > values[best] {
            best = index;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    use super::*;

    const CLASSES: usize = 10;

    fn zero_model(input_len: usize) -> Model {
        Model::new(
            Array2::zeros((input_len, CLASSES)),
            Array1::zeros(CLASSES),
        )
    }

    #[test]
    fn probabilities_sum_to_one_and_stay_in_range() {
        let logits = Array1::from_vec(vec![0.3, -1.2, 4.0, 0.0, 2.5, -0.7, 1.1, 0.2, -3.0, 0.9]);
        let probabilities = softmax(&logits);
        assert_abs_diff_eq!(probabilities.sum(), 1.0, epsilon = 1e-6);
        assert!(probabilities.iter().all(|&p| p > 0.0 && p <= 1.0));
    }

    #[test]
    fn softmax_does_not_overflow_on_large_logits() {
        let mut logits = Array1::zeros(CLASSES);
        logits[3] = 10_000.0;
        logits[7] = 9_999.0;
        let probabilities = softmax(&logits);
        assert!(probabilities.iter().all(|p| p.is_finite()));
        assert_abs_diff_eq!(probabilities.sum(), 1.0, epsilon = 1e-6);
        assert!(probabilities[3] > probabilities[7]);
    }

    #[test]
    fn uniform_logits_break_ties_toward_index_zero() {
        let prediction = zero_model(4)
            .predict(&Array1::from_elem(4, 0.25))
            .unwrap();
        assert_eq!(prediction.class_index, 0);
        assert_abs_diff_eq!(prediction.probabilities.sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn bias_alone_can_decide_the_class() {
        let mut bias = Array1::zeros(CLASSES);
        bias[1] = 10.0;
        let model = Model::new(Array2::zeros((784, CLASSES)), bias);
        let prediction = model.predict(&Array1::ones(784)).unwrap();
        assert_eq!(prediction.class_index, 1);
        let top = prediction.probabilities[1];
        assert!(prediction
            .probabilities
            .iter()
            .enumerate()
            .all(|(index, &p)| index == 1 || p < top));
    }

    #[test]
    fn weights_drive_the_logits() {
        let mut weights = Array2::zeros((2, 3));
        weights[[0, 2]] = 2.0;
        weights[[1, 0]] = 1.0;
        let model = Model::new(weights, Array1::zeros(3));
        let prediction = model.predict(&Array1::from_vec(vec![1.0, 0.5])).unwrap();
        // logits = [0.5, 0.0, 2.0]
        assert_eq!(prediction.class_index, 2);
    }

    #[test]
    fn mismatched_feature_length_is_rejected_before_any_math() {
        let result = zero_model(784).predict(&Array1::zeros(196));
        match result {
            Err(Error::ShapeMismatch { expected, actual }) => {
                assert_eq!(expected, 784);
                assert_eq!(actual, 196);
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }
}
