use serde::{Deserialize, Serialize};

/// Output classes in the order the model emits them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Class {
    Cat = 0,
    Dog = 1,
}

impl Class {
    /// All classes, indexed by class id.
    pub const ALL: [Class; 2] = [Class::Cat, Class::Dog];

    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Class::Cat => "cat",
            Class::Dog => "dog",
        }
    }
}

impl std::fmt::Display for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a model output cannot be read as a two-class distribution.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProbabilityError {
    #[error("expected {expected} class scores, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("class score {index} is not finite: {value}")]
    NotFinite { index: usize, value: f32 },
}

/// Soft-max output of the model: `(P(cat), P(dog))`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbabilityVector {
    cat: f32,
    dog: f32,
}

impl ProbabilityVector {
    pub fn new(cat: f32, dog: f32) -> Result<Self, ProbabilityError> {
        Self::from_slice(&[cat, dog])
    }

    pub fn from_slice(scores: &[f32]) -> Result<Self, ProbabilityError> {
        if scores.len() != Class::ALL.len() {
            return Err(ProbabilityError::WrongLength {
                expected: Class::ALL.len(),
                actual: scores.len(),
            });
        }
        if let Some((index, value)) = scores.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(ProbabilityError::NotFinite {
                index,
                value: *value,
            });
        }
        Ok(Self {
            cat: scores[0],
            dog: scores[1],
        })
    }

    pub fn get(&self, class: Class) -> f32 {
        match class {
            Class::Cat => self.cat,
            Class::Dog => self.dog,
        }
    }

    /// Index of the largest score. Ties go to the lowest index, so `Cat` wins them.
    pub fn argmax(&self) -> Class {
        if self.dog > self.cat {
            Class::Dog
        } else {
            Class::Cat
        }
    }
}

/// Per-class probabilities as they appear in the response body.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    pub cat: f32,
    pub dog: f32,
}

impl From<ProbabilityVector> for Probabilities {
    fn from(probs: ProbabilityVector) -> Self {
        Self {
            cat: probs.cat,
            dog: probs.dog,
        }
    }
}

/// Response record for one classified image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: Class,
    pub class_id: u8,
    pub probabilities: Probabilities,
    pub confidence: f32,
}

impl From<ProbabilityVector> for PredictionResult {
    fn from(probs: ProbabilityVector) -> Self {
        let label = probs.argmax();
        Self {
            label,
            class_id: label.id(),
            probabilities: probs.into(),
            confidence: probs.get(label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_picks_larger_score() {
        let result = PredictionResult::from(ProbabilityVector::new(0.2, 0.8).unwrap());
        assert_eq!(result.label, Class::Dog);
        assert_eq!(result.class_id, 1);
        assert_eq!(result.confidence, 0.8);

        let result = PredictionResult::from(ProbabilityVector::new(0.9, 0.1).unwrap());
        assert_eq!(result.label, Class::Cat);
        assert_eq!(result.class_id, 0);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_tie_goes_to_cat() {
        let result = PredictionResult::from(ProbabilityVector::new(0.5, 0.5).unwrap());
        assert_eq!(result.label, Class::Cat);
        assert_eq!(result.class_id, 0);
    }

    #[test]
    fn test_label_matches_probabilities() {
        for step in 0..=20 {
            let cat = step as f32 / 20.0;
            let result = PredictionResult::from(ProbabilityVector::new(cat, 1.0 - cat).unwrap());
            let p = result.probabilities;
            assert_eq!(result.label == Class::Cat, p.cat >= p.dog);
            assert_eq!(result.class_id == 0, result.label == Class::Cat);
            assert_eq!(result.confidence, p.cat.max(p.dog));
            assert!((p.cat + p.dog - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rejects_malformed_scores() {
        assert_eq!(
            ProbabilityVector::from_slice(&[1.0]),
            Err(ProbabilityError::WrongLength {
                expected: 2,
                actual: 1
            })
        );
        assert!(matches!(
            ProbabilityVector::from_slice(&[f32::NAN, 0.5]),
            Err(ProbabilityError::NotFinite { index: 0, .. })
        ));
    }

    #[test]
    fn test_serializes_lowercase_labels() {
        let result = PredictionResult::from(ProbabilityVector::new(0.25, 0.75).unwrap());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["label"], "dog");
        assert_eq!(value["class_id"], 1);
        assert_eq!(value["probabilities"]["cat"], 0.25);
        assert_eq!(value["probabilities"]["dog"], 0.75);
    }

    #[test]
    fn test_class_ids() {
        assert_eq!(Class::Cat.id(), 0);
        assert_eq!(Class::Dog.id(), 1);
        assert_eq!(Class::ALL.map(|c| c.id()), [0, 1]);
        assert_eq!(Class::Dog.to_string(), "dog");
    }
}
