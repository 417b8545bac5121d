// ============================================================
// Layer 3 — Prediction Domain Type
// ============================================================
// The result of classifying one scan. Serialised as the JSON
// body of POST /predict:
//
//   {
//     "label":    "no_demented",
//     "label_ru": "No Demented (Нет признаков деменции)",
//     "prob":     0.91,
//     "probs":    { "mild_demented": 0.03, ... }
//   }

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::domain::severity::DementiaClass;

/// Classification result for a single scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Label of the most probable class
    pub label: String,

    /// Localised description of `label`, or the raw label for
    /// classes outside the four known severities
    pub label_ru: String,

    /// Probability of `label`
    pub prob: f64,

    /// Probability of every class, keyed by class label
    pub probs: BTreeMap<String, f64>,
}

/// An uploaded scan: raw file bytes plus the client-side filename
/// (used to detect DICOM uploads by extension).
#[derive(Debug, Clone)]
pub struct ScanUpload {
    pub filename: Option<String>,
    pub bytes:    Vec<u8>,
}

impl ScanUpload {
    pub fn new(filename: Option<String>, bytes: Vec<u8>) -> Self {
        Self { filename, bytes }
    }

    /// Lower-cased file extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.filename.as_deref()?;
        std::path::Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    pub fn is_dicom(&self) -> bool {
        self.extension().as_deref() == Some("dcm")
    }
}

impl Prediction {
    /// Build a prediction from a softmax vector aligned with `class_names`.
    pub fn from_probabilities(class_names: &[String], probs: &[f32]) -> Result<Self> {
        if probs.is_empty() {
            bail!("Model returned an empty probability vector");
        }
        if probs.len() != class_names.len() {
            bail!(
                "Model returned {} probabilities but {} classes are known",
                probs.len(),
                class_names.len()
            );
        }

        // argmax; the first maximum wins on ties
        let mut best = 0usize;
        for (i, &p) in probs.iter().enumerate() {
            if p > probs[best] {
                best = i;
            }
        }

        let label    = class_names[best].clone();
        let label_ru = DementiaClass::from_label(&label)
            .map(|c| c.description_ru().to_string())
            .unwrap_or_else(|| label.clone());

        let probs_map = class_names
            .iter()
            .cloned()
            .zip(probs.iter().map(|&p| p as f64))
            .collect();

        Ok(Self {
            label,
            label_ru,
            prob: probs[best] as f64,
            probs: probs_map,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        DementiaClass::default_class_names()
    }

    #[test]
    fn test_picks_argmax() {
        let p = Prediction::from_probabilities(&names(), &[0.1, 0.05, 0.8, 0.05]).unwrap();
        assert_eq!(p.label, "no_demented");
        assert_eq!(p.label_ru, "No Demented (Нет признаков деменции)");
        assert!((p.prob - 0.8).abs() < 1e-6);
        assert_eq!(p.probs.len(), 4);
        assert!((p.probs["mild_demented"] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_label_falls_back() {
        let names = vec!["healthy".to_string(), "sick".to_string()];
        let p = Prediction::from_probabilities(&names, &[0.3, 0.7]).unwrap();
        assert_eq!(p.label, "sick");
        assert_eq!(p.label_ru, "sick");
    }

    #[test]
    fn test_length_mismatch_is_error() {
        assert!(Prediction::from_probabilities(&names(), &[0.5, 0.5]).is_err());
        assert!(Prediction::from_probabilities(&names(), &[]).is_err());
    }

    #[test]
    fn test_serialises_expected_keys() {
        let p = Prediction::from_probabilities(&names(), &[0.7, 0.1, 0.1, 0.1]).unwrap();
        let json = serde_json::to_value(&p).unwrap();
        for key in ["label", "label_ru", "prob", "probs"] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn test_upload_detects_dicom() {
        let up = ScanUpload::new(Some("scan.DCM".into()), vec![]);
        assert!(up.is_dicom());
        let up = ScanUpload::new(Some("scan.png".into()), vec![]);
        assert!(!up.is_dicom());
        let up = ScanUpload::new(None, vec![]);
        assert_eq!(up.extension(), None);
    }
}
