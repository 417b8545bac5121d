// ============================================================
// Layer 3 — Dementia Severity Classes
// ============================================================
// The training folders are named after the severity classes,
// and the label index of each class is its position in the
// alphabetically sorted folder list:
//
//   0  mild_demented
//   1  moderate_demented
//   2  no_demented
//   3  very_mild_demented
//
// The index order here MUST match the sorted folder order,
// otherwise predictions map to the wrong label.

use serde::{Deserialize, Serialize};

/// One of the four severity classes the classifier predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DementiaClass {
    MildDemented,
    ModerateDemented,
    NoDemented,
    VeryMildDemented,
}

impl DementiaClass {
    /// All classes in label-index order.
    pub const ALL: [DementiaClass; 4] = [
        DementiaClass::MildDemented,
        DementiaClass::ModerateDemented,
        DementiaClass::NoDemented,
        DementiaClass::VeryMildDemented,
    ];

    /// The folder / API label, e.g. `"no_demented"`.
    pub fn label(&self) -> &'static str {
        match self {
            DementiaClass::MildDemented     => "mild_demented",
            DementiaClass::ModerateDemented => "moderate_demented",
            DementiaClass::NoDemented       => "no_demented",
            DementiaClass::VeryMildDemented => "very_mild_demented",
        }
    }

    /// Human-readable description shown to the end user (English + Russian).
    pub fn description_ru(&self) -> &'static str {
        match self {
            DementiaClass::NoDemented       => "No Demented (Нет признаков деменции)",
            DementiaClass::VeryMildDemented => "Very Mild Demented (Очень лёгкая деменция)",
            DementiaClass::MildDemented     => "Mild Demented (Лёгкая деменция)",
            DementiaClass::ModerateDemented => "Moderate Demented (Умеренная деменция)",
        }
    }

    /// Parse a folder label. Case-insensitive; `-` and spaces are
    /// treated like `_` so "Very Mild Demented" and "very-mild-demented"
    /// both resolve.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalised: String = label
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        Self::ALL.into_iter().find(|c| c.label() == normalised)
    }

    /// Default class list, used when a checkpoint carries no class names.
    pub fn default_class_names() -> Vec<String> {
        Self::ALL.iter().map(|c| c.label().to_string()).collect()
    }
}

impl std::fmt::Display for DementiaClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_alphabetical() {
        let labels: Vec<&str> = DementiaClass::ALL.iter().map(|c| c.label()).collect();
        let mut sorted = labels.clone();
        sorted.sort();
        assert_eq!(labels, sorted);
    }

    #[test]
    fn test_from_label_variants() {
        assert_eq!(DementiaClass::from_label("no_demented"), Some(DementiaClass::NoDemented));
        assert_eq!(
            DementiaClass::from_label("Very Mild Demented"),
            Some(DementiaClass::VeryMildDemented)
        );
        assert_eq!(
            DementiaClass::from_label("moderate-demented"),
            Some(DementiaClass::ModerateDemented)
        );
        assert_eq!(DementiaClass::from_label("healthy"), None);
    }

    #[test]
    fn test_description_mentions_label() {
        assert!(DementiaClass::MildDemented.description_ru().starts_with("Mild Demented"));
    }
}
