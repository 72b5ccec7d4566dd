//! Built-in disease catalog used for offline/fallback diagnosis.
//!
//! The catalog is a small, fixed set of disease profiles keyed by a stable
//! id. It is built once and never mutated; entry order is significant because
//! the fallback selector picks profiles by index.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse ordinal health classification for a diagnosed crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Healthy,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// Wire string for this severity, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Healthy => "healthy",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single disease profile in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseProfile {
    /// Crop name (e.g., "Rice").
    pub crop: String,
    /// Disease name, or "healthy" for a healthy-plant profile.
    pub disease: String,
    /// Typical severity when this disease is observed.
    pub severity: Severity,
    /// Description of symptoms and progression.
    pub description: String,
    /// Ordered treatment steps. Empty for healthy profiles.
    pub treatment: Vec<String>,
    /// Ordered prevention steps.
    pub prevention: Vec<String>,
}

/// Catalog lookup errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Unknown disease id: {0}")]
    NotFound(String),
}

/// Immutable, ordered catalog of disease profiles.
pub struct DiseaseCatalog {
    entries: Vec<(String, DiseaseProfile)>,
}

impl DiseaseCatalog {
    /// Build a catalog from ordered (id, profile) pairs.
    pub fn new(entries: Vec<(String, DiseaseProfile)>) -> Self {
        Self { entries }
    }

    /// The built-in five-entry catalog covering the supported taxonomy.
    pub fn builtin() -> Self {
        Self::new(vec![
            (
                "rice_blast".to_string(),
                DiseaseProfile {
                    crop: "Rice".to_string(),
                    disease: "Rice blast".to_string(),
                    severity: Severity::Moderate,
                    description: "Spindle-shaped lesions on leaves with brown margins and \
                                  gray-white centers; severe infections merge into patches \
                                  that kill the leaf."
                        .to_string(),
                    treatment: vec![
                        "Spray tricyclazole or isoprothiolane at first symptoms".to_string(),
                        "For heavily infected fields, apply 40% isoprothiolane EC diluted 1:1000"
                            .to_string(),
                        "Repeat every 7-10 days, 2-3 applications total".to_string(),
                    ],
                    prevention: vec![
                        "Plant resistant varieties".to_string(),
                        "Fertilize in balance; avoid excess nitrogen".to_string(),
                        "Keep the field ventilated and well lit".to_string(),
                        "Remove infected plant debris promptly".to_string(),
                    ],
                },
            ),
            (
                "wheat_powdery".to_string(),
                DiseaseProfile {
                    crop: "Wheat".to_string(),
                    disease: "Powdery mildew".to_string(),
                    severity: Severity::Mild,
                    description: "White powdery mold on the leaf surface that turns gray with \
                                  age; severe cases yellow and kill the leaf."
                        .to_string(),
                    treatment: vec![
                        "Spray 15% triadimefon WP diluted 1:1500 at first symptoms".to_string(),
                        "Alternatively use 12.5% diniconazole WP diluted 1:2000".to_string(),
                        "Repeat every 10 days".to_string(),
                    ],
                    prevention: vec![
                        "Plant resistant varieties".to_string(),
                        "Sow on schedule and avoid overcrowding".to_string(),
                        "Add phosphorus and potassium to strengthen resistance".to_string(),
                        "Treat promptly at the first sign of disease".to_string(),
                    ],
                },
            ),
            (
                "corn_leaf_blight".to_string(),
                DiseaseProfile {
                    crop: "Corn".to_string(),
                    disease: "Northern leaf blight".to_string(),
                    severity: Severity::Severe,
                    description: "Long spindle-shaped gray-brown to yellow-brown lesions; \
                                  severe cases merge across the leaf and kill it early."
                        .to_string(),
                    treatment: vec![
                        "Spray 50% carbendazim WP diluted 1:500 at first symptoms".to_string(),
                        "Alternatively use 70% thiophanate-methyl WP diluted 1:800".to_string(),
                        "Focus coverage on the middle and lower leaves".to_string(),
                    ],
                    prevention: vec![
                        "Plant resistant hybrids".to_string(),
                        "Space plants for airflow".to_string(),
                        "Clear infected residue from the field after harvest".to_string(),
                        "Rotate with non-grass crops".to_string(),
                    ],
                },
            ),
            (
                "tomato_healthy".to_string(),
                DiseaseProfile {
                    crop: "Tomato".to_string(),
                    disease: "healthy".to_string(),
                    severity: Severity::Healthy,
                    description: "The plant is growing well with bright green leaves and no \
                                  visible disease symptoms; continue current management."
                        .to_string(),
                    treatment: vec![],
                    prevention: vec![
                        "Keep water and fertilizer management steady".to_string(),
                        "Inspect regularly for pests and disease".to_string(),
                        "Keep the field ventilated and well lit".to_string(),
                        "Prune side shoots on schedule".to_string(),
                    ],
                },
            ),
            (
                "potato_late_blight".to_string(),
                DiseaseProfile {
                    crop: "Potato".to_string(),
                    disease: "Late blight".to_string(),
                    severity: Severity::Severe,
                    description: "Water-soaked dark green lesions that turn brown and rot; \
                                  white mold on the leaf underside in humid weather; tubers \
                                  can also be infected."
                        .to_string(),
                    treatment: vec![
                        "Spray 68% metalaxyl-M + mancozeb WG diluted 1:600 at first symptoms"
                            .to_string(),
                        "Alternatively use 72% cymoxanil + mancozeb WP diluted 1:800".to_string(),
                        "Repeat every 5-7 days".to_string(),
                    ],
                    prevention: vec![
                        "Use certified virus-free seed potatoes".to_string(),
                        "Ridge planting to avoid standing water".to_string(),
                        "Space plants for airflow".to_string(),
                        "Remove focal infected plants as soon as they appear".to_string(),
                    ],
                },
            ),
        ])
    }

    /// All catalog keys, in entry order.
    pub fn disease_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Distinct crop names covered by the catalog, in first-seen order.
    pub fn crops(&self) -> Vec<&str> {
        let mut crops: Vec<&str> = Vec::new();
        for (_, profile) in &self.entries {
            if !crops.contains(&profile.crop.as_str()) {
                crops.push(profile.crop.as_str());
            }
        }
        crops
    }

    /// Look up a profile by catalog key.
    pub fn lookup(&self, id: &str) -> Result<&DiseaseProfile, CatalogError> {
        self.entries
            .iter()
            .find(|(key, _)| key == id)
            .map(|(_, profile)| profile)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// Profile at the given entry index, if in range.
    pub fn profile_at(&self, index: usize) -> Option<&DiseaseProfile> {
        self.entries.get(index).map(|(_, profile)| profile)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
