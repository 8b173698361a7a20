//! The six-section recyclability assessment returned by the vision model.
//!
//! Only top-level presence is checked when a report is built; sub-fields stay
//! as raw JSON so the renderer can report precisely which one is unusable.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

use crate::error::ExtractError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Object,
    Material,
    Recyclability,
    Procedure,
    EnvironmentalImpact,
    Recommendations,
}

impl Section {
    /// Validation order. The first absent section is the one reported.
    pub const ORDER: [Section; 6] = [
        Section::Object,
        Section::Material,
        Section::Recyclability,
        Section::Procedure,
        Section::EnvironmentalImpact,
        Section::Recommendations,
    ];

    /// Key used in the model's JSON output.
    pub fn key(self) -> &'static str {
        match self {
            Section::Object => "nesne",
            Section::Material => "malzeme",
            Section::Recyclability => "geri_donusum",
            Section::Procedure => "prosedur",
            Section::EnvironmentalImpact => "cevresel_etki",
            Section::Recommendations => "oneriler",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    #[serde(rename = "nesne")]
    pub object: Value,
    #[serde(rename = "malzeme")]
    pub material: Value,
    #[serde(rename = "geri_donusum")]
    pub recyclability: Value,
    #[serde(rename = "prosedur")]
    pub procedure: Value,
    #[serde(rename = "cevresel_etki")]
    pub environmental_impact: Value,
    #[serde(rename = "oneriler")]
    pub recommendations: Value,
}

impl AnalysisReport {
    /// Checks the six sections in [`Section::ORDER`] and fails on the first
    /// one that is absent or null. A non-object document has no sections.
    pub fn from_value(value: Value) -> Result<Self, ExtractError> {
        let mut map = match value {
            Value::Object(map) => map,
            _ => return Err(ExtractError::MissingField { field: Section::Object }),
        };

        for section in Section::ORDER {
            match map.get(section.key()) {
                None | Some(Value::Null) => {
                    return Err(ExtractError::MissingField { field: section });
                }
                Some(_) => {}
            }
        }

        let mut take = |section: Section| map.remove(section.key()).unwrap_or(Value::Null);
        Ok(Self {
            object: take(Section::Object),
            material: take(Section::Material),
            recyclability: take(Section::Recyclability),
            procedure: take(Section::Procedure),
            environmental_impact: take(Section::EnvironmentalImpact),
            recommendations: take(Section::Recommendations),
        })
    }

    pub fn section(&self, section: Section) -> &Value {
        match section {
            Section::Object => &self.object,
            Section::Material => &self.material,
            Section::Recyclability => &self.recyclability,
            Section::Procedure => &self.procedure,
            Section::EnvironmentalImpact => &self.environmental_impact,
            Section::Recommendations => &self.recommendations,
        }
    }

    /// Best-effort typed view. Fields the model left out or phrased outside
    /// the expected vocabulary come back as `None`.
    pub fn summary(&self) -> ReportSummary {
        let text = |section: Section, key: &str| {
            self.section(section)
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        ReportSummary {
            name: text(Section::Object, "isim"),
            category: text(Section::Object, "kategori").and_then(|s| ObjectCategory::classify(&s)),
            purity: text(Section::Material, "saflik_durumu").and_then(|s| Purity::classify(&s)),
            eligible: text(Section::Recyclability, "uygunluk").and_then(|s| Eligibility::classify(&s)),
            eligibility_percent: self
                .recyclability
                .get("uygunluk_yuzdesi")
                .and_then(parse_percent),
            bin_color: text(Section::Recyclability, "kutu_rengi").and_then(|s| BinColor::classify(&s)),
            risk_level: text(Section::EnvironmentalImpact, "risk_seviyesi")
                .and_then(|s| RiskLevel::classify(&s)),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub name: Option<String>,
    pub category: Option<ObjectCategory>,
    pub purity: Option<Purity>,
    pub eligible: Option<Eligibility>,
    pub eligibility_percent: Option<u8>,
    pub bin_color: Option<BinColor>,
    pub risk_level: Option<RiskLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectCategory {
    Electronics,
    Plastic,
    Metal,
    Paper,
    Glass,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Purity {
    SingleMaterial,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Eligibility {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinColor {
    Blue,
    Green,
    Gray,
    Yellow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl ObjectCategory {
    pub fn classify(raw: &str) -> Option<Self> {
        match fold(raw).as_str() {
            "ELEKTRONIK" | "ELECTRONICS" => Some(Self::Electronics),
            "PLASTIK" | "PLASTIC" => Some(Self::Plastic),
            "METAL" => Some(Self::Metal),
            "KAGIT" | "PAPER" => Some(Self::Paper),
            "CAM" | "GLASS" => Some(Self::Glass),
            "DIGER" | "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

impl Purity {
    pub fn classify(raw: &str) -> Option<Self> {
        match fold(raw).as_str() {
            "TEK_MALZEME" | "SINGLE_MATERIAL" => Some(Self::SingleMaterial),
            "KARISIK" | "MIXED" => Some(Self::Mixed),
            _ => None,
        }
    }
}

impl Eligibility {
    pub fn classify(raw: &str) -> Option<Self> {
        match fold(raw).as_str() {
            "EVET" | "YES" => Some(Self::Yes),
            "HAYIR" | "NO" => Some(Self::No),
            _ => None,
        }
    }
}

impl BinColor {
    pub fn classify(raw: &str) -> Option<Self> {
        match fold(raw).as_str() {
            "MAVI" | "BLUE" => Some(Self::Blue),
            "YESIL" | "GREEN" => Some(Self::Green),
            "GRI" | "GRAY" | "GREY" => Some(Self::Gray),
            "SARI" | "YELLOW" => Some(Self::Yellow),
            _ => None,
        }
    }
}

impl RiskLevel {
    pub fn classify(raw: &str) -> Option<Self> {
        match fold(raw).as_str() {
            "DUSUK" | "LOW" => Some(Self::Low),
            "ORTA" | "MEDIUM" => Some(Self::Medium),
            "YUKSEK" | "HIGH" => Some(Self::High),
            _ => None,
        }
    }
}

/// Uppercase ASCII form of a vocabulary word: Turkish letters lose their
/// diacritics and separators become underscores.
fn fold(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            'İ' | 'ı' => 'I',
            'Ş' | 'ş' => 'S',
            'Ğ' | 'ğ' => 'G',
            'Ü' | 'ü' => 'U',
            'Ö' | 'ö' => 'O',
            'Ç' | 'ç' => 'C',
            ' ' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

fn parse_percent(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_start_matches('%').trim_end_matches('%').trim().parse().ok()?,
        _ => return None,
    };
    (0.0..=100.0).contains(&n).then(|| n.round() as u8)
}
