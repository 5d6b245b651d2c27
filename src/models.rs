use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    #[serde(alias = "high", alias = "HIGH")]
    High,
    #[serde(alias = "moderate", alias = "MODERATE")]
    Moderate,
    #[serde(alias = "low", alias = "LOW")]
    Low,
}

impl RiskTier {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::High => "High",
            RiskTier::Moderate => "Moderate",
            RiskTier::Low => "Low",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SocioEconomicStatus {
    #[serde(alias = "low", alias = "LOW")]
    Low,
    #[serde(alias = "medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "high", alias = "HIGH")]
    High,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One row of the student dataset. The tier is the pre-labelled
/// `dropout_risk`, never recomputed from the features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentRecord {
    #[serde(alias = "id")]
    pub student_id: String,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub grade: Option<u32>,
    #[serde(default)]
    pub attendance_rate: Option<f64>,
    #[serde(default)]
    pub exam_score: Option<f64>,
    #[serde(default)]
    pub socio_economic_status: SocioEconomicStatus,
    #[serde(default)]
    pub transport_allowance_used: bool,
    #[serde(default)]
    pub migration_indicator: bool,
    #[serde(default)]
    pub previous_grade_failures: Option<u32>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub social_category: String,
    pub dropout_risk: RiskTier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub tier: RiskTier,
    pub probability: u8,
    pub reasons: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Assessment merged with the identifying fields of its record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRisk {
    pub student_id: String,
    pub risk: RiskTier,
    pub probability: u8,
    pub district: String,
    pub grade: Option<u32>,
    pub reasons: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AtRiskStudent {
    pub id: String,
    pub name: String,
    pub district: String,
    pub grade: Option<u32>,
    pub risk: RiskTier,
    pub probability: u8,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictStats {
    pub district: String,
    pub total_students: usize,
    pub high_risk: usize,
    pub moderate_risk: usize,
    pub low_risk: usize,
    pub average_risk_probability: f64,
    pub average_attendance: u32,
    pub interventions_active: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskDistribution {
    pub high_risk: usize,
    pub moderate_risk: usize,
    pub low_risk: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Intervention {
    pub id: u64,
    pub student_id: String,
    pub action: String,
    pub actioned_by: String,
    pub timestamp: DateTime<Utc>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_probability: Option<u8>,
}
