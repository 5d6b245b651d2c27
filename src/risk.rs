use std::collections::HashMap;
use std::ops::RangeInclusive;

use rand::Rng;

use crate::models::{RiskAssessment, RiskTier, SocioEconomicStatus, StudentRecord};

const GOOD_STANDING: &str = "Good attendance and academic performance";

const HIGH_RECOMMENDATIONS: [&str; 4] = [
    "Immediate parent-teacher meeting",
    "Provide transport support",
    "Enroll in remedial classes",
    "Connect with community volunteers",
];
const MODERATE_RECOMMENDATIONS: [&str; 2] = ["Monitor closely", "Provide academic support"];
const LOW_RECOMMENDATIONS: [&str; 1] = ["Continue regular monitoring"];

pub fn derive<R: Rng>(record: &StudentRecord, rng: &mut R) -> RiskAssessment {
    let tier = record.dropout_risk;
    RiskAssessment {
        tier,
        probability: rng.gen_range(probability_band(tier)),
        reasons: risk_reasons(record),
        recommendations: recommendations(tier)
            .iter()
            .map(|item| item.to_string())
            .collect(),
    }
}

/// Derives every record once, keyed by student id. The first record wins
/// when an id repeats.
pub fn assess_all<R: Rng>(
    records: &[StudentRecord],
    rng: &mut R,
) -> HashMap<String, RiskAssessment> {
    let mut assessments = HashMap::with_capacity(records.len());
    for record in records {
        if assessments.contains_key(&record.student_id) {
            continue;
        }
        assessments.insert(record.student_id.clone(), derive(record, rng));
    }
    assessments
}

pub fn probability_band(tier: RiskTier) -> RangeInclusive<u8> {
    match tier {
        RiskTier::High => 75..=95,
        RiskTier::Moderate => 45..=70,
        RiskTier::Low => 5..=30,
    }
}

pub fn recommendations(tier: RiskTier) -> &'static [&'static str] {
    match tier {
        RiskTier::High => &HIGH_RECOMMENDATIONS,
        RiskTier::Moderate => &MODERATE_RECOMMENDATIONS,
        RiskTier::Low => &LOW_RECOMMENDATIONS,
    }
}

pub fn risk_reasons(record: &StudentRecord) -> Vec<String> {
    let mut reasons = Vec::new();
    let high = record.dropout_risk == RiskTier::High;

    match record.attendance_rate {
        Some(rate) if rate < 60.0 => reasons.push(format!("Low attendance ({rate}%)")),
        Some(rate) if rate < 75.0 => reasons.push(format!("Moderate attendance ({rate}%)")),
        _ => {}
    }

    match record.exam_score {
        Some(score) if score < 45.0 => {
            reasons.push(format!("Below-average exam scores ({score})"))
        }
        Some(score) if score < 65.0 => reasons.push(format!("Average exam scores ({score})")),
        _ => {}
    }

    if record.socio_economic_status == SocioEconomicStatus::Low {
        reasons.push("Low socio-economic status".to_string());
    }

    if !record.transport_allowance_used {
        reasons.push("Transport allowance not utilized".to_string());
    }

    if record.migration_indicator {
        reasons.push("Seasonal migrant family".to_string());
    }

    if let Some(failures) = record.previous_grade_failures.filter(|count| *count > 0) {
        reasons.push(format!("{failures} previous failure(s)"));
    }

    // Demographic factors are reported for high-tier students only.
    if high && record.gender == "Female" {
        reasons.push("Female student (higher dropout risk)".to_string());
    }

    if high && matches!(record.social_category.as_str(), "SC" | "ST") {
        reasons.push(format!("Belongs to {} category", record.social_category));
    }

    if reasons.is_empty() {
        reasons.push(GOOD_STANDING.to_string());
    }

    reasons
}
