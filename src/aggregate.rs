use std::collections::{BTreeSet, HashMap};

use rand::Rng;

use crate::error::AppError;
use crate::models::{
    AtRiskStudent, DistrictStats, RiskAssessment, RiskDistribution, RiskTier, StudentRecord,
    StudentRisk,
};
use crate::risk;

pub const DEFAULT_THRESHOLD: i64 = 50;

/// Fraction of high-risk students counted as having an active intervention.
const ACTIVE_INTERVENTION_RATIO: f64 = 0.7;

/// Answers read queries over the loaded records and the assessments derived
/// from them at startup. Nothing here re-samples a probability except
/// [`Aggregator::rederive`].
#[derive(Debug, Clone)]
pub struct Aggregator {
    records: Vec<StudentRecord>,
    /// Position of the first record for each student id.
    index: HashMap<String, usize>,
    assessments: HashMap<String, RiskAssessment>,
}

impl Aggregator {
    pub fn new(records: Vec<StudentRecord>, assessments: HashMap<String, RiskAssessment>) -> Self {
        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            index.entry(record.student_id.clone()).or_insert(position);
        }
        Self {
            records,
            index,
            assessments,
        }
    }

    pub fn derive<R: Rng>(records: Vec<StudentRecord>, rng: &mut R) -> Self {
        let assessments = risk::assess_all(&records, rng);
        Self::new(records, assessments)
    }

    pub fn rederive<R: Rng>(&mut self, rng: &mut R) {
        self.assessments = risk::assess_all(&self.records, rng);
    }

    pub fn len(&self) -> usize {
        self.assessments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assessments.is_empty()
    }

    pub fn assessment(&self, student_id: &str) -> Option<&RiskAssessment> {
        self.assessments.get(student_id)
    }

    pub fn student_risk(&self, student_id: &str) -> Result<StudentRisk, AppError> {
        let not_found = || AppError::not_found(format!("Student {student_id} not found"));
        let assessment = self.assessment(student_id).ok_or_else(not_found)?;
        let record = self
            .index
            .get(student_id)
            .map(|position| &self.records[*position])
            .ok_or_else(not_found)?;

        Ok(StudentRisk {
            student_id: record.student_id.clone(),
            risk: assessment.tier,
            probability: assessment.probability,
            district: record.district.clone(),
            grade: record.grade,
            reasons: assessment.reasons.clone(),
            recommendations: assessment.recommendations.clone(),
        })
    }

    /// Students at or above `threshold`, highest probability first. Ties keep
    /// dataset order.
    pub fn list_at_risk(&self, threshold: i64) -> Vec<AtRiskStudent> {
        let mut students: Vec<AtRiskStudent> = self
            .unique_records()
            .filter_map(|(record, assessment)| {
                if i64::from(assessment.probability) < threshold {
                    return None;
                }
                Some(AtRiskStudent {
                    id: record.student_id.clone(),
                    name: format!("Student {}", record.student_id),
                    district: record.district.clone(),
                    grade: record.grade,
                    risk: assessment.tier,
                    probability: assessment.probability,
                    reasons: assessment.reasons.clone(),
                })
            })
            .collect();

        students.sort_by(|a, b| b.probability.cmp(&a.probability));
        students
    }

    /// Recomputed on every call. An unknown district and a district with no
    /// students are both reported as not found.
    pub fn district_stats(&self, district: &str) -> Result<DistrictStats, AppError> {
        let mut distribution = RiskDistribution::default();
        let mut total = 0usize;
        let mut probability_sum = 0u64;
        let mut attendance_sum = 0.0;
        let mut attendance_count = 0usize;

        for (record, assessment) in self
            .unique_records()
            .filter(|(record, _)| record.district == district)
        {
            total += 1;
            probability_sum += u64::from(assessment.probability);
            match assessment.tier {
                RiskTier::High => distribution.high_risk += 1,
                RiskTier::Moderate => distribution.moderate_risk += 1,
                RiskTier::Low => distribution.low_risk += 1,
            }
            if let Some(rate) = record.attendance_rate {
                attendance_sum += rate;
                attendance_count += 1;
            }
        }

        if total == 0 {
            return Err(AppError::not_found(format!("District {district} not found")));
        }

        let average_probability = probability_sum as f64 / total as f64;
        let average_attendance = if attendance_count == 0 {
            0.0
        } else {
            attendance_sum / attendance_count as f64
        };

        Ok(DistrictStats {
            district: district.to_string(),
            total_students: total,
            high_risk: distribution.high_risk,
            moderate_risk: distribution.moderate_risk,
            low_risk: distribution.low_risk,
            average_risk_probability: (average_probability * 10.0).round() / 10.0,
            average_attendance: average_attendance.round() as u32,
            interventions_active: (distribution.high_risk as f64 * ACTIVE_INTERVENTION_RATIO)
                .floor() as usize,
        })
    }

    pub fn districts(&self) -> Vec<String> {
        self.unique_records()
            .map(|(record, _)| record.district.clone())
            .filter(|district| !district.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn risk_distribution(&self) -> RiskDistribution {
        let mut distribution = RiskDistribution::default();
        for (_, assessment) in self.unique_records() {
            match assessment.tier {
                RiskTier::High => distribution.high_risk += 1,
                RiskTier::Moderate => distribution.moderate_risk += 1,
                RiskTier::Low => distribution.low_risk += 1,
            }
        }
        distribution
    }

    /// Records paired with their assessment, in dataset order, skipping
    /// repeated ids.
    fn unique_records(&self) -> impl Iterator<Item = (&StudentRecord, &RiskAssessment)> {
        self.records.iter().enumerate().filter_map(move |(position, record)| {
            if self.index.get(&record.student_id) != Some(&position) {
                return None;
            }
            self.assessments
                .get(&record.student_id)
                .map(|assessment| (record, assessment))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::tests::sample_record;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixture() -> Aggregator {
        let records = vec![
            sample_record("ST001", "Visakhapatnam", RiskTier::High),
            sample_record("ST002", "Guntur", RiskTier::Low),
            sample_record("ST003", "Visakhapatnam", RiskTier::High),
            sample_record("ST005", "Krishna", RiskTier::Moderate),
        ];
        Aggregator::derive(records, &mut StdRng::seed_from_u64(11))
    }

    fn with_probabilities(probabilities: &[(&str, u8)]) -> Aggregator {
        let mut aggregator = fixture();
        for (id, probability) in probabilities {
            if let Some(assessment) = aggregator.assessments.get_mut(*id) {
                assessment.probability = *probability;
            }
        }
        aggregator
    }

    #[test]
    fn lookup_merges_identifying_fields() {
        let aggregator = fixture();
        let risk = aggregator.student_risk("ST005").unwrap();
        assert_eq!(risk.student_id, "ST005");
        assert_eq!(risk.district, "Krishna");
        assert_eq!(risk.grade, Some(9));
        assert_eq!(risk.risk, RiskTier::Moderate);
        assert_eq!(risk.recommendations.len(), 2);
    }

    #[test]
    fn lookup_of_unknown_id_is_not_found() {
        let aggregator = fixture();
        assert!(matches!(
            aggregator.student_risk("st001"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            aggregator.student_risk("ST00"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn at_risk_listing_returns_high_and_moderate_sorted() {
        let aggregator = with_probabilities(&[("ST005", 60)]);
        let students = aggregator.list_at_risk(DEFAULT_THRESHOLD);

        let ids: Vec<&str> = students.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&"ST002"));
        assert_eq!(students[0].risk, RiskTier::High);
        assert_eq!(students[2].id, "ST005");
        assert!(students
            .windows(2)
            .all(|pair| pair[0].probability >= pair[1].probability));
        assert!(students.iter().all(|s| s.probability >= 50));
    }

    #[test]
    fn at_risk_listing_breaks_ties_by_dataset_order() {
        let aggregator = with_probabilities(&[("ST001", 80), ("ST003", 80), ("ST005", 90)]);
        let ids: Vec<String> = aggregator
            .list_at_risk(50)
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["ST005", "ST001", "ST003"]);
    }

    #[test]
    fn at_risk_listing_extremes() {
        let aggregator = fixture();
        assert_eq!(aggregator.list_at_risk(0).len(), 4);
        assert_eq!(aggregator.list_at_risk(-5).len(), 4);
        assert!(aggregator.list_at_risk(101).is_empty());
    }

    #[test]
    fn district_counts_sum_to_total() {
        let aggregator = with_probabilities(&[("ST001", 95), ("ST003", 80)]);
        let stats = aggregator.district_stats("Visakhapatnam").unwrap();
        assert_eq!(stats.total_students, 2);
        assert_eq!(stats.high_risk, 2);
        assert_eq!(
            stats.high_risk + stats.moderate_risk + stats.low_risk,
            stats.total_students
        );
        assert_eq!(stats.average_risk_probability, 87.5);
        assert_eq!(stats.average_attendance, 92);
        assert_eq!(stats.interventions_active, 1);
    }

    #[test]
    fn district_without_students_is_not_found() {
        let aggregator = fixture();
        assert!(matches!(
            aggregator.district_stats("Tirupati"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn district_attendance_ignores_missing_rates() {
        let mut record = sample_record("KG0001", "Kakinada", RiskTier::Low);
        record.attendance_rate = None;
        let aggregator = Aggregator::derive(vec![record], &mut StdRng::seed_from_u64(3));
        let stats = aggregator.district_stats("Kakinada").unwrap();
        assert_eq!(stats.average_attendance, 0);
        assert_eq!(stats.total_students, 1);
    }

    #[test]
    fn rederive_keeps_tiers_and_bands() {
        let mut aggregator = fixture();
        aggregator.rederive(&mut StdRng::seed_from_u64(99));
        assert_eq!(aggregator.len(), 4);
        for id in ["ST001", "ST002", "ST003", "ST005"] {
            let assessment = aggregator.assessment(id).unwrap();
            assert!(risk::probability_band(assessment.tier).contains(&assessment.probability));
        }
        assert_eq!(aggregator.assessment("ST002").unwrap().tier, RiskTier::Low);
    }

    #[test]
    fn districts_and_distribution() {
        let aggregator = fixture();
        assert_eq!(
            aggregator.districts(),
            vec!["Guntur", "Krishna", "Visakhapatnam"]
        );
        assert_eq!(
            aggregator.risk_distribution(),
            RiskDistribution {
                high_risk: 2,
                moderate_risk: 1,
                low_risk: 1,
            }
        );
    }

    #[test]
    fn lookup_uses_first_record_for_repeated_id() {
        let mut repeated = sample_record("ST001", "Krishna", RiskTier::Low);
        repeated.grade = Some(10);
        let records = vec![
            sample_record("ST001", "Visakhapatnam", RiskTier::High),
            sample_record("ST002", "Guntur", RiskTier::Low),
            repeated,
        ];
        let aggregator = Aggregator::derive(records, &mut StdRng::seed_from_u64(4));

        let risk = aggregator.student_risk("ST001").unwrap();
        assert_eq!(risk.district, "Visakhapatnam");
        assert_eq!(risk.grade, Some(9));
        assert_eq!(risk.risk, RiskTier::High);
        assert_eq!(aggregator.student_risk("ST002").unwrap().district, "Guntur");
        assert_eq!(aggregator.list_at_risk(0).len(), 2);
        assert!(aggregator.district_stats("Krishna").is_err());
        assert_eq!(aggregator.districts(), vec!["Guntur", "Visakhapatnam"]);
    }
}
