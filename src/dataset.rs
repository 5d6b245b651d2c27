use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::models::{RiskDistribution, RiskTier, SocioEconomicStatus, StudentRecord};

#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetFile {
    Wrapped { students: Vec<Value> },
    Bare(Vec<Value>),
}

/// Loads the dataset, falling back to the built-in students when the file
/// is missing or unreadable.
pub fn load_or_fallback(path: &Path) -> Vec<StudentRecord> {
    match load_students(path) {
        Ok(students) => {
            info!(
                path = %path.display(),
                students = students.len(),
                "loaded student dataset"
            );
            students
        }
        Err(err @ AppError::UpstreamUnavailable { .. }) if !path.exists() => {
            warn!(error = %err, "dataset not found, using fallback students");
            fallback_students()
        }
        Err(err) => {
            error!(error = %err, "failed to load dataset, using fallback students");
            fallback_students()
        }
    }
}

pub fn load_students(path: &Path) -> Result<Vec<StudentRecord>, AppError> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        load_csv(path)
    } else {
        load_json(path)
    }
}

fn load_json(path: &Path) -> Result<Vec<StudentRecord>, AppError> {
    let raw = std::fs::read_to_string(path).map_err(|err| AppError::upstream(path, err))?;
    let file: DatasetFile =
        serde_json::from_str(&raw).map_err(|err| AppError::upstream(path, err))?;
    let rows = match file {
        DatasetFile::Wrapped { students } => students,
        DatasetFile::Bare(students) => students,
    };

    let mut students = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        match serde_json::from_value::<StudentRecord>(row) {
            Ok(student) => students.push(student),
            Err(err) => warn!(index, error = %err, "skipping malformed student record"),
        }
    }
    Ok(students)
}

fn load_csv(path: &Path) -> Result<Vec<StudentRecord>, AppError> {
    let mut reader = csv::Reader::from_path(path).map_err(|err| AppError::upstream(path, err))?;
    let mut students = Vec::new();

    for (index, result) in reader.deserialize::<StudentRecord>().enumerate() {
        match result {
            Ok(student) => students.push(student),
            Err(err) => warn!(index, error = %err, "skipping malformed student record"),
        }
    }
    Ok(students)
}

/// Reads the metrics side file verbatim. Falls back to fixed figures plus the
/// live tier distribution when the file is absent or not valid JSON.
pub async fn load_metrics(
    path: &Path,
    total_students: usize,
    distribution: RiskDistribution,
) -> Value {
    let loaded = match tokio::fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str::<Value>(&raw).map_err(|err| AppError::upstream(path, err)),
        Err(err) => Err(AppError::upstream(path, err)),
    };

    match loaded {
        Ok(metrics) => metrics,
        Err(err) => {
            warn!(error = %err, "model metrics unavailable, serving fallback figures");
            json!({
                "message": "Run model.py to generate metrics",
                "model_accuracy": 0.85,
                "inclusion_error": 15.5,
                "exclusion_error": 8.2,
                "poc_criteria_met": true,
                "total_students": total_students,
                "risk_distribution": distribution,
            })
        }
    }
}

pub fn fallback_students() -> Vec<StudentRecord> {
    #[allow(clippy::too_many_arguments)]
    fn student(
        id: &str,
        district: &str,
        grade: u32,
        attendance_rate: f64,
        exam_score: f64,
        socio_economic_status: SocioEconomicStatus,
        transport_allowance_used: bool,
        migration_indicator: bool,
        gender: &str,
        social_category: &str,
        dropout_risk: RiskTier,
    ) -> StudentRecord {
        StudentRecord {
            student_id: id.to_string(),
            district: district.to_string(),
            grade: Some(grade),
            attendance_rate: Some(attendance_rate),
            exam_score: Some(exam_score),
            socio_economic_status,
            transport_allowance_used,
            migration_indicator,
            previous_grade_failures: Some(0),
            gender: gender.to_string(),
            social_category: social_category.to_string(),
            dropout_risk,
        }
    }

    vec![
        student(
            "ST001",
            "Visakhapatnam",
            9,
            45.0,
            35.0,
            SocioEconomicStatus::Low,
            false,
            true,
            "Female",
            "ST",
            RiskTier::High,
        ),
        student(
            "ST002",
            "Guntur",
            10,
            92.0,
            78.0,
            SocioEconomicStatus::Medium,
            true,
            false,
            "Male",
            "General",
            RiskTier::Low,
        ),
        student(
            "ST003",
            "Visakhapatnam",
            9,
            38.0,
            28.0,
            SocioEconomicStatus::Medium,
            true,
            true,
            "Male",
            "OBC",
            RiskTier::High,
        ),
        student(
            "ST005",
            "Krishna",
            10,
            50.0,
            42.0,
            SocioEconomicStatus::Low,
            true,
            false,
            "Female",
            "SC",
            RiskTier::Moderate,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("early-warning-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_wrapped_json_and_skips_bad_rows() {
        let path = temp_file(
            "dataset.json",
            r#"{
                "metadata": {"total_students": 3},
                "students": [
                    {"student_id": "KG0001", "district": "Guntur", "grade": 8,
                     "attendance_rate": 55.5, "exam_score": 40.0,
                     "socio_economic_status": "Low", "transport_allowance_used": false,
                     "migration_indicator": true, "previous_grade_failures": 1,
                     "gender": "Female", "social_category": "SC", "dropout_risk": "High"},
                    {"student_id": "KG0002", "district": "Guntur", "dropout_risk": "Unknown"},
                    {"id": "KG0003", "district": "Tirupati", "dropout_risk": "Low"}
                ],
                "risk_distribution": {"high_risk": 1}
            }"#,
        );

        let students = load_students(&path).unwrap();
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].student_id, "KG0001");
        assert_eq!(students[0].attendance_rate, Some(55.5));
        assert_eq!(students[0].socio_economic_status, SocioEconomicStatus::Low);
        assert_eq!(students[1].student_id, "KG0003");
        assert_eq!(students[1].attendance_rate, None);
        assert!(!students[1].transport_allowance_used);
    }

    #[test]
    fn loads_bare_json_array() {
        let path = temp_file(
            "students.json",
            r#"[{"student_id": "A1", "district": "Krishna", "dropout_risk": "moderate",
                 "socio_economic_status": "Upper"}]"#,
        );
        let students = load_students(&path).unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].dropout_risk, RiskTier::Moderate);
        assert_eq!(
            students[0].socio_economic_status,
            SocioEconomicStatus::Unknown
        );
    }

    #[test]
    fn loads_csv_dataset() {
        let path = temp_file(
            "students.csv",
            "student_id,district,grade,attendance_rate,exam_score,socio_economic_status,transport_allowance_used,migration_indicator,previous_grade_failures,gender,social_category,dropout_risk\n\
             KG0001,Guntur,9,45,35,Low,false,true,2,Female,ST,High\n\
             KG0002,Kakinada,10,,80,High,true,false,0,Male,General,Low\n",
        );
        let students = load_students(&path).unwrap();
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].previous_grade_failures, Some(2));
        assert!(students[0].migration_indicator);
        assert_eq!(students[1].attendance_rate, None);
        assert_eq!(students[1].dropout_risk, RiskTier::Low);
    }

    #[test]
    fn missing_or_corrupt_dataset_falls_back() {
        let missing = std::env::temp_dir()
            .join(format!("early-warning-{}", Uuid::new_v4()))
            .join("dataset.json");
        assert!(matches!(
            load_students(&missing),
            Err(AppError::UpstreamUnavailable { .. })
        ));
        assert_eq!(load_or_fallback(&missing).len(), 4);

        let corrupt = temp_file("dataset.json", "{ not json");
        assert!(load_students(&corrupt).is_err());
        let students = load_or_fallback(&corrupt);
        let ids: Vec<&str> = students.iter().map(|s| s.student_id.as_str()).collect();
        assert_eq!(ids, vec!["ST001", "ST002", "ST003", "ST005"]);
    }

    #[tokio::test]
    async fn metrics_file_is_returned_verbatim() {
        let path = temp_file(
            "model_results.json",
            r#"{"model_accuracy": 0.91, "inclusion_error": 4.0, "custom": [1, 2]}"#,
        );
        let metrics = load_metrics(&path, 10, RiskDistribution::default()).await;
        assert_eq!(
            metrics,
            json!({"model_accuracy": 0.91, "inclusion_error": 4.0, "custom": [1, 2]})
        );
    }

    #[tokio::test]
    async fn metrics_fall_back_when_missing() {
        let path = std::env::temp_dir()
            .join(format!("early-warning-{}", Uuid::new_v4()))
            .join("model_results.json");
        let distribution = RiskDistribution {
            high_risk: 2,
            moderate_risk: 1,
            low_risk: 1,
        };
        let metrics = load_metrics(&path, 4, distribution).await;
        assert_eq!(metrics["model_accuracy"], json!(0.85));
        assert_eq!(metrics["poc_criteria_met"], json!(true));
        assert_eq!(metrics["total_students"], json!(4));
        assert_eq!(metrics["risk_distribution"]["high_risk"], json!(2));
    }
}
