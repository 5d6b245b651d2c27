use std::fmt::Write;

use chrono::NaiveDate;

use crate::aggregate::Aggregator;

pub fn build_report(aggregator: &Aggregator, threshold: i64, generated_on: NaiveDate) -> String {
    let distribution = aggregator.risk_distribution();
    let at_risk = aggregator.list_at_risk(threshold);

    let mut output = String::new();

    let _ = writeln!(output, "# Dropout Early Warning Report");
    let _ = writeln!(
        output,
        "Generated on {} for {} students (threshold {}%)",
        generated_on,
        aggregator.len(),
        threshold
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Mix");

    if aggregator.is_empty() {
        let _ = writeln!(output, "No students loaded.");
    } else {
        let _ = writeln!(output, "- High: {}", distribution.high_risk);
        let _ = writeln!(output, "- Moderate: {}", distribution.moderate_risk);
        let _ = writeln!(output, "- Low: {}", distribution.low_risk);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Districts");

    let districts = aggregator.districts();
    if districts.is_empty() {
        let _ = writeln!(output, "No districts recorded.");
    } else {
        for district in districts.iter() {
            if let Ok(stats) = aggregator.district_stats(district) {
                let _ = writeln!(
                    output,
                    "- {}: {} students ({} high, {} moderate, {} low), avg attendance {}%, avg risk {:.1}%",
                    stats.district,
                    stats.total_students,
                    stats.high_risk,
                    stats.moderate_risk,
                    stats.low_risk,
                    stats.average_attendance,
                    stats.average_risk_probability
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");

    if at_risk.is_empty() {
        let _ = writeln!(output, "No students at or above the threshold.");
    } else {
        for student in at_risk.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}, grade {}) {} risk at {}%: {}",
                student.id,
                student.district,
                student
                    .grade
                    .map(|grade| grade.to_string())
                    .unwrap_or_else(|| "n/a".to_string()),
                student.risk,
                student.probability,
                student.reasons.join("; ")
            );
        }
    }

    output
}
