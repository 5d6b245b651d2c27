use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::Intervention;

pub const DEFAULT_ACTOR: &str = "Teacher";
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Request body for logging an intervention. Every field is optional at the
/// wire level so missing values surface as `BadInput` instead of a
/// deserializer rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionRequest {
    pub student_id: Option<String>,
    pub action: Option<String>,
    pub actioned_by: Option<String>,
    pub timestamp: Option<String>,
}

/// Context attached to an intervention when the student is known.
#[derive(Debug, Clone, Default)]
pub struct StudentContext {
    pub district: Option<String>,
    pub probability: Option<u8>,
}

/// In-memory, append-only. Entries vanish on restart.
#[derive(Debug, Default)]
pub struct InterventionLog {
    entries: Vec<Intervention>,
}

impl InterventionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn append(
        &mut self,
        request: InterventionRequest,
        context: StudentContext,
    ) -> Result<Intervention, AppError> {
        let student_id = required(request.student_id, "studentId")?;
        let action = required(request.action, "action")?;
        let actioned_by = request
            .actioned_by
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ACTOR.to_string());
        let timestamp = match request.timestamp.as_deref().map(str::trim) {
            None | Some("") => Utc::now(),
            Some(value) => parse_timestamp(value)?,
        };

        let intervention = Intervention {
            id: self.entries.len() as u64 + 1,
            student_id,
            action,
            actioned_by,
            timestamp,
            status: "logged",
            district: context.district,
            risk_probability: context.probability,
        };
        self.entries.push(intervention.clone());
        Ok(intervention)
    }

    /// Newest first, optionally for a single student.
    pub fn recent(&self, student_id: Option<&str>, limit: usize) -> Vec<Intervention> {
        self.entries
            .iter()
            .rev()
            .filter(|entry| student_id.map_or(true, |id| entry.student_id == id))
            .take(limit)
            .cloned()
            .collect()
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_input(format!("{field} is required")))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| AppError::bad_input(format!("invalid timestamp '{value}': {err}")))
}
