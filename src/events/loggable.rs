use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for audit entries; drives retention and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Authorization-relevant changes: retained indefinitely.
    Critical,
    #[default]
    Important,
    /// High-volume noise, trimmed aggressively.
    Routine,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Routine => "routine",
        }
    }
}

/// Entities that show up in the audit trail. The entity type becomes the
/// event-name prefix ("role.created", "employee.updated").
pub trait Loggable: Serialize + Send + Sync {
    fn entity_type() -> &'static str;

    /// Usually the entity's primary key.
    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Deletions always matter, whatever the entity's base severity.
    fn severity_for_action(&self, action: &str) -> Severity {
        if action == "deleted" {
            Severity::Critical
        } else {
            self.severity()
        }
    }
}
