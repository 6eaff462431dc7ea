use uuid::Uuid;

use crate::errors::AppError;

pub mod employee;
pub mod leave;
pub mod rbac;
pub mod session;
pub mod user;

/// Ids are stored as TEXT; a row that fails to parse is corrupt, not a
/// caller mistake.
pub(crate) fn parse_uuid(value: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value).map_err(|err| AppError::internal(format!("invalid {what} id in store: {err}")))
}
