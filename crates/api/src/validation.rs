use crate::error::ApiError;
use validator::Validate;

/// Runs derive-based validation, naming the offending fields in a stable
/// order so clients get a deterministic message.
pub fn validate<T: Validate>(value: &T) -> Result<(), ApiError> {
    if let Err(errors) = value.validate() {
        let mut fields: Vec<&str> = errors.field_errors().keys().copied().collect();
        fields.sort_unstable();
        return Err(ApiError::Validation(format!(
            "invalid fields: {}",
            fields.join(", ")
        )));
    }
    Ok(())
}
