use thiserror::Error;

use crate::setup::SetupField;

pub type Result<T, E = TapbotError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum TapbotError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("setup incomplete, missing: {}", format_fields(.0))]
    IncompleteSetup(Vec<SetupField>),
    #[error("controller error: {0}")]
    Controller(String),
    #[error("vision error: {0}")]
    Vision(String),
    #[error("orchestrator error: {0}")]
    Orchestrator(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_fields(fields: &[SetupField]) -> String {
    fields
        .iter()
        .map(|field| field.key())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_setup_lists_missing_keys() {
        let err = TapbotError::IncompleteSetup(vec![SetupField::Move, SetupField::LostImage]);
        assert_eq!(
            err.to_string(),
            "setup incomplete, missing: move_coords, images.lost"
        );
    }
}
