//! Errors of the data calls outside the synchronizer

use probecare_session::ProviderError;

/// Failure of a client-directory or storage call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    /// A required field was empty after trimming
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// The backend refused or could not serve the call
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl DataError {
    /// Check if this was caught before any request was sent
    #[inline]
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::Empty(_))
    }
}

/// Trimmed value, or the name of the empty field
pub(crate) fn required(field: &'static str, value: &str) -> Result<String, DataError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DataError::Empty(field));
    }
    Ok(value.to_string())
}
