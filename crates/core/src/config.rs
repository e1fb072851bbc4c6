//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.

use crate::constants::DEFAULT_HOSPITAL_CODE;
use crate::{AdmissionError, AdmissionResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    hospital_code: String,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(data_dir: PathBuf, hospital_code: String) -> AdmissionResult<Self> {
        if hospital_code.trim().is_empty() {
            return Err(AdmissionError::InvalidInput(
                "hospital_code cannot be empty".into(),
            ));
        }

        Ok(Self {
            data_dir,
            hospital_code,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn hospital_code(&self) -> &str {
        &self.hospital_code
    }
}

/// Parse the hospital code from an optional environment value.
///
/// If `value` is `None` or empty/whitespace, returns the development default.
pub fn hospital_code_from_env_value(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_HOSPITAL_CODE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_hospital_code() {
        let err = CoreConfig::new(PathBuf::from("/tmp"), "   ".into())
            .expect_err("blank hospital code should be rejected");
        assert!(matches!(err, AdmissionError::InvalidInput(_)));
    }

    #[test]
    fn test_hospital_code_falls_back_to_default() {
        assert_eq!(hospital_code_from_env_value(None), DEFAULT_HOSPITAL_CODE);
        assert_eq!(
            hospital_code_from_env_value(Some("  ".into())),
            DEFAULT_HOSPITAL_CODE
        );
        assert_eq!(
            hospital_code_from_env_value(Some("city-general".into())),
            "city-general"
        );
    }
}
