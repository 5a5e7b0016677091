// ⚙️ Pipeline Configuration
// Loaded from TOML; every field has a default so a partial file is valid

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FitJoinError, Result};
use crate::grouping::MemberConflictPolicy;
use crate::merge::{ActivityAggregation, MemberCoverage};

pub const MAX_PRECISION: usize = 6;

/// Upper bound on worker partitions; each non-empty partition gets its own
/// thread
pub const MAX_PARTITIONS: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub members_input: PathBuf,
    pub activity_input: PathBuf,
    pub output: PathBuf,
    pub dead_letter: Option<PathBuf>,

    pub delimiter: char,
    /// Each input file starts with a header row
    pub has_headers: bool,
    pub output_header: bool,
    pub precision: usize,
    pub partitions: usize,

    pub activity_policy: ActivityAggregation,
    pub member_policy: MemberConflictPolicy,
    pub coverage: MemberCoverage,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            members_input: PathBuf::from("members.csv"),
            activity_input: PathBuf::from("activity.csv"),
            output: PathBuf::from("output.csv"),
            dead_letter: None,
            delimiter: ',',
            has_headers: true,
            output_header: true,
            precision: 2,
            partitions: 4,
            activity_policy: ActivityAggregation::default(),
            member_policy: MemberConflictPolicy::default(),
            coverage: MemberCoverage::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(raw).map_err(|e| FitJoinError::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate_at(origin)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| FitJoinError::io(path, e))?;
        Self::from_toml_str(&raw, path)
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_at(Path::new("<config>"))
    }

    fn validate_at(&self, origin: &Path) -> Result<()> {
        let invalid = |message: String| FitJoinError::Config {
            path: origin.to_path_buf(),
            message,
        };

        if self.partitions == 0 {
            return Err(invalid("partitions must be at least 1".to_string()));
        }

        if self.partitions > MAX_PARTITIONS {
            return Err(invalid(format!(
                "partitions must be at most {}, got {}",
                MAX_PARTITIONS, self.partitions
            )));
        }

        if self.precision > MAX_PRECISION {
            return Err(invalid(format!(
                "precision must be at most {}, got {}",
                MAX_PRECISION, self.precision
            )));
        }

        if !self.delimiter.is_ascii() || matches!(self.delimiter, '"' | '\n' | '\r') {
            return Err(invalid(format!(
                "delimiter must be a single ASCII character other than quote or newline, got {:?}",
                self.delimiter
            )));
        }

        Ok(())
    }

    /// Delimiter as the byte the CSV reader/writer expects. Only valid after
    /// `validate`; non-ASCII falls back to a comma.
    pub fn delimiter_byte(&self) -> u8 {
        if self.delimiter.is_ascii() {
            self.delimiter as u8
        } else {
            b','
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.output, PathBuf::from("output.csv"));
        assert_eq!(config.delimiter_byte(), b',');
        assert_eq!(config.precision, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
members_input = "in/members.csv"
partitions = 8
activity_policy = "average_all"
coverage = "include_member_only"
"#;
        let config = PipelineConfig::from_toml_str(raw, Path::new("job.toml")).unwrap();

        assert_eq!(config.members_input, PathBuf::from("in/members.csv"));
        assert_eq!(config.activity_input, PathBuf::from("activity.csv"));
        assert_eq!(config.partitions, 8);
        assert_eq!(config.activity_policy, ActivityAggregation::AverageAll);
        assert_eq!(config.coverage, MemberCoverage::IncludeMemberOnly);
        assert_eq!(config.member_policy, MemberConflictPolicy::LargestSerialized);
    }

    #[test]
    fn test_rejects_zero_partitions() {
        let err =
            PipelineConfig::from_toml_str("partitions = 0", Path::new("job.toml")).unwrap_err();
        assert!(err.to_string().contains("partitions"));
        assert!(err.to_string().contains("job.toml"));
    }

    #[test]
    fn test_partition_upper_bound() {
        let at_limit = PipelineConfig {
            partitions: MAX_PARTITIONS,
            ..PipelineConfig::default()
        };
        assert!(at_limit.validate().is_ok());

        let huge = PipelineConfig {
            partitions: 1_000_000,
            ..PipelineConfig::default()
        };
        let err = huge.validate().unwrap_err();
        assert!(err.to_string().contains("at most 256"));
    }

    #[test]
    fn test_rejects_quote_delimiter() {
        let config = PipelineConfig {
            delimiter: '"',
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let raw = "activity_policy = \"median\"";
        assert!(PipelineConfig::from_toml_str(raw, Path::new("job.toml")).is_err());
    }
}
