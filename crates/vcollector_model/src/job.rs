use crate::credential::CredentialRef;
use crate::device::DeviceFilter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Paging-disable and primary command strings for a job (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSpec {
    pub paging_disable: Option<String>,
    pub command: String,
    pub output_directory: Option<String>,
}

impl CommandSpec {
    /// Join paging-disable (if any) and primary command with a comma,
    /// preserving empty tokens as explicit bare-newline sends (§4.8 step 4).
    pub fn assemble(&self) -> String {
        match &self.paging_disable {
            Some(paging) if !paging.is_empty() => format!("{paging},{}", self.command),
            _ => self.command.clone(),
        }
    }

    /// Total comma-separated token count of the assembled command string
    /// (comma count + 1); the driver's default `promptCount` (§4.3, P6, S3):
    /// every token, empty or not, produces one transmitted line and is
    /// expected to surface one more prompt.
    pub fn default_prompt_count(&self) -> usize {
        self.assemble().split(',').count()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationBlock {
    pub use_textfsm: bool,
    pub template_filter: Option<String>,
    pub min_score: f64,
    pub store_failures: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionBlock {
    pub max_workers: usize,
    pub timeout_secs: u64,
    pub inter_command_time_secs: f64,
    /// When set, SSH negotiation offers legacy KEX/cipher/host-key
    /// algorithms first, for older network gear that doesn't speak
    /// anything modern (§4.3 Connect, glossary "Legacy mode").
    pub legacy_mode: bool,
}

impl Default for ExecutionBlock {
    fn default() -> Self {
        ExecutionBlock {
            max_workers: 12,
            timeout_secs: 60,
            inter_command_time_secs: 1.0,
            legacy_mode: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageBlock {
    pub base_path: PathBuf,
    pub filename_pattern: String,
}

/// A job reference is a sum of how the caller named the job (§9 Design
/// Notes: "job references are a sum of {db-slug, db-id, legacy-file}").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobRef {
    DbSlug(String),
    DbId(String),
    LegacyFile(PathBuf),
}

/// A fully resolved job definition, whether it originated from a
/// database-backed slug/id or a legacy file (§4.8 step 1: "both produce the
/// same internal JobDefinition shape").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub job_id: String,
    pub capture_type: String,
    pub vendor: Option<String>,
    pub commands: CommandSpec,
    pub device_filter: DeviceFilter,
    pub validation: ValidationBlock,
    pub execution: ExecutionBlock,
    pub storage: StorageBlock,
    pub credential: Option<CredentialRef>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_joins_paging_and_command() {
        let spec = CommandSpec {
            paging_disable: Some("terminal length 0".into()),
            command: "show run".into(),
            output_directory: None,
        };
        assert_eq!(spec.assemble(), "terminal length 0,show run");
        assert_eq!(spec.default_prompt_count(), 2);
    }

    #[test]
    fn trailing_commas_count_as_extra_tokens() {
        let spec = CommandSpec {
            paging_disable: None,
            command: "show run,,".into(),
            output_directory: None,
        };
        // "show run", "", "" -> 3 tokens total (S3: expected prompt count 3).
        assert_eq!(spec.assemble(), "show run,,");
        assert_eq!(spec.default_prompt_count(), 3);
    }

    #[test]
    fn no_paging_disable_is_just_command() {
        let spec = CommandSpec {
            paging_disable: None,
            command: "show version".into(),
            output_directory: None,
        };
        assert_eq!(spec.assemble(), "show version");
    }
}
