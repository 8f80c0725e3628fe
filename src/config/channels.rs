//! Per-channel policy
//!
//! Read-only from the core's perspective: loaded from a TOML file at
//! startup and replaced wholesale by an explicit operator reload. The
//! core never writes this file.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Retrieval parameters for a channel's answer index
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalParams {
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            namespace: None,
        }
    }
}

fn default_top_k() -> u32 {
    5
}

fn default_similarity_threshold() -> f64 {
    0.7
}

/// Guardrails for privileged actions in a channel
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelPolicies {
    #[serde(default)]
    pub action_whitelist: Vec<String>,
    #[serde(default = "default_max_actions")]
    pub max_actions_per_day: i64,
}

impl Default for ChannelPolicies {
    fn default() -> Self {
        Self {
            action_whitelist: Vec::new(),
            max_actions_per_day: default_max_actions(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_actions() -> i64 {
    100
}

/// Configuration for a single channel
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub channel_id: String,
    pub name: String,
    pub rag_index: String,
    #[serde(default)]
    pub retrieval_params: RetrievalParams,
    #[serde(default)]
    pub approvers: Vec<String>,
    #[serde(default = "default_sla_minutes")]
    pub sla_minutes: i64,
    #[serde(default = "default_first_response_minutes")]
    pub first_response_minutes: i64,
    #[serde(default)]
    pub policies: ChannelPolicies,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ChannelConfig {
    pub fn is_approver(&self, user_id: &str) -> bool {
        self.approvers.iter().any(|a| a == user_id)
    }

    pub fn allows_action(&self, action_name: &str) -> bool {
        self.policies.action_whitelist.iter().any(|a| a == action_name)
    }
}

fn default_sla_minutes() -> i64 {
    120
}

fn default_first_response_minutes() -> i64 {
    15
}

#[derive(Debug, Deserialize)]
struct ChannelsFile {
    #[serde(default)]
    channels: Vec<ChannelConfig>,
}

/// In-memory view of the channel policy file
pub struct ChannelPolicyStore {
    path: PathBuf,
    channels: RwLock<HashMap<String, ChannelConfig>>,
}

impl ChannelPolicyStore {
    /// Load the policy file. A missing file yields an empty store:
    /// every channel is then treated as not configured.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let channels = Self::read_channels(&path)?;
        tracing::info!(path = %path.display(), channels = channels.len(), "Channel policy loaded");
        Ok(Self {
            path,
            channels: RwLock::new(channels),
        })
    }

    fn read_channels(path: &Path) -> Result<HashMap<String, ChannelConfig>, ConfigError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let parsed: ChannelsFile = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(parsed
            .channels
            .into_iter()
            .map(|c| (c.channel_id.clone(), c))
            .collect())
    }

    /// Replace the in-memory view from the file. On parse failure the
    /// previous view stays in effect.
    pub fn reload(&self) -> Result<usize, ConfigError> {
        let channels = Self::read_channels(&self.path)?;
        let count = channels.len();
        *self.channels.write().unwrap() = channels;
        tracing::info!(channels = count, "Channel policy reloaded");
        Ok(count)
    }

    pub fn get(&self, channel_id: &str) -> Option<ChannelConfig> {
        self.channels.read().unwrap().get(channel_id).cloned()
    }

    pub fn is_enabled(&self, channel_id: &str) -> bool {
        self.get(channel_id).is_some_and(|c| c.enabled)
    }

    pub fn list(&self) -> Vec<ChannelConfig> {
        self.channels.read().unwrap().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[[channels]]
channel_id = "C1"
name = "platform-support"
rag_index = "kb-platform"
approvers = ["U100", "U101"]
sla_minutes = 60
first_response_minutes = 10

[channels.retrieval_params]
top_k = 8

[channels.policies]
action_whitelist = ["restart_service", "clear_cache"]

[[channels]]
channel_id = "C2"
name = "billing-support"
rag_index = "kb-billing"
enabled = false
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_channels_with_defaults() {
        let file = write_config(SAMPLE);
        let store = ChannelPolicyStore::load(file.path()).unwrap();

        let c1 = store.get("C1").unwrap();
        assert_eq!(c1.name, "platform-support");
        assert_eq!(c1.sla_minutes, 60);
        assert_eq!(c1.retrieval_params.top_k, 8);
        assert_eq!(c1.retrieval_params.similarity_threshold, 0.7);
        assert_eq!(c1.policies.max_actions_per_day, 100);
        assert!(c1.enabled);

        let c2 = store.get("C2").unwrap();
        assert_eq!(c2.sla_minutes, 120);
        assert!(!c2.enabled);
    }

    #[test]
    fn approver_and_whitelist_checks() {
        let file = write_config(SAMPLE);
        let store = ChannelPolicyStore::load(file.path()).unwrap();
        let c1 = store.get("C1").unwrap();

        assert!(c1.is_approver("U100"));
        assert!(!c1.is_approver("U999"));
        assert!(c1.allows_action("restart_service"));
        assert!(!c1.allows_action("drop_database"));
    }

    #[test]
    fn enabled_gate() {
        let file = write_config(SAMPLE);
        let store = ChannelPolicyStore::load(file.path()).unwrap();

        assert!(store.is_enabled("C1"));
        assert!(!store.is_enabled("C2"), "disabled channel");
        assert!(!store.is_enabled("C999"), "unknown channel");
    }

    #[test]
    fn missing_file_is_empty_not_error() {
        let store = ChannelPolicyStore::load("/nonexistent/channels.toml").unwrap();
        assert!(store.list().is_empty());
        assert!(!store.is_enabled("C1"));
    }

    #[test]
    fn reload_picks_up_changes() {
        let mut file = write_config(SAMPLE);
        let store = ChannelPolicyStore::load(file.path()).unwrap();
        assert_eq!(store.list().len(), 2);

        file.as_file_mut().set_len(0).unwrap();
        use std::io::Seek;
        file.as_file_mut().rewind().unwrap();
        file.write_all(
            br#"
[[channels]]
channel_id = "C3"
name = "new-channel"
rag_index = "kb-new"
"#,
        )
        .unwrap();
        file.flush().unwrap();

        let count = store.reload().unwrap();
        assert_eq!(count, 1);
        assert!(store.get("C1").is_none());
        assert!(store.get("C3").is_some());
    }
}
