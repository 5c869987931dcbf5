use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::llm::local_inference::DeviceKind;
use crate::utils::{get_config_dir, get_data_dir};

pub const CONFIG_FILE_NAME: &str = "config.toml";

fn default_max_chars_per_chunk() -> usize {
    2000
}

fn default_cards_per_chunk() -> usize {
    8
}

fn default_min_chunk_chars() -> usize {
    100
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "llama2".into()
}

fn default_max_question_chars() -> usize {
    1000
}

fn default_max_answer_chars() -> usize {
    2000
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5000
}

/// Everything the commands read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_max_chars_per_chunk")]
    pub max_chars_per_chunk: usize,
    #[serde(default = "default_cards_per_chunk")]
    pub default_cards_per_chunk: usize,
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
    #[serde(default)]
    pub storage_mode: StorageMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub assembly: AssemblySettings,
    #[serde(default)]
    pub server: ServerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_chars_per_chunk: default_max_chars_per_chunk(),
            default_cards_per_chunk: default_cards_per_chunk(),
            min_chunk_chars: default_min_chunk_chars(),
            storage_mode: StorageMode::default(),
            output_dir: None,
            generation: GenerationSettings::default(),
            backend: BackendConfig::default(),
            assembly: AssemblySettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `--config` when given, otherwise from the per-user config dir.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<(Self, PathBuf)> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };
        let settings = Self::load(&path)?;
        Ok((settings, path))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chars_per_chunk == 0 {
            bail!("max_chars_per_chunk must be greater than zero");
        }
        if self.default_cards_per_chunk == 0 {
            bail!("default_cards_per_chunk must be greater than zero");
        }
        if self.generation.timeout_secs == 0 {
            bail!("generation.timeout_secs must be greater than zero");
        }
        if self.assembly.max_question_chars == 0 || self.assembly.max_answer_chars == 0 {
            bail!("assembly limits must be greater than zero");
        }
        Ok(())
    }

    /// Where card databases are written, creating the default data dir on demand.
    pub fn resolve_output_dir(&self) -> Result<PathBuf> {
        match &self.output_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_data_dir(),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize settings")
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// One database for every subject, or one database per subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    #[default]
    Global,
    PerSubject,
}

impl FromStr for StorageMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "global" => Ok(StorageMode::Global),
            "per_subject" => Ok(StorageMode::PerSubject),
            other => bail!("unknown storage mode `{other}` (expected global or per_subject)"),
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Global => write!(f, "global"),
            StorageMode::PerSubject => write!(f, "per_subject"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GenerationSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Backend selection and its connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    LocalInference {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_path: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokenizer_path: Option<PathBuf>,
        #[serde(default)]
        device: DeviceKind,
    },
    LocalServer {
        #[serde(default = "default_base_url")]
        base_url: String,
        #[serde(default = "default_model")]
        model: String,
    },
    RemoteHttp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::LocalServer {
            base_url: default_base_url(),
            model: default_model(),
        }
    }
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::LocalInference { .. } => BackendKind::LocalInference,
            BackendConfig::LocalServer { .. } => BackendKind::LocalServer,
            BackendConfig::RemoteHttp { .. } => BackendKind::RemoteHttp,
        }
    }

    /// Switch to `kind`, keeping the current parameters when the kind is unchanged.
    pub fn with_kind(self, kind: BackendKind) -> Self {
        if self.kind() == kind {
            return self;
        }
        match kind {
            BackendKind::LocalInference => BackendConfig::LocalInference {
                model_path: None,
                tokenizer_path: None,
                device: DeviceKind::default(),
            },
            BackendKind::LocalServer => BackendConfig::default(),
            BackendKind::RemoteHttp => BackendConfig::RemoteHttp {
                url: None,
                api_key: None,
            },
        }
    }

    /// Apply a `--model` override: the model name for a local server, the
    /// weights path for local inference.
    pub fn set_model(&mut self, value: &str) {
        match self {
            BackendConfig::LocalServer { model, .. } => *model = value.to_string(),
            BackendConfig::LocalInference { model_path, .. } => {
                *model_path = Some(PathBuf::from(value))
            }
            BackendConfig::RemoteHttp { .. } => {}
        }
    }

    /// Apply a `--url` override to whichever endpoint the backend talks to.
    pub fn set_url(&mut self, value: &str) {
        match self {
            BackendConfig::LocalServer { base_url, .. } => *base_url = value.to_string(),
            BackendConfig::RemoteHttp { url, .. } => *url = Some(value.to_string()),
            BackendConfig::LocalInference { .. } => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    LocalInference,
    LocalServer,
    RemoteHttp,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "local_inference" | "local" => Ok(BackendKind::LocalInference),
            "local_server" | "ollama" => Ok(BackendKind::LocalServer),
            "remote_http" | "remote" | "http" => Ok(BackendKind::RemoteHttp),
            other => bail!(
                "unknown backend `{other}` (expected local_inference, local_server or remote_http)"
            ),
        }
    }
}

/// What to do with a question or answer longer than its limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    #[default]
    Drop,
    Truncate,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssemblySettings {
    #[serde(default = "default_max_question_chars")]
    pub max_question_chars: usize,
    #[serde(default = "default_max_answer_chars")]
    pub max_answer_chars: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            max_question_chars: default_max_question_chars(),
            max_answer_chars: default_max_answer_chars(),
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Listen address for `flashgen serve`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.max_chars_per_chunk, 2000);
        assert_eq!(settings.default_cards_per_chunk, 8);
        assert_eq!(settings.storage_mode, StorageMode::Global);
        assert_eq!(settings.assembly.overflow, OverflowPolicy::Drop);
        assert_eq!(
            settings.backend,
            BackendConfig::LocalServer {
                base_url: "http://localhost:11434".into(),
                model: "llama2".into(),
            }
        );
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
max_chars_per_chunk = 500
storage_mode = "per_subject"

[generation]
timeout_secs = 5

[backend]
kind = "remote_http"
url = "https://example.test/generate"

[assembly]
overflow = "truncate"

[server]
port = 8080
"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.max_chars_per_chunk, 500);
        assert_eq!(settings.default_cards_per_chunk, 8);
        assert_eq!(settings.storage_mode, StorageMode::PerSubject);
        assert_eq!(settings.generation.timeout_secs, 5);
        assert_eq!(settings.generation.max_tokens, 1024);
        assert_eq!(settings.assembly.overflow, OverflowPolicy::Truncate);
        assert_eq!(settings.assembly.max_answer_chars, 2000);
        assert_eq!(
            settings.backend,
            BackendConfig::RemoteHttp {
                url: Some("https://example.test/generate".into()),
                api_key: None,
            }
        );
    }

    #[test]
    fn local_inference_section_parses_device() {
        let settings: Settings = toml::from_str(
            r#"
[backend]
kind = "local_inference"
model_path = "/models/tiny.gguf"
device = "cuda"
"#,
        )
        .unwrap();
        assert_eq!(
            settings.backend,
            BackendConfig::LocalInference {
                model_path: Some(PathBuf::from("/models/tiny.gguf")),
                tokenizer_path: None,
                device: DeviceKind::Cuda,
            }
        );
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_chars_per_chunk = 0\n").unwrap();
        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn unknown_backend_kind_is_an_error() {
        let parsed: Result<Settings, _> = toml::from_str("[backend]\nkind = \"carrier_pigeon\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn printed_settings_load_back() {
        let mut settings = Settings::default();
        settings.storage_mode = StorageMode::PerSubject;
        let text = settings.to_toml().unwrap();
        assert!(text.contains("kind = \"local_server\""));
        let reparsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(reparsed, settings);
    }

    #[test]
    fn cli_overrides_switch_backend() {
        let mut backend = BackendConfig::default().with_kind(BackendKind::RemoteHttp);
        backend.set_url("http://127.0.0.1:9000/gen");
        backend.set_model("ignored");
        assert_eq!(
            backend,
            BackendConfig::RemoteHttp {
                url: Some("http://127.0.0.1:9000/gen".into()),
                api_key: None,
            }
        );

        let mut backend = BackendConfig::default().with_kind(BackendKind::LocalServer);
        backend.set_model("mistral");
        assert!(matches!(backend, BackendConfig::LocalServer { ref model, .. } if model == "mistral"));
    }

    #[test]
    fn parse_kinds_and_modes() {
        assert_eq!("ollama".parse::<BackendKind>().unwrap(), BackendKind::LocalServer);
        assert_eq!(
            "remote-http".parse::<BackendKind>().unwrap(),
            BackendKind::RemoteHttp
        );
        assert!("gpt".parse::<BackendKind>().is_err());
        assert_eq!(
            "per-subject".parse::<StorageMode>().unwrap(),
            StorageMode::PerSubject
        );
    }
}
