use crate::core::types::{Credentials, DateFilter, InvalidDateFilter};
use crate::features::antibot::PacingFileConfig;
use crate::features::qualifier::{QualifierConfig, DEFAULT_INSTRUCTION, DEFAULT_LLM_BASE_URL, DEFAULT_MODEL};
use crate::scraping::browser_manager::{default_profile_dir, expand_tilde, BrowserSettings};
use crate::scraping::linkedin::{AnomalyMarkers, LinkedInSettings, SelectorConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "lead-scout.json";

pub const ENV_CONFIG: &str = "LEAD_SCOUT_CONFIG";
pub const ENV_EMAIL: &str = "LINKEDIN_EMAIL";
pub const ENV_PASSWORD: &str = "LINKEDIN_PASSWORD";
pub const ENV_MODEL: &str = "LEAD_SCOUT_MODEL";
pub const ENV_LLM_BASE_URL: &str = "LEAD_SCOUT_LLM_BASE_URL";
pub const ENV_LLM_API_KEY: &str = "LEAD_SCOUT_LLM_API_KEY";
pub const ENV_OUTPUT: &str = "LEAD_SCOUT_OUTPUT";
pub const ENV_SESSION_FILE: &str = "LEAD_SCOUT_SESSION_FILE";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

pub const DEFAULT_QUERIES: [&str; 5] = [
    "\"looking for a virtual assistant\"",
    "\"virtual assistant recommendation\"",
    "\"seeking administrative support\"",
    "\"need help with admin tasks\"",
    "\"hiring a VA\"",
];
pub const DEFAULT_LEAD_GOAL: usize = 20;
pub const DEFAULT_OUTPUT_PATH: &str = "linkedin_leads.csv";
pub const DEFAULT_SESSION_PATH: &str = "seen_posts.txt";
pub const DEFAULT_MAX_PAGES_PER_QUERY: usize = 15;
pub const DEFAULT_EXCERPT_MAX_CHARS: usize = 1000;
pub const DEFAULT_ELEMENT_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("missing credential: set {0}")]
    MissingCredential(&'static str),

    #[error(transparent)]
    DateFilter(#[from] InvalidDateFilter),

    #[error("lead_goal_count must be a positive integer (got {0})")]
    InvalidGoal(i64),

    #[error("no search queries configured")]
    NoQueries,

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// File config (lead-scout.json): every field optional, env vars override
// ---------------------------------------------------------------------------

/// `llm` section.
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct LlmFileConfig {
    /// e.g. `http://localhost:11434/v1` (Ollama).
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Never logged. Leave blank for key-less local endpoints.
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Prompt template; `{post}` marks where the post text goes.
    pub instruction: Option<String>,
}

impl LlmFileConfig {
    /// `LEAD_SCOUT_LLM_BASE_URL` → JSON field → Ollama default.
    pub fn resolve_base_url(&self, env: &impl Fn(&str) -> Option<String>) -> String {
        env(ENV_LLM_BASE_URL)
            .or_else(|| non_blank(&self.base_url))
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string())
    }

    /// `LEAD_SCOUT_MODEL` → JSON field → `deepseek-r1:8b`.
    pub fn resolve_model(&self, env: &impl Fn(&str) -> Option<String>) -> String {
        env(ENV_MODEL)
            .or_else(|| non_blank(&self.model))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// `LEAD_SCOUT_LLM_API_KEY` → JSON field → none.
    pub fn resolve_api_key(&self, env: &impl Fn(&str) -> Option<String>) -> Option<String> {
        env(ENV_LLM_API_KEY).or_else(|| non_blank(&self.api_key))
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS).max(1))
    }

    pub fn resolve_instruction(&self) -> String {
        non_blank(&self.instruction).unwrap_or_else(|| DEFAULT_INSTRUCTION.to_string())
    }
}

/// `browser` section.
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserFileConfig {
    /// Headless mode makes CAPTCHA resolution impossible. Default: false.
    pub headless: Option<bool>,
    pub chrome_executable: Option<String>,
    /// Persistent profile dir. Default: `~/.lead-scout/browser-profile`.
    pub user_data_dir: Option<String>,
    pub element_timeout_secs: Option<u64>,
}

impl BrowserFileConfig {
    pub fn resolve(&self, env: &impl Fn(&str) -> Option<String>) -> BrowserSettings {
        let defaults = BrowserSettings::default();
        BrowserSettings {
            headless: self.headless.unwrap_or(false),
            chrome_executable: env(ENV_CHROME_EXECUTABLE).or_else(|| non_blank(&self.chrome_executable)),
            user_data_dir: non_blank(&self.user_data_dir)
                .map(|p| expand_tilde(&p))
                .or_else(default_profile_dir),
            element_timeout: Duration::from_secs(
                self.element_timeout_secs
                    .unwrap_or(DEFAULT_ELEMENT_TIMEOUT_SECS)
                    .max(1),
            ),
            ..defaults
        }
    }
}

/// `credentials` section. Environment variables take precedence.
#[derive(serde::Deserialize, Default, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsFileConfig {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for CredentialsFileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsFileConfig")
            .field("email", &self.email.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Top-level config loaded from `lead-scout.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub queries: Option<Vec<String>>,
    /// Signed so a negative value is reported instead of failing to parse.
    pub lead_goal_count: Option<i64>,
    pub date_filter: Option<String>,
    pub output_path: Option<String>,
    pub session_path: Option<String>,
    pub max_pages_per_query: Option<usize>,
    pub excerpt_max_chars: Option<usize>,
    pub llm: LlmFileConfig,
    pub pacing: PacingFileConfig,
    pub browser: BrowserFileConfig,
    pub selectors: SelectorConfig,
    pub anomaly: AnomalyMarkers,
    pub credentials: CredentialsFileConfig,
}

/// Load `lead-scout.json`.
///
/// Search order (first found wins):
/// 1. `explicit` (`--config`) or the `LEAD_SCOUT_CONFIG` path; must exist
/// 2. `./lead-scout.json`
/// 3. `../lead-scout.json`
///
/// No file anywhere → defaults. A file that exists but does not parse is an
/// error, not a silent fallback.
pub fn load_file_config(explicit: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    let required = explicit
        .map(Path::to_path_buf)
        .or_else(|| env_var(ENV_CONFIG).map(PathBuf::from));

    if let Some(path) = required {
        let cfg = read_config_file(&path)?;
        return Ok((cfg, Some(path)));
    }

    for candidate in [
        PathBuf::from(CONFIG_FILE_NAME),
        Path::new("..").join(CONFIG_FILE_NAME),
    ] {
        if candidate.is_file() {
            let cfg = read_config_file(&candidate)?;
            return Ok((cfg, Some(candidate)));
        }
    }

    Ok((FileConfig::default(), None))
}

pub fn read_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg = serde_json::from_str::<FileConfig>(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("{} loaded from {}", CONFIG_FILE_NAME, path.display());
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// RunConfig: validated, immutable for the whole run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub queries: Vec<String>,
    pub lead_goal_count: usize,
    pub date_filter: DateFilter,
    pub max_pages_per_query: usize,
    pub excerpt_max_chars: usize,
    pub output_path: PathBuf,
    pub session_path: PathBuf,
    pub qualifier: QualifierConfig,
    pub driver: LinkedInSettings,
}

impl RunConfig {
    /// Validate `file` with `env` as the environment lookup.
    pub fn build(file: &FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let queries: Vec<String> = match &file.queries {
            Some(q) => q
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_QUERIES.iter().map(|s| s.to_string()).collect(),
        };
        if queries.is_empty() {
            return Err(ConfigError::NoQueries);
        }

        let lead_goal_count = match file.lead_goal_count {
            None => DEFAULT_LEAD_GOAL,
            Some(n) if n > 0 => n as usize,
            Some(n) => return Err(ConfigError::InvalidGoal(n)),
        };

        let date_filter = match &file.date_filter {
            Some(raw) => raw.parse::<DateFilter>()?,
            None => DateFilter::default(),
        };

        let max_pages_per_query = file.max_pages_per_query.unwrap_or(DEFAULT_MAX_PAGES_PER_QUERY);
        if max_pages_per_query == 0 {
            return Err(ConfigError::Invalid {
                field: "max_pages_per_query",
                reason: "must be at least 1".into(),
            });
        }

        let excerpt_max_chars = file.excerpt_max_chars.unwrap_or(DEFAULT_EXCERPT_MAX_CHARS);
        if excerpt_max_chars == 0 {
            return Err(ConfigError::Invalid {
                field: "excerpt_max_chars",
                reason: "must be at least 1".into(),
            });
        }

        let output_path = env(ENV_OUTPUT)
            .or_else(|| non_blank(&file.output_path))
            .unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string());
        let session_path = env(ENV_SESSION_FILE)
            .or_else(|| non_blank(&file.session_path))
            .unwrap_or_else(|| DEFAULT_SESSION_PATH.to_string());

        let base_url = file.llm.resolve_base_url(&env);
        url::Url::parse(&base_url).map_err(|e| ConfigError::Invalid {
            field: "llm.base_url",
            reason: format!("{}: {}", base_url, e),
        })?;

        let qualifier = QualifierConfig {
            base_url,
            model: file.llm.resolve_model(&env),
            api_key: file.llm.resolve_api_key(&env),
            timeout: file.llm.resolve_timeout(),
            instruction: file.llm.resolve_instruction(),
        };

        let driver = LinkedInSettings {
            browser: file.browser.resolve(&env),
            selectors: file.selectors.clone(),
            anomaly: file.anomaly.clone(),
            pacing: file.pacing.resolve(),
        };

        Ok(Self {
            queries,
            lead_goal_count,
            date_filter,
            max_pages_per_query,
            excerpt_max_chars,
            output_path: expand_tilde(&output_path),
            session_path: expand_tilde(&session_path),
            qualifier,
            driver,
        })
    }

    /// [`RunConfig::build`] against the process environment.
    pub fn from_env(file: &FileConfig) -> Result<Self, ConfigError> {
        Self::build(file, env_var)
    }
}

/// `LINKEDIN_EMAIL` / `LINKEDIN_PASSWORD`, falling back to the config file.
pub fn resolve_credentials(
    file: &FileConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Credentials, ConfigError> {
    let email = env(ENV_EMAIL)
        .or_else(|| non_blank(&file.credentials.email))
        .ok_or(ConfigError::MissingCredential(ENV_EMAIL))?;
    // The file password is taken verbatim; only an empty one is rejected.
    let password = env(ENV_PASSWORD)
        .or_else(|| file.credentials.password.clone().filter(|p| !p.is_empty()))
        .ok_or(ConfigError::MissingCredential(ENV_PASSWORD))?;
    Ok(Credentials { email, password })
}

/// Non-empty, trimmed environment variable.
pub fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_blank(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
