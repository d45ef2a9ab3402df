use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

/// Default maximum output tokens for generation requests.
const DEFAULT_MAX_TOKENS: i32 = 500;

/// Default sampling temperature. Kept low: the output is advisory medical text.
const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default soft deadline for one generation call, in seconds.
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 30;

/// Default upload limit for audio and image bodies (10MB).
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const DEFAULT_NER_MODEL: &str = "ugaray96/biobert_ncbi_disease_ner";

#[derive(Debug, Clone)]
pub struct DiagnosisConfig {
    pub common: core_config::Config,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub ner: NerConfig,
    pub transcription: TranscriptionConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// sqlx connection string, e.g. `sqlite://patients.db?mode=rwc`.
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: Secret<String>,
    pub model: String,
    /// Override for OpenAI-compatible endpoints.
    pub base_url: Option<String>,
    pub max_tokens: i32,
    pub temperature: f32,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub response_mode: ResponseMode,
}

#[derive(Debug, Clone)]
pub struct NerConfig {
    pub provider: NerProviderKind,
    pub api_key: Secret<String>,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub provider: TranscriptionProviderKind,
    pub api_key: Secret<String>,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub max_upload_bytes: usize,
    /// Empty means any origin is allowed.
    pub cors_allowed_origins: Vec<String>,
}

/// Generative-text backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    Gemini,
    OpenAi,
    Groq,
    Mock,
}

impl LlmProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProviderKind::Gemini => "gemini",
            LlmProviderKind::OpenAi => "openai",
            LlmProviderKind::Groq => "groq",
            LlmProviderKind::Mock => "mock",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            LlmProviderKind::Gemini => "gemini-2.0-flash",
            LlmProviderKind::OpenAi => "gpt-4",
            LlmProviderKind::Groq => "llama-3.3-70b-versatile",
            LlmProviderKind::Mock => "mock-diagnosis",
        }
    }

    /// Provider-specific key variables accepted in addition to `LLM_API_KEY`.
    fn key_aliases(&self) -> &'static [&'static str] {
        match self {
            LlmProviderKind::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            LlmProviderKind::OpenAi => &["OPENAI_API_KEY"],
            LlmProviderKind::Groq => &["GROQ_API_KEY"],
            LlmProviderKind::Mock => &[],
        }
    }
}

impl FromStr for LlmProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmProviderKind::Gemini),
            "openai" => Ok(LlmProviderKind::OpenAi),
            "groq" => Ok(LlmProviderKind::Groq),
            "mock" => Ok(LlmProviderKind::Mock),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown LLM_PROVIDER '{}': expected gemini, openai, groq or mock",
                other
            ))),
        }
    }
}

/// Entity-extraction backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NerProviderKind {
    HuggingFace,
    Mock,
    Disabled,
}

impl FromStr for NerProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "huggingface" | "hf" => Ok(NerProviderKind::HuggingFace),
            "mock" => Ok(NerProviderKind::Mock),
            "disabled" | "none" | "off" => Ok(NerProviderKind::Disabled),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown NER_PROVIDER '{}': expected huggingface, mock or disabled",
                other
            ))),
        }
    }
}

/// Speech-to-text backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionProviderKind {
    OpenAi,
    Groq,
    Mock,
    Disabled,
}

impl TranscriptionProviderKind {
    fn default_model(&self) -> &'static str {
        match self {
            TranscriptionProviderKind::OpenAi => "whisper-1",
            TranscriptionProviderKind::Groq => "whisper-large-v3",
            TranscriptionProviderKind::Mock | TranscriptionProviderKind::Disabled => "",
        }
    }
}

impl FromStr for TranscriptionProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(TranscriptionProviderKind::OpenAi),
            "groq" => Ok(TranscriptionProviderKind::Groq),
            "mock" => Ok(TranscriptionProviderKind::Mock),
            "disabled" | "none" | "off" => Ok(TranscriptionProviderKind::Disabled),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown TRANSCRIPTION_PROVIDER '{}': expected openai, groq, mock or disabled",
                other
            ))),
        }
    }
}

/// Shape the generative capability is asked to answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Strict JSON object with the five diagnosis keys. Default.
    Structured,
    /// Raw text used as the diagnosis; legacy-compatible.
    FreeText,
}

impl FromStr for ResponseMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured" | "json" => Ok(ResponseMode::Structured),
            "free_text" | "freetext" | "text" => Ok(ResponseMode::FreeText),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown DIAGNOSIS_RESPONSE_MODE '{}': expected structured or free_text",
                other
            ))),
        }
    }
}

impl DiagnosisConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let llm_provider: LlmProviderKind = get_env("LLM_PROVIDER", Some("gemini"), is_prod)?.parse()?;
        let llm_api_key = if llm_provider == LlmProviderKind::Mock {
            String::new()
        } else {
            get_env_any("LLM_API_KEY", llm_provider.key_aliases())?
        };

        let ner_api_key = env::var("NER_API_KEY")
            .or_else(|_| env::var("HF_API_TOKEN"))
            .ok();
        let ner_provider: NerProviderKind = match env::var("NER_PROVIDER") {
            Ok(value) => value.parse()?,
            Err(_) if ner_api_key.is_some() => NerProviderKind::HuggingFace,
            Err(_) => NerProviderKind::Disabled,
        };
        let ner_api_key = match (ner_provider, ner_api_key) {
            (NerProviderKind::HuggingFace, None) => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "NER_API_KEY is required when NER_PROVIDER=huggingface"
                )));
            }
            (_, key) => key.unwrap_or_default(),
        };

        let transcription_provider: TranscriptionProviderKind =
            get_env("TRANSCRIPTION_PROVIDER", Some("disabled"), false)?.parse()?;
        let transcription_api_key = match transcription_provider {
            TranscriptionProviderKind::OpenAi => {
                get_env_any("TRANSCRIPTION_API_KEY", &["OPENAI_API_KEY"])?
            }
            TranscriptionProviderKind::Groq => {
                get_env_any("TRANSCRIPTION_API_KEY", &["GROQ_API_KEY"])?
            }
            TranscriptionProviderKind::Mock | TranscriptionProviderKind::Disabled => String::new(),
        };

        Ok(DiagnosisConfig {
            common: common_config,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", Some("sqlite://patients.db?mode=rwc"), is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
            },
            llm: LlmConfig {
                provider: llm_provider,
                api_key: Secret::new(llm_api_key),
                model: get_env("LLM_MODEL", Some(llm_provider.default_model()), false)?,
                base_url: env::var("LLM_BASE_URL").ok(),
                max_tokens: parse_env("LLM_MAX_TOKENS", DEFAULT_MAX_TOKENS),
                temperature: parse_env("LLM_TEMPERATURE", DEFAULT_TEMPERATURE),
                max_retries: parse_env("LLM_MAX_RETRIES", 1),
                timeout_secs: parse_env("GENERATION_TIMEOUT_SECS", DEFAULT_GENERATION_TIMEOUT_SECS),
                response_mode: get_env("DIAGNOSIS_RESPONSE_MODE", Some("structured"), false)?
                    .parse()?,
            },
            ner: NerConfig {
                provider: ner_provider,
                api_key: Secret::new(ner_api_key),
                model: get_env("NER_MODEL", Some(DEFAULT_NER_MODEL), false)?,
                base_url: env::var("NER_BASE_URL").ok(),
            },
            transcription: TranscriptionConfig {
                provider: transcription_provider,
                api_key: Secret::new(transcription_api_key),
                model: get_env(
                    "TRANSCRIPTION_MODEL",
                    Some(transcription_provider.default_model()),
                    false,
                )?,
                base_url: env::var("TRANSCRIPTION_BASE_URL").ok(),
            },
            http: HttpConfig {
                max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
                cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                    .map(|v| parse_origins(&v))
                    .unwrap_or_default(),
            },
        })
    }
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a mandatory credential from `key` or any of its aliases.
fn get_env_any(key: &str, aliases: &[&str]) -> Result<String, AppError> {
    std::iter::once(key)
        .chain(aliases.iter().copied())
        .find_map(|k| env::var(k).ok().filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "{} is required but not set (also checked: {})",
                key,
                if aliases.is_empty() {
                    "none".to_string()
                } else {
                    aliases.join(", ")
                }
            ))
        })
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kinds_parse_case_insensitively() {
        assert_eq!("Gemini".parse::<LlmProviderKind>().unwrap(), LlmProviderKind::Gemini);
        assert_eq!(" groq ".parse::<LlmProviderKind>().unwrap(), LlmProviderKind::Groq);
        assert!("bard".parse::<LlmProviderKind>().is_err());
        assert_eq!("off".parse::<NerProviderKind>().unwrap(), NerProviderKind::Disabled);
    }

    #[test]
    fn response_mode_accepts_aliases() {
        assert_eq!("json".parse::<ResponseMode>().unwrap(), ResponseMode::Structured);
        assert_eq!("free_text".parse::<ResponseMode>().unwrap(), ResponseMode::FreeText);
        assert!("yaml".parse::<ResponseMode>().is_err());
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        assert_eq!(
            parse_origins("http://a.test, http://b.test ,,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn missing_mandatory_key_is_a_config_error() {
        let err = get_env_any("DIAGNOSIS_TEST_UNSET_KEY", &["DIAGNOSIS_TEST_UNSET_ALIAS"])
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("DIAGNOSIS_TEST_UNSET_KEY"));
    }
}
