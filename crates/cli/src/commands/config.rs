use std::env;
use std::fs;
use std::path::Path;

use ordermate_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    render(&config, resolve_config_path(None).as_deref())
}

/// Renders every effective value with where it came from. Secrets are never
/// printed.
pub fn render(config: &AppConfig, config_file_path: Option<&Path>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(config) {
        let source = field_source(&field, config_file_doc.as_ref(), config_file_path);
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let store = &config.store;
    let llm = &config.llm;

    vec![
        Field::new("store.backend", store.backend.as_str(), &["ORDERMATE_STORE_BACKEND"]),
        Field::new("store.url", store.url.as_str(), &["ORDERMATE_STORE_URL"]),
        Field::new(
            "store.rtdb_url",
            store.rtdb_url.as_deref().unwrap_or("<unset>"),
            &["ORDERMATE_STORE_RTDB_URL", "FIREBASE_RTDB_URL"],
        ),
        Field::new(
            "store.rtdb_auth",
            redact_secret(store.rtdb_auth.as_ref()),
            &["ORDERMATE_STORE_RTDB_AUTH"],
        ),
        Field::new(
            "store.max_connections",
            store.max_connections.to_string(),
            &["ORDERMATE_STORE_MAX_CONNECTIONS"],
        ),
        Field::new(
            "store.timeout_secs",
            store.timeout_secs.to_string(),
            &["ORDERMATE_STORE_TIMEOUT_SECS"],
        ),
        Field::new("llm.provider", llm.provider.as_str(), &["ORDERMATE_LLM_PROVIDER"]),
        Field::new("llm.model", llm.model.as_str(), &["ORDERMATE_LLM_MODEL", "OPENAI_MODEL"]),
        Field::new(
            "llm.base_url",
            llm.base_url.as_deref().unwrap_or("<unset>"),
            &["ORDERMATE_LLM_BASE_URL"],
        ),
        Field::new(
            "llm.api_key",
            redact_secret(llm.api_key.as_ref()),
            &["ORDERMATE_LLM_API_KEY", "OPENAI_API_KEY"],
        ),
        Field::new("llm.timeout_secs", llm.timeout_secs.to_string(), &["ORDERMATE_LLM_TIMEOUT_SECS"]),
        Field::new("llm.temperature", llm.temperature.to_string(), &["ORDERMATE_LLM_TEMPERATURE"]),
        Field::new(
            "llm.max_tokens",
            llm.max_tokens.to_string(),
            &["ORDERMATE_LLM_MAX_TOKENS", "OPENAI_MAX_TOKENS"],
        ),
        Field::new(
            "server.bind_address",
            config.server.bind_address.as_str(),
            &["ORDERMATE_SERVER_BIND_ADDRESS"],
        ),
        Field::new("server.port", config.server.port.to_string(), &["ORDERMATE_SERVER_PORT"]),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["ORDERMATE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new(
            "session.idle_ttl_secs",
            config.session.idle_ttl_secs.to_string(),
            &["ORDERMATE_SESSION_IDLE_TTL_SECS"],
        ),
        Field::new(
            "session.max_sessions",
            config.session.max_sessions.to_string(),
            &["ORDERMATE_SESSION_MAX_SESSIONS"],
        ),
        Field::new(
            "logging.level",
            config.logging.level.as_str(),
            &["ORDERMATE_LOGGING_LEVEL", "ORDERMATE_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            config.logging.format.as_str(),
            &["ORDERMATE_LOGGING_FORMAT", "ORDERMATE_LOG_FORMAT"],
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_secret(secret: Option<&SecretString>) -> &'static str {
    match secret {
        Some(secret) if secret.expose_secret().trim().is_empty() => "<empty>",
        Some(_) => "<redacted>",
        None => "<unset>",
    }
}
