use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Confirm, Input, Password};
use std::io::Write;
use std::path::PathBuf;

/// Agency Gateway - admin dashboard backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8000")]
    pub port: u16,

    /// Supabase project URL
    #[arg(short = 'u', long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase anon (publishable) API key
    #[arg(short = 'k', long, env = "SUPABASE_ANON_KEY")]
    pub supabase_anon_key: Option<String>,

    /// Path to the local session store database
    #[arg(short = 'd', long, env = "SESSION_DB_FILE")]
    pub session_db_file: Option<String>,

    /// OpenRouter API key for advert idea generation
    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub openrouter_api_key: Option<String>,

    /// OpenRouter model for advert idea generation
    #[arg(long, env = "OPENROUTER_MODEL", default_value = "openai/gpt-4o-mini")]
    pub openrouter_model: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// HTTP max retries
    #[arg(long, env = "HTTP_MAX_RETRIES", default_value = "3")]
    pub http_retries: u32,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Backend provider
    pub supabase_url: String,
    pub supabase_anon_key: String,

    // Local session store
    pub session_db_file: PathBuf,

    // Idea generation
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,
    pub http_max_retries: u32,

    // Reference data cache TTL in seconds
    pub reference_cache_ttl: u64,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        // Parse CLI arguments
        let args = CliArgs::parse();

        let config = Config {
            server_host: args.host,
            server_port: args.port,

            supabase_url: args
                .supabase_url
                .or_else(|| std::env::var("SUPABASE_URL").ok())
                .map(|u| u.trim_end_matches('/').to_string())
                .context("SUPABASE_URL is required (use -u or set SUPABASE_URL env var)")?,

            supabase_anon_key: args
                .supabase_anon_key
                .or_else(|| std::env::var("SUPABASE_ANON_KEY").ok())
                .context("SUPABASE_ANON_KEY is required (use -k or set SUPABASE_ANON_KEY env var)")?,

            session_db_file: args
                .session_db_file
                .map(|s| expand_tilde(&s))
                .unwrap_or_else(default_session_db_path),

            openrouter_api_key: args.openrouter_api_key,
            openrouter_model: args.openrouter_model,

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            http_request_timeout: args.http_timeout,

            http_max_retries: args.http_retries,

            reference_cache_ttl: std::env::var("REFERENCE_CACHE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),

            log_level: args.log_level,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.supabase_url.starts_with("http://") && !self.supabase_url.starts_with("https://") {
            anyhow::bail!(
                "SUPABASE_URL must be an http(s) URL, got: {}",
                self.supabase_url
            );
        }

        // The session store file is created lazily, but its directory must exist
        if let Some(parent) = self.session_db_file.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create session store directory: {}",
                    parent.display()
                )
            })?;
        }

        Ok(())
    }
}

/// Default location for the local session store
fn default_session_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agency-gateway")
        .join("session.sqlite3")
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(&path[2..]);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/session.sqlite3");
        assert!(path.to_string_lossy().contains("test/session.sqlite3"));
        assert!(!path.to_string_lossy().starts_with("~"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_relative_path() {
        let path = expand_tilde("relative/path");
        assert_eq!(path, PathBuf::from("relative/path"));
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        // Just "~" without slash should not expand
        let path = expand_tilde("~");
        assert_eq!(path, PathBuf::from("~"));
    }

    #[test]
    fn test_default_session_db_path() {
        let path = default_session_db_path();
        assert!(path.to_string_lossy().contains("agency-gateway"));
        assert!(path.to_string_lossy().ends_with("session.sqlite3"));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = Config {
            server_host: "0.0.0.0".to_string(),
            server_port: 8000,
            supabase_url: "ftp://example.supabase.co".to_string(),
            supabase_anon_key: "anon".to_string(),
            session_db_file: std::env::temp_dir().join("agency-test").join("s.sqlite3"),
            openrouter_api_key: None,
            openrouter_model: "openai/gpt-4o-mini".to_string(),
            http_max_connections: 20,
            http_connect_timeout: 10,
            http_request_timeout: 30,
            http_max_retries: 3,
            reference_cache_ttl: 60,
            log_level: "info".to_string(),
        };
        assert!(config.validate().is_err());
    }
}

// === Interactive Setup ===

/// Check if interactive setup is needed (no .env file and missing required values)
pub fn needs_interactive_setup() -> bool {
    let env_file_exists = std::path::Path::new(".env").exists();

    let has_url = std::env::var("SUPABASE_URL").is_ok();
    let has_key = std::env::var("SUPABASE_ANON_KEY").is_ok();

    !env_file_exists && (!has_url || !has_key)
}

/// Run interactive setup to collect required configuration
pub fn run_interactive_setup() -> Result<InteractiveConfig> {
    println!();
    println!("Agency Gateway - first time setup");
    println!("No configuration found. Let's connect your Supabase project.");
    println!();

    let supabase_url: String = Input::new()
        .with_prompt("Supabase project URL (SUPABASE_URL)")
        .interact_text()
        .context("Failed to read SUPABASE_URL")?;

    if supabase_url.is_empty() {
        anyhow::bail!("SUPABASE_URL cannot be empty");
    }

    let supabase_anon_key: String = Password::new()
        .with_prompt("Supabase anon key (SUPABASE_ANON_KEY)")
        .interact()
        .context("Failed to read SUPABASE_ANON_KEY")?;

    if supabase_anon_key.is_empty() {
        anyhow::bail!("SUPABASE_ANON_KEY cannot be empty");
    }

    println!();
    let openrouter_api_key: String = Input::new()
        .with_prompt("OpenRouter API key for advert ideas (leave empty to skip)")
        .allow_empty(true)
        .interact_text()
        .context("Failed to read OPENROUTER_API_KEY")?;

    println!();
    let server_port: String = Input::new()
        .with_prompt("Server port")
        .default("8000".to_string())
        .interact_text()
        .context("Failed to read server port")?;

    let config = InteractiveConfig {
        supabase_url,
        supabase_anon_key,
        openrouter_api_key,
        server_port,
    };

    println!();
    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        println!();
        println!("Configuration saved to .env file");
    }

    println!();
    println!("Setup complete! Starting gateway...");
    println!();

    Ok(config)
}

/// Configuration collected from interactive setup
#[derive(Debug, Clone)]
pub struct InteractiveConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub openrouter_api_key: String,
    pub server_port: String,
}

/// Save configuration to .env file
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let openrouter_line = if config.openrouter_api_key.is_empty() {
        "# OPENROUTER_API_KEY=".to_string()
    } else {
        format!("OPENROUTER_API_KEY={}", config.openrouter_api_key)
    };

    let env_content = format!(
        r#"# Agency Gateway Configuration
# Generated by interactive setup

# Supabase project (required)
SUPABASE_URL={}
SUPABASE_ANON_KEY={}

# Advert idea generation (optional)
{}
OPENROUTER_MODEL=openai/gpt-4o-mini

# Server settings
SERVER_HOST=0.0.0.0
SERVER_PORT={}

# Logging (trace, debug, info, warn, error)
LOG_LEVEL=info
"#,
        config.supabase_url, config.supabase_anon_key, openrouter_line, config.server_port,
    );

    let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
    file.write_all(env_content.as_bytes())
        .context("Failed to write .env file")?;

    Ok(())
}
