use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;

// Origins allowed by default while running locally
const DEV_ORIGINS: [&str; 2] = ["http://127.0.0.1:5173", "http://localhost:5173"];

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "portfolio-agent")]
#[command(about = "Chat agent that answers questions with an LLM, GitHub and a static bio")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // development enables pretty logs and localhost CORS origins
    #[arg(long, env = "ENVIRONMENT", value_enum, default_value_t = Environment::Development)]
    pub environment: Environment,

    // Completion API key, /chat answers 500 without it
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o")]
    pub model: String,

    #[arg(long, env = "MAX_OUTPUT_TOKENS", default_value_t = 600)]
    pub max_output_tokens: u32,

    // Overall budget for the tool-call loop, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECONDS", default_value_t = 20)]
    pub request_timeout: u64,

    // Shared secret clients send in X-API-Key
    #[arg(long, env = "API_SECRET_KEY", hide_env_values = true)]
    pub api_secret: String,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    // Account whose repositories the agent talks about
    #[arg(long, env = "GITHUB_USER", default_value = "")]
    pub github_user: String,

    #[arg(long, env = "BIO_PATH", default_value = "data/bio.json")]
    pub bio_path: String,

    // Comma-separated list of allowed CORS origins
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "")]
    pub allowed_origins: String,

    // Use the first X-Forwarded-For hop as client identifier (behind a proxy only)
    #[arg(long, env = "TRUST_FORWARDED_FOR")]
    pub trust_forwarded_for: bool,

    // Max requests per client in any rolling 60 seconds
    #[arg(long, env = "MINUTE_LIMIT", default_value_t = 30)]
    pub minute_limit: u32,

    // Max requests per client per calendar hour
    #[arg(long, env = "HOURLY_LIMIT", default_value_t = 200)]
    pub hourly_limit: u64,

    // Max requests across all clients per calendar hour, 0 disables
    #[arg(long, env = "GLOBAL_HOURLY_LIMIT", default_value_t = 1000)]
    pub global_hourly_limit: u64,

    // Tool result cache TTL in seconds
    #[arg(short, long, env = "CACHE_TTL_SECONDS", default_value_t = 300)]
    pub cache_ttl: u64,

    // Housekeeping interval in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECONDS", default_value_t = 300)]
    pub sweep_interval: u64,

    // Force JSON logs outside production
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    pub fn rate_limits(&self) -> RateLimitConfig {
        RateLimitConfig {
            per_minute: self.minute_limit as usize,
            per_hour: self.hourly_limit,
            global_per_hour: self.global_hourly_limit,
            ..RateLimitConfig::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn json_logs(&self) -> bool {
        self.log_json || self.is_production()
    }

    // Explicit origins win; development falls back to the local frontend
    pub fn cors_origins(&self) -> Vec<String> {
        let explicit: Vec<String> = self
            .allowed_origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        if !explicit.is_empty() || self.is_production() {
            return explicit;
        }
        DEV_ORIGINS.iter().map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["portfolio-agent", "--api-secret", "s3cret"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_match_documented_limits() {
        let args = parse(&[]);
        let limits = args.rate_limits();
        assert_eq!(limits.per_minute, 30);
        assert_eq!(limits.per_hour, 200);
        assert_eq!(limits.global_per_hour, 1000);
        assert_eq!(args.request_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn every_flag_has_an_env_fallback() {
        use clap::CommandFactory;

        let cmd = Args::command();
        for arg in cmd.get_arguments() {
            let id = arg.get_id().as_str();
            if id == "help" || id == "version" {
                continue;
            }
            assert!(arg.get_env().is_some(), "--{} has no env var", id);
        }
    }

    #[test]
    fn explicit_origins_are_split_and_trimmed() {
        let args = parse(&["--allowed-origins", "https://a.dev, https://b.dev ,"]);
        assert_eq!(args.cors_origins(), vec!["https://a.dev", "https://b.dev"]);
    }

    #[test]
    fn production_has_no_implicit_origins() {
        let args = parse(&["--environment", "production"]);
        assert!(args.cors_origins().is_empty());
        assert!(args.json_logs());
    }
}
