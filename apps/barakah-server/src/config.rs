//! Server configuration from environment variables.
//!
//! ```bash
//! # Provider: Resend
//! BARAKAH_EMAIL_PROVIDER=resend
//! RESEND_API_KEY=re_...
//!
//! # Provider: SMTP
//! BARAKAH_EMAIL_PROVIDER=smtp
//! SMTP_HOST=smtp.gmail.com
//! SMTP_PORT=587
//! SMTP_USERNAME=user@example.com
//! SMTP_PASSWORD=app_password
//! SMTP_USE_TLS=true
//!
//! # Sender config
//! BARAKAH_EMAIL_FROM=noreply@barakah.app
//! BARAKAH_EMAIL_FROM_NAME="Barakah"
//!
//! # Bank aggregation API (all four or none)
//! BANK_API_BASE_URL=https://api.bank-aggregator.example/v1
//! BANK_CLIENT_ID=...
//! BANK_CLIENT_SECRET=...
//! BANK_REDIRECT_URI=https://barakah.app/bank/callback
//!
//! # Tuning
//! BARAKAH_UPSTREAM_TIMEOUT_SECS=30
//! BARAKAH_SWEEP_INTERVAL_HOURS=24
//! ```

use barakah_bank::BankConfig;
use barakah_email::EmailProviderConfig;
use std::env;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SWEEP_INTERVAL_HOURS: u64 = 24;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub email: Option<EmailConfig>,
    pub bank: Option<BankConfig>,
    pub upstream_timeout: Duration,
    pub sweep_interval: Duration,
}

/// Sender identity plus the provider to send through.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub provider: EmailProviderConfig,
    pub from_address: String,
    pub from_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid email provider: {0}. Expected 'resend' or 'smtp'")]
    InvalidProvider(String),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("Missing from address: BARAKAH_EMAIL_FROM is required when email is configured")]
    MissingFromAddress,

    #[error("SMTP provider requires SMTP_HOST")]
    SmtpMissingHost,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let upstream_timeout = Duration::from_secs(positive_number(
            "BARAKAH_UPSTREAM_TIMEOUT_SECS",
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
        )?);
        let sweep_hours =
            positive_number("BARAKAH_SWEEP_INTERVAL_HOURS", DEFAULT_SWEEP_INTERVAL_HOURS)?;
        let sweep_interval = sweep_hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::InvalidNumber {
                name: "BARAKAH_SWEEP_INTERVAL_HOURS",
                value: sweep_hours.to_string(),
            })?;

        Ok(Self {
            email: email_from_env()?,
            bank: bank_from_env(upstream_timeout)?,
            upstream_timeout,
            sweep_interval,
        })
    }
}

fn email_from_env() -> Result<Option<EmailConfig>, ConfigError> {
    let Ok(provider_type) = env::var("BARAKAH_EMAIL_PROVIDER") else {
        // No provider: codes are stored but not delivered
        return Ok(None);
    };

    let provider = match provider_type.to_lowercase().as_str() {
        "resend" => {
            let api_key = env::var("RESEND_API_KEY")
                .map_err(|_| ConfigError::MissingEnvVar("RESEND_API_KEY".to_string()))?;
            EmailProviderConfig::Resend { api_key }
        }
        "smtp" => {
            let host = env::var("SMTP_HOST").map_err(|_| ConfigError::SmtpMissingHost)?;
            let port = match env::var("SMTP_PORT") {
                Ok(raw) => raw
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidPort(raw))?,
                Err(_) => 587,
            };
            let username = env::var("SMTP_USERNAME").ok();
            let password = env::var("SMTP_PASSWORD").ok();
            let use_tls = env::var("SMTP_USE_TLS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(true); // TLS by default

            EmailProviderConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            }
        }
        other => return Err(ConfigError::InvalidProvider(other.to_string())),
    };

    let from_address =
        env::var("BARAKAH_EMAIL_FROM").map_err(|_| ConfigError::MissingFromAddress)?;
    let from_name = env::var("BARAKAH_EMAIL_FROM_NAME").ok();

    Ok(Some(EmailConfig {
        provider,
        from_address,
        from_name,
    }))
}

fn bank_from_env(timeout: Duration) -> Result<Option<BankConfig>, ConfigError> {
    let Ok(base_url) = env::var("BANK_API_BASE_URL") else {
        return Ok(None);
    };
    let required =
        |name: &str| env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()));

    Ok(Some(BankConfig {
        base_url,
        client_id: required("BANK_CLIENT_ID")?,
        client_secret: required("BANK_CLIENT_SECRET")?,
        redirect_uri: required("BANK_REDIRECT_URI")?,
        timeout,
    }))
}

fn positive_number(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidNumber { name, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: &[&str] = &[
        "BARAKAH_EMAIL_PROVIDER",
        "RESEND_API_KEY",
        "SMTP_HOST",
        "SMTP_PORT",
        "SMTP_USERNAME",
        "SMTP_PASSWORD",
        "SMTP_USE_TLS",
        "BARAKAH_EMAIL_FROM",
        "BARAKAH_EMAIL_FROM_NAME",
        "BANK_API_BASE_URL",
        "BANK_CLIENT_ID",
        "BANK_CLIENT_SECRET",
        "BANK_REDIRECT_URI",
        "BARAKAH_UPSTREAM_TIMEOUT_SECS",
        "BARAKAH_SWEEP_INTERVAL_HOURS",
    ];

    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
    }

    impl<'a> EnvGuard<'a> {
        fn new() -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            for var in ENV_VARS {
                env::remove_var(var);
            }
            Self { _lock: lock }
        }

        fn set(&self, key: &str, value: &str) {
            env::set_var(key, value);
        }
    }

    impl<'a> Drop for EnvGuard<'a> {
        fn drop(&mut self) {
            for var in ENV_VARS {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_defaults() {
        let _guard = EnvGuard::new();
        let config = ServerConfig::from_env().unwrap();
        assert!(config.email.is_none());
        assert!(config.bank.is_none());
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        assert_eq!(config.sweep_interval, Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_resend_provider_config() {
        let guard = EnvGuard::new();
        guard.set("BARAKAH_EMAIL_PROVIDER", "resend");
        guard.set("RESEND_API_KEY", "re_test_key");
        guard.set("BARAKAH_EMAIL_FROM", "test@example.com");
        guard.set("BARAKAH_EMAIL_FROM_NAME", "Barakah");

        let email = ServerConfig::from_env().unwrap().email.unwrap();
        assert_eq!(email.from_address, "test@example.com");
        assert_eq!(email.from_name, Some("Barakah".to_string()));
        match email.provider {
            EmailProviderConfig::Resend { api_key } => assert_eq!(api_key, "re_test_key"),
            _ => panic!("Expected Resend provider"),
        }
    }

    #[test]
    fn test_resend_missing_api_key() {
        let guard = EnvGuard::new();
        guard.set("BARAKAH_EMAIL_PROVIDER", "resend");
        guard.set("BARAKAH_EMAIL_FROM", "test@example.com");

        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_smtp_provider_config() {
        let guard = EnvGuard::new();
        guard.set("BARAKAH_EMAIL_PROVIDER", "SMTP");
        guard.set("SMTP_HOST", "smtp.example.com");
        guard.set("SMTP_PORT", "465");
        guard.set("SMTP_USERNAME", "user@example.com");
        guard.set("SMTP_PASSWORD", "secret");
        guard.set("SMTP_USE_TLS", "false");
        guard.set("BARAKAH_EMAIL_FROM", "test@example.com");

        let email = ServerConfig::from_env().unwrap().email.unwrap();
        match email.provider {
            EmailProviderConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                assert_eq!(host, "smtp.example.com");
                assert_eq!(port, 465);
                assert_eq!(username.as_deref(), Some("user@example.com"));
                assert_eq!(password.as_deref(), Some("secret"));
                assert!(!use_tls);
            }
            _ => panic!("Expected SMTP provider"),
        }
    }

    #[test]
    fn test_smtp_errors() {
        let guard = EnvGuard::new();
        guard.set("BARAKAH_EMAIL_PROVIDER", "smtp");
        guard.set("BARAKAH_EMAIL_FROM", "test@example.com");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::SmtpMissingHost)
        ));

        guard.set("SMTP_HOST", "smtp.example.com");
        guard.set("SMTP_PORT", "not-a-port");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidPort(p)) if p == "not-a-port"
        ));
    }

    #[test]
    fn test_invalid_provider_and_missing_from() {
        let guard = EnvGuard::new();
        guard.set("BARAKAH_EMAIL_PROVIDER", "carrier-pigeon");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidProvider(_))
        ));

        guard.set("BARAKAH_EMAIL_PROVIDER", "resend");
        guard.set("RESEND_API_KEY", "re_test_key");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::MissingFromAddress)
        ));
    }

    #[test]
    fn test_bank_config_requires_all_vars() {
        let guard = EnvGuard::new();
        guard.set("BANK_API_BASE_URL", "https://bank.example/v1");
        guard.set("BANK_CLIENT_ID", "client");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::MissingEnvVar(v)) if v == "BANK_CLIENT_SECRET"
        ));

        guard.set("BANK_CLIENT_SECRET", "secret");
        guard.set("BANK_REDIRECT_URI", "https://barakah.app/cb");
        guard.set("BARAKAH_UPSTREAM_TIMEOUT_SECS", "5");
        let bank = ServerConfig::from_env().unwrap().bank.unwrap();
        assert_eq!(bank.client_id, "client");
        assert_eq!(bank.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_numbers() {
        let guard = EnvGuard::new();
        guard.set("BARAKAH_SWEEP_INTERVAL_HOURS", "0");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidNumber {
                name: "BARAKAH_SWEEP_INTERVAL_HOURS",
                ..
            })
        ));

        // Fits in u64 as hours but not as seconds
        guard.set("BARAKAH_SWEEP_INTERVAL_HOURS", &u64::MAX.to_string());
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidNumber {
                name: "BARAKAH_SWEEP_INTERVAL_HOURS",
                ..
            })
        ));

        guard.set("BARAKAH_SWEEP_INTERVAL_HOURS", "2");
        assert_eq!(
            ServerConfig::from_env().unwrap().sweep_interval,
            Duration::from_secs(2 * 3600)
        );
    }
}
