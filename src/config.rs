use std::time::Duration;

use crate::quiz::runner::AnswerPolicy;

/// Telegram only accepts an `open_period` within this range (seconds).
pub const OPEN_PERIOD_SECS: std::ops::RangeInclusive<u64> = 5..=600;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    /// Per-question answer window. `None` leaves advancing to `/next`.
    pub question_timeout: Option<Duration>,
    pub answer_policy: AnswerPolicy,
}

impl Config {
    /// Reads the process environment, after loading `.env` if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("BOT_TOKEN")
            .or_else(|| lookup("TELOXIDE_TOKEN"))
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let question_timeout = match lookup("QUESTION_TIMEOUT_SECS") {
            None => None,
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                    name: "QUESTION_TIMEOUT_SECS",
                    reason: format!("{}", e),
                })?;
                if secs == 0 {
                    None
                } else if OPEN_PERIOD_SECS.contains(&secs) {
                    Some(Duration::from_secs(secs))
                } else {
                    return Err(ConfigError::Invalid {
                        name: "QUESTION_TIMEOUT_SECS",
                        reason: format!(
                            "{} is outside {}..={} seconds",
                            secs,
                            OPEN_PERIOD_SECS.start(),
                            OPEN_PERIOD_SECS.end()
                        ),
                    });
                }
            }
        };

        let answer_policy = match lookup("ANSWER_POLICY").as_deref().map(str::trim) {
            None | Some("") | Some("first") => AnswerPolicy::FirstWriteWins,
            Some("last") => AnswerPolicy::LastWriteWins,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "ANSWER_POLICY",
                    reason: format!("expected `first` or `last`, got `{}`", other),
                })
            }
        };

        Ok(Self {
            bot_token,
            question_timeout,
            answer_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_disable_the_timer() {
        let config = config(&[("BOT_TOKEN", "123:abc")]).unwrap();
        assert_eq!(config.bot_token, "123:abc");
        assert_eq!(config.question_timeout, None);
        assert_eq!(config.answer_policy, AnswerPolicy::FirstWriteWins);
    }

    #[test]
    fn falls_back_to_teloxide_token() {
        let config = config(&[("TELOXIDE_TOKEN", "456:def")]).unwrap();
        assert_eq!(config.bot_token, "456:def");
    }

    #[test]
    fn token_is_required() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::Missing("BOT_TOKEN"));
        assert_eq!(
            config(&[("BOT_TOKEN", "  ")]).unwrap_err(),
            ConfigError::Missing("BOT_TOKEN")
        );
    }

    #[test]
    fn parses_timeout_and_policy() {
        let config = config(&[
            ("BOT_TOKEN", "t"),
            ("QUESTION_TIMEOUT_SECS", "30"),
            ("ANSWER_POLICY", "last"),
        ])
        .unwrap();
        assert_eq!(config.question_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.answer_policy, AnswerPolicy::LastWriteWins);
    }

    #[test]
    fn zero_timeout_means_disabled() {
        let config = config(&[("BOT_TOKEN", "t"), ("QUESTION_TIMEOUT_SECS", "0")]).unwrap();
        assert_eq!(config.question_timeout, None);
    }

    #[test]
    fn rejects_bad_values() {
        for (name, value) in [
            ("QUESTION_TIMEOUT_SECS", "soon"),
            ("QUESTION_TIMEOUT_SECS", "3"),
            ("QUESTION_TIMEOUT_SECS", "601"),
            ("ANSWER_POLICY", "random"),
        ] {
            let err = config(&[("BOT_TOKEN", "t"), (name, value)]).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: n, .. } if n == name), "{name}={value}");
        }
    }
}
