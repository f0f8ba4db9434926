use std::env;

use strum::{Display, EnumString};

/// Variable selecting which `config/{environment}.toml` is loaded.
pub const ENVIRONMENT_VARIABLE: &str = "APP_ENVIRONMENT";

/// Deployment environment folio runs in. Picks the configuration file and, through it, the
/// database and generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Environment {
    #[default]
    #[strum(to_string = "development", serialize = "dev")]
    Development,
    #[strum(to_string = "production", serialize = "prod")]
    Production,
    Test,
}

impl Environment {
    /// Reads [`ENVIRONMENT_VARIABLE`], falling back to development when unset or unknown.
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse_or_default(env::var(ENVIRONMENT_VARIABLE).ok().as_deref())
    }

    fn parse_or_default(value: Option<&str>) -> Self {
        value
            .map(str::trim)
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    /// Base name of the configuration file, without extension.
    pub fn config_file(&self) -> String {
        format!("config/{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_short_forms() {
        assert_eq!(
            Environment::parse_or_default(Some("production")),
            Environment::Production
        );
        assert_eq!(
            Environment::parse_or_default(Some(" PROD ")),
            Environment::Production
        );
        assert_eq!(Environment::parse_or_default(Some("test")), Environment::Test);
        assert_eq!(
            Environment::parse_or_default(Some("staging")),
            Environment::Development
        );
        assert_eq!(Environment::parse_or_default(None), Environment::Development);
    }

    #[test]
    fn config_file_uses_full_name() {
        assert_eq!(Environment::Development.config_file(), "config/development");
        assert_eq!(Environment::Test.config_file(), "config/test");
    }
}
