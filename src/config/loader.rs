//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::EmulatorConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Name of the configuration file inside the project directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate configuration text.
///
/// A relative handler working directory is resolved against `base_dir`.
pub fn parse_config(content: &str, base_dir: &Path) -> Result<EmulatorConfig, ConfigError> {
    let mut config: EmulatorConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    if config.handlers.working_directory.is_relative() {
        config.handlers.working_directory = base_dir.join(&config.handlers.working_directory);
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<EmulatorConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_config(&content, base_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn resolves_working_directory_next_to_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[handlers]\nworking_directory = \"lambdas\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.handlers.working_directory, dir.path().join("lambdas"));
    }

    #[test]
    fn absolute_working_directory_is_kept() {
        let config = parse_config(
            "[handlers]\nworking_directory = \"/srv/lambdas\"\n",
            Path::new("/etc/edge"),
        )
        .unwrap();
        assert_eq!(config.handlers.working_directory, PathBuf::from("/srv/lambdas"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_config(Path::new("/definitely/not/here/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = parse_config("[listener\nport = 1", Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn semantic_errors_are_listed() {
        let raw = r#"
[[behaviors]]
path = "/bar"
origin = "nowhere"
"#;
        let err = parse_config(raw, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("undefined origin \"nowhere\""));
    }
}
