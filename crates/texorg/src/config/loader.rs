use std::path::Path;

use tracing::warn;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.output_directory_pattern.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "output_directory_pattern must not be empty".to_string(),
        });
    }

    if config.output_filename_pattern.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "output_filename_pattern must not be empty".to_string(),
        });
    }

    if config.metadata_filename.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "metadata_filename must not be empty".to_string(),
        });
    }

    for (internal, definition) in &config.file_type_definitions {
        if !internal.starts_with("MAP_") {
            return Err(ConfigError::Validation {
                message: format!(
                    "file_type_definitions key '{}' must start with 'MAP_'",
                    internal
                ),
            });
        }
        if definition.standard_type.trim().is_empty() {
            warn!(
                map_type = %internal,
                "file type definition has a blank standard_type, filenames fall back to the internal type"
            );
        }
    }

    Ok(())
}
