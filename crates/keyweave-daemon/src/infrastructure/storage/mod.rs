//! Storage infrastructure: the configuration file and the generated keybind
//! fragment.
//!
//! - `config` reads the TOML configuration into the core model.
//! - `keybinds` writes the compositor keybind fragment atomically.
//!
//! [`TomlConfigStore`] ties both to one config path and is what the
//! controller reloads from.

use std::path::{Path, PathBuf};

use keyweave_core::config::{CompiledConfig, Config};
use keyweave_core::keybinds::render_keybinds;

use crate::application::controller::ConfigStore;

pub mod config;
pub mod keybinds;

/// [`ConfigStore`] backed by a TOML file on disk.
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for TomlConfigStore {
    fn load(&self) -> Result<Config, String> {
        config::load_config(&self.path).map_err(|e| e.to_string())
    }

    fn publish_keybinds(&self, config: &CompiledConfig) -> Result<Option<PathBuf>, String> {
        let Some(target) = config.global.keybinds_path.as_ref() else {
            return Ok(None);
        };
        let text = render_keybinds(&config.keybinds, &self.path);
        keybinds::write_atomically(target, &text).map_err(|e| e.to_string())?;
        Ok(Some(target.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyweave_core::compile;

    #[test]
    fn test_store_loads_and_publishes_keybinds() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("keyweave-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config_path = dir.join("config.toml");
        let binds_path = dir.join("binds.kdl");
        std::fs::write(
            &config_path,
            format!(
                r#"
[global]
keybinds_path = "{}"

[[device]]
name = "kbd"

[[device.profile]]
name = "default"
passthrough = [{{ key = "Super+Return", action = 'spawn "foot";' }}]
"#,
                binds_path.display()
            ),
        )
        .unwrap();
        let store = TomlConfigStore::new(&config_path);

        // Act
        let config = store.load().unwrap();
        let compiled = compile(&config).unwrap();
        let written = store.publish_keybinds(&compiled).unwrap();

        // Assert
        assert_eq!(written, Some(binds_path.clone()));
        let text = std::fs::read_to_string(&binds_path).unwrap();
        assert!(text.contains("Mod+Return"), "{text}");
        assert!(text.contains("spawn \"foot\";"), "{text}");
        assert!(text.contains(&config_path.display().to_string()), "{text}");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_store_without_keybinds_path_writes_nothing() {
        let store = TomlConfigStore::new("/nonexistent/config.toml");
        let compiled = compile(&Config::default()).unwrap();

        assert_eq!(store.publish_keybinds(&compiled), Ok(None));
    }

    #[test]
    fn test_store_load_error_is_reported_as_text() {
        let store = TomlConfigStore::new("/nonexistent/keyweave/config.toml");
        assert!(store.load().unwrap_err().contains("/nonexistent/keyweave/config.toml"));
    }
}
