//! Configuration loading for spanlink.
//!
//! `defaults/spanlink.default.toml` is embedded into the binary. A project may
//! override any key in `.config/spanlink/config.toml`, or `--config` names a
//! file to use instead. Flags such as `--mode` win over both.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat};
use serde::Deserialize;
use spanlink_core::{RenderMode, RenderOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TOML: &str = include_str!("../defaults/spanlink.default.toml");

/// Location of the project configuration file, relative to the project root.
pub const PROJECT_CONFIG: &str = ".config/spanlink/config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SpanlinkConfig {
    pub render: RenderConfig,
    pub navigation: NavigationConfig,
    pub exchange: ExchangeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    pub mode: RenderMode,
    pub split_adjacent_math: bool,
    pub gfm: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NavigationConfig {
    /// Highlight lifetime in milliseconds
    pub highlight_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub pretty: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
}

impl SpanlinkConfig {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            mode: self.render.mode,
            gfm: self.render.gfm,
            split_adjacent_math: self.render.split_adjacent_math,
        }
    }

    pub fn highlight_duration(&self) -> Duration {
        Duration::from_millis(self.navigation.highlight_ms)
    }
}

/// Path of the project configuration file under `root`.
pub fn project_config_path(root: impl AsRef<Path>) -> PathBuf {
    root.as_ref().join(PROJECT_CONFIG)
}

/// Builds a [`SpanlinkConfig`] from the embedded defaults plus at most one
/// file, then applies typed command-line overrides after deserializing.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
    render_mode: Option<RenderMode>,
}

impl Loader {
    /// The embedded defaults alone.
    pub fn builtin() -> Self {
        Self {
            builder: Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml)),
            render_mode: None,
        }
    }

    /// Defaults, then [`PROJECT_CONFIG`] under `root` when it exists.
    pub fn project(root: impl AsRef<Path>) -> Self {
        Self::builtin().layer(&project_config_path(root), false)
    }

    /// Defaults, then `path`. Loading fails if `path` is missing.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::builtin().layer(path.as_ref(), true)
    }

    /// Render with `mode` whatever the files say.
    pub fn render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = Some(mode);
        self
    }

    pub fn load(self) -> Result<SpanlinkConfig, ConfigError> {
        let mut config: SpanlinkConfig = self.builder.build()?.try_deserialize()?;
        if let Some(mode) = self.render_mode {
            config.render.mode = mode;
        }
        Ok(config)
    }

    fn layer(mut self, path: &Path, required: bool) -> Self {
        let source = File::from(path).format(FileFormat::Toml).required(required);
        self.builder = self.builder.add_source(source);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_default_config() {
        let config = Loader::builtin().load().expect("defaults to deserialize");
        assert_eq!(config.render.mode, RenderMode::Structural);
        assert!(config.render.split_adjacent_math);
        assert_eq!(config.highlight_duration(), Duration::from_millis(5000));
        assert!(config.exchange.pretty);
        assert_eq!(config.logging.filter, "warn");
        assert_eq!(config.render_options(), RenderOptions::default());
    }

    #[test]
    fn render_mode_beats_the_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = project_config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[render]\nmode = \"structural\"\ngfm = false\n").unwrap();

        let config = Loader::project(dir.path())
            .render_mode(RenderMode::SubstringSearch)
            .load()
            .expect("config to load");
        assert_eq!(config.render.mode, RenderMode::SubstringSearch);
        assert!(!config.render.gfm);
    }

    #[test]
    fn project_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = project_config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[navigation]\nhighlight_ms = 250\n").unwrap();

        let config = Loader::project(dir.path()).load().unwrap();
        assert_eq!(config.navigation.highlight_ms, 250);
        assert!(config.render.gfm);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Loader::file(dir.path().join("absent.toml")).load();
        assert!(result.is_err());
        assert!(Loader::project(dir.path()).load().is_ok());
    }
}
