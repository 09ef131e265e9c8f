//! Configuration file loading

use std::path::{Path, PathBuf};

use eyre::OptionExt;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use smartcas_reader::ReaderConfig;

/// Contents of `smartcas.toml`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) reader: ReaderConfig,
}

/// Returns the base config directory for smartcas
pub(crate) fn config_dir() -> eyre::Result<PathBuf> {
    #[allow(deprecated)]
    let home = std::env::home_dir().ok_or_eyre("home directory not found")?;
    Ok(home.join(".smartcas"))
}

/// Load the configuration file, overridden by `SMARTCAS_` environment variables
///
/// Nested keys are separated by a double underscore, e.g.
/// `SMARTCAS_READER__DEVICE`.
pub(crate) fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_dir()?.join("smartcas.toml"),
    };
    Ok(Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("SMARTCAS_").split("__"))
        .extract()?)
}
