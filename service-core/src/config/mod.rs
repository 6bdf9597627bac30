use crate::error::AppError;
use config::{Config as Cfg, File, FileFormat};
use serde::de::DeserializeOwned;

/// Load layered configuration for a service.
///
/// Sources, later ones winning: an optional `<file_stem>.{toml,yaml,json}`
/// in the working directory, then `<ENV_PREFIX>__SECTION__KEY` environment
/// variables. A `.env` file is read first when present.
pub fn load<T: DeserializeOwned>(file_stem: &str, env_prefix: &str) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name(file_stem).required(false))
        .add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Deserialize configuration from an in-memory TOML document.
pub fn from_toml_str<T: DeserializeOwned>(contents: &str) -> Result<T, AppError> {
    let config = Cfg::builder()
        .add_source(File::from_str(contents, FileFormat::Toml))
        .build()?;

    Ok(config.try_deserialize()?)
}
