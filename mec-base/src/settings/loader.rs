use std::collections::HashMap;
use std::env;

use config::{Config, Environment, File};
use serde::Deserialize;

/// Load a settings object from the config locations.
///
/// Configs are loaded in the following precedence order, later sources
/// overriding earlier ones:
///
/// 1. `./config/<RUN_ENV>/<role_prefix>.json`, optional.
/// 2. Environment variables prefixed `MEC_BASE_`, shared by every role.
/// 3. Environment variables prefixed `MEC_<ROLE_PREFIX>_`, specific to this
///    role (`MEC_ORCHESTRATOR_` or `MEC_FEDERATION_MANAGER_`).
///
/// `RUN_ENV` defaults to `default`. Missing required fields surface as a
/// `serde_path_to_error` deserialization failure naming the exact missing
/// path, which callers propagate as a fatal startup error.
pub fn load_settings_object<'de, T: Deserialize<'de>>(role_prefix: &str) -> eyre::Result<T> {
    let env_name = env::var("RUN_ENV").unwrap_or_else(|_| "default".into());
    let prefix = format!("MEC_{}", role_prefix).to_ascii_uppercase();

    let env_vars: HashMap<String, String> = env::vars().collect();

    let config = Config::builder()
        .add_source(
            File::with_name(&format!("./config/{env_name}/{}", role_prefix.to_lowercase()))
                .required(false),
        )
        .add_source(
            Environment::with_prefix("MEC_BASE")
                .separator("_")
                .source(Some(env_vars.clone())),
        )
        .add_source(
            Environment::with_prefix(&prefix)
                .separator("_")
                .source(Some(env_vars)),
        )
        .build()?;

    Ok(serde_path_to_error::deserialize(config)?)
}
