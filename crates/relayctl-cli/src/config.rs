//! Controller configuration – reads/writes `~/.relayctl/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use relayctl_types::{
    AuxPin, FieldConstraint, Method, MethodOverride, RelayDefinition, RelayError, SubDriverKind,
    SubDriverSpec,
};
use serde::{Deserialize, Serialize};

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "RELAYCTL_CONFIG";
/// Overrides the controller name.
pub const NAME_ENV: &str = "RELAYCTL_NAME";

/// Persisted controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Name reported by `describe`.
    #[serde(default = "default_name")]
    pub name: String,

    /// Every relay wired to the expander.
    #[serde(default)]
    pub relays: Vec<RelayDefinition>,
}

fn default_name() -> String {
    "mcp23017".to_string()
}

impl Default for Config {
    /// A small bench layout: a lamp, a pump and a soil probe behind an ADC.
    fn default() -> Self {
        let probe = SubDriverSpec {
            settings: [("reading".to_string(), serde_json::json!(512))].into(),
            ..SubDriverSpec::new(SubDriverKind::Mcp3008)
                .with_pin("clk", AuxPin::Configured { pin: 4, output: true })
                .with_pin("mosi", AuxPin::Configured { pin: 5, output: true })
                .with_pin("cs", AuxPin::Configured { pin: 6, output: true })
                .with_pin("miso", AuxPin::Index(7))
        };

        Self {
            name: default_name(),
            relays: vec![
                RelayDefinition::local("lamp", "Grow lamp", 0)
                    .as_output()
                    .with_method(MethodOverride::new(Method::Status))
                    .with_method(MethodOverride::new(Method::Switch)),
                RelayDefinition::local("pump", "Water pump", 1)
                    .as_output()
                    .with_method(MethodOverride::new(Method::Status))
                    .with_method(MethodOverride::new(Method::Run).with_payload(
                        "duration",
                        FieldConstraint::Integer { min: 1, max: 30 },
                    )),
                RelayDefinition::delegated("soil", "Soil moisture", probe),
            ],
        }
    }
}

/// Resolve the config location: `RELAYCTL_CONFIG`, else
/// `~/.relayctl/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".relayctl").join("config.toml")
}

/// Load the config from `path`. Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, RelayError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        RelayError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| RelayError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `RELAYCTL_*` environment overrides to `cfg`.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(name) = lookup(NAME_ENV).filter(|n| !n.trim().is_empty()) {
        cfg.name = name;
    }
}

/// Save the config to `path`, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), RelayError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| RelayError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                RelayError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }

    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RelayError::Config(format!("failed to serialise config: {e}")))?;
    let write_err =
        |e: std::io::Error| RelayError::Config(format!("failed to write {}: {e}", path.display()));

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;

    Ok(())
}
