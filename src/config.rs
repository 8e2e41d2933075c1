//! Configuration file support for pswm.
//!
//! Loads settings from ~/.config/pswm/config.toml if it exists,
//! otherwise uses sensible defaults (Mod1 activation, xterm).

use serde::Deserialize;
use std::path::PathBuf;
use x11rb::protocol::xproto::ModMask;

/// User configuration, consumed read-only after startup
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Activation modifier for WM keys and buttons ("mod1" through "mod5")
    pub modifier: String,
    /// Command used to launch a terminal
    pub terminal: String,
    /// Frame border width in pixels
    pub border_width: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            modifier: "mod1".to_string(),
            terminal: "xterm".to_string(),
            border_width: 2,
        }
    }
}

impl Config {
    /// Load config from default path (~/.config/pswm/config.toml)
    pub fn load() -> Self {
        Self::load_from_path(Self::default_path())
    }

    /// Default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pswm")
            .join("config.toml")
    }

    /// Load config from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse config: {}", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// The X modifier mask all WM key and button grabs are registered under
    pub fn modmask(&self) -> ModMask {
        parse_modifier(&self.modifier).unwrap_or_else(|| {
            log::warn!("Unknown modifier '{}', falling back to mod1", self.modifier);
            ModMask::M1
        })
    }
}

/// Parse a modifier name like "mod4" into its X11 mask
pub fn parse_modifier(s: &str) -> Option<ModMask> {
    match s.to_lowercase().as_str() {
        "mod1" | "alt" => Some(ModMask::M1),
        "mod2" => Some(ModMask::M2),
        "mod3" => Some(ModMask::M3),
        "mod4" | "super" | "win" => Some(ModMask::M4),
        "mod5" => Some(ModMask::M5),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_behavior() {
        let config = Config::default();
        assert_eq!(config.modifier, "mod1");
        assert_eq!(config.terminal, "xterm");
        assert_eq!(config.border_width, 2);
        assert_eq!(config.modmask(), ModMask::M1);
    }

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(
            r#"
            modifier = "mod4"
            terminal = "alacritty"
            border_width = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.modmask(), ModMask::M4);
        assert_eq!(config.terminal, "alacritty");
        assert_eq!(config.border_width, 1);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = toml::from_str("terminal = \"foot\"").unwrap();
        assert_eq!(config.terminal, "foot");
        assert_eq!(config.modifier, "mod1");
        assert_eq!(config.border_width, 2);
    }

    #[test]
    fn unknown_modifier_falls_back_to_mod1() {
        assert_eq!(parse_modifier("mod9"), None);
        let config = Config {
            modifier: "hyper".to_string(),
            ..Config::default()
        };
        assert_eq!(config.modmask(), ModMask::M1);
    }

    #[test]
    fn modifier_aliases() {
        assert_eq!(parse_modifier("alt"), Some(ModMask::M1));
        assert_eq!(parse_modifier("Super"), Some(ModMask::M4));
        assert_eq!(parse_modifier("mod5"), Some(ModMask::M5));
    }
}
