use std::path::Path;

use serde::Deserialize;

use net::SizeLimits;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub http_addr: String,
    pub web_static_dir: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:5000".to_string(),
            web_static_dir: "web_dist".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameSection {
    pub default_size: usize,
    pub min_size: usize,
    pub max_size: usize,
}

impl Default for GameSection {
    fn default() -> Self {
        Self {
            default_size: 4,
            min_size: 2,
            max_size: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SaveSection {
    pub save_dir: String,
}

impl Default for SaveSection {
    fn default() -> Self {
        Self {
            save_dir: "saves".to_string(),
        }
    }
}

/// Top-level tile server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub net: NetConfig,
    pub game: GameSection,
    pub save: SaveSection,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file path.
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(config)
    }

    pub fn to_size_limits(&self) -> SizeLimits {
        SizeLimits {
            min: self.game.min_size,
            max: self.game.max_size,
        }
    }
}

/// Parse CLI arguments and load config.
/// Supports: --config <path>
pub fn parse_cli_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if let Some(val) = args.get(i + 1) {
                    config_path = Some(val.as_str());
                    i += 2;
                } else {
                    eprintln!("--config requires a path argument");
                    std::process::exit(1);
                }
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    match ServerConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_matches_hardcoded_values() {
        let config = ServerConfig::default();
        assert_eq!(config.net.http_addr, "0.0.0.0:5000");
        assert_eq!(config.net.web_static_dir, "web_dist");
        assert_eq!(config.game.default_size, 4);
        assert_eq!(config.game.min_size, 2);
        assert_eq!(config.game.max_size, 8);
        assert_eq!(config.save.save_dir, "saves");
    }

    #[test]
    fn to_size_limits() {
        let config = ServerConfig::default();
        let limits = config.to_size_limits();
        assert_eq!(limits.min, 2);
        assert_eq!(limits.max, 8);
    }

    #[test]
    fn load_nonexistent_file_returns_defaults() {
        let config = ServerConfig::load(Some("/tmp/nonexistent_config_98765.toml")).unwrap();
        assert_eq!(config.game.default_size, 4);
    }

    #[test]
    fn load_none_returns_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.net.http_addr, "0.0.0.0:5000");
    }

    #[test]
    fn load_partial_toml() {
        let mut f = NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
[net]
http_addr = "127.0.0.1:8080"

[game]
max_size = 6
"#
        )
        .unwrap();

        let config = ServerConfig::load(Some(f.path().to_str().unwrap())).unwrap();
        assert_eq!(config.net.http_addr, "127.0.0.1:8080");
        assert_eq!(config.game.max_size, 6);
        assert_eq!(config.game.default_size, 4);
        assert_eq!(config.save.save_dir, "saves");
    }
}
