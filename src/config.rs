use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::ArgAction::Append;
use clap::Parser;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Runtime configuration, settable from CLI flags, a TOML file, or the environment.
///
/// A config file looks like:
///
/// ```toml
/// listen_on_port = 8080
/// workspace = "/var/lib/relay-control"
///
/// # layout under the workspace
/// nginx_dir = "nginx"
/// users_file = "users.txt"
/// static_dir = "static"
///
/// # kid -> base64-encoded 32-byte signing key
/// [token_keys]
/// 1 = "kCl4Dmt3PCXRCayzGqTgUv5VyVKvaVMKcpMQPmY6whs="
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Working directory for relay state
    #[arg(short = 'w', long, default_value = ".")]
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Directory for generated nginx-rtmp configs, relative to the workspace
    #[arg(long, default_value = "nginx")]
    #[serde(default = "default_nginx_dir")]
    pub nginx_dir: String,

    /// Credential file with one username,password pair per line, relative to the workspace
    #[arg(short, long, default_value = "users.txt")]
    #[serde(default = "default_users_file")]
    pub users_file: String,

    /// Directory with the dashboard build, served at the root route, relative to the workspace
    #[arg(long, default_value = "static")]
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Optional TOML config file; CLI flags win over its values
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Token signing key as kid:base64(32 bytes), repeatable.
    /// Generate one with: openssl rand -base64 32
    #[arg(long = "token-key", env = "RELAY_TOKEN_KEY", value_parser = parse_token_key, action = Append)]
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "de_token_keys"
    )]
    pub token_keys: Vec<(u8, [u8; 32])>,
}

/// Parse one `kid:base64` flag value into a keyed 32-byte signing key
fn parse_token_key(s: &str) -> Result<(u8, [u8; 32]), String> {
    let Some((kid, encoded)) = s.split_once(':') else {
        return Err("expected kid:base64_key".to_string());
    };

    let kid: u8 = kid
        .parse()
        .map_err(|_| format!("kid '{kid}' is not a number in 0-255"))?;

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|error| format!("key for kid {kid} is not valid base64: {error}"))?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| format!("key for kid {kid} is {} bytes, want 32", bytes.len()))?;

    Ok((kid, key))
}

fn de_token_keys<'de, D>(de: D) -> Result<Vec<(u8, [u8; 32])>, D::Error>
where
    D: Deserializer<'de>,
{
    // TOML keys are strings; BTreeMap keeps them unique
    let table = Option::<BTreeMap<String, String>>::deserialize(de)?.unwrap_or_default();

    let mut keys = table
        .into_iter()
        .map(|(kid, encoded)| {
            let kid: u8 = kid.parse().map_err(serde::de::Error::custom)?;
            let bytes = STANDARD.decode(encoded).map_err(serde::de::Error::custom)?;
            let key: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
                serde::de::Error::custom(format!(
                    "token_keys[{kid}] is {} bytes, want 32",
                    bytes.len()
                ))
            })?;
            Ok((kid, key))
        })
        .collect::<Result<Vec<_>, _>>()?;

    // String order is not numeric order ("10" sorts before "2")
    keys.sort_unstable_by_key(|(kid, _)| *kid);
    Ok(keys)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_on_port: default_port(),
            workspace: default_workspace(),
            nginx_dir: default_nginx_dir(),
            users_file: default_users_file(),
            static_dir: default_static_dir(),
            config: None,
            token_keys: Vec::new(),
        }
    }
}

impl Config {
    /// Parse CLI flags, fold in the config file when one is named, validate
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Config::parse();

        if let Some(path) = &config.config {
            let file_config = Self::from_file(Path::new(path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Fields still at their CLI defaults take the file's value
    fn merge_with_file(mut self, file_config: Config) -> Self {
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.workspace == default_workspace() {
            self.workspace = file_config.workspace;
        }
        if self.nginx_dir == default_nginx_dir() {
            self.nginx_dir = file_config.nginx_dir;
        }
        if self.users_file == default_users_file() {
            self.users_file = file_config.users_file;
        }
        if self.static_dir == default_static_dir() {
            self.static_dir = file_config.static_dir;
        }
        if self.token_keys.is_empty() {
            self.token_keys = file_config.token_keys;
        }

        self
    }

    /// A signing key is mandatory: the process refuses to start rather than
    /// mint tokens with an ephemeral secret that changes on every restart.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token_keys.is_empty() {
            return Err(anyhow::anyhow!(
                "A token signing key is required: pass --token-key, set RELAY_TOKEN_KEY, \
                 or add a [token_keys] table to the config file"
            ));
        }

        Ok(())
    }

    /// Directory holding the generated per-user nginx configs
    pub fn nginx_path(&self) -> PathBuf {
        Path::new(&self.workspace).join(&self.nginx_dir)
    }

    /// Credential file location
    pub fn users_path(&self) -> PathBuf {
        Path::new(&self.workspace).join(&self.users_file)
    }

    /// Dashboard build served at the root route
    pub fn static_path(&self) -> PathBuf {
        Path::new(&self.workspace).join(&self.static_dir)
    }

    pub fn get_token_key(&self, kid: u8) -> Option<[u8; 32]> {
        self.token_keys
            .iter()
            .find(|(k, _)| *k == kid)
            .map(|(_, key)| *key)
    }
}

// Default value functions
fn default_port() -> u16 {
    8080
}

fn default_workspace() -> String {
    ".".to_string()
}

fn default_nginx_dir() -> String {
    "nginx".to_string()
}

fn default_users_file() -> String {
    "users.txt".to_string()
}

fn default_static_dir() -> String {
    "static".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_with_repeated_token_key() {
        let argv = [
            "relay-control".to_string(),
            "--listen-on-port".to_string(),
            "9100".to_string(),
            "--workspace".to_string(),
            "/srv/relay".to_string(),
            "--users-file".to_string(),
            "operators.txt".to_string(),
            "--token-key".to_string(),
            format!("1:{}", STANDARD.encode([5u8; 32])),
            "--token-key".to_string(),
            format!("7:{}", STANDARD.encode([9u8; 32])),
        ];

        let config = Config::try_parse_from(argv).unwrap();

        assert_eq!(config.listen_on_port, 9100);
        assert_eq!(config.workspace, "/srv/relay");
        assert_eq!(config.users_file, "operators.txt");
        assert_eq!(config.token_keys.len(), 2);
        assert_eq!(config.get_token_key(1), Some([5u8; 32]));
        assert_eq!(config.get_token_key(7), Some([9u8; 32]));
        assert_eq!(config.get_token_key(2), None);
    }

    #[test]
    fn test_toml_token_keys_table() {
        let toml_content = format!(
            "listen_on_port = 9100\n\
             workspace = \"/srv/relay\"\n\
             \n\
             [token_keys]\n\
             1 = \"{}\"\n\
             7 = \"{}\"\n",
            STANDARD.encode([5u8; 32]),
            STANDARD.encode([9u8; 32]),
        );

        let config: Config = toml::from_str(&toml_content).unwrap();

        assert_eq!(config.listen_on_port, 9100);
        assert_eq!(config.token_keys, vec![(1, [5u8; 32]), (7, [9u8; 32])]);
    }

    #[test]
    fn test_toml_without_token_keys_fails_validation() {
        let config: Config = toml::from_str("listen_on_port = 9100\n").unwrap();

        assert!(config.token_keys.is_empty());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_rejects_wrong_key_length() {
        let toml_content = format!("[token_keys]\n1 = \"{}\"\n", STANDARD.encode([5u8; 16]));

        assert!(toml::from_str::<Config>(&toml_content).is_err());
    }

    #[test]
    fn test_parse_token_key() {
        let (kid, key) = parse_token_key(&format!("3:{}", STANDARD.encode([5u8; 32]))).unwrap();
        assert_eq!(kid, 3);
        assert_eq!(key, [5u8; 32]);
    }

    #[test]
    fn test_parse_token_key_rejects_bad_input() {
        let valid_key = STANDARD.encode([5u8; 32]);

        // No kid separator
        assert!(parse_token_key(&valid_key).is_err());
        // kid out of range, or not a number
        assert!(parse_token_key(&format!("300:{valid_key}")).is_err());
        assert!(parse_token_key(&format!("one:{valid_key}")).is_err());
        // Not base64
        assert!(parse_token_key("1:!!!").is_err());
        // Too short
        assert!(parse_token_key(&format!("1:{}", STANDARD.encode([5u8; 31]))).is_err());
    }

    #[test]
    fn test_cli_wins_over_file_on_merge() {
        let file_config = Config {
            listen_on_port: 9100,
            nginx_dir: "rtmp-conf".to_string(),
            token_keys: vec![(1, [5u8; 32])],
            ..Default::default()
        };
        let cli_config = Config {
            listen_on_port: 9200,
            ..Default::default()
        };

        let merged = cli_config.merge_with_file(file_config);

        assert_eq!(merged.listen_on_port, 9200);
        assert_eq!(merged.nginx_dir, "rtmp-conf");
        assert_eq!(merged.token_keys, vec![(1, [5u8; 32])]);
    }

    #[test]
    fn test_path_helpers_join_workspace() {
        let config = Config {
            workspace: "/var/lib/relay".to_string(),
            ..Default::default()
        };

        assert_eq!(config.nginx_path(), Path::new("/var/lib/relay/nginx"));
        assert_eq!(config.users_path(), Path::new("/var/lib/relay/users.txt"));
        assert_eq!(config.static_path(), Path::new("/var/lib/relay/static"));
    }

    #[test]
    fn test_validate_requires_token_key() {
        assert!(Config::default().validate().is_err());

        let config = Config {
            token_keys: vec![(1, [7u8; 32])],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
