use serde::{Deserialize, Deserializer};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Environment variable holding the JSON conf object (`publish_branch`, `channel_id`).
pub const CONF_CONTENT_ENV: &str = "TG2SITE_CONF_CONTENT";
/// Environment variable naming the JSON secrets file (`repository_url`, `telegram_token`).
pub const SECRETS_PATH_ENV: &str = "TG2SITE_SECRETS_PATH";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub channel: ChannelConfig,
    pub repository: RepositoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Server-side long-poll wait
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Client-side request timeout, must exceed the long-poll wait
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl TelegramConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    /// The only destination whose messages get persisted
    #[serde(deserialize_with = "deserialize_id")]
    pub id: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    pub url: String,
    pub branch: String,
    /// Record directory, relative to the working copy root
    #[serde(default = "default_messages_dir")]
    pub messages_dir: PathBuf,
    #[serde(default = "default_committer")]
    pub committer: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    25
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_messages_dir() -> PathBuf {
    PathBuf::from(".tg2site-messages")
}

fn default_committer() -> String {
    "bot@tg2site".to_string()
}

fn default_commit_message() -> String {
    "Sync updates".to_string()
}

/// Chat ids arrive either as JSON/TOML integers or as strings holding one.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(i64),
    Text(String),
}

fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match IdRepr::deserialize(deserializer)? {
        IdRepr::Int(id) => Ok(id),
        IdRepr::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid chat id '{}': {}", text, e))),
    }
}

#[derive(Deserialize)]
struct EnvConf {
    publish_branch: String,
    #[serde(deserialize_with = "deserialize_id")]
    channel_id: i64,
}

#[derive(Deserialize)]
struct EnvSecrets {
    repository_url: String,
    telegram_token: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| SyncError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()
    }

    /// Load the env-variable layout used by the container deployment.
    pub fn from_env() -> Result<Self> {
        let conf = required_env(CONF_CONTENT_ENV)?;
        let secrets_path = required_env(SECRETS_PATH_ENV)?;
        let secrets = std::fs::read_to_string(&secrets_path).map_err(|e| {
            SyncError::Configuration(format!(
                "Failed to read secrets file {}: {}",
                secrets_path, e
            ))
        })?;
        Self::from_json_parts(&conf, &secrets)
    }

    pub fn from_json_parts(conf: &str, secrets: &str) -> Result<Self> {
        let conf: EnvConf = serde_json::from_str(conf).map_err(|e| {
            SyncError::Configuration(format!("Bad or missing field in {}: {}", CONF_CONTENT_ENV, e))
        })?;
        let secrets: EnvSecrets = serde_json::from_str(secrets).map_err(|e| {
            SyncError::Configuration(format!("Bad or missing field in secrets: {}", e))
        })?;

        Config {
            telegram: TelegramConfig {
                bot_token: secrets.telegram_token,
                api_url: default_api_url(),
                poll_timeout_secs: default_poll_timeout_secs(),
                request_timeout_secs: default_request_timeout_secs(),
            },
            channel: ChannelConfig {
                id: conf.channel_id,
            },
            repository: RepositoryConfig {
                url: secrets.repository_url,
                branch: conf.publish_branch,
                messages_dir: default_messages_dir(),
                committer: default_committer(),
                commit_message: default_commit_message(),
            },
        }
        .validate()
    }

    fn validate(self) -> Result<Self> {
        let required = [
            ("telegram.bot_token", &self.telegram.bot_token),
            ("telegram.api_url", &self.telegram.api_url),
            ("repository.url", &self.repository.url),
            ("repository.branch", &self.repository.branch),
            ("repository.committer", &self.repository.committer),
            ("repository.commit_message", &self.repository.commit_message),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(SyncError::Configuration(format!("{} must not be empty", key)));
            }
        }

        // Records outside the working copy would never be staged.
        let messages_dir = &self.repository.messages_dir;
        if messages_dir.as_os_str().is_empty()
            || !messages_dir
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
            || !messages_dir
                .components()
                .any(|c| matches!(c, Component::Normal(_)))
        {
            return Err(SyncError::Configuration(format!(
                "repository.messages_dir must be a subdirectory of the working copy, got '{}'",
                self.repository.messages_dir.display()
            )));
        }

        if self.telegram.request_timeout_secs <= self.telegram.poll_timeout_secs {
            return Err(SyncError::Configuration(format!(
                "telegram.request_timeout_secs ({}) must exceed telegram.poll_timeout_secs ({})",
                self.telegram.request_timeout_secs, self.telegram.poll_timeout_secs
            )));
        }

        Ok(self)
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| SyncError::Configuration(format!("Missing {} in env", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [telegram]
        bot_token = "123:abc"

        [channel]
        id = -1001234

        [repository]
        url = "git@example.com:me/site.git"
        branch = "gh-pages"
    "#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.channel.id, -1001234);
        assert_eq!(config.telegram.api_url, "https://api.telegram.org");
        assert_eq!(config.telegram.poll_timeout_secs, 25);
        assert_eq!(config.telegram.request_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.repository.messages_dir,
            PathBuf::from(".tg2site-messages")
        );
        assert_eq!(config.repository.committer, "bot@tg2site");
        assert_eq!(config.repository.commit_message, "Sync updates");
    }

    #[test]
    fn test_channel_id_as_string() {
        let content = MINIMAL.replace("id = -1001234", r#"id = "-1005""#);
        let config = Config::parse(&content).unwrap();
        assert_eq!(config.channel.id, -1005);
    }

    #[test]
    fn test_missing_channel_is_configuration_error() {
        let content = MINIMAL.replace("[channel]\n        id = -1001234", "");
        let err = Config::parse(&content).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn test_non_numeric_channel_id_rejected() {
        let content = MINIMAL.replace("id = -1001234", r#"id = "news""#);
        assert!(matches!(
            Config::parse(&content),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_token_rejected() {
        let content = MINIMAL.replace(r#"bot_token = "123:abc""#, r#"bot_token = "  ""#);
        let err = Config::parse(&content).unwrap_err();
        assert!(err.to_string().contains("telegram.bot_token"));
    }

    #[test]
    fn test_request_timeout_must_exceed_poll_timeout() {
        let content = MINIMAL.replace(
            r#"bot_token = "123:abc""#,
            "bot_token = \"123:abc\"\npoll_timeout_secs = 30\nrequest_timeout_secs = 30",
        );
        let err = Config::parse(&content).unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_absolute_messages_dir_rejected() {
        let content = format!("{}\nmessages_dir = \"/var/messages\"", MINIMAL);
        assert!(matches!(
            Config::parse(&content),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn test_messages_dir_must_stay_inside_working_copy() {
        for dir in ["../outside", "posts/../../outside", ".", "./"] {
            let content = format!("{}\nmessages_dir = \"{}\"", MINIMAL, dir);
            assert!(
                matches!(Config::parse(&content), Err(SyncError::Configuration(_))),
                "accepted messages_dir {}",
                dir
            );
        }
    }

    #[test]
    fn test_nested_messages_dir_accepted() {
        let content = format!("{}\nmessages_dir = \"./content/posts\"", MINIMAL);
        let config = Config::parse(&content).unwrap();
        assert_eq!(
            config.repository.messages_dir,
            PathBuf::from("./content/posts")
        );
    }

    #[test]
    fn test_json_parts() {
        let config = Config::from_json_parts(
            r#"{"publish_branch": "main", "channel_id": 555}"#,
            r#"{"repository_url": "https://example.com/site.git", "telegram_token": "t0k"}"#,
        )
        .unwrap();
        assert_eq!(config.channel.id, 555);
        assert_eq!(config.repository.branch, "main");
        assert_eq!(config.repository.url, "https://example.com/site.git");
        assert_eq!(config.telegram.bot_token, "t0k");
        assert_eq!(config.telegram.poll_timeout_secs, 25);
    }

    #[test]
    fn test_json_parts_missing_secret() {
        let err = Config::from_json_parts(
            r#"{"publish_branch": "main", "channel_id": "555"}"#,
            r#"{"repository_url": "https://example.com/site.git"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("telegram_token"));
    }
}
