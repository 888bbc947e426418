use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SCRIPT_MEMORY_MB: u64 = 128;
pub const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SCRIPT_HOOK_INTERVAL: u64 = 1_000;
pub const DEFAULT_API_RATE_LIMIT_PER_SEC: u32 = 180;
pub const DEFAULT_FAL_BASE_URL: &str = "https://fal.run";
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";
pub const DEFAULT_AVATAR: &str = "🤖";

#[derive(Clone, Debug)]
pub struct Config {
    pub bind: SocketAddr,
    pub paths: PathConfig,
    pub sandbox: SandboxConfig,
    pub identity: IdentityConfig,
    pub store: Option<StoreConfig>,
    pub media: Option<MediaConfig>,
    pub security: SecurityConfig,
}

#[derive(Clone, Debug)]
pub struct PathConfig {
    pub stories_dir: PathBuf,
    pub emoji_dir: PathBuf,
    pub help_dir: PathBuf,
}

#[derive(Clone, Copy, Debug)]
pub struct SandboxConfig {
    pub memory_limit_bytes: usize,
    pub timeout: Duration,
    pub hook_instruction_interval: u32,
}

/// Identity resolution inputs. A session uses the identity it has been
/// assigned by the store, else `shared_user_id`, else a freshly minted id.
#[derive(Clone, Debug, Default)]
pub struct IdentityConfig {
    pub shared_user_id: Option<String>,
    pub default_email: Option<String>,
    pub default_name: String,
    pub default_avatar: String,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub url: String,
    pub service_key: String,
}

#[derive(Clone, Debug)]
pub struct MediaConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Clone, Debug)]
pub struct SecurityConfig {
    pub required_token: Option<String>,
    pub rate_limit_per_sec: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: (DEFAULT_SCRIPT_MEMORY_MB as usize) * 1024 * 1024,
            timeout: Duration::from_millis(DEFAULT_SCRIPT_TIMEOUT_MS),
            hook_instruction_interval: DEFAULT_SCRIPT_HOOK_INTERVAL as u32,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let bind = env_string("AI_BIND")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| {
                let port = env_u64("AI_PORT", DEFAULT_PORT as u64);
                let port = u16::try_from(port).unwrap_or(DEFAULT_PORT);
                SocketAddr::from(([127, 0, 0, 1], port))
            });

        let paths = PathConfig {
            stories_dir: env_path("PUBLIC_STORIES", "static/stories"),
            emoji_dir: env_path("EMOJI_DIR", "static/emoji"),
            help_dir: env_path("HELP_DIR", "static/help"),
        };

        let sandbox = SandboxConfig {
            memory_limit_bytes: (env_u64("AI_SCRIPT_MEMORY_MB", DEFAULT_SCRIPT_MEMORY_MB)
                .clamp(8, 1024) as usize)
                * 1024
                * 1024,
            timeout: Duration::from_millis(
                env_u64("AI_SCRIPT_TIMEOUT_MS", DEFAULT_SCRIPT_TIMEOUT_MS).clamp(10, 60_000),
            ),
            hook_instruction_interval: env_u64(
                "AI_SCRIPT_HOOK_INTERVAL",
                DEFAULT_SCRIPT_HOOK_INTERVAL,
            )
            .clamp(100, 1_000_000) as u32,
        };

        let identity = IdentityConfig {
            shared_user_id: env_string("AI_SHARED_USER_ID"),
            default_email: env_string("AI_DEFAULT_USER_EMAIL"),
            default_name: DEFAULT_DISPLAY_NAME.to_string(),
            default_avatar: DEFAULT_AVATAR.to_string(),
        };

        let store = match (
            env_string("SUPABASE_URL"),
            env_string("SUPABASE_SERVICE_ROLE_KEY"),
        ) {
            (Some(url), Some(service_key)) => Some(StoreConfig {
                url: url.trim_end_matches('/').to_string(),
                service_key,
            }),
            _ => None,
        };

        let media = env_string("FAL_KEY").map(|api_key| MediaConfig {
            base_url: env_string("FAL_BASE_URL")
                .unwrap_or_else(|| DEFAULT_FAL_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        });

        let security = SecurityConfig {
            required_token: env_string("STORY_API_TOKEN"),
            rate_limit_per_sec: env_u64(
                "STORY_API_RATE_LIMIT_PER_SEC",
                DEFAULT_API_RATE_LIMIT_PER_SEC as u64,
            )
            .clamp(1, u32::MAX as u64) as u32,
        };

        Self {
            bind,
            paths,
            sandbox,
            identity,
            store,
            media,
            security,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_path(name: &str, default: &str) -> PathBuf {
    std::env::var(name)
        .ok()
        .map(PathBuf::from)
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_u64_falls_back_on_garbage() {
        std::env::set_var("STORY_TEST_ENV_U64", "not-a-number");
        assert_eq!(env_u64("STORY_TEST_ENV_U64", 7), 7);
        std::env::set_var("STORY_TEST_ENV_U64", " 42 ");
        assert_eq!(env_u64("STORY_TEST_ENV_U64", 7), 42);
        std::env::remove_var("STORY_TEST_ENV_U64");
    }

    #[test]
    fn blank_strings_are_treated_as_unset() {
        std::env::set_var("STORY_TEST_ENV_STRING", "   ");
        assert_eq!(env_string("STORY_TEST_ENV_STRING"), None);
        std::env::remove_var("STORY_TEST_ENV_STRING");
    }

    #[test]
    fn sandbox_defaults_match_documented_limits() {
        let sandbox = SandboxConfig::default();
        assert_eq!(sandbox.memory_limit_bytes, 128 * 1024 * 1024);
        assert_eq!(sandbox.timeout, Duration::from_millis(5_000));
    }
}
