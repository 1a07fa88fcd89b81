//! CLI argument definitions using clap derive macros.

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

use vk_client::api::{DEFAULT_MAX_TRANSIENT_RETRIES, DEFAULT_RATE_BURST};
use vk_client::auth::Scope;
use vk_client::likes::LikeKind;
use vk_client::pool::DEFAULT_PARALLELISM;

/// Default refill interval of the shared rate limit, in milliseconds.
pub const DEFAULT_RATE_INTERVAL_MS: u64 = 334;

/// Scope requested when `--scope` is not given.
pub const DEFAULT_SCOPE: &str = "friends,photos,video,wall,offline";

/// Rate-limited client for the VK API.
///
/// Authorizes through the browser, calls API methods with automatic
/// throttling retry and captcha prompts, and removes likes in bulk.
#[derive(Parser, Debug)]
#[command(name = "vk")]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub app: AppArgs,

    #[command(flatten)]
    pub limits: LimitArgs,
}

/// Application credentials and an optional pre-issued token.
#[derive(ClapArgs, Debug, Clone)]
pub struct AppArgs {
    /// Access token, or the redirect URL it was pasted from
    #[arg(long, env = "VK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Application id
    #[arg(long, env = "VK_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Application secret (code grant only)
    #[arg(long, env = "VK_CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Requested permissions: comma-separated names or a decimal bitmask
    #[arg(long, default_value = DEFAULT_SCOPE, global = true)]
    pub scope: Scope,
}

/// Rate limit, retry and concurrency settings.
#[derive(ClapArgs, Debug, Clone)]
pub struct LimitArgs {
    /// Rate limit refill interval in milliseconds (1-60000)
    #[arg(long, default_value_t = DEFAULT_RATE_INTERVAL_MS, value_parser = clap::value_parser!(u64).range(1..=60000), global = true)]
    pub rate_interval_ms: u64,

    /// Calls allowed per refill interval (1-100)
    #[arg(long, default_value_t = DEFAULT_RATE_BURST as u32, value_parser = clap::value_parser!(u32).range(1..=100), global = true)]
    pub rate_burst: u32,

    /// Concurrent workers for bulk commands (1-256)
    #[arg(short = 'p', long, default_value_t = DEFAULT_PARALLELISM as u16, value_parser = clap::value_parser!(u16).range(1..=256), global = true)]
    pub parallelism: u16,

    /// Retries of a throttled call before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_TRANSIENT_RETRIES, global = true)]
    pub max_transient_retries: u32,

    /// Retry throttled calls for as long as the server keeps throttling
    #[arg(long, conflicts_with = "max_transient_retries", global = true)]
    pub retry_forever: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Authorize the application and print the issued token
    Auth {
        /// How the token is obtained
        #[arg(long, value_enum, default_value_t = GrantArg::Code)]
        grant: GrantArg,
    },
    /// Call an API method and print the response payload
    Call {
        /// Method name, e.g. users.get
        method: String,

        /// Method parameters as key=value
        #[arg(value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },
    /// Remove likes from posts, photos or videos
    Unlike {
        /// Remove every like of the current user, walking the liked lists
        #[arg(long, conflicts_with_all = ["owner_id", "ids"])]
        faves: bool,

        /// Kind of the liked objects: post, photo or video (limits --faves to one kind)
        #[arg(long, required_unless_present = "faves")]
        kind: Option<LikeKind>,

        /// Owner of the objects; negative for communities
        #[arg(long, allow_hyphen_values = true, required_unless_present = "faves")]
        owner_id: Option<i64>,

        /// Object ids
        #[arg(required_unless_present = "faves")]
        ids: Vec<i64>,
    },
}

/// Authorization flow selected with `vk auth --grant`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantArg {
    /// Loopback redirect with a code exchanged using the app secret
    Code,
    /// Loopback redirect carrying the token itself in the fragment
    Token,
    /// Paste the final URL from the browser
    Standalone,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}
