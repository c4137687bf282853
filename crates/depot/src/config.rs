//! CLI flags and resolved runtime configuration.
//!
//! Every flag can also come from an environment variable. Secrets accept a
//! `--<name>-file` variant; the file wins over the inline value and its
//! contents are whitespace-trimmed.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use bytesize::ByteSize;
use clap::Parser;
use depot_upstream::WebDavOptions;

/// Caching front-end for a WebDAV object store.
#[derive(Parser, Debug)]
#[command(name = "depot", version, about)]
pub struct Cli {
    /// Socket address to listen on.
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Public base URL for canonical blob links, without a trailing slash
    /// (e.g. https://mirror.example.com/blobs). Defaults to the listen
    /// address over plain HTTP.
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// Directory for the local blob cache. Created if absent.
    #[arg(long = "cache", env = "CACHE")]
    pub cache_dir: PathBuf,

    /// Maximum size of the local cache ("10GB", "512MiB"; "0" disables the
    /// size bound).
    #[arg(long, env = "CACHE_SIZE", default_value = "10GB")]
    pub cache_size: ByteSize,

    /// Bearer token required for uploads.
    #[arg(long, env = "TOKEN")]
    pub token: Option<String>,

    /// File containing the bearer token.
    #[arg(long, env = "TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Secret for the keyed blob hash.
    #[arg(long, env = "HASH_SECRET")]
    pub hash_secret: Option<String>,

    /// File containing the keyed-hash secret.
    #[arg(long, env = "HASH_SECRET_FILE")]
    pub hash_secret_file: Option<PathBuf>,

    /// URL of the WebDAV collection used as the upstream blob store.
    #[arg(long, env = "WEBDAV_URI")]
    pub webdav_uri: String,

    /// Username for the WebDAV upstream.
    #[arg(long, env = "WEBDAV_USER")]
    pub webdav_user: String,

    /// Password for the WebDAV upstream.
    #[arg(long, env = "WEBDAV_PASSWORD")]
    pub webdav_password: Option<String>,

    /// File containing the WebDAV password.
    #[arg(long, env = "WEBDAV_PASSWORD_FILE")]
    pub webdav_password_file: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Fully resolved runtime configuration.
#[derive(Debug)]
pub struct Config {
    pub listen: SocketAddr,
    pub base_url: String,
    pub cache_dir: PathBuf,
    pub cache_max_bytes: u64,
    pub token: String,
    pub hash_secret: Vec<u8>,
    pub webdav: WebDavOptions,
}

impl Config {
    pub fn resolve(cli: Cli) -> anyhow::Result<Self> {
        let token = resolve_secret("token", cli.token, cli.token_file.as_deref())?;
        let hash_secret = resolve_secret(
            "hash secret",
            cli.hash_secret,
            cli.hash_secret_file.as_deref(),
        )?;
        let webdav_password = resolve_secret(
            "WebDAV password",
            cli.webdav_password,
            cli.webdav_password_file.as_deref(),
        )?;

        let base_url = cli
            .base_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://{}/blobs", cli.listen));

        Ok(Self {
            listen: cli.listen,
            base_url,
            cache_dir: cli.cache_dir,
            cache_max_bytes: cli.cache_size.as_u64(),
            token,
            hash_secret: hash_secret.into_bytes(),
            webdav: WebDavOptions {
                uri: cli.webdav_uri,
                username: cli.webdav_user,
                password: webdav_password,
            },
        })
    }
}

/// Resolve a secret from an inline value or a file; the file wins.
fn resolve_secret(
    what: &str,
    value: Option<String>,
    file: Option<&std::path::Path>,
) -> anyhow::Result<String> {
    let resolved = match file {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {what} file {}", path.display()))?;
            contents.trim().to_string()
        }
        None => value.unwrap_or_default(),
    };

    if resolved.is_empty() {
        bail!("{what} is required");
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli::parse_from([
            "depot",
            "--cache",
            "/tmp/depot-cache",
            "--webdav-uri",
            "https://storage.example.com/dav",
            "--webdav-user",
            "user",
        ])
    }

    #[test]
    fn missing_token_is_an_error() {
        let mut cli = base_cli();
        cli.hash_secret = Some("s".into());
        cli.webdav_password = Some("p".into());
        let err = Config::resolve(cli).unwrap_err();
        assert!(err.to_string().contains("token"), "{err}");
    }

    #[test]
    fn inline_secrets_resolve() {
        let mut cli = base_cli();
        cli.token = Some("tok".into());
        cli.hash_secret = Some("sec".into());
        cli.webdav_password = Some("pass".into());

        let config = Config::resolve(cli).unwrap();
        assert_eq!(config.token, "tok");
        assert_eq!(config.hash_secret, b"sec");
        assert_eq!(config.webdav.password, "pass");
        assert_eq!(config.cache_max_bytes, 10 * 1_000_000_000);
    }

    #[test]
    fn secret_file_wins_and_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let token_file = dir.path().join("token");
        std::fs::write(&token_file, "  from-file\n").unwrap();

        let mut cli = base_cli();
        cli.token = Some("inline".into());
        cli.token_file = Some(token_file);
        cli.hash_secret = Some("sec".into());
        cli.webdav_password = Some("pass".into());

        let config = Config::resolve(cli).unwrap();
        assert_eq!(config.token, "from-file");
    }

    #[test]
    fn empty_secret_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let token_file = dir.path().join("token");
        std::fs::write(&token_file, "\n").unwrap();

        let mut cli = base_cli();
        cli.token_file = Some(token_file);
        cli.hash_secret = Some("sec".into());
        cli.webdav_password = Some("pass".into());

        assert!(Config::resolve(cli).is_err());
    }

    #[test]
    fn base_url_defaults_to_listen_address() {
        let mut cli = base_cli();
        cli.token = Some("t".into());
        cli.hash_secret = Some("s".into());
        cli.webdav_password = Some("p".into());

        let config = Config::resolve(cli).unwrap();
        assert_eq!(config.base_url, "http://0.0.0.0:8080/blobs");
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let mut cli = base_cli();
        cli.base_url = Some("https://mirror.example.com/blobs/".into());
        cli.token = Some("t".into());
        cli.hash_secret = Some("s".into());
        cli.webdav_password = Some("p".into());

        let config = Config::resolve(cli).unwrap();
        assert_eq!(config.base_url, "https://mirror.example.com/blobs");
    }

    #[test]
    fn zero_cache_size_disables_the_bound() {
        let mut cli = base_cli();
        cli.cache_size = ByteSize::b(0);
        cli.token = Some("t".into());
        cli.hash_secret = Some("s".into());
        cli.webdav_password = Some("p".into());

        let config = Config::resolve(cli).unwrap();
        assert_eq!(config.cache_max_bytes, 0);
    }
}
