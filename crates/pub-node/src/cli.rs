//! CLI command definitions and argument parsing

use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use pub_core::sqlite_store::SqliteStore;
use pub_core::{SelfIdentity, Store};
use pub_crypto::address::OnionScheme;
use pub_crypto::rng::os_random;

use crate::config::{normalize_db_path, NodeConfig};
use crate::server::NodeServer;

/// p2p publishing platform
#[derive(Parser, Debug)]
#[command(name = "pub-node")]
#[command(version, about = "p2p publishing platform")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug mode (protocol-level tracing)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true, env = "PUB_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create identity
    Create(CreateArgs),
    /// Start server
    Start(StartArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemeArg {
    Rsa1024,
    Ed25519,
}

impl From<SchemeArg> for OnionScheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Rsa1024 => OnionScheme::Rsa1024,
            SchemeArg::Ed25519 => OnionScheme::Ed25519V3,
        }
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Database name (lower-cased, `.db` appended)
    pub database: String,

    /// Onion key scheme
    #[arg(long, value_enum, default_value = "rsa1024")]
    pub scheme: SchemeArg,

    /// Display name (prompted for when omitted)
    #[arg(long)]
    pub name: Option<String>,

    /// Bio text (prompted for when omitted)
    #[arg(long)]
    pub about: Option<String>,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Database name (lower-cased, `.db` appended)
    pub database: String,

    /// Tor SOCKS host
    #[arg(long)]
    pub socks_host: Option<String>,

    /// Tor SOCKS port
    #[arg(long)]
    pub socks_port: Option<u16>,

    /// Tor controller host
    #[arg(long)]
    pub control_host: Option<String>,

    /// Tor controller port
    #[arg(long)]
    pub control_port: Option<u16>,

    /// Tor controller password
    #[arg(long)]
    pub control_password: Option<String>,

    /// Private API listen address
    #[arg(long)]
    pub private_addr: Option<SocketAddr>,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Create(args) => args.execute().await,
            Commands::Start(args) => {
                let config = NodeConfig::load(self.config.as_deref())?;
                args.execute(config).await
            }
        }
    }
}

fn prompt(label: &str, input: &mut impl BufRead) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

impl CreateArgs {
    pub async fn execute(self) -> Result<()> {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let name = match self.name.clone() {
            Some(name) => name,
            None => prompt("Name", &mut input)?,
        };
        let about = match self.about.clone() {
            Some(about) => about,
            None => prompt("About", &mut input)?,
        };
        drop(input);

        let path = normalize_db_path(&self.database);
        let store = SqliteStore::new(&path)?;
        let identity = create_identity(&store, name, about, self.scheme.into()).await?;

        println!("{}", identity.onion());
        Ok(())
    }
}

/// Generate and persist the self identity. Fails if one already exists.
pub async fn create_identity(
    store: &dyn Store,
    name: String,
    about: String,
    scheme: OnionScheme,
) -> Result<SelfIdentity> {
    let rng = os_random();
    let identity = SelfIdentity::generate(name, about, scheme, rng.as_ref())?;
    store.create_self(&identity).await?;
    info!(onion = %identity.onion(), scheme = %scheme, "created identity");
    Ok(identity)
}

impl StartArgs {
    /// Flags win over config file and environment.
    pub fn apply(&self, mut config: NodeConfig) -> NodeConfig {
        if let Some(host) = &self.socks_host {
            config.socks_host = host.clone();
        }
        if let Some(port) = self.socks_port {
            config.socks_port = port;
        }
        if let Some(host) = &self.control_host {
            config.control_host = host.clone();
        }
        if let Some(port) = self.control_port {
            config.control_port = port;
        }
        if let Some(password) = &self.control_password {
            config.control_password = password.clone();
        }
        if let Some(addr) = self.private_addr {
            config.private_addr = addr;
        }
        config
    }

    pub async fn execute(self, config: NodeConfig) -> Result<()> {
        let config = self.apply(config);
        let path = normalize_db_path(&self.database);
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&path)?);

        let server = NodeServer::new(config, store, os_random()).await?;
        server.start().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from(["pub-node", "create", "Alice", "--scheme", "ed25519", "--name", "alice"]).unwrap();
        match cli.command {
            Commands::Create(args) => {
                assert_eq!(args.database, "Alice");
                assert_eq!(args.scheme, SchemeArg::Ed25519);
                assert_eq!(args.name.as_deref(), Some("alice"));
                assert!(args.about.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_create_defaults_to_rsa() {
        let cli = Cli::try_parse_from(["pub-node", "create", "db"]).unwrap();
        let Commands::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(OnionScheme::from(args.scheme), OnionScheme::Rsa1024);
    }

    #[test]
    fn test_start_flags_override_config() {
        let cli = Cli::try_parse_from([
            "pub-node",
            "--verbose",
            "start",
            "db",
            "--socks-port",
            "9150",
            "--control-password",
            "secret",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Start(args) = cli.command else {
            panic!("expected start");
        };

        let base = NodeConfig {
            control_port: 9999,
            ..NodeConfig::default()
        };
        let config = args.apply(base);
        assert_eq!(config.socks_port, 9150);
        assert_eq!(config.control_password, "secret");
        assert_eq!(config.control_port, 9999);
    }

    #[test]
    fn test_database_required() {
        assert!(Cli::try_parse_from(["pub-node", "start"]).is_err());
    }

    #[test]
    fn test_prompt_trims_newline() {
        let mut input = io::Cursor::new(b"Alice Smith\r\nrest".to_vec());
        assert_eq!(prompt("Name", &mut input).unwrap(), "Alice Smith");
    }

    #[tokio::test]
    async fn test_create_identity_once() {
        let store = SqliteStore::new_in_memory().unwrap();
        let identity = create_identity(&store, "a".into(), "b".into(), OnionScheme::Ed25519V3)
            .await
            .unwrap();
        assert_eq!(store.get_self().await.unwrap().onion(), identity.onion());

        assert!(create_identity(&store, "c".into(), "d".into(), OnionScheme::Ed25519V3)
            .await
            .is_err());
    }
}
