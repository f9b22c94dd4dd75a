use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tailon::config::normalize_root;
use tailon::{Config, FileSpecConfig, Server};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tailon")]
#[command(about = "Follow log files from the browser", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen addresses, comma separated (host:port or socket path)
    #[arg(short, long, value_delimiter = ',')]
    bind: Vec<String>,

    /// Path prefix every route is served under
    #[arg(short, long)]
    relative_root: Option<String>,

    /// Allow downloading the followed files
    #[arg(short, long)]
    allow_download: Option<bool>,

    /// Server-wide cap on running followers (at least 2)
    #[arg(long)]
    max_followers: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the default configuration and exit
    #[arg(long)]
    help_config: bool,

    /// Files, globs or directories: [alias=<name>,][group=<name>,]<path>
    files: Vec<String>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if !self.bind.is_empty() {
            config.listen_addr = self.bind;
        }
        if let Some(root) = self.relative_root {
            config.relative_root = normalize_root(&root);
        }
        if let Some(allow) = self.allow_download {
            config.allow_download = allow;
        }
        if let Some(max) = self.max_followers {
            config.max_followers = max;
        }
        config
            .files
            .extend(self.files.into_iter().map(FileSpecConfig::Spec));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.help_config {
        print!("{}", Config::default_yaml()?);
        return Ok(());
    }

    tailon::logging::init(cli.verbose);

    smol::block_on(async move {
        let mut config = match &cli.config {
            Some(path) => Config::from_file(path)
                .await
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => Config::default(),
        };
        cli.apply(&mut config);

        info!(files = config.files.len(), "Starting tailon");

        let server = Server::bind(config).await?;
        server.run().await
    })
}
