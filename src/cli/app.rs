//! Main CLI application structure

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use super::output::{Output, OutputFormat};
use super::{classify, restore, scan, split};
use crate::domain::Partitioner;
use crate::storage::{Config, ProfileConfig, ProjectConfig, PROJECT_CONFIG_FILES};

#[derive(Parser)]
#[command(name = "partition")]
#[command(author, version, about = "Split an oversized source file into domain-scoped modules")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project config file (defaults to the nearest .partition.toml)
    #[arg(long, short = 'c', global = true, env = "PARTITION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Profile to use (defaults to the project's default_profile)
    #[arg(long, short = 'p', global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a source file into per-domain files and rewrite it as a root
    Split {
        /// File to split
        source: PathBuf,

        /// Directory for the generated files
        #[arg(long, short = 'o')]
        out: PathBuf,

        /// Show what would be written without touching any file
        #[arg(long)]
        dry_run: bool,

        /// Run the profile's check command before and after writing
        #[arg(long)]
        check: bool,

        /// Override the check command's timeout
        #[arg(long, value_name = "SECS")]
        check_timeout: Option<u64>,

        /// Replace an existing backup that differs from the source
        #[arg(long)]
        force: bool,
    },

    /// List the declarations a profile finds, without writing
    Scan {
        /// File to scan
        source: PathBuf,
    },

    /// Show which domain each name falls into
    Classify {
        /// Declaration names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Put a file back from its .backup copy
    Restore {
        /// File that was split
        source: PathBuf,
    },

    /// Write a starter .partition.toml with the built-in profiles
    Init {
        /// Directory to write into (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// List available profiles
    Profiles,
}

/// Loaded configuration plus the profile selected for this invocation
pub struct Session {
    pub config: Config,
    pub profile_name: String,
    pub profile: ProfileConfig,
}

impl Session {
    fn open(cli_config: Option<&Path>, cli_profile: Option<&str>, output: &Output) -> Result<Self> {
        let config = Config::load(cli_config)?;
        match &config.path {
            Some(path) => output.verbose_ctx("config", &format!("Loaded project config: {}", path.display())),
            None => output.verbose_ctx("config", "No project config found, using built-in profiles"),
        }

        let (profile_name, profile) = config.profile(cli_profile)?;
        output.verbose_ctx("config", &format!("Using profile: {}", profile_name));

        Ok(Self {
            config,
            profile_name,
            profile,
        })
    }

    /// Compiles the selected profile
    pub fn engine(&self) -> Result<Partitioner> {
        self.profile
            .compile(&self.profile_name)
            .with_context(|| format!("Failed to load profile '{}'", self.profile_name))
    }
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let format = match cli.format {
        Some(format) => format,
        None => Config::load_global()?.default_format.into(),
    };
    let output = Output::new(format, cli.verbose);

    output.verbose("partition starting");

    let config_path = cli.config.as_deref();
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Split {
            source,
            out,
            dry_run,
            check,
            check_timeout,
            force,
        } => {
            let session = Session::open(config_path, profile, &output)?;
            let args = split::SplitArgs {
                source,
                out,
                dry_run,
                check,
                check_timeout,
                force,
            };
            split::run(&output, &session, &args)?
        }

        Commands::Scan { source } => {
            let session = Session::open(config_path, profile, &output)?;
            scan::run(&output, &session, &source)?
        }

        Commands::Classify { names } => {
            let session = Session::open(config_path, profile, &output)?;
            classify::run(&output, &session, &names)?
        }

        Commands::Restore { source } => restore::run(&output, &source)?,

        Commands::Init { path, force } => init(&output, &path, force)?,

        Commands::Profiles => {
            let session = Session::open(config_path, profile, &output)?;
            profiles(&output, &session)?
        }
    }

    output.verbose("Command completed successfully");
    Ok(())
}

/// Writes `.partition.toml` holding every built-in profile
fn init(output: &Output, dir: &Path, force: bool) -> Result<()> {
    output.verbose_ctx("init", &format!("Initializing config in: {}", dir.display()));

    let path = dir.join(PROJECT_CONFIG_FILES[0]);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    let content = ProjectConfig::starter_toml()?;
    fs::write(&path, content).with_context(|| format!("Failed to write config: {}", path.display()))?;

    if output.is_json() {
        output.data(&serde_json::json!({ "created": path.display().to_string() }));
    } else {
        output.success(&format!("Created {}", path.display()));
    }

    Ok(())
}

/// Lists built-in and project profiles
fn profiles(output: &Output, session: &Session) -> Result<()> {
    let names = session.config.profile_names();
    let items: Vec<_> = names
        .iter()
        .map(|name| {
            let description = session
                .config
                .profile(Some(name))
                .ok()
                .and_then(|(_, p)| p.description)
                .unwrap_or_default();
            (name.as_str(), description, *name == session.profile_name)
        })
        .collect();

    if output.is_json() {
        let json: Vec<_> = items
            .iter()
            .map(|(name, description, selected)| {
                serde_json::json!({
                    "name": name,
                    "description": description,
                    "selected": selected,
                })
            })
            .collect();
        output.data(&json);
    } else {
        for (name, description, selected) in &items {
            let marker = if *selected { "*" } else { " " };
            println!("{} {:<14} {}", marker, name, description);
        }
    }

    Ok(())
}
