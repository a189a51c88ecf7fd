//! # netmount
//!
//! Persist authenticated network shares in fstab.
//!
//! ## Usage
//!
//! ```bash
//! NETMOUNT_PASSWORD=secret netmount add --server nas --share team \
//!     --mount-point /mnt/team --username alice
//! netmount remove /mnt/team
//! netmount unused
//! netmount purge --unused
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use netmount::config::{DEFAULT_CREDENTIALS_DIR, DEFAULT_FSTAB_PATH};
use netmount::{
    AlwaysReplace, Config, ConflictDecision, ConflictResolver, Elevation, KeepExisting,
    NetworkMounter, ShareRequest,
};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Command-line arguments for netmount.
#[derive(Parser)]
#[command(name = "netmount")]
#[command(version)]
#[command(about = "Persist authenticated CIFS/NFS shares in fstab")]
#[command(
    long_about = "Adds and removes network share entries in fstab, storing each share's \
    credentials in an owner-only file referenced through the credentials= option. \
    fstab is written directly when possible and through sudo or pkexec otherwise."
)]
struct Cli {
    /// fstab file to read and modify
    #[arg(long, global = true, env = "NETMOUNT_FSTAB", default_value = DEFAULT_FSTAB_PATH)]
    fstab: PathBuf,

    /// Directory holding credential files (`~` is expanded)
    #[arg(
        long,
        global = true,
        env = "NETMOUNT_CREDENTIALS_DIR",
        default_value = DEFAULT_CREDENTIALS_DIR
    )]
    credentials_dir: PathBuf,

    /// Program used when fstab is not writable by the current user
    #[arg(long, global = true, value_enum, default_value_t = ElevateWith::Sudo)]
    elevate_with: ElevateWith,

    /// Seconds to wait for a privileged command, prompt included
    #[arg(long, global = true, value_name = "SECONDS", default_value_t = 30)]
    timeout: u64,

    /// Do not keep a .bak copy of fstab before rewriting it
    #[arg(long, global = true)]
    no_backup: bool,

    /// More output (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a share to fstab
    Add(AddArgs),
    /// Remove the fstab entries for a mount point
    Remove {
        /// Mount point whose entries are removed
        mount_point: PathBuf,
    },
    /// List network share entries in fstab
    Shares,
    /// List credential files no fstab entry refers to
    Unused,
    /// Securely delete credential files
    Purge(PurgeArgs),
    /// Print fstab as it is on disk
    Show,
}

#[derive(Args)]
struct AddArgs {
    /// Server host name or IP address
    #[arg(long)]
    server: String,

    /// Share name (SMB) or exported path (NFS)
    #[arg(long)]
    share: String,

    /// Absolute path where the share is mounted
    #[arg(short, long)]
    mount_point: PathBuf,

    /// Filesystem type: cifs, smb, smbfs, nfs or nfs4
    #[arg(short = 't', long = "type", default_value = "cifs")]
    fs_type: String,

    /// Comma separated mount options
    #[arg(short, long, default_value = "")]
    options: String,

    #[arg(short, long)]
    username: Option<String>,

    /// Prompted for when a username is given without it
    #[arg(long, env = "NETMOUNT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long)]
    domain: Option<String>,

    #[arg(long, default_value_t = 0)]
    dump: u32,

    #[arg(long, default_value_t = 0)]
    pass: u32,

    /// What to do when the mount point already has an entry
    #[arg(long, value_enum, default_value_t = OnConflict::Ask)]
    on_conflict: OnConflict,
}

#[derive(Args)]
struct PurgeArgs {
    /// Credential files to delete
    #[arg(conflicts_with_all = ["unused", "older_than"])]
    paths: Vec<PathBuf>,

    /// Delete every credential file no fstab entry refers to
    #[arg(long, conflicts_with = "older_than")]
    unused: bool,

    /// Delete credential files not modified for this many days
    #[arg(long, value_name = "DAYS")]
    older_than: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ElevateWith {
    Sudo,
    Pkexec,
}

impl From<ElevateWith> for Elevation {
    fn from(value: ElevateWith) -> Self {
        match value {
            ElevateWith::Sudo => Elevation::Sudo,
            ElevateWith::Pkexec => Elevation::Pkexec,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OnConflict {
    /// Ask on the terminal
    Ask,
    Replace,
    Keep,
}

/// Prompts on stderr and reads the answer from stdin; anything but yes keeps.
struct AskOnTerminal;

impl ConflictResolver for AskOnTerminal {
    fn decide(&self, existing: &str, proposed: &str) -> ConflictDecision {
        eprintln!("An entry for this mount point already exists:");
        eprintln!("  current:  {}", existing);
        eprintln!("  proposed: {}", proposed);
        eprint!("Replace it? [y/N] ");
        let _ = io::stderr().flush();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) if matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") => {
                ConflictDecision::Replace
            }
            _ => ConflictDecision::Keep,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::default()
        .with_fstab_path(&cli.fstab)
        .with_credentials_dir(&cli.credentials_dir)
        .with_elevation(cli.elevate_with.into())
        .with_command_timeout(Duration::from_secs(cli.timeout))
        .with_backup(!cli.no_backup);
    let mounter = NetworkMounter::new(config);

    match cli.command {
        Command::Add(args) => add(&mounter, args),
        Command::Remove { mount_point } => {
            let result = mounter.remove_share(&mount_point);
            if !result.success {
                bail!("{}", result.message);
            }
            println!("{}", result);
            Ok(())
        }
        Command::Shares => {
            let shares = mounter.network_shares()?;
            if shares.is_empty() {
                println!("No network shares in {}", cli.fstab.display());
            }
            for entry in shares {
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.source,
                    entry.mount_point.display(),
                    entry.fs_type,
                    entry.options
                );
            }
            Ok(())
        }
        Command::Unused => {
            let unused = mounter.list_unused_credentials()?;
            if unused.is_empty() {
                println!("No unused credential files");
            }
            for info in unused {
                let age_days = info
                    .modified
                    .elapsed()
                    .map(|age| age.as_secs() / SECONDS_PER_DAY)
                    .unwrap_or(0);
                println!(
                    "{}\t{}\t{} bytes\t{} days old",
                    info.path.display(),
                    info.username.as_deref().unwrap_or("?"),
                    info.size,
                    age_days
                );
            }
            Ok(())
        }
        Command::Purge(args) => purge(&mounter, args),
        Command::Show => {
            print!("{}", mounter.read_fstab_raw()?);
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();
}

fn add(mounter: &NetworkMounter, args: AddArgs) -> Result<()> {
    let username = args.username.unwrap_or_default();
    let password = match args.password {
        Some(password) => password,
        None if !username.is_empty() => {
            rpassword::prompt_password(format!("Password for {}: ", username))
                .context("Failed to read password")?
        }
        None => String::new(),
    };

    let request = ShareRequest::new(args.server, args.share, args.mount_point, args.fs_type)
        .with_options(args.options)
        .with_credentials(username, password, args.domain.unwrap_or_default())
        .with_dump_pass(args.dump, args.pass);

    let result = match args.on_conflict {
        OnConflict::Ask => mounter.add_share(&request, &AskOnTerminal),
        OnConflict::Replace => mounter.add_share(&request, &AlwaysReplace),
        OnConflict::Keep => mounter.add_share(&request, &KeepExisting),
    };
    if !result.success {
        bail!("{}", result.message);
    }
    println!("{}", result);
    Ok(())
}

fn purge(mounter: &NetworkMounter, args: PurgeArgs) -> Result<()> {
    let report = if let Some(days) = args.older_than {
        mounter.purge_credentials_older_than(days)
    } else if args.unused {
        let paths: Vec<PathBuf> = mounter
            .list_unused_credentials()?
            .into_iter()
            .map(|info| info.path)
            .collect();
        mounter.purge_credentials(&paths)
    } else if !args.paths.is_empty() {
        mounter.purge_credentials(&args.paths)
    } else {
        bail!("Nothing to purge: give credential files, --unused or --older-than");
    };

    println!("Purged credential files: {}", report);
    if report.errors > 0 {
        bail!(
            "{} credential file(s) could not be deleted (see warnings above)",
            report.errors
        );
    }
    Ok(())
}
