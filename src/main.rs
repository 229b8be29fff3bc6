//! Rootstash - privileged incremental backup/restore for rooted Android.
//!
//! Shells out to a root session to archive installed apps and user media,
//! reconciles the on-disk result with persisted JSON maps, and restores
//! packages and data trees with ownership/SELinux repair.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rootstash::commands;
use rootstash::config::Config;
use rootstash::layout::Layout;
use rootstash::oplog::OpLog;
use rootstash::shell::Shell;

#[derive(Parser)]
#[command(name = "rootstash")]
#[command(about = "Privileged incremental backup/restore for rooted Android")]
#[command(
    after_help = "QUICK START:\n  rootstash preflight     Check root access and tools\n  rootstash backup apps   Back up every installed app\n  rootstash show restore  List restorable archives\n  rootstash restore apps --date <date> <pkg>"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run preflight checks (root access, tools, backup root)
    Preflight {
        /// Fail with exit code 1 if any check fails
        #[arg(long)]
        strict: bool,
    },

    /// Archive apps, media directories, or this tool itself
    Backup {
        #[command(subcommand)]
        target: BackupTarget,
    },

    /// Reinstall apps and extract data archives
    Restore {
        #[command(subcommand)]
        target: RestoreTarget,
    },

    /// Show configuration, maps and run history
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Remove entities, maps or the whole backup tree
    Clean {
        #[command(subcommand)]
        what: CleanTarget,
    },
}

#[derive(Subcommand)]
enum BackupTarget {
    /// Back up installed apps (all of them when no package is named)
    Apps { packages: Vec<String> },
    /// Back up media directories (all tracked ones when no name is given)
    Media { names: Vec<String> },
    /// Copy this binary into the backup tree
    #[command(name = "self")]
    Itself,
}

#[derive(Subcommand)]
enum RestoreTarget {
    /// Restore apps from a dated archive set
    Apps {
        /// Date key of the restore point
        #[arg(long)]
        date: String,
        packages: Vec<String>,
    },
    /// Restore media directories from a dated archive set
    Media {
        /// Date key of the restore point
        #[arg(long)]
        date: String,
        names: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show the app backup map
    Backup,
    /// Show the app restore map
    Restore,
    /// Show the media backup map
    MediaBackup,
    /// Show the media restore map
    MediaRestore,
    /// Show run history
    History,
    /// List users that have a backup tree
    Users,
}

#[derive(Subcommand)]
enum CleanTarget {
    /// Remove one app from the maps and delete its archives
    App { package: String },
    /// Remove one medium from the maps and delete its archives
    Media { name: String },
    /// Delete the persisted maps, keep archives
    Maps,
    /// Delete the entire backup tree
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();
    let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = Config::load(&base_dir);

    let layout = Layout::new(&config.backup_root);
    let log = match OpLog::open(&layout.op_log()) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("  [WARN] {:#} (shell logging disabled)", e);
            OpLog::disabled()
        }
    };
    let shell = Shell::new(config.su_binary.as_str(), log);

    match cli.command {
        Commands::Preflight { strict } => {
            commands::cmd_preflight(&shell, &config, strict).await?;
        }

        Commands::Backup { target } => match target {
            BackupTarget::Apps { packages } => {
                commands::cmd_backup_apps(&shell, &config, packages).await?;
            }
            BackupTarget::Media { names } => {
                commands::cmd_backup_media(&shell, &config, names).await?;
            }
            BackupTarget::Itself => {
                commands::cmd_backup_self(&shell, &config).await?;
            }
        },

        Commands::Restore { target } => match target {
            RestoreTarget::Apps { date, packages } => {
                commands::cmd_restore_apps(&shell, &config, date, packages).await?;
            }
            RestoreTarget::Media { date, names } => {
                commands::cmd_restore_media(&shell, &config, date, names).await?;
            }
        },

        Commands::Show { what } => {
            let target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Backup => commands::show::ShowTarget::Backup,
                ShowTarget::Restore => commands::show::ShowTarget::Restore,
                ShowTarget::MediaBackup => commands::show::ShowTarget::MediaBackup,
                ShowTarget::MediaRestore => commands::show::ShowTarget::MediaRestore,
                ShowTarget::History => commands::show::ShowTarget::History,
                ShowTarget::Users => commands::show::ShowTarget::Users,
            };
            commands::cmd_show(&shell, &config, target).await?;
        }

        Commands::Clean { what } => {
            let target = match what {
                CleanTarget::App { package } => commands::clean::CleanTarget::App { package },
                CleanTarget::Media { name } => commands::clean::CleanTarget::Media { name },
                CleanTarget::Maps => commands::clean::CleanTarget::Maps,
                CleanTarget::All => commands::clean::CleanTarget::All,
            };
            commands::cmd_clean(&shell, &config, target).await?;
        }
    }

    Ok(())
}
