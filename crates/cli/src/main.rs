//! cairn CLI - cairn command

use clap::error::ErrorKind;
use clap::{ArgGroup, CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;

/// cairn - integrity-verified directory backups with tiered rotation
#[derive(Parser, Debug)]
#[command(name = "cairn")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("action").args(["backup", "restore", "list"])))]
#[command(after_help = "Configuration is read from $CAIRN_CONFIG, ./backup.conf or ~/.config/cairn/backup.conf")]
struct Cli {
    /// Back up SOURCE into the configured destination, then rotate old backups
    #[arg(long, value_name = "SOURCE")]
    backup: Option<PathBuf>,

    /// Restore ARCHIVE into DIR (a bare archive name is looked up in the destination)
    #[arg(long, num_args = 2, value_names = ["ARCHIVE", "DIR"])]
    restore: Option<Vec<PathBuf>>,

    /// List backups, newest first
    #[arg(long)]
    list: bool,

    /// Log what would happen without changing anything
    #[arg(long)]
    dry_run: bool,
}

enum Action {
    Backup(PathBuf),
    Restore { archive: PathBuf, target: PathBuf },
    List,
}

impl Cli {
    fn action(self) -> Option<Action> {
        if let Some(source) = self.backup {
            return Some(Action::Backup(source));
        }
        if let Some(paths) = self.restore {
            let mut paths = paths.into_iter();
            return match (paths.next(), paths.next()) {
                (Some(archive), Some(target)) => Some(Action::Restore { archive, target }),
                _ => None,
            };
        }
        self.list.then_some(Action::List)
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        // Anything unrecognised gets the usage text, not a failure
        Err(_) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
    };

    let dry_run = cli.dry_run;
    let Some(action) = cli.action() else {
        print_usage();
        return ExitCode::SUCCESS;
    };

    let result = match action {
        Action::Backup(source) => cmd::backup::run(&source, dry_run),
        Action::Restore { archive, target } => cmd::restore::run(&archive, &target, dry_run),
        Action::List => cmd::list::run(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if cairn_cli::logging::is_initialized() {
                tracing::error!("{}", err);
            } else {
                eprintln!("{} {}", "ERROR:".red().bold(), err);
            }
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let _ = Cli::command().print_help();
}
