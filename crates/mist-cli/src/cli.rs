use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use mist_db::VerifyingKey;

#[derive(Parser)]
#[command(
    name = "mist",
    about = "mistDb store administration",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML file with store and archive settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new, empty store file
    Init(InitArgs),
    /// List committed transactions
    Log(LogArgs),
    /// Print one transaction as its canonical document
    Show(ShowArgs),
    /// Recompute every transaction hash
    Verify(VerifyArgs),
    /// Write the full history to a zip bundle
    Backup(BackupArgs),
    /// Replay a zip bundle into a new store file
    Restore(RestoreArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct LogArgs {
    pub path: PathBuf,
    #[arg(long)]
    pub oneline: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    pub path: PathBuf,
    /// Version number or hash prefix
    pub reference: String,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub path: PathBuf,
    /// Also check every transaction's signature against this hex public key
    #[arg(long)]
    pub key: Option<VerifyingKey>,
}

#[derive(Args)]
pub struct BackupArgs {
    pub path: PathBuf,
    pub archive: PathBuf,
    /// Store entries uncompressed
    #[arg(long)]
    pub stored: bool,
}

#[derive(Args)]
pub struct RestoreArgs {
    pub archive: PathBuf,
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["mist", "log", "db.mist", "--verbose", "--format", "json"]);
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Log(LogArgs { oneline: false, .. })));
    }

    #[test]
    fn backup_takes_store_then_archive() {
        let cli = Cli::parse_from(["mist", "backup", "db.mist", "out.zip", "--stored"]);
        match cli.command {
            Command::Backup(args) => {
                assert_eq!(args.path, PathBuf::from("db.mist"));
                assert_eq!(args.archive, PathBuf::from("out.zip"));
                assert!(args.stored);
            }
            _ => panic!("expected backup"),
        }
    }

    #[test]
    fn verify_parses_a_public_key() {
        let key = mist_db::SigningKey::from_bytes([1; 32]).verifying_key();
        let hex = key.to_hex();
        let cli = Cli::parse_from(["mist", "verify", "db.mist", "--key", hex.as_str()]);
        match cli.command {
            Command::Verify(args) => assert_eq!(args.key, Some(key)),
            _ => panic!("expected verify"),
        }
        assert!(Cli::try_parse_from(["mist", "verify", "db.mist", "--key", "beef"]).is_err());
    }

    #[test]
    fn show_requires_a_reference() {
        assert!(Cli::try_parse_from(["mist", "show", "db.mist"]).is_err());
    }
}
