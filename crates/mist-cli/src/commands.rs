use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;

use mist_archive::{Archiver, Compression};
use mist_db::{FileTableStore, MistDb, TransactionRef};
use mist_txn::TransactionDocument;

use crate::cli::*;
use crate::settings::Settings;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    match cli.command {
        Command::Init(args) => cmd_init(args, &settings),
        Command::Log(args) => cmd_log(args, &settings, cli.format).await,
        Command::Show(args) => cmd_show(args, &settings).await,
        Command::Verify(args) => cmd_verify(args, &settings).await,
        Command::Backup(args) => cmd_backup(args, settings).await,
        Command::Restore(args) => cmd_restore(args, &settings).await,
    }
}

fn open(path: &Path, settings: &Settings) -> anyhow::Result<MistDb<FileTableStore>> {
    MistDb::open(path, settings.db.clone())
        .with_context(|| format!("opening store {}", path.display()))
}

fn cmd_init(args: InitArgs, settings: &Settings) -> anyhow::Result<()> {
    MistDb::create(&args.path, settings.db.clone())?;
    println!(
        "{} Initialized empty mistDb store in {}",
        "✓".green().bold(),
        args.path.display().to_string().bold()
    );
    Ok(())
}

async fn cmd_log(args: LogArgs, settings: &Settings, format: OutputFormat) -> anyhow::Result<()> {
    let db = open(&args.path, settings)?;
    let transactions = db.list_transactions().await?;
    if format == OutputFormat::Json {
        let list: Vec<_> = transactions.values().collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }
    if transactions.is_empty() {
        println!("No transactions.");
        return Ok(());
    }
    for summary in transactions.values().rev() {
        let parents: Vec<String> = summary.parents.values().map(|v| format!("v{v}")).collect();
        if args.oneline {
            println!(
                "{} {} {}",
                format!("v{}", summary.version).yellow(),
                summary.hash.short_hex().dimmed(),
                parents.join(",")
            );
            continue;
        }
        println!(
            "{}  {}",
            format!("v{}", summary.version).yellow().bold(),
            summary.hash.to_hex().dimmed()
        );
        println!("  Date:    {}", summary.timestamp.to_rfc3339());
        if let Some(user) = &summary.user {
            println!("  User:    {}", user.cyan());
        }
        if parents.len() > 1 {
            println!("  Merge:   {}", parents.join(" ").green());
        } else if let Some(parent) = parents.first() {
            println!("  Parent:  {parent}");
        }
        if summary.signature.is_some() {
            println!("  Signed:  {}", "yes".green());
        }
    }
    Ok(())
}

async fn cmd_show(args: ShowArgs, settings: &Settings) -> anyhow::Result<()> {
    let reference: TransactionRef = args.reference.parse()?;
    let db = open(&args.path, settings)?;
    let txn = db.get_transaction(reference).await?;
    let doc = TransactionDocument::from_transaction(&txn, |_| None)?;
    println!("{}", doc.to_canonical_json()?);
    Ok(())
}

async fn cmd_verify(args: VerifyArgs, settings: &Settings) -> anyhow::Result<()> {
    let db = open(&args.path, settings)?;
    let report = db.verify(args.key.as_ref()).await?;
    for failure in &report.failures {
        println!(
            "{} v{}: {}",
            "✗".red().bold(),
            failure.version,
            failure.reason
        );
    }
    if !report.is_clean() {
        bail!(
            "{} of {} transactions failed verification",
            report.failures.len(),
            report.checked
        );
    }
    println!(
        "{} {} transactions verified",
        "✓".green().bold(),
        report.checked
    );
    Ok(())
}

async fn cmd_backup(args: BackupArgs, settings: Settings) -> anyhow::Result<()> {
    let db = open(&args.path, &settings)?;
    let mut config = settings.archive;
    if args.stored {
        config.compression = Compression::Stored;
    }
    let summary = Archiver::new(&db, config)
        .backup_to_path(&args.archive)
        .await
        .with_context(|| format!("writing {}", args.archive.display()))?;
    println!(
        "{} Backed up {} transactions and {} blobs to {}",
        "✓".green().bold(),
        summary.transactions,
        summary.blobs,
        args.archive.display().to_string().bold()
    );
    Ok(())
}

async fn cmd_restore(args: RestoreArgs, settings: &Settings) -> anyhow::Result<()> {
    let db = MistDb::create(&args.path, settings.db.clone())?;
    let result = Archiver::new(&db, settings.archive.clone())
        .restore_from_path(&args.archive)
        .await;
    match result {
        Ok(count) => {
            println!(
                "{} Restored {} transactions into {}",
                "✓".green().bold(),
                count,
                args.path.display().to_string().bold()
            );
            Ok(())
        }
        Err(err) => {
            drop(db);
            if let Err(cleanup) = std::fs::remove_file(&args.path) {
                tracing::warn!(error = %cleanup, "could not remove partial store");
            }
            Err(err).with_context(|| format!("restoring {}", args.archive.display()))
        }
    }
}
