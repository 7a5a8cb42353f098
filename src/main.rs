use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use procstore::maintenance::{self, CleanupReport};
use procstore::statics;
use procstore::store::{PerRecordStore, RecordStore, now, open_store};
use procstore::{Backend, Config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Inspect and clean up a process record store.
#[derive(Parser, Debug)]
#[command(name = "procstore", version)]
struct Cli {
    /// Config file (default: ./procstore.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the store root directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Override the backend
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List record names, optionally only those with a given status
    List {
        #[arg(long)]
        status: Option<String>,
    },

    /// Print a record's fields and timestamps
    Show { name: String },

    /// Print a record's audit trail (per-record backend)
    History { name: String },

    /// Delete completed records older than N days
    Old {
        #[arg(long, default_value_t = statics::DEFAULT_CLEANUP_DAYS)]
        days: u32,

        /// Actually delete (default is a dry run)
        #[arg(long)]
        execute: bool,
    },

    /// Delete failed records
    Failed {
        #[arg(long)]
        execute: bool,
    },

    /// Record counts per status and total size
    Stats,

    /// Permanently remove archived records deleted more than N days ago (per-record backend)
    PurgeArchive {
        #[arg(long, default_value_t = statics::DEFAULT_CLEANUP_DAYS)]
        days: u32,

        #[arg(long)]
        execute: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_logging();
    run(Cli::parse())
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::discover(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    tracing::debug!(root = ?config.root, backend = ?config.backend, "opening store");

    match cli.command {
        Command::List { status } => cmd_list(&config, status.as_deref()),
        Command::Show { name } => cmd_show(&config, &name),
        Command::History { name } => cmd_history(&config, &name),
        Command::Old { days, execute } => {
            let mut store = open_store(&config)?;
            let report = maintenance::clean_old(
                &mut store,
                &config.maintenance,
                days,
                now(),
                !execute,
            )?;
            print_cleanup(&report, execute);
            Ok(())
        }
        Command::Failed { execute } => {
            let mut store = open_store(&config)?;
            let report = maintenance::clean_by_status(
                &mut store,
                &config.maintenance.status_key,
                &config.maintenance.failed_status,
                !execute,
            )?;
            print_cleanup(&report, execute);
            Ok(())
        }
        Command::Stats => cmd_stats(&config),
        Command::PurgeArchive { days, execute } => cmd_purge_archive(&config, days, execute),
    }
}

fn cmd_list(config: &Config, status: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let names = match status {
        Some(status) => {
            maintenance::list_by_status(&store, &config.maintenance.status_key, status)?
        }
        None => store.list()?,
    };
    if names.is_empty() {
        println!("{}", statics::EN_NO_RECORDS);
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn cmd_show(config: &Config, name: &str) -> Result<()> {
    let store = open_store(config)?;
    let (Some(fields), Some(meta)) = (store.load(name)?, store.metadata(name)?) else {
        println!("{} {name}", statics::EN_NOT_FOUND);
        return Ok(());
    };
    println!("created:      {}", meta.created.to_rfc3339());
    println!("last_updated: {}", meta.last_updated.to_rfc3339());
    let body = serde_json::to_string_pretty(&fields).context("formatting record")?;
    println!("{body}");
    Ok(())
}

fn require_per_record(config: &Config, message: &str) -> Result<PerRecordStore> {
    anyhow::ensure!(config.backend == Backend::PerRecord, "{message}");
    Ok(PerRecordStore::open(&config.root)?)
}

fn cmd_history(config: &Config, name: &str) -> Result<()> {
    let store = require_per_record(config, statics::EN_HISTORY_NEEDS_PER_RECORD)?;
    let Some(trail) = store.audit_trail(name)? else {
        println!("{} {name}", statics::EN_NOT_FOUND);
        return Ok(());
    };
    for entry in &trail {
        let details = serde_json::to_string(&entry.details).context("formatting audit details")?;
        println!("{}  {:<16} {details}", entry.timestamp.to_rfc3339(), entry.action);
    }
    Ok(())
}

fn cmd_stats(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let stats = maintenance::stats(&store, &config.maintenance.status_key)?;
    println!("total records: {}", stats.total);
    for (status, count) in &stats.by_status {
        let label = if status.is_empty() { "(none)" } else { status };
        println!("  {label}: {count}");
    }
    println!(
        "total size: {} bytes ({:.2} MB)",
        stats.total_bytes,
        stats.total_bytes as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}

fn cmd_purge_archive(config: &Config, days: u32, execute: bool) -> Result<()> {
    let mut store = require_per_record(config, statics::EN_ARCHIVE_NEEDS_PER_RECORD)?;
    let cutoff = now() - chrono::Duration::days(i64::from(days));
    if execute {
        for archive in store.purge_archived(cutoff)? {
            println!("purged {} ({})", archive.name, archive.path.display());
        }
    } else {
        for archive in store.archived()?.iter().filter(|a| a.deleted_at < cutoff) {
            println!("would purge {} ({})", archive.name, archive.path.display());
        }
        println!("{}", statics::EN_DRY_RUN_NOTE);
    }
    Ok(())
}

fn print_cleanup(report: &CleanupReport, execute: bool) {
    if execute {
        for name in &report.deleted {
            println!("deleted {name}");
        }
        println!("deleted {} record(s), kept {}", report.deleted.len(), report.kept);
    } else {
        for name in &report.would_delete {
            println!("would delete {name}");
        }
        println!(
            "would delete {} record(s), keep {}",
            report.would_delete.len(),
            report.kept
        );
        println!("{}", statics::EN_DRY_RUN_NOTE);
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, run};
    use clap::{CommandFactory, Parser};
    use procstore::store::{PerRecordStore, RecordStore};
    use procstore::{Backend, FieldValue, Fields};
    use std::path::Path;

    fn status(s: &str) -> Fields {
        let mut f = Fields::new();
        f.insert("persist_status".to_string(), FieldValue::from(s));
        f
    }

    fn invoke(root: &Path, args: &[&str]) -> anyhow::Result<()> {
        let root = root.to_string_lossy().into_owned();
        let mut argv = vec!["procstore", "--root", root.as_str(), "--backend", "per-record"];
        argv.extend_from_slice(args);
        // Pin the config so a stray ./procstore.toml cannot leak in.
        let config = tempfile::NamedTempFile::new()?;
        let config_path = config.path().to_string_lossy().into_owned();
        argv.extend_from_slice(&["--config", config_path.as_str()]);
        run(Cli::try_parse_from(argv)?)
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn destructive_commands_default_to_dry_run() {
        let cli = Cli::try_parse_from(["procstore", "old"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Old {
                days: 30,
                execute: false
            }
        ));

        let cli = Cli::try_parse_from(["procstore", "--backend", "per-record", "failed", "--execute"])
            .unwrap();
        assert_eq!(cli.backend, Some(Backend::PerRecord));
        assert!(matches!(cli.command, Command::Failed { execute: true }));

        let cli = Cli::try_parse_from(["procstore", "purge-archive", "--days", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::PurgeArchive {
                days: 7,
                execute: false
            }
        ));
    }

    #[test]
    fn failed_only_deletes_with_execute() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PerRecordStore::open(dir.path()).unwrap();
        store.save("bad", &status("failed")).unwrap();
        store.save("good", &status("running")).unwrap();

        invoke(dir.path(), &["failed"]).unwrap();
        assert!(store.exists("bad").unwrap());

        invoke(dir.path(), &["failed", "--execute"]).unwrap();
        assert!(!store.exists("bad").unwrap());
        assert!(store.exists("good").unwrap());
        assert_eq!(store.archived().unwrap().len(), 1);
    }

    #[test]
    fn purge_archive_only_removes_with_execute() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PerRecordStore::open(dir.path()).unwrap();
        store.save("gone", &status("failed")).unwrap();
        store.delete("gone").unwrap();

        invoke(dir.path(), &["purge-archive", "--days", "0"]).unwrap();
        assert_eq!(store.archived().unwrap().len(), 1);

        invoke(dir.path(), &["purge-archive", "--days", "0", "--execute"]).unwrap();
        assert!(store.archived().unwrap().is_empty());
    }

    #[test]
    fn read_only_commands_run_against_a_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PerRecordStore::open(dir.path()).unwrap();
        store.save("proc1", &status("completed")).unwrap();

        invoke(dir.path(), &["list"]).unwrap();
        invoke(dir.path(), &["list", "--status", "completed"]).unwrap();
        invoke(dir.path(), &["show", "proc1"]).unwrap();
        invoke(dir.path(), &["history", "proc1"]).unwrap();
        invoke(dir.path(), &["stats"]).unwrap();
        invoke(dir.path(), &["old", "--days", "1"]).unwrap();
        assert!(store.exists("proc1").unwrap());
    }

    #[test]
    fn history_requires_per_record_backend() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from([
            "procstore",
            "--root",
            root.as_str(),
            "--backend",
            "whole-file",
            "history",
            "proc1",
        ])
        .unwrap();
        let err = run(cli).unwrap_err();
        assert!(err.to_string().contains("per-record"));
    }
}
