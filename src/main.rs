use std::{path::Path, sync::Arc, time::Duration};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use vaultbrief::{
    ConfigDb,
    ContextRetriever,
    DataDir,
    Error,
    Meeting,
    ReadOutcome,
    Result,
    VaultManager,
    cli::{Cli, Command, ConfigAction, ContextArgs, SearchArgs},
    config_db::keys,
    indexer::IndexReport,
};

/// Settings that `config set` accepts. The vault path is managed by
/// `connect` and `disconnect`.
const SETTABLE_KEYS: &[&str] = &[
    keys::MAX_RESULTS,
    keys::MIN_RELEVANCE_SCORE,
    keys::SNIPPET_LENGTH,
    keys::WEIGHTS,
];

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("VAULTBRIEF_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = Arc::new(ConfigDb::open(&data_dir.config_db())?);
    let mut manager = VaultManager::new(config_db.clone())?;

    match cli.command {
        Command::Connect { path } => {
            let report = manager.connect(&path).await?;
            print_report(&report);
        }
        Command::Disconnect => {
            manager.disconnect().await?;
            println!("Vault disconnected");
        }
        Command::Status(args) => {
            if manager.restore().await?.is_none() {
                tracing::debug!("no vault configured");
            }
            let status = manager.status()?;
            if args.json {
                println!("{}", to_json(&status)?);
            } else {
                println!("Data directory: {}", data_dir.root().display());
                println!("State: {}", status.state);
                match &status.root {
                    Some(root) => println!("Vault: {}", root.display()),
                    None => println!("Vault: (none)"),
                }
                println!("Documents: {}", status.documents);
            }
        }
        Command::Search(args) => {
            require_vault(&mut manager).await?;
            cmd_search(&manager, &args)?;
        }
        Command::Context(args) => {
            require_vault(&mut manager).await?;
            cmd_context(&config_db, &manager, args)?;
        }
        Command::Watch { path } => {
            let report = match path {
                Some(path) => manager.connect(&path).await?,
                None => require_vault(&mut manager).await?,
            };
            print_report(&report);
            cmd_watch(&manager).await?;
        }
        Command::Read { path } => {
            require_vault(&mut manager).await?;
            cmd_read(&manager, &path).await?;
        }
        Command::Config { action } => cmd_config(&config_db, action)?,
    }

    Ok(())
}

async fn require_vault(manager: &mut VaultManager) -> Result<IndexReport> {
    manager.restore().await?.ok_or(Error::NotConnected)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::Config(e.to_string()))
}

fn print_report(report: &IndexReport) {
    println!("Indexed {} notes", report.indexed);
    if !report.failures.is_empty() {
        eprintln!("Skipped {} notes:", report.failures.len());
        for failure in &report.failures {
            eprintln!("  {}: {}", failure.path.display(), failure.reason);
        }
    }
}

fn cmd_search(manager: &VaultManager, args: &SearchArgs) -> Result<()> {
    let hits = manager.handle().search(&args.query, args.count)?;

    if args.json {
        let rows: Vec<_> = hits
            .iter()
            .map(|h| {
                serde_json::json!({
                    "path": h.file.path,
                    "title": h.file.title,
                    "score": h.score,
                })
            })
            .collect();
        println!("{}", to_json(&rows)?);
    } else if hits.is_empty() {
        println!("No results.");
    } else {
        for (rank, hit) in hits.iter().enumerate() {
            println!(
                "{:>2}. {:.3}  {}  ({})",
                rank + 1,
                hit.score,
                hit.file.title,
                hit.file.path.display()
            );
        }
    }
    Ok(())
}

fn cmd_context(config_db: &ConfigDb, manager: &VaultManager, args: ContextArgs) -> Result<()> {
    let mut config = config_db.retrieval_config()?;
    if let Some(count) = args.count {
        config.max_results = count;
    }
    if let Some(min_score) = args.min_score {
        config.min_relevance_score = min_score;
    }

    let meeting = Meeting {
        title: args.title,
        description: args.description,
        location: args.location,
        attendees: args.attendees,
        ..Meeting::default()
    };

    let result = ContextRetriever::new(manager.handle(), config).find_relevant_context(&meeting);

    if args.json {
        println!("{}", to_json(&result)?);
        return Ok(());
    }

    if result.matches.is_empty() {
        println!("No relevant notes.");
        return Ok(());
    }
    for m in &result.matches {
        let fields: Vec<String> = m.matched_fields.iter().map(|f| f.to_string()).collect();
        println!(
            "{:.2}  {}  ({})  [{}]",
            m.relevance_score,
            m.title,
            m.path.display(),
            fields.join(", ")
        );
        for snippet in &m.snippets {
            println!("      > {snippet}");
        }
    }
    println!(
        "{} of {} matches in {} ms",
        result.matches.len(),
        result.total_matches,
        result.search_time_ms
    );
    Ok(())
}

async fn cmd_watch(manager: &VaultManager) -> Result<()> {
    println!("Watching for changes (Ctrl-C to stop)");
    let mut last = manager.status()?.documents;
    let mut ticker = tokio::time::interval(Duration::from_secs(2));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let documents = manager.status()?.documents;
                if documents != last {
                    println!("Index now holds {documents} notes");
                    last = documents;
                }
            }
        }
    }
    Ok(())
}

async fn cmd_read(manager: &VaultManager, path: &Path) -> Result<()> {
    match manager.read_file(path).await? {
        ReadOutcome::Found(text) => {
            print!("{text}");
            Ok(())
        }
        ReadOutcome::Missing { rescan_triggered } => {
            if rescan_triggered {
                eprintln!("File is gone; the vault was rescanned.");
            }
            Err(Error::NotFound {
                kind: "note",
                name: path.display().to_string(),
            })
        }
    }
}

fn cmd_config(config_db: &ConfigDb, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Get { key } => match config_db.get_setting(&key)? {
            Some(value) => println!("{value}"),
            None => {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key,
                });
            }
        },
        ConfigAction::Set { key, value } => {
            if !SETTABLE_KEYS.contains(&key.as_str()) {
                return Err(Error::Config(format!(
                    "unknown setting '{key}' (expected one of: {})",
                    SETTABLE_KEYS.join(", ")
                )));
            }
            let previous = config_db.get_setting(&key)?;
            config_db.set_setting(&key, &value)?;
            if let Err(e) = config_db.retrieval_config() {
                match previous {
                    Some(old) => config_db.set_setting(&key, &old)?,
                    None => {
                        config_db.remove_setting(&key)?;
                    }
                }
                return Err(e);
            }
            println!("{key} = {value}");
        }
        ConfigAction::Unset { key } => {
            if !config_db.remove_setting(&key)? {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key,
                });
            }
            println!("Removed {key}");
        }
        ConfigAction::List { json } => {
            let settings = config_db.list_settings()?;
            if json {
                let map: serde_json::Map<String, serde_json::Value> = settings
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                println!("{}", to_json(&map)?);
            } else if settings.is_empty() {
                println!("No settings stored.");
            } else {
                for (key, value) in &settings {
                    println!("{key}\t{value}");
                }
            }
        }
    }
    Ok(())
}
