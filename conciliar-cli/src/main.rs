use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use conciliar_core::{
    Associate, BlobStore, CounterpartyEntity, CounterpartyKind, MERGED_STATEMENT, OtherParty, RecordStore,
    StoredRecord, Student, format_br_amount,
};
use conciliar_finance::{
    CategorySession, Identifier, Merger, confidence_of, publish_records, summarize, write_csv,
};
use conciliar_ingest::{StatementParser, statement_file_name, strip_excluded_lines};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

mod config;
mod fs_store;
mod logging;
mod remote;
mod state;

use config::{Backend, Config};

#[derive(Parser, Debug)]
#[command(
    name = "conciliar",
    version = env!("CONCILIAR_VERSION"),
    about = "Bank statement parsing and reconciliation"
)]
struct Cli {
    /// Debug logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload statement exports, named DD_MM_YYYY.txt from their first movement
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Overwrite a stored statement with the same name
        #[arg(long)]
        replace: bool,
    },

    /// List stored statement files
    List,

    /// Parse a stored statement and print its movements
    Show { name: String },

    /// Delete stored statement files
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Merge every stored statement into Extratos.txt and publish new records
    Merge {
        /// Only write Extratos.txt; leave the record table untouched
        #[arg(long)]
        no_publish: bool,
    },

    /// List published records
    Records {
        /// Only records without an identification
        #[arg(long)]
        unidentified: bool,
    },

    /// Show suggestions for unidentified records
    Suggest,

    /// Attach a registry entry to a record and remember it
    Identify {
        /// Record id (see `conciliar records`)
        record: String,

        #[arg(long)]
        kind: CounterpartyKind,

        /// Registry entry id
        #[arg(long)]
        entity: String,
    },

    /// Confirm every High-confidence suggestion
    AutoIdentify,

    /// Students, associates and other counterparties
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },

    /// Narration category labels
    Category {
        #[command(subcommand)]
        command: CategoryCommand,
    },

    /// Credits and debits per category over the merged statement
    Summary {
        /// Also write the summary as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Manage ~/.conciliar/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum RegistryCommand {
    Add {
        #[arg(long)]
        kind: CounterpartyKind,

        #[arg(long)]
        name: String,

        /// CPF (students) or CPF/CNPJ (others)
        #[arg(long)]
        tax_id: Option<String>,

        /// Category label, required for `other`
        #[arg(long)]
        label: Option<String>,

        /// Associate status
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    /// Map a narration (verbatim, trimmed) to a label
    Assign { narration: String, label: String },
    Add { label: String },
    Remove { label: String },
    List,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Init,
    Show,
}

struct Stores {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
}

async fn open_stores(cfg: &Config) -> Result<Stores> {
    match cfg.storage.backend {
        Backend::Local => {
            let root = cfg.storage.data_dir()?;
            let blobs = fs_store::LocalBlobStore::new(root.join("statements"))
                .await
                .with_context(|| format!("open {}", root.display()))?;
            let records = fs_store::JsonRecordStore::new(root.join("tables"))
                .await
                .with_context(|| format!("open {}", root.display()))?;
            Ok(Stores { blobs: Arc::new(blobs), records: Arc::new(records) })
        }
        Backend::Remote => {
            let (url, key) = cfg.storage.remote_credentials()?;
            let blobs = remote::RemoteBlobStore::new(&url, &key, &cfg.storage.bucket)?;
            let records = remote::RemoteRecordStore::new(&url, &key)?;
            Ok(Stores { blobs: Arc::new(blobs), records: Arc::new(records) })
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config()?;
    logging::init(&cfg.general.log_level, cli.verbose);

    match cli.command {
        Command::Config { command } => config_command(command, &cfg)?,
        command => {
            let stores = open_stores(&cfg).await?;
            run(command, &cfg, &stores).await?;
        }
    }

    Ok(())
}

async fn run(command: Command, cfg: &Config, stores: &Stores) -> Result<()> {
    let tz = cfg.timezone()?;
    match command {
        Command::Upload { files, replace } => upload(cfg, stores, &files, replace).await?,

        Command::List => {
            let entries = stores.blobs.list().await.context("list statements")?;
            for e in &entries {
                println!("{}  {}", e.created_at.with_timezone(&tz).format("%d/%m/%Y %H:%M"), e.name);
            }
            println!("{} file(s)", entries.len());
        }

        Command::Show { name } => {
            let bytes = stores
                .blobs
                .download(&name)
                .await
                .with_context(|| format!("download {name}"))?;
            let parser = StatementParser::new(cfg.parser.options())?;
            let records = parser.parse(&String::from_utf8_lossy(&bytes));
            for r in &records {
                println!(
                    "{}  {} {:>12}  {}{}",
                    r.movement_date,
                    r.direction.letter(),
                    r.amount,
                    r.narration,
                    r.tax_id.as_deref().map(|t| format!("  [{t}]")).unwrap_or_default()
                );
            }
            println!("{} movement(s)", records.len());
        }

        Command::Delete { names } => {
            stores.blobs.remove(&names).await.context("delete statements")?;
            println!("Deleted {} file(s)", names.len());
        }

        Command::Merge { no_publish } => {
            let merger = Merger::new(StatementParser::new(cfg.parser.options())?);
            let output = merger
                .merge_store(stores.blobs.as_ref(), now_local(tz))
                .await
                .context("merge statements")?;
            println!("{} unique movement(s) written to {MERGED_STATEMENT}", output.records.len());
            if !no_publish {
                let report = publish_records(stores.records.as_ref(), &output.records, MERGED_STATEMENT)
                    .await
                    .context("publish records")?;
                println!("Published {} new record(s), {} already stored", report.inserted, report.skipped);
            }
        }

        Command::Records { unidentified } => {
            let identifier = identifier(cfg, stores)?;
            let records = identifier.load_records().await.context("load records")?;
            let mut shown = 0;
            for r in records.iter().filter(|r| !unidentified || !r.is_identified()) {
                print_record(r);
                shown += 1;
            }
            println!("{shown} record(s)");
        }

        Command::Suggest => {
            let identifier = identifier(cfg, stores)?;
            let (registry, history, records) = tokio::try_join!(
                identifier.load_registry(),
                identifier.load_history(),
                identifier.load_records()
            )?;
            for r in records.iter().filter(|r| !r.is_identified()) {
                let suggestion = identifier.suggest(r, &registry, &history);
                match &suggestion {
                    Some(s) => println!(
                        "{}  {:?}  {} {} ({})  <- {}",
                        r.id, s.confidence, s.kind, s.entity_id, s.entity_name, s.reason
                    ),
                    None => println!("{}  {:?}  {}", r.id, confidence_of(None), r.record.narration),
                }
            }
        }

        Command::Identify { record, kind, entity } => {
            let identifier = identifier(cfg, stores)?;
            let (registry, records) = tokio::try_join!(identifier.load_registry(), identifier.load_records())?;
            let row = records
                .iter()
                .find(|r| r.id == record)
                .ok_or_else(|| anyhow!("no record with id {record}"))?;
            let target = registry
                .find(kind, &entity)
                .ok_or_else(|| anyhow!("no {kind} with id {entity}"))?;
            let learned = identifier
                .identify(row, kind, target.id(), target.name())
                .await
                .with_context(|| format!("identify {record}"))?;
            println!("{record} -> {kind} {} ({})", target.id(), target.name());
            if learned.is_empty() {
                println!("Nothing to learn from this record (no tax id or narration)");
            }
        }

        Command::AutoIdentify => {
            let report = identifier(cfg, stores)?
                .auto_identify_all()
                .await
                .context("auto-identify")?;
            println!("Identified {} record(s); {} left for review", report.identified, report.skipped);
            for (id, err) in &report.failures {
                println!("  failed {id}: {err}");
            }
        }

        Command::Registry { command } => registry(cfg, stores, command).await?,

        Command::Category { command } => {
            let mut session = CategorySession::load(stores.blobs.clone(), cfg.categories.label_removal)
                .await
                .context("load category metadata")?;
            match command {
                CategoryCommand::Assign { narration, label } => {
                    session.assign(&narration, &label).await?;
                    println!("{} -> {}", narration.trim(), label.trim());
                }
                CategoryCommand::Add { label } => {
                    if !session.add_option(&label).await? {
                        println!("{} already exists", label.trim());
                    }
                }
                CategoryCommand::Remove { label } => {
                    if !session.remove_option(&label).await? {
                        println!("{} was not a category", label.trim());
                    }
                }
                CategoryCommand::List => {
                    for option in &session.metadata().options {
                        let mapped = session.metadata().mappings.values().filter(|l| *l == option).count();
                        println!("{option}  ({mapped} narration(s))");
                    }
                }
            }
        }

        Command::Summary { csv } => {
            let bytes = match stores.blobs.download(MERGED_STATEMENT).await {
                Ok(bytes) => bytes,
                Err(e) if e.is_not_found() => bail!("{MERGED_STATEMENT} not found. Run: conciliar merge"),
                Err(e) => return Err(e).context("download merged statement"),
            };
            let parser = StatementParser::new(cfg.parser.options())?;
            let records = parser.parse(&String::from_utf8_lossy(&bytes));
            let session = CategorySession::load(stores.blobs.clone(), cfg.categories.label_removal)
                .await
                .context("load category metadata")?;
            let summary = summarize(&records, session.metadata());

            for row in &summary.rows {
                println!(
                    "{:<30} {:>14} {:>14} {:>14}  ({})",
                    row.category,
                    format_br_amount(row.credits),
                    format_br_amount(row.debits),
                    format_br_amount(row.net),
                    row.count
                );
            }
            println!(
                "{:<30} {:>14} {:>14} {:>14}",
                "Total",
                format_br_amount(summary.total_credits),
                format_br_amount(summary.total_debits),
                format_br_amount(summary.net)
            );

            if let Some(path) = csv {
                let file = std::fs::File::create(&path).with_context(|| format!("create {}", path.display()))?;
                write_csv(&summary, file).with_context(|| format!("write {}", path.display()))?;
                println!("Wrote {}", path.display());
            }
        }

        Command::Config { command } => config_command(command, cfg)?,
    }
    Ok(())
}

fn config_command(command: ConfigCommand, cfg: &Config) -> Result<()> {
    match command {
        ConfigCommand::Init => config::init_config()?,
        ConfigCommand::Show => {
            println!("# {}", config::config_path()?.display());
            print!("{}", toml::to_string_pretty(cfg).context("serialize config")?);
        }
    }
    Ok(())
}

fn identifier(cfg: &Config, stores: &Stores) -> Result<Identifier> {
    Ok(Identifier::with_matcher(stores.records.clone(), cfg.matcher.narration_matcher()?))
}

fn now_local(tz: Tz) -> NaiveDateTime {
    Utc::now().with_timezone(&tz).naive_local()
}

/// Uploads each file independently; failures are reported and do not stop the batch.
async fn upload(cfg: &Config, stores: &Stores, files: &[PathBuf], replace: bool) -> Result<()> {
    let parser = StatementParser::new(cfg.parser.options())?;
    let mut failures = Vec::new();

    for path in files {
        let result = async {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("read {}", path.display()))?;
            let text = strip_excluded_lines(&String::from_utf8_lossy(&bytes));
            let name = statement_file_name(&parser, &text)?;
            stores.blobs.upload(&name, text.into_bytes(), replace).await?;
            Ok::<_, anyhow::Error>(name)
        }
        .await;

        match result {
            Ok(name) => {
                info!(file = %path.display(), name = %name, "uploaded statement");
                println!("{} -> {name}", path.display());
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "upload failed");
                failures.push(format!("{}: {e:#}", path.display()));
            }
        }
    }

    if !failures.is_empty() {
        for f in &failures {
            eprintln!("  {f}");
        }
        bail!("{} of {} upload(s) failed", failures.len(), files.len());
    }
    Ok(())
}

async fn registry(cfg: &Config, stores: &Stores, command: RegistryCommand) -> Result<()> {
    let identifier = identifier(cfg, stores)?;
    match command {
        RegistryCommand::Add { kind, name, tax_id, label, status, email, notes } => {
            let entity = match kind {
                CounterpartyKind::Student => CounterpartyEntity::Student(Student {
                    name,
                    tax_id,
                    email,
                    ..Default::default()
                }),
                CounterpartyKind::Associate => CounterpartyEntity::Associate(Associate {
                    name,
                    status,
                    notes,
                    ..Default::default()
                }),
                CounterpartyKind::Other => CounterpartyEntity::Other(OtherParty {
                    name,
                    kind: label.unwrap_or_default(),
                    tax_id,
                    notes,
                    ..Default::default()
                }),
            };
            let stored = identifier.register(entity).await?;
            println!("Added {} {} ({})", stored.kind(), stored.id(), stored.name());
        }
        RegistryCommand::List => {
            let registry = identifier.load_registry().await.context("load registry")?;
            for e in registry.iter() {
                println!(
                    "{:<10} {:<20} {}{}",
                    e.kind().as_str(),
                    e.id(),
                    e.name(),
                    e.tax_id_digits().map(|d| format!("  [{d}]")).unwrap_or_default()
                );
            }
            println!("{} entr(ies)", registry.len());
        }
    }
    Ok(())
}

fn print_record(r: &StoredRecord) {
    let who = r
        .identification
        .as_ref()
        .map(|i| format!("{} {} ({})", i.kind, i.entity_id, i.entity_name))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<24} {}  {} {:>12}  {}  => {}",
        r.id,
        r.record.movement_date,
        r.record.direction.letter(),
        r.record.amount,
        r.record.narration,
        who
    );
}
