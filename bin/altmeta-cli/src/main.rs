//! AltMeta CLI - Admin Command Line Interface
//!
//! Creates the metadata tables and runs metadata verbs through a host
//! type's hook chain, so prefixed keys are routed exactly as they would
//! be for the host.

use altmeta_common::{Config, EntityId, MetaLookup, MetaRow, MetaValue, UpdateOutcome};
use altmeta_router::{HookChain, MetaRouter};
use altmeta_store::{MetaDatabase, MetaObserver, MetadataStore, TableRegistry, schema};
use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "altmeta-cli")]
#[command(about = "AltMeta Admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "ALTMETA_CONFIG")]
    config: Option<PathBuf>,

    /// Database file, overrides the configured storage path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log level, overrides the configured level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Entity whose metadata a verb works on
#[derive(ClapArgs, Debug)]
struct Target {
    /// Host type the call is issued against (e.g. post)
    #[arg(long)]
    host_type: String,

    /// Entity id
    #[arg(long)]
    entity: u64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create every configured table
    Install,
    /// Print the SQL definition of the configured tables
    Schema {
        /// Only this alternate type
        #[arg(long)]
        alternate_type: Option<String>,
    },
    /// Add a metadata value
    Add {
        #[command(flatten)]
        target: Target,
        /// Metadata key
        #[arg(long)]
        key: String,
        /// Value (JSON, or plain text)
        value: String,
        /// Refuse if the entity already has this key
        #[arg(long)]
        unique: bool,
    },
    /// Update a metadata value, adding it if missing
    Update {
        #[command(flatten)]
        target: Target,
        /// Metadata key
        #[arg(long)]
        key: String,
        /// New value (JSON, or plain text)
        value: String,
        /// Only rewrite rows holding this value
        #[arg(long)]
        prev: Option<String>,
    },
    /// Delete metadata values
    Delete {
        #[command(flatten)]
        target: Target,
        /// Metadata key
        #[arg(long)]
        key: String,
        /// Only delete rows holding this value
        #[arg(long)]
        value: Option<String>,
        /// Delete the key for every entity
        #[arg(long)]
        all: bool,
    },
    /// Read metadata values
    Get {
        #[command(flatten)]
        target: Target,
        /// Metadata key; omit to read every key of the entity
        #[arg(long, default_value = "")]
        key: String,
        /// Only the first value
        #[arg(long)]
        single: bool,
    },
    /// Permanently delete an entity's metadata, cascading into alternate tables
    DeleteEntity {
        #[command(flatten)]
        target: Target,
    },
}

/// Counts deleted rows per meta type
#[derive(Default)]
struct DeletionCounter {
    counts: Mutex<BTreeMap<String, usize>>,
}

impl MetaObserver for DeletionCounter {
    fn on_deleted(&self, meta_type: &str, _row: &MetaRow) {
        *self.counts.lock().entry(meta_type.to_string()).or_default() += 1;
    }
}

/// Host type's metadata API with every router configured for it
fn host_chain(config: &Config, db: &MetaDatabase, host_type: &str) -> Result<HookChain> {
    let default = db
        .store(host_type)
        .with_context(|| format!("host type '{host_type}' has no metadata table"))?;
    let mut chain = HookChain::new(Arc::new(default));
    for router in &config.routers {
        if router.host_type.as_deref() == Some(host_type) {
            debug!(
                "Routing {}_* keys of {} to {}",
                router.alternate_type, host_type, router.alternate_type
            );
            chain.add_hook(Arc::new(MetaRouter::open(router, db)?));
        }
    }
    Ok(chain)
}

fn parse_value(raw: &str) -> MetaValue {
    MetaValue::parse_lenient(raw)
}

fn lookup_to_json(lookup: MetaLookup) -> serde_json::Value {
    match lookup {
        MetaLookup::Single(value) => value.map_or(serde_json::Value::Null, MetaValue::into_json),
        MetaLookup::Values(values) => {
            serde_json::Value::Array(values.into_iter().map(MetaValue::into_json).collect())
        }
        MetaLookup::All(all) => serde_json::Value::Object(
            all.into_iter()
                .map(|(key, values)| {
                    let values = values.into_iter().map(MetaValue::into_json).collect();
                    (key, serde_json::Value::Array(values))
                })
                .collect(),
        ),
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(db) = args.db {
        config.storage.path = db;
    }
    let log_level = args
        .log_level
        .unwrap_or_else(|| config.logging.level.clone());

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let registry = TableRegistry::from_config(&config)?.install()?;

    if let Commands::Schema { alternate_type } = &args.command {
        match alternate_type {
            Some(alternate_type) => {
                let table = registry
                    .resolve(alternate_type)
                    .with_context(|| format!("unknown meta type '{alternate_type}'"))?;
                print!("{}", schema::create_table_sql(table));
            }
            None => print!("{}", schema::create_all_sql(registry)),
        }
        return Ok(());
    }

    let db = MetaDatabase::open(&config.storage.path, registry)
        .with_context(|| format!("Failed to open {}", config.storage.path.display()))?;

    match args.command {
        Commands::Schema { .. } => {}
        Commands::Install => {
            println!("Metadata tables in {}", config.storage.path.display());
            println!("{:<20} {:<30} {:<20}", "META TYPE", "TABLE", "ACCESSOR");
            println!("{}", "-".repeat(70));
            for table in db.registry().tables() {
                println!(
                    "{:<20} {:<30} {:<20}",
                    table.meta_type().as_str(),
                    table.name(),
                    table.accessor()
                );
            }
        }
        Commands::Add {
            target,
            key,
            value,
            unique,
        } => {
            let chain = host_chain(&config, &db, &target.host_type)?;
            match chain.add(EntityId::new(target.entity), &key, &parse_value(&value), unique)? {
                Some(meta_id) => println!("Added row {meta_id}"),
                None => println!("Not added: {key} already set on entity {}", target.entity),
            }
        }
        Commands::Update {
            target,
            key,
            value,
            prev,
        } => {
            let chain = host_chain(&config, &db, &target.host_type)?;
            let prev = prev.as_deref().map(parse_value);
            let outcome = chain.update(
                EntityId::new(target.entity),
                &key,
                &parse_value(&value),
                prev.as_ref(),
            )?;
            match outcome {
                UpdateOutcome::Inserted(meta_id) => println!("Added row {meta_id}"),
                UpdateOutcome::Updated(count) => println!("Updated {count} row(s)"),
                UpdateOutcome::Unchanged => println!("Unchanged"),
            }
        }
        Commands::Delete {
            target,
            key,
            value,
            all,
        } => {
            let chain = host_chain(&config, &db, &target.host_type)?;
            let value = value.as_deref().map(parse_value);
            let deleted = chain.delete(EntityId::new(target.entity), &key, value.as_ref(), all)?;
            println!("{}", if deleted { "Deleted" } else { "Nothing deleted" });
        }
        Commands::Get {
            target,
            key,
            single,
        } => {
            let chain = host_chain(&config, &db, &target.host_type)?;
            let lookup = chain.get(EntityId::new(target.entity), &key, single)?;
            println!("{}", serde_json::to_string_pretty(&lookup_to_json(lookup))?);
        }
        Commands::DeleteEntity { target } => {
            let counter = Arc::new(DeletionCounter::default());
            db.add_observer(Arc::clone(&counter) as Arc<dyn MetaObserver>);

            let chain = host_chain(&config, &db, &target.host_type)?;
            if !chain.permanently_delete(EntityId::new(target.entity))? {
                println!("Deletion of {} {} was aborted", target.host_type, target.entity);
                return Ok(());
            }

            let counts = counter.counts.lock();
            let total: usize = counts.values().sum();
            info!(
                "Deleted {} metadata rows of {} {}",
                total, target.host_type, target.entity
            );
            println!("Removed {total} row(s)");
            for (meta_type, count) in counts.iter() {
                println!("  {meta_type:<20} {count}");
            }
        }
    }

    Ok(())
}
