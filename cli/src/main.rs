use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use schema_adapter_db::{AdapterConfig, AdapterKind, AdapterOptions, DescriptorSet};
use schema_adapter_sqlite::SqliteAdapter;
use serde_json::{Value, json};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Bookkeeping table written by the migration engine.
const MIGRATIONS_TABLE: &str = "migrations";

#[derive(Debug, Parser)]
#[command(name = "schema-adapter")]
#[command(about = "Apply migration descriptors and inspect SQLite schemas")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Database file path; overrides the configured default adapter.
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Adapter configuration file (YAML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log every statement to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply descriptors from directories or JSON bundle files.
    Migrate(MigrateArgs),
    /// Show the recorded schema version of every migrated table.
    Status,
    /// Show the live columns of a table.
    Columns(TableArgs),
    /// Show the indexes of a table.
    Indexes(TableArgs),
    /// Hand out the next identity for an entity attribute.
    Identity(IdentityArgs),
    /// Run one SQL statement and print any rows it returns.
    Exec(ExecArgs),
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Descriptor directories or bundle files; defaults to the configured
    /// migration paths.
    paths: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct TableArgs {
    /// Table name.
    table: String,
}

#[derive(Debug, Args)]
struct IdentityArgs {
    /// Entity (table) the identity belongs to.
    entity: String,
    /// Attribute (column) the identity is handed out for.
    attribute: String,
}

#[derive(Debug, Args)]
struct ExecArgs {
    /// SQL text with `?` placeholders.
    sql: String,
    /// Positional parameters as a JSON array.
    #[arg(long)]
    params: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let config = match cli.global.config.as_deref().map(AdapterConfig::load).transpose() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: failed to load configuration: {err}");
            std::process::exit(1);
        }
    };
    init_tracing(cli.global.verbose, config.as_ref().and_then(|c| c.log_level.as_deref()));

    let result = open_adapter(&cli.global, config.as_ref()).and_then(|adapter| {
        match cli.command {
            Command::Migrate(args) => run_migrate(&adapter, args, config.as_ref()),
            Command::Status => run_status(&adapter),
            Command::Columns(args) => run_columns(&adapter, args),
            Command::Indexes(args) => run_indexes(&adapter, args),
            Command::Identity(args) => run_identity(&adapter, args),
            Command::Exec(args) => run_exec(&adapter, args),
        }
    });

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool, configured: Option<&str>) {
    let fallback = if verbose {
        "debug"
    } else {
        configured.unwrap_or("warn")
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Resolves the database: `--database` first, then the configured default
/// adapter, then a private in-memory database.
fn open_adapter(
    global: &GlobalArgs,
    config: Option<&AdapterConfig>,
) -> Result<SqliteAdapter, String> {
    let adapter = match (&global.database, config) {
        (Some(path), _) => SqliteAdapter::new(AdapterOptions::file(path)),
        (None, Some(config)) => {
            if let Some(entry) = config
                .default_adapter()
                .filter(|e| e.invariant_name == AdapterKind::Memory)
            {
                return Err(format!(
                    "adapter '{}' is a memory adapter; the CLI needs a sqlite database",
                    entry.name
                ));
            }
            SqliteAdapter::from_config(config).map_err(|e| format!("Invalid configuration: {e}"))?
        }
        (None, None) => SqliteAdapter::in_memory(),
    };
    debug!(database = %adapter.options().database, "adapter resolved");
    adapter
        .open()
        .map_err(|e| format!("Failed to open database: {e}"))?;
    Ok(adapter)
}

fn print_json(value: &Value) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to render output: {e}"))?;
    println!("{text}");
    Ok(())
}

// ---------------------------------------------------------------------------
// migrate command
// ---------------------------------------------------------------------------

fn load_descriptors(path: &Path) -> Result<DescriptorSet, String> {
    let set = if path.is_dir() {
        DescriptorSet::from_dir(path)
    } else {
        DescriptorSet::from_bundle(path)
    };
    set.map_err(|e| format!("Failed to load descriptors from '{}': {e}", path.display()))
}

fn run_migrate(
    adapter: &SqliteAdapter,
    args: MigrateArgs,
    config: Option<&AdapterConfig>,
) -> Result<(), String> {
    let paths = if args.paths.is_empty() {
        config.map(|c| c.migrations.clone()).unwrap_or_default()
    } else {
        args.paths
    };
    if paths.is_empty() {
        return Err("Specify at least one descriptor path or configure `migrations`".to_string());
    }

    let mut applied = Vec::new();
    for path in &paths {
        let set = load_descriptors(path)?;
        for descriptor in set.iter() {
            let outcome = adapter.migrate(descriptor).map_err(|e| {
                format!(
                    "Migration of {} to {} failed: {e}",
                    descriptor.applies_to,
                    descriptor.version.as_str()
                )
            })?;
            applied.push(json!({
                "table": descriptor.applies_to,
                "version": descriptor.version.as_str(),
                "outcome": format!("{outcome:?}"),
            }));
        }
    }
    print_json(&Value::Array(applied))
}

// ---------------------------------------------------------------------------
// inspection commands
// ---------------------------------------------------------------------------

fn run_status(adapter: &SqliteAdapter) -> Result<(), String> {
    let recorded = adapter
        .table_exists(MIGRATIONS_TABLE)
        .map_err(|e| format!("Failed to read status: {e}"))?;
    if !recorded {
        return print_json(&json!([]));
    }

    let rows = adapter
        .execute(
            r#"SELECT DISTINCT "appliesTo" FROM "migrations" ORDER BY "appliesTo""#,
            &[],
        )
        .map_err(|e| format!("Failed to read status: {e}"))?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(table) = row.get("appliesTo").and_then(Value::as_str) else {
            continue;
        };
        let version = adapter
            .table_version(table)
            .map_err(|e| format!("Failed to read version of {table}: {e}"))?;
        let exists = adapter
            .table_exists(table)
            .map_err(|e| format!("Failed to inspect {table}: {e}"))?;
        tables.push(json!({
            "table": table,
            "version": version.as_str(),
            "exists": exists,
        }));
    }
    print_json(&Value::Array(tables))
}

fn run_columns(adapter: &SqliteAdapter, args: TableArgs) -> Result<(), String> {
    let columns = adapter
        .table_columns(&args.table)
        .map_err(|e| format!("Failed to read columns of {}: {e}", args.table))?;
    if columns.is_empty() {
        return Err(format!("Table '{}' does not exist", args.table));
    }
    let value = serde_json::to_value(&columns).map_err(|e| e.to_string())?;
    print_json(&value)
}

fn run_indexes(adapter: &SqliteAdapter, args: TableArgs) -> Result<(), String> {
    let indexes = adapter
        .index_list(&args.table)
        .map_err(|e| format!("Failed to read indexes of {}: {e}", args.table))?;
    let value = serde_json::to_value(&indexes).map_err(|e| e.to_string())?;
    print_json(&value)
}

fn run_identity(adapter: &SqliteAdapter, args: IdentityArgs) -> Result<(), String> {
    let value = adapter
        .select_identity(&args.entity, &args.attribute)
        .map_err(|e| format!("Failed to select identity: {e}"))?;
    print_json(&json!({
        "entity": args.entity,
        "attribute": args.attribute,
        "value": value,
    }))
}

fn parse_params(raw: Option<&str>) -> Result<Vec<Value>, String> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(_) => Err("--params must be a JSON array".to_string()),
            Err(e) => Err(format!("--params is not valid JSON: {e}")),
        },
    }
}

fn run_exec(adapter: &SqliteAdapter, args: ExecArgs) -> Result<(), String> {
    let params = parse_params(args.params.as_deref())?;
    let rows = adapter
        .execute(&args.sql, &params)
        .map_err(|e| format!("Statement failed: {e}"))?;
    let rows: Vec<Value> = rows.into_iter().map(Value::Object).collect();
    print_json(&Value::Array(rows))
}
