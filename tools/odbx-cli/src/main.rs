///
/// odbx CLI - Run SQL through the odbx engine
///
/// Opens a SQLite database through the reference driver and prints the
/// engine's answers:
/// - odbx query <sql> [-p value]...: run a statement, prepared when it has parameters
/// - odbx tables: list the tables of the database
/// - odbx columns <table>: list the columns of a table
/// - odbx info: print connection information
///
/// Logging goes to stderr; `--log` overrides the `log` entry of the
/// configuration file, which defaults to `warn`.
///

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use odbx::{
    ConnectOptions, Cursor, Engine, EngineConfig, HostType, OdbxError, ParamSpec, StatementOptions, Value,
};
use odbx_driver_sqlite::SqliteDriver;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "odbx")]
#[command(author, version, about = "Run SQL through the odbx engine", long_about = None)]
struct Cli {
    /// Database file (`:memory:` for a private in-memory database)
    #[arg(long, default_value = ":memory:")]
    db: String,

    /// Engine configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `odbx=debug`
    #[arg(long)]
    log: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one SQL statement
    Query {
        /// The statement
        sql: String,

        /// Parameter values, one per `?` marker
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Host types of the result columns, comma separated
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
    },

    /// List tables
    Tables,

    /// List the columns of a table
    Columns {
        /// Table name
        table: String,
    },

    /// Print connection information
    Info,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Output {
    Row { values: Vec<serde_json::Value> },
    Affected { count: i64 },
    Info { name: String, value: serde_json::Value },
}

fn main() {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error reading {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    init_logging(cli.log.as_deref().or(config.log.as_deref()).unwrap_or("warn"));

    if let Err(e) = run(&cli, config) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{}': {}", filter, e);
        EnvFilter::new("warn")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .init();
}

fn run(cli: &Cli, config: EngineConfig) -> Result<(), OdbxError> {
    let null = config.null.clone();
    let engine = Engine::new(Arc::new(SqliteDriver::default()), config);
    let conn = engine.connect(&cli.db, ConnectOptions::new())?;
    debug!(db = %cli.db, connection = %conn, "connected");

    match &cli.command {
        Commands::Query { sql, params, types } => {
            let types = types.iter().map(|t| t.parse::<HostType>()).collect::<Result<Vec<_>, _>>()?;
            let mut options = StatementOptions::new();
            if !types.is_empty() {
                options = options.types(types);
            }
            let cursor = if params.is_empty() {
                engine.query(conn, sql, options)?
            } else {
                let specs = vec![ParamSpec::default_spec(); params.len()];
                let stmt = engine.prepare(conn, sql, &specs, options)?;
                let values: Vec<Value> = params.iter().map(|p| parameter(p, &null)).collect();
                let cursor = engine.execute(stmt, &values)?;
                engine.free_statement(stmt)?;
                cursor
            };
            print_answers(cursor, cli.format)?;
        }
        Commands::Tables => print_answers(engine.tables(conn)?, cli.format)?,
        Commands::Columns { table } => print_answers(engine.columns(conn, table)?, cli.format)?,
        Commands::Info => {
            for (info, value) in engine.connection_infos(conn)? {
                emit(
                    cli.format,
                    &Output::Info {
                        name: info.name().to_string(),
                        value: to_json(&value),
                    },
                    || format!("{}: {}", info.name(), value),
                );
            }
        }
    }
    engine.disconnect(conn)
}

fn print_answers(cursor: Cursor, format: Format) -> Result<(), OdbxError> {
    for answer in cursor {
        let answer = answer?;
        let output = match &answer {
            odbx::Answer::Row { row, .. } => Output::Row {
                values: row.values().iter().map(to_json).collect(),
            },
            odbx::Answer::Affected(count) => Output::Affected { count: *count },
            odbx::Answer::All(items) => Output::Row {
                values: items.iter().map(to_json).collect(),
            },
        };
        emit(format, &output, || answer.to_value().to_string());
    }
    Ok(())
}

fn emit(format: Format, output: &Output, text: impl FnOnce() -> String) {
    match format {
        Format::Text => println!("{}", text()),
        Format::Json => match serde_json::to_string(output) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Error encoding output: {}", e),
        },
    }
}

/// A command-line parameter: integers and floats as numbers, the NULL atom
/// as given, anything else as an atom.
fn parameter(text: &str, null: &str) -> Value {
    if text == null {
        return Value::atom(null);
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        return Value::Float(f);
    }
    Value::atom(text)
}

fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Var(_) => Json::Null,
        Value::Atom(s) | Value::Str(s) => Json::String(s.to_string()),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Codes(_) => Json::String(value.text().unwrap_or_default()),
        Value::Blob(bytes) => Json::String(bytes.iter().map(|b| format!("{b:02x}")).collect()),
        Value::Date(d) => Json::String(d.to_string()),
        Value::Time(t) => Json::String(t.to_string()),
        Value::Timestamp(ts) => Json::String(ts.to_string()),
        Value::Compound(name, args) => serde_json::json!({
            "functor": name.to_string(),
            "args": args.iter().map(to_json).collect::<Vec<_>>(),
        }),
    }
}
