//! sqlcmd - run a single command through the command executor.

mod cli;

use cli::{Cli, CommandArgs, Mode, OutputFormat};
use sql_command_manager::config::{Config, ConnectionConfig};
use sql_command_manager::db::{Record, SqlxDriver, Value};
use sql_command_manager::error::{CommandError, Result};
use sql_command_manager::executor::{CommandExecutor, StoredProcedureSetup};
use sql_command_manager::logging;
use tracing::{error, info};

fn main() {
    dotenvy::dotenv().ok();
    logging::init_stderr_logging();

    if let Err(e) = run() {
        error!("{}: {}", e.category(), e);
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let connection = resolve_connection(&cli, &config)?.ok_or_else(|| {
        CommandError::config("No database connection configured. Use --help for usage information.")
    })?;
    info!("Connection: {}", connection.display_string());

    let mut executor = CommandExecutor::new(SqlxDriver::new()?, connection)?;
    if cli.procedure {
        executor = executor.with_setup(StoredProcedureSetup);
    }

    match &cli.mode {
        Mode::Scalar(args) => {
            let value: Value = executor.execute_scalar(&args.command, parameters(args)?)?;
            println!("{value}");
        }
        Mode::Exec(args) => {
            let code = executor.execute_non_query(&args.command, parameters(args)?)?;
            println!("{code}");
        }
        Mode::Query(args) => {
            let rows = executor.execute_reader(&args.command, parameters(args)?, |cursor| {
                cursor.collect_rows()
            })?;
            print_rows(&rows, cli.format)?;
        }
    }

    Ok(())
}

fn parameters(args: &CommandArgs) -> Result<Vec<sql_command_manager::command::Parameter>> {
    args.parameters().map_err(CommandError::config)
}

/// Resolves the connection with precedence: CLI string, named config
/// connection, default config connection. Environment defaults apply last.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(CommandError::config(format!(
                    "Connection '{}' not found in config file",
                    name
                )));
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}

fn print_rows(rows: &[Record], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if let Some(first) = rows.first() {
                let header: Vec<&str> = first.columns().iter().map(|c| c.name.as_str()).collect();
                println!("{}", header.join("\t"));
            }
            for row in rows {
                let cells: Vec<String> = row.values().iter().map(Value::to_display_string).collect();
                println!("{}", cells.join("\t"));
            }
        }
        OutputFormat::Json => {
            let objects: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    row.columns()
                        .iter()
                        .zip(row.values())
                        .map(|(column, value)| (column.name.clone(), value.to_json()))
                        .collect::<serde_json::Map<_, _>>()
                        .into()
                })
                .collect();
            let json = serde_json::to_string_pretty(&objects)
                .map_err(|e| CommandError::internal(format!("Failed to encode rows: {e}")))?;
            println!("{json}");
        }
    }
    Ok(())
}
