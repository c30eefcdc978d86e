use clap::Parser;
use dsh::cli::{self, ConnArgs, OutputArgs};
use dsh::core::db::Database;
use dsh::core::Result;
use dsh::output::{self, OutputFormat, Sink, SqlMode, SqlSink};
use std::io::{self, BufWriter};
use std::process::ExitCode;

/// Lists tables, or the columns of one table, in the database.
///
/// With `--sql`, a column listing is written as a CREATE TABLE statement.
#[derive(Parser, Debug)]
#[command(name = "dls", version, about, long_about)]
struct Cli {
    #[command(flatten)]
    conn: ConnArgs,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(long, help = "Include system tables")]
    system: bool,
    #[arg(help = "Table whose columns to list")]
    table: Option<String>,
}

fn run(cli: &Cli, stdout: &mut dyn Sink) -> Result<()> {
    let mut db = cli.conn.open()?;
    let batch = match &cli.table {
        Some(table) => cli::columns_batch(&db.query_columns(table)?)?,
        None => cli::tables_batch(&db.query_tables()?, cli.system)?,
    };
    stdout.write(&batch)
}

fn main() -> ExitCode {
    cli::init_logging();
    let cli = Cli::parse();

    let format = cli.output.format();
    let writer = BufWriter::new(io::stdout());
    let mut stdout: Box<dyn Sink> = match (&cli.table, format) {
        (Some(table), OutputFormat::Sql) => {
            Box::new(SqlSink::new(writer, table.as_str()).with_mode(SqlMode::Schema))
        }
        _ => output::open(format, writer, Some("tables")),
    };
    let mut stderr = output::open(format, io::stderr(), None);

    match run(&cli, stdout.as_mut()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => cli::report(&err, stderr.as_mut()),
    }
}
