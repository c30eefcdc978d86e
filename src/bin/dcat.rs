use clap::Parser;
use dsh::cli::{self, ConnArgs, OutputArgs};
use dsh::core::Result;
use dsh::export::Exporter;
use dsh::output;
use std::io::{self, BufWriter};
use std::process::ExitCode;

/// Reads table data and writes it to the standard output in the desired
/// format.
///
/// Rows are fetched in chunks of 1000 so memory use does not grow with the
/// table. Single-shot formats (the default table, JSON) receive at most one
/// chunk; use CSV, JSON lines or SQL for complete dumps.
#[derive(Parser, Debug)]
#[command(name = "dcat", version, about, long_about)]
struct Cli {
    #[command(flatten)]
    conn: ConnArgs,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(long = "where", help = "WHERE clause")]
    filter: Option<String>,
    #[arg(help = "Table to read")]
    table: String,
}

fn run(cli: &Cli, stdout: &mut dyn output::Sink) -> Result<()> {
    let mut db = cli.conn.open()?;
    Exporter::new().export(&mut db, stdout, &cli.table, cli.filter.as_deref())?;
    Ok(())
}

fn main() -> ExitCode {
    cli::init_logging();
    let cli = Cli::parse();

    let format = cli.output.format();
    let mut stdout = output::open(format, BufWriter::new(io::stdout()), Some(&cli.table));
    let mut stderr = output::open(format, io::stderr(), None);

    match run(&cli, stdout.as_mut()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => cli::report(&err, stderr.as_mut()),
    }
}
