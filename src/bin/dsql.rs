use clap::Parser;
use dsh::cli::{self, ConnArgs, OutputArgs};
use dsh::core::db::Database;
use dsh::core::Result;
use dsh::output;
use std::io::{self, BufWriter};
use std::process::ExitCode;

/// Executes a SQL statement and writes the result to the standard output in
/// the desired format.
///
/// The statement can be given as arguments or piped in on STDIN. On SQLite a
/// script of several statements runs in order and the last one's rows are
/// printed. The whole
/// result is held in memory; use dcat to dump large tables.
#[derive(Parser, Debug)]
#[command(name = "dsql", version, about, long_about)]
struct Cli {
    #[command(flatten)]
    conn: ConnArgs,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(help = "SQL statement (read from STDIN when omitted)")]
    statement: Vec<String>,
}

fn run(cli: &Cli, stdout: &mut dyn output::Sink) -> Result<()> {
    let statement = cli::statement_from(&cli.statement, io::stdin())?;
    let mut db = cli.conn.open()?;
    let batch = db.query_data(&statement)?;
    stdout.write(&batch)
}

fn main() -> ExitCode {
    cli::init_logging();
    let cli = Cli::parse();

    let format = cli.output.format();
    let mut stdout = output::open(format, BufWriter::new(io::stdout()), Some("data"));
    let mut stderr = output::open(format, io::stderr(), None);

    match run(&cli, stdout.as_mut()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => cli::report(&err, stderr.as_mut()),
    }
}
