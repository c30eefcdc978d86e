use clap::Parser;
use dsh::cli::{self, ConnArgs, OutputArgs};
use dsh::core::db::Database;
use dsh::core::Result;
use dsh::output;
use dsh::process;
use std::io::{self, BufWriter};
use std::process::ExitCode;

/// Lists the database's live sessions.
#[derive(Parser, Debug)]
#[command(name = "dps", version, about, long_about)]
struct Cli {
    #[command(flatten)]
    conn: ConnArgs,
    #[command(flatten)]
    output: OutputArgs,
}

fn run(cli: &Cli, stdout: &mut dyn output::Sink) -> Result<()> {
    let mut db = cli.conn.open()?;
    let processes = db.query_processes()?;
    stdout.write(&process::processes_batch(&processes)?)
}

fn main() -> ExitCode {
    cli::init_logging();
    let cli = Cli::parse();

    let format = cli.output.format();
    let mut stdout = output::open(format, BufWriter::new(io::stdout()), Some("processes"));
    let mut stderr = output::open(format, io::stderr(), None);

    match run(&cli, stdout.as_mut()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => cli::report(&err, stderr.as_mut()),
    }
}
