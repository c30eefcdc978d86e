use clap::{ArgGroup, Parser};
use dsh::cli::{self, ConnArgs};
use dsh::core::db::Database;
use dsh::core::Result;
use dsh::output::{self, OutputFormat};
use dsh::process::{self, ProcessMatcher};
use std::io::{self, BufWriter};
use std::process::ExitCode;

/// Kills database sessions, selected by the flag and argument provided.
///
/// Without a selector flag the argument is a PID. One status line is written
/// per targeted session.
#[derive(Parser, Debug)]
#[command(name = "dkill", version, about, long_about)]
#[command(group(ArgGroup::new("selector").args(["pid", "exceed", "query", "user", "db"])))]
struct Cli {
    #[command(flatten)]
    conn: ConnArgs,
    #[arg(long, help = "Terminate the session instead of cancelling its statement")]
    force: bool,
    #[arg(long, help = "Kill a process by PID (default)")]
    pid: bool,
    #[arg(long, help = "Kill all processes running longer than a duration (e.g. 90s, 1m30s)")]
    exceed: bool,
    #[arg(long, help = "Kill all processes whose query matches a regex")]
    query: bool,
    #[arg(long, help = "Kill all processes of a user")]
    user: bool,
    #[arg(long, help = "Kill all processes on a database")]
    db: bool,
    #[arg(value_name = "PID|DURATION|QUERY|USERNAME|DATABASE")]
    target: String,
}

impl Cli {
    fn matcher(&self) -> Result<ProcessMatcher> {
        let target = self.target.as_str();
        Ok(if self.exceed {
            ProcessMatcher::Exceeds(process::parse_duration(target)?)
        } else if self.query {
            ProcessMatcher::Query(process::parse_pattern(target)?)
        } else if self.user {
            ProcessMatcher::User(target.to_string())
        } else if self.db {
            ProcessMatcher::Database(target.to_string())
        } else {
            ProcessMatcher::Pid(process::parse_pid(target)?)
        })
    }
}

fn run(cli: &Cli, stdout: &mut dyn output::Sink) -> Result<()> {
    let matcher = cli.matcher()?;
    let mut db = cli.conn.open()?;
    let processes = db.query_processes()?;
    let statuses = process::kill_matching(&mut db, &processes, &matcher, cli.force);
    stdout.write(&process::kill_report_batch(&statuses)?)
}

fn main() -> ExitCode {
    cli::init_logging();
    let cli = Cli::parse();

    let mut stdout = output::open(OutputFormat::Table, BufWriter::new(io::stdout()), None);
    let mut stderr = output::open(OutputFormat::Table, io::stderr(), None);

    match run(&cli, stdout.as_mut()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => cli::report(&err, stderr.as_mut()),
    }
}
