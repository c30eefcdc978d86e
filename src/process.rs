/// Process Administration Module
///
/// Selects live sessions by pid, elapsed time, query pattern, user, or
/// database, kills them one by one, and reports one status per target.
/// A failed kill is reported and the remaining targets are still attempted.

use crate::core::db::{Database, Process, RecordBatch, Value};
use crate::core::{DshError, Result};
use regex::Regex;
use std::time::Duration;
use tracing::{info, warn};

/// Which sessions to target.
#[derive(Debug, Clone)]
pub enum ProcessMatcher {
    Pid(i64),
    /// Sessions busy for strictly longer than the duration
    Exceeds(Duration),
    Query(Regex),
    User(String),
    Database(String),
}

impl ProcessMatcher {
    pub fn matches(&self, process: &Process) -> bool {
        match self {
            ProcessMatcher::Pid(pid) => process.pid == *pid,
            ProcessMatcher::Exceeds(limit) => process.duration > *limit,
            ProcessMatcher::Query(pattern) => pattern.is_match(&process.query),
            ProcessMatcher::User(user) => process.username == *user,
            ProcessMatcher::Database(db) => process.database == *db,
        }
    }
}

pub fn parse_pid(input: &str) -> Result<i64> {
    input
        .trim()
        .parse()
        .map_err(|_| DshError::Usage(format!("provided PID is not a number: '{input}'")))
}

pub fn parse_pattern(input: &str) -> Result<Regex> {
    Regex::new(input).map_err(|e| DshError::Usage(format!("invalid query pattern: {e}")))
}

fn invalid_duration(input: &str) -> DshError {
    DshError::Usage(format!(
        "invalid duration '{input}': use numbers with ms|s|m|h (e.g. 90s, 1m30s)"
    ))
}

/// Parses durations such as `500ms`, `90s`, `1m30s` or `2h`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid_duration(input));
    }
    let mut millis: u64 = 0;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (num_str, tail) = rest.split_at(digits);
        let unit_len = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        if num_str.is_empty() || unit.is_empty() {
            return Err(invalid_duration(input));
        }
        let value: u64 = num_str.parse().map_err(|_| invalid_duration(input))?;
        let part = match unit {
            "ms" => value,
            "s" => value.saturating_mul(1_000),
            "m" => value.saturating_mul(60_000),
            "h" => value.saturating_mul(3_600_000),
            _ => return Err(invalid_duration(input)),
        };
        millis = millis.saturating_add(part);
        rest = next;
    }
    Ok(Duration::from_millis(millis))
}

/// Renders a duration in the form `parse_duration` accepts, e.g. `1h2m3s`.
/// Sub-second durations are shown in milliseconds.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return format!("{}ms", duration.as_millis());
    }
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{h}h"));
    }
    if m > 0 {
        out.push_str(&format!("{m}m"));
    }
    if s > 0 || out.is_empty() {
        out.push_str(&format!("{s}s"));
    }
    out
}

/// Outcome of one kill attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillStatus {
    pub pid: i64,
    /// Error text, or `None` when the kill succeeded
    pub error: Option<String>,
}

impl KillStatus {
    pub fn status(&self) -> &str {
        self.error.as_deref().unwrap_or("Killed")
    }
}

/// Kills every process in `processes` that `matcher` selects.
///
/// A pid matcher that selects nothing yields a single "not found" status.
pub fn kill_matching<D: Database + ?Sized>(
    db: &mut D,
    processes: &[Process],
    matcher: &ProcessMatcher,
    force: bool,
) -> Vec<KillStatus> {
    let mut statuses: Vec<KillStatus> = processes
        .iter()
        .filter(|p| matcher.matches(p))
        .map(|p| {
            let error = match db.kill_process(p.pid, force) {
                Ok(()) => {
                    info!(pid = p.pid, force, "Killed process");
                    None
                }
                Err(err) => {
                    warn!(pid = p.pid, error = %err, "Failed to kill process");
                    Some(err.to_string())
                }
            };
            KillStatus { pid: p.pid, error }
        })
        .collect();

    if let (ProcessMatcher::Pid(pid), true) = (matcher, statuses.is_empty()) {
        statuses.push(KillStatus {
            pid: *pid,
            error: Some(DshError::ProcessNotFound(*pid).to_string()),
        });
    }
    statuses
}

fn batch(columns: &[&str], rows: Vec<Vec<Value>>) -> Result<RecordBatch> {
    RecordBatch::from_rows(columns.iter().map(|c| c.to_string()).collect(), rows)
}

/// Session listing as `PID, DURATION, USERNAME, DATABASE, QUERY`.
pub fn processes_batch(processes: &[Process]) -> Result<RecordBatch> {
    batch(
        &["PID", "DURATION", "USERNAME", "DATABASE", "QUERY"],
        processes
            .iter()
            .map(|p| {
                vec![
                    Value::Int(p.pid),
                    Value::Text(format_duration(p.duration)),
                    Value::Text(p.username.clone()),
                    Value::Text(p.database.clone()),
                    Value::Text(p.query.clone()),
                ]
            })
            .collect(),
    )
}

/// Kill report as `PID, STATUS`.
pub fn kill_report_batch(statuses: &[KillStatus]) -> Result<RecordBatch> {
    batch(
        &["PID", "STATUS"],
        statuses
            .iter()
            .map(|s| vec![Value::Int(s.pid), Value::Text(s.status().to_string())])
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::{Column, Engine, Table};

    /// Sessions held in memory; killing pid 13 always fails.
    struct FakeServer {
        killed: Vec<(i64, bool)>,
    }

    impl Database for FakeServer {
        fn engine(&self) -> Engine {
            Engine::Postgres
        }

        fn query_data(&mut self, _sql: &str) -> Result<RecordBatch> {
            Ok(RecordBatch::default())
        }

        fn query_tables(&mut self) -> Result<Vec<Table>> {
            Ok(Vec::new())
        }

        fn query_columns(&mut self, _table: &str) -> Result<Vec<Column>> {
            Ok(Vec::new())
        }

        fn query_processes(&mut self) -> Result<Vec<Process>> {
            Ok(sessions())
        }

        fn kill_process(&mut self, pid: i64, force: bool) -> Result<()> {
            if pid == 13 {
                return Err(DshError::Query("permission denied".into()));
            }
            self.killed.push((pid, force));
            Ok(())
        }
    }

    fn sessions() -> Vec<Process> {
        vec![
            Process::new(11, Duration::from_secs(5), "app", "shop", "SELECT 1"),
            Process::new(12, Duration::from_secs(600), "app", "shop", "SELECT *\n  FROM orders"),
            Process::new(13, Duration::from_secs(900), "admin", "ops", "VACUUM"),
        ]
    }

    fn server() -> FakeServer {
        FakeServer { killed: Vec::new() }
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        for bad in ["", "10", "s", "5d", "1m30", "-5s"] {
            assert!(matches!(parse_duration(bad), Err(DshError::Usage(_))), "{bad}");
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h2m3s");
    }

    #[test]
    fn test_matchers() {
        let procs = sessions();
        let pick = |m: ProcessMatcher| -> Vec<i64> {
            procs.iter().filter(|p| m.matches(p)).map(|p| p.pid).collect()
        };
        assert_eq!(pick(ProcessMatcher::Pid(12)), vec![12]);
        assert_eq!(pick(ProcessMatcher::Exceeds(Duration::from_secs(600))), vec![13]);
        assert_eq!(pick(ProcessMatcher::Query(parse_pattern("FROM orders").unwrap())), vec![12]);
        assert_eq!(pick(ProcessMatcher::User("app".into())), vec![11, 12]);
        assert_eq!(pick(ProcessMatcher::Database("ops".into())), vec![13]);
    }

    #[test]
    fn test_kill_continues_after_failure() {
        let mut db = server();
        let statuses = kill_matching(
            &mut db,
            &sessions(),
            &ProcessMatcher::Exceeds(Duration::from_secs(1)),
            true,
        );
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].status(), "Killed");
        assert_eq!(statuses[2].status(), "Query error: permission denied");
        assert_eq!(db.killed, vec![(11, true), (12, true)]);
    }

    #[test]
    fn test_unknown_pid_reports_not_found() {
        let mut db = server();
        let statuses = kill_matching(&mut db, &sessions(), &ProcessMatcher::Pid(99), false);
        assert_eq!(
            statuses,
            vec![KillStatus {
                pid: 99,
                error: Some("Process 99 not found".into())
            }]
        );
        assert!(db.killed.is_empty());

        // Other matchers selecting nothing simply report nothing.
        let statuses = kill_matching(&mut db, &sessions(), &ProcessMatcher::User("nobody".into()), false);
        assert!(statuses.is_empty());
    }

    #[test]
    fn test_report_batches() {
        let listing = processes_batch(&sessions()).unwrap();
        assert_eq!(listing.columns(), ["PID", "DURATION", "USERNAME", "DATABASE", "QUERY"]);
        assert_eq!(listing.rows()[1][1], Value::Text("10m".into()));
        assert_eq!(listing.rows()[1][4], Value::Text("SELECT * FROM orders".into()));

        let report = kill_report_batch(&[KillStatus { pid: 7, error: None }]).unwrap();
        assert_eq!(report.rows(), [vec![Value::Int(7), Value::Text("Killed".into())]]);
    }
}
