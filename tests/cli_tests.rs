//! Command-line tests for the binaries against a temporary SQLite file

#[cfg(test)]
mod cli_tests {
    use assert_cmd::Command;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn sample_db(dir: &TempDir) -> String {
        let path = dir.path().join("cli.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             INSERT INTO users (name) VALUES ('alice'), ('bob');",
        )
        .unwrap();
        format!("sqlite://{}", path.display())
    }

    fn stderr_of(assert: assert_cmd::assert::Assert) -> String {
        String::from_utf8_lossy(&assert.get_output().stderr).into_owned()
    }

    /// A command with no inherited DSN or configuration
    fn command(bin: &str, dir: &TempDir) -> Command {
        let mut cmd = Command::cargo_bin(bin).unwrap();
        cmd.env_remove("DSN")
            .env_remove("DATABASE")
            .env_remove("DATABASE_URL")
            .env("DSH_CONFIG", dir.path().join("missing.toml"));
        cmd
    }

    #[test]
    fn test_dcat_csv() {
        let dir = TempDir::new().unwrap();
        let dsn = sample_db(&dir);
        command("dcat", &dir)
            .args(["--dsn", &dsn, "--csv", "users"])
            .assert()
            .success()
            .stdout("id,name\n1,alice\n2,bob\n");
    }

    #[test]
    fn test_dcat_where_and_env_dsn() {
        let dir = TempDir::new().unwrap();
        let dsn = sample_db(&dir);
        command("dcat", &dir)
            .env("DATABASE_URL", &dsn)
            .args(["--jsonl", "--where", "name = 'bob'", "users"])
            .assert()
            .success()
            .stdout("{\"id\":2,\"name\":\"bob\"}\n");
    }

    #[test]
    fn test_dcat_resolves_configured_connection() {
        let dir = TempDir::new().unwrap();
        let dsn = sample_db(&dir);
        let config = dir.path().join("config.toml");
        std::fs::write(
            &config,
            format!("[[connections]]\nname = \"local\"\nconn = \"{dsn}\"\n"),
        )
        .unwrap();
        command("dcat", &dir)
            .env("DSH_CONFIG", &config)
            .args(["--dsn", "local", "--csv", "users"])
            .assert()
            .success()
            .stdout("id,name\n1,alice\n2,bob\n");
    }

    #[test]
    fn test_dcat_finds_json_config_in_home() {
        let dir = TempDir::new().unwrap();
        let dsn = sample_db(&dir);
        let home = dir.path().join("home");
        std::fs::create_dir_all(home.join(".dsh")).unwrap();
        std::fs::write(
            home.join(".dsh").join("config.json"),
            format!(r#"{{"connections": [{{"name": "local", "conn": "{dsn}"}}]}}"#),
        )
        .unwrap();
        command("dcat", &dir)
            .env_remove("DSH_CONFIG")
            .env("HOME", &home)
            .args(["--dsn", "local", "--csv", "users"])
            .assert()
            .success()
            .stdout("id,name\n1,alice\n2,bob\n");
    }

    #[test]
    fn test_missing_dsn_is_config_error() {
        let dir = TempDir::new().unwrap();
        let assert = command("dcat", &dir)
            .arg("users")
            .assert()
            .code(3);
        assert!(stderr_of(assert).contains("dsn is empty"));
    }

    #[test]
    fn test_dsql_reads_stdin() {
        let dir = TempDir::new().unwrap();
        let dsn = sample_db(&dir);
        command("dsql", &dir)
            .args(["--dsn", &dsn, "--json"])
            .write_stdin("SELECT COUNT(*) AS n FROM users")
            .assert()
            .success()
            .stdout("{\"cols\":[\"n\"],\"rows\":[[2]]}\n");
    }

    #[test]
    fn test_dsql_runs_whole_script() {
        let dir = TempDir::new().unwrap();
        let dsn = sample_db(&dir);
        command("dsql", &dir)
            .args(["--dsn", &dsn, "--csv"])
            .write_stdin(
                "CREATE TABLE tags (name TEXT);\n\
                 INSERT INTO tags VALUES ('a'), ('b');\n\
                 SELECT COUNT(*) AS n FROM tags;\n",
            )
            .assert()
            .success()
            .stdout("n\n2\n");
    }

    #[test]
    fn test_dsql_query_error_exit_code() {
        let dir = TempDir::new().unwrap();
        let dsn = sample_db(&dir);
        let assert = command("dsql", &dir)
            .args(["--dsn", &dsn, "SELECT * FROM nope"])
            .assert()
            .code(5);
        assert!(stderr_of(assert).contains("error occurred: SQLite error"));
    }

    #[test]
    fn test_dls_schema_as_sql() {
        let dir = TempDir::new().unwrap();
        let dsn = sample_db(&dir);
        command("dls", &dir)
            .args(["--dsn", &dsn, "--sql", "users"])
            .assert()
            .success()
            .stdout("CREATE TABLE users (\nid INTEGER,\nname TEXT);\n\n");
    }

    #[test]
    fn test_dps_is_unsupported_on_sqlite() {
        let dir = TempDir::new().unwrap();
        let dsn = sample_db(&dir);
        command("dps", &dir)
            .args(["--dsn", &dsn])
            .assert()
            .code(4);
    }

    #[test]
    fn test_dkill_rejects_bad_pid() {
        let dir = TempDir::new().unwrap();
        let dsn = sample_db(&dir);
        let assert = command("dkill", &dir)
            .args(["--dsn", &dsn, "abc"])
            .assert()
            .code(2);
        assert!(stderr_of(assert).contains("not a number"));
    }
}
