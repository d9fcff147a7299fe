//! End-to-end tests for the ptyrun binary

#[cfg(unix)]
mod unix_tests {
    use std::process::{Command, Output, Stdio};

    fn ptyrun(args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_ptyrun"))
            .args(args)
            .stdin(Stdio::null())
            .env("RUST_LOG", "off")
            .output()
            .expect("failed to run ptyrun")
    }

    fn stdout_of(output: &Output) -> String {
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    #[test]
    fn test_relays_program_output() {
        let output = ptyrun(&["--", "/bin/echo", "hello from the pty"]);
        assert_eq!(output.status.code(), Some(0));
        assert!(stdout_of(&output).contains("hello from the pty"));
    }

    #[test]
    fn test_exit_code_propagates() {
        let output = ptyrun(&["--", "/bin/sh", "-c", "exit 3"]);
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_clear_env_passes_only_given_entries() {
        let output = ptyrun(&["--clear-env", "--env", "FOO=bar", "--", "/usr/bin/env"]);
        assert_eq!(output.status.code(), Some(0));

        let stdout = stdout_of(&output);
        let mut lines: Vec<&str> = stdout.lines().map(|l| l.trim_end_matches('\r')).collect();
        lines.sort_unstable();
        assert_eq!(lines, ["FOO=bar", "TERM=vt100"]);
    }

    #[test]
    fn test_explicit_size() {
        let output = ptyrun(&[
            "--clear-env",
            "--env",
            "PATH=/usr/bin:/bin",
            "--cols",
            "100",
            "--rows",
            "40",
            "--",
            "sh",
            "-c",
            "stty size",
        ]);
        assert_eq!(output.status.code(), Some(0));
        assert!(stdout_of(&output).contains("40 100"));
    }

    #[test]
    fn test_term_flag() {
        let output = ptyrun(&["--term", "xterm-256color", "--", "/bin/sh", "-c", "echo $TERM"]);
        assert_eq!(output.status.code(), Some(0));
        assert!(stdout_of(&output).contains("xterm-256color"));
    }

    #[test]
    fn test_missing_program_exits_one() {
        let output = ptyrun(&["--", "/definitely/not/a/program"]);
        assert_eq!(output.status.code(), Some(1));
        assert!(stdout_of(&output).contains("failed to exec"));
    }

    #[test]
    fn test_log_file_receives_launch_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ptyrun.log");
        let output = Command::new(env!("CARGO_BIN_EXE_ptyrun"))
            .args(["--log-level", "info", "--log-file"])
            .arg(&log)
            .args(["--", "/bin/true"])
            .stdin(Stdio::null())
            .env_remove("RUST_LOG")
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(0));

        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.contains("launched /bin/true"));
    }
}
