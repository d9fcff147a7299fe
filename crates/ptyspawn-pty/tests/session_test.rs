//! Launch environment, working directory and window geometry tests

mod common;

#[cfg(unix)]
mod unix_tests {
    use super::common;
    use ptyspawn_pty::{spawn, spawn_with, LaunchSpec, WindowSize};
    use std::time::Duration;

    #[test]
    fn test_environment_is_replaced_not_inherited() {
        std::env::set_var("PTYSPAWN_AMBIENT_MARKER", "leaked");

        let session = spawn_with("/usr/bin/env", Vec::<String>::new(), ["FOO=bar"], "", 80, 24)
            .expect("spawn env");
        let output = common::read_to_end(&session, Duration::from_secs(5));
        assert!(session.wait().unwrap().success());

        let mut vars = common::lines(&output);
        vars.sort();
        assert_eq!(vars, ["FOO=bar", "TERM=vt100"]);
    }

    #[test]
    fn test_term_name_exported() {
        let spec = LaunchSpec::new("/bin/sh")
            .args(["-c", "echo \"term=$TERM\""])
            .env(["TERM=dumb"])
            .term("xterm-256color");
        let session = spawn(&spec).expect("spawn");
        let output = common::read_to_end(&session, Duration::from_secs(5));
        assert!(output.contains("term=xterm-256color"), "unexpected output: {output:?}");
    }

    #[test]
    fn test_working_directory_applied() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().canonicalize().unwrap();

        let session = spawn_with(
            "/bin/sh",
            ["-c", "pwd -P"],
            Vec::<String>::new(),
            dir.path().to_str().unwrap(),
            80,
            24,
        )
        .expect("spawn pwd");
        let output = common::read_to_end(&session, Duration::from_secs(5));
        assert!(
            common::lines(&output).contains(&expected.to_string_lossy().into_owned()),
            "unexpected output: {output:?}"
        );
    }

    #[test]
    fn test_unusable_working_directory_is_not_fatal() {
        let inherited = std::env::current_dir().unwrap().canonicalize().unwrap();

        let session = spawn_with(
            "/bin/sh",
            ["-c", "pwd -P"],
            Vec::<String>::new(),
            "/nonexistent/working/dir",
            80,
            24,
        )
        .expect("spawn pwd");
        let output = common::read_to_end(&session, Duration::from_secs(5));

        assert!(output.contains("failed to chdir"), "unexpected output: {output:?}");
        assert!(
            common::lines(&output).contains(&inherited.to_string_lossy().into_owned()),
            "child should stay in the inherited directory: {output:?}"
        );
        assert!(session.wait().unwrap().success());
    }

    #[test]
    fn test_initial_size_visible_immediately() {
        let session = spawn_with("/bin/sleep", ["5"], Vec::<String>::new(), "", 132, 43)
            .expect("spawn");
        assert_eq!(session.window_size().unwrap(), WindowSize::new(132, 43));
        session.signal(nix::sys::signal::Signal::SIGKILL).unwrap();
        session.wait().unwrap();
    }

    #[test]
    fn test_zero_launch_size_spawns_default_terminal() {
        let spec = LaunchSpec::new("/bin/sleep")
            .args(["5"])
            .size(WindowSize::new(0, 0));
        let session = spawn(&spec).expect("spawn");

        let size = session.window_size().unwrap();
        assert!(size.cols() > 0 && size.rows() > 0, "got {size}");
        assert_eq!(size, WindowSize::default());

        session.signal(nix::sys::signal::Signal::SIGKILL).unwrap();
        session.wait().unwrap();
    }

    #[test]
    fn test_child_sees_initial_size() {
        let session = spawn_with("/bin/sh", ["-c", "stty size"], [common::TEST_PATH], "", 120, 50)
            .expect("spawn stty");
        let output = common::read_to_end(&session, Duration::from_secs(5));
        assert!(output.contains("50 120"), "unexpected output: {output:?}");
    }

    #[test]
    fn test_resize_observed_by_child() {
        let session = spawn_with(
            "/bin/sh",
            ["-c", "sleep 0.5; stty size"],
            [common::TEST_PATH],
            "",
            80,
            24,
        )
        .expect("spawn stty");
        session.resize(100, 40).expect("resize");

        let output = common::read_to_end(&session, Duration::from_secs(5));
        assert!(output.contains("40 100"), "unexpected output: {output:?}");
    }

    #[test]
    fn test_resize_zero_applies_default() {
        let session = spawn_with("/bin/sleep", ["5"], Vec::<String>::new(), "", 100, 40)
            .expect("spawn");
        session.resize(0, 0).expect("resize to zero is not an error");
        assert_eq!(session.window_size().unwrap(), WindowSize::new(80, 30));

        session.signal(nix::sys::signal::Signal::SIGKILL).unwrap();
        session.wait().unwrap();
    }

    #[test]
    fn test_resize_is_idempotent() {
        let session = spawn_with("/bin/sleep", ["5"], Vec::<String>::new(), "", 80, 24)
            .expect("spawn");
        for _ in 0..3 {
            session.resize(90, 33).unwrap();
            assert_eq!(session.window_size().unwrap(), WindowSize::new(90, 33));
        }

        session.signal(nix::sys::signal::Signal::SIGKILL).unwrap();
        session.wait().unwrap();
    }
}
