use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::tempdir;

fn satfuzz(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_satfuzz"))
        .args(args)
        .current_dir(cwd)
        .env("RUST_LOG", "error")
        .output()
        .expect("failed to run satfuzz")
}

#[test]
fn single_argument_prints_usage_and_exits_one() {
    let cwd = tempdir().unwrap();
    let output = satfuzz(cwd.path(), &["/tmp/sut"]);

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage: satfuzz"), "stdout was {stdout:?}");
    assert!(!cwd.path().join("fuzzed-tests").exists());
}

#[test]
fn no_arguments_prints_usage_and_exits_one() {
    let cwd = tempdir().unwrap();
    let output = satfuzz(cwd.path(), &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage: satfuzz"));
}

#[test]
fn help_flag_is_not_part_of_the_interface() {
    let cwd = tempdir().unwrap();
    let output = satfuzz(cwd.path(), &["--help"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage: satfuzz"));
}

#[test]
fn missing_directory_prints_error_and_exits_one() {
    let cwd = tempdir().unwrap();
    let inputs = cwd.path().join("inputs");
    fs::create_dir(&inputs).unwrap();

    let output = satfuzz(
        cwd.path(),
        &["/nonexistent/satfuzz-sut", inputs.to_str().unwrap()],
    );

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("/nonexistent/satfuzz-sut"),
        "stdout was {stdout:?}"
    );
    assert!(!stdout.contains("Usage"));
    assert!(!cwd.path().join("fuzzed-tests").exists());
}

#[cfg(unix)]
mod signals {
    use super::*;
    use std::io::Read;
    use std::os::unix::fs::PermissionsExt;
    use std::thread;
    use std::time::{Duration, Instant};

    fn setup(cwd: &Path) -> (String, String) {
        let sut = cwd.join("sut");
        let inputs = cwd.join("inputs");
        fs::create_dir(&sut).unwrap();
        fs::create_dir(&inputs).unwrap();
        let script = sut.join("runsat.sh");
        fs::write(&script, "#!/bin/sh\nexit 10\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(
            cwd.join("satfuzz.toml"),
            "max-saved-tests = 2\n\n[timeouts]\npre-coverage-delay-ms = 0\n\n[coverage]\ncoverage-type = \"none\"\n",
        )
        .unwrap();
        (
            sut.to_string_lossy().into_owned(),
            inputs.to_string_lossy().into_owned(),
        )
    }

    fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    fn signal_running_campaign(signal: libc::c_int) {
        let cwd = tempdir().unwrap();
        let (sut, inputs) = setup(cwd.path());

        let mut child = Command::new(env!("CARGO_BIN_EXE_satfuzz"))
            .args([&sut, &inputs, "7"])
            .current_dir(cwd.path())
            .env("RUST_LOG", "error")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn satfuzz");

        let mut stdout = child.stdout.take().unwrap();
        let reader = thread::spawn(move || {
            let mut text = String::new();
            let _ = stdout.read_to_string(&mut text);
            text
        });

        let out_dir = cwd.path().join("fuzzed-tests");
        let started = wait_until(Duration::from_secs(20), || {
            fs::read_dir(&out_dir).is_ok_and(|entries| entries.count() >= 2)
        });
        assert!(started, "campaign never wrote its placeholder files");

        // SAFETY: kill(2) on the pid of a child we own.
        unsafe {
            libc::kill(child.id() as libc::pid_t, signal);
        }

        let mut status = None;
        let exited = wait_until(Duration::from_secs(20), || {
            status = child.try_wait().unwrap();
            status.is_some()
        });
        if !exited {
            let _ = child.kill();
            panic!("satfuzz did not exit after signal {signal}");
        }

        assert_eq!(status.unwrap().code(), Some(0));
        let stdout = reader.join().unwrap();
        assert!(stdout.contains("Running fuzzer against SUT in"));
        assert!(
            stdout.contains("---------- FUZZER FINISHED ----------"),
            "stdout was {stdout:?}"
        );
        // A solver that never crashes leaves nothing worth keeping.
        assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 0);
    }

    #[test]
    fn interrupt_shuts_down_and_exits_zero() {
        signal_running_campaign(libc::SIGINT);
    }

    #[test]
    fn quit_shuts_down_and_exits_zero() {
        signal_running_campaign(libc::SIGQUIT);
    }

    #[test]
    fn terminate_shuts_down_and_exits_zero() {
        signal_running_campaign(libc::SIGTERM);
    }
}
