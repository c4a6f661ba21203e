//! Process-level shutdown of the `devicesim` binary.
#![cfg(unix)]

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Forward the child's stdout lines over a channel.
fn stdout_lines(child: &mut Child) -> mpsc::Receiver<String> {
    let stdout = child.stdout.take().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn wait_for_line(lines: &mpsc::Receiver<String>, needle: &str, limit: Duration) {
    let deadline = Instant::now() + limit;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match lines.recv_timeout(left) {
            Ok(line) if line.contains(needle) => return,
            Ok(_) => {}
            Err(e) => panic!("no '{needle}' in controller output: {e}"),
        }
    }
}

#[test]
fn controller_exits_on_sigterm_while_stdin_is_open() {
    let dir = tempfile::tempdir().unwrap();
    let nodes = dir.path().join("devicesim.csv");
    let addrs = dir.path().join("addr.csv");
    let config = dir.path().join("settings.json");
    std::fs::write(&nodes, "0,5\n").unwrap();
    // Nothing listens on port 1; the dial fails fast.
    std::fs::write(&addrs, "127.0.0.1:1\n").unwrap();
    let settings = serde_json::json!({
        "node_table": nodes,
        "address_table": addrs,
        "connect_timeout_ms": 200,
    });
    std::fs::write(&config, settings.to_string()).unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_devicesim"))
        .arg("--config")
        .arg(&config)
        .arg("controller")
        .env("RUST_LOG", "devicesim_lib=info")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    // Held open for the whole test, like an idle terminal.
    let _stdin = child.stdin.take().unwrap();
    let lines = stdout_lines(&mut child);

    wait_for_line(&lines, "WaitingForTermination", Duration::from_secs(10));
    // Let the console park in its stdin read.
    thread::sleep(Duration::from_millis(300));

    let status = Command::new("kill")
        .arg("-TERM")
        .arg(child.id().to_string())
        .status()
        .unwrap();
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().unwrap() {
            assert!(status.success(), "controller exited with {status}");
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
    let _ = child.kill();
    panic!("controller still running 5s after SIGTERM");
}
