//! Send a single signal to a captain or client listener.
//! cargo run -p sigwire --bin sigsend -- 10.0.0.5:8000 30
//! cargo run -p sigwire --bin sigsend -- 10.0.0.9:8001 start

use std::process;
use std::time::Duration;

use sigwire::types::CONNECT_TIMEOUT_MS;
use sigwire::{Command, SignalValue};

fn parse_value(raw: &str) -> Option<SignalValue> {
    match raw {
        "start" => Some(SignalValue::Command(Command::Start)),
        "stop" => Some(SignalValue::Command(Command::Stop)),
        other => other.parse::<f64>().ok().map(SignalValue::Duration),
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("usage: sigsend <host:port> <seconds|start|stop>");
        process::exit(2);
    }
    let addr = &args[1];
    let value = match parse_value(&args[2]) {
        Some(v) => v,
        None => {
            eprintln!("sigsend: '{}' is not a duration, start or stop", args[2]);
            process::exit(2);
        }
    };

    let mut stream =
        match sigwire::connect(addr, Duration::from_millis(CONNECT_TIMEOUT_MS)).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("sigsend: connect to {addr} failed: {e}");
                process::exit(1);
            }
        };
    if let Err(e) = sigwire::write_signal(&mut stream, value).await {
        eprintln!("sigsend: write to {addr} failed: {e}");
        process::exit(1);
    }
    eprintln!("sent {value} to {addr}");
}
