// CLI entry point for the Nexus Colony server.
//
// Starts a standalone colony host that game clients connect to. The server
// is authoritative: it runs the simulation, validates every command, and
// broadcasts state. See `server.rs` for the networking architecture and
// `session.rs` for per-colony state.
//
// Usage:
//   nexusd [OPTIONS]
//     --port <PORT>           Listen port (default: 7001)
//     --max-players <N>       Max players per session (default: 4)
//     --tick-secs <SECS>      Simulation tick cadence (default: 5.0)
//     --snapshot-ttl <SECS>   Idle session snapshot lifetime (default: 3600)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nexus_server::server::{ServerConfig, start_server};

fn main() {
    env_logger::init();
    let config = parse_args();

    let (handle, addr) = match start_server(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start server: {e}");
            std::process::exit(1);
        }
    };

    println!("Colony server listening on {addr}");
    println!("Press Ctrl+C to stop.");

    // Wait for Ctrl+C.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc_wait(running_clone);

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    println!("\nShutting down...");
    handle.stop();
}

/// Parse command-line arguments into a `ServerConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> ServerConfig {
    let mut config = ServerConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--max-players" => {
                i += 1;
                config.max_players_per_session =
                    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--max-players requires a valid number");
                        std::process::exit(1);
                    });
            }
            "--tick-secs" => {
                i += 1;
                config.game.default_tick_secs =
                    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--tick-secs requires a valid number of seconds");
                        std::process::exit(1);
                    });
            }
            "--snapshot-ttl" => {
                i += 1;
                let secs: u64 = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--snapshot-ttl requires a valid number of seconds");
                    std::process::exit(1);
                });
                config.snapshot_ttl = Duration::from_secs(secs);
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: nexusd [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>           Listen port (default: 7001)");
    println!("  --max-players <N>       Max players per session (default: 4)");
    println!("  --tick-secs <SECS>      Simulation tick cadence (default: 5.0)");
    println!("  --snapshot-ttl <SECS>   Idle session snapshot lifetime (default: 3600)");
    println!("  --help, -h              Show this help");
}

/// Block until Ctrl+C is pressed, then set the flag to false.
fn ctrlc_wait(running: Arc<AtomicBool>) {
    // The process exits on SIGINT/SIGTERM by default, which is fine for a
    // standalone host. If a graceful drain is needed later, add the `ctrlc`
    // crate and flip the flag from its handler.
    let _ = running;
}
