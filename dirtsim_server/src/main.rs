// CLI entry point for the DirtSim simulation server.
//
// Starts a standalone server that clients connect to and issue commands
// against. This process owns the simulation: there is exactly one
// authoritative `WorldSession` per server, and every connected client is a
// peer into the same world. See `server.rs` for the networking
// architecture and `session.rs` for command dispatch.
//
// Usage:
//   dirtsim_server [OPTIONS]
//     --port <PORT>       Listen port (default: 7878)
//     --width <N>         Grid width in cells (default: 160)
//     --height <N>        Grid height in cells (default: 90)
//     --seed <N>          PRNG seed (default: 1)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dirtsim_server::server::{start_server, ServerConfig};

fn main() {
    let config = parse_args();

    let (handle, addr) = match start_server(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start server: {e}");
            std::process::exit(1);
        }
    };

    println!("DirtSim server listening on {addr}");
    println!("Press Ctrl+C to stop.");

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
            "--width" => {
                i += 1;
                config.width = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--width requires a valid integer");
                    std::process::exit(1);
                });
            }
            "--height" => {
                i += 1;
                config.height = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--height requires a valid integer");
                    std::process::exit(1);
                });
            }
            "--seed" => {
                i += 1;
                config.seed = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--seed requires a valid integer");
                    std::process::exit(1);
                });
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
    println!("Usage: dirtsim_server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>    Listen port (default: 7878)");
    println!("  --width <N>      Grid width in cells (default: 160)");
    println!("  --height <N>     Grid height in cells (default: 90)");
    println!("  --seed <N>       PRNG seed (default: 1)");
    println!("  --help, -h       Show this help");
}

/// Block until Ctrl+C is pressed, then set the flag to false.
fn ctrlc_wait(running: Arc<AtomicBool>) {
    // A proper signal handler would use the `ctrlc` crate, but to keep
    // dependencies minimal we just let the main loop spin: the process
    // exits on SIGINT/SIGTERM by default, which is fine for this server.
    let _ = running;
}
