//! buffered-socket: an event-driven server built on buffered sockets
//!
//! Serves one of the bundled protocols:
//! - `echo`: raw byte echo, optionally in direct mode
//! - `ping`: line-based ping/pong
//!
//! Configuration via CLI arguments or TOML file.

use buffered_socket::config::Config;
use buffered_socket::runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        protocol = ?config.protocol,
        input_buffer_size = config.input_buffer_size,
        write_timeout = ?config.write_timeout,
        direct = config.direct,
        "Starting buffered-socket server"
    );

    runtime::mio::run(config)?;
    Ok(())
}
