mod args;
mod exit;
mod logging;
mod serve;

use clap::Parser;

use crate::args::RelayArgs;
use crate::logging::{init_logging, LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "tcprelay",
    version,
    about = "Relay many frontend TCP clients through one backend connection"
)]
struct Cli {
    #[command(flatten)]
    relay: RelayArgs,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", env = "TCPRELAY_LOG_FORMAT")]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", env = "TCPRELAY_LOG_LEVEL")]
    log_level: LogLevel,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit::USAGE
            } else {
                exit::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    init_logging(cli.log_format, cli.log_level);

    match serve::run(cli.relay) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tcprelay_core::HandshakePolicy;
    use tcprelay_frame::FrameMode;

    use super::*;

    #[test]
    fn parses_positional_bind_address() {
        let cli = Cli::try_parse_from(["tcprelay", "127.0.0.1", "9000"]).expect("args should parse");
        assert_eq!(cli.relay.bind_addr(), "127.0.0.1:9000".parse().unwrap());

        let config = cli.relay.relay_config();
        assert_eq!(config.frame.mode, FrameMode::Lines);
        assert_eq!(
            config.handshake,
            HandshakePolicy::Ack {
                timeout: Duration::from_secs(1)
            }
        );
        assert!(!config.nack_unknown_sessions);
    }

    #[test]
    fn legacy_style_flags_build_config() {
        let cli = Cli::try_parse_from([
            "tcprelay",
            "::1",
            "7000",
            "--framing",
            "json",
            "--handshake",
            "settle",
            "--handshake-timeout",
            "1s",
            "--forward-delay",
            "50ms",
            "--max-sessions",
            "100",
            "--nack-unknown-sessions",
        ])
        .expect("args should parse");

        let config = cli.relay.relay_config();
        assert_eq!(config.frame.mode, FrameMode::JsonStream);
        assert_eq!(
            config.handshake,
            HandshakePolicy::Settle {
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(config.forward_delay, Duration::from_millis(50));
        assert_eq!(config.registry_capacity, 100);
        assert!(config.nack_unknown_sessions);
    }

    #[test]
    fn missing_port_is_an_error() {
        let err = Cli::try_parse_from(["tcprelay", "127.0.0.1"]).expect_err("port is required");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn rejects_out_of_range_port() {
        let err = Cli::try_parse_from(["tcprelay", "127.0.0.1", "70000"])
            .expect_err("port must fit in u16");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
