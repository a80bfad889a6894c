//! Command line interface for the `snacframe` demo binary.
//!
//! The binary drives a processor over an in-process loopback transport and
//! prints how many requests were answered and how many timed out.

use clap::Parser;

/// Command line arguments for the `snacframe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "snacframe",
    version,
    about = "Exercise SNAC request correlation over a loopback transport"
)]
pub struct Cli {
    /// Number of requests to send.
    #[arg(short, long, default_value_t = 10)]
    pub requests: u32,

    /// Request time-to-live in seconds; 0 expires requests on the next send.
    #[arg(short, long, default_value_t = 900)]
    pub ttl: u64,

    /// Leave every Nth request unanswered.
    #[arg(short, long, value_name = "N")]
    pub drop_every: Option<u32>,

    /// Pace sends at this many requests per second.
    #[arg(long, value_name = "PER_SEC")]
    pub rate: Option<usize>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn parses_defaults() {
        let cli = Cli::parse_from(["snacframe"]);
        assert_eq!(cli.requests, 10);
        assert_eq!(cli.ttl, 900);
        assert_eq!(cli.drop_every, None);
        assert_eq!(cli.rate, None);
    }

    #[test]
    fn parses_all_options() {
        let cli = Cli::parse_from([
            "snacframe",
            "--requests",
            "4",
            "--ttl",
            "0",
            "--drop-every",
            "2",
            "--rate",
            "50",
        ]);
        assert_eq!(cli.requests, 4);
        assert_eq!(cli.ttl, 0);
        assert_eq!(cli.drop_every, Some(2));
        assert_eq!(cli.rate, Some(50));
    }
}
