//! Run configuration, immutable once resolved.
//!
//! Every value can come from a CLI flag or an environment variable, so the
//! benchmark drives cleanly from Docker. The run label alone falls back to
//! an interactive prompt, mirroring how runs are usually started by hand.

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "sockbench")]
#[command(about = "Round-based WebSocket load benchmark", long_about = None)]
pub struct BenchConfig {
    /// WebSocket server address
    #[arg(long, env = "WEBSOCKET_ADDRESS", default_value = "127.0.0.1")]
    pub address: String,

    /// WebSocket server port
    #[arg(long, env = "WEBSOCKET_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Clients added per round
    #[arg(long = "connections", env = "ADD_CONNECTIONS", default_value_t = 100)]
    pub connection_interval: usize,

    /// Requests per client per round
    #[arg(long = "requests", env = "REQUESTS", default_value_t = 100)]
    pub request_interval: usize,

    /// Number of rounds to run
    #[arg(long, env = "ROUNDS", default_value_t = 50)]
    pub rounds: usize,

    /// Root directory for result files
    #[arg(long, env = "BENCHMARK_FOLDER", default_value = "./benchmarks")]
    pub results_dir: PathBuf,

    /// Label for this run, used as a sub-directory of the results dir.
    /// Prompted for on stdin when absent.
    #[arg(long, env = "BENCHMARK_LANGUAGE")]
    pub label: Option<String>,
}

impl BenchConfig {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.address, self.port)
    }

    /// Directory this run's result files go into.
    pub fn output_dir(&self) -> PathBuf {
        match &self.label {
            Some(label) => self.results_dir.join(label),
            None => self.results_dir.clone(),
        }
    }

    /// Ask for the run label on stdin when neither the flag nor the
    /// environment supplied one.
    pub fn resolve_label(&mut self) -> io::Result<()> {
        if self.label.is_some() {
            return Ok(());
        }

        print!("Label: ");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        let label = line.trim();
        if !label.is_empty() {
            self.label = Some(label.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(args: &[&str]) -> BenchConfig {
        BenchConfig::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_url_format() {
        let config = parsed(&["sockbench", "--address", "10.0.0.5", "--port", "9001"]);
        assert_eq!(config.url(), "ws://10.0.0.5:9001");
    }

    #[test]
    fn test_output_dir_includes_label() {
        let config = parsed(&[
            "sockbench",
            "--results-dir",
            "/tmp/bench",
            "--label",
            "go",
        ]);
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/bench/go"));
    }

    #[test]
    fn test_intervals_parse() {
        let config = parsed(&["sockbench", "--connections", "2", "--requests", "3", "--rounds", "4"]);
        assert_eq!(config.connection_interval, 2);
        assert_eq!(config.request_interval, 3);
        assert_eq!(config.rounds, 4);
    }
}
