use clap::Parser;
use sockbench::client::ClientSettings;
use sockbench::config::BenchConfig;
use sockbench::persist::{next_run_file, CsvSink};
use sockbench::pool::ConnectionPool;
use sockbench::probe;
use sockbench::progress::{ProgressGauge, ProgressReporter};
use sockbench::stats::{Aggregator, RoundData};
use std::sync::Arc;
use std::time::Duration;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut config = BenchConfig::parse();

    // one probe connection before anything else; no server, no run
    if let Err(err) = probe::check_server(&config.url()).await {
        eprintln!("Server Not Found at {}: {err}", config.url());
        std::process::exit(1);
    }

    config.resolve_label()?;

    let save_file = next_run_file(&config.output_dir()).await?;
    println!("Saving results to {}", save_file.display());
    let aggregator = Aggregator::new(CsvSink::new(save_file), config.request_interval);

    let connect_gauge = Arc::new(ProgressGauge::new());
    let request_gauge = Arc::new(ProgressGauge::new());
    let mut pool = ConnectionPool::new(
        ClientSettings::new(config.url()),
        config.connection_interval,
        config.request_interval,
        connect_gauge.clone(),
        request_gauge.clone(),
    );

    for round in 0..config.rounds {
        println!("\nTest: {}/{}", round + 1, config.rounds);

        let connect_bar = ProgressReporter::start(connect_gauge.clone(), "Connecting...");
        let ramp_up = pool.create_connections(round).await?;
        connect_bar.stop();
        println!("\nConnection Time: {} ms", ramp_up.as_millis());

        let bench_bar = ProgressReporter::start(request_gauge.clone(), "Benchmarking...");
        let timelines = pool.send_requests(round).await?;
        bench_bar.stop();

        let data = RoundData {
            round,
            client_count: pool.client_count(),
            timelines,
            ramp_up,
        };
        aggregator.calculate(&data).await;
    }

    pool.shutdown(CLOSE_TIMEOUT).await;

    Ok(())
}
