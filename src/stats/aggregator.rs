use crate::client::RequestRecord;
use crate::persist::CsvSink;
use serde::Serialize;
use std::time::Duration;

/// Everything one completed round produced.
#[derive(Debug, Clone)]
pub struct RoundData {
    pub round: usize,
    pub client_count: usize,
    pub timelines: Vec<Vec<RequestRecord>>,
    pub ramp_up: Duration,
}

/// Finalized metrics for one round. Field names match the CSV columns.
#[derive(Debug, Clone, Serialize)]
pub struct RoundMetrics {
    pub clients: usize,
    pub count: u64,
    pub total: u64,
    pub percentage: f64,
    /// Earliest start to latest finish among successes, in ms.
    pub time: i64,
    pub longest: i64,
    pub shortest: i64,
    pub average: f64,
    pub connection_time: u64,
}

impl RoundMetrics {
    /// Compute the round's metrics from its raw timelines.
    ///
    /// Records are treated as an unordered set; there is no ordering
    /// guarantee across clients. Expected count is
    /// `request_interval × connected population`.
    pub fn from_round(data: &RoundData, request_interval: usize) -> Self {
        let mut count: u64 = 0;
        let mut total_rt: i64 = 0;
        let mut longest: i64 = 0;
        let mut shortest = i64::MAX;
        let mut earliest_start = i64::MAX;
        let mut latest_finish: i64 = 0;

        for timeline in &data.timelines {
            for record in timeline {
                let (Some(_received), Some(finish)) = (record.received_ms, record.finish_ms)
                else {
                    continue;
                };
                let trip = finish - record.start_ms;

                earliest_start = earliest_start.min(record.start_ms);
                latest_finish = latest_finish.max(finish);
                longest = longest.max(trip);
                shortest = shortest.min(trip);
                total_rt += trip;
                count += 1;
            }
        }

        let total = (request_interval * data.client_count) as u64;
        let percentage = if total > 0 {
            count as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        // with no successes there is no round window to report
        let (time, shortest, average) = if count > 0 {
            (
                latest_finish - earliest_start,
                shortest,
                total_rt as f64 / count as f64,
            )
        } else {
            (0, 0, 0.0)
        };

        Self {
            clients: data.client_count,
            count,
            total,
            percentage,
            time,
            longest,
            shortest,
            average,
            connection_time: data.ramp_up.as_millis() as u64,
        }
    }

    /// CSV fields in header order. The percentage carries a `%` suffix in
    /// the persisted form.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("clients", self.clients.to_string()),
            ("count", self.count.to_string()),
            ("total", self.total.to_string()),
            ("percentage", format!("{}%", self.percentage)),
            ("time", self.time.to_string()),
            ("longest", self.longest.to_string()),
            ("shortest", self.shortest.to_string()),
            ("average", self.average.to_string()),
            ("connection_time", self.connection_time.to_string()),
        ]
    }
}

/// Computes each round's metrics, prints the summary, and hands the result
/// to the persistence sink. Retains nothing between rounds.
pub struct Aggregator {
    sink: CsvSink,
    request_interval: usize,
}

impl Aggregator {
    pub fn new(sink: CsvSink, request_interval: usize) -> Self {
        Self {
            sink,
            request_interval,
        }
    }

    /// Finalize one round. A failed save is logged and never aborts the
    /// running benchmark.
    pub async fn calculate(&self, data: &RoundData) -> RoundMetrics {
        let metrics = RoundMetrics::from_round(data, self.request_interval);

        println!(
            "Count: {}/{} ({}%)  | Time Elapse: {} ms",
            metrics.count, metrics.total, metrics.percentage, metrics.time
        );
        println!(
            "Longest Trip: {} ms | Shortest Trip: {} ms | Average Trip: {} ms",
            metrics.longest, metrics.shortest, metrics.average
        );

        if let Err(err) = self.sink.save(&metrics.fields()).await {
            tracing::warn!(
                "failed to persist round {} results to {}: {err}",
                data.round + 1,
                self.sink.path().display()
            );
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sequence: usize, start: i64, received: Option<i64>, finish: Option<i64>) -> RequestRecord {
        RequestRecord {
            sequence,
            start_ms: start,
            received_ms: received,
            finish_ms: finish,
        }
    }

    #[test]
    fn test_single_client_full_success() {
        let data = RoundData {
            round: 0,
            client_count: 1,
            timelines: vec![vec![
                record(0, 1_000, Some(1_005), Some(1_010)),
                record(1, 1_001, Some(1_020), Some(1_031)),
                record(2, 1_002, Some(1_015), Some(1_022)),
            ]],
            ramp_up: Duration::from_millis(42),
        };

        let metrics = RoundMetrics::from_round(&data, 3);

        assert_eq!(metrics.count, 3);
        assert_eq!(metrics.total, 3);
        assert_eq!(metrics.percentage, 100.0);
        assert_eq!(metrics.shortest, 10);
        assert_eq!(metrics.longest, 30);
        assert_eq!(metrics.average, 20.0);
        // earliest start 1000, latest finish 1031
        assert_eq!(metrics.time, 31);
        assert_eq!(metrics.connection_time, 42);
    }

    #[test]
    fn test_incomplete_records_do_not_count() {
        let data = RoundData {
            round: 0,
            client_count: 1,
            timelines: vec![vec![
                record(0, 1_000, Some(1_005), Some(1_010)),
                record(1, 1_001, None, None),
                record(2, 1_002, Some(1_003), None),
            ]],
            ramp_up: Duration::ZERO,
        };

        let metrics = RoundMetrics::from_round(&data, 3);
        assert_eq!(metrics.count, 1);
        assert!((metrics.percentage - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_successes_yields_zeros() {
        let data = RoundData {
            round: 0,
            client_count: 2,
            timelines: vec![
                vec![record(0, 1_000, None, None)],
                vec![record(0, 1_000, None, None)],
            ],
            ramp_up: Duration::ZERO,
        };

        let metrics = RoundMetrics::from_round(&data, 5);
        assert_eq!(metrics.count, 0);
        assert_eq!(metrics.total, 10);
        assert_eq!(metrics.percentage, 0.0);
        assert_eq!(metrics.time, 0);
        assert_eq!(metrics.shortest, 0);
        assert_eq!(metrics.longest, 0);
        assert_eq!(metrics.average, 0.0);
    }

    #[test]
    fn test_percentage_is_exact() {
        let data = RoundData {
            round: 0,
            client_count: 4,
            timelines: vec![vec![
                record(0, 0, Some(1), Some(2)),
                record(1, 0, Some(1), Some(2)),
            ]],
            ramp_up: Duration::ZERO,
        };

        // 2 successes out of 2 requests x 4 clients
        let metrics = RoundMetrics::from_round(&data, 2);
        assert_eq!(metrics.percentage, 2.0 / 8.0 * 100.0);
    }

    #[test]
    fn test_records_are_an_unordered_set() {
        let shuffled = RoundData {
            round: 0,
            client_count: 1,
            timelines: vec![vec![
                record(2, 1_002, Some(1_015), Some(1_022)),
                record(0, 1_000, Some(1_005), Some(1_010)),
                record(1, 1_001, Some(1_020), Some(1_031)),
            ]],
            ramp_up: Duration::ZERO,
        };

        let metrics = RoundMetrics::from_round(&shuffled, 3);
        assert_eq!(metrics.shortest, 10);
        assert_eq!(metrics.longest, 30);
        assert_eq!(metrics.time, 31);
    }

    #[test]
    fn test_fields_order_matches_header() {
        let metrics = RoundMetrics {
            clients: 1,
            count: 3,
            total: 3,
            percentage: 100.0,
            time: 31,
            longest: 30,
            shortest: 10,
            average: 20.0,
            connection_time: 42,
        };

        let names: Vec<&str> = metrics.fields().iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec![
                "clients",
                "count",
                "total",
                "percentage",
                "time",
                "longest",
                "shortest",
                "average",
                "connection_time"
            ]
        );
        assert_eq!(metrics.fields()[3].1, "100%");
    }
}
