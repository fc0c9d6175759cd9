//! Scrape orchestration.
//!
//! See [`SqlCollector`] for details.

use prometheus_client::collector::Collector;
use prometheus_client::encoding::DescriptorEncoder;
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, QueryError};
use crate::descriptor::{DescriptorTable, MetricDescriptor, QueryMetric};
use crate::extract::{extract, ExtractionError, Sample};
use crate::sink::{EncoderSink, Sink};

/// What a scrape does when a single metric cannot be collected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FailurePolicy {
    /// Log the failure, skip the metric and keep collecting the others.
    #[default]
    #[value(name = "partial")]
    PartialEmission,
    /// Log the failure and stop collecting for the rest of this scrape.
    FailFast,
}

/// Why one metric could not be collected.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// The metric's query failed.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// The query succeeded but its result has an unexpected shape.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Result of one scrape, for in-process callers. Never cached.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    up: bool,
    samples: usize,
    failed: Vec<String>,
}

impl ScrapeSummary {
    /// Whether the liveness ping succeeded.
    pub fn is_up(&self) -> bool {
        self.up
    }

    /// Number of samples emitted, the liveness sample included.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Names of the metrics that could not be collected.
    pub fn failed(&self) -> &[String] {
        &self.failed
    }
}

/// Collects every metric of a [`DescriptorTable`] from a [`Connection`] on
/// each scrape.
///
/// A scrape first pings the connection. When the ping fails only the
/// liveness gauge is emitted, with value 0. Otherwise the liveness gauge is
/// emitted with value 1, followed by each query metric in table order.
///
/// Register it with a [`Registry`](prometheus_client::registry::Registry)
/// via [`Registry::register_collector`](prometheus_client::registry::Registry::register_collector).
///
/// The collector holds no state between scrapes. Overlapping scrapes share the
/// connection and are serialized by it, if at all.
#[derive(Debug)]
pub struct SqlCollector<C> {
    connection: C,
    table: DescriptorTable,
    policy: FailurePolicy,
}

impl<C: Connection> SqlCollector<C> {
    /// Creates a new [`SqlCollector`] with [`FailurePolicy::PartialEmission`].
    pub fn new(connection: C, table: DescriptorTable) -> Self {
        Self {
            connection,
            table,
            policy: FailurePolicy::default(),
        }
    }

    /// Sets the policy applied when a metric cannot be collected.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Every metric this collector may emit, liveness first.
    pub fn describe(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.table.describe()
    }

    /// Queries and extracts a single metric.
    pub fn collect_metric<'t>(
        &self,
        metric: &'t QueryMetric,
    ) -> Result<Vec<Sample<'t>>, CollectError> {
        let rows = self.connection.query(metric.query())?;
        Ok(extract(metric, rows)?)
    }

    /// Runs one scrape, emitting into `sink`.
    ///
    /// Collection failures are logged and reflected in the returned summary.
    /// Only errors of the sink itself are returned.
    pub fn scrape<S: Sink>(&self, sink: &mut S) -> Result<ScrapeSummary, S::Error> {
        info!("running scrape");

        let up = self.table.up();
        if let Err(error) = self.connection.ping() {
            sink.emit(up, &[Sample::new(up, 0.0, Vec::new())])?;
            error!(%error, "error during scrape");
            return Ok(ScrapeSummary {
                up: false,
                samples: 1,
                failed: Vec::new(),
            });
        }
        sink.emit(up, &[Sample::new(up, 1.0, Vec::new())])?;

        let mut summary = ScrapeSummary {
            up: true,
            samples: 1,
            failed: Vec::new(),
        };
        let metrics = self.table.metrics();
        for (index, metric) in metrics.iter().enumerate() {
            match self.collect_metric(metric) {
                Ok(samples) => {
                    debug!(metric = metric.name(), samples = samples.len(), "collected");
                    sink.emit(metric.descriptor(), &samples)?;
                    summary.samples += samples.len();
                }
                Err(error) => {
                    error!(metric = metric.name(), %error, "collection failed");
                    summary.failed.push(metric.name().to_owned());
                    if self.policy == FailurePolicy::FailFast {
                        warn!(skipped = metrics.len() - index - 1, "aborting scrape");
                        break;
                    }
                }
            }
        }

        info!(
            samples = summary.samples,
            failed = summary.failed.len(),
            "scrape completed"
        );
        Ok(summary)
    }
}

impl<C: Connection> Collector for SqlCollector<C> {
    fn encode(&self, encoder: DescriptorEncoder) -> Result<(), std::fmt::Error> {
        self.scrape(&mut EncoderSink::new(encoder)).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Row, Value};
    use crate::sink::Recorder;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::io;
    use std::sync::Arc;

    const LOCAL_TIME: &str = "SELECT local_time";
    const CONNECTIONS: &str = "SELECT connections";
    const DEADLOCKS: &str = "SELECT deadlocks";

    #[derive(Debug, Default)]
    struct Scripted {
        down: bool,
        results: HashMap<&'static str, Vec<Row>>,
        executed: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn with(mut self, sql: &'static str, rows: Vec<Row>) -> Self {
            self.results.insert(sql, rows);
            self
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().clone()
        }
    }

    impl Connection for Scripted {
        fn ping(&self) -> Result<(), QueryError> {
            if self.down {
                let error = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
                return Err(QueryError::Unavailable(Box::new(error)));
            }
            Ok(())
        }

        fn query(&self, sql: &str) -> Result<Vec<Row>, QueryError> {
            self.executed.lock().push(sql.to_owned());
            self.results
                .get(sql)
                .cloned()
                .ok_or_else(|| QueryError::Failed(format!("invalid object name in {sql}").into()))
        }
    }

    fn table() -> DescriptorTable {
        DescriptorTable::new(
            MetricDescriptor::new(
                "test_up",
                "Whether the scrape was successful",
                Vec::<String>::new(),
            ),
            vec![
                QueryMetric::scalar("test_local_time", "Seconds since epoch", LOCAL_TIME),
                QueryMetric::row_set(
                    "test_connections",
                    "Number of active connections",
                    &["database", "state"],
                    CONNECTIONS,
                    &["current"],
                )
                .unwrap(),
                QueryMetric::scalar("test_deadlocks", "Deadlocks per second", DEADLOCKS),
            ],
        )
        .unwrap()
    }

    fn healthy() -> Scripted {
        Scripted::default()
            .with(LOCAL_TIME, vec![vec![Value::Int(1700000000)]])
            .with(
                CONNECTIONS,
                vec![
                    vec![Value::Text("db1".into()), Value::Int(5)],
                    vec![Value::Text("db2".into()), Value::Int(2)],
                ],
            )
            .with(DEADLOCKS, vec![vec![Value::Int(0)]])
    }

    fn scrape(collector: &SqlCollector<Arc<Scripted>>) -> (ScrapeSummary, Recorder) {
        let mut recorder = Recorder::default();
        let summary = match collector.scrape(&mut recorder) {
            Ok(summary) => summary,
            Err(never) => match never {},
        };
        (summary, recorder)
    }

    #[test]
    fn ping_failure_emits_only_liveness() {
        let connection = Arc::new(Scripted {
            down: true,
            ..healthy()
        });
        let collector = SqlCollector::new(connection.clone(), table());

        let (summary, recorder) = scrape(&collector);

        assert!(!summary.is_up());
        assert_eq!(1, summary.samples());
        assert_eq!(1, recorder.samples().len());
        assert_eq!("test_up", recorder.samples()[0].name);
        assert_eq!(0.0, recorder.samples()[0].value);
        assert!(connection.executed().is_empty());
    }

    #[test]
    fn healthy_scrape_emits_in_table_order() {
        let connection = Arc::new(healthy());
        let collector = SqlCollector::new(connection.clone(), table());

        let (summary, recorder) = scrape(&collector);

        assert!(summary.is_up());
        assert!(summary.failed().is_empty());
        assert_eq!(5, summary.samples());
        assert_eq!(
            ["test_up", "test_local_time", "test_connections", "test_deadlocks"],
            recorder.described()
        );
        assert_eq!(1.0, recorder.samples()[0].value);
        assert_eq!(1700000000.0, recorder.samples()[1].value);

        let connections: Vec<_> = recorder
            .samples_of("test_connections")
            .map(|s| (s.value, s.label_values.clone()))
            .collect();
        assert_eq!(
            vec![
                (5.0, vec!["db1".to_string(), "current".to_string()]),
                (2.0, vec!["db2".to_string(), "current".to_string()]),
            ],
            connections
        );
        assert_eq!(vec![LOCAL_TIME, CONNECTIONS, DEADLOCKS], connection.executed());
    }

    #[test]
    fn label_count_matches_descriptor() {
        let collector = SqlCollector::new(Arc::new(healthy()), table());
        let (_, recorder) = scrape(&collector);

        for sample in recorder.samples() {
            let descriptor = collector
                .describe()
                .find(|d| d.name() == sample.name)
                .unwrap();
            assert_eq!(descriptor.label_names().len(), sample.label_values.len());
        }
    }

    #[test]
    fn partial_emission_skips_failed_metric() {
        let connection = Arc::new(healthy().with(DEADLOCKS, vec![]));
        let collector = SqlCollector::new(connection.clone(), table());

        let (summary, recorder) = scrape(&collector);

        assert!(summary.is_up());
        assert_eq!(["test_deadlocks"], summary.failed());
        assert_eq!(
            ["test_up", "test_local_time", "test_connections"],
            recorder.described()
        );
        assert_eq!(1.0, recorder.samples()[0].value);
    }

    #[test]
    fn partial_emission_continues_after_query_error() {
        let mut connection = healthy();
        connection.results.remove(LOCAL_TIME);
        let connection = Arc::new(connection);
        let collector = SqlCollector::new(connection.clone(), table());

        let (summary, recorder) = scrape(&collector);

        assert_eq!(["test_local_time"], summary.failed());
        assert_eq!(
            ["test_up", "test_connections", "test_deadlocks"],
            recorder.described()
        );
        assert_eq!(3, connection.executed().len());
    }

    #[test]
    fn fail_fast_stops_at_first_failure() {
        let mut connection = healthy();
        connection.results.remove(LOCAL_TIME);
        let connection = Arc::new(connection);
        let collector = SqlCollector::new(connection.clone(), table())
            .with_failure_policy(FailurePolicy::FailFast);

        let (summary, recorder) = scrape(&collector);

        assert!(summary.is_up());
        assert_eq!(["test_local_time"], summary.failed());
        assert_eq!(["test_up"], recorder.described());
        assert_eq!(vec![LOCAL_TIME], connection.executed());
    }

    #[test]
    fn scrapes_are_independent() {
        let connection = Arc::new(healthy());
        let collector = SqlCollector::new(connection.clone(), table());

        let (first, first_samples) = scrape(&collector);
        let (second, second_samples) = scrape(&collector);

        assert_eq!(first, second);
        assert_eq!(first_samples.samples(), second_samples.samples());
        assert_eq!(6, connection.executed().len());
    }
}
