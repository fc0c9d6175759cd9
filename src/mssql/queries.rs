//! Metrics exported for a SQL Server instance.

use crate::descriptor::{DescriptorError, DescriptorTable, MetricDescriptor, QueryMetric};

/// Liveness gauge, 1 when the last ping succeeded.
pub const UP: &str = "mssql_up";
/// Seconds since epoch according to the instance clock.
pub const INSTANCE_LOCAL_TIME: &str = "mssql_instance_local_time";
/// Active connections per database.
pub const CONNECTIONS: &str = "mssql_connections";
/// Deadlocks per second since the last restart.
pub const DEADLOCKS: &str = "mssql_deadlocks";

const INSTANCE_LOCAL_TIME_QUERY: &str = "SELECT DATEDIFF(second, '19700101', GETUTCDATE())";

const CONNECTIONS_QUERY: &str =
    "SELECT DB_NAME(sP.dbid), COUNT(sP.spid) FROM sys.sysprocesses sP GROUP BY DB_NAME(sP.dbid)";

const DEADLOCKS_QUERY: &str = "SELECT cntr_value FROM sys.dm_os_performance_counters \
     WHERE counter_name = 'Number of Deadlocks/sec' AND instance_name = '_Total'";

/// The descriptor table of a SQL Server instance.
pub fn default_table() -> Result<DescriptorTable, DescriptorError> {
    DescriptorTable::new(
        MetricDescriptor::new(
            UP,
            "Whether the MSSQL scrape was successful",
            Vec::<String>::new(),
        ),
        vec![
            QueryMetric::scalar(
                INSTANCE_LOCAL_TIME,
                "Number of seconds since epoch on local instance",
                INSTANCE_LOCAL_TIME_QUERY,
            ),
            QueryMetric::row_set(
                CONNECTIONS,
                "Number of active connections",
                &["database", "state"],
                CONNECTIONS_QUERY,
                &["current"],
            )?,
            QueryMetric::scalar(
                DEADLOCKS,
                "Number of lock requests per second that resulted in a deadlock since last restart",
                DEADLOCKS_QUERY,
            ),
        ],
    )
}
