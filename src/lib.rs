#![deny(dead_code)]
#![deny(missing_docs)]
#![deny(unused)]
#![forbid(unsafe_code)]
#![warn(missing_debug_implementations)]

//! Prometheus exporter for Microsoft SQL Server.
//!
//! On every scrape a [`SqlCollector`](collector::SqlCollector) pings the
//! database, emits a liveness gauge and, if the database is reachable, runs
//! one query per metric of its [`DescriptorTable`](descriptor::DescriptorTable)
//! and emits the resulting gauges through the registry's encoder.
//!
//! # Examples
//!
//! ```
//! use mssql_exporter::collector::SqlCollector;
//! use mssql_exporter::connection::{Connection, QueryError, Row, Value};
//! use mssql_exporter::descriptor::{DescriptorTable, MetricDescriptor, QueryMetric};
//! use prometheus_client::encoding::text::encode;
//! use prometheus_client::registry::Registry;
//!
//! // A database that always reports two connections to `master`.
//! #[derive(Debug)]
//! struct Fixed;
//!
//! impl Connection for Fixed {
//!     fn ping(&self) -> Result<(), QueryError> {
//!         Ok(())
//!     }
//!
//!     fn query(&self, _sql: &str) -> Result<Vec<Row>, QueryError> {
//!         Ok(vec![vec![Value::Text("master".to_string()), Value::Int(2)]])
//!     }
//! }
//!
//! let table = DescriptorTable::new(
//!     MetricDescriptor::new(
//!         "db_up",
//!         "Whether the scrape was successful",
//!         Vec::<String>::new(),
//!     ),
//!     vec![QueryMetric::row_set(
//!         "db_connections",
//!         "Number of active connections",
//!         &["database", "state"],
//!         "SELECT DB_NAME(dbid), COUNT(spid) FROM sys.sysprocesses GROUP BY DB_NAME(dbid)",
//!         &["current"],
//!     )?],
//! )?;
//!
//! let mut registry = Registry::default();
//! registry.register_collector(Box::new(SqlCollector::new(Fixed, table)));
//!
//! // Each encoding of the registry is one scrape.
//! let mut buffer = String::new();
//! encode(&mut buffer, &registry)?;
//!
//! assert!(buffer.contains("db_up 1"));
//! assert!(buffer.contains("db_connections{database=\"master\",state=\"current\"} 2"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod collector;
pub mod config;
pub mod connection;
pub mod descriptor;
pub mod extract;
pub mod http;
pub mod mssql;
pub mod sink;
