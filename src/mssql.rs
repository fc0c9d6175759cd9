//! Microsoft SQL Server backend.
//!
//! [`client`] implements [`Connection`](crate::connection::Connection) on top
//! of `tiberius`, [`queries`] declares the metrics exported for an instance.

pub mod client;
pub mod queries;
