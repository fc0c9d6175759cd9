//! [`Connection`] backed by a `tiberius` client.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tiberius::error::Error;
use tiberius::{Client, ColumnData, Config};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use crate::connection::{Connection, QueryError, Row, Value};

type TdsClient = Client<Compat<TcpStream>>;

const PING_QUERY: &str = "SELECT 1";

/// Default deadline for reaching the server and logging in.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// A single SQL Server connection, established lazily.
///
/// Statements are executed one at a time: concurrent callers wait for the
/// connection. After a transport failure the client is dropped and the next
/// call connects again.
///
/// Calls block on `runtime`, which must be a multi-threaded runtime, and
/// must therefore not be made from within an asynchronous task. Run them on
/// a blocking thread, e.g. with [`tokio::task::spawn_blocking`].
///
/// Connecting, including TLS and login, fails with
/// [`QueryError::Unavailable`] once the connect timeout has elapsed.
pub struct MssqlConnection {
    config: Config,
    runtime: Handle,
    connect_timeout: Duration,
    client: Mutex<Option<TdsClient>>,
}

impl MssqlConnection {
    /// Creates a new [`MssqlConnection`]. No connection is attempted until
    /// the first call.
    pub fn new(config: Config, runtime: Handle) -> Self {
        Self {
            config,
            runtime,
            connect_timeout: CONNECT_TIMEOUT,
            client: Mutex::new(None),
        }
    }

    /// Sets the deadline for establishing a connection. Defaults to
    /// [`CONNECT_TIMEOUT`].
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn connect_within_deadline(&self) -> Result<TdsClient, QueryError> {
        match tokio::time::timeout(self.connect_timeout, self.connect()).await {
            Ok(connected) => connected.map_err(|e| QueryError::Unavailable(Box::new(e))),
            Err(elapsed) => {
                warn!(timeout = ?self.connect_timeout, "connecting timed out");
                Err(QueryError::Unavailable(Box::new(elapsed)))
            }
        }
    }

    async fn connect(&self) -> Result<TdsClient, Error> {
        let addr = self.config.get_addr();
        debug!(%addr, "connecting");
        let tcp = TcpStream::connect(addr.as_str()).await?;
        tcp.set_nodelay(true)?;
        Client::connect(self.config.clone(), tcp.compat_write()).await
    }
}

impl fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("addr", &self.config.get_addr())
            .field("connect_timeout", &self.connect_timeout)
            .field("connected", &self.client.try_lock().map(|c| c.is_some()))
            .finish()
    }
}

impl Connection for MssqlConnection {
    fn ping(&self) -> Result<(), QueryError> {
        self.query(PING_QUERY).map(|_| ())
    }

    fn query(&self, sql: &str) -> Result<Vec<Row>, QueryError> {
        let mut slot = self.client.lock();
        self.runtime.block_on(async {
            let mut client = match slot.take() {
                Some(client) => client,
                None => self.connect_within_deadline().await?,
            };

            match fetch(&mut client, sql).await {
                Ok(rows) => {
                    *slot = Some(client);
                    Ok(rows)
                }
                Err(error) if is_transport(&error) => {
                    warn!(%error, "dropping broken connection");
                    Err(QueryError::Unavailable(Box::new(error)))
                }
                Err(error) => {
                    *slot = Some(client);
                    Err(QueryError::Failed(Box::new(error)))
                }
            }
        })
    }
}

async fn fetch(client: &mut TdsClient, sql: &str) -> Result<Vec<Row>, Error> {
    let rows = client.simple_query(sql).await?.into_first_result().await?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(Value::from).collect())
        .collect())
}

fn is_transport(error: &Error) -> bool {
    matches!(
        error,
        Error::Io { .. } | Error::Protocol(_) | Error::Tls(_) | Error::Routing { .. }
    )
}

impl From<ColumnData<'_>> for Value {
    fn from(data: ColumnData<'_>) -> Self {
        let value = match data {
            ColumnData::U8(v) => v.map(|v| Value::Int(v.into())),
            ColumnData::I16(v) => v.map(|v| Value::Int(v.into())),
            ColumnData::I32(v) => v.map(|v| Value::Int(v.into())),
            ColumnData::I64(v) => v.map(Value::Int),
            ColumnData::F32(v) => v.map(|v| Value::Float(v.into())),
            ColumnData::F64(v) => v.map(Value::Float),
            ColumnData::Bit(v) => v.map(|v| Value::Int(v.into())),
            ColumnData::String(v) => v.map(|v| Value::Text(v.into_owned())),
            ColumnData::Numeric(v) => {
                v.map(|n| Value::Float(n.value() as f64 / 10f64.powi(n.scale().into())))
            }
            ColumnData::Guid(_) => return Value::Unsupported("uniqueidentifier"),
            ColumnData::Binary(_) => return Value::Unsupported("binary"),
            ColumnData::Xml(_) => return Value::Unsupported("xml"),
            _ => return Value::Unsupported("datetime"),
        };
        value.unwrap_or(Value::Null)
    }
}
