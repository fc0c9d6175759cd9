//! Metric descriptors and the table of query-backed metrics.
//!
//! See [`DescriptorTable`] for details.

use std::collections::HashSet;

/// Static metadata of one exportable metric.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricDescriptor {
    name: String,
    help: String,
    label_names: Vec<String>,
}

impl MetricDescriptor {
    /// Creates a new [`MetricDescriptor`].
    pub fn new<N, H, L>(name: N, help: H, label_names: L) -> Self
    where
        N: Into<String>,
        H: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Self {
            name: name.into(),
            help: help.into(),
            label_names: label_names.into_iter().map(Into::into).collect(),
        }
    }

    /// The globally unique metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable description.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Ordered label dimensions. Every sample carries exactly this many label
    /// values.
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

/// The rule turning the rows returned by a metric's query into samples.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extraction {
    /// Exactly one row with one numeric column, producing one unlabeled
    /// sample.
    Scalar,
    /// Any number of `(key, value)` rows, each producing one sample labeled
    /// with the key followed by `constant_labels`.
    RowSet {
        /// Literal label values appended after the row key, e.g. a fixed
        /// state tag.
        constant_labels: Vec<String>,
    },
}

impl Extraction {
    /// Number of label values every sample produced by this strategy carries.
    pub fn label_count(&self) -> usize {
        match self {
            Extraction::Scalar => 0,
            Extraction::RowSet { constant_labels } => 1 + constant_labels.len(),
        }
    }
}

/// A metric whose samples are read from the database on every scrape.
#[derive(Clone, Debug)]
pub struct QueryMetric {
    descriptor: MetricDescriptor,
    query: String,
    extraction: Extraction,
}

impl QueryMetric {
    /// Creates a new [`QueryMetric`], checking that the descriptor declares as
    /// many label names as `extraction` produces label values.
    pub fn new(
        descriptor: MetricDescriptor,
        query: impl Into<String>,
        extraction: Extraction,
    ) -> Result<Self, DescriptorError> {
        let declared = descriptor.label_names().len();
        let extracted = extraction.label_count();
        if declared != extracted {
            return Err(DescriptorError::LabelCardinality {
                name: descriptor.name,
                declared,
                extracted,
            });
        }

        Ok(Self {
            descriptor,
            query: query.into(),
            extraction,
        })
    }

    /// Shorthand for an unlabeled [`Extraction::Scalar`] metric.
    pub fn scalar(
        name: impl Into<String>,
        help: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            descriptor: MetricDescriptor::new(name, help, Vec::<String>::new()),
            query: query.into(),
            extraction: Extraction::Scalar,
        }
    }

    /// Shorthand for an [`Extraction::RowSet`] metric.
    pub fn row_set(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: &[&str],
        query: impl Into<String>,
        constant_labels: &[&str],
    ) -> Result<Self, DescriptorError> {
        Self::new(
            MetricDescriptor::new(name, help, label_names.iter().copied()),
            query,
            Extraction::RowSet {
                constant_labels: constant_labels.iter().map(|l| l.to_string()).collect(),
            },
        )
    }

    /// The metric's descriptor.
    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    /// Shorthand for `self.descriptor().name()`.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// The query text executed on every scrape.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The extraction strategy.
    pub fn extraction(&self) -> &Extraction {
        &self.extraction
    }
}

/// The fixed set of metrics a collector can emit.
///
/// The liveness descriptor is kept apart from the query-backed metrics: its
/// value comes from the connection ping rather than from a query, and it is
/// always emitted first.
#[derive(Clone, Debug)]
pub struct DescriptorTable {
    up: MetricDescriptor,
    metrics: Vec<QueryMetric>,
}

impl DescriptorTable {
    /// Creates a new [`DescriptorTable`]. Metric names must be unique across
    /// the liveness descriptor and all query metrics.
    pub fn new(up: MetricDescriptor, metrics: Vec<QueryMetric>) -> Result<Self, DescriptorError> {
        if !up.label_names().is_empty() {
            return Err(DescriptorError::LabelCardinality {
                name: up.name,
                declared: up.label_names.len(),
                extracted: 0,
            });
        }

        {
            let mut seen = HashSet::with_capacity(metrics.len() + 1);
            seen.insert(up.name());
            for metric in &metrics {
                if !seen.insert(metric.name()) {
                    return Err(DescriptorError::DuplicateName(metric.name().to_owned()));
                }
            }
        }

        Ok(Self { up, metrics })
    }

    /// The liveness descriptor.
    pub fn up(&self) -> &MetricDescriptor {
        &self.up
    }

    /// Query-backed metrics in declaration order.
    pub fn metrics(&self) -> &[QueryMetric] {
        &self.metrics
    }

    /// Every descriptor that may appear in a scrape, liveness first.
    pub fn describe(&self) -> impl Iterator<Item = &MetricDescriptor> {
        std::iter::once(&self.up).chain(self.metrics.iter().map(QueryMetric::descriptor))
    }
}

/// Errors building a [`QueryMetric`] or a [`DescriptorTable`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// The declared label names do not match what the extraction produces.
    #[error("metric {name} declares {declared} label names but its extraction yields {extracted}")]
    LabelCardinality {
        /// Metric name.
        name: String,
        /// Number of declared label names.
        declared: usize,
        /// Number of label values the extraction produces.
        extracted: usize,
    },
    /// The same metric name appears more than once.
    #[error("metric {0} is declared more than once")]
    DuplicateName(String),
}
