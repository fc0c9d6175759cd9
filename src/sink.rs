//! Destinations for the samples produced by a scrape.
//!
//! [`EncoderSink`] forwards samples to a `prometheus_client` registry
//! encoding, [`Recorder`] keeps them in memory.

use std::borrow::Cow;
use std::convert::Infallible;

use prometheus_client::encoding::{DescriptorEncoder, EncodeMetric};
use prometheus_client::metrics::gauge::ConstGauge;
use prometheus_client::metrics::MetricType;

use crate::descriptor::MetricDescriptor;
use crate::extract::Sample;

/// Receives the samples of one metric at a time, in scrape order.
pub trait Sink {
    /// Error returned when the sink cannot accept more samples.
    type Error;

    /// Publishes `descriptor` together with all of its samples for the
    /// current scrape. `samples` may be empty.
    fn emit(
        &mut self,
        descriptor: &MetricDescriptor,
        samples: &[Sample<'_>],
    ) -> Result<(), Self::Error>;
}

/// [`Sink`] writing gauges through a registry's [`DescriptorEncoder`].
#[derive(Debug)]
pub struct EncoderSink<'a> {
    encoder: DescriptorEncoder<'a>,
}

impl<'a> EncoderSink<'a> {
    /// Wraps the encoder handed to a
    /// [`Collector`](prometheus_client::collector::Collector).
    pub fn new(encoder: DescriptorEncoder<'a>) -> Self {
        Self { encoder }
    }
}

impl Sink for EncoderSink<'_> {
    type Error = std::fmt::Error;

    fn emit(
        &mut self,
        descriptor: &MetricDescriptor,
        samples: &[Sample<'_>],
    ) -> Result<(), Self::Error> {
        let mut metric_encoder = self.encoder.encode_descriptor(
            descriptor.name(),
            descriptor.help(),
            None,
            MetricType::Gauge,
        )?;

        if descriptor.label_names().is_empty() {
            // Unlabeled metrics have at most one sample per scrape.
            if let Some(sample) = samples.first() {
                ConstGauge::new(sample.value()).encode(metric_encoder)?;
            }
            return Ok(());
        }

        for sample in samples {
            let labels: Vec<(&str, Cow<'_, str>)> = descriptor
                .label_names()
                .iter()
                .zip(sample.label_values())
                .map(|(name, value)| (name.as_str(), escape_label_value(value)))
                .collect();
            let gauge = ConstGauge::new(sample.value());
            gauge.encode(metric_encoder.encode_family(&labels)?)?;
        }

        Ok(())
    }
}

/// Escapes a label value for the text exposition format. The encoder writes
/// label values verbatim.
fn escape_label_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '"', '\n']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// A sample captured by a [`Recorder`].
#[derive(Clone, Debug, PartialEq)]
pub struct Recorded {
    /// Metric name.
    pub name: String,
    /// Gauge value.
    pub value: f64,
    /// Label values in declaration order.
    pub label_values: Vec<String>,
}

/// [`Sink`] that keeps every emitted sample in memory.
#[derive(Debug, Default)]
pub struct Recorder {
    described: Vec<String>,
    samples: Vec<Recorded>,
}

impl Recorder {
    /// Names of the metrics emitted so far, in emission order.
    pub fn described(&self) -> &[String] {
        &self.described
    }

    /// Samples emitted so far, in emission order.
    pub fn samples(&self) -> &[Recorded] {
        &self.samples
    }

    /// Samples of the metric called `name`.
    pub fn samples_of<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Recorded> {
        self.samples.iter().filter(move |s| s.name == name)
    }
}

impl Sink for Recorder {
    type Error = Infallible;

    fn emit(
        &mut self,
        descriptor: &MetricDescriptor,
        samples: &[Sample<'_>],
    ) -> Result<(), Self::Error> {
        self.described.push(descriptor.name().to_owned());
        self.samples.extend(samples.iter().map(|sample| Recorded {
            name: descriptor.name().to_owned(),
            value: sample.value(),
            label_values: sample.label_values().to_vec(),
        }));
        Ok(())
    }
}
