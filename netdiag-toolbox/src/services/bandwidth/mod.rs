//! Downstream bandwidth measurement.
//!
//! An [`EndpointCatalog`] supplies download targets, the [`BandwidthMeter`]
//! turns concurrent downloads into a lazy sequence of throughput samples, and
//! the [`StreamPublisher`] relays that sequence to a client as SSE frames.

mod catalog;
mod meter;
mod publisher;
mod transport;

pub use catalog::{EndpointCatalog, FastComCatalog, StaticCatalog};
pub use meter::{BandwidthMeter, Measurement, MeterConfig};
pub use publisher::{ChannelSink, EventSink, PublishOutcome, StreamPublisher, encode_event};
pub use transport::{HttpTransport, TransferStream, Transport};
