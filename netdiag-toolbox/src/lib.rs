//! Network diagnostics toolbox
//!
//! 提供网络诊断功能：ICMP ping 统计、WHOIS、DNS 地址查询，以及带实时进度推送的下行带宽测量。
//! 每次操作独立运行，不保存历史结果。

mod error;
mod services;
mod types;

pub use error::{ToolboxError, ToolboxResult};
pub use services::bandwidth::{
    BandwidthMeter, ChannelSink, EndpointCatalog, EventSink, FastComCatalog, HttpTransport,
    Measurement, MeterConfig, PublishOutcome, StaticCatalog, StreamPublisher, TransferStream,
    Transport, encode_event,
};
pub use services::probe::{
    DEFAULT_REQUEST_COUNT, EchoReply, EchoRequest, EchoSocket, IcmpFamily, IcmpNetwork,
    MAX_REQUEST_COUNT, PingConfig, Pinger, ReplyKind, SystemIcmpNetwork,
};
pub use services::resolver::{HostResolver, SystemResolver};
pub use services::{ToolboxService, ToolboxServiceBuilder};
pub use types::{
    LookupResult, MeterEvent, ProbeResult, ProbeStatistics, ProbeStatus, RunState, RunSummary,
    StopReason, ThroughputSample, WhoisResult,
};
