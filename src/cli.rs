//! Command line interface for the wirepoll demo binary.
//!
//! The binary serves a single long-poll exchange over in-memory channels,
//! which makes the read/dispatch/write cycle easy to observe with
//! `RUST_LOG=debug`.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `wirepoll` binary.
#[derive(Debug, Parser)]
#[command(
    name = "wirepoll",
    version,
    about = "Serve one in-memory long-poll exchange and print the response"
)]
pub struct Cli {
    /// JSON request body.
    #[arg(
        short,
        long,
        default_value = r#"[{"channel":"/meta/connect","clientId":"demo"}]"#
    )]
    pub body: String,
    /// Charset declared in the request content type. The body bytes are sent
    /// as given.
    #[arg(long, default_value = "UTF-8")]
    pub charset: String,
    /// Bytes per body chunk handed to the transport.
    #[arg(long, default_value_t = 7)]
    pub chunk_size: usize,
    /// Undelivered response bytes before the response sink stalls.
    #[arg(long, default_value_t = 16)]
    pub high_water: usize,
    /// Long-poll hold time in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,
    /// Interval timeout armed after the response, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub interval_ms: u64,
    /// Hold `/meta/connect` and publish this data to the session after
    /// `--publish-after-ms`.
    #[arg(long)]
    pub publish: Option<String>,
    /// Delay before publishing, in milliseconds.
    #[arg(long, default_value_t = 200)]
    pub publish_after_ms: u64,
    /// Address for the Prometheus exporter.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
