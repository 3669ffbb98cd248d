use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use dvb_inspector::descriptors::Charset;
use dvb_inspector::{Options, TransportStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[clap(about = "Decode an MPEG transport stream file and print its structure as JSON")]
struct Opt {
    /// Transport stream file
    path: PathBuf,

    /// Packet size (188, 192, 204 or 208) instead of probing
    #[clap(long)]
    packet_size: Option<usize>,

    /// Print the full entity tree instead of the summary
    #[clap(long, default_value_t = false)]
    tree: bool,

    /// Skip elementary-stream decoding
    #[clap(long, default_value_t = false)]
    no_es: bool,

    /// Character table for strings without a selector (e.g. ISO-8859-1)
    #[clap(long)]
    charset: Option<String>,

    /// private_data_specifier assumed when none is signalled (hex or decimal)
    #[clap(long)]
    pds: Option<String>,

    /// PES packets kept per PID
    #[clap(long)]
    max_pes: Option<usize>,

    /// Debug logging (RUST_LOG overrides)
    #[clap(short, long, default_value_t = false)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn parse_u32(s: &str) -> anyhow::Result<u32> {
    let v = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };
    Ok(v)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    init_logging(opt.verbose);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping scan");
            on_signal.cancel();
        }
    });

    let mut options = Options {
        packet_size: opt.packet_size,
        decode_elementary_streams: !opt.no_es,
        retain_pes_payloads: false,
        max_pes_per_pid: opt.max_pes,
        ..Options::default()
    }
    .with_cancel(cancel);
    if let Some(name) = &opt.charset {
        options.default_charset = Charset::from_name(name).ok_or_else(|| anyhow!("unknown charset {}", name))?;
    }
    if let Some(pds) = &opt.pds {
        options.default_private_data_specifier = Some(parse_u32(pds).context("invalid --pds")?);
    }

    let ts = TransportStream::open_async(&opt.path, options)
        .await
        .with_context(|| format!("decoding {}", opt.path.display()))?;
    info!(
        packets = ts.counters().packets,
        bitrate = ts.bitrate().unwrap_or(0.0),
        cancelled = ts.was_cancelled(),
        "done"
    );

    let out = if opt.tree {
        serde_json::to_string_pretty(&ts.tree())?
    } else {
        ts.summary().to_json()
    };
    println!("{}", out);
    Ok(())
}
