use crate::cli::download;
use clap::Parser;
use std::path::MAIN_SEPARATOR;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let f_appender =
        tracing_appender::rolling::hourly(format!(".{}", MAIN_SEPARATOR), "ck101.log");
    let (non_blk, _guard) = tracing_appender::non_blocking(f_appender);
    let console_filter = if cli.verbose {
        "libck101=info"
    } else {
        "libck101=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(tracing_subscriber::fmt::format().pretty())
                .with_writer(non_blk)
                .with_filter(EnvFilter::new("libck101=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(
                    tracing_subscriber::fmt::format()
                        .compact()
                        .with_target(false)
                        .without_time(),
                )
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(console_filter)),
        )
        .init();

    if download(cli).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
