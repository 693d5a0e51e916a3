use std::io;
use std::path::PathBuf;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing::info;

use crate::server::{self, Config};

#[derive(Parser, Debug)]
#[command(name = "picovm-dap")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Debug Adapter Protocol bridge for the picovm execution engine",
    long_about = None
)]
pub struct Cli {
    /// Engine executable spawned for each debug session
    #[arg(long, value_name = "COMMAND", default_value = "picovm")]
    engine: String,

    /// Source program used when a launch request omits its `source` field
    #[arg(long, value_name = "PATH")]
    source: Option<PathBuf>,
}

impl Cli {
    pub fn run(self) -> miette::Result<()> {
        // The protocol stream owns stdout; diagnostics go to stderr.
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("picovm_dap=info")),
            )
            .with_writer(io::stderr)
            .init();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .into_diagnostic()?;

        let result = runtime.block_on(server::start(Config {
            engine: self.engine,
            fallback_source: self.source,
        }));
        info!("bridge stopped");
        result.map_err(|e| miette::miette!("{e}"))
    }
}
