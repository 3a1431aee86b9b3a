//! sam-prep CLI
//!
//! Checkpoint download, SAM mask generation and batch image download.

#[cfg(feature = "cli")]
use sam_prep::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
