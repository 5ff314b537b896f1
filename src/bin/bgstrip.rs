//! bgstrip CLI tool
//!
//! Removes near-white and near-gray backgrounds from PNG/JPEG images.

#[cfg(feature = "cli")]
use bgstrip::cli;

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
