use std::path::PathBuf;

use feed_receiver::app::App;
use feed_receiver::config::Config;
use feed_receiver::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Batch files to reconcile, `-` for stdin
    let paths: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        eprintln!("Usage: feed-receiver <batch.json>... (use - for stdin)");
        std::process::exit(2);
    }

    let config = Config::load()?;
    let app = App::new(&config).await?;

    let requested = paths.len();
    let reports = app.receive_files(paths).await;
    for report in &reports {
        println!("{}", report);
    }

    if reports.len() < requested {
        eprintln!("{} of {} batches could not be received", requested - reports.len(), requested);
        std::process::exit(1);
    }

    Ok(())
}
