use anyhow::Context;
use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};

use amqp_message_remover::cli::{Cli, CliCommand, write_markdown_docs};
use amqp_message_remover::observer::{Observer, ProgressSink, StopPolicy};
use amqp_message_remover::queue::AmqpClient;
use amqp_message_remover::remover::{Status, remove_messages};

/// indicatif bar sized to the prefetch window.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(len: u64) -> Self {
        let bar = ProgressBar::new(len);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{bar:40.cyan/blue}] {pos}/{len} {percent}% {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn update(&mut self, value: u64, status: &Status) {
        self.bar.set_position(value);
        self.bar
            .set_message(format!("processed {} removed {}", status.processed, status.removed));
    }

    fn finish(&mut self) {
        self.bar.abandon();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, next to the progress bar.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Some(CliCommand::Doc { dir }) = &cli.command {
        let written = write_markdown_docs(&Cli::command(), dir)
            .with_context(|| format!("Failed to write docs to {}", dir.display()))?;
        for path in written {
            tracing::info!(path = %path.display(), "Wrote documentation");
        }
        return Ok(());
    }

    let config = cli.remove.to_config().context("Invalid arguments")?;

    let client = AmqpClient::connect(&config.dsn).await?;
    let mut run = remove_messages(client, &config)
        .await
        .context("Could not start consumer")?;

    let mut observer = Observer::new(
        StopPolicy::for_config(&config),
        BarProgress::new(u64::from(config.prefetch)),
    );
    let observation = observer
        .observe(run.status(), tokio::signal::ctrl_c())
        .await;

    let status = run.shutdown().await?;
    tracing::info!(
        reason = ?observation.reason,
        processed = status.processed,
        removed = status.removed,
        "Removal finished"
    );

    eprintln!("done");
    Ok(())
}
