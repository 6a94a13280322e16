use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shelfwatch_common::Config;
use shelfwatch_store::{connect, migrate};
use shelfwatch_watcher::feed::HttpCatalogFeed;
use shelfwatch_watcher::notify::{NoopSink, NotifySink, WeComWebhook};
use shelfwatch_watcher::run::Watcher;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("shelfwatch=info".parse()?))
        .init();

    info!("Shelfwatch starting...");

    let config = Config::from_env();
    config.log_redacted();

    let pool = connect(&config.database_url).await?;
    migrate(&pool).await?;

    let sink: Box<dyn NotifySink> = match &config.webhook_url {
        Some(url) => Box::new(WeComWebhook::new(url.clone())),
        None => {
            info!("No WECOM_WEBHOOK_URL set, delivery disabled");
            Box::new(NoopSink)
        }
    };
    let feed = Box::new(HttpCatalogFeed::new(config.catalog_url.clone()));

    let mut watcher = Watcher::new(config, feed, sink, pool);
    match watcher.run().await {
        Ok(summary) => {
            info!(
                pages = summary.pages_fetched,
                failed_pages = summary.pages_failed,
                snapshot = summary.snapshot_titles,
                new = summary.new_titles,
                published = summary.published_titles,
                "Run complete"
            );
            Ok(())
        }
        Err(e) => {
            // State consistency can't be guaranteed without the store, so the
            // run fails; tell subscribers before the scheduler sees the exit.
            error!(error = %e, "Run aborted");
            watcher.notify_failure(&e.to_string()).await;
            Err(e.into())
        }
    }
}
