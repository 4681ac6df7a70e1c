use anyhow::Result;
use std::time::Instant;
use tracing::{error, info, warn};

use dashlink::cache::log_cache_status;
use dashlink::config::Config;
use dashlink::{DashlinkError, ResultSet, Runtime};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.clone())
        .init();

    info!("dashlink v{}", env!("CARGO_PKG_VERSION"));

    let runtime = Runtime::from_config(&config);

    let context = match runtime.context().await {
        Ok(context) => context,
        Err(e) => {
            error!("[{}] {}", e.error_code(), e);
            if let Some(hint) = e.hint() {
                error!("hint: {}", hint);
            }
            std::process::exit(1);
        }
    };

    if context.is_ambient() {
        info!("Running inside the host platform ({})", context.session().describe());
    } else {
        info!("Running locally with {} ({})", context.kind(), context.session().describe());
    }
    info!("Session: {}", context.session_info());

    let Some(sql) = config.sql.as_deref() else {
        info!("No --sql given; session resolved, nothing else to do");
        return Ok(());
    };

    let outcome = if config.async_query {
        run_async(&runtime, &config, sql).await
    } else if config.no_cache {
        let statement = dashlink::Statement::new(sql, Vec::new());
        context.session().query(&statement).await
    } else {
        runtime.query(sql, &[]).await
    };

    match outcome {
        Ok(result) => println!("{result}"),
        Err(e) => {
            error!("[{}] {}", e.error_code(), e);
            std::process::exit(1);
        }
    }

    log_cache_status(&runtime.cache_status());
    Ok(())
}

/// Submit without blocking and report status until the result arrives or the
/// overall wait runs out
async fn run_async(runtime: &Runtime, config: &Config, sql: &str) -> dashlink::Result<ResultSet> {
    let dispatcher = runtime.dispatcher().await?;
    let handle = dispatcher.submit(sql, &[]);
    info!("Submitted query {}", handle.id());

    let started = Instant::now();
    let deadline = config.await_timeout_duration();
    loop {
        match dispatcher.await_result(&handle, config.poll_interval_duration()).await {
            Err(DashlinkError::Timeout(_)) if started.elapsed() < deadline => {
                info!("Query {} status: {}", handle.id(), dispatcher.poll(&handle));
            }
            Err(DashlinkError::Timeout(_)) => {
                warn!("Giving up after {:?}; cancelling query {}", deadline, handle.id());
                dispatcher.cancel(&handle).await;
                return Err(DashlinkError::Timeout(deadline));
            }
            other => return other,
        }
    }
}
