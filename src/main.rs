use std::time::{Duration, Instant};

use launchpad::{Context, Dispatcher, DispatcherConfig, TaskRequest};

#[tokio::main]
async fn main() -> launchpad::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = DispatcherConfig::from_env()?;
    eprintln!("🚀 launchpad v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Background workers: {}", config.background_workers);
    eprintln!("   Main thread: {}\n", config.main_thread_name);

    let dispatcher = Dispatcher::from_config(&config)?;
    let mut failures = dispatcher.subscribe_failures();

    // ── async: value comes back through the handle ─────────────────────
    let sum = dispatcher
        .async_task(TaskRequest::new(), || async { Ok(1 + 1) })
        .await?;
    eprintln!("   async 1 + 1 = {sum}");

    // ── launch with hooks routed to main ───────────────────────────────
    let checker = dispatcher.clone();
    let job = dispatcher.launch_handle_on_main(
        TaskRequest::new()
            .initially(|| eprintln!("   initially on caller thread"))
            .on_error(move |err| {
                eprintln!(
                    "   on_error (main: {}): {err}",
                    checker.is_current(Context::Main)
                );
            })
            .finally(|| eprintln!("   finally")),
        || async { Err::<(), _>(anyhow::anyhow!("simulated failure")) },
    );
    eprintln!("   launch_handle_on_main finished as {}", job.join().await);

    // ── unhandled failure surfaces on the failure channel ──────────────
    dispatcher.launch(TaskRequest::new(), || async {
        Err::<(), _>(anyhow::anyhow!("nobody handles this"))
    });
    match failures.recv().await {
        Ok(report) => match serde_json::to_string(&report) {
            Ok(json) => eprintln!("   failure report: {json}"),
            Err(e) => tracing::warn!(error = %e, "Could not serialize failure report"),
        },
        Err(e) => tracing::warn!(error = %e, "Failure channel closed"),
    }

    // ── delay, then a cancelled delay ──────────────────────────────────
    let started = Instant::now();
    let delayed = dispatcher.delay_then_call_on_main(
        Context::Background,
        Duration::from_millis(200),
        move || eprintln!("   delayed call after {:?}", started.elapsed()),
    );
    let cancelled = dispatcher.delay(Context::Background, Duration::from_millis(200), || {
        eprintln!("   this never prints");
    });
    cancelled.cancel();
    eprintln!(
        "   delay: {}, cancelled delay: {}",
        delayed.join().await,
        cancelled.join().await
    );

    dispatcher.shutdown();
    Ok(())
}
