use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tartwatch_commons::TracingErrorReporter;
use tartwatch_config::SettingsHandle;
use tartwatch_core::{ConnectionEvent, TelemetryEngine};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::CliContext;
use super::args::WatchArgs;
use super::output;

/// Follow the push channel until Ctrl+C or until reconnecting gives up.
pub async fn handle_watch_command(ctx: &CliContext, args: &WatchArgs) -> Result<()> {
    let settings = SettingsHandle::new(ctx.config().clone());
    let engine = TelemetryEngine::builder(settings)
        .error_reporter(Arc::new(TracingErrorReporter))
        .filter(args.filter())
        .start()
        .await
        .context("Failed to start telemetry engine")?;

    let cancel_token = CancellationToken::new();
    let signal_task = spawn_signal_handler(cancel_token.clone());
    let outcome = follow(ctx, args, &engine, &cancel_token).await;

    signal_task.abort();
    engine.shutdown().await;
    outcome
}

async fn follow(
    ctx: &CliContext,
    args: &WatchArgs,
    engine: &TelemetryEngine,
    cancel_token: &CancellationToken,
) -> Result<()> {
    let mut events = engine.subscribe_events();
    let mut notices = engine.connection().subscribe_connection();
    let mut summary = summary_interval(args.interval);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                if ctx.json {
                    output::print_json_line(&event)?;
                } else {
                    println!("{}", output::event_line(&event));
                }
            }
            notice = notices.recv() => match notice {
                Some(ConnectionEvent::ReconnectExhausted { attempts }) => {
                    bail!("Lost the push channel; gave up after {attempts} reconnect attempts");
                }
                Some(_) => {}
                None => break,
            },
            () = tick(&mut summary) => {
                let overview = engine.overview();
                if ctx.json {
                    output::print_json_line(&overview)?;
                } else {
                    println!("{}", output::overview_line(&overview));
                }
            }
        }
    }

    if events.dropped() > 0 {
        tracing::warn!(dropped = events.dropped(), "watch output fell behind and skipped events");
    }
    Ok(())
}

fn summary_interval(seconds: u64) -> Option<Interval> {
    (seconds > 0).then(|| {
        let mut interval = tokio::time::interval(Duration::from_secs(seconds));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    })
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn spawn_signal_handler(cancel_token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    tracing::warn!(error = %err, "failed to listen for Ctrl+C");
                    return;
                }
                tracing::info!("interrupt received, shutting down");
                cancel_token.cancel();
            }
            () = cancel_token.cancelled() => {}
        }
    })
}
