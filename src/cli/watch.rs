//! `watch` command.
//!
//! Executes the selected routes once, then again every time the cache evicts
//! an entry. Evictions arriving in a burst (an editor saving several files,
//! a `git checkout`) are coalesced into one rebuild.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use tola_bundle::logger::{status_error, status_success};
use tola_bundle::{AssetPipeline, Fingerprint, Lookup, RequestContext, log};

/// How often the loop checks for Ctrl+C while idle.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

pub fn run_watch(pipeline: Arc<AssetPipeline>, routes: &[String], debounce: Duration) -> Result<()> {
    if !pipeline.cache().is_enabled() {
        bail!("watch needs `[pipeline] cache = true`");
    }

    let routes: Vec<String> = if routes.is_empty() {
        pipeline
            .assets()
            .iter()
            .map(|asset| asset.route().to_string())
            .collect()
    } else {
        routes.to_vec()
    };
    if routes.is_empty() {
        bail!("no bundles configured and no routes given");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .map_err(|e| anyhow!("failed to set Ctrl+C handler: {}", e))?;

    // Subscribe before the first build so no eviction is missed.
    let evictions = pipeline.cache().subscribe();
    log!("watch"; "watching {} route(s)", routes.len());
    rebuild(&pipeline, &routes);

    while !shutdown.load(Ordering::SeqCst) {
        match evictions.recv_timeout(SHUTDOWN_POLL) {
            Ok(key) => {
                tola_bundle::debug!("watch"; "evicted {}", key);
                if !settle(&evictions, debounce) {
                    break;
                }
                rebuild(&pipeline, &routes);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    log!("watch"; "shutting down...");
    Ok(())
}

/// Wait until no eviction has arrived for `debounce`. False once the cache is gone.
fn settle(evictions: &Receiver<Fingerprint>, debounce: Duration) -> bool {
    loop {
        match evictions.recv_timeout(debounce) {
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => return true,
            Err(RecvTimeoutError::Disconnected) => return false,
        }
    }
}

/// Execute every route and report a one-line status.
fn rebuild(pipeline: &AssetPipeline, routes: &[String]) {
    let started = Instant::now();
    let results = pipeline.execute_many(routes, &RequestContext::new());

    let mut rebuilt = Vec::new();
    let mut failures = Vec::new();
    for (route, result) in routes.iter().zip(results) {
        match result {
            Ok(output) if output.lookup == Lookup::Hit => {}
            Ok(_) => rebuilt.push(route.as_str()),
            Err(e) => failures.push(format!("{route}: {e}")),
        }
    }

    if failures.is_empty() {
        status_success(&format!(
            "rebuilt {} in {:?}",
            if rebuilt.is_empty() { "nothing".to_string() } else { rebuilt.join(", ") },
            started.elapsed()
        ));
    } else {
        let summary = format!(
            "{} route{} failed",
            failures.len(),
            if failures.len() == 1 { "" } else { "s" }
        );
        status_error(&summary, &failures.join("\n"));
    }
}
