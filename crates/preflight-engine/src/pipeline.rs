//! End-to-end evaluation: archive bytes in, grouped report out.
//!
//! The pipeline is linear and all-or-nothing: locate the manifest, decode it,
//! evaluate every rule, group the results. Any stage failure aborts the request
//! with a single [`PreflightError`].

use crate::archive::extract_by_suffix;
use crate::catalogue::{load_catalogue, CatalogueSource, RuleCatalogue};
use crate::config::EngineConfig;
use crate::context::RequestContext;
use crate::error::{LimitKind, PreflightError, PreflightResult};
use crate::evaluate::evaluate_rules;
use crate::manifest::decode_manifest;
use crate::report::ComplianceReport;
use std::sync::Arc;
use std::time::Instant;

/// Evaluate an archive against an already loaded catalogue.
///
/// The configured timeout applies when `ctx` carries no deadline of its own.
pub fn evaluate(
    archive: &[u8],
    catalogue: &RuleCatalogue,
    config: &EngineConfig,
    ctx: &RequestContext,
) -> PreflightResult<ComplianceReport> {
    let span = tracing::info_span!(
        "preflight.evaluate",
        archive_bytes = archive.len(),
        catalogue = %catalogue.source(),
    );
    let _enter = span.enter();
    let started = Instant::now();

    let ctx = effective_context(ctx, config);

    let entry = extract_by_suffix(archive, &config.manifest_suffix, config.limits, &ctx)?;

    ctx.checkpoint("manifest decode")?;
    let document = decode_manifest(&entry.bytes, config.limits.max_manifest_depth)
        .map_err(|e| e.with_context(format!("entry '{}'", entry.path)))?;
    drop(entry);

    let results = evaluate_rules(&document, catalogue.rules(), &ctx)?;
    if results.len() != catalogue.len() {
        return Err(PreflightError::internal(format!(
            "evaluated {} results for {} rules",
            results.len(),
            catalogue.len()
        )));
    }

    ctx.checkpoint("report aggregation")?;
    let report = ComplianceReport::aggregate(results);

    tracing::info!(
        rules = report.summary.total,
        passed = report.summary.passed,
        failed = report.summary.failed,
        failed_critical = report.summary.failed_critical,
        sections = report.sections.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Evaluation complete"
    );
    Ok(report)
}

/// Load the catalogue fresh from `source`, then evaluate.
///
/// The catalogue is loaded before the archive is touched, so a broken catalogue
/// fails the request even for an unreadable archive.
pub fn evaluate_with_source(
    archive: &[u8],
    source: &CatalogueSource,
    config: &EngineConfig,
    ctx: &RequestContext,
) -> PreflightResult<ComplianceReport> {
    ctx.checkpoint("catalogue load")?;
    let catalogue = load_catalogue(source)?;
    evaluate(archive, &catalogue, config, ctx)
}

/// Run [`evaluate`] on the blocking pool, bounded by the configured timeout.
///
/// On timeout the request context is cancelled so the blocking task stops at its
/// next checkpoint, and `ResourceLimitExceeded(Timeout)` is returned.
pub async fn evaluate_async(
    archive: Vec<u8>,
    catalogue: Arc<RuleCatalogue>,
    config: EngineConfig,
    ctx: RequestContext,
) -> PreflightResult<ComplianceReport> {
    let cancel = ctx.cancel_flag();
    let timeout = config.timeout();

    let handle = tokio::task::spawn_blocking(move || evaluate(&archive, &catalogue, &config, &ctx));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "Evaluation timed out");
                return Err(PreflightError::limit_exceeded(
                    LimitKind::Timeout,
                    format!("evaluation exceeded {} ms", limit.as_millis()),
                ));
            }
        },
        None => handle.await,
    };

    joined.map_err(|e| {
        PreflightError::internal(format!("evaluation task failed: {}", e)).with_source(e)
    })?
}

fn effective_context(ctx: &RequestContext, config: &EngineConfig) -> RequestContext {
    match (ctx.deadline(), config.timeout()) {
        (None, Some(timeout)) => ctx.clone().timeout(timeout),
        _ => ctx.clone(),
    }
}
