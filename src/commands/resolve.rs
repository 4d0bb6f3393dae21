use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use super::{OpenedStores, load_cart_lines, load_remote_history};
use crate::cli::ResolveArgs;
use crate::engine::coalescer::PdValues;
use crate::engine::{
    CandidateStores, CanonicalPrescription, coalesce, collect, commit_session_claim,
    extras_for_line, resolve,
};
use crate::model::{ActiveLineSet, CandidateSource, CartLine, JsonMap, MatchKind};
use crate::store::load_selection_flow;
use crate::util::{now_utc_string, sha256_json, write_json_pretty};

#[derive(Debug, Clone, Serialize)]
struct LineResolution {
    line_id: String,
    product_sku: Option<String>,
    record_sku: Option<String>,
    candidates: usize,
    source: Option<CandidateSource>,
    match_kind: Option<MatchKind>,
    created_at: Option<i64>,
    pd: Option<PdValues>,
    pd_display: Option<String>,
    prescription: Option<CanonicalPrescription>,
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    generated_at: String,
    active_lines: usize,
    resolved: usize,
    lines: Vec<LineResolution>,
}

#[derive(Debug, Serialize)]
struct ResolveReport {
    generated_at: String,
    cart_path: PathBuf,
    history_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    history_records: usize,
    lines: Vec<ReportLine>,
}

#[derive(Debug, Serialize)]
struct ReportLine {
    line_id: String,
    candidates: usize,
    source: Option<CandidateSource>,
    match_kind: Option<MatchKind>,
    pd_display: Option<String>,
    record_sha256: Option<String>,
}

pub fn run(args: ResolveArgs) -> Result<()> {
    let lines = load_cart_lines(&args.cart)?;
    let history = match &args.history {
        Some(path) => load_remote_history(path)?,
        None => Vec::new(),
    };

    let targets = select_lines(&lines, args.line.as_deref())?;

    let opened = OpenedStores::open_existing(&args.store)?;
    let device = opened.device();
    let session = opened.session();
    let stores = CandidateStores {
        device_local: &device,
        session: &session,
        remote_history: &history,
    };
    let flows = load_selection_flow(&session);
    let active = ActiveLineSet::from_lines(&lines);

    info!(
        cart = %args.cart.display(),
        lines = lines.len(),
        targets = targets.len(),
        history = history.len(),
        persistent = opened.is_persistent(),
        "resolving cart prescriptions"
    );

    let results = targets
        .into_iter()
        .map(|line| resolve_line(line, &active, &stores, &flows))
        .collect::<Vec<LineResolution>>();

    let resolved = results
        .iter()
        .filter(|result| result.prescription.is_some())
        .count();
    info!(resolved, unresolved = results.len() - resolved, "resolution finished");

    if let Some(report_path) = &args.report_path {
        let report = build_report(&args, &opened, history.len(), &results)?;
        write_json_pretty(report_path, &report)?;
        info!(path = %report_path.display(), "wrote resolution report");
    }

    if args.json {
        write_json_response(ResolveResponse {
            generated_at: now_utc_string(),
            active_lines: active.len(),
            resolved,
            lines: results,
        })
    } else {
        write_text_response(&results)
    }
}

fn select_lines<'a>(lines: &'a [CartLine], only: Option<&str>) -> Result<Vec<&'a CartLine>> {
    let Some(only) = only else {
        return Ok(lines.iter().collect());
    };

    let selected = lines
        .iter()
        .filter(|line| line.line_id == only.trim())
        .collect::<Vec<&CartLine>>();
    if selected.is_empty() {
        bail!("line {only} is not in the cart");
    }
    Ok(selected)
}

fn resolve_line(
    line: &CartLine,
    active: &ActiveLineSet,
    stores: &CandidateStores<'_>,
    flows: &JsonMap,
) -> LineResolution {
    let candidates = collect(line, active, stores);
    let mut result = LineResolution {
        line_id: line.line_id.clone(),
        product_sku: line.product_sku().map(ToOwned::to_owned),
        record_sku: None,
        candidates: candidates.len(),
        source: None,
        match_kind: None,
        created_at: None,
        pd: None,
        pd_display: None,
        prescription: None,
    };

    let Some(chosen) = resolve(&candidates) else {
        return result;
    };
    commit_session_claim(line, chosen, stores.session);

    let canonical = coalesce(&chosen.record, &extras_for_line(line, flows));
    if !canonical.has_pd() {
        warn!(line_id = %line.line_id, source = chosen.source.as_str(), "resolved prescription has no pd");
    }

    result.source = Some(chosen.source);
    result.match_kind = Some(chosen.match_kind);
    result.record_sku = chosen.association.product_sku.clone();
    result.created_at = chosen.created_at;
    result.pd = Some(canonical.pd().clone());
    result.pd_display = canonical.pd_display();
    result.prescription = Some(canonical);
    result
}

fn build_report(
    args: &ResolveArgs,
    opened: &OpenedStores,
    history_records: usize,
    results: &[LineResolution],
) -> Result<ResolveReport> {
    let mut lines = Vec::<ReportLine>::with_capacity(results.len());
    for result in results {
        let record_sha256 = match &result.prescription {
            Some(prescription) => Some(sha256_json(prescription.record()).with_context(|| {
                format!("failed to digest prescription for line {}", result.line_id)
            })?),
            None => None,
        };

        lines.push(ReportLine {
            line_id: result.line_id.clone(),
            candidates: result.candidates,
            source: result.source,
            match_kind: result.match_kind,
            pd_display: result.pd_display.clone(),
            record_sha256,
        });
    }

    Ok(ResolveReport {
        generated_at: now_utc_string(),
        cart_path: args.cart.clone(),
        history_path: args.history.clone(),
        db_path: opened.is_persistent().then(|| args.store.db_path()),
        history_records,
        lines,
    })
}

fn write_json_response(response: ResolveResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &response)
        .context("failed to serialize resolve json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(results: &[LineResolution]) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Lines: {}", results.len())?;
    for result in results {
        let sku = result.product_sku.as_deref().unwrap_or("-");
        match (result.source, result.match_kind) {
            (Some(source), Some(match_kind)) => {
                writeln!(
                    output,
                    "{}\tsku={}\tsource={} match={} candidates={}",
                    result.line_id,
                    sku,
                    source.as_str(),
                    match_kind.as_str(),
                    result.candidates,
                )?;
                writeln!(
                    output,
                    "\tpd={}",
                    result.pd_display.as_deref().unwrap_or("none")
                )?;
            }
            _ => {
                writeln!(
                    output,
                    "{}\tsku={}\tno prescription (candidates={})",
                    result.line_id, sku, result.candidates
                )?;
            }
        }
    }

    output.flush()?;
    Ok(())
}
