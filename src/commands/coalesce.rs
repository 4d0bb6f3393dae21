use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use super::{OpenedStores, load_cart_lines, load_object, load_record, load_remote_history};
use crate::cli::CoalesceArgs;
use crate::engine::{
    CandidateStores, CanonicalPrescription, CoalesceExtras, coalesce, extras_for_line,
    resolve_for_line,
};
use crate::model::{ActiveLineSet, JsonMap};
use crate::store::load_selection_flow;

pub fn run(args: CoalesceArgs) -> Result<()> {
    let opened = OpenedStores::open_existing(&args.store)?;
    let flows = load_selection_flow(&opened.session());

    let canonical = match (&args.record, &args.cart, &args.line) {
        (Some(record_path), _, _) => coalesce_record(&args, record_path, &flows)?,
        (None, Some(cart_path), Some(line_id)) => {
            let Some(canonical) = coalesce_line(&args, &opened, cart_path, line_id, &flows)? else {
                warn!(line_id = %line_id, "no prescription resolved for line");
                return Ok(());
            };
            canonical
        }
        _ => bail!("pass --record, or --cart together with --line"),
    };

    info!(
        mode = canonical.pd().mode.as_str(),
        has_pd = canonical.has_pd(),
        pd = %canonical.pd_display().unwrap_or_default(),
        "coalesced prescription record"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &canonical)
        .context("failed to serialize coalesced record")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn coalesce_record(
    args: &CoalesceArgs,
    record_path: &Path,
    flows: &JsonMap,
) -> Result<CanonicalPrescription> {
    let record = load_record(record_path)?;
    let options = match &args.options {
        Some(path) => Some(load_object(path)?),
        None => None,
    };

    let extras = CoalesceExtras {
        line_options: options.as_ref(),
        selection_flow: Some(flows),
        sku: args.sku.as_deref(),
    };
    Ok(coalesce(&record, &extras))
}

fn coalesce_line(
    args: &CoalesceArgs,
    opened: &OpenedStores,
    cart_path: &Path,
    line_id: &str,
    flows: &JsonMap,
) -> Result<Option<CanonicalPrescription>> {
    let lines = load_cart_lines(cart_path)?;
    let Some(line) = lines.iter().find(|line| line.line_id == line_id.trim()) else {
        bail!("line {line_id} is not in the cart");
    };
    let history = match &args.history {
        Some(path) => load_remote_history(path)?,
        None => Vec::new(),
    };

    let device = opened.device();
    let session = opened.session();
    let stores = CandidateStores {
        device_local: &device,
        session: &session,
        remote_history: &history,
    };
    let active = ActiveLineSet::from_lines(&lines);

    Ok(resolve_for_line(line, &active, &stores)
        .map(|record| coalesce(&record, &extras_for_line(line, flows))))
}
