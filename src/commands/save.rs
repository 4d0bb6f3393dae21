use anyhow::{Result, bail};
use tracing::info;

use super::{OpenedStores, load_record};
use crate::cli::{ForgetArgs, SaveArgs, SelectPdArgs};
use crate::store::{
    PdSelection, forget_line, record_device_prescription, record_selection_pd,
    record_session_prescription,
};

pub fn run(args: SaveArgs) -> Result<()> {
    let record = load_record(&args.record)?;

    let opened = OpenedStores::open_or_create(&args.store)?;
    let saved = record_device_prescription(
        &opened.device(),
        &record,
        Some(args.line.as_str()),
        Some(args.sku.as_str()),
    )?;
    record_session_prescription(&opened.session(), &args.sku, &saved)?;

    info!(
        line_id = %args.line,
        sku = %args.sku,
        kind = saved.kind().map(|kind| kind.as_str()).unwrap_or("unknown"),
        created_at = ?saved.created_at(),
        db_path = %args.store.db_path().display(),
        "saved prescription"
    );
    Ok(())
}

pub fn run_select_pd(args: SelectPdArgs) -> Result<()> {
    let selection = PdSelection {
        right: args.right,
        left: args.left,
        single: args.single,
        mode: args.mode.map(Into::into),
    };
    if selection == PdSelection::default() {
        bail!("nothing to record; pass at least one of --right, --left, --single or --mode");
    }

    let opened = OpenedStores::open_or_create(&args.store)?;
    record_selection_pd(&opened.session(), &args.sku, &selection)?;

    info!(
        sku = %args.sku,
        right = ?selection.right,
        left = ?selection.left,
        single = ?selection.single,
        mode = ?selection.mode.map(|mode| mode.as_str()),
        "recorded lens-selection pd"
    );
    Ok(())
}

pub fn run_forget(args: ForgetArgs) -> Result<()> {
    let opened = OpenedStores::open_existing(&args.store)?;
    let removed = forget_line(&opened.device(), &args.line)?;

    info!(line_id = %args.line, removed, "forgot device prescriptions for line");
    Ok(())
}
