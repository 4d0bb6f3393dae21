use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use super::{OpenedStores, load_cart_lines, load_remote_history};
use crate::cli::CheckoutArgs;
use crate::engine::{CandidateStores, build_order_prescriptions};
use crate::store::load_selection_flow;
use crate::util::write_json_pretty;

pub fn run(args: CheckoutArgs) -> Result<()> {
    let lines = load_cart_lines(&args.cart)?;
    let history = match &args.history {
        Some(path) => load_remote_history(path)?,
        None => Vec::new(),
    };

    let opened = OpenedStores::open_existing(&args.store)?;
    let device = opened.device();
    let session = opened.session();
    let stores = CandidateStores {
        device_local: &device,
        session: &session,
        remote_history: &history,
    };
    let flows = load_selection_flow(&session);

    let entries = build_order_prescriptions(&lines, &stores, &flows);
    let missing_pd = entries.iter().filter(|entry| !entry.pd_provided).count();
    info!(
        lines = lines.len(),
        prescriptions = entries.len(),
        missing_pd,
        "built order prescription metadata"
    );

    match &args.output {
        Some(path) => {
            write_json_pretty(path, &entries)?;
            info!(path = %path.display(), "wrote order prescription metadata");
        }
        None => {
            let mut output = io::BufWriter::new(io::stdout().lock());
            serde_json::to_writer_pretty(&mut output, &entries)
                .context("failed to serialize order prescription metadata")?;
            writeln!(output)?;
            output.flush()?;
        }
    }

    Ok(())
}
