pub mod checkout;
pub mod coalescer;
pub mod collector;
pub mod fields;
pub mod identity;
pub mod resolver;

pub use checkout::build_order_prescriptions;
pub use coalescer::{CanonicalPrescription, CoalesceExtras, PdMode, coalesce};
pub use collector::{CandidateStores, collect, commit_session_claim};
pub use resolver::resolve;

use crate::model::{ActiveLineSet, CandidateRecord, CartLine, JsonMap, PrescriptionRecord};

#[derive(Debug, Clone)]
pub struct ResolvedLine {
    pub candidate: CandidateRecord,
    pub canonical: CanonicalPrescription,
}

pub fn resolve_for_line(
    line: &CartLine,
    active: &ActiveLineSet,
    stores: &CandidateStores<'_>,
) -> Option<PrescriptionRecord> {
    resolve_candidate_for_line(line, active, stores).map(|candidate| candidate.record)
}

pub fn resolve_candidate_for_line(
    line: &CartLine,
    active: &ActiveLineSet,
    stores: &CandidateStores<'_>,
) -> Option<CandidateRecord> {
    let candidates = collect(line, active, stores);
    let chosen = resolve(&candidates)?.clone();
    commit_session_claim(line, &chosen, stores.session);
    Some(chosen)
}

pub fn resolve_and_coalesce(
    line: &CartLine,
    active: &ActiveLineSet,
    stores: &CandidateStores<'_>,
    selection_flow: &JsonMap,
) -> Option<ResolvedLine> {
    let candidate = resolve_candidate_for_line(line, active, stores)?;
    let canonical = coalesce(&candidate.record, &extras_for_line(line, selection_flow));
    Some(ResolvedLine {
        candidate,
        canonical,
    })
}

pub fn extras_for_line<'a>(line: &'a CartLine, selection_flow: &'a JsonMap) -> CoalesceExtras<'a> {
    CoalesceExtras {
        line_options: line.options.as_ref(),
        selection_flow: Some(selection_flow),
        sku: line.product_sku(),
    }
}
