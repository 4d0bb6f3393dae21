use serde::Serialize;
use tracing::debug;

use super::{
    CandidateStores, CanonicalPrescription, coalesce, extras_for_line, resolve_and_coalesce,
};
use crate::model::{ActiveLineSet, CandidateSource, CartLine, JsonMap, PrescriptionRecord};

#[derive(Debug, Clone, Serialize)]
pub struct OrderPrescription {
    pub cart_id: String,
    pub product_id: Option<String>,
    pub source: CandidateSource,
    pub pd_provided: bool,
    pub prescription: CanonicalPrescription,
}

pub fn build_order_prescriptions(
    lines: &[CartLine],
    stores: &CandidateStores<'_>,
    selection_flow: &JsonMap,
) -> Vec<OrderPrescription> {
    let active = ActiveLineSet::from_lines(lines);
    let mut out = Vec::<OrderPrescription>::new();

    for line in lines {
        let (source, prescription) =
            match resolve_and_coalesce(line, &active, stores, selection_flow) {
                Some(resolved) => (resolved.candidate.source, resolved.canonical),
                None => {
                    let pd_only = coalesce(
                        &PrescriptionRecord::default(),
                        &extras_for_line(line, selection_flow),
                    );
                    if !pd_only.has_pd() {
                        debug!(line_id = %line.line_id, "no prescription for line");
                        continue;
                    }
                    debug!(line_id = %line.line_id, "pd-only prescription from line options");
                    (CandidateSource::SelectionFlow, pd_only)
                }
            };

        out.push(OrderPrescription {
            cart_id: line.line_id.clone(),
            product_id: line.product_sku().map(ToOwned::to_owned),
            source,
            pd_provided: prescription.has_pd(),
            prescription,
        });
    }

    debug!(
        lines = lines.len(),
        with_prescription = out.len(),
        "built order prescription metadata"
    );
    out
}
