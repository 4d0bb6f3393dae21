use tracing::debug;

use crate::model::{CandidateRecord, CandidateSource, RecordKind};

pub fn resolve(candidates: &[CandidateRecord]) -> Option<&CandidateRecord> {
    let tier = candidates
        .iter()
        .filter_map(|candidate| {
            candidate
                .source
                .precedence()
                .map(|rank| (rank, candidate.source))
        })
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, source)| source)?;

    let group = candidates
        .iter()
        .filter(|candidate| candidate.source == tier)
        .collect::<Vec<&CandidateRecord>>();

    let pool = if tier == CandidateSource::RemoteHistory {
        prefer_photos(group)
    } else {
        group
    };

    let chosen = latest(pool);
    if let Some(candidate) = chosen {
        debug!(
            source = candidate.source.as_str(),
            match_kind = candidate.match_kind.as_str(),
            created_at = ?candidate.created_at,
            "resolved prescription"
        );
    }
    chosen
}

fn prefer_photos(group: Vec<&CandidateRecord>) -> Vec<&CandidateRecord> {
    let photos = group
        .iter()
        .copied()
        .filter(|candidate| candidate.record.kind() == Some(RecordKind::Photo))
        .collect::<Vec<&CandidateRecord>>();

    if photos.is_empty() { group } else { photos }
}

fn latest<'a>(pool: Vec<&'a CandidateRecord>) -> Option<&'a CandidateRecord> {
    let mut best: Option<&CandidateRecord> = None;
    for candidate in pool {
        match best {
            Some(current) if candidate.recency() <= current.recency() => {}
            _ => best = Some(candidate),
        }
    }
    best
}
