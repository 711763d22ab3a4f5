use crate::search::space::TrialConfig;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub hex: String,
    pub components: Vec<String>,
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Deterministic fingerprint of one search point. Two trials with the same
/// fingerprint evaluate the same pipeline configuration.
pub fn trial_fingerprint(trial: &TrialConfig) -> Fingerprint {
    let mut parts = Vec::new();

    // Retrieval
    parts.push(format!("entity_limit={}", trial.entity_limit));
    parts.push(format!("fact_limit={}", trial.fact_limit));
    parts.push(format!("reranker={}", trial.reranker));
    parts.push(format!("baseline={}", trial.baseline));

    // Generation
    parts.push(format!("model={}", trial.model));
    parts.push(format!("summarization={}", trial.summarization));

    // Pipeline changes between releases invalidate old trials.
    parts.push(format!("ragsweep_version={}", env!("CARGO_PKG_VERSION")));

    let raw = parts.join("\n");
    let hex = sha256_hex(&raw);

    Fingerprint {
        hex,
        components: parts,
    }
}
