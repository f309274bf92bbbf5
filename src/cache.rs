//! Response cache.
//!
//! Stores complete envelopes keyed by the SHA-256 of the normalized query.
//! A lookup is a hit when the normalized query matches exactly (confidence
//! `1.0`) or when a stored query is a near match:
//!
//! - both carry the same identifiers (any token with a digit, so ticket
//!   keys, version numbers, and counts), and
//! - their word sequences reach the configured minimum similarity, scored
//!   as `2 * LCS / (|a| + |b|)` over tokens.
//!
//! Word order counts: "assigned to alice by bob" is not a near match for
//! "assigned to bob by alice".
//!
//! Entries expire after `ttl_secs`; beyond `max_entries` the oldest entry
//! is evicted.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::CacheConfig;
use crate::envelope::ResponseEnvelope;

struct Entry {
    key: String,
    tokens: Vec<String>,
    identifiers: BTreeSet<String>,
    envelope: ResponseEnvelope,
    stored_at: Instant,
}

/// A cached envelope and how closely its query matched.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub envelope: ResponseEnvelope,
    pub confidence: f64,
}

pub struct ResponseCache {
    ttl: Duration,
    max_entries: usize,
    min_confidence: f64,
    entries: Mutex<Vec<Entry>>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries.max(1),
            min_confidence: config.min_confidence,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn lookup(&self, query: &str) -> Option<CacheHit> {
        let normalized = normalize_query(query);
        let key = cache_key(&normalized);
        let tokens = tokens(&normalized);
        let identifiers = identifiers(&tokens);

        let mut entries = self.entries.lock().ok()?;
        let ttl = self.ttl;
        entries.retain(|e| e.stored_at.elapsed() < ttl);

        if let Some(entry) = entries.iter().find(|e| e.key == key) {
            debug!(key = %key, "cache hit (exact)");
            return Some(CacheHit {
                envelope: entry.envelope.clone(),
                confidence: 1.0,
            });
        }

        let best = entries
            .iter()
            .filter(|e| e.identifiers == identifiers)
            .map(|e| (sequence_similarity(&tokens, &e.tokens), e))
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))?;
        if best.0 >= self.min_confidence {
            debug!(confidence = best.0, "cache hit (similar)");
            Some(CacheHit {
                envelope: best.1.envelope.clone(),
                confidence: best.0,
            })
        } else {
            None
        }
    }

    pub fn store(&self, query: &str, envelope: &ResponseEnvelope) {
        let normalized = normalize_query(query);
        let key = cache_key(&normalized);
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.retain(|e| e.key != key);
        let tokens = tokens(&normalized);
        entries.push(Entry {
            key,
            identifiers: identifiers(&tokens),
            tokens,
            envelope: envelope.clone(),
            stored_at: Instant::now(),
        });
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowercase, keep letters, digits, and `-`, collapse whitespace.
pub fn normalize_query(query: &str) -> String {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex SHA-256 of an already-normalized query.
pub fn cache_key(normalized: &str) -> String {
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

fn tokens(normalized: &str) -> Vec<String> {
    normalized.split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// Tokens that name a specific thing: ticket keys, numbers, versions.
fn identifiers(tokens: &[String]) -> BTreeSet<String> {
    tokens
        .iter()
        .filter(|t| t.chars().any(|c| c.is_ascii_digit()))
        .cloned()
        .collect()
}

/// `2 * LCS(a, b) / (|a| + |b|)` over token sequences, `0.0` when both are
/// empty.
pub fn sequence_similarity(a: &[String], b: &[String]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 0.0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            row[j + 1] = if x == y {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    2.0 * prev[b.len()] as f64 / total as f64
}
