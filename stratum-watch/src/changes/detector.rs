use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use serde::Serialize;
use strum::Display;

use crate::coinbase::OpReturnRecord;
use crate::decoded::DecodedTemplate;
use crate::tracing::prelude::*;

use super::tag::{ChangeTag, FieldChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// First template seen from the pool.
    First,
    /// A job id the pool already announced recently.
    Duplicate,
    /// A new job id; `changes` lists what differs.
    Updated,
}

/// Result of observing one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateChange {
    pub pool: String,
    pub job_id: String,
    pub kind: ChangeKind,
    pub changes: Vec<FieldChange>,
}

impl TemplateChange {
    pub fn tags(&self) -> impl Iterator<Item = ChangeTag> + '_ {
        self.changes.iter().map(|c| c.tag)
    }

    /// Space-separated tags in comparison order; empty when nothing changed.
    pub fn indicator(&self) -> String {
        self.tags()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Job ids remembered per pool for duplicate detection.
pub const RECENT_JOB_IDS: usize = 64;

#[derive(Debug)]
struct PoolState {
    last: DecodedTemplate,
    seen: LruCache<String, ()>,
}

/// Remembers each pool's last template and diffs the next one against it.
///
/// A job id is a duplicate if it is among the pool's last
/// [`RECENT_JOB_IDS`] announcements, whether or not it became the stored
/// template.
#[derive(Debug, Default)]
pub struct TemplateChangeDetector {
    pools: HashMap<String, PoolState>,
}

impl TemplateChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, next: &DecodedTemplate) -> TemplateChange {
        let pool = next.pool_name().to_string();
        let job_id = next.job_id().to_string();

        let Some(state) = self.pools.get_mut(&pool) else {
            let mut seen = LruCache::new(
                NonZeroUsize::new(RECENT_JOB_IDS).unwrap_or(NonZeroUsize::MIN),
            );
            seen.put(job_id.clone(), ());
            self.pools.insert(
                pool.clone(),
                PoolState {
                    last: next.clone(),
                    seen,
                },
            );
            return TemplateChange {
                pool,
                job_id,
                kind: ChangeKind::First,
                changes: Vec::new(),
            };
        };

        if state.seen.contains(job_id.as_str()) {
            return TemplateChange {
                pool,
                job_id,
                kind: ChangeKind::Duplicate,
                changes: Vec::new(),
            };
        }

        state.seen.put(job_id.clone(), ());
        let changes = diff(&state.last, next);

        if next.height() >= state.last.height() {
            state.last = next.clone();
        } else {
            debug!(
                pool = %pool,
                job_id = %job_id,
                height = next.height(),
                stored_height = state.last.height(),
                "Late template, keeping stored one"
            );
        }

        let change = TemplateChange {
            pool,
            job_id,
            kind: ChangeKind::Updated,
            changes,
        };
        trace!(pool = %change.pool, indicator = %change.indicator(), "Template changed");
        change
    }

    /// True if `job_id` is among the pool's recent announcements.
    pub fn is_duplicate(&self, pool: &str, job_id: &str) -> bool {
        self.pools
            .get(pool)
            .is_some_and(|state| state.seen.contains(job_id))
    }

    pub fn last(&self, pool: &str) -> Option<&DecodedTemplate> {
        self.pools.get(pool).map(|state| &state.last)
    }

    pub fn reset(&mut self) {
        self.pools.clear();
    }
}

struct Diff(Vec<FieldChange>);

impl Diff {
    fn field<T: PartialEq>(
        &mut self,
        tag: ChangeTag,
        before: &T,
        after: &T,
        render: impl Fn(&T) -> String,
    ) {
        if before != after {
            self.0.push(FieldChange {
                tag,
                before: render(before),
                after: render(after),
            });
        }
    }

    fn shown<T: PartialEq + fmt::Display>(&mut self, tag: ChangeTag, before: &T, after: &T) {
        self.field(tag, before, after, ToString::to_string);
    }

    fn optional<T: PartialEq + fmt::Display>(
        &mut self,
        tag: ChangeTag,
        before: &Option<T>,
        after: &Option<T>,
    ) {
        self.field(tag, before, after, |v| match v {
            Some(v) => v.to_string(),
            None => "none".to_string(),
        });
    }
}

fn diff(prev: &DecodedTemplate, next: &DecodedTemplate) -> Vec<FieldChange> {
    let (a, b) = (&prev.template, &next.template);
    let mut d = Diff(Vec::new());

    d.field(
        ChangeTag::MerkleBranches,
        &prev.merkle_branches_display,
        &next.merkle_branches_display,
        |branches| branches.join(","),
    );

    if !a.clean_jobs && b.clean_jobs {
        d.0.push(FieldChange {
            tag: ChangeTag::CleanJobs,
            before: "false".to_string(),
            after: "true".to_string(),
        });
    }

    d.field(ChangeTag::PrevHash, &a.prev_hash, &b.prev_hash, |hash| {
        crate::template::prev_hash_display(hash).unwrap_or_else(|| hash.clone())
    });
    d.shown(ChangeTag::Height, &a.height, &b.height);
    d.field(ChangeTag::Version, &a.version_u32(), &b.version_u32(), hex_word);
    d.field(ChangeTag::Nbits, &a.nbits_u32(), &b.nbits_u32(), hex_word);
    d.field(ChangeTag::Ntime, &a.ntime_u32(), &b.ntime_u32(), hex_word);
    d.shown(
        ChangeTag::Extranonce2Length,
        &a.extranonce2_length,
        &b.extranonce2_length,
    );

    d.optional(ChangeTag::TxVersion, &prev.tx_version, &next.tx_version);
    d.optional(ChangeTag::InputSequence, &prev.input_sequence, &next.input_sequence);
    d.optional(ChangeTag::LockTime, &prev.lock_time, &next.lock_time);
    d.optional(ChangeTag::WitnessNonce, &prev.witness_nonce, &next.witness_nonce);
    d.optional(ChangeTag::AsciiTag, &prev.ascii_tag, &next.ascii_tag);
    d.shown(ChangeTag::OutputValue, &prev.total_output_sat, &next.total_output_sat);

    let structure = |t: &DecodedTemplate| -> Vec<String> {
        t.outputs.iter().map(|o| o.structure()).collect()
    };
    d.field(
        ChangeTag::OutputStructure,
        &structure(prev),
        &structure(next),
        |s| s.join(" | "),
    );

    let (before, after) = (prev.protocols(), next.protocols());
    let families: BTreeSet<_> = before.keys().chain(after.keys()).copied().collect();
    for family in families {
        match (before.get(&family), after.get(&family)) {
            (None, Some(added)) => d.0.push(FieldChange {
                tag: ChangeTag::ProtocolAdded(family),
                before: "none".to_string(),
                after: payloads(added),
            }),
            (Some(removed), None) => d.0.push(FieldChange {
                tag: ChangeTag::ProtocolRemoved(family),
                before: payloads(removed),
                after: "none".to_string(),
            }),
            (Some(old), Some(new)) if old != new => d.0.push(FieldChange {
                tag: ChangeTag::ProtocolChanged(family),
                before: payloads(old),
                after: payloads(new),
            }),
            _ => {}
        }
    }

    d.0
}

fn hex_word(value: &Option<u32>) -> String {
    match value {
        Some(v) => format!("{v:08x}"),
        None => "none".to_string(),
    }
}

fn payloads(records: &[&OpReturnRecord]) -> String {
    records
        .iter()
        .map(|r| r.payload_hex.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
