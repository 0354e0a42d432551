//! Order Resolution Engine.
//!
//! The oracle does the matching; the engine bounds it with a deadline,
//! absorbs its failures, and enforces the bucket invariants on whatever
//! comes back:
//!
//! - every name in `confident_matches` / `possible_matches` is a catalog
//!   entry, with the catalog's price;
//! - on a first turn, each requested line lands in exactly one bucket
//!   with its original quantity;
//! - on a follow-up turn, previous confident matches are carried forward
//!   unchanged and pending items stay pending until answered or withdrawn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::oracle::{ResolutionOracle, ResolutionRequest};
use crate::order::price::parse_price;
use crate::order::{
    ClarificationItem, ConfidentMatch, MenuCatalogEntry, NotFoundItem, ParsedOrder,
    ParsedOrderLine, PossibleMatch, ResolutionBucketSet,
};
use crate::text::{core_tokens, is_withdrawn, normalize, tokens, withdrawals};

pub struct ResolutionEngine {
    oracle: Arc<dyn ResolutionOracle>,
    deadline: Duration,
}

impl ResolutionEngine {
    pub fn new(oracle: Arc<dyn ResolutionOracle>, deadline: Duration) -> Self {
        Self { oracle, deadline }
    }

    /// Resolve parsed lines against `catalog`.
    ///
    /// With `prior`, the call is a clarification turn and `utterance`
    /// answers entries of `prior.needs_clarification`.  Oracle failure
    /// yields an empty set on a first turn and `prior` unchanged on a
    /// follow-up.
    pub async fn resolve(
        &self,
        parsed: &ParsedOrder,
        catalog: &[MenuCatalogEntry],
        prior: Option<&ResolutionBucketSet>,
        utterance: Option<&str>,
    ) -> ResolutionBucketSet {
        let request = ResolutionRequest {
            parsed_order: parsed.clone(),
            menu_catalog: catalog.to_vec(),
            previous_resolution: prior.cloned(),
            utterance: utterance.map(str::to_string),
        };

        let raw = match tokio::time::timeout(self.deadline, self.oracle.resolve(&request)).await {
            Ok(Ok(set)) => set,
            Ok(Err(e)) => {
                warn!("Resolution oracle failed: {:#}", e);
                return prior.cloned().unwrap_or_default();
            }
            Err(_) => {
                warn!(
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Resolution oracle timed out"
                );
                return prior.cloned().unwrap_or_default();
            }
        };

        let checked = reconcile_with_catalog(raw, catalog);
        let set = match prior {
            None => enforce_partition(checked, &parsed.items),
            Some(prior) => carry_forward(checked, prior, utterance),
        };
        info!(
            clear = set.confident.len(),
            unclear = set.needs_clarification.len(),
            missing = set.not_found.len(),
            followup = prior.is_some(),
            "Order resolved"
        );
        set
    }
}

/// Catalog lookup by folded name; duplicate names keep every price.
struct CatalogIndex<'a> {
    by_name: HashMap<String, Vec<&'a MenuCatalogEntry>>,
}

impl<'a> CatalogIndex<'a> {
    fn new(catalog: &'a [MenuCatalogEntry]) -> Self {
        let mut by_name: HashMap<String, Vec<&'a MenuCatalogEntry>> = HashMap::new();
        for entry in catalog {
            by_name.entry(normalize(&entry.name)).or_default().push(entry);
        }
        Self { by_name }
    }

    /// Exact catalog entry for an oracle-reported name, preferring the
    /// entry whose price agrees when the name is ambiguous.
    fn lookup(&self, name: &str, price: &str) -> Option<&'a MenuCatalogEntry> {
        let entries = self.by_name.get(&normalize(name))?;
        let wanted = parse_price(price);
        entries
            .iter()
            .find(|e| wanted.is_some() && parse_price(&e.price) == wanted)
            .or_else(|| entries.first())
            .copied()
    }
}

fn key(item: &str) -> String {
    tokens(item).join(" ")
}

/// Pin oracle output to real catalog entries.
///
/// Confident names that are not on the menu become not-found; candidate
/// lists are filtered to the menu, and a list that collapses to one
/// entry is promoted.
pub fn reconcile_with_catalog(
    set: ResolutionBucketSet,
    catalog: &[MenuCatalogEntry],
) -> ResolutionBucketSet {
    let index = CatalogIndex::new(catalog);
    let mut out = ResolutionBucketSet::default();

    for mut m in set.confident {
        match index.lookup(&m.matched_menu_item, &m.price) {
            Some(entry) => {
                m.matched_menu_item = entry.name.clone();
                m.price = entry.price.clone();
                out.confident.push(m);
            }
            None => {
                debug!(item = %m.matched_menu_item, "Confident match is not on the menu");
                out.not_found.push(NotFoundItem {
                    requested_item: m.requested_item,
                    quantity: m.quantity,
                    suggestion: None,
                });
            }
        }
    }

    for c in set.needs_clarification {
        let mut options: Vec<PossibleMatch> = Vec::new();
        for p in &c.possible_matches {
            if let Some(entry) = index.lookup(&p.menu_item, &p.price) {
                let option = PossibleMatch {
                    menu_item: entry.name.clone(),
                    price: entry.price.clone(),
                };
                if !options.contains(&option) {
                    options.push(option);
                }
            }
        }
        match options.len() {
            0 => out.not_found.push(NotFoundItem {
                requested_item: c.requested_item,
                quantity: c.quantity,
                suggestion: None,
            }),
            1 => {
                let only = options.remove(0);
                out.confident.push(ConfidentMatch {
                    requested_item: c.requested_item,
                    quantity: c.quantity,
                    matched_menu_item: only.menu_item,
                    price: only.price,
                    size: None,
                    confidence_reason: Some("only candidate on the menu".to_string()),
                });
            }
            _ => {
                let question = if c.clarification_question.trim().is_empty() {
                    default_question(&c.requested_item, &options)
                } else {
                    c.clarification_question
                };
                out.needs_clarification.push(ClarificationItem {
                    requested_item: c.requested_item,
                    quantity: c.quantity,
                    possible_matches: options,
                    clarification_question: question,
                });
            }
        }
    }

    out.not_found.extend(set.not_found);
    out
}

fn default_question(item: &str, options: &[PossibleMatch]) -> String {
    let names: Vec<String> = options
        .iter()
        .map(|o| format!("{} ({})", o.menu_item, o.price))
        .collect();
    format!("Which {} did you mean: {}?", item, names.join(", "))
}

/// How strongly an oracle entry's wording points at a parsed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Affinity {
    None,
    /// Some core word in common.
    Overlap,
    /// One side's core words contain the other's ("fries" / "medium fries").
    Subset,
    /// Same folded, singularized wording.
    Exact,
}

fn is_subset(small: &[String], big: &[String]) -> bool {
    !small.is_empty() && small.iter().all(|t| big.contains(t))
}

/// True when two item phrases name the same request.
fn same_request(a: &str, b: &str) -> bool {
    if key(a) == key(b) {
        return true;
    }
    let (ca, cb) = (core_tokens(a), core_tokens(b));
    is_subset(&ca, &cb) || is_subset(&cb, &ca)
}

/// One oracle entry waiting to be bound to a parsed line.
enum Claim {
    Confident(ConfidentMatch),
    Clarify(ClarificationItem),
    Missing(NotFoundItem),
}

impl Claim {
    fn requested(&self) -> &str {
        match self {
            Claim::Confident(m) => &m.requested_item,
            Claim::Clarify(c) => &c.requested_item,
            Claim::Missing(n) => &n.requested_item,
        }
    }

    fn affinity(&self, line: &ParsedOrderLine) -> Affinity {
        let requested = self.requested();
        if key(requested) == key(&line.item) {
            return Affinity::Exact;
        }
        let (mine, theirs) = (core_tokens(requested), core_tokens(&line.item));
        let named = match self {
            Claim::Confident(m) => is_subset(&theirs, &tokens(&m.matched_menu_item)),
            _ => false,
        };
        if is_subset(&mine, &theirs) || is_subset(&theirs, &mine) || named {
            Affinity::Subset
        } else if mine.iter().any(|t| theirs.contains(t)) {
            Affinity::Overlap
        } else {
            Affinity::None
        }
    }

    fn bind(self, line: &ParsedOrderLine, out: &mut ResolutionBucketSet) {
        let requested_item = line.item.clone();
        let quantity = line.quantity;
        match self {
            Claim::Confident(m) => out.confident.push(ConfidentMatch {
                requested_item,
                quantity,
                ..m
            }),
            Claim::Clarify(c) => out.needs_clarification.push(ClarificationItem {
                requested_item,
                quantity,
                ..c
            }),
            Claim::Missing(n) => out.not_found.push(NotFoundItem {
                requested_item,
                quantity,
                ..n
            }),
        }
    }
}

/// Make the buckets a partition of `lines`.
///
/// Entries are bound to lines in passes of decreasing affinity: same
/// folded wording, then core words contained either way (or the line
/// naming the matched item), then any shared word.  When the leftovers
/// pair up one to one they are bound in order; an entry that only
/// repeats an already-bound line never takes part in that.  Bound
/// entries take the line's wording and quantity, surplus entries are
/// dropped, and lines nobody answered for become not-found.
pub fn enforce_partition(set: ResolutionBucketSet, lines: &[ParsedOrderLine]) -> ResolutionBucketSet {
    if set.is_empty() {
        return set;
    }

    let claims: Vec<Claim> = set
        .confident
        .into_iter()
        .map(Claim::Confident)
        .chain(set.needs_clarification.into_iter().map(Claim::Clarify))
        .chain(set.not_found.into_iter().map(Claim::Missing))
        .collect();
    let mut bound: Vec<Option<usize>> = vec![None; claims.len()];
    let mut taken = vec![false; lines.len()];

    for floor in [Affinity::Exact, Affinity::Subset, Affinity::Overlap] {
        for (ci, claim) in claims.iter().enumerate() {
            if bound[ci].is_some() {
                continue;
            }
            let best = lines
                .iter()
                .enumerate()
                .filter(|(li, _)| !taken[*li])
                .map(|(li, line)| (claim.affinity(line), li))
                .filter(|(affinity, _)| *affinity >= floor)
                .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
            if let Some((_, li)) = best {
                bound[ci] = Some(li);
                taken[li] = true;
            }
        }
    }

    let leftover_claims: Vec<usize> = (0..claims.len())
        .filter(|&ci| bound[ci].is_none())
        .filter(|&ci| {
            !lines
                .iter()
                .enumerate()
                .any(|(li, line)| taken[li] && claims[ci].affinity(line) >= Affinity::Subset)
        })
        .collect();
    let leftover_lines: Vec<usize> = (0..lines.len()).filter(|&li| !taken[li]).collect();
    if !leftover_claims.is_empty() && leftover_claims.len() == leftover_lines.len() {
        for (&ci, &li) in leftover_claims.iter().zip(&leftover_lines) {
            debug!(
                item = %claims[ci].requested(),
                line = %lines[li].item,
                "Binding entry to a line by position"
            );
            bound[ci] = Some(li);
            taken[li] = true;
        }
    }

    let mut out = ResolutionBucketSet::default();
    for (claim, slot) in claims.into_iter().zip(bound) {
        match slot {
            Some(li) => claim.bind(&lines[li], &mut out),
            None => debug!(item = %claim.requested(), "Dropping surplus oracle entry"),
        }
    }
    for (line, _) in lines.iter().zip(taken).filter(|(_, t)| !t) {
        warn!(item = %line.item, "Oracle skipped a requested line");
        out.not_found.push(NotFoundItem {
            requested_item: line.item.clone(),
            quantity: line.quantity,
            suggestion: None,
        });
    }
    out
}

/// Merge a follow-up result onto `prior`.
///
/// Previous confident matches come first, unchanged.  Anything the new
/// result says about an already-settled item (an echo, a different match,
/// a move back into another bucket) is dropped.  Pending clarifications
/// and not-found items the new result leaves out are kept, unless the
/// customer withdrew them in `utterance` or a new match answers them.
pub fn carry_forward(
    set: ResolutionBucketSet,
    prior: &ResolutionBucketSet,
    utterance: Option<&str>,
) -> ResolutionBucketSet {
    let settled: Vec<String> = prior.confident.iter().map(|m| key(&m.requested_item)).collect();
    let mut out = ResolutionBucketSet {
        confident: prior.confident.clone(),
        ..Default::default()
    };
    let mut answers: Vec<String> = Vec::new();
    for m in set.confident {
        if settled.contains(&key(&m.requested_item)) {
            debug!(item = %m.requested_item, "Ignoring result for a settled item");
            continue;
        }
        answers.push(normalize(&m.matched_menu_item));
        out.confident.push(m);
    }
    out.needs_clarification = set
        .needs_clarification
        .into_iter()
        .filter(|c| !settled.contains(&key(&c.requested_item)))
        .collect();
    out.not_found = set
        .not_found
        .into_iter()
        .filter(|n| !settled.contains(&key(&n.requested_item)))
        .collect();

    let mentioned: Vec<String> = out.requested_lines()[prior.confident.len()..]
        .iter()
        .map(|(requested, _)| requested.clone())
        .collect();
    let accounted = |item: &str| mentioned.iter().any(|m| same_request(m, item));
    let withdrawn = utterance.map(withdrawals).unwrap_or_default();
    for c in &prior.needs_clarification {
        let answered = c
            .possible_matches
            .iter()
            .any(|p| answers.contains(&normalize(&p.menu_item)));
        if answered || accounted(&c.requested_item) {
            continue;
        }
        if is_withdrawn(&c.requested_item, &withdrawn) {
            info!(item = %c.requested_item, "Customer withdrew a pending item");
            continue;
        }
        debug!(item = %c.requested_item, "Keeping unanswered clarification");
        out.needs_clarification.push(c.clone());
    }
    for n in &prior.not_found {
        if accounted(&n.requested_item) {
            continue;
        }
        if is_withdrawn(&n.requested_item, &withdrawn) {
            info!(item = %n.requested_item, "Customer withdrew a pending item");
            continue;
        }
        debug!(item = %n.requested_item, "Keeping unresolved not-found item");
        out.not_found.push(n.clone());
    }
    out
}
