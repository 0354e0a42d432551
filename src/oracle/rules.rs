//! Deterministic rule-based oracle.
//!
//! Implements the extraction contract (count words, "N piece/pc",
//! "N orders of") and the resolution policy without a model call.
//! Used for offline runs and as the reference behavior in tests.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::oracle::{ExtractionOracle, ExtractionRequest, ResolutionOracle, ResolutionRequest};
use crate::order::price::parse_price;
use crate::order::{
    ClarificationItem, ConfidentMatch, MenuCatalogEntry, NotFoundItem, ParsedOrder,
    ParsedOrderLine, PossibleMatch, ResolutionBucketSet,
};
use crate::text::{
    capitalize, core_tokens, is_size_word, is_stop_word, is_withdrawn, size_tokens, tokens,
    withdrawals,
};

static RESTAURANT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+\b(?:from|at)\s+([^,;!?]+?)[\s.!?]*$").unwrap());

static SEPARATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:[,;&]|[.!?](?:\s+|$)|\band\b|\bplus\b)\s*").unwrap()
});

static EXCLUSION_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:but\s+not|not|without|excluding|except|instead\s+of)\b.*$").unwrap()
});

static EXCLUSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:not|without|excluding|except|instead\s+of)\s+([^,;.!?]+)").unwrap()
});

static WITHDRAWAL_CHUNK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:please\s+)?(?:forget|skip|remove|cancel|drop|never\s*mind)\b").unwrap()
});

static LEAD_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?:actually|okay|ok|um|uh|yes|yeah|so|well|hi|hello|hey|also|then|please|i'?d\s+like|i\s+would\s+like|i\s+want|i'?ll\s+(?:have|take|get)|i\s+will\s+(?:have|take)|can\s+i\s+(?:get|have)|could\s+i\s+(?:get|have)|may\s+i\s+have|give\s+me|get\s+me|let\s+me\s+(?:get|have)|i\s+need|add|make\s+(?:it|that)|order)\b[\s,]*)+",
    )
    .unwrap()
});

static TRAILER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\s+\b(?:please|too|as\s+well|thanks|thank\s+you)\b)+\s*$").unwrap()
});

static ORDERS_OF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\w+)\s+orders?\s+of\s+(.+)$").unwrap());

static PIECE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\w+)[\s-]*(?:pieces?|pcs?)\b").unwrap());

static LEADING_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(a\s+couple\s+of|a\s+couple|a\s+dozen|a\s+few|\d+|a|an|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|dozen)\s+(.+)$",
    )
    .unwrap()
});

static CONJUNCTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+(?:and|but|plus)\s+").unwrap());

static PRICE_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$?\s*(\d+\.\d{2})").unwrap());

const ORDINALS: &[(&str, usize)] = &[("first", 0), ("second", 1), ("third", 2), ("fourth", 3)];
const PLAIN_WORDS: &[&str] = &["regular", "plain", "original", "normal", "classic"];

fn count_word(word: &str) -> Option<u32> {
    let w = word.to_lowercase();
    let w = w.split_whitespace().collect::<Vec<_>>().join(" ");
    let n = match w.as_str() {
        "a" | "an" | "one" => 1,
        "a couple" | "a couple of" | "two" => 2,
        "a few" | "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" | "dozen" | "a dozen" => 12,
        digits => return digits.parse().ok(),
    };
    Some(n)
}

/// Split one chunk into (item, quantity).
fn parse_chunk(chunk: &str) -> Option<ParsedOrderLine> {
    let chunk = EXCLUSION_TAIL.replace(chunk, "");
    let chunk = LEAD_IN.replace(chunk.trim(), "");
    let chunk = TRAILER.replace(chunk.trim(), "");
    let chunk = chunk.trim();
    if chunk.is_empty() {
        return None;
    }

    let (item, quantity) = if let Some(caps) = ORDERS_OF.captures(chunk) {
        (caps[2].to_string(), count_word(&caps[1]).unwrap_or(1))
    } else if PIECE.is_match(chunk) {
        (chunk.to_string(), 1)
    } else if let Some(caps) = LEADING_COUNT.captures(chunk) {
        let rest = caps[2].to_string();
        let quantity = count_word(&caps[1]).unwrap_or(1);
        // "two 10 piece nuggets" keeps the piece count in the name
        (rest, quantity)
    } else {
        (chunk.to_string(), 1)
    };

    let item = item
        .trim()
        .trim_start_matches("the ")
        .trim_start_matches("of ")
        .trim()
        .to_string();
    if tokens(&item).iter().all(|t| is_stop_word(t)) {
        return None;
    }
    Some(ParsedOrderLine::new(item, quantity))
}

/// Token lists named after "not" / "without" / "excluding".
fn exclusion_sets(utterance: &str) -> Vec<Vec<String>> {
    EXCLUSION
        .captures_iter(utterance)
        .filter_map(|caps| {
            let phrase = caps.get(1)?.as_str();
            let phrase = CONJUNCTION.split(phrase).next().unwrap_or(phrase);
            let toks: Vec<String> = tokens(phrase)
                .into_iter()
                .filter(|t| !is_stop_word(t))
                .collect();
            (!toks.is_empty()).then_some(toks)
        })
        .collect()
}

fn contains_all(hay: &[String], needles: &[String]) -> bool {
    needles.iter().all(|n| hay.contains(n))
}

fn contains_sequence(hay: &[String], seq: &[String]) -> bool {
    !seq.is_empty() && hay.windows(seq.len()).any(|w| w == seq)
}

/// An exclusion removes a candidate when it names something the
/// request itself did not ask for.
fn is_excluded(name_tokens: &[String], core: &[String], exclusions: &[Vec<String>]) -> bool {
    exclusions
        .iter()
        .any(|ex| contains_all(name_tokens, ex) && !contains_all(core, ex))
}

struct Candidate<'a> {
    entry: &'a MenuCatalogEntry,
    tokens: Vec<String>,
}

impl Candidate<'_> {
    fn base(&self) -> Vec<String> {
        self.tokens.iter().filter(|t| !is_size_word(t)).cloned().collect()
    }

    fn as_possible(&self) -> PossibleMatch {
        PossibleMatch {
            menu_item: self.entry.name.clone(),
            price: self.entry.price.clone(),
        }
    }
}

fn same_base_and_price(cands: &[&Candidate<'_>]) -> bool {
    let Some(first) = cands.first() else {
        return false;
    };
    let base = first.base();
    let price = parse_price(&first.entry.price);
    price.is_some()
        && cands
            .iter()
            .all(|c| c.base() == base && parse_price(&c.entry.price) == price)
}

fn join_options(options: &[PossibleMatch]) -> String {
    let rendered: Vec<String> = options
        .iter()
        .map(|o| format!("{} ({})", o.menu_item, o.price))
        .collect();
    match rendered.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{}, or {}", init.join(", "), last),
    }
}

fn question(requested: &str, options: &[PossibleMatch]) -> String {
    format!("Which {} would you like: {}?", requested, join_options(options))
}

/// Size to select in the detail view when the matched name lacks it.
fn requested_size(requested: &str, matched_name: &str) -> Option<String> {
    let matched = tokens(matched_name);
    size_tokens(requested)
        .into_iter()
        .find(|s| !matched.contains(s))
        .map(|s| capitalize(&s))
}

enum Bucket {
    Confident(ConfidentMatch),
    Clarify(ClarificationItem),
    NotFound(NotFoundItem),
}

enum Answer {
    Chosen(PossibleMatch, &'static str),
    Narrowed(Vec<PossibleMatch>),
    Unanswered,
}

/// Rule-based extraction and resolution oracle.
#[derive(Debug, Default, Clone)]
pub struct RulesOracle;

impl RulesOracle {
    pub fn new() -> Self {
        Self
    }

    /// Parse an utterance into a structured order.
    pub fn parse(&self, request: &ExtractionRequest) -> ParsedOrder {
        let mut text = request.text.trim().to_string();
        let mut restaurant = None;
        if let Some(caps) = RESTAURANT.captures(&text) {
            restaurant = Some(caps[1].trim().to_string());
            let start = caps.get(0).map(|m| m.start()).unwrap_or(text.len());
            text.truncate(start);
        }

        let items = SEPARATORS
            .split(&text)
            .filter(|chunk| !WITHDRAWAL_CHUNK.is_match(chunk.trim()))
            .filter_map(parse_chunk)
            .collect();

        ParsedOrder {
            restaurant: restaurant.or_else(|| request.restaurant.clone()),
            items,
        }
    }

    fn candidates<'a>(catalog: &'a [MenuCatalogEntry]) -> Vec<Candidate<'a>> {
        catalog
            .iter()
            .map(|entry| Candidate {
                entry,
                tokens: tokens(&entry.name),
            })
            .collect()
    }

    fn confident(line: &ParsedOrderLine, cand: &Candidate<'_>, reason: &str) -> Bucket {
        Bucket::Confident(ConfidentMatch {
            requested_item: line.item.clone(),
            quantity: line.quantity,
            matched_menu_item: cand.entry.name.clone(),
            price: cand.entry.price.clone(),
            size: requested_size(&line.item, &cand.entry.name),
            confidence_reason: Some(reason.to_string()),
        })
    }

    fn resolve_line(
        &self,
        line: &ParsedOrderLine,
        catalog: &[Candidate<'_>],
        exclusions: &[Vec<String>],
    ) -> Bucket {
        let core = core_tokens(&line.item);
        let sizes = size_tokens(&line.item);
        let not_found = || {
            Bucket::NotFound(NotFoundItem {
                requested_item: line.item.clone(),
                quantity: line.quantity,
                suggestion: None,
            })
        };
        if core.is_empty() {
            return not_found();
        }

        let plausible: Vec<&Candidate<'_>> = catalog
            .iter()
            .filter(|c| contains_all(&c.tokens, &core))
            .collect();
        let before = plausible.len();
        let cands: Vec<&Candidate<'_>> = plausible
            .into_iter()
            .filter(|c| !is_excluded(&c.tokens, &core, exclusions))
            .collect();

        match cands.as_slice() {
            [] => return not_found(),
            [only] if cands.len() < before => {
                return Self::confident(line, only, "alternatives excluded");
            }
            [only] => return Self::confident(line, only, "single matching menu item"),
            _ => {}
        }

        let sized: Vec<&Candidate<'_>> = if sizes.is_empty() {
            Vec::new()
        } else {
            cands
                .iter()
                .copied()
                .filter(|c| contains_all(&c.tokens, &sizes))
                .collect()
        };
        if let [only] = sized.as_slice() {
            return Self::confident(line, only, "size named in request");
        }
        if same_base_and_price(&cands) {
            let pick = sized.first().copied().unwrap_or(cands[0]);
            return Self::confident(line, pick, "size variants share one price");
        }

        let shortlist = if sized.len() >= 2 { &sized } else { &cands };
        let options: Vec<PossibleMatch> = shortlist.iter().map(|c| c.as_possible()).collect();
        Bucket::Clarify(ClarificationItem {
            requested_item: line.item.clone(),
            quantity: line.quantity,
            clarification_question: question(&line.item, &options),
            possible_matches: options,
        })
    }

    /// Decide whether `utterance` answers one pending clarification.
    fn answer(
        entry: &ClarificationItem,
        utterance: &str,
        utt_tokens: &[String],
        exclusions: &[Vec<String>],
    ) -> Answer {
        let core = core_tokens(&entry.requested_item);
        let remaining: Vec<(&PossibleMatch, Vec<String>)> = entry
            .possible_matches
            .iter()
            .map(|m| (m, tokens(&m.menu_item)))
            .filter(|(_, t)| !is_excluded(t, &core, exclusions))
            .collect();
        if remaining.is_empty() {
            return Answer::Unanswered;
        }

        // Exact menu entry named; the longest mention wins.
        let named: Vec<(&PossibleMatch, usize)> = remaining
            .iter()
            .filter(|(_, t)| contains_sequence(utt_tokens, t))
            .map(|(m, t)| (*m, t.len()))
            .collect();
        if let Some(longest) = named.iter().map(|(_, n)| *n).max() {
            let best: Vec<_> = named.iter().filter(|(_, n)| *n == longest).collect();
            if let [only] = best.as_slice() {
                return Answer::Chosen(only.0.clone(), "named exact menu item");
            }
        }

        // Distinguishing price.
        let prices: Vec<i64> = PRICE_MENTION
            .captures_iter(utterance)
            .filter_map(|c| parse_price(&format!("${}", &c[1])))
            .collect();
        if !prices.is_empty() {
            let hits: Vec<_> = remaining
                .iter()
                .filter(|(m, _)| parse_price(&m.price).is_some_and(|p| prices.contains(&p)))
                .collect();
            if let [only] = hits.as_slice() {
                return Answer::Chosen(only.0.clone(), "named distinguishing price");
            }
        }

        if remaining.len() >= 2 {
            let common: HashSet<&String> = remaining[0]
                .1
                .iter()
                .filter(|t| remaining.iter().all(|(_, other)| other.contains(*t)))
                .collect();
            let distinct = |t: &Vec<String>| -> Vec<String> {
                t.iter().filter(|x| !common.contains(x)).cloned().collect()
            };

            // Distinguishing word ("the medium one", "diet").
            let hits: Vec<_> = remaining
                .iter()
                .filter(|(_, t)| distinct(t).iter().any(|x| utt_tokens.contains(x)))
                .collect();
            if let [only] = hits.as_slice() {
                return Answer::Chosen(only.0.clone(), "named distinguishing word");
            }

            // "the regular one" picks the variant with nothing extra.
            if utt_tokens.iter().any(|t| PLAIN_WORDS.contains(&t.as_str())) {
                let plain: Vec<_> = remaining
                    .iter()
                    .filter(|(_, t)| distinct(t).is_empty())
                    .collect();
                if let [only] = plain.as_slice() {
                    return Answer::Chosen(only.0.clone(), "asked for the plain variant");
                }
            }

            for (word, index) in ORDINALS {
                if utt_tokens.iter().any(|t| t == word) {
                    if let Some((m, _)) = remaining.get(*index) {
                        return Answer::Chosen((*m).clone(), "picked by position");
                    }
                }
            }
            if utt_tokens.iter().any(|t| t == "last") {
                if let Some((m, _)) = remaining.last() {
                    return Answer::Chosen((*m).clone(), "picked by position");
                }
            }
        }

        if let [(only, _)] = remaining.as_slice() {
            return Answer::Chosen((*only).clone(), "alternatives excluded");
        }
        if remaining.len() < entry.possible_matches.len() {
            return Answer::Narrowed(remaining.into_iter().map(|(m, _)| m.clone()).collect());
        }
        Answer::Unanswered
    }

    /// Resolve a request, first turn or follow-up.
    pub fn resolve_request(&self, request: &ResolutionRequest) -> ResolutionBucketSet {
        let catalog = Self::candidates(&request.menu_catalog);
        let utterance = request.utterance.clone().unwrap_or_default();
        let exclusions = exclusion_sets(&utterance);
        let mut out = ResolutionBucketSet::default();
        let mut answered_vocab: HashSet<String> = HashSet::new();

        if let Some(prior) = &request.previous_resolution {
            out.confident = prior.confident.clone();
            let utt_tokens = tokens(&utterance);
            let withdrawn = withdrawals(&utterance);

            for entry in &prior.needs_clarification {
                if is_withdrawn(&entry.requested_item, &withdrawn) {
                    continue;
                }
                match Self::answer(entry, &utterance, &utt_tokens, &exclusions) {
                    Answer::Chosen(choice, reason) => {
                        answered_vocab.extend(entry.possible_matches.iter().flat_map(|m| tokens(&m.menu_item)));
                        out.confident.push(ConfidentMatch {
                            requested_item: entry.requested_item.clone(),
                            quantity: entry.quantity,
                            size: requested_size(&entry.requested_item, &choice.menu_item),
                            matched_menu_item: choice.menu_item,
                            price: choice.price,
                            confidence_reason: Some(reason.to_string()),
                        });
                    }
                    Answer::Narrowed(options) => {
                        answered_vocab.extend(entry.possible_matches.iter().flat_map(|m| tokens(&m.menu_item)));
                        out.needs_clarification.push(ClarificationItem {
                            requested_item: entry.requested_item.clone(),
                            quantity: entry.quantity,
                            clarification_question: question(&entry.requested_item, &options),
                            possible_matches: options,
                        });
                    }
                    Answer::Unanswered => out.needs_clarification.push(entry.clone()),
                }
            }
            out.not_found.extend(
                prior
                    .not_found
                    .iter()
                    .filter(|nf| !is_withdrawn(&nf.requested_item, &withdrawn))
                    .cloned(),
            );
        }

        let followup = request.previous_resolution.is_some();
        let has_price = PRICE_MENTION.is_match(&utterance);
        for line in &request.parsed_order.items {
            if followup {
                let core = core_tokens(&line.item);
                let consumed = core.iter().all(|t| {
                    answered_vocab.contains(t) || (has_price && t.chars().all(|c| c.is_ascii_digit()))
                });
                if consumed {
                    continue;
                }
            }
            match self.resolve_line(line, &catalog, &exclusions) {
                Bucket::Confident(c) => out.confident.push(c),
                Bucket::Clarify(c) => out.needs_clarification.push(c),
                Bucket::NotFound(n) => out.not_found.push(n),
            }
        }
        out
    }
}

#[async_trait]
impl ExtractionOracle for RulesOracle {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ParsedOrder> {
        Ok(self.parse(request))
    }
}

#[async_trait]
impl ResolutionOracle for RulesOracle {
    async fn resolve(&self, request: &ResolutionRequest) -> Result<ResolutionBucketSet> {
        Ok(self.resolve_request(request))
    }
}
