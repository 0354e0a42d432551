//! Order data model shared by every stage of the pipeline.
//!
//! Wire names follow the oracle contract (`confident_matches`,
//! `clarification_needed`, `not_found`, ...), so the same types
//! deserialize LLM output and serialize HTTP responses.

pub mod price;

use serde::{Deserialize, Serialize};

/// One scraped menu item.  Immutable for the lifetime of an ordering session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuCatalogEntry {
    /// Site-assigned identifier, unique within a catalog.
    pub item_id: String,
    pub name: String,
    /// Currency-formatted, e.g. `"$5.99"`.
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_description: Option<String>,
}

impl MenuCatalogEntry {
    pub fn new(item_id: impl Into<String>, name: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            name: name.into(),
            price: price.into(),
            raw_description: None,
        }
    }
}

/// A single requested line as produced by the extraction oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedOrderLine {
    pub item: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

impl ParsedOrderLine {
    pub fn new(item: impl Into<String>, quantity: u32) -> Self {
        Self {
            item: item.into(),
            quantity: quantity.max(1),
        }
    }
}

fn default_quantity() -> u32 {
    1
}

/// Structured order extracted from one utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedOrder {
    #[serde(default)]
    pub restaurant: Option<String>,
    #[serde(default)]
    pub items: Vec<ParsedOrderLine>,
}

impl ParsedOrder {
    /// The neutral result every extraction failure degrades to.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A requested item resolved to exactly one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidentMatch {
    pub requested_item: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub matched_menu_item: String,
    #[serde(default)]
    pub price: String,
    /// Requested size/variant to pick in the item's detail view, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_reason: Option<String>,
}

/// One candidate offered back to the user during clarification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PossibleMatch {
    pub menu_item: String,
    #[serde(default)]
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationItem {
    pub requested_item: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub possible_matches: Vec<PossibleMatch>,
    #[serde(default)]
    pub clarification_question: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotFoundItem {
    pub requested_item: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Defined by the oracle contract; may legitimately stay empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Three-way partition of the requested lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionBucketSet {
    #[serde(rename = "confident_matches", default)]
    pub confident: Vec<ConfidentMatch>,
    #[serde(rename = "clarification_needed", default)]
    pub needs_clarification: Vec<ClarificationItem>,
    #[serde(default)]
    pub not_found: Vec<NotFoundItem>,
}

/// Item counts per bucket, as shown to the user alongside a resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionSummary {
    pub total_items: usize,
    pub clear_items: usize,
    pub unclear_items: usize,
    pub missing_items: usize,
}

impl ResolutionBucketSet {
    /// True when any bucket other than `confident` has entries.
    pub fn needs_followup(&self) -> bool {
        !self.needs_clarification.is_empty() || !self.not_found.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.confident.is_empty() && !self.needs_followup()
    }

    pub fn total_items(&self) -> usize {
        self.confident.len() + self.needs_clarification.len() + self.not_found.len()
    }

    pub fn summary(&self) -> ResolutionSummary {
        ResolutionSummary {
            total_items: self.total_items(),
            clear_items: self.confident.len(),
            unclear_items: self.needs_clarification.len(),
            missing_items: self.not_found.len(),
        }
    }

    /// `(requested_item, quantity)` for every entry across all buckets.
    pub fn requested_lines(&self) -> Vec<(String, u32)> {
        self.confident
            .iter()
            .map(|c| (c.requested_item.clone(), c.quantity))
            .chain(
                self.needs_clarification
                    .iter()
                    .map(|c| (c.requested_item.clone(), c.quantity)),
            )
            .chain(self.not_found.iter().map(|n| (n.requested_item.clone(), n.quantity)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartLineStatus {
    Success,
    Failed,
    Error,
}

/// Outcome of actuating one confirmed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineResult {
    pub item: String,
    pub quantity: u32,
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Incremental price of the selected variant, e.g. `"$0.60"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    pub added: bool,
    pub status: CartLineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CartLineResult {
    pub fn failed(line: &ConfidentMatch, status: CartLineStatus, error: impl Into<String>) -> Self {
        Self {
            item: line.matched_menu_item.clone(),
            quantity: line.quantity,
            price: line.price.clone(),
            size: line.size.clone(),
            delta: None,
            added: false,
            status,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlacementResult {
    pub success: bool,
    pub items: Vec<CartLineResult>,
    pub message: String,
}

impl OrderPlacementResult {
    /// Aggregate per-line results; partial success is reported as a count.
    pub fn from_lines(items: Vec<CartLineResult>) -> Self {
        let added = items.iter().filter(|i| i.added).count();
        let total = items.len();
        let success = added == total;
        let message = if total == 0 {
            "No items to add".to_string()
        } else if success {
            format!("All {} items added to cart", total)
        } else {
            format!("{}/{} items added to cart", added, total)
        };
        Self {
            success,
            items,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str) -> ConfidentMatch {
        ConfidentMatch {
            requested_item: name.to_lowercase(),
            quantity: 1,
            matched_menu_item: name.to_string(),
            price: "$1.00".to_string(),
            size: None,
            confidence_reason: None,
        }
    }

    #[test]
    fn bucket_set_uses_oracle_wire_names() {
        let json = r#"{
            "confident_matches": [{"requested_item":"big mac","quantity":2,"matched_menu_item":"Big Mac","price":"$5.99"}],
            "clarification_needed": [{"requested_item":"coke","possible_matches":[{"menu_item":"Coke","price":"$1.00"}],"clarification_question":"Which?"}],
            "not_found": [{"requested_item":"pizza"}]
        }"#;
        let set: ResolutionBucketSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.confident[0].quantity, 2);
        assert_eq!(set.needs_clarification[0].quantity, 1);
        assert!(set.not_found[0].suggestion.is_none());
        assert!(set.needs_followup());

        let back = serde_json::to_value(&set).unwrap();
        assert!(back.get("confident_matches").is_some());
        assert!(back.get("clarification_needed").is_some());
    }

    #[test]
    fn summary_counts_each_bucket() {
        let set = ResolutionBucketSet {
            confident: vec![line("Big Mac")],
            needs_clarification: vec![],
            not_found: vec![NotFoundItem {
                requested_item: "pizza".into(),
                quantity: 1,
                suggestion: None,
            }],
        };
        let s = set.summary();
        assert_eq!(s.total_items, 2);
        assert_eq!(s.clear_items, 1);
        assert_eq!(s.missing_items, 1);
        assert_eq!(s.unclear_items, 0);
    }

    #[test]
    fn empty_set_needs_no_followup() {
        let set = ResolutionBucketSet::default();
        assert!(set.is_empty());
        assert!(!set.needs_followup());
    }

    #[test]
    fn parsed_line_quantity_floor_is_one() {
        assert_eq!(ParsedOrderLine::new("fries", 0).quantity, 1);
        let parsed: ParsedOrderLine = serde_json::from_str(r#"{"item":"fries"}"#).unwrap();
        assert_eq!(parsed.quantity, 1);
    }

    #[test]
    fn placement_message_reports_partial_count() {
        let ok = CartLineResult {
            item: "Big Mac".into(),
            quantity: 1,
            price: "$5.99".into(),
            size: None,
            delta: None,
            added: true,
            status: CartLineStatus::Success,
            error: None,
        };
        let bad = CartLineResult::failed(&line("Fries"), CartLineStatus::Failed, "not found");
        let result = OrderPlacementResult::from_lines(vec![ok.clone(), bad, ok]);
        assert!(!result.success);
        assert_eq!(result.message, "2/3 items added to cart");
    }

    #[test]
    fn placement_all_added() {
        let result = OrderPlacementResult::from_lines(vec![]);
        assert!(result.success);
        assert_eq!(result.message, "No items to add");
    }

    #[test]
    fn cart_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CartLineStatus::Success).unwrap(),
            "\"success\""
        );
    }
}
