//! End-to-end tests for the ordering pipeline.
//!
//! Text in, clarification dialogue, then cart placement on the in-memory
//! site.  Oracles are either scripted mocks or the rule-based matcher.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::automation::fake::{FakeMenuItem, FakeRestaurant, FakeSite};
    use crate::oracle::rules::RulesOracle;
    use crate::oracle::{
        ExtractionOracle, MockExtractionOracle, MockResolutionOracle, ResolutionOracle,
    };
    use crate::order::{
        ClarificationItem, ConfidentMatch, ParsedOrder, ParsedOrderLine, PossibleMatch,
        ResolutionBucketSet,
    };
    use crate::pipeline::tests::demo_browser;
    use crate::pipeline::{OrderPipeline, PipelineInput};
    use crate::resolution::ResolutionEngine;
    use crate::session::{ClarificationMachine, SessionStore};
    use crate::speech::mock::MockSpeechProvider;

    // ── Helpers ──────────────────────────────────────────────────

    fn burger_barn() -> Arc<FakeSite> {
        Arc::new(FakeSite::new(vec![FakeRestaurant::open(
            "Burger Barn",
            vec![
                FakeMenuItem::new("1", "Big Mac", "$5.99"),
                FakeMenuItem::new("2", "Small Fries", "$2.79"),
                FakeMenuItem::new("3", "Medium Fries", "$3.49"),
                FakeMenuItem::new("4", "Large Fries", "$3.99"),
                FakeMenuItem::new("5", "Apple Pie", "$1.99"),
            ],
        )]))
    }

    async fn pipeline(
        site: Arc<FakeSite>,
        extractor: Arc<dyn ExtractionOracle>,
        resolver: Arc<dyn ResolutionOracle>,
    ) -> OrderPipeline {
        let engine = ResolutionEngine::new(resolver, Duration::from_secs(1));
        let machine = ClarificationMachine::new(
            Arc::new(SessionStore::new(Duration::from_secs(60), 10)),
            Arc::new(engine),
        );
        OrderPipeline::new(
            Arc::new(MockSpeechProvider::new(vec![])),
            extractor,
            machine,
            demo_browser(site).await,
            Duration::from_secs(1),
        )
    }

    fn text(t: &str) -> PipelineInput {
        PipelineInput {
            text: Some(t.to_string()),
            ..Default::default()
        }
    }

    fn big_macs() -> ConfidentMatch {
        ConfidentMatch {
            requested_item: "big macs".into(),
            quantity: 2,
            matched_menu_item: "Big Mac".into(),
            price: "$5.99".into(),
            size: None,
            confidence_reason: Some("single menu entry".into()),
        }
    }

    fn fries_sizes() -> Vec<PossibleMatch> {
        [("Small Fries", "$2.79"), ("Medium Fries", "$3.49"), ("Large Fries", "$3.99")]
            .iter()
            .map(|(n, p)| PossibleMatch {
                menu_item: n.to_string(),
                price: p.to_string(),
            })
            .collect()
    }

    // ── Scripted oracles ─────────────────────────────────────────

    #[tokio::test]
    async fn scripted_clarification_then_placement() {
        let mut extractor = MockExtractionOracle::new();
        extractor.expect_extract().returning(|req| {
            Ok(if req.prior_order.is_none() {
                ParsedOrder {
                    restaurant: Some("Burger Barn".into()),
                    items: vec![
                        ParsedOrderLine::new("big macs", 2),
                        ParsedOrderLine::new("medium fries", 1),
                    ],
                }
            } else {
                ParsedOrder {
                    restaurant: None,
                    items: vec![ParsedOrderLine::new("medium fries", 1)],
                }
            })
        });

        let mut resolver = MockResolutionOracle::new();
        resolver.expect_resolve().returning(|req| {
            Ok(match &req.previous_resolution {
                None => ResolutionBucketSet {
                    confident: vec![big_macs()],
                    needs_clarification: vec![ClarificationItem {
                        requested_item: "medium fries".into(),
                        quantity: 1,
                        possible_matches: fries_sizes(),
                        clarification_question: "Which fries would you like?".into(),
                    }],
                    not_found: vec![],
                },
                Some(_) => ResolutionBucketSet {
                    confident: vec![ConfidentMatch {
                        requested_item: "medium fries".into(),
                        quantity: 1,
                        matched_menu_item: "Medium Fries".into(),
                        price: "$3.49".into(),
                        size: None,
                        confidence_reason: Some("answered".into()),
                    }],
                    ..Default::default()
                },
            })
        });

        let site = burger_barn();
        let p = pipeline(site.clone(), Arc::new(extractor), Arc::new(resolver)).await;

        let first = p
            .process(text("2 big macs and a medium fries from Burger Barn"))
            .await
            .unwrap();
        assert!(first.needs_clarification);
        assert_eq!(first.resolution.confident, vec![big_macs()]);
        assert_eq!(first.resolution.needs_clarification[0].requested_item, "medium fries");
        assert_eq!(first.resolution.needs_clarification[0].possible_matches.len(), 3);
        assert_eq!(first.message, "Which fries would you like?");
        let session_id = first.session_id.clone().unwrap();
        assert_eq!(p.sessions().len(), 1);

        let second = p
            .process(PipelineInput {
                session_id: Some(session_id),
                ..text("the medium one")
            })
            .await
            .unwrap();
        assert!(!second.needs_clarification);
        assert!(second.session_id.is_none());
        assert_eq!(second.attempts, 2);
        assert_eq!(second.resolution.confident.len(), 2);
        assert_eq!(second.resolution.confident[0], big_macs());
        assert_eq!(second.resolution.confident[1].matched_menu_item, "Medium Fries");
        assert!(p.sessions().is_empty());

        let placed = p
            .place_order("Burger Barn", &second.resolution.confident)
            .await
            .unwrap();
        assert!(placed.success);
        assert_eq!(placed.message, "All 2 items added to cart");
        let cart = site.cart();
        assert_eq!(cart[0].item, "Big Mac");
        assert_eq!(cart[0].quantity, 2);
        assert_eq!(cart[1].item, "Medium Fries");
        assert_eq!(site.checkout_visits(), 1);
    }

    // ── Rule-based oracle ────────────────────────────────────────

    #[tokio::test]
    async fn rules_dialogue_over_three_turns() {
        let rules = Arc::new(RulesOracle::new());
        let site = burger_barn();
        let p = pipeline(site.clone(), rules.clone(), rules).await;

        let first = p
            .process(text("2 big macs and some fries and a pizza from Burger Barn"))
            .await
            .unwrap();
        assert!(first.needs_clarification);
        assert_eq!(first.summary.total_items, 3);
        assert_eq!(first.summary.clear_items, 1);
        assert_eq!(first.summary.unclear_items, 1);
        assert_eq!(first.summary.missing_items, 1);
        let id = first.session_id.clone().unwrap();

        let second = p
            .process(PipelineInput {
                session_id: Some(id.clone()),
                ..text("the medium one")
            })
            .await
            .unwrap();
        assert!(second.needs_clarification);
        assert_eq!(second.session_id.as_ref(), Some(&id));
        assert_eq!(second.resolution.confident[1].matched_menu_item, "Medium Fries");
        assert_eq!(second.resolution.not_found.len(), 1);

        let third = p
            .process(PipelineInput {
                session_id: Some(id),
                ..text("forget the pizza")
            })
            .await
            .unwrap();
        assert!(third.session_id.is_none());
        assert_eq!(third.attempts, 3);
        assert_eq!(third.resolution.confident.len(), 2);

        let placed = p
            .place_order("Burger Barn", &third.resolution.confident)
            .await
            .unwrap();
        assert!(placed.success);
        assert_eq!(site.cart().len(), 2);
    }

    #[tokio::test]
    async fn expired_session_restarts_as_new_order() {
        let rules = Arc::new(RulesOracle::new());
        let p = pipeline(burger_barn(), rules.clone(), rules).await;
        let out = p
            .process(PipelineInput {
                session_id: Some("no-such-session".into()),
                ..text("an apple pie from Burger Barn")
            })
            .await
            .unwrap();
        assert!(out.session_id.is_none());
        assert_eq!(out.resolution.confident[0].matched_menu_item, "Apple Pie");
    }
}
