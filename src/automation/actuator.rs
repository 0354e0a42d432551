//! Cart Actuator.
//!
//! Turns confirmed order lines into cart state: locate the row, open its
//! detail view, pick a size, set the quantity and commit.  Every step is
//! verified by polling for its visible effect.  A failed line is reported
//! and the batch moves on.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::automation::diagnostics;
use crate::automation::driver::{ElementHandle, PageDriver};
use crate::automation::locator::ItemLocator;
use crate::automation::selectors::SiteSelectors;
use crate::automation::wait::{WaitPolicy, wait_for, wait_until_gone};
use crate::config::{ActuatorConfig, ScraperConfig, duration_or};
use crate::error::{AutomationError, AutomationResult};
use crate::order::price::{format_cents, parse_delta, parse_embedded_price, parse_price};
use crate::order::{CartLineResult, CartLineStatus, ConfidentMatch, OrderPlacementResult};

#[derive(Debug, Clone)]
pub struct ActuateSettings {
    pub locate_max_attempts: u32,
    pub locate_scroll_step_px: i64,
    /// Wait for the detail view to open and to close.
    pub modal: WaitPolicy,
    pub settle: Duration,
    pub diagnostics_dir: Option<PathBuf>,
}

impl ActuateSettings {
    pub fn from_config(actuator: &ActuatorConfig, scraper: &ScraperConfig) -> Self {
        Self {
            locate_max_attempts: actuator.locate_max_attempts,
            locate_scroll_step_px: actuator.locate_scroll_step_px,
            modal: WaitPolicy::new(
                duration_or(&actuator.modal_timeout, Duration::from_secs(5)),
                duration_or(&actuator.poll_interval, Duration::from_millis(250)),
            ),
            settle: duration_or(&actuator.settle, Duration::from_millis(300)),
            diagnostics_dir: scraper.diagnostics_path(),
        }
    }
}

impl Default for ActuateSettings {
    fn default() -> Self {
        Self::from_config(&ActuatorConfig::default(), &ScraperConfig::default())
    }
}

/// One radio-style choice in the detail view.
#[derive(Debug, Clone)]
struct SizeOption {
    node: ElementHandle,
    label: String,
    checked: bool,
}

impl SizeOption {
    /// First label line without any price token: `"Large +$0.60"` is `"Large"`.
    fn title(&self) -> &str {
        let first = self.label.lines().next().unwrap_or("");
        let end = first.find(['+', '$']).unwrap_or(first.len());
        first[..end].trim()
    }
}

/// Which option to leave selected for a requested size.
///
/// An exact (case-insensitive) match on the label's first line wins.
/// Without a requested size a pre-selected default is kept.  Otherwise the
/// first unselected option is taken rather than failing the line.
fn choose_option(options: &[SizeOption], size: Option<&str>) -> Option<usize> {
    if options.is_empty() {
        return None;
    }
    if let Some(size) = size.map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(i) = options.iter().position(|o| o.title().eq_ignore_ascii_case(size)) {
            return Some(i);
        }
    } else if let Some(i) = options.iter().position(|o| o.checked) {
        return Some(i);
    }
    options.iter().position(|o| !o.checked).or(Some(0))
}

/// Incremental price of a selection, in cents.
///
/// Prefers an explicit `+$X` / `-$X` token, then a changed price shown in
/// the detail view, then a full price embedded in the label.  Cheaper
/// variants give a negative delta.
fn compute_delta(base: i64, label: &str, displayed: Option<i64>) -> i64 {
    if let Some(delta) = parse_delta(label) {
        return delta;
    }
    if let Some(shown) = displayed.filter(|&p| p != base) {
        return shown - base;
    }
    parse_embedded_price(label).map_or(0, |full| full - base)
}

fn failure_status(err: &AutomationError) -> CartLineStatus {
    match err {
        AutomationError::ElementNotFound(_) | AutomationError::PageLoadTimeout(_) => {
            CartLineStatus::Failed
        }
        _ => CartLineStatus::Error,
    }
}

pub struct CartActuator<'a> {
    driver: &'a dyn PageDriver,
    selectors: &'a SiteSelectors,
    settings: &'a ActuateSettings,
}

impl<'a> CartActuator<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        selectors: &'a SiteSelectors,
        settings: &'a ActuateSettings,
    ) -> Self {
        Self {
            driver,
            selectors,
            settings,
        }
    }

    /// Add every line, then open the cart once.
    pub async fn place_all(&self, lines: &[ConfidentMatch]) -> OrderPlacementResult {
        let mut results = Vec::with_capacity(lines.len());
        for line in lines {
            match self.add_line(line).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(item = %line.matched_menu_item, "Could not add line to cart: {}", e);
                    diagnostics::capture(
                        self.driver,
                        self.settings.diagnostics_dir.as_deref(),
                        &format!("add-{}", line.matched_menu_item),
                    )
                    .await;
                    self.dismiss_modal().await;
                    results.push(CartLineResult::failed(line, failure_status(&e), e.to_string()));
                }
            }
        }
        self.open_cart().await;

        let result = OrderPlacementResult::from_lines(results);
        info!(success = result.success, "{}", result.message);
        result
    }

    /// Add one confirmed line to the cart.
    pub async fn add_line(&self, line: &ConfidentMatch) -> AutomationResult<CartLineResult> {
        let d = self.driver;
        let s = self.selectors;
        let st = self.settings;

        let node = ItemLocator::new(
            d,
            s,
            st.locate_max_attempts,
            st.locate_scroll_step_px,
            st.settle,
        )
        .locate(&line.matched_menu_item, Some(&line.price))
        .await?;
        self.open_detail(&node, &line.matched_menu_item).await?;

        let base = parse_price(&line.price).unwrap_or(0);
        let chosen = self.select_option(line.size.as_deref()).await?;
        let delta = match &chosen {
            Some(option) => {
                let displayed = self.displayed_price().await?;
                compute_delta(base, &option.label, displayed)
            }
            None => 0,
        };

        let quantity = self.set_quantity(line.quantity).await;
        if quantity < line.quantity {
            warn!(
                item = %line.matched_menu_item,
                wanted = line.quantity,
                reached = quantity,
                "Quantity step stopped early"
            );
        }

        self.commit().await?;

        let size = chosen
            .as_ref()
            .map(|o| o.title().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| line.size.clone());
        debug!(item = %line.matched_menu_item, quantity, delta, "Line added to cart");
        Ok(CartLineResult {
            item: line.matched_menu_item.clone(),
            quantity,
            price: format_cents(base + delta),
            size,
            delta: chosen.map(|_| format_cents(delta)),
            added: true,
            status: CartLineStatus::Success,
            error: None,
        })
    }

    /// Click the row and poll for the add control as proof the detail view
    /// opened.  One retry covers clicks swallowed by a re-render.
    async fn open_detail(&self, node: &ElementHandle, name: &str) -> AutomationResult<()> {
        for attempt in 1..=2 {
            self.driver.click(node).await?;
            match wait_for(self.driver, &self.selectors.add_to_cart, self.settings.modal, "detail view").await {
                Ok(_) => return Ok(()),
                Err(AutomationError::PageLoadTimeout(_)) => {
                    debug!(item = name, attempt, "Detail view did not open");
                }
                Err(e) => return Err(e),
            }
        }
        Err(AutomationError::ElementNotFound(format!(
            "detail view for \"{}\"",
            name
        )))
    }

    /// Select the size option, returning it.
    async fn select_option(&self, size: Option<&str>) -> AutomationResult<Option<SizeOption>> {
        let d = self.driver;
        let mut options = Vec::new();
        for node in d.find_all(&self.selectors.option_radio).await? {
            let label = d.text(&node).await?;
            let checked = d
                .attribute(&node, self.selectors.option_checked_attribute)
                .await?
                .is_some_and(|v| v == "true");
            options.push(SizeOption {
                node,
                label,
                checked,
            });
        }

        let Some(i) = choose_option(&options, size) else {
            return Ok(None);
        };
        let option = options.swap_remove(i);
        if let Some(size) = size.filter(|s| !option.title().eq_ignore_ascii_case(s.trim())) {
            warn!(requested = size, chosen = option.title(), "No exact size option, using fallback");
        }
        if !option.checked {
            d.click(&option.node).await?;
            tokio::time::sleep(self.settings.settle).await;
        }
        Ok(Some(option))
    }

    async fn displayed_price(&self) -> AutomationResult<Option<i64>> {
        match self.driver.find(&self.selectors.modal_price).await? {
            Some(el) => Ok(parse_price(&self.driver.text(&el).await?)),
            None => Ok(None),
        }
    }

    /// Click the increment control until the shown quantity reaches
    /// `wanted`.  Returns the quantity actually reached.
    async fn set_quantity(&self, wanted: u32) -> u32 {
        let mut reached = 1;
        while reached < wanted {
            match self.increment_once(reached).await {
                Ok(true) => reached += 1,
                Ok(false) => break,
                Err(e) => {
                    debug!("Quantity step failed: {}", e);
                    break;
                }
            }
        }
        reached
    }

    async fn increment_once(&self, current: u32) -> AutomationResult<bool> {
        let d = self.driver;
        let Some(inc) = d.find(&self.selectors.quantity_increment).await? else {
            return Ok(false);
        };
        d.click(&inc).await?;
        tokio::time::sleep(self.settings.settle).await;
        let Some(readout) = d.find(&self.selectors.quantity_value).await? else {
            warn!(quantity = current + 1, "No quantity readout, trusting the click");
            return Ok(true);
        };
        let shown = d.text(&readout).await?.trim().parse::<u32>().ok();
        if shown != Some(current + 1) {
            warn!(expected = current + 1, shown = ?shown, "Quantity readout disagrees");
        }
        Ok(shown == Some(current + 1))
    }

    /// Click add and require the detail view to close.
    async fn commit(&self) -> AutomationResult<()> {
        let d = self.driver;
        let add = d
            .find(&self.selectors.add_to_cart)
            .await?
            .ok_or_else(|| AutomationError::ElementNotFound("add to cart button".to_string()))?;
        d.click(&add).await?;
        if wait_until_gone(d, &self.selectors.item_modal, self.settings.modal).await? {
            Ok(())
        } else {
            Err(AutomationError::ElementNotFound(
                "detail view still open after adding".to_string(),
            ))
        }
    }

    async fn dismiss_modal(&self) {
        if let Ok(Some(close)) = self.driver.find(&self.selectors.modal_close).await {
            if let Err(e) = self.driver.click(&close).await {
                debug!("Could not close detail view: {}", e);
            }
        }
    }

    async fn open_cart(&self) {
        match self.driver.find(&self.selectors.cart_button).await {
            Ok(Some(cart)) => {
                if let Err(e) = self.driver.click(&cart).await {
                    warn!("Could not open cart: {}", e);
                }
            }
            Ok(None) => warn!("Cart button not found"),
            Err(e) => warn!("Could not open cart: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::fake::{CartEntry, FakeMenuItem, FakeOption, FakeRestaurant, FakeSite};
    use crate::automation::scraper::{MenuScraper, ScrapeSettings};

    fn settings() -> ActuateSettings {
        ActuateSettings {
            locate_max_attempts: 25,
            locate_scroll_step_px: 300,
            modal: WaitPolicy::new(Duration::from_millis(50), Duration::from_millis(10)),
            settle: Duration::ZERO,
            diagnostics_dir: None,
        }
    }

    fn line(item: &str, price: &str, quantity: u32, size: Option<&str>) -> ConfidentMatch {
        ConfidentMatch {
            requested_item: item.to_lowercase(),
            quantity,
            matched_menu_item: item.to_string(),
            price: price.to_string(),
            size: size.map(str::to_string),
            confidence_reason: None,
        }
    }

    async fn opened(site: FakeSite, restaurant: &str) -> FakeSite {
        site.goto(&site.base_url()).await.unwrap();
        let selectors = site.selectors().clone();
        let scrape = ScrapeSettings::default();
        MenuScraper::new(&site, &selectors, &scrape)
            .open_restaurant(restaurant)
            .await
            .unwrap();
        site
    }

    fn option(label: &str, checked: bool) -> SizeOption {
        SizeOption {
            node: ElementHandle(label.to_string()),
            label: label.to_string(),
            checked,
        }
    }

    #[test]
    fn option_choice() {
        let opts = vec![
            option("Small", false),
            option("Medium\n+$0.70", true),
            option("Large\n+$1.20", false),
        ];
        assert_eq!(choose_option(&opts, Some("large")), Some(2));
        assert_eq!(choose_option(&opts, None), Some(1));
        assert_eq!(choose_option(&opts, Some("extra large")), Some(0));
        assert_eq!(choose_option(&[option("Large +$0.60", false)], Some("Large")), Some(0));
        assert_eq!(option("Large +$0.60", false).title(), "Large");
        assert_eq!(choose_option(&[], Some("large")), None);
    }

    #[test]
    fn delta_sources_in_order() {
        assert_eq!(compute_delta(349, "Large +$0.60", Some(500)), 60);
        assert_eq!(compute_delta(349, "Large", Some(409)), 60);
        assert_eq!(compute_delta(349, "Large $4.09", Some(349)), 60);
        assert_eq!(compute_delta(349, "Large", Some(349)), 0);
        assert_eq!(compute_delta(349, "Kids $1.99", None), -150);
        assert_eq!(compute_delta(349, "Small", Some(279)), -70);
        assert_eq!(compute_delta(349, "Small -$0.70", None), -70);
    }

    #[tokio::test]
    async fn large_option_adds_its_delta() {
        let site = opened(
            FakeSite::new(vec![FakeRestaurant::open(
                "Burger Barn",
                vec![FakeMenuItem::new("f", "Fries", "$3.49").with_options(vec![
                    FakeOption::new("Medium").selected(),
                    FakeOption::new("Large +$0.60"),
                ])],
            )]),
            "burger barn",
        )
        .await;
        let selectors = site.selectors().clone();
        let st = settings();
        let result = CartActuator::new(&site, &selectors, &st)
            .add_line(&line("Fries", "$3.49", 1, Some("large")))
            .await
            .unwrap();
        assert_eq!(result.price, "$4.09");
        assert_eq!(result.delta.as_deref(), Some("$0.60"));
        assert_eq!(result.size.as_deref(), Some("Large"));
        assert_eq!(
            site.cart(),
            vec![CartEntry {
                item: "Fries".to_string(),
                quantity: 1,
                option: Some("Large +$0.60".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn shown_price_prices_unmarked_options() {
        let site = opened(
            FakeSite::new(vec![FakeRestaurant::open(
                "Burger Barn",
                vec![FakeMenuItem::new("f", "Fries", "$3.49").with_options(vec![
                    FakeOption::new("Small").showing("$2.79"),
                    FakeOption::new("Medium").selected(),
                    FakeOption::new("Large").showing("$4.09"),
                ])],
            )]),
            "burger barn",
        )
        .await;
        let selectors = site.selectors().clone();
        let st = settings();
        let actuator = CartActuator::new(&site, &selectors, &st);

        let large = actuator
            .add_line(&line("Fries", "$3.49", 1, Some("Large")))
            .await
            .unwrap();
        assert_eq!(large.price, "$4.09");
        assert_eq!(large.delta.as_deref(), Some("$0.60"));

        let small = actuator
            .add_line(&line("Fries", "$3.49", 1, Some("Small")))
            .await
            .unwrap();
        assert_eq!(small.price, "$2.79");
        assert_eq!(small.delta.as_deref(), Some("-$0.70"));
        assert_eq!(site.cart().len(), 2);
    }

    #[tokio::test]
    async fn batch_continues_past_failures_and_opens_cart() {
        let site = opened(FakeSite::demo(), "McDonald's").await;
        let selectors = site.selectors().clone();
        let st = settings();
        let result = CartActuator::new(&site, &selectors, &st)
            .place_all(&[
                line("Big Mac®", "$5.99", 2, None),
                line("Pizza", "$9.99", 1, None),
                line("Diet Coke®", "$1.29", 1, Some("Large")),
            ])
            .await;

        assert!(!result.success);
        assert_eq!(result.message, "2/3 items added to cart");
        assert_eq!(result.items[1].status, CartLineStatus::Failed);
        assert!(!result.items[1].added);
        assert_eq!(result.items[2].price, "$2.49");
        assert_eq!(result.items[2].size.as_deref(), Some("Large"));

        let cart = site.cart();
        assert_eq!(cart.len(), 2);
        assert_eq!(cart[0].quantity, 2);
        assert_eq!(cart[1].option.as_deref(), Some("Large"));
        assert_eq!(site.checkout_visits(), 1);
    }

    #[tokio::test]
    async fn missing_increment_keeps_reached_quantity() {
        let site = opened(
            FakeSite::new(vec![FakeRestaurant::open(
                "Diner",
                vec![FakeMenuItem::new("p", "Pie", "$4.00").without_quantity_control()],
            )]),
            "diner",
        )
        .await;
        let selectors = site.selectors().clone();
        let st = settings();
        let result = CartActuator::new(&site, &selectors, &st)
            .add_line(&line("Pie", "$4.00", 3, None))
            .await
            .unwrap();
        assert!(result.added);
        assert_eq!(result.quantity, 1);
        assert_eq!(result.delta, None);
        assert_eq!(site.cart()[0].quantity, 1);
    }

    #[tokio::test]
    async fn missing_readout_trusts_the_clicks() {
        let site = opened(
            FakeSite::new(vec![FakeRestaurant::open(
                "Diner",
                vec![FakeMenuItem::new("p", "Pie", "$4.00").without_quantity_readout()],
            )]),
            "diner",
        )
        .await;
        let selectors = site.selectors().clone();
        let st = settings();
        let result = CartActuator::new(&site, &selectors, &st)
            .add_line(&line("Pie", "$4.00", 3, None))
            .await
            .unwrap();
        assert_eq!(result.quantity, 3);
        assert_eq!(site.cart()[0].quantity, 3);
    }

    #[tokio::test]
    async fn modal_that_stays_open_fails_the_line() {
        let site = opened(
            FakeSite::new(vec![FakeRestaurant::open(
                "Diner",
                vec![FakeMenuItem::new("p", "Pie", "$4.00").sticky()],
            )]),
            "diner",
        )
        .await;
        let selectors = site.selectors().clone();
        let st = settings();
        let result = CartActuator::new(&site, &selectors, &st)
            .place_all(&[line("Pie", "$4.00", 1, None)])
            .await;
        assert!(!result.success);
        assert_eq!(result.items[0].status, CartLineStatus::Failed);
        assert!(result.items[0].error.as_deref().unwrap().contains("still open"));
        assert!(!site.modal_open());
        assert!(site.cart().is_empty());
    }
}
