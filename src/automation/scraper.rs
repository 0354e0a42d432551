//! Menu Scraper.
//!
//! Opens a restaurant from the site search and walks its virtualized menu
//! list, merging rendered rows by item id until the list stops yielding
//! new items and stops scrolling (or a hard ceiling is hit).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::automation::diagnostics;
use crate::automation::driver::{ElementHandle, PageDriver};
use crate::automation::selectors::SiteSelectors;
use crate::automation::wait::{WaitPolicy, wait_for};
use crate::config::{ScraperConfig, duration_or};
use crate::error::{AutomationError, AutomationResult};
use crate::order::MenuCatalogEntry;
use crate::order::price::{format_cents, parse_price};
use crate::text::{collapse_whitespace, normalize};

/// `"Big Mac, $5.99"` or `"Big Mac, $5.99, Popular"`.
static LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?s)(.+?),\s*(\$\s*\d[\d,]*(?:\.\d{1,2})?)").expect("valid label regex")
});

/// Scroll-loop and wait settings.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub scroll_step_px: i64,
    pub idle_scroll_limit: u32,
    pub stalled_scroll_limit: u32,
    pub max_scroll_attempts: u32,
    pub settle: Duration,
    pub initial_wait: WaitPolicy,
    pub diagnostics_dir: Option<PathBuf>,
}

impl ScrapeSettings {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            scroll_step_px: config.scroll_step_px.max(1),
            idle_scroll_limit: config.idle_scroll_limit.max(1),
            stalled_scroll_limit: config.stalled_scroll_limit.max(1),
            max_scroll_attempts: config.max_scroll_attempts.max(1),
            settle: duration_or(&config.settle, Duration::from_millis(400)),
            initial_wait: WaitPolicy::new(
                duration_or(&config.initial_wait, Duration::from_secs(10)),
                Duration::from_millis(250),
            ),
            diagnostics_dir: config.diagnostics_path(),
        }
    }
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self::from_config(&ScraperConfig::default())
    }
}

/// One menu row as read off the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedItem {
    pub item_id: String,
    pub name: String,
    pub price: String,
    pub label: Option<String>,
}

/// Split a combined `"Name, $price"` label.
pub fn parse_item_label(label: &str) -> Option<(String, String)> {
    let caps = LABEL.captures(label.trim())?;
    let name = collapse_whitespace(caps.get(1)?.as_str());
    let cents = parse_price(caps.get(2)?.as_str())?;
    if name.is_empty() {
        return None;
    }
    Some((name, format_cents(cents)))
}

/// Read one rendered menu row, preferring the combined label attribute and
/// falling back to the title and price sub-elements.
pub async fn read_item(
    driver: &dyn PageDriver,
    selectors: &SiteSelectors,
    node: &ElementHandle,
) -> AutomationResult<Option<RenderedItem>> {
    let label = driver.attribute(node, selectors.item_label_attribute).await?;
    let parsed = label.as_deref().and_then(parse_item_label);

    let (name, price) = match parsed {
        Some(pair) => pair,
        None => {
            let title = match driver.find_first_within(node, &selectors.menu_item_title).await? {
                Some(el) => collapse_whitespace(&driver.text(&el).await?),
                None => String::new(),
            };
            let price = match driver.find_first_within(node, &selectors.menu_item_price).await? {
                Some(el) => parse_price(&driver.text(&el).await?).map(format_cents),
                None => None,
            };
            match price {
                Some(price) if !title.is_empty() => (title, price),
                _ => return Ok(None),
            }
        }
    };

    let item_id = driver
        .attribute(node, selectors.item_id_attribute)
        .await?
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("{}|{}", name, price));

    Ok(Some(RenderedItem {
        item_id,
        name,
        price,
        label,
    }))
}

/// A store card is a candidate when it is open and its name contains the
/// query, ignoring case (and, failing that, punctuation and accents).
fn card_matches(card_name: &str, status: &str, query: &str) -> bool {
    let open = normalize(status).split(' ').next() == Some("open");
    if !open {
        return false;
    }
    let compact = |s: &str| normalize(s).replace(' ', "");
    card_name.to_lowercase().contains(&query.to_lowercase())
        || normalize(card_name).contains(&normalize(query))
        || compact(card_name).contains(&compact(query))
}

pub struct MenuScraper<'a> {
    driver: &'a dyn PageDriver,
    selectors: &'a SiteSelectors,
    settings: &'a ScrapeSettings,
}

impl<'a> MenuScraper<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        selectors: &'a SiteSelectors,
        settings: &'a ScrapeSettings,
    ) -> Self {
        Self {
            driver,
            selectors,
            settings,
        }
    }

    /// Search for `restaurant` and open the first open matching store.
    /// Returns the store's displayed name.
    pub async fn open_restaurant(&self, restaurant: &str) -> AutomationResult<String> {
        let s = self.selectors;
        let d = self.driver;

        let search = wait_for(d, &s.search_input, self.settings.initial_wait, "search box").await?;
        d.click(&search).await?;
        d.type_text(&search, restaurant).await?;
        d.press_enter(&search).await?;
        wait_for(d, &s.search_results, self.settings.initial_wait, "search results").await?;

        for card in d.find_all(&s.store_card).await? {
            let name = match d.find_first_within(&card, &s.store_card_name).await? {
                Some(el) => collapse_whitespace(&d.text(&el).await?),
                None => continue,
            };
            let status = match d.find_first_within(&card, &s.store_card_status).await? {
                Some(el) => d.text(&el).await?,
                None => String::new(),
            };
            if card_matches(&name, &status, restaurant) {
                info!(restaurant, store = %name, "Opening store");
                d.click(&card).await?;
                wait_for(d, &s.store_page, self.settings.initial_wait, "store page").await?;
                return Ok(name);
            }
            debug!(store = %name, status = %status, "Skipping store card");
        }

        diagnostics::capture(d, self.settings.diagnostics_dir.as_deref(), "restaurant-not-found").await;
        Err(AutomationError::RestaurantNotFound(restaurant.to_string()))
    }

    /// Open `restaurant` and scrape its full catalog.
    pub async fn scrape(&self, restaurant: &str) -> AutomationResult<Vec<MenuCatalogEntry>> {
        self.open_restaurant(restaurant).await?;
        self.read_menu(restaurant).await
    }

    /// Scrape the catalog of the store page currently open.
    pub async fn read_menu(&self, restaurant: &str) -> AutomationResult<Vec<MenuCatalogEntry>> {
        let d = self.driver;
        let st = self.settings;

        if wait_for(d, &self.selectors.menu_item, st.initial_wait, "menu items")
            .await
            .is_err()
        {
            diagnostics::capture(d, st.diagnostics_dir.as_deref(), "empty-menu").await;
            return Err(AutomationError::EmptyMenu(restaurant.to_string()));
        }
        d.scroll_to_top().await?;

        let mut order: Vec<String> = Vec::new();
        let mut by_id: HashMap<String, RenderedItem> = HashMap::new();
        let mut idle = 0u32;
        let mut stalled = 0u32;
        let mut attempts = 0u32;
        let mut last_position = d.scroll_position().await?;

        loop {
            let fresh = self.collect_rendered(&mut order, &mut by_id).await?;
            idle = if fresh == 0 { idle + 1 } else { 0 };

            if idle >= st.idle_scroll_limit && stalled >= st.stalled_scroll_limit {
                debug!(attempts, items = order.len(), "Menu list exhausted");
                break;
            }
            if attempts >= st.max_scroll_attempts {
                warn!(attempts, items = order.len(), "Scroll ceiling reached");
                break;
            }

            d.scroll_by(st.scroll_step_px).await?;
            tokio::time::sleep(st.settle).await;
            attempts += 1;

            let position = d.scroll_position().await?;
            if position == last_position {
                stalled += 1;
            } else {
                stalled = 0;
                last_position = position;
            }
        }

        let catalog = dedupe(order.into_iter().filter_map(|id| by_id.remove(&id)));
        if catalog.is_empty() {
            diagnostics::capture(d, st.diagnostics_dir.as_deref(), "empty-menu").await;
            return Err(AutomationError::EmptyMenu(restaurant.to_string()));
        }
        info!(restaurant, items = catalog.len(), scrolls = attempts, "Menu scraped");
        Ok(catalog)
    }

    /// Merge currently rendered rows; returns how many ids were new.
    async fn collect_rendered(
        &self,
        order: &mut Vec<String>,
        by_id: &mut HashMap<String, RenderedItem>,
    ) -> AutomationResult<usize> {
        let mut fresh = 0;
        for node in self.driver.find_all(&self.selectors.menu_item).await? {
            let item = match read_item(self.driver, self.selectors, &node).await {
                Ok(Some(item)) => item,
                Ok(None) => continue,
                // Rows recycled mid-read are picked up on a later pass.
                Err(AutomationError::Driver(e)) => {
                    debug!("Skipping unreadable menu row: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !by_id.contains_key(&item.item_id) {
                order.push(item.item_id.clone());
                by_id.insert(item.item_id.clone(), item);
                fresh += 1;
            }
        }
        Ok(fresh)
    }
}

/// Collapse rows that share `(name, price)` under different ids, keeping
/// the first seen.
fn dedupe(items: impl Iterator<Item = RenderedItem>) -> Vec<MenuCatalogEntry> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    items
        .filter(|i| seen.insert((i.name.clone(), i.price.clone())))
        .map(|i| MenuCatalogEntry {
            item_id: i.item_id,
            name: i.name,
            price: i.price,
            raw_description: i.label,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::fake::{FakeMenuItem, FakeRestaurant, FakeSite};

    fn settings() -> ScrapeSettings {
        ScrapeSettings {
            scroll_step_px: 300,
            idle_scroll_limit: 2,
            stalled_scroll_limit: 2,
            max_scroll_attempts: 100,
            settle: Duration::ZERO,
            initial_wait: WaitPolicy::new(Duration::from_millis(50), Duration::from_millis(10)),
            diagnostics_dir: None,
        }
    }

    fn items(n: usize) -> Vec<FakeMenuItem> {
        (0..n)
            .map(|i| FakeMenuItem::new(format!("id-{i}"), format!("Item {i}"), format!("${}.99", i + 1)))
            .collect()
    }

    async fn scrape(site: &FakeSite, name: &str, st: &ScrapeSettings) -> AutomationResult<Vec<MenuCatalogEntry>> {
        site.goto(&site.base_url()).await.unwrap();
        let selectors = site.selectors().clone();
        MenuScraper::new(site, &selectors, st).scrape(name).await
    }

    #[test]
    fn label_parsing() {
        assert_eq!(
            parse_item_label("Big Mac®, $5.99"),
            Some(("Big Mac®".to_string(), "$5.99".to_string()))
        );
        assert_eq!(
            parse_item_label("Fries, Large, $3.99, Popular"),
            Some(("Fries, Large".to_string(), "$3.99".to_string()))
        );
        assert_eq!(parse_item_label("Sold out"), None);
    }

    #[test]
    fn card_matching_requires_open_status() {
        assert!(card_matches("McDonald's", "Open", "mcdonald's"));
        assert!(card_matches("McDonald's (Main St)", "Open now", "mcdonalds"));
        assert!(!card_matches("McDonald's", "Closed", "mcdonald's"));
        assert!(!card_matches("McDonald's", "Opens at 5:00 PM", "mcdonald's"));
        assert!(!card_matches("Burger King", "Open", "mcdonald's"));
    }

    #[tokio::test]
    async fn scrapes_entire_virtualized_list() {
        let site = FakeSite::new(vec![FakeRestaurant::open("Diner", items(40))]);
        let catalog = scrape(&site, "diner", &settings()).await.unwrap();
        assert_eq!(catalog.len(), 40);
        assert_eq!(catalog[0].item_id, "id-0");
        assert_eq!(catalog[39].name, "Item 39");
        assert_eq!(catalog[39].price, "$40.99");
    }

    #[tokio::test]
    async fn skips_closed_and_non_matching_stores() {
        let site = FakeSite::new(vec![
            FakeRestaurant::closed("Diner Downtown", items(1)),
            FakeRestaurant::open("Diner Uptown", items(3)),
        ]);
        let catalog = scrape(&site, "diner", &settings()).await.unwrap();
        assert_eq!(catalog.len(), 3);
    }

    #[tokio::test]
    async fn no_open_store_is_restaurant_not_found() {
        let site = FakeSite::new(vec![FakeRestaurant::closed("Diner", items(3))]);
        let err = scrape(&site, "diner", &settings()).await.unwrap_err();
        assert!(matches!(err, AutomationError::RestaurantNotFound(n) if n == "diner"));
    }

    #[tokio::test]
    async fn store_without_items_is_empty_menu() {
        let site = FakeSite::new(vec![FakeRestaurant::open("Diner", vec![])]);
        let err = scrape(&site, "diner", &settings()).await.unwrap_err();
        assert!(matches!(err, AutomationError::EmptyMenu(_)));
    }

    #[tokio::test]
    async fn missing_search_box_is_page_load_timeout() {
        let site = FakeSite::new(vec![]);
        let selectors = site.selectors().clone();
        let st = settings();
        let err = MenuScraper::new(&site, &selectors, &st)
            .scrape("diner")
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::PageLoadTimeout(w) if w == "search box"));
    }

    #[tokio::test]
    async fn falls_back_to_sub_elements_and_dedupes() {
        let site = FakeSite::new(vec![FakeRestaurant::open(
            "Diner",
            vec![
                FakeMenuItem::new("a", "Pancakes", "$7.50").unlabelled(),
                FakeMenuItem::new("b", "Pancakes", "$7.50"),
                FakeMenuItem::new("c", "Pancakes", "$9.50"),
            ],
        )]);
        let catalog = scrape(&site, "diner", &settings()).await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].item_id, "a");
        assert!(catalog[0].raw_description.is_none());
        assert_eq!(catalog[1].price, "$9.50");
    }

    #[tokio::test]
    async fn ceiling_bounds_the_scroll_loop() {
        let site = FakeSite::new(vec![FakeRestaurant::open("Diner", items(200))]);
        let mut st = settings();
        st.max_scroll_attempts = 3;
        let catalog = scrape(&site, "diner", &st).await.unwrap();
        // Rows rendered within the first four viewports only.
        assert!(catalog.len() < 200);
        assert!(catalog.len() >= 6);
    }
}
