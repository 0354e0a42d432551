//! Item Locator: find the rendered menu row for a catalog name.

use std::time::Duration;

use tracing::debug;

use crate::automation::driver::{ElementHandle, PageDriver};
use crate::automation::scraper::read_item;
use crate::automation::selectors::SiteSelectors;
use crate::error::{AutomationError, AutomationResult};
use crate::order::price::same_price;
use crate::text::title_variants;

/// How closely a rendered title matches the wanted name.  Lower is stricter.
fn match_level(wanted: &[String; 3], title: &str) -> Option<usize> {
    let have = title_variants(title);
    (0..3).find(|&k| !wanted[k].is_empty() && wanted[k] == have[k])
}

pub struct ItemLocator<'a> {
    driver: &'a dyn PageDriver,
    selectors: &'a SiteSelectors,
    max_attempts: u32,
    scroll_step_px: i64,
    settle: Duration,
}

impl<'a> ItemLocator<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        selectors: &'a SiteSelectors,
        max_attempts: u32,
        scroll_step_px: i64,
        settle: Duration,
    ) -> Self {
        Self {
            driver,
            selectors,
            max_attempts: max_attempts.max(1),
            scroll_step_px: scroll_step_px.max(1),
            settle,
        }
    }

    /// Scroll from the top until a row titled `name` is rendered, then bring
    /// it into view.
    ///
    /// Titles are compared as typed, then without trademark glyphs, then
    /// fully normalized; the strictest match on the first screen that has
    /// any match wins.  When several rows tie, the one showing `price` is
    /// preferred.
    pub async fn locate(&self, name: &str, price: Option<&str>) -> AutomationResult<ElementHandle> {
        let d = self.driver;
        let wanted = title_variants(name);
        d.scroll_to_top().await?;

        for attempt in 1..=self.max_attempts {
            let mut best: Option<(usize, bool, ElementHandle)> = None;
            for node in d.find_all(&self.selectors.menu_item).await? {
                let item = match read_item(d, self.selectors, &node).await {
                    Ok(Some(item)) => item,
                    Ok(None) | Err(AutomationError::Driver(_)) => continue,
                    Err(e) => return Err(e),
                };
                let Some(level) = match_level(&wanted, &item.name) else {
                    continue;
                };
                let priced = price.is_some_and(|p| same_price(p, &item.price));
                let better = match &best {
                    None => true,
                    Some((l, p, _)) => level < *l || (level == *l && priced && !*p),
                };
                if better {
                    best = Some((level, priced, node));
                }
            }

            if let Some((level, _, node)) = best {
                debug!(item = name, attempt, level, "Located menu item");
                d.scroll_into_view(&node).await?;
                return Ok(node);
            }

            let before = d.scroll_position().await?;
            d.scroll_by(self.scroll_step_px).await?;
            tokio::time::sleep(self.settle).await;
            if d.scroll_position().await? == before {
                debug!(item = name, attempt, "Reached end of menu");
                break;
            }
        }

        Err(AutomationError::ElementNotFound(format!("menu item \"{}\"", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::fake::{FakeMenuItem, FakeRestaurant, FakeSite};
    use crate::automation::scraper::{MenuScraper, ScrapeSettings};

    async fn opened(items: Vec<FakeMenuItem>) -> FakeSite {
        let site = FakeSite::new(vec![FakeRestaurant::open("Diner", items)]);
        site.goto(&site.base_url()).await.unwrap();
        let selectors = site.selectors().clone();
        let settings = ScrapeSettings::default();
        MenuScraper::new(&site, &selectors, &settings)
            .open_restaurant("diner")
            .await
            .unwrap();
        site
    }

    fn filler(n: usize) -> Vec<FakeMenuItem> {
        (0..n)
            .map(|i| FakeMenuItem::new(format!("f{i}"), format!("Filler {i}"), "$1.00"))
            .collect()
    }

    #[test]
    fn levels() {
        let wanted = title_variants("Big Mac");
        assert_eq!(match_level(&wanted, "Big Mac"), Some(0));
        assert_eq!(match_level(&wanted, "Big Mac®"), Some(1));
        assert_eq!(match_level(&wanted, "big  mac!"), Some(2));
        assert_eq!(match_level(&wanted, "Big Mac® Meal"), None);
    }

    #[tokio::test]
    async fn finds_item_below_the_fold_ignoring_trademarks() {
        let mut items = filler(30);
        items.push(FakeMenuItem::new("bm", "Big Mac®", "$5.99"));
        let site = opened(items).await;
        let selectors = site.selectors().clone();

        let locator = ItemLocator::new(&site, &selectors, 25, 300, Duration::ZERO);
        let node = locator.locate("Big Mac", Some("$5.99")).await.unwrap();
        assert_eq!(node.0, "item:30");
        assert_eq!(
            site.attribute(&node, selectors.item_id_attribute).await.unwrap(),
            Some("bm".to_string())
        );
    }

    #[tokio::test]
    async fn prefers_exact_title_and_matching_price() {
        let site = opened(vec![
            FakeMenuItem::new("a", "Big Mac", "$9.99"),
            FakeMenuItem::new("b", "Big Mac®", "$5.99"),
            FakeMenuItem::new("c", "Big Mac", "$5.99"),
        ])
        .await;
        let selectors = site.selectors().clone();
        let locator = ItemLocator::new(&site, &selectors, 5, 300, Duration::ZERO);
        assert_eq!(locator.locate("Big Mac", Some("$5.99")).await.unwrap().0, "item:2");
        assert_eq!(locator.locate("Big Mac", None).await.unwrap().0, "item:0");
    }

    #[tokio::test]
    async fn missing_item_stops_at_the_bottom() {
        let site = opened(filler(12)).await;
        let selectors = site.selectors().clone();
        let locator = ItemLocator::new(&site, &selectors, 100, 300, Duration::ZERO);
        let err = locator.locate("Pizza", None).await.unwrap_err();
        assert!(matches!(err, AutomationError::ElementNotFound(_)));
        assert_eq!(site.scroll_position().await.unwrap(), 700);
    }
}
