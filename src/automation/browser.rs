//! The shared browser page as a serialized resource.
//!
//! There is exactly one live page.  [`BrowserSession`] owns it and runs
//! every scrape and cart mutation under the [`OrderGate`] permit, so two
//! ordering flows never interleave clicks on the same modal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::automation::actuator::{ActuateSettings, CartActuator};
use crate::automation::driver::PageDriver;
use crate::automation::login;
use crate::automation::scraper::{MenuScraper, ScrapeSettings};
use crate::automation::selectors::SiteSelectors;
use crate::concurrency::OrderGate;
use crate::config::{Config, SiteConfig, duration_or};
use crate::error::{AutomationError, AutomationResult};
use crate::order::{ConfidentMatch, MenuCatalogEntry, OrderPlacementResult};
use crate::text::normalize;

/// What the pipeline needs from the automated site.
#[async_trait]
pub trait AutomationSession: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Open `restaurant` and read its full menu.
    async fn scrape_catalog(&self, restaurant: &str) -> AutomationResult<Vec<MenuCatalogEntry>>;

    /// Add confirmed lines to the cart of `restaurant` and open the cart.
    async fn place_order(
        &self,
        restaurant: &str,
        lines: &[ConfidentMatch],
    ) -> AutomationResult<OrderPlacementResult>;
}

pub struct BrowserSession {
    driver: Arc<dyn PageDriver>,
    selectors: SiteSelectors,
    site: SiteConfig,
    scrape: ScrapeSettings,
    actuate: ActuateSettings,
    gate: OrderGate,
    ready: AtomicBool,
    /// Restaurant whose store page was last opened.
    current: Mutex<Option<String>>,
}

impl BrowserSession {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        selectors: SiteSelectors,
        site: SiteConfig,
        scrape: ScrapeSettings,
        actuate: ActuateSettings,
        gate: OrderGate,
    ) -> Self {
        Self {
            driver,
            selectors,
            site,
            scrape,
            actuate,
            gate,
            ready: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    pub fn from_config(driver: Arc<dyn PageDriver>, selectors: SiteSelectors, config: &Config) -> Self {
        Self::new(
            driver,
            selectors,
            config.browser.site.clone(),
            ScrapeSettings::from_config(&config.scraper),
            ActuateSettings::from_config(&config.actuator, &config.scraper),
            OrderGate::new(duration_or(&config.browser.gate_timeout, Duration::from_secs(120))),
        )
    }

    pub fn gate(&self) -> &OrderGate {
        &self.gate
    }

    /// Sign in when credentials are configured, otherwise just open the
    /// home page.  Either way the search box must be visible.
    pub async fn initialize(&self) -> AutomationResult<()> {
        let _permit = self.gate.acquire().await?;
        let d = self.driver.as_ref();
        let wait = self.scrape.initial_wait;
        if self.site.has_credentials() {
            login::sign_in(d, &self.selectors, &self.site, wait).await?;
        } else {
            login::open_home(d, &self.selectors, &self.site, wait).await?;
        }
        *self.current.lock().await = None;
        self.ready.store(true, Ordering::SeqCst);
        info!(signed_in = self.site.has_credentials(), "Browser session ready");
        Ok(())
    }

    fn ensure_ready(&self) -> AutomationResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(AutomationError::NotReady)
        }
    }

    /// Open `restaurant` unless its store page is already showing.
    async fn enter_restaurant(&self, scraper: &MenuScraper<'_>, restaurant: &str) -> AutomationResult<()> {
        let mut current = self.current.lock().await;
        let showing = current.as_deref().is_some_and(|c| normalize(c) == normalize(restaurant))
            && self.driver.find(&self.selectors.store_page).await?.is_some();
        if showing {
            debug!(restaurant, "Store page already open");
            return Ok(());
        }
        *current = None;
        login::open_home(self.driver.as_ref(), &self.selectors, &self.site, self.scrape.initial_wait).await?;
        scraper.open_restaurant(restaurant).await?;
        *current = Some(restaurant.to_string());
        Ok(())
    }
}

#[async_trait]
impl AutomationSession for BrowserSession {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn scrape_catalog(&self, restaurant: &str) -> AutomationResult<Vec<MenuCatalogEntry>> {
        self.ensure_ready()?;
        let _permit = self.gate.acquire().await?;
        let scraper = MenuScraper::new(self.driver.as_ref(), &self.selectors, &self.scrape);
        self.enter_restaurant(&scraper, restaurant).await?;
        scraper.read_menu(restaurant).await
    }

    async fn place_order(
        &self,
        restaurant: &str,
        lines: &[ConfidentMatch],
    ) -> AutomationResult<OrderPlacementResult> {
        self.ensure_ready()?;
        let _permit = self.gate.acquire().await?;
        let scraper = MenuScraper::new(self.driver.as_ref(), &self.selectors, &self.scrape);
        self.enter_restaurant(&scraper, restaurant).await?;
        info!(restaurant, lines = lines.len(), "Placing order");
        let result = CartActuator::new(self.driver.as_ref(), &self.selectors, &self.actuate)
            .place_all(lines)
            .await;
        // The cart view replaced the store page.
        *self.current.lock().await = None;
        Ok(result)
    }
}
