//! Browser automation against the ordering site.
//!
//! Policy modules ([`scraper`], [`locator`], [`actuator`], [`login`]) only
//! talk to a page through [`PageDriver`]; [`webdriver`] drives a real
//! browser and [`fake`] an in-memory site.

pub mod actuator;
pub mod browser;
pub mod diagnostics;
pub mod driver;
pub mod fake;
pub mod locator;
pub mod login;
pub mod scraper;
pub mod selectors;
pub mod wait;
pub mod webdriver;

pub use actuator::{ActuateSettings, CartActuator};
pub use browser::{AutomationSession, BrowserSession};
pub use driver::{ElementHandle, PageDriver, Selector};
pub use fake::FakeSite;
pub use scraper::{MenuScraper, ScrapeSettings};
pub use selectors::SiteSelectors;
pub use webdriver::WebDriverPage;
