//! Poll-until helpers.
//!
//! Clicks return before the UI reacts, so every state change is verified
//! by polling for its visible effect under an explicit deadline.

use std::time::Duration;

use tokio::time::Instant;

use crate::automation::driver::{ElementHandle, PageDriver, Selector};
use crate::error::{AutomationError, AutomationResult};

/// Deadline and poll interval for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll: Duration,
}

impl WaitPolicy {
    pub fn new(timeout: Duration, poll: Duration) -> Self {
        Self { timeout, poll }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_millis(250))
    }
}

/// Poll until `selector` matches, failing with `PageLoadTimeout(what)`.
pub async fn wait_for(
    driver: &dyn PageDriver,
    selector: &Selector,
    policy: WaitPolicy,
    what: &str,
) -> AutomationResult<ElementHandle> {
    let deadline = Instant::now() + policy.timeout;
    loop {
        if let Some(found) = driver.find(selector).await? {
            return Ok(found);
        }
        if Instant::now() >= deadline {
            return Err(AutomationError::PageLoadTimeout(what.to_string()));
        }
        tokio::time::sleep(policy.poll).await;
    }
}

/// Like [`wait_for`], but `None` on timeout instead of an error.
pub async fn wait_for_optional(
    driver: &dyn PageDriver,
    selector: &Selector,
    policy: WaitPolicy,
) -> AutomationResult<Option<ElementHandle>> {
    match wait_for(driver, selector, policy, "optional element").await {
        Ok(found) => Ok(Some(found)),
        Err(AutomationError::PageLoadTimeout(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Poll until nothing matches `selector`.  Returns `false` on timeout.
pub async fn wait_until_gone(
    driver: &dyn PageDriver,
    selector: &Selector,
    policy: WaitPolicy,
) -> AutomationResult<bool> {
    let deadline = Instant::now() + policy.timeout;
    loop {
        if driver.find(selector).await?.is_none() {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(policy.poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::fake::{FakeRestaurant, FakeSite};

    fn quick() -> WaitPolicy {
        WaitPolicy::new(Duration::from_millis(60), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn wait_for_present_element() {
        let site = FakeSite::new(vec![FakeRestaurant::open("Cafe", vec![])]);
        site.goto(&site.base_url()).await.unwrap();
        let selectors = site.selectors().clone();
        assert!(wait_for(&site, &selectors.search_input, quick(), "search").await.is_ok());
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let site = FakeSite::new(vec![]);
        let selectors = site.selectors().clone();
        let err = wait_for(&site, &selectors.item_modal, quick(), "detail view")
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::PageLoadTimeout(w) if w == "detail view"));
        assert!(
            wait_for_optional(&site, &selectors.item_modal, quick())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn wait_until_gone_for_absent_element() {
        let site = FakeSite::new(vec![]);
        let selectors = site.selectors().clone();
        assert!(wait_until_gone(&site, &selectors.item_modal, quick()).await.unwrap());
    }
}
