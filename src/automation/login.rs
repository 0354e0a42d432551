//! Site session initialization.

use std::time::Duration;

use tracing::{debug, info};

use crate::automation::driver::PageDriver;
use crate::automation::selectors::SiteSelectors;
use crate::automation::wait::{WaitPolicy, wait_for, wait_for_optional};
use crate::config::SiteConfig;
use crate::error::AutomationResult;

/// How long to look for the optional "Use password" choice.
const PASSWORD_CHOICE_WAIT: Duration = Duration::from_secs(5);

/// Navigate to the site home page and wait for the search box.
pub async fn open_home(
    driver: &dyn PageDriver,
    selectors: &SiteSelectors,
    site: &SiteConfig,
    wait: WaitPolicy,
) -> AutomationResult<()> {
    driver.goto(&site.base_url).await?;
    wait_for(driver, &selectors.search_input, wait, "search box").await?;
    info!(url = %site.base_url, "Site ready");
    Ok(())
}

/// Sign in with the configured credentials.
///
/// email, "Continue to Sign In", optional "Use password", password, submit,
/// then the header sign-in link.  Ends on the home page with the search box
/// visible.
pub async fn sign_in(
    driver: &dyn PageDriver,
    selectors: &SiteSelectors,
    site: &SiteConfig,
    wait: WaitPolicy,
) -> AutomationResult<()> {
    let s = selectors;
    driver.goto(&site.login_url).await?;

    let email = wait_for(driver, &s.login_email, wait, "sign-in email field").await?;
    driver.click(&email).await?;
    driver.type_text(&email, &site.email).await?;
    let next = wait_for(driver, &s.login_continue, wait, "continue button").await?;
    driver.click(&next).await?;

    let choice_wait = wait.with_timeout(wait.timeout.min(PASSWORD_CHOICE_WAIT));
    if let Some(use_password) = wait_for_optional(driver, &s.login_use_password, choice_wait).await? {
        debug!("Choosing password sign-in");
        driver.click(&use_password).await?;
    }

    let password = wait_for(driver, &s.login_password, wait, "password field").await?;
    driver.click(&password).await?;
    driver.type_text(&password, &site.password).await?;
    let submit = wait_for(driver, &s.login_submit, wait, "sign-in submit").await?;
    driver.click(&submit).await?;

    let header = wait_for(driver, &s.header_sign_in, wait, "signed-in header").await?;
    driver.click(&header).await?;

    if wait_for_optional(driver, &s.search_input, wait).await?.is_none() {
        debug!("Search box not shown after sign-in, opening home page");
        return open_home(driver, selectors, site, wait).await;
    }
    info!("Signed in");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::fake::FakeSite;
    use crate::error::AutomationError;

    fn quick() -> WaitPolicy {
        WaitPolicy::new(Duration::from_millis(60), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn signs_in_through_password_choice() {
        let site = FakeSite::new(vec![]).with_login("me@example.com", "hunter2");
        let selectors = site.selectors().clone();
        sign_in(&site, &selectors, &site.site_config(), quick()).await.unwrap();
        assert!(site.find(&selectors.search_input).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn signs_in_without_password_choice() {
        let site = FakeSite::new(vec![])
            .with_login("me@example.com", "hunter2")
            .without_password_choice();
        let selectors = site.selectors().clone();
        sign_in(&site, &selectors, &site.site_config(), quick()).await.unwrap();
        assert!(site.find(&selectors.search_input).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn wrong_password_times_out() {
        let site = FakeSite::new(vec![]).with_login("me@example.com", "hunter2");
        let selectors = site.selectors().clone();
        let mut config = site.site_config();
        config.password = "wrong".to_string();
        let err = sign_in(&site, &selectors, &config, quick()).await.unwrap_err();
        assert!(matches!(err, AutomationError::PageLoadTimeout(w) if w == "signed-in header"));
    }

    #[tokio::test]
    async fn open_home_waits_for_search() {
        let site = FakeSite::new(vec![]);
        let selectors = site.selectors().clone();
        open_home(&site, &selectors, &site.site_config(), quick()).await.unwrap();
        assert_eq!(site.visited(), vec![site.base_url()]);
    }
}
