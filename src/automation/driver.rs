//! Page-driver capability.
//!
//! The scraping and actuation policies only ever talk to a page through
//! this trait.  The WebDriver adapter implements it over HTTP; the fake
//! site in [`crate::automation::fake`] implements it in memory.

use async_trait::async_trait;

use crate::error::AutomationResult;

/// How to find elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Css(String),
    XPath(String),
}

impl Selector {
    pub fn css(s: impl Into<String>) -> Self {
        Self::Css(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Self::XPath(s.into())
    }

    /// WebDriver locator strategy name.
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::Css(_) => "css selector",
            Self::XPath(_) => "xpath",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Css(s) | Self::XPath(s) => s,
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css:{}", s),
            Self::XPath(s) => write!(f, "xpath:{}", s),
        }
    }
}

/// Opaque reference to an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

/// One live browser page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> AutomationResult<()>;

    /// All matching elements in document order.  No match is `Ok(vec![])`.
    async fn find_all(&self, selector: &Selector) -> AutomationResult<Vec<ElementHandle>>;

    async fn find_within(
        &self,
        parent: &ElementHandle,
        selector: &Selector,
    ) -> AutomationResult<Vec<ElementHandle>>;

    async fn click(&self, element: &ElementHandle) -> AutomationResult<()>;

    async fn type_text(&self, element: &ElementHandle, text: &str) -> AutomationResult<()>;

    async fn press_enter(&self, element: &ElementHandle) -> AutomationResult<()>;

    /// Rendered text, lines separated by `\n`.
    async fn text(&self, element: &ElementHandle) -> AutomationResult<String>;

    async fn attribute(&self, element: &ElementHandle, name: &str) -> AutomationResult<Option<String>>;

    async fn scroll_by(&self, dy: i64) -> AutomationResult<()>;

    async fn scroll_to_top(&self) -> AutomationResult<()>;

    /// Vertical scroll offset in pixels.
    async fn scroll_position(&self) -> AutomationResult<i64>;

    async fn scroll_into_view(&self, element: &ElementHandle) -> AutomationResult<()>;

    /// PNG bytes of the viewport.
    async fn screenshot(&self) -> AutomationResult<Vec<u8>>;

    /// First match, if any.
    async fn find(&self, selector: &Selector) -> AutomationResult<Option<ElementHandle>> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }

    async fn find_first_within(
        &self,
        parent: &ElementHandle,
        selector: &Selector,
    ) -> AutomationResult<Option<ElementHandle>> {
        Ok(self.find_within(parent, selector).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_strategy_names() {
        assert_eq!(Selector::css("a").strategy(), "css selector");
        assert_eq!(Selector::xpath("//a").strategy(), "xpath");
        assert_eq!(Selector::xpath("//a").value(), "//a");
        assert_eq!(Selector::css("input").to_string(), "css:input");
    }
}
