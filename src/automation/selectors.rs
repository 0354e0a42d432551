//! Site-specific selectors.
//!
//! Everything that ties the automation to one ordering site's markup
//! lives here.  The scraper, locator, actuator and login flow take a
//! [`SiteSelectors`] and never spell a selector themselves.

use crate::automation::driver::Selector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSelectors {
    // ── Search ──
    pub search_input: Selector,
    /// Present once a results page has rendered, even with zero cards.
    pub search_results: Selector,
    pub store_card: Selector,
    /// Within a store card.
    pub store_card_name: Selector,
    /// Within a store card: "Open", "Closed", "Opens at 5:00 PM", ...
    pub store_card_status: Selector,

    // ── Store page ──
    pub store_page: Selector,
    pub menu_item: Selector,
    /// Within a menu item, used when the combined label is missing.
    pub menu_item_title: Selector,
    pub menu_item_price: Selector,
    /// Site-assigned item id attribute on a menu item.
    pub item_id_attribute: &'static str,
    /// Combined `"Name, $price"` label attribute on a menu item.
    pub item_label_attribute: &'static str,

    // ── Detail view ──
    pub item_modal: Selector,
    /// Price shown in the detail view; may update after a selection.
    pub modal_price: Selector,
    pub option_radio: Selector,
    pub option_checked_attribute: &'static str,
    pub add_to_cart: Selector,
    pub quantity_increment: Selector,
    pub quantity_value: Selector,
    pub modal_close: Selector,

    // ── Cart ──
    pub cart_button: Selector,

    // ── Sign-in ──
    pub login_email: Selector,
    pub login_continue: Selector,
    pub login_use_password: Selector,
    pub login_password: Selector,
    pub login_submit: Selector,
    pub header_sign_in: Selector,
}

impl Default for SiteSelectors {
    /// DoorDash consumer web.
    fn default() -> Self {
        Self {
            search_input: Selector::css(r#"input[placeholder="Search DoorDash"]"#),
            search_results: Selector::css(r#"[data-testid="SearchResults"]"#),
            store_card: Selector::css(r#"[data-anchor-id="StoreCard"]"#),
            store_card_name: Selector::css(r#"[data-telemetry-id="store.name"]"#),
            store_card_status: Selector::css(r#"[data-testid="StoreStatus"]"#),

            store_page: Selector::css(r#"[data-testid="StorePage"]"#),
            menu_item: Selector::css(r#"[data-anchor-id="MenuItem"]"#),
            menu_item_title: Selector::css(r#"[data-telemetry-id="storeMenuItem.title"]"#),
            menu_item_price: Selector::css(r#"[data-anchor-id="StoreMenuItemPrice"]"#),
            item_id_attribute: "data-item-id",
            item_label_attribute: "aria-label",

            item_modal: Selector::css(r#"[role="dialog"][data-testid="ItemModal"]"#),
            modal_price: Selector::css(r#"[data-testid="ItemModalPrice"]"#),
            option_radio: Selector::css(r#"[role="radio"]"#),
            option_checked_attribute: "aria-checked",
            add_to_cart: Selector::css(r#"button[data-anchor-id="AddToCartButton"]"#),
            quantity_increment: Selector::css(r#"button[aria-label="Increase quantity"]"#),
            quantity_value: Selector::css(r#"[data-testid="QuantityValue"]"#),
            modal_close: Selector::css(r#"button[aria-label="Close"]"#),

            cart_button: Selector::css(r#"[data-testid="OrderCartIconButton"]"#),

            login_email: Selector::css(r#"input[type="email"]"#),
            login_continue: Selector::xpath("//button[contains(., 'Continue to Sign In')]"),
            login_use_password: Selector::xpath("//button[contains(., 'Use password')]"),
            login_password: Selector::css(r#"input[type="password"]"#),
            login_submit: Selector::css(r#"button[id="login-submit-button"]"#),
            header_sign_in: Selector::css(r#"a[data-testid="signInButton"]"#),
        }
    }
}
