//! In-memory ordering site implementing [`PageDriver`].
//!
//! Models the parts of the real site the automation depends on: a search
//! box, store cards with open/closed status, a virtualized menu list that
//! only renders the rows near the viewport, an item detail view with
//! radio options, a quantity stepper and a cart.  Used by tests and by
//! `browser.driver = "demo"`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::automation::driver::{ElementHandle, PageDriver, Selector};
use crate::automation::selectors::SiteSelectors;
use crate::config::SiteConfig;
use crate::error::{AutomationError, AutomationResult};
use crate::text::tokens;

const ROW_HEIGHT: i64 = 100;
const VIEWPORT: i64 = 500;
const BASE_URL: &str = "https://fake.example/";
const LOGIN_URL: &str = "https://fake.example/login";

// ── Site content ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FakeOption {
    /// Visible label, possibly multi-line (`"Large\n+$0.60"`).
    pub label: String,
    /// Price the detail view shows once this option is selected.
    pub shows_price: Option<String>,
    pub default_selected: bool,
}

impl FakeOption {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            shows_price: None,
            default_selected: false,
        }
    }

    pub fn showing(mut self, price: impl Into<String>) -> Self {
        self.shows_price = Some(price.into());
        self
    }

    pub fn selected(mut self) -> Self {
        self.default_selected = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FakeMenuItem {
    pub id: String,
    pub name: String,
    pub price: String,
    pub options: Vec<FakeOption>,
    /// Render the combined `"Name, $price"` label attribute.
    pub labelled: bool,
    pub has_quantity_control: bool,
    /// The stepper shows no count.
    pub has_quantity_readout: bool,
    /// Detail view ignores the add button.
    pub sticky: bool,
}

impl FakeMenuItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price: price.into(),
            options: Vec::new(),
            labelled: true,
            has_quantity_control: true,
            has_quantity_readout: true,
            sticky: false,
        }
    }

    pub fn with_options(mut self, options: Vec<FakeOption>) -> Self {
        self.options = options;
        self
    }

    pub fn unlabelled(mut self) -> Self {
        self.labelled = false;
        self
    }

    pub fn without_quantity_control(mut self) -> Self {
        self.has_quantity_control = false;
        self
    }

    pub fn without_quantity_readout(mut self) -> Self {
        self.has_quantity_readout = false;
        self
    }

    pub fn sticky(mut self) -> Self {
        self.sticky = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FakeRestaurant {
    pub name: String,
    pub status: String,
    pub items: Vec<FakeMenuItem>,
}

impl FakeRestaurant {
    pub fn open(name: impl Into<String>, items: Vec<FakeMenuItem>) -> Self {
        Self {
            name: name.into(),
            status: "Open".to_string(),
            items,
        }
    }

    pub fn closed(name: impl Into<String>, items: Vec<FakeMenuItem>) -> Self {
        Self {
            name: name.into(),
            status: "Closed".to_string(),
            items,
        }
    }
}

/// One line in the fake cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartEntry {
    pub item: String,
    pub quantity: u32,
    pub option: Option<String>,
}

// ── Page state ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginStage {
    Email,
    Choice,
    Password,
    Header,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Screen {
    Blank,
    Login(LoginStage),
    Home,
    Results(Vec<usize>),
    Store(usize),
}

#[derive(Debug, Clone)]
struct Modal {
    item: usize,
    selected: Option<usize>,
    quantity: u32,
}

#[derive(Debug)]
struct State {
    screen: Screen,
    scroll_y: i64,
    modal: Option<Modal>,
    cart: Vec<CartEntry>,
    checkout_visits: u32,
    search_text: String,
    email: String,
    password: String,
    visited: Vec<String>,
}

/// Parsed element handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Search,
    Results,
    Card(usize),
    CardName(usize),
    CardStatus(usize),
    StorePage,
    Item(usize),
    ItemTitle(usize),
    ItemPrice(usize),
    Modal,
    ModalPrice,
    Option(usize),
    Add,
    Increment,
    Quantity,
    Close,
    Cart,
    LoginEmail,
    LoginContinue,
    LoginUsePassword,
    LoginPassword,
    LoginSubmit,
    HeaderSignIn,
}

impl Node {
    fn handle(self) -> ElementHandle {
        let s = match self {
            Self::Search => "search".to_string(),
            Self::Results => "results".to_string(),
            Self::Card(i) => format!("card:{i}"),
            Self::CardName(i) => format!("card:{i}:name"),
            Self::CardStatus(i) => format!("card:{i}:status"),
            Self::StorePage => "store".to_string(),
            Self::Item(i) => format!("item:{i}"),
            Self::ItemTitle(i) => format!("item:{i}:title"),
            Self::ItemPrice(i) => format!("item:{i}:price"),
            Self::Modal => "modal".to_string(),
            Self::ModalPrice => "modal:price".to_string(),
            Self::Option(i) => format!("option:{i}"),
            Self::Add => "add".to_string(),
            Self::Increment => "inc".to_string(),
            Self::Quantity => "qty".to_string(),
            Self::Close => "close".to_string(),
            Self::Cart => "cart".to_string(),
            Self::LoginEmail => "login:email".to_string(),
            Self::LoginContinue => "login:continue".to_string(),
            Self::LoginUsePassword => "login:use-password".to_string(),
            Self::LoginPassword => "login:password".to_string(),
            Self::LoginSubmit => "login:submit".to_string(),
            Self::HeaderSignIn => "login:header".to_string(),
        };
        ElementHandle(s)
    }

    fn parse(handle: &ElementHandle) -> AutomationResult<Self> {
        let parts: Vec<&str> = handle.0.split(':').collect();
        let index = |s: &str| {
            s.parse::<usize>()
                .map_err(|_| AutomationError::driver(format!("bad element handle {:?}", handle.0)))
        };
        let node = match parts.as_slice() {
            ["search"] => Self::Search,
            ["results"] => Self::Results,
            ["card", i] => Self::Card(index(*i)?),
            ["card", i, "name"] => Self::CardName(index(*i)?),
            ["card", i, "status"] => Self::CardStatus(index(*i)?),
            ["store"] => Self::StorePage,
            ["item", i] => Self::Item(index(*i)?),
            ["item", i, "title"] => Self::ItemTitle(index(*i)?),
            ["item", i, "price"] => Self::ItemPrice(index(*i)?),
            ["modal"] => Self::Modal,
            ["modal", "price"] => Self::ModalPrice,
            ["option", i] => Self::Option(index(*i)?),
            ["add"] => Self::Add,
            ["inc"] => Self::Increment,
            ["qty"] => Self::Quantity,
            ["close"] => Self::Close,
            ["cart"] => Self::Cart,
            ["login", "email"] => Self::LoginEmail,
            ["login", "continue"] => Self::LoginContinue,
            ["login", "use-password"] => Self::LoginUsePassword,
            ["login", "password"] => Self::LoginPassword,
            ["login", "submit"] => Self::LoginSubmit,
            ["login", "header"] => Self::HeaderSignIn,
            _ => {
                return Err(AutomationError::driver(format!(
                    "unknown element handle {:?}",
                    handle.0
                )));
            }
        };
        Ok(node)
    }
}

fn stale(handle: &ElementHandle) -> AutomationError {
    AutomationError::driver(format!("stale element reference: {}", handle.0))
}

// ── FakeSite ─────────────────────────────────────────────────────

pub struct FakeSite {
    selectors: SiteSelectors,
    restaurants: Vec<FakeRestaurant>,
    credentials: Option<(String, String)>,
    offer_password_choice: bool,
    state: Mutex<State>,
}

impl FakeSite {
    pub fn new(restaurants: Vec<FakeRestaurant>) -> Self {
        Self {
            selectors: SiteSelectors::default(),
            restaurants,
            credentials: None,
            offer_password_choice: true,
            state: Mutex::new(State {
                screen: Screen::Blank,
                scroll_y: 0,
                modal: None,
                cart: Vec::new(),
                checkout_visits: 0,
                search_text: String::new(),
                email: String::new(),
                password: String::new(),
                visited: Vec::new(),
            }),
        }
    }

    /// Require signing in through the login page.
    pub fn with_login(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((email.into(), password.into()));
        self
    }

    /// Go straight from "Continue" to the password page.
    pub fn without_password_choice(mut self) -> Self {
        self.offer_password_choice = false;
        self
    }

    /// A small burger menu with the ambiguities the resolver has to handle.
    pub fn demo() -> Self {
        let sizes = || {
            vec![
                FakeOption::new("Small"),
                FakeOption::new("Medium\n+$0.70").selected(),
                FakeOption::new("Large\n+$1.20"),
            ]
        };
        Self::new(vec![
            FakeRestaurant::closed("McDonald's (Closed Location)", vec![]),
            FakeRestaurant::open(
                "McDonald's",
                vec![
                    FakeMenuItem::new("101", "Big Mac®", "$5.99"),
                    FakeMenuItem::new("102", "Big Mac® Meal", "$9.49"),
                    FakeMenuItem::new("103", "Quarter Pounder® with Cheese", "$6.49"),
                    FakeMenuItem::new("104", "10 pc. Chicken McNuggets®", "$5.49"),
                    FakeMenuItem::new("105", "Small Fries", "$2.79"),
                    FakeMenuItem::new("106", "Medium Fries", "$3.49"),
                    FakeMenuItem::new("107", "Large Fries", "$3.99"),
                    FakeMenuItem::new("108", "Coca-Cola®", "$1.29").with_options(sizes()),
                    FakeMenuItem::new("109", "Diet Coke®", "$1.29").with_options(sizes()),
                    FakeMenuItem::new("110", "Sprite®", "$1.29").with_options(sizes()),
                    FakeMenuItem::new("111", "Hash Browns", "$2.19"),
                    FakeMenuItem::new("112", "McFlurry® with OREO® Cookies", "$4.39"),
                ],
            ),
        ])
    }

    pub fn selectors(&self) -> &SiteSelectors {
        &self.selectors
    }

    pub fn base_url(&self) -> String {
        BASE_URL.to_string()
    }

    /// Site settings pointing at this fake.
    pub fn site_config(&self) -> SiteConfig {
        let (email, password) = self.credentials.clone().unwrap_or_default();
        SiteConfig {
            base_url: BASE_URL.to_string(),
            login_url: LOGIN_URL.to_string(),
            email,
            password,
        }
    }

    pub fn cart(&self) -> Vec<CartEntry> {
        self.state().cart.clone()
    }

    pub fn checkout_visits(&self) -> u32 {
        self.state().checkout_visits
    }

    pub fn visited(&self) -> Vec<String> {
        self.state().visited.clone()
    }

    pub fn modal_open(&self) -> bool {
        self.state().modal.is_some()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, state: &State) -> Option<(usize, &FakeRestaurant)> {
        match state.screen {
            Screen::Store(r) => self.restaurants.get(r).map(|rest| (r, rest)),
            _ => None,
        }
    }

    fn max_scroll(&self, state: &State) -> i64 {
        self.store(state)
            .map(|(_, r)| (r.items.len() as i64 * ROW_HEIGHT - VIEWPORT).max(0))
            .unwrap_or(0)
    }

    /// Rows currently in the DOM.
    fn rendered(&self, state: &State) -> std::ops::Range<usize> {
        let Some((_, rest)) = self.store(state) else {
            return 0..0;
        };
        let n = rest.items.len();
        let first = (state.scroll_y / ROW_HEIGHT) as usize;
        let last = ((state.scroll_y + VIEWPORT) / ROW_HEIGHT + 1) as usize;
        first.min(n)..last.min(n)
    }

    fn item<'a>(&'a self, state: &State, i: usize) -> Option<&'a FakeMenuItem> {
        self.store(state).and_then(|(r, _)| self.restaurants[r].items.get(i))
    }

    fn browsing(state: &State) -> bool {
        matches!(state.screen, Screen::Home | Screen::Results(_) | Screen::Store(_))
    }

    fn modal_item<'a, 's>(&'a self, state: &'s State) -> Option<(&'a FakeMenuItem, &'s Modal)> {
        let modal = state.modal.as_ref()?;
        let item = self.item(state, modal.item)?;
        Some((item, modal))
    }

    fn search_results(&self, query: &str) -> Vec<usize> {
        let wanted = tokens(query);
        self.restaurants
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                let have = tokens(&r.name);
                wanted.iter().any(|t| have.contains(t))
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn login_stage(state: &State) -> Option<LoginStage> {
        match state.screen {
            Screen::Login(stage) => Some(stage),
            _ => None,
        }
    }

    fn nodes_for(&self, state: &State, selector: &Selector) -> Vec<Node> {
        let s = &self.selectors;
        let modal = state.modal.is_some();
        let stage = Self::login_stage(state);

        if *selector == s.search_input && Self::browsing(state) {
            vec![Node::Search]
        } else if *selector == s.search_results && matches!(state.screen, Screen::Results(_)) {
            vec![Node::Results]
        } else if *selector == s.store_card {
            match &state.screen {
                Screen::Results(list) => list.iter().map(|i| Node::Card(*i)).collect(),
                _ => vec![],
            }
        } else if *selector == s.store_page && self.store(state).is_some() {
            vec![Node::StorePage]
        } else if *selector == s.menu_item {
            self.rendered(state).map(Node::Item).collect()
        } else if *selector == s.item_modal && modal {
            vec![Node::Modal]
        } else if *selector == s.modal_price && modal {
            vec![Node::ModalPrice]
        } else if *selector == s.option_radio {
            self.modal_item(state)
                .map(|(item, _)| (0..item.options.len()).map(Node::Option).collect())
                .unwrap_or_default()
        } else if *selector == s.add_to_cart && modal {
            vec![Node::Add]
        } else if *selector == s.quantity_increment {
            match self.modal_item(state) {
                Some((item, _)) if item.has_quantity_control => vec![Node::Increment],
                _ => vec![],
            }
        } else if *selector == s.quantity_value {
            match self.modal_item(state) {
                Some((item, _)) if item.has_quantity_readout => vec![Node::Quantity],
                _ => vec![],
            }
        } else if *selector == s.modal_close && modal {
            vec![Node::Close]
        } else if *selector == s.cart_button && Self::browsing(state) {
            vec![Node::Cart]
        } else if *selector == s.login_email && stage == Some(LoginStage::Email) {
            vec![Node::LoginEmail]
        } else if *selector == s.login_continue && stage == Some(LoginStage::Email) {
            vec![Node::LoginContinue]
        } else if *selector == s.login_use_password && stage == Some(LoginStage::Choice) {
            vec![Node::LoginUsePassword]
        } else if *selector == s.login_password && stage == Some(LoginStage::Password) {
            vec![Node::LoginPassword]
        } else if *selector == s.login_submit && stage == Some(LoginStage::Password) {
            vec![Node::LoginSubmit]
        } else if *selector == s.header_sign_in && stage == Some(LoginStage::Header) {
            vec![Node::HeaderSignIn]
        } else {
            vec![]
        }
    }

    fn text_of(&self, state: &State, handle: &ElementHandle) -> AutomationResult<String> {
        let restaurant = |i: usize| self.restaurants.get(i).ok_or_else(|| stale(handle));
        let item = |i: usize| self.item(state, i).ok_or_else(|| stale(handle));
        let text = match Node::parse(handle)? {
            Node::Card(i) => {
                let r = restaurant(i)?;
                format!("{}\n{}", r.name, r.status)
            }
            Node::CardName(i) => restaurant(i)?.name.clone(),
            Node::CardStatus(i) => restaurant(i)?.status.clone(),
            Node::Item(i) => {
                let it = item(i)?;
                format!("{}\n{}", it.name, it.price)
            }
            Node::ItemTitle(i) => item(i)?.name.clone(),
            Node::ItemPrice(i) => item(i)?.price.clone(),
            Node::ModalPrice => {
                let (item, modal) = self.modal_item(state).ok_or_else(|| stale(handle))?;
                modal
                    .selected
                    .and_then(|k| item.options.get(k))
                    .and_then(|o| o.shows_price.clone())
                    .unwrap_or_else(|| item.price.clone())
            }
            Node::Option(k) => {
                let (item, _) = self.modal_item(state).ok_or_else(|| stale(handle))?;
                item.options.get(k).ok_or_else(|| stale(handle))?.label.clone()
            }
            Node::Quantity => {
                let (_, modal) = self.modal_item(state).ok_or_else(|| stale(handle))?;
                modal.quantity.to_string()
            }
            Node::Add => "Add to cart".to_string(),
            _ => String::new(),
        };
        Ok(text)
    }
}

#[async_trait]
impl PageDriver for FakeSite {
    async fn goto(&self, url: &str) -> AutomationResult<()> {
        let mut state = self.state();
        state.visited.push(url.to_string());
        state.modal = None;
        state.scroll_y = 0;
        state.screen = if url == LOGIN_URL && self.credentials.is_some() {
            Screen::Login(LoginStage::Email)
        } else if url.starts_with(BASE_URL) {
            Screen::Home
        } else {
            Screen::Blank
        };
        Ok(())
    }

    async fn find_all(&self, selector: &Selector) -> AutomationResult<Vec<ElementHandle>> {
        let state = self.state();
        Ok(self
            .nodes_for(&state, selector)
            .into_iter()
            .map(Node::handle)
            .collect())
    }

    async fn find_within(
        &self,
        parent: &ElementHandle,
        selector: &Selector,
    ) -> AutomationResult<Vec<ElementHandle>> {
        let s = &self.selectors;
        let state = self.state();
        let found = match Node::parse(parent)? {
            Node::Card(i) if *selector == s.store_card_name => vec![Node::CardName(i)],
            Node::Card(i) if *selector == s.store_card_status => vec![Node::CardStatus(i)],
            Node::Item(i) if !self.rendered(&state).contains(&i) => return Err(stale(parent)),
            Node::Item(i) if *selector == s.menu_item_title => vec![Node::ItemTitle(i)],
            Node::Item(i) if *selector == s.menu_item_price => vec![Node::ItemPrice(i)],
            _ => vec![],
        };
        Ok(found.into_iter().map(Node::handle).collect())
    }

    async fn click(&self, element: &ElementHandle) -> AutomationResult<()> {
        let mut state = self.state();
        match Node::parse(element)? {
            Node::Card(r) | Node::CardName(r) => {
                if !matches!(&state.screen, Screen::Results(list) if list.contains(&r)) {
                    return Err(stale(element));
                }
                state.screen = Screen::Store(r);
                state.scroll_y = 0;
            }
            Node::Item(i) => {
                if !self.rendered(&state).contains(&i) {
                    return Err(AutomationError::driver("element not interactable"));
                }
                let item = self.item(&state, i).ok_or_else(|| stale(element))?;
                let selected = item.options.iter().position(|o| o.default_selected);
                state.modal = Some(Modal {
                    item: i,
                    selected,
                    quantity: 1,
                });
            }
            Node::Option(k) => {
                let modal = state.modal.as_mut().ok_or_else(|| stale(element))?;
                modal.selected = Some(k);
            }
            Node::Increment => {
                let modal = state.modal.as_mut().ok_or_else(|| stale(element))?;
                modal.quantity += 1;
            }
            Node::Add => {
                let (item, modal) = self.modal_item(&state).ok_or_else(|| stale(element))?;
                if !item.sticky {
                    let entry = CartEntry {
                        item: item.name.clone(),
                        quantity: modal.quantity,
                        option: modal
                            .selected
                            .and_then(|k| item.options.get(k))
                            .and_then(|o| o.label.lines().next())
                            .map(str::to_string),
                    };
                    state.cart.push(entry);
                    state.modal = None;
                }
            }
            Node::Close => state.modal = None,
            Node::Cart => state.checkout_visits += 1,
            Node::LoginContinue if !state.email.is_empty() => {
                state.screen = if self.offer_password_choice {
                    Screen::Login(LoginStage::Choice)
                } else {
                    Screen::Login(LoginStage::Password)
                };
            }
            Node::LoginUsePassword => state.screen = Screen::Login(LoginStage::Password),
            Node::LoginSubmit => {
                let ok = self
                    .credentials
                    .as_ref()
                    .is_some_and(|(e, p)| *e == state.email && *p == state.password);
                if ok {
                    state.screen = Screen::Login(LoginStage::Header);
                }
            }
            Node::HeaderSignIn => state.screen = Screen::Home,
            _ => {}
        }
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> AutomationResult<()> {
        let mut state = self.state();
        match Node::parse(element)? {
            Node::Search => state.search_text.push_str(text),
            Node::LoginEmail => state.email.push_str(text),
            Node::LoginPassword => state.password.push_str(text),
            _ => return Err(AutomationError::driver("element not interactable")),
        }
        Ok(())
    }

    async fn press_enter(&self, element: &ElementHandle) -> AutomationResult<()> {
        let mut state = self.state();
        if Node::parse(element)? == Node::Search {
            let query = std::mem::take(&mut state.search_text);
            state.screen = Screen::Results(self.search_results(&query));
            state.modal = None;
            state.scroll_y = 0;
        }
        Ok(())
    }

    async fn text(&self, element: &ElementHandle) -> AutomationResult<String> {
        let state = self.state();
        self.text_of(&state, element)
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> AutomationResult<Option<String>> {
        let s = &self.selectors;
        let state = self.state();
        let value = match Node::parse(element)? {
            Node::Item(i) => {
                if !self.rendered(&state).contains(&i) {
                    return Err(stale(element));
                }
                let item = self.item(&state, i).ok_or_else(|| stale(element))?;
                if name == s.item_id_attribute {
                    Some(item.id.clone())
                } else if name == s.item_label_attribute && item.labelled {
                    Some(format!("{}, {}", item.name, item.price))
                } else {
                    None
                }
            }
            Node::Option(k) if name == s.option_checked_attribute => {
                let (_, modal) = self.modal_item(&state).ok_or_else(|| stale(element))?;
                Some((modal.selected == Some(k)).to_string())
            }
            _ => None,
        };
        Ok(value)
    }

    async fn scroll_by(&self, dy: i64) -> AutomationResult<()> {
        let mut state = self.state();
        let max = self.max_scroll(&state);
        state.scroll_y = (state.scroll_y + dy).clamp(0, max);
        Ok(())
    }

    async fn scroll_to_top(&self) -> AutomationResult<()> {
        self.state().scroll_y = 0;
        Ok(())
    }

    async fn scroll_position(&self) -> AutomationResult<i64> {
        Ok(self.state().scroll_y)
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> AutomationResult<()> {
        let mut state = self.state();
        if let Node::Item(i) = Node::parse(element)? {
            let max = self.max_scroll(&state);
            state.scroll_y = (i as i64 * ROW_HEIGHT - VIEWPORT / 2).clamp(0, max);
        }
        Ok(())
    }

    async fn screenshot(&self) -> AutomationResult<Vec<u8>> {
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }
}
