//! W3C WebDriver adapter.
//!
//! Talks plain JSON over HTTP to a chromedriver (or any W3C endpoint):
//! one session, one window, element handles are the driver's element ids.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::automation::driver::{ElementHandle, PageDriver, Selector};
use crate::config::{BrowserConfig, duration_or};
use crate::error::{AutomationError, AutomationResult};
use crate::utils::preview;

/// Key under which W3C drivers return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// WebDriver's code point for the Enter key.
const ENTER_KEY: &str = "\u{E007}";

fn element_ref(element: &ElementHandle) -> Value {
    json!({ ELEMENT_KEY: element.0 })
}

fn parse_elements(value: &Value) -> AutomationResult<Vec<ElementHandle>> {
    let list = value
        .as_array()
        .ok_or_else(|| AutomationError::driver("element list is not an array"))?;
    list.iter()
        .map(|entry| {
            entry
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| ElementHandle(id.to_string()))
                .ok_or_else(|| AutomationError::driver("malformed element reference"))
        })
        .collect()
}

/// Map a W3C error payload to the automation taxonomy.
fn command_error(status: reqwest::StatusCode, body: &Value) -> AutomationError {
    let code = body
        .pointer("/value/error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = body
        .pointer("/value/message")
        .and_then(Value::as_str)
        .unwrap_or("");
    match code {
        "no such element" => AutomationError::ElementNotFound(preview(message, 200)),
        _ => AutomationError::Driver(format!("{} ({}): {}", code, status, preview(message, 200))),
    }
}

fn chrome_args(config: &BrowserConfig) -> Vec<String> {
    let mut args = vec![
        format!("--window-size={},{}", config.viewport_width, config.viewport_height),
        format!("--user-agent={}", config.user_agent),
        "--disable-blink-features=AutomationControlled".to_string(),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    args
}

pub struct WebDriverPage {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
}

impl WebDriverPage {
    /// Start a new browser session.
    pub async fn connect(config: &BrowserConfig) -> AutomationResult<Self> {
        let timeout = duration_or(&config.command_timeout, Duration::from_secs(15));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AutomationError::driver(format!("failed to build WebDriver client: {}", e)))?;
        let endpoint = config.webdriver_url.trim_end_matches('/').to_string();

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": chrome_args(config) }
                }
            }
        });
        let value = send(&client, Method::POST, &format!("{}/session", endpoint), Some(capabilities)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AutomationError::driver("new session reply has no sessionId"))?
            .to_string();

        let page = Self {
            client,
            endpoint,
            session_id,
        };
        // Headless chrome ignores --window-size on some versions.
        if let Err(e) = page
            .command(
                Method::POST,
                "window/rect",
                Some(json!({ "width": config.viewport_width, "height": config.viewport_height })),
            )
            .await
        {
            warn!("Could not size browser window: {}", e);
        }
        info!(session = %page.session_id, endpoint = %page.endpoint, "WebDriver session started");
        Ok(page)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> AutomationResult<Value> {
        let url = format!("{}/session/{}/{}", self.endpoint, self.session_id, path);
        send(&self.client, method, &url, body).await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> AutomationResult<Value> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    /// End the browser session.
    pub async fn close(&self) -> AutomationResult<()> {
        let url = format!("{}/session/{}", self.endpoint, self.session_id);
        send(&self.client, Method::DELETE, &url, None).await?;
        info!(session = %self.session_id, "WebDriver session closed");
        Ok(())
    }
}

/// Send one command and unwrap the `value` envelope.
async fn send(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> AutomationResult<Value> {
    debug!(%method, url, "WebDriver command");
    let mut request = client.request(method.clone(), url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .await
        .map_err(|e| AutomationError::driver(format!("{} {} failed: {}", method, url, e)))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| AutomationError::driver(format!("{} {} returned invalid JSON: {}", method, url, e)))?;
    if !status.is_success() {
        return Err(command_error(status, &body));
    }
    Ok(body.get("value").cloned().unwrap_or(Value::Null))
}

#[async_trait]
impl PageDriver for WebDriverPage {
    async fn goto(&self, url: &str) -> AutomationResult<()> {
        self.command(Method::POST, "url", Some(json!({ "url": url }))).await?;
        Ok(())
    }

    async fn find_all(&self, selector: &Selector) -> AutomationResult<Vec<ElementHandle>> {
        let value = self
            .command(
                Method::POST,
                "elements",
                Some(json!({ "using": selector.strategy(), "value": selector.value() })),
            )
            .await?;
        parse_elements(&value)
    }

    async fn find_within(
        &self,
        parent: &ElementHandle,
        selector: &Selector,
    ) -> AutomationResult<Vec<ElementHandle>> {
        let value = self
            .command(
                Method::POST,
                &format!("element/{}/elements", parent.0),
                Some(json!({ "using": selector.strategy(), "value": selector.value() })),
            )
            .await?;
        parse_elements(&value)
    }

    async fn click(&self, element: &ElementHandle) -> AutomationResult<()> {
        self.command(Method::POST, &format!("element/{}/click", element.0), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> AutomationResult<()> {
        self.command(
            Method::POST,
            &format!("element/{}/value", element.0),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn press_enter(&self, element: &ElementHandle) -> AutomationResult<()> {
        self.type_text(element, ENTER_KEY).await
    }

    async fn text(&self, element: &ElementHandle) -> AutomationResult<String> {
        let value = self
            .command(Method::GET, &format!("element/{}/text", element.0), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> AutomationResult<Option<String>> {
        let value = self
            .command(
                Method::GET,
                &format!("element/{}/attribute/{}", element.0, name),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn scroll_by(&self, dy: i64) -> AutomationResult<()> {
        self.execute("window.scrollBy(0, arguments[0]);", vec![json!(dy)])
            .await?;
        Ok(())
    }

    async fn scroll_to_top(&self) -> AutomationResult<()> {
        self.execute("window.scrollTo(0, 0);", vec![]).await?;
        Ok(())
    }

    async fn scroll_position(&self) -> AutomationResult<i64> {
        let value = self
            .execute("return Math.round(window.scrollY);", vec![])
            .await?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f.round() as i64))
            .ok_or_else(|| AutomationError::driver("scroll position is not a number"))
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> AutomationResult<()> {
        self.execute(
            "arguments[0].scrollIntoView({block: 'center'});",
            vec![element_ref(element)],
        )
        .await?;
        Ok(())
    }

    async fn screenshot(&self) -> AutomationResult<Vec<u8>> {
        let value = self.command(Method::GET, "screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| AutomationError::driver("screenshot is not a string"))?;
        BASE64
            .decode(encoded)
            .map_err(|e| AutomationError::driver(format!("screenshot is not base64: {}", e)))
    }
}
