//! Chromium driver over CDP.
//!
//! Elements are tracked in a registry installed into the page on first use.
//! Each document gets a random token, so references taken before a
//! navigation never resolve against the next document and surface as
//! [`DriverError::StaleElement`].
//!
//! An element is visible iff it is connected, has a non-empty client rect,
//! and its computed `display` is not `none`, `visibility` is neither
//! `hidden` nor `collapse`, and `opacity` is not `0`. Viewport position is
//! not considered.

use crate::action::{Action, Interaction};
use crate::driver::{BrowserDriver, DriverConfig, DriverError};
use crate::query::Selector;
use crate::state::ElementSnapshot;
use crate::value::ElementRef;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use tracing::{debug, warn};

const REGISTRY: &str = r"(window.__conducta ??= {
    token: Math.random().toString(36).slice(2),
    next: 0,
    byId: new Map(),
    ids: new WeakMap(),
})";

const SETTLE: &str = r"new Promise(resolve =>
    requestAnimationFrame(() => requestAnimationFrame(() => resolve(true))))";

fn classify(error: &CdpError) -> DriverError {
    match error {
        CdpError::Timeout | CdpError::NoResponse => DriverError::transient(error.to_string()),
        CdpError::JavascriptException(_) => DriverError::rejected(error.to_string()),
        _ => DriverError::fatal(error.to_string()),
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// [`BrowserDriver`] backed by a Chromium instance
#[derive(Debug)]
pub struct ChromiumDriver {
    config: DriverConfig,
    browser: CdpBrowser,
    page: CdpPage,
    handle: tokio::task::JoinHandle<()>,
}

impl ChromiumDriver {
    /// Launch a browser and open a blank page
    ///
    /// # Errors
    ///
    /// Returns error if the browser cannot be launched
    pub async fn launch(config: DriverConfig) -> Result<Self, DriverError> {
        let mut builder = CdpConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .request_timeout(config.navigation_timeout);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = config.executable_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder.build().map_err(DriverError::fatal)?;

        let (browser, mut handler) = CdpBrowser::launch(cdp_config)
            .await
            .map_err(|e| DriverError::fatal(e.to_string()))?;
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::fatal(e.to_string()))?;
        if let Some(ref user_agent) = config.user_agent {
            page.set_user_agent(user_agent.as_str())
                .await
                .map_err(|e| classify(&e))?;
        }
        debug!(target: "conducta::driver", headless = config.headless, "chromium launched");
        Ok(Self {
            config,
            browser,
            page,
            handle,
        })
    }

    /// Get the driver configuration
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T, DriverError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| classify(&e))?
            .into_value()
            .map_err(|e| DriverError::fatal(e.to_string()))
    }

    /// Run `body` with `el` bound to the referenced element; `false` from the script means stale
    async fn with_element(&self, element: &ElementRef, body: &str) -> Result<(), DriverError> {
        let script = format!(
            "(() => {{ const el = {REGISTRY}.byId.get({id}); \
             if (!el || !el.isConnected) return false; {body}; return true; }})()",
            id = js_string(element.as_str()),
        );
        if self.eval::<bool>(&script).await? {
            Ok(())
        } else {
            Err(DriverError::StaleElement {
                element: element.clone(),
            })
        }
    }

    async fn press(&self, key: &str) -> Result<(), DriverError> {
        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key);
        if key.chars().count() == 1 {
            down = down.text(key);
        }
        let down = down.build().map_err(DriverError::rejected)?;
        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key)
            .build()
            .map_err(DriverError::rejected)?;
        self.page.execute(down).await.map_err(|e| classify(&e))?;
        self.page.execute(up).await.map_err(|e| classify(&e))?;
        Ok(())
    }

    async fn settle(&self) -> Result<(), DriverError> {
        self.eval::<bool>(SETTLE).await.map(|_| ())
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.page.goto(url).await.map_err(|e| classify(&e))?;
        Ok(())
    }

    async fn find_elements(&mut self, selector: &Selector) -> Result<Vec<ElementRef>, DriverError> {
        let script = format!(
            "(() => {{ const r = {REGISTRY}; const out = []; \
             for (const el of document.querySelectorAll({selector})) {{ \
               let id = r.ids.get(el); \
               if (id === undefined) {{ id = r.token + ':' + (r.next++); r.ids.set(el, id); r.byId.set(id, el); }} \
               out.push(id); \
             }} return out; }})()",
            selector = js_string(selector.as_str()),
        );
        let ids: Vec<String> = self.eval(&script).await?;
        Ok(ids.into_iter().map(ElementRef::new).collect())
    }

    async fn read_element(
        &mut self,
        element: &ElementRef,
        styles: &BTreeSet<String>,
    ) -> Result<ElementSnapshot, DriverError> {
        let styles = serde_json::to_string(styles).map_err(|e| DriverError::fatal(e.to_string()))?;
        let script = format!(
            "(() => {{ const el = {REGISTRY}.byId.get({id}); \
             if (!el || !el.isConnected) return null; \
             const cs = getComputedStyle(el); \
             const rects = Array.from(el.getClientRects()); \
             const visible = rects.some(r => r.width > 0 || r.height > 0) \
               && cs.display !== 'none' \
               && cs.visibility !== 'hidden' && cs.visibility !== 'collapse' \
               && parseFloat(cs.opacity) !== 0; \
             const attributes = {{}}; \
             for (const a of el.attributes) attributes[a.name] = a.value; \
             if (typeof el.checked === 'boolean') {{ if (el.checked) attributes.checked = ''; else delete attributes.checked; }} \
             const field = ['input', 'textarea', 'select'].includes(el.localName); \
             const style = {{}}; \
             for (const s of {styles}) style[s] = cs.getPropertyValue(s); \
             return {{ tag: el.localName, text: field ? String(el.value) : (el.innerText ?? el.textContent ?? ''), \
                      attributes, style, visible, focused: document.activeElement === el }}; \
             }})()",
            id = js_string(element.as_str()),
        );
        self.eval::<Option<ElementSnapshot>>(&script)
            .await?
            .ok_or_else(|| DriverError::StaleElement {
                element: element.clone(),
            })
    }

    async fn perform(
        &mut self,
        action: &Action,
        target: Option<&ElementRef>,
    ) -> Result<(), DriverError> {
        let element =
            || target.ok_or_else(|| DriverError::rejected("element action without target"));
        match &action.interaction {
            Interaction::Reload => {
                self.page.reload().await.map_err(|e| classify(&e))?;
            }
            Interaction::Navigate { url } => {
                self.page.goto(url.as_str()).await.map_err(|e| classify(&e))?;
            }
            Interaction::Back => {
                self.eval::<bool>("(history.back(), true)").await?;
                self.page
                    .wait_for_navigation()
                    .await
                    .map_err(|e| classify(&e))?;
            }
            Interaction::Click => {
                self.with_element(element()?, "el.scrollIntoView({block: 'center'}); el.click()")
                    .await?;
            }
            Interaction::DoubleClick => {
                self.with_element(
                    element()?,
                    "el.scrollIntoView({block: 'center'}); el.click(); el.click(); \
                     el.dispatchEvent(new MouseEvent('dblclick', {bubbles: true, cancelable: true, detail: 2}))",
                )
                .await?;
            }
            Interaction::Focus => {
                self.with_element(element()?, "el.focus()").await?;
            }
            Interaction::KeyPress { key } => {
                self.press(key).await?;
            }
            Interaction::EnterText { text } => {
                self.with_element(element()?, "el.focus()").await?;
                self.page
                    .execute(InsertTextParams::new(text.as_str()))
                    .await
                    .map_err(|e| classify(&e))?;
            }
            Interaction::Clear => {
                self.with_element(
                    element()?,
                    "el.focus(); el.value = ''; \
                     el.dispatchEvent(new Event('input', {bubbles: true})); \
                     el.dispatchEvent(new Event('change', {bubbles: true}))",
                )
                .await?;
            }
        }
        self.settle().await
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if let Err(e) = self.browser.close().await {
            warn!(target: "conducta::driver", error = %e, "browser close failed");
        }
        self.handle.abort();
        Ok(())
    }
}
