//! Chromium Backend (feature `browser`)
//!
//! Real-browser implementation of [`PageDriver`], [`BrowserSession`] and
//! [`SessionLauncher`] over the Chrome `DevTools` Protocol.
//!
//! ```text
//! CdpLauncher::launch ──► chromium process ──► CdpSession
//!                                                 │ new_page / pages
//!                                                 ▼
//!                         CdpPage ── Runtime.evaluate(ENGINE + call) ──► DOM
//!                            │
//!                            └── Input.dispatch{Mouse,Key}Event for clicks and keys
//! ```
//!
//! Locators are serialized to JSON and resolved by a small engine injected
//! into the page on first use (`window.__storeprobe`). Every call re-queries
//! the DOM, so nothing holds on to a stale element.
//!
//! Each launch starts its own Chromium process; a session never shares
//! cookies or storage with another attempt.

use crate::config::ProbeConfig;
use crate::driver::{BrowserSession, ElementInfo, PageDriver, SessionLauncher};
use crate::locator::Locator;
use crate::result::{ProbeError, ProbeResult};
use crate::wait::LoadState;
use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams, DispatchMouseEventType,
    MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// In-page locator engine; installs itself once per document
const ENGINE: &str = r#"
if (!window.__storeprobe) {
  window.__storeprobe = (() => {
    const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
    const textOf = (el) => norm(el.innerText !== undefined ? el.innerText : el.textContent);
    const compile = (src, flags) => {
      let f = flags || '';
      let s = src;
      if (s.startsWith('(?i)')) { s = s.slice(4); if (!f.includes('i')) f += 'i'; }
      try { return new RegExp(s.replace(/\\x\{([0-9a-fA-F]+)\}/g, '\\u{$1}'), f + 'u'); } catch (e) {}
      try { return new RegExp(s.replace(/\\x\{([0-9a-fA-F]{4})\}/g, '\\u$1'), f); } catch (e) { return null; }
    };
    const matches = (m, value) => {
      if (!m) return true;
      const v = norm(value);
      if (m.kind === 'exact') return v === norm(m.value);
      if (m.kind === 'contains') return v.toLowerCase().includes(norm(m.value).toLowerCase());
      const re = compile(m.value, m.flags);
      return re ? re.test(v) : false;
    };
    const visible = (el) => {
      const r = el.getBoundingClientRect();
      if (r.width === 0 && r.height === 0) return false;
      const s = getComputedStyle(el);
      return s.visibility !== 'hidden' && s.display !== 'none';
    };
    const enabled = (el) => !el.disabled && el.getAttribute('aria-disabled') !== 'true';
    const TEXTLIKE = ['', 'text', 'email', 'tel', 'search', 'url', 'password', 'number'];
    const role = (el) => {
      const explicit = (el.getAttribute('role') || '').trim().toLowerCase();
      if (explicit === 'searchbox') return 'textbox';
      if (explicit === 'listbox') return 'combobox';
      if (explicit) return explicit;
      const tag = el.tagName.toLowerCase();
      const type = (el.getAttribute('type') || '').toLowerCase();
      if (tag === 'a' && el.hasAttribute('href')) return 'link';
      if (tag === 'button') return 'button';
      if (tag === 'input') {
        if (['button', 'submit', 'reset', 'image'].includes(type)) return 'button';
        if (type === 'checkbox') return 'checkbox';
        if (type === 'radio') return 'radio';
        if (TEXTLIKE.includes(type)) return 'textbox';
        return null;
      }
      if (tag === 'textarea') return 'textbox';
      if (tag === 'select') return 'combobox';
      if (tag === 'option') return 'option';
      if (/^h[1-6]$/.test(tag)) return 'heading';
      if (tag === 'form' || tag === 'dialog' || tag === 'img') return tag;
      return null;
    };
    const labelText = (el) => {
      const aria = el.getAttribute('aria-label');
      if (aria) return aria;
      const by = el.getAttribute('aria-labelledby');
      if (by) return by.split(/\s+/).map((id) => { const l = document.getElementById(id); return l ? textOf(l) : ''; }).join(' ');
      if (el.id) { const l = document.querySelector('label[for="' + CSS.escape(el.id) + '"]'); if (l) return textOf(l); }
      const wrap = el.closest('label');
      return wrap ? textOf(wrap) : null;
    };
    const name = (el) => {
      const label = labelText(el);
      if (label) return label;
      const tag = el.tagName.toLowerCase();
      if (tag === 'input' || tag === 'textarea') return el.getAttribute('title') || el.getAttribute('placeholder') || el.value || '';
      if (tag === 'img') return el.getAttribute('alt') || '';
      return textOf(el) || el.getAttribute('title') || '';
    };
    const all = (root) => Array.from(root.querySelectorAll('*'));
    const base = (q, root) => {
      switch (q.kind) {
        case 'css':
          try { return Array.from(root.querySelectorAll(q.selector)); } catch (e) { return []; }
        case 'role':
          return all(root).filter((el) => role(el) === q.role
            && (q.level == null || el.tagName.toLowerCase() === 'h' + q.level || el.getAttribute('aria-level') === String(q.level))
            && matches(q.name, name(el)));
        case 'text': {
          const hits = all(root).filter((el) => !['SCRIPT', 'STYLE', 'HEAD', 'TITLE', 'HTML', 'BODY'].includes(el.tagName) && matches(q.text, textOf(el)));
          return hits.filter((el) => !hits.some((o) => o !== el && el.contains(o)));
        }
        case 'label':
          return all(root).filter((el) => ['INPUT', 'TEXTAREA', 'SELECT'].includes(el.tagName) && matches(q.text, labelText(el) || ''));
        case 'placeholder':
          return all(root).filter((el) => el.hasAttribute('placeholder') && matches(q.text, el.getAttribute('placeholder')));
      }
      return [];
    };
    const find = (loc) => {
      const roots = loc.within ? find(loc.within) : [document];
      let out = [];
      for (const root of roots) for (const el of base(loc.query, root)) if (!out.includes(el)) out.push(el);
      out.sort((a, b) => (a.compareDocumentPosition(b) & Node.DOCUMENT_POSITION_FOLLOWING ? -1 : 1));
      if (loc.hasText) out = out.filter((el) => matches(loc.hasText, textOf(el)));
      if (loc.hasNotText) out = out.filter((el) => !matches(loc.hasNotText, textOf(el)));
      if (loc.has) { const inner = find(loc.has); out = out.filter((el) => inner.some((d) => d !== el && el.contains(d))); }
      return out;
    };
    const info = (el) => ({ text: textOf(el), visible: visible(el), enabled: enabled(el) });
    const nth = (loc, n) => find(loc)[n] || null;
    const lastNetwork = () => {
      const ends = performance.getEntriesByType('resource').map((e) => e.responseEnd);
      return ends.length ? Math.max(...ends) : 0;
    };
    return {
      query: (loc) => find(loc).map(info),
      target: (loc, n) => {
        const el = nth(loc, n);
        if (!el) return null;
        el.scrollIntoView({ block: 'center', inline: 'center' });
        const r = el.getBoundingClientRect();
        return { x: r.left + r.width / 2, y: r.top + r.height / 2, visible: visible(el), enabled: enabled(el) };
      },
      focus: (loc, n) => { const el = nth(loc, n); if (!el) return false; el.focus(); return true; },
      fill: (loc, n, value) => {
        const el = nth(loc, n);
        if (!el) return false;
        el.focus();
        const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
        const setter = Object.getOwnPropertyDescriptor(proto, 'value');
        if (setter && setter.set) setter.set.call(el, value); else el.value = value;
        el.dispatchEvent(new Event('input', { bubbles: true }));
        el.dispatchEvent(new Event('change', { bubbles: true }));
        return true;
      },
      select: (loc, n, option) => {
        const el = nth(loc, n);
        if (!el || !el.options) return false;
        const hit = Array.from(el.options).find((o) => o.value === option || norm(o.textContent) === option);
        if (!hit) return false;
        el.value = hit.value;
        el.dispatchEvent(new Event('input', { bubbles: true }));
        el.dispatchEvent(new Event('change', { bubbles: true }));
        return true;
      },
      attr: (loc, n, attr) => { const el = nth(loc, n); return el ? el.getAttribute(attr) : null; },
      ldjson: () => Array.from(document.querySelectorAll('script[type="application/ld+json"]')).map((s) => s.textContent || ''),
      bodyTexts: (limit) => {
        const out = [];
        if (!document.body) return out;
        for (const el of all(document.body)) {
          if (out.length >= limit) break;
          if (['SCRIPT', 'STYLE', 'NOSCRIPT'].includes(el.tagName)) continue;
          const own = norm(Array.from(el.childNodes).filter((c) => c.nodeType === Node.TEXT_NODE).map((c) => c.textContent).join(' '));
          if (own) out.push(own);
        }
        return out;
      },
      loadState: (state) => {
        const ready = document.readyState;
        const s = String(state).toLowerCase();
        if (s === 'domcontentloaded') return ready !== 'loading';
        if (s === 'load') return ready === 'complete';
        return ready === 'complete' && performance.now() - lastNetwork() >= 500;
      },
    };
  })();
}
"#;

/// Default window size
pub const DEFAULT_VIEWPORT: (u32, u32) = (1280, 800);

fn page_err(e: impl std::fmt::Display) -> ProbeError {
    ProbeError::page(e.to_string())
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Script calling `window.__storeprobe.{method}(args...)` after installing the engine
fn engine_call(method: &str, args: &[String]) -> String {
    format!("{ENGINE}\n;window.__storeprobe.{method}({})", args.join(", "))
}

/// CDP key fields for a key name: `(key, code, text, virtual key code)`
fn key_definition(key: &str) -> (String, String, Option<String>, Option<i64>) {
    match key {
        "Enter" => ("Enter".into(), "Enter".into(), Some("\r".into()), Some(13)),
        "Tab" => ("Tab".into(), "Tab".into(), None, Some(9)),
        "Escape" => ("Escape".into(), "Escape".into(), None, Some(27)),
        "Backspace" => ("Backspace".into(), "Backspace".into(), None, Some(8)),
        other => (other.to_string(), other.to_string(), None, None),
    }
}

#[derive(Debug, Deserialize)]
struct Target {
    x: f64,
    y: f64,
    visible: bool,
    enabled: bool,
}

// =============================================================================
// PAGE
// =============================================================================

/// One Chromium tab
#[derive(Debug)]
pub struct CdpPage {
    id: String,
    page: Page,
    closed: AtomicBool,
}

impl CdpPage {
    fn new(page: Page) -> Self {
        Self {
            id: page.target_id().inner().clone(),
            page,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> ProbeResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ProbeError::page(format!("tab {} is closed", self.id)))
        } else {
            Ok(())
        }
    }

    async fn eval<T: DeserializeOwned>(&self, method: &str, args: &[String]) -> ProbeResult<T> {
        self.ensure_open()?;
        let params = EvaluateParams::builder()
            .expression(engine_call(method, args))
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(page_err)?;
        let result = self.page.evaluate_expression(params).await.map_err(page_err)?;
        result.into_value().map_err(page_err)
    }

    fn locator_arg(locator: &Locator) -> ProbeResult<String> {
        Ok(serde_json::to_string(locator)?)
    }

    async fn target(&self, locator: &Locator, nth: usize) -> ProbeResult<Target> {
        let target: Option<Target> = self
            .eval("target", &[Self::locator_arg(locator)?, nth.to_string()])
            .await?;
        let target = target.ok_or_else(|| ProbeError::not_found(format!("{locator} (match {nth})")))?;
        if !target.visible {
            return Err(ProbeError::page(format!("{locator} is not visible")));
        }
        if !target.enabled {
            return Err(ProbeError::page(format!("{locator} is disabled")));
        }
        Ok(target)
    }

    async fn mouse(&self, kind: DispatchMouseEventType, x: f64, y: f64) -> ProbeResult<()> {
        let mut builder = DispatchMouseEventParams::builder().r#type(kind.clone()).x(x).y(y);
        if kind != DispatchMouseEventType::MouseMoved {
            builder = builder.button(MouseButton::Left).click_count(1);
        }
        let params = builder.build().map_err(page_err)?;
        self.page.execute(params).await.map_err(page_err)?;
        Ok(())
    }

    async fn key(&self, kind: DispatchKeyEventType, key: &str) -> ProbeResult<()> {
        let (key, code, text, vk) = key_definition(key);
        let mut builder = DispatchKeyEventParams::builder().r#type(kind.clone()).key(key).code(code);
        if let Some(vk) = vk {
            builder = builder.windows_virtual_key_code(vk).native_virtual_key_code(vk);
        }
        if kind == DispatchKeyEventType::KeyDown {
            if let Some(text) = text {
                builder = builder.text(text);
            }
        }
        let params = builder.build().map_err(page_err)?;
        self.page.execute(params).await.map_err(page_err)?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn goto(&self, url: &str, timeout: Duration) -> ProbeResult<()> {
        self.ensure_open()?;
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(ProbeError::Timeout { ms: millis(timeout) }),
        }
    }

    async fn current_url(&self) -> ProbeResult<String> {
        self.ensure_open()?;
        Ok(self.page.url().await.map_err(page_err)?.unwrap_or_default())
    }

    async fn title(&self) -> ProbeResult<String> {
        self.ensure_open()?;
        Ok(self.page.get_title().await.map_err(page_err)?.unwrap_or_default())
    }

    async fn is_closed(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return true;
        }
        if self.page.url().await.is_err() {
            self.closed.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }

    async fn load_state_reached(&self, state: LoadState) -> ProbeResult<bool> {
        let name = serde_json::to_string(state.event_name())?;
        self.eval("loadState", &[name]).await
    }

    async fn query(&self, locator: &Locator) -> ProbeResult<Vec<ElementInfo>> {
        self.eval("query", &[Self::locator_arg(locator)?]).await
    }

    async fn click(&self, locator: &Locator, nth: usize) -> ProbeResult<()> {
        let Target { x, y, .. } = self.target(locator, nth).await?;
        tracing::trace!(%locator, nth, x, y, "click");
        self.mouse(DispatchMouseEventType::MouseMoved, x, y).await?;
        self.mouse(DispatchMouseEventType::MousePressed, x, y).await?;
        self.mouse(DispatchMouseEventType::MouseReleased, x, y).await
    }

    async fn fill(&self, locator: &Locator, nth: usize, value: &str) -> ProbeResult<()> {
        self.target(locator, nth).await?;
        let filled: bool = self
            .eval(
                "fill",
                &[Self::locator_arg(locator)?, nth.to_string(), serde_json::to_string(value)?],
            )
            .await?;
        if filled {
            Ok(())
        } else {
            Err(ProbeError::not_found(format!("{locator} (match {nth})")))
        }
    }

    async fn press(&self, locator: &Locator, nth: usize, key: &str) -> ProbeResult<()> {
        let focused: bool = self
            .eval("focus", &[Self::locator_arg(locator)?, nth.to_string()])
            .await?;
        if !focused {
            return Err(ProbeError::not_found(format!("{locator} (match {nth})")));
        }
        self.key(DispatchKeyEventType::KeyDown, key).await?;
        self.key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn select_option(&self, locator: &Locator, nth: usize, option: &str) -> ProbeResult<bool> {
        self.target(locator, nth).await?;
        self.eval(
            "select",
            &[Self::locator_arg(locator)?, nth.to_string(), serde_json::to_string(option)?],
        )
        .await
    }

    async fn attribute(&self, locator: &Locator, nth: usize, name: &str) -> ProbeResult<Option<String>> {
        self.eval(
            "attr",
            &[Self::locator_arg(locator)?, nth.to_string(), serde_json::to_string(name)?],
        )
        .await
    }

    async fn structured_data(&self) -> ProbeResult<Vec<String>> {
        self.eval("ldjson", &[]).await
    }

    async fn body_texts(&self, limit: usize) -> ProbeResult<Vec<String>> {
        self.eval("bodyTexts", &[limit.to_string()]).await
    }

    async fn screenshot(&self) -> ProbeResult<Vec<u8>> {
        self.ensure_open()?;
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let shot = self.page.execute(params).await.map_err(page_err)?;
        base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(page_err)
    }

    async fn close(&self) -> ProbeResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.page.clone().close().await.map_err(page_err)
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// One Chromium process and its tabs
#[derive(Debug)]
pub struct CdpSession {
    browser: Mutex<Browser>,
    handler: tokio::task::JoinHandle<()>,
    pages: Mutex<Vec<Arc<CdpPage>>>,
}

impl CdpSession {
    async fn adopt(&self, page: Page) -> Arc<CdpPage> {
        let id = page.target_id().inner().clone();
        let mut pages = self.pages.lock().await;
        if let Some(known) = pages.iter().find(|p| p.id == id) {
            return Arc::clone(known);
        }
        let wrapped = Arc::new(CdpPage::new(page));
        pages.push(Arc::clone(&wrapped));
        wrapped
    }
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn new_page(&self) -> ProbeResult<Arc<dyn PageDriver>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(page_err)?;
        let page: Arc<dyn PageDriver> = self.adopt(page).await;
        Ok(page)
    }

    async fn pages(&self) -> ProbeResult<Vec<Arc<dyn PageDriver>>> {
        let live = self.browser.lock().await.pages().await.map_err(page_err)?;
        for page in live {
            self.adopt(page).await;
        }
        let pages = self.pages.lock().await;
        Ok(pages
            .iter()
            .filter(|p| !p.closed.load(Ordering::SeqCst))
            .map(|p| Arc::clone(p) as Arc<dyn PageDriver>)
            .collect())
    }

    async fn close(&self) -> ProbeResult<()> {
        for page in self.pages.lock().await.iter() {
            page.closed.store(true, Ordering::SeqCst);
        }
        let closed = self.browser.lock().await.close().await;
        self.handler.abort();
        closed.map(|_| ()).map_err(|e| ProbeError::BrowserLaunch {
            message: format!("closing browser: {e}"),
        })
    }
}

// =============================================================================
// LAUNCHER
// =============================================================================

/// Starts a fresh Chromium per session
#[derive(Debug, Clone)]
pub struct CdpLauncher {
    chromium_path: Option<PathBuf>,
    sandbox: bool,
    viewport: (u32, u32),
}

impl Default for CdpLauncher {
    fn default() -> Self {
        Self {
            chromium_path: None,
            sandbox: true,
            viewport: DEFAULT_VIEWPORT,
        }
    }
}

impl CdpLauncher {
    /// Launcher auto-detecting Chromium
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific Chromium binary
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable the sandbox (containers, CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Window size
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width, height);
        self
    }

    fn browser_config(&self, config: &ProbeConfig) -> ProbeResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.viewport.0, self.viewport.1)
            .request_timeout(config.timeouts.navigation());
        if !config.headless {
            builder = builder.with_head();
        }
        if !self.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &self.chromium_path {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|message| ProbeError::BrowserLaunch { message })
    }
}

#[async_trait]
impl SessionLauncher for CdpLauncher {
    async fn launch(&self, config: &ProbeConfig) -> ProbeResult<Arc<dyn BrowserSession>> {
        let (browser, mut handler) = Browser::launch(self.browser_config(config)?)
            .await
            .map_err(|e| ProbeError::BrowserLaunch {
                message: e.to_string(),
            })?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        tracing::debug!(headless = config.headless, "chromium launched");
        Ok(Arc::new(CdpSession {
            browser: Mutex::new(browser),
            handler,
            pages: Mutex::new(Vec::new()),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::locator::{AriaRole, TextMatch};

    #[test]
    fn test_engine_call_embeds_json_args() {
        let loc = Locator::role_named(AriaRole::Button, TextMatch::pattern("place order"));
        let script = engine_call("query", &[CdpPage::locator_arg(&loc).unwrap()]);
        assert!(script.starts_with(ENGINE));
        assert!(script.ends_with(
            r#"window.__storeprobe.query({"query":{"kind":"role","role":"button","name":{"kind":"pattern","value":"place order","flags":"i"}}})"#
        ));
    }

    #[test]
    fn test_key_definitions() {
        let (key, code, text, vk) = key_definition("Enter");
        assert_eq!((key.as_str(), code.as_str()), ("Enter", "Enter"));
        assert_eq!(text.as_deref(), Some("\r"));
        assert_eq!(vk, Some(13));
        assert_eq!(key_definition("a").3, None);
    }

    #[test]
    fn test_launcher_builders() {
        let launcher = CdpLauncher::new()
            .with_no_sandbox()
            .with_viewport(1920, 1080)
            .with_chromium_path("/usr/bin/chromium");
        assert!(!launcher.sandbox);
        assert_eq!(launcher.viewport, (1920, 1080));
        assert_eq!(launcher.chromium_path.as_deref(), Some(std::path::Path::new("/usr/bin/chromium")));
    }

    #[tokio::test]
    #[ignore = "requires a local Chromium"]
    async fn test_launch_and_query_blank_page() {
        let launcher = CdpLauncher::new().with_no_sandbox();
        let session = launcher.launch(&ProbeConfig::default()).await.unwrap();
        let page = session.new_page().await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "about:blank");
        assert!(page.query(&Locator::css("button")).await.unwrap().is_empty());
        session.close().await.unwrap();
    }
}
