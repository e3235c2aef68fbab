//! Test utilities for seance-sync
//!
//! In-memory stand-ins for the browser and the ledger so the crawl and the
//! reconciliation run against static HTML and a recorded sheet.
//!
//! `FakeBrowser` serves registered pages by URL. An element with
//! `data-navigate` (or an `<a href>`) navigates when clicked; an
//! `<iframe data-src>` is entered with `switch_to_frame`.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::domain::LedgerTable;
use crate::infrastructure::browser::{
    BrowserError, BrowserLauncher, BrowserResult, BrowserSession, PageElement,
};
use crate::infrastructure::ledger_client::{LedgerClient, LedgerError, LedgerResult, LedgerTab};

const BLANK_PAGE: &str = "about:blank";

#[derive(Default)]
struct FakeState {
    pages: RefCell<HashMap<String, Rc<Html>>>,
    current_url: RefCell<Option<String>>,
    top: RefCell<Option<Rc<Html>>>,
    frame: RefCell<Option<Rc<Html>>>,
    failing_selectors: RefCell<HashSet<String>>,
    typed: RefCell<HashMap<String, String>>,
    navigations: RefCell<Vec<String>>,
    screenshots: RefCell<Vec<PathBuf>>,
    quit_count: Cell<usize>,
}

impl FakeState {
    fn load(&self, url: &str) -> BrowserResult<()> {
        let page = self
            .pages
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| BrowserError::protocol("navigate", "unknown error", &format!("net::ERR_NAME_NOT_RESOLVED {url}")))?;

        self.navigations.borrow_mut().push(url.to_string());
        *self.current_url.borrow_mut() = Some(url.to_string());
        *self.top.borrow_mut() = Some(page);
        *self.frame.borrow_mut() = None;
        Ok(())
    }

    fn selector(&self, selector: &str) -> BrowserResult<Selector> {
        if self.failing_selectors.borrow().contains(selector) {
            return Err(BrowserError::StaleElement {
                reason: format!("lookup of '{selector}' forced to fail"),
            });
        }
        Selector::parse(selector)
            .map_err(|e| BrowserError::protocol("find elements", "invalid selector", &e.to_string()))
    }

    fn context(&self) -> Option<Rc<Html>> {
        self.frame.borrow().clone().or_else(|| self.top.borrow().clone())
    }
}

/// Scripted browser session over static HTML pages
#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Rc<FakeState>,
}

impl FakeBrowser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Browser with one registered page; nothing is loaded until `navigate`
    #[must_use]
    pub fn with_page(url: &str, html: &str) -> Self {
        let browser = Self::new();
        browser.add_page(url, html);
        browser
    }

    pub fn add_page(&self, url: &str, html: &str) {
        self.state
            .pages
            .borrow_mut()
            .insert(url.to_string(), Rc::new(Html::parse_document(html)));
    }

    /// Make every lookup with exactly this selector fail as stale
    pub fn fail_queries_matching(&self, selector: &str) {
        self.state.failing_selectors.borrow_mut().insert(selector.to_string());
    }

    /// Text typed into the element with this `id` (or `name`)
    #[must_use]
    pub fn typed_into(&self, key: &str) -> Option<String> {
        self.state.typed.borrow().get(key).cloned()
    }

    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        self.state.navigations.borrow().clone()
    }

    #[must_use]
    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state.screenshots.borrow().clone()
    }

    #[must_use]
    pub fn quit_count(&self) -> usize {
        self.state.quit_count.get()
    }

    #[must_use]
    pub fn in_frame(&self) -> bool {
        self.state.frame.borrow().is_some()
    }

    fn wrap(&self, html: &Rc<Html>, element: ElementRef<'_>) -> FakeElement {
        FakeElement::new(html, &self.state, element)
    }
}

#[async_trait(?Send)]
impl BrowserSession for FakeBrowser {
    type Element = FakeElement;

    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        self.state.load(url)
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self
            .state
            .current_url
            .borrow()
            .clone()
            .unwrap_or_else(|| BLANK_PAGE.to_string()))
    }

    async fn query_all(&self, selector: &str) -> BrowserResult<Vec<FakeElement>> {
        let selector = self.state.selector(selector)?;
        let Some(html) = self.state.context() else {
            return Ok(Vec::new());
        };
        Ok(html.select(&selector).map(|el| self.wrap(&html, el)).collect())
    }

    async fn query(&self, selector: &str) -> BrowserResult<Option<FakeElement>> {
        Ok(self.query_all(selector).await?.into_iter().next())
    }

    async fn switch_to_frame(&self, id: &str) -> BrowserResult<()> {
        let no_frame = || BrowserError::NoSuchFrame { id: id.to_string() };
        let top = self.state.top.borrow().clone().ok_or_else(no_frame)?;
        let selector = self.state.selector(&format!("iframe[id='{id}'], iframe[name='{id}']"))?;

        let source = top
            .select(&selector)
            .next()
            .and_then(|frame| frame.value().attr("data-src").map(str::to_string))
            .ok_or_else(no_frame)?;
        let page = self.state.pages.borrow().get(&source).cloned().ok_or_else(no_frame)?;

        *self.state.frame.borrow_mut() = Some(page);
        Ok(())
    }

    async fn switch_to_default_content(&self) -> BrowserResult<()> {
        *self.state.frame.borrow_mut() = None;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> BrowserResult<()> {
        self.state.screenshots.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    async fn quit(&self) -> BrowserResult<()> {
        self.state.quit_count.set(self.state.quit_count.get() + 1);
        Ok(())
    }
}

/// Element of a `FakeBrowser` page, addressed by document-order position
#[derive(Clone)]
pub struct FakeElement {
    html: Rc<Html>,
    position: usize,
    state: Rc<FakeState>,
}

impl FakeElement {
    fn new(html: &Rc<Html>, state: &Rc<FakeState>, element: ElementRef<'_>) -> Self {
        let position = html
            .tree
            .root()
            .descendants()
            .position(|node| node.id() == element.id())
            .unwrap_or(usize::MAX);
        Self {
            html: Rc::clone(html),
            position,
            state: Rc::clone(state),
        }
    }

    fn element(&self) -> BrowserResult<ElementRef<'_>> {
        self.html
            .tree
            .root()
            .descendants()
            .nth(self.position)
            .and_then(ElementRef::wrap)
            .ok_or_else(|| BrowserError::StaleElement {
                reason: "node no longer in document".to_string(),
            })
    }

    fn descendants(&self, selector: &str) -> BrowserResult<Vec<Self>> {
        let selector = self.state.selector(selector)?;
        let element = self.element()?;
        Ok(element
            .select(&selector)
            .filter(|found| found.id() != element.id())
            .map(|found| Self::new(&self.html, &self.state, found))
            .collect())
    }
}

#[async_trait(?Send)]
impl PageElement for FakeElement {
    async fn text(&self) -> BrowserResult<String> {
        Ok(self.element()?.text().collect())
    }

    async fn attribute(&self, name: &str) -> BrowserResult<Option<String>> {
        Ok(self.element()?.value().attr(name).map(str::to_string))
    }

    async fn find(&self, selector: &str) -> BrowserResult<Option<Self>> {
        Ok(self.descendants(selector)?.into_iter().next())
    }

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Self>> {
        self.descendants(selector)
    }

    async fn click(&self) -> BrowserResult<()> {
        let element = self.element()?;
        let target = element.value().attr("data-navigate").or_else(|| {
            (element.value().name() == "a")
                .then(|| element.value().attr("href"))
                .flatten()
        });

        match target.map(str::to_string) {
            Some(url) => self.state.load(&url),
            None => Ok(()),
        }
    }

    async fn send_keys(&self, text: &str) -> BrowserResult<()> {
        let element = self.element()?;
        let key = element
            .value()
            .id()
            .or_else(|| element.value().attr("name"))
            .unwrap_or("unnamed")
            .to_string();
        self.state.typed.borrow_mut().entry(key).or_default().push_str(text);
        Ok(())
    }
}

/// Hands out pre-built browsers in order, one per launch
#[derive(Clone, Default)]
pub struct FakeLauncher {
    sessions: Rc<RefCell<VecDeque<FakeBrowser>>>,
    launches: Rc<Cell<usize>>,
}

impl FakeLauncher {
    #[must_use]
    pub fn new(sessions: Vec<FakeBrowser>) -> Self {
        Self {
            sessions: Rc::new(RefCell::new(sessions.into())),
            launches: Rc::new(Cell::new(0)),
        }
    }

    #[must_use]
    pub fn launches(&self) -> usize {
        self.launches.get()
    }
}

#[async_trait(?Send)]
impl BrowserLauncher for FakeLauncher {
    type Session = FakeBrowser;

    async fn launch(&self) -> BrowserResult<FakeBrowser> {
        self.launches.set(self.launches.get() + 1);
        self.sessions
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| BrowserError::Transport {
                message: "no browser available".to_string(),
            })
    }
}

#[derive(Default)]
struct LedgerState {
    tables: RefCell<HashMap<String, LedgerTable>>,
    writes: RefCell<Vec<(usize, usize, String)>>,
    fail_writes: Cell<bool>,
}

/// In-memory ledger that records every cell write
#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Rc<LedgerState>,
}

impl MemoryLedger {
    /// Ledger with a single tab built from header names and data rows
    #[must_use]
    pub fn with_tab(tab: &str, headers: &[&str], rows: &[&[&str]]) -> Self {
        let table = LedgerTable {
            headers: headers.iter().map(|h| (*h).to_string()).collect(),
            rows: rows
                .iter()
                .map(|cells| {
                    headers
                        .iter()
                        .zip(cells.iter())
                        .map(|(h, c)| ((*h).to_string(), (*c).to_string()))
                        .collect()
                })
                .collect(),
        };

        let ledger = Self::default();
        ledger.state.tables.borrow_mut().insert(tab.to_string(), table);
        ledger
    }

    /// `(row, column, value)` of every write, in order
    #[must_use]
    pub fn writes(&self) -> Vec<(usize, usize, String)> {
        self.state.writes.borrow().clone()
    }

    #[must_use]
    pub fn row_count(&self, tab: &str) -> usize {
        self.state.tables.borrow().get(tab).map_or(0, |t| t.rows.len())
    }

    pub fn fail_writes(&self) {
        self.state.fail_writes.set(true);
    }
}

pub struct MemoryTab {
    name: String,
    state: Rc<LedgerState>,
}

#[async_trait(?Send)]
impl LedgerClient for MemoryLedger {
    type Tab = MemoryTab;

    async fn open_tab(&self, spreadsheet: &str, tab: &str) -> LedgerResult<MemoryTab> {
        if !self.state.tables.borrow().contains_key(tab) {
            return Err(LedgerError::TabNotFound {
                spreadsheet: spreadsheet.to_string(),
                tab: tab.to_string(),
            });
        }
        Ok(MemoryTab {
            name: tab.to_string(),
            state: Rc::clone(&self.state),
        })
    }
}

#[async_trait(?Send)]
impl LedgerTab for MemoryTab {
    async fn read_all_rows(&self) -> LedgerResult<LedgerTable> {
        self.state
            .tables
            .borrow()
            .get(&self.name)
            .cloned()
            .ok_or_else(|| LedgerError::Malformed {
                message: format!("tab {} vanished", self.name),
            })
    }

    async fn write_cell(&self, row: usize, column: usize, value: &str) -> LedgerResult<()> {
        if row < 2 || column == 0 {
            return Err(LedgerError::InvalidAddress { row, column });
        }
        if self.state.fail_writes.get() {
            return Err(LedgerError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }

        let mut tables = self.state.tables.borrow_mut();
        let table = tables.get_mut(&self.name).ok_or_else(|| LedgerError::Malformed {
            message: format!("tab {} vanished", self.name),
        })?;
        let data_row = table
            .rows
            .get_mut(row - 2)
            .ok_or(LedgerError::InvalidAddress { row, column })?;
        let header = table
            .headers
            .get(column - 1)
            .cloned()
            .ok_or(LedgerError::InvalidAddress { row, column })?;
        data_row.insert(header, value.to_string());

        self.state.writes.borrow_mut().push((row, column, value.to_string()));
        Ok(())
    }
}
