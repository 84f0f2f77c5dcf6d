//! The browser-driver capability boundary.
//!
//! `BrowsingContext` is the only way the orchestration core touches a real
//! browser. Tab lifecycle, CDP attach, DOM snapshotting, and input
//! synthesis all live on the other side of this trait; this crate only
//! fixes the interface (per spec §6) and ships an in-memory reference
//! implementation (`mock`) used by tests and the CLI demo mode.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use browseragent_core_types::TabId;

use crate::errors::AgentError;

/// A stable hash of an interactive element's path from the DOM root.
///
/// Two elements across adjacent snapshots that resolve to the same
/// `BranchPathHash` are considered "the same place in the tree", even if
/// their numeric index changed. This is the sole signal the mid-batch
/// change-detection algorithm (see `agents::navigator`) uses to decide
/// whether a batch of chained element-indexed actions is still safe to
/// continue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchPathHash(pub String);

impl BranchPathHash {
    /// Derive a hash from an element's xpath-like root path. Two calls with
    /// the same path always produce the same hash.
    pub fn from_path(path: &str) -> Self {
        Self(blake3::hash(path.as_bytes()).to_hex().to_string())
    }
}

/// Set of [`BranchPathHash`]es present in a snapshot. Fingerprints the
/// reachable interactive elements at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchPathHashSet(pub HashSet<BranchPathHash>);

impl BranchPathHashSet {
    pub fn is_subset_of(&self, other: &BranchPathHashSet) -> bool {
        self.0.is_subset(&other.0)
    }
}

/// One interactive element in a [`PageSnapshot`], keyed by its numeric
/// index in that snapshot's `elements` map.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: String,
    pub xpath: String,
    pub attributes: HashMap<String, String>,
    pub visible: bool,
    pub interactive: bool,
    pub in_viewport: bool,
    pub text: String,
    pub hash: BranchPathHash,
}

impl ElementNode {
    pub fn new(tag: impl Into<String>, xpath: impl Into<String>) -> Self {
        let xpath = xpath.into();
        let hash = BranchPathHash::from_path(&xpath);
        Self {
            tag: tag.into(),
            xpath,
            attributes: HashMap::new(),
            visible: true,
            interactive: true,
            in_viewport: true,
            text: String::new(),
            hash,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Point-in-time view of the browser: title, URL, tab info, scroll
/// offsets, and the interactive-element map. Never stored across turns —
/// every navigator step takes a fresh one.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub title: String,
    pub url: String,
    pub tab_id: TabId,
    pub elements: HashMap<u32, ElementNode>,
    pub pixels_above: i32,
    pub pixels_below: i32,
    pub viewport_height: i32,
    pub total_height: i32,
    pub open_tabs: Vec<TabId>,
    pub screenshot_base64: Option<String>,
}

impl PageSnapshot {
    /// Number of interactive elements indexed in this snapshot.
    pub fn interactive_count(&self) -> usize {
        self.elements.len()
    }

    /// Fingerprint of every interactive element reachable in this
    /// snapshot, used by the navigator's mid-batch change detection.
    pub fn branch_path_hashes(&self) -> BranchPathHashSet {
        BranchPathHashSet(self.elements.values().map(|e| e.hash.clone()).collect())
    }
}

/// Capability surface for driving a browser tab. Implemented externally
/// by the CDP/driver layer; this crate only consumes it.
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    /// Take a fresh snapshot of the current page.
    async fn get_state(&self, use_vision: bool) -> Result<PageSnapshot, AgentError>;

    async fn navigate_to(&self, url: &str) -> Result<(), AgentError>;
    async fn go_back(&self) -> Result<(), AgentError>;
    async fn refresh_page(&self) -> Result<(), AgentError>;

    async fn click_element(&self, index: u32) -> Result<(), AgentError>;
    async fn input_text(&self, index: u32, text: &str) -> Result<(), AgentError>;
    async fn get_dropdown_options(&self, index: u32) -> Result<Vec<String>, AgentError>;
    async fn select_dropdown_option(&self, index: u32, text: &str) -> Result<(), AgentError>;

    async fn scroll_down(&self, amount: Option<i32>) -> Result<(), AgentError>;
    async fn scroll_up(&self, amount: Option<i32>) -> Result<(), AgentError>;
    async fn scroll_to_text(&self, text: &str) -> Result<(), AgentError>;
    async fn send_keys(&self, keys: &str) -> Result<(), AgentError>;

    async fn open_tab(&self, url: &str) -> Result<TabId, AgentError>;
    async fn close_tab(&self, tab_id: &TabId) -> Result<(), AgentError>;
    async fn switch_tab(&self, tab_id: &TabId) -> Result<(), AgentError>;
    async fn get_all_tab_ids(&self) -> Result<Vec<TabId>, AgentError>;
    async fn remove_highlight(&self) -> Result<(), AgentError>;

    async fn wait(&self, seconds: f64) -> Result<(), AgentError>;

    /// Mark a tab as belonging to the automation domain so subsequent
    /// switch/close calls are permitted to touch it. The driver must
    /// never let the automation layer touch a tab that was never adopted
    /// and wasn't opened by the automation itself.
    async fn adopt_tab(&self, tab_id: &TabId) -> Result<(), AgentError>;
}

pub mod mock {
    //! In-memory reference `BrowsingContext` used by tests and the CLI
    //! demo mode. Scriptable: a test can push a sequence of pages and
    //! trigger a mid-script mutation to exercise change detection.

    use std::sync::Mutex;

    use super::*;

    /// One scripted page the fake browser can be navigated to.
    #[derive(Debug, Clone)]
    pub struct ScriptedPage {
        pub url: String,
        pub title: String,
        pub elements: Vec<ElementNode>,
    }

    impl ScriptedPage {
        pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
            Self {
                url: url.into(),
                title: title.into(),
                elements: Vec::new(),
            }
        }

        pub fn with_element(mut self, el: ElementNode) -> Self {
            self.elements.push(el);
            self
        }
    }

    struct Inner {
        page: ScriptedPage,
        tabs: Vec<TabId>,
        current_tab: TabId,
        automation_owned: HashSet<TabId>,
        /// If set, the NEXT `click_element` call mutates the page to this
        /// one before returning, simulating "a modal opened" mid-batch.
        mutate_on_next_click: Option<ScriptedPage>,
        scroll_offset: i32,
    }

    /// Fake in-memory browser for tests and the CLI demo.
    pub struct FakeBrowsingContext {
        inner: Mutex<Inner>,
    }

    impl FakeBrowsingContext {
        pub fn new(initial: ScriptedPage) -> Self {
            let tab = TabId::new();
            let mut automation_owned = HashSet::new();
            automation_owned.insert(tab.clone());
            Self {
                inner: Mutex::new(Inner {
                    page: initial,
                    tabs: vec![tab.clone()],
                    current_tab: tab,
                    automation_owned,
                    mutate_on_next_click: None,
                    scroll_offset: 0,
                }),
            }
        }

        /// Arrange for the next `click_element` call to swap in a new page
        /// shape, simulating an unexpected DOM mutation (e.g. a modal).
        pub fn mutate_page_after_next_click(&self, page: ScriptedPage) {
            self.inner.lock().unwrap().mutate_on_next_click = Some(page);
        }

        pub fn set_page(&self, page: ScriptedPage) {
            self.inner.lock().unwrap().page = page;
        }

        fn snapshot_locked(inner: &Inner) -> PageSnapshot {
            let mut elements = HashMap::new();
            for (i, el) in inner.page.elements.iter().enumerate() {
                elements.insert(i as u32, el.clone());
            }
            PageSnapshot {
                title: inner.page.title.clone(),
                url: inner.page.url.clone(),
                tab_id: inner.current_tab.clone(),
                elements,
                pixels_above: inner.scroll_offset,
                pixels_below: (2000 - inner.scroll_offset).max(0),
                viewport_height: 800,
                total_height: 2000,
                open_tabs: inner.tabs.clone(),
                screenshot_base64: None,
            }
        }
    }

    #[async_trait]
    impl BrowsingContext for FakeBrowsingContext {
        async fn get_state(&self, _use_vision: bool) -> Result<PageSnapshot, AgentError> {
            let inner = self.inner.lock().unwrap();
            Ok(Self::snapshot_locked(&inner))
        }

        async fn navigate_to(&self, url: &str) -> Result<(), AgentError> {
            let mut inner = self.inner.lock().unwrap();
            inner.page = ScriptedPage::new(url.to_string(), url.to_string());
            inner.scroll_offset = 0;
            Ok(())
        }

        async fn go_back(&self) -> Result<(), AgentError> {
            Ok(())
        }

        async fn refresh_page(&self) -> Result<(), AgentError> {
            Ok(())
        }

        async fn click_element(&self, index: u32) -> Result<(), AgentError> {
            let mut inner = self.inner.lock().unwrap();
            if index as usize >= inner.page.elements.len() {
                return Err(AgentError::ElementStale {
                    index,
                    reason: "no such element in current snapshot".into(),
                });
            }
            if let Some(next) = inner.mutate_on_next_click.take() {
                inner.page = next;
            }
            Ok(())
        }

        async fn input_text(&self, index: u32, _text: &str) -> Result<(), AgentError> {
            let inner = self.inner.lock().unwrap();
            if index as usize >= inner.page.elements.len() {
                return Err(AgentError::ElementStale {
                    index,
                    reason: "no such element in current snapshot".into(),
                });
            }
            Ok(())
        }

        async fn get_dropdown_options(&self, index: u32) -> Result<Vec<String>, AgentError> {
            let inner = self.inner.lock().unwrap();
            let el = inner.page.elements.get(index as usize).ok_or_else(|| {
                AgentError::ElementStale {
                    index,
                    reason: "no such element in current snapshot".into(),
                }
            })?;
            if el.tag != "select" {
                return Err(AgentError::invalid_input(format!(
                    "element at index {index} is not a <select>"
                )));
            }
            Ok(vec!["option-a".into(), "option-b".into()])
        }

        async fn select_dropdown_option(
            &self,
            index: u32,
            _text: &str,
        ) -> Result<(), AgentError> {
            let inner = self.inner.lock().unwrap();
            let el = inner.page.elements.get(index as usize).ok_or_else(|| {
                AgentError::ElementStale {
                    index,
                    reason: "no such element in current snapshot".into(),
                }
            })?;
            if el.tag != "select" {
                return Err(AgentError::invalid_input(format!(
                    "element at index {index} is not a <select>"
                )));
            }
            Ok(())
        }

        async fn scroll_down(&self, amount: Option<i32>) -> Result<(), AgentError> {
            let mut inner = self.inner.lock().unwrap();
            inner.scroll_offset = (inner.scroll_offset + amount.unwrap_or(800)).min(2000);
            Ok(())
        }

        async fn scroll_up(&self, amount: Option<i32>) -> Result<(), AgentError> {
            let mut inner = self.inner.lock().unwrap();
            inner.scroll_offset = (inner.scroll_offset - amount.unwrap_or(800)).max(0);
            Ok(())
        }

        async fn scroll_to_text(&self, _text: &str) -> Result<(), AgentError> {
            Ok(())
        }

        async fn send_keys(&self, _keys: &str) -> Result<(), AgentError> {
            Ok(())
        }

        async fn open_tab(&self, url: &str) -> Result<TabId, AgentError> {
            let mut inner = self.inner.lock().unwrap();
            let tab = TabId::new();
            inner.tabs.push(tab.clone());
            inner.automation_owned.insert(tab.clone());
            inner.current_tab = tab.clone();
            inner.page = ScriptedPage::new(url.to_string(), url.to_string());
            Ok(tab)
        }

        async fn close_tab(&self, tab_id: &TabId) -> Result<(), AgentError> {
            let mut inner = self.inner.lock().unwrap();
            if !inner.automation_owned.contains(tab_id) {
                return Err(AgentError::other(
                    "refusing to close a tab not owned by the automation domain",
                ));
            }
            inner.tabs.retain(|t| t != tab_id);
            Ok(())
        }

        async fn switch_tab(&self, tab_id: &TabId) -> Result<(), AgentError> {
            let mut inner = self.inner.lock().unwrap();
            if !inner.automation_owned.contains(tab_id) {
                return Err(AgentError::other(
                    "refusing to switch to a tab not owned by the automation domain",
                ));
            }
            inner.current_tab = tab_id.clone();
            Ok(())
        }

        async fn get_all_tab_ids(&self) -> Result<Vec<TabId>, AgentError> {
            Ok(self.inner.lock().unwrap().tabs.clone())
        }

        async fn remove_highlight(&self) -> Result<(), AgentError> {
            Ok(())
        }

        async fn wait(&self, _seconds: f64) -> Result<(), AgentError> {
            Ok(())
        }

        async fn adopt_tab(&self, tab_id: &TabId) -> Result<(), AgentError> {
            self.inner.lock().unwrap().automation_owned.insert(tab_id.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;

    #[test]
    fn branch_path_hash_is_stable_for_same_path() {
        let a = BranchPathHash::from_path("/html/body/button[0]");
        let b = BranchPathHash::from_path("/html/body/button[0]");
        assert_eq!(a, b);
    }

    #[test]
    fn branch_path_hash_differs_for_different_paths() {
        let a = BranchPathHash::from_path("/html/body/button[0]");
        let b = BranchPathHash::from_path("/html/body/button[1]");
        assert_ne!(a, b);
    }

    #[test]
    fn subset_check_detects_new_elements() {
        let before = BranchPathHashSet(
            [BranchPathHash::from_path("a"), BranchPathHash::from_path("b")]
                .into_iter()
                .collect(),
        );
        let after_unchanged = before.clone();
        assert!(after_unchanged.is_subset_of(&before));

        let after_new = BranchPathHashSet(
            [
                BranchPathHash::from_path("a"),
                BranchPathHash::from_path("b"),
                BranchPathHash::from_path("c"),
            ]
            .into_iter()
            .collect(),
        );
        assert!(!after_new.is_subset_of(&before));
    }

    #[tokio::test]
    async fn fake_browser_reports_snapshot() {
        let page = ScriptedPage::new("https://example.com", "Example")
            .with_element(ElementNode::new("button", "/html/body/button[0]"));
        let ctx = FakeBrowsingContext::new(page);
        let snap = ctx.get_state(false).await.unwrap();
        assert_eq!(snap.url, "https://example.com");
        assert_eq!(snap.interactive_count(), 1);
    }

    #[tokio::test]
    async fn fake_browser_refuses_to_switch_to_unowned_tab() {
        let ctx = FakeBrowsingContext::new(ScriptedPage::new("https://example.com", "Example"));
        let foreign_tab = browseragent_core_types::TabId::new();
        let result = ctx.switch_tab(&foreign_tab).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fake_browser_mutates_page_after_click() {
        let page = ScriptedPage::new("https://example.com", "Example")
            .with_element(ElementNode::new("a", "/html/body/a[0]"))
            .with_element(ElementNode::new("button", "/html/body/button[1]"));
        let ctx = FakeBrowsingContext::new(page);

        let mutated = ScriptedPage::new("https://example.com", "Example")
            .with_element(ElementNode::new("a", "/html/body/a[0]"))
            .with_element(ElementNode::new("button", "/html/body/button[1]"))
            .with_element(ElementNode::new("div", "/html/body/div.modal[2]"));
        ctx.mutate_page_after_next_click(mutated);

        let before = ctx.get_state(false).await.unwrap().branch_path_hashes();
        ctx.click_element(0).await.unwrap();
        let after = ctx.get_state(false).await.unwrap().branch_path_hashes();
        assert!(!after.is_subset_of(&before));
    }
}
