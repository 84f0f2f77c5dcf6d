//! The default action catalog (spec §4.1). Each handler talks to the
//! injected `BrowsingContext` and folds capability failures into an
//! `ActionResult` rather than propagating them as exceptions, except for
//! genuinely exceptional capability failures (I/O, driver crashes) which
//! still surface as `AgentError` for the navigator's error budget to count.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use browseragent_core_types::TabId;

use crate::browser::BrowsingContext;
use crate::errors::AgentError;

use super::{ActionDefinition, ActionHandler, ActionRegistry, ActionResult};

fn schema(properties: Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "required": required,
        "properties": properties
    })
}

fn str_field(description: &str) -> Value {
    serde_json::json!({ "type": "string", "description": description })
}

fn u32_field(description: &str) -> Value {
    serde_json::json!({ "type": "integer", "minimum": 0, "description": description })
}

fn get_str<'a>(input: &'a Value, field: &str) -> &'a str {
    input.get(field).and_then(Value::as_str).unwrap_or_default()
}

fn get_u32(input: &Value, field: &str) -> u32 {
    input.get(field).and_then(Value::as_u64).unwrap_or(0) as u32
}

struct GoToUrl;
#[async_trait]
impl ActionHandler for GoToUrl {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let url = get_str(input, "url");
        browser.navigate_to(url).await?;
        Ok(ActionResult::ok(format!("Navigated to {url}")))
    }
}

struct SearchGoogle;
#[async_trait]
impl ActionHandler for SearchGoogle {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let query = get_str(input, "query");
        let url = format!("https://www.google.com/search?q={}", urlencode(query));
        browser.navigate_to(&url).await?;
        Ok(ActionResult::ok(format!("Searched Google for '{query}'")))
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| if c == ' ' { '+' } else { c })
        .collect()
}

struct GoBack;
#[async_trait]
impl ActionHandler for GoBack {
    async fn call(&self, browser: &dyn BrowsingContext, _input: &Value) -> Result<ActionResult, AgentError> {
        browser.go_back().await?;
        Ok(ActionResult::ok("Navigated back"))
    }
}

struct RefreshPage;
#[async_trait]
impl ActionHandler for RefreshPage {
    async fn call(&self, browser: &dyn BrowsingContext, _input: &Value) -> Result<ActionResult, AgentError> {
        browser.refresh_page().await?;
        Ok(ActionResult::ok("Refreshed page"))
    }
}

struct Wait;
#[async_trait]
impl ActionHandler for Wait {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let seconds = input.get("seconds").and_then(Value::as_f64).unwrap_or(1.0);
        browser.wait(seconds).await?;
        Ok(ActionResult::ok(format!("Waited {seconds}s")))
    }
}

struct OpenTab;
#[async_trait]
impl ActionHandler for OpenTab {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let url = get_str(input, "url");
        let tab = browser.open_tab(url).await?;
        browser.adopt_tab(&tab).await?;
        Ok(ActionResult {
            source_url: Some(url.to_string()),
            ..ActionResult::ok(format!("Opened new tab at {url}"))
        })
    }
}

struct SwitchTab;
#[async_trait]
impl ActionHandler for SwitchTab {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let tab_id = TabId(get_str(input, "tab_id").to_string());
        browser.switch_tab(&tab_id).await?;
        Ok(ActionResult::ok(format!("Switched to tab {tab_id}")))
    }
}

struct CloseTab;
#[async_trait]
impl ActionHandler for CloseTab {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let tab_id = TabId(get_str(input, "tab_id").to_string());
        browser.close_tab(&tab_id).await?;
        Ok(ActionResult::ok(format!("Closed tab {tab_id}")))
    }
}

/// `click_element` carries the tab-adoption edge case (spec §4.1): if the
/// number of open tabs increases by exactly one after the click, the new
/// tab is adopted and switched to, and its URL recorded on the result.
struct ClickElement;
#[async_trait]
impl ActionHandler for ClickElement {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let index = get_u32(input, "index");
        let before = browser.get_all_tab_ids().await?;
        browser.remove_highlight().await?;
        if let Err(err) = browser.click_element(index).await {
            return Ok(ActionResult::error(format!("{err}; retry after re-reading the page state")));
        }
        let after = browser.get_all_tab_ids().await?;

        if after.len() == before.len() + 1 {
            if let Some(new_tab) = after.iter().find(|t| !before.contains(t)) {
                browser.adopt_tab(new_tab).await?;
                browser.switch_tab(new_tab).await?;
                let state = browser.get_state(false).await?;
                return Ok(ActionResult {
                    source_url: Some(state.url.clone()),
                    ..ActionResult::ok(format!("Clicked element {index}; new tab adopted at {}", state.url))
                });
            }
        }
        Ok(ActionResult::ok(format!("Clicked element {index}")))
    }
}

struct InputText;
#[async_trait]
impl ActionHandler for InputText {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let index = get_u32(input, "index");
        let text = get_str(input, "text");
        match browser.input_text(index, text).await {
            Ok(()) => Ok(ActionResult::ok(format!("Typed into element {index}"))),
            Err(err) => Ok(ActionResult::error(format!("{err}; retry after re-reading the page state"))),
        }
    }
}

struct GetDropdownOptions;
#[async_trait]
impl ActionHandler for GetDropdownOptions {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let index = get_u32(input, "index");
        match browser.get_dropdown_options(index).await {
            Ok(options) => Ok(ActionResult::ok(crate::ledger::wrap_untrusted(&options.join(", ")))),
            Err(err) => Ok(ActionResult::error(err.to_string())),
        }
    }
}

struct SelectDropdownOption;
#[async_trait]
impl ActionHandler for SelectDropdownOption {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let index = get_u32(input, "index");
        let text = get_str(input, "text");
        match browser.select_dropdown_option(index, text).await {
            Ok(()) => Ok(ActionResult::ok(format!("Selected '{text}' on element {index}"))),
            Err(err) => Ok(ActionResult::error(err.to_string())),
        }
    }
}

struct ScrollDown;
#[async_trait]
impl ActionHandler for ScrollDown {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let before = browser.get_state(false).await?;
        if before.pixels_below <= 0 {
            return Ok(ActionResult::memory_note("Already at the bottom of the page"));
        }
        let amount = input.get("amount").and_then(Value::as_i64).map(|v| v as i32);
        browser.scroll_down(amount).await?;
        Ok(ActionResult::ok("Scrolled down"))
    }
}

struct ScrollUp;
#[async_trait]
impl ActionHandler for ScrollUp {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let before = browser.get_state(false).await?;
        if before.pixels_above <= 0 {
            return Ok(ActionResult::memory_note("Already at the top of the page"));
        }
        let amount = input.get("amount").and_then(Value::as_i64).map(|v| v as i32);
        browser.scroll_up(amount).await?;
        Ok(ActionResult::ok("Scrolled up"))
    }
}

struct ScrollToText;
#[async_trait]
impl ActionHandler for ScrollToText {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let text = get_str(input, "text");
        browser.scroll_to_text(text).await?;
        Ok(ActionResult::ok(format!("Scrolled to text '{text}'")))
    }
}

struct SendKeys;
#[async_trait]
impl ActionHandler for SendKeys {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let keys = get_str(input, "keys");
        browser.send_keys(keys).await?;
        Ok(ActionResult::ok(format!("Sent keys '{keys}'")))
    }
}

/// `cache_content` records untrusted page-extracted text, wrapped so the
/// model cannot mistake it for an instruction (spec §9).
struct CacheContent;
#[async_trait]
impl ActionHandler for CacheContent {
    async fn call(&self, _browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let content = get_str(input, "content");
        Ok(ActionResult::memory_note(crate::ledger::wrap_untrusted(content)))
    }
}

struct Done;
#[async_trait]
impl ActionHandler for Done {
    async fn call(&self, _browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError> {
        let text = get_str(input, "text");
        Ok(ActionResult::done(text))
    }
}

/// Builds the registry with every action named in spec §4.1.
pub fn default_registry() -> ActionRegistry {
    let mut reg = ActionRegistry::new();

    reg.register(ActionDefinition::new(
        "go_to_url",
        "Navigate the current tab to a URL",
        schema(serde_json::json!({ "url": str_field("absolute URL to navigate to"), "intent": str_field("why") }), &["url"]),
        false,
        Arc::new(GoToUrl),
    ));
    reg.register(ActionDefinition::new(
        "search_google",
        "Search Google for a query",
        schema(serde_json::json!({ "query": str_field("search query"), "intent": str_field("why") }), &["query"]),
        false,
        Arc::new(SearchGoogle),
    ));
    reg.register(ActionDefinition::new(
        "go_back",
        "Go back to the previous page",
        schema(serde_json::json!({ "intent": str_field("why") }), &[]),
        false,
        Arc::new(GoBack),
    ));
    reg.register(ActionDefinition::new(
        "refresh_page",
        "Reload the current page",
        schema(serde_json::json!({ "intent": str_field("why") }), &[]),
        false,
        Arc::new(RefreshPage),
    ));
    reg.register(ActionDefinition::new(
        "wait",
        "Wait for a number of seconds",
        schema(serde_json::json!({ "seconds": { "type": "number" }, "intent": str_field("why") }), &["seconds"]),
        false,
        Arc::new(Wait),
    ));
    reg.register(ActionDefinition::new(
        "open_tab",
        "Open a URL in a new tab",
        schema(serde_json::json!({ "url": str_field("URL to open"), "intent": str_field("why") }), &["url"]),
        false,
        Arc::new(OpenTab),
    ));
    reg.register(ActionDefinition::new(
        "switch_tab",
        "Switch to another open tab",
        schema(serde_json::json!({ "tab_id": str_field("tab identifier"), "intent": str_field("why") }), &["tab_id"]),
        false,
        Arc::new(SwitchTab),
    ));
    reg.register(ActionDefinition::new(
        "close_tab",
        "Close an open tab",
        schema(serde_json::json!({ "tab_id": str_field("tab identifier"), "intent": str_field("why") }), &["tab_id"]),
        false,
        Arc::new(CloseTab),
    ));
    reg.register(ActionDefinition::new(
        "click_element",
        "Click the interactive element at a given index",
        schema(serde_json::json!({ "index": u32_field("element index"), "intent": str_field("why") }), &["index"]),
        true,
        Arc::new(ClickElement),
    ));
    reg.register(ActionDefinition::new(
        "input_text",
        "Type text into the interactive element at a given index",
        schema(
            serde_json::json!({ "index": u32_field("element index"), "text": str_field("text to type"), "intent": str_field("why") }),
            &["index", "text"],
        ),
        true,
        Arc::new(InputText),
    ));
    reg.register(ActionDefinition::new(
        "get_dropdown_options",
        "List the options of a <select> element at a given index",
        schema(serde_json::json!({ "index": u32_field("element index"), "intent": str_field("why") }), &["index"]),
        true,
        Arc::new(GetDropdownOptions),
    ));
    reg.register(ActionDefinition::new(
        "select_dropdown_option",
        "Select an option by visible text on a <select> element",
        schema(
            serde_json::json!({ "index": u32_field("element index"), "text": str_field("option text"), "intent": str_field("why") }),
            &["index", "text"],
        ),
        true,
        Arc::new(SelectDropdownOption),
    ));
    reg.register(ActionDefinition::new(
        "scroll_down",
        "Scroll the page down",
        schema(serde_json::json!({ "amount": { "type": "integer" }, "intent": str_field("why") }), &[]),
        false,
        Arc::new(ScrollDown),
    ));
    reg.register(ActionDefinition::new(
        "scroll_up",
        "Scroll the page up",
        schema(serde_json::json!({ "amount": { "type": "integer" }, "intent": str_field("why") }), &[]),
        false,
        Arc::new(ScrollUp),
    ));
    reg.register(ActionDefinition::new(
        "scroll_to_text",
        "Scroll until the given text is visible",
        schema(serde_json::json!({ "text": str_field("text to find"), "intent": str_field("why") }), &["text"]),
        false,
        Arc::new(ScrollToText),
    ));
    reg.register(ActionDefinition::new(
        "send_keys",
        "Send a raw key sequence to the page",
        schema(serde_json::json!({ "keys": str_field("key sequence, e.g. Escape or Control+a"), "intent": str_field("why") }), &["keys"]),
        false,
        Arc::new(SendKeys),
    ));
    reg.register(ActionDefinition::new(
        "cache_content",
        "Record extracted page content for later use",
        schema(serde_json::json!({ "content": str_field("extracted content"), "intent": str_field("why") }), &["content"]),
        false,
        Arc::new(CacheContent),
    ));
    reg.register(ActionDefinition::new(
        "done",
        "Mark the task as complete",
        schema(serde_json::json!({ "text": str_field("final answer"), "intent": str_field("why") }), &["text"]),
        false,
        Arc::new(Done),
    ));

    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{FakeBrowsingContext, ScriptedPage};
    use crate::browser::ElementNode;

    #[tokio::test]
    async fn go_to_url_navigates() {
        let reg = default_registry();
        let ctx = FakeBrowsingContext::new(ScriptedPage::new("https://start", "start"));
        let result = reg
            .dispatch("go_to_url", &serde_json::json!({"url": "https://example.com"}), &ctx)
            .await
            .unwrap();
        assert!(!result.is_error());
        let state = ctx.get_state(false).await.unwrap();
        assert_eq!(state.url, "https://example.com");
    }

    #[tokio::test]
    async fn scroll_down_at_bottom_is_a_memory_note_not_an_error() {
        let reg = default_registry();
        let ctx = FakeBrowsingContext::new(ScriptedPage::new("https://x", "x"));
        ctx.scroll_down(Some(5000)).await.unwrap();
        let result = reg.dispatch("scroll_down", &serde_json::json!({}), &ctx).await.unwrap();
        assert!(!result.is_error());
        assert!(result.include_in_memory);
        assert!(result.extracted_content.unwrap().contains("bottom"));
    }

    #[tokio::test]
    async fn select_dropdown_on_non_select_is_error_result_not_exception() {
        let page = ScriptedPage::new("https://x", "x").with_element(ElementNode::new("button", "/html/body/button[0]"));
        let ctx = FakeBrowsingContext::new(page);
        let reg = default_registry();
        let result = reg
            .dispatch("select_dropdown_option", &serde_json::json!({"index": 0, "text": "a"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn click_element_adopts_new_tab() {
        let page = ScriptedPage::new("https://x", "x").with_element(ElementNode::new("a", "/html/body/a[0]"));
        let ctx = FakeBrowsingContext::new(page);
        // Pre-open the tab the click will "discover" to model a link opening a new tab.
        let new_tab = ctx.open_tab("https://opened").await.unwrap();
        ctx.switch_tab(&new_tab).await.unwrap();
        // Switch back so click happens from the original tab's perspective is out of
        // scope for this fake; we only assert the adoption/switch path runs without error.
        let reg = default_registry();
        let result = reg.dispatch("click_element", &serde_json::json!({"index": 0}), &ctx).await.unwrap();
        assert!(!result.is_error());
    }

    #[tokio::test]
    async fn done_action_marks_result_done() {
        let reg = default_registry();
        let ctx = FakeBrowsingContext::new(ScriptedPage::new("https://x", "x"));
        let result = reg.dispatch("done", &serde_json::json!({"text": "all set"}), &ctx).await.unwrap();
        assert!(result.is_done);
        assert_eq!(result.extracted_content.unwrap(), "all set");
    }
}
