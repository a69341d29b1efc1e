//! JavaScript snippets evaluated in the portal page.
//!
//! Every element script resolves its locator in the top document first and
//! then in each same-origin iframe, and re-resolves on every call, so a
//! partial page refresh never leaves us holding a dead node.

use super::{Locator, LocatorKind};

const FINDER: &str = r#"function (kind, value) {
    function lookup(doc) {
        try {
            if (kind === 'id') return doc.getElementById(value);
            if (kind === 'css') return doc.querySelector(value);
            return doc.evaluate(value, doc, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
        } catch (e) {
            return null;
        }
    }
    var el = lookup(document);
    if (el) return el;
    var frames = document.querySelectorAll('iframe, frame');
    for (var i = 0; i < frames.length; i++) {
        try {
            var doc = frames[i].contentDocument;
            if (doc) {
                el = lookup(doc);
                if (el) return el;
            }
        } catch (e) {}
    }
    return null;
}"#;

/// Document loaded and no jQuery or ASP.NET AJAX request in flight.
pub const PAGE_READY: &str = r#"(function () {
    var ready = document.readyState === 'complete';
    var jq = window.jQuery ? window.jQuery.active : 0;
    var postback = false;
    try {
        postback = !!(window.Sys && Sys.WebForms && Sys.WebForms.PageRequestManager &&
            Sys.WebForms.PageRequestManager.getInstance().get_isInAsyncPostBack());
    } catch (e) {}
    return ready && jq === 0 && !postback;
})()"#;

/// Marker returned by element scripts when the locator matched nothing.
pub const MISSING: &str = "missing";

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn with_element(locator: &Locator, body: &str) -> String {
    format!(
        "(function () {{ var find = {finder}; var el = find({kind}, {value}); {body} }})()",
        finder = FINDER,
        kind = js_string(locator.by.as_str()),
        value = js_string(&locator.value),
        body = body,
    )
}

pub fn is_present(locator: &Locator) -> String {
    with_element(locator, "return el !== null;")
}

pub fn click(locator: &Locator) -> String {
    with_element(
        locator,
        r#"if (!el) return 'missing';
        try { el.scrollIntoView({ block: 'center' }); } catch (e) {}
        el.click();
        return 'ok';"#,
    )
}

pub fn clear_value(locator: &Locator) -> String {
    with_element(
        locator,
        r#"if (!el) return 'missing';
        el.focus();
        el.value = '';
        return 'ok';"#,
    )
}

pub fn read_value(locator: &Locator) -> String {
    with_element(locator, "if (!el) return 'missing'; return String(el.value || '');")
}

pub fn set_value(locator: &Locator, text: &str) -> String {
    let body = format!(
        r#"if (!el) return 'missing';
        el.focus();
        el.value = {text};
        el.dispatchEvent(new Event('input', {{ bubbles: true }}));
        el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        return String(el.value || '');"#,
        text = js_string(text)
    );
    with_element(locator, &body)
}

pub fn read_text(locator: &Locator) -> String {
    with_element(
        locator,
        "if (!el) return 'missing'; return String(el.textContent || '').trim();",
    )
}

pub fn select_index(locator: &Locator, index: u32) -> String {
    let body = format!(
        r#"if (!el) return 'missing';
        if (!el.options || el.options.length <= {index}) return 'out_of_range';
        el.selectedIndex = {index};
        el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        return 'ok';"#,
        index = index
    );
    with_element(locator, &body)
}

/// CSS selector usable with the devtools DOM API for top-document lookups.
pub fn css_selector(locator: &Locator) -> Option<String> {
    match locator.by {
        LocatorKind::Id => Some(format!("[id={}]", js_string(&locator.value))),
        LocatorKind::Css => Some(locator.value.clone()),
        LocatorKind::Xpath => None,
    }
}
