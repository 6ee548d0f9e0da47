//! ページ内で評価するJavaScriptの組み立て
//!
//! 戻り値はすべて `JSON.stringify` した文字列で受け取り、Rust側で serde_json で読む。

use crate::extract::{Locator, Rule, Scope, Source};

/// 検索結果の店舗一覧
pub const RESULT_ENTRIES: &str =
    r#"//div[contains(@data-test-target, "restaurants-list")]/div[contains(@data-test, "list_item")]"#;
/// 検索結果の表示完了の目印
pub const FIRST_RESULT: &str = r#"//div[contains(@data-test,"1_list_item")]"#;
/// 店舗の口コミリンク
pub const ENTRY_REVIEWS_LINK: &str = r##".//a[contains(@href, "#REVIEWS")]"##;

pub const SEARCH_INPUT: &str = "div.restaurants_home form input[name='q']";
pub const TYPEAHEAD_FIRST: &str = "div#typeahead_results > a";
pub const COOKIE_ACCEPT: &str = "#onetrust-accept-btn-handler";
pub const GEO_BROADEN_OPT_OUT: &str = "div#geobroaden_opt_out";

pub const REVIEWS: &str = "div.listContainer div.review-container";
pub const TRANSLATED_HEADER: &str = "div.prw_reviews_mt_header_hsx";
pub const MEMBER_LINK: &str = "div.memberOverlayLink.clickable";
pub const MEMBER_OVERLAY: &str = "span.ui_popover div.memberOverlay";
pub const MEMBER_OVERLAY_READY: &str = "span.ui_popover div.memberOverlay h3.username";
pub const CLOSE_BUTTONS: &str = "div.ui_close_x";
pub const TEASER_EXPAND: &str =
    r#".//p[contains(@class, "partial_entry")]/span[contains(@onclick,"clickExpand")]"#;

pub const LANGUAGE_PICKER: &str = r#".//div[span[contains(text(),"Weitere Sprachen")]]"#;
pub const LANGUAGE_OVERLAY_ITEMS: &str = "div.ui_overlay.prw_filters_detail_language div.item";
pub const LANGUAGE_RADIO_ITEMS: &str = "div#REVIEWS div.prw_filters_detail_language div.choices div.item";

/// 文字列をJSリテラルにする
pub fn js_str(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// 関数本体を即時実行し、結果をJSON文字列で返す式にする
pub fn wrap(body: &str) -> String {
    format!("JSON.stringify((() => {{ {} }})())", body)
}

pub fn xpath_first(xpath: &str, context: &str) -> String {
    format!(
        "document.evaluate({}, {}, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
        js_str(xpath),
        context
    )
}

pub fn xpath_count(xpath: &str) -> String {
    format!(
        "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength",
        js_str(xpath)
    )
}

/// 抽出の起点要素を返す式
pub fn scope_expr(scope: &Scope) -> String {
    match scope {
        Scope::Document => "document".to_string(),
        Scope::ResultEntry(index) => format!(
            "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotItem({})",
            js_str(RESULT_ENTRIES),
            index
        ),
        Scope::Review(index) => format!(
            "(document.querySelectorAll({})[{}] || null)",
            js_str(REVIEWS),
            index
        ),
        Scope::UserOverlay => format!("document.querySelector({})", js_str(MEMBER_OVERLAY)),
    }
}

/// `root` からの相対で要素を返す式
pub fn locator_expr(locator: Locator) -> String {
    match locator {
        Locator::Root => "root".to_string(),
        Locator::Css(selector) => format!("root.querySelector({})", js_str(selector)),
        Locator::XPath(xpath) => xpath_first(xpath, "root"),
    }
}

/// 要素 `el` から値を読む式
pub fn source_expr(source: Source) -> String {
    match source {
        Source::Text => "(el.innerText ?? el.textContent)".to_string(),
        // 相対URLを解決済みの値で読む
        Source::Attribute("href") => "el.href".to_string(),
        Source::Attribute(name) => format!("el.getAttribute({})", js_str(name)),
    }
}

/// フィールド1件を読むスクリプト。`{scope, value}` を返す
pub fn field_script(scope: &Scope, rule: &Rule) -> String {
    wrap(&format!(
        "const root = {}; \
         if (!root) return {{ scope: false, value: null }}; \
         const el = {}; \
         if (!el) return {{ scope: true, value: null }}; \
         const value = {}; \
         return {{ scope: true, value: value == null ? null : String(value) }};",
        scope_expr(scope),
        locator_expr(rule.locator),
        source_expr(rule.source)
    ))
}

/// 起点要素の中の要素をクリックするスクリプト。クリックできたかを返す
pub fn click_within(scope: &Scope, locator: Locator) -> String {
    wrap(&format!(
        "const root = {}; \
         if (!root) return false; \
         const el = {}; \
         if (!el) return false; \
         el.click(); \
         return true;",
        scope_expr(scope),
        locator_expr(locator)
    ))
}

/// 要素が存在するか
pub fn exists_within(scope: &Scope, locator: Locator) -> String {
    wrap(&format!(
        "const root = {}; \
         if (!root) return false; \
         return !!({});",
        scope_expr(scope),
        locator_expr(locator)
    ))
}

/// CSSセレクタの要素が表示されているか
pub fn visible(selector: &str) -> String {
    wrap(&format!(
        "const el = document.querySelector({}); \
         return !!el && el.offsetParent !== null;",
        js_str(selector)
    ))
}

pub fn count(selector: &str) -> String {
    wrap(&format!(
        "return document.querySelectorAll({}).length;",
        js_str(selector)
    ))
}

/// 開いているオーバーレイの閉じるボタンを全て押す
pub fn close_overlays() -> String {
    wrap(&format!(
        "const xs = document.querySelectorAll({}); \
         xs.forEach(x => x.click()); \
         return xs.length;",
        js_str(CLOSE_BUTTONS)
    ))
}

/// 言語選択肢を選ぶ。選べたら `data-value` を返す
pub fn select_language_item(items_selector: &str, index: usize) -> String {
    wrap(&format!(
        "const item = document.querySelectorAll({})[{}]; \
         if (!item) return {{ found: false, language: null }}; \
         const language = item.getAttribute('data-value'); \
         const input = item.querySelector('input'); \
         if (input && !(input.checked || input.getAttribute('checked') === 'true')) {{ input.click(); }} \
         return {{ found: true, language: language }};",
        js_str(items_selector),
        index
    ))
}

/// 検索結果の次ページへのリンクを押す
pub fn click_page_number(page: u32) -> String {
    let xpath = format!(
        r#".//div[contains(@class, "pageNumbers")]/a[@data-page-number="{}"]"#,
        page
    );
    wrap(&format!(
        "const link = {}; \
         if (!link) return false; \
         link.click(); \
         return true;",
        xpath_first(&xpath, "document")
    ))
}
