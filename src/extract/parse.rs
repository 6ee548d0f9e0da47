//! 抽出テキストの整形関数
//!
//! すべて `&str -> Option<String>` の純粋関数。`None` は欠損値を表す。

use std::sync::LazyLock;

use regex::Regex;

static NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\d]+").expect("static regex"));
static POSTCODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{5}\b").expect("static regex"));
static AGE_RANGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+-\d+").expect("static regex"));
static LIST_POSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\s").expect("static regex"));
static BUBBLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"bubble_(\d+)").expect("static regex"));

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// 前後の空白を除去
pub fn trimmed(raw: &str) -> Option<String> {
    non_empty(raw)
}

/// 数字のみを残す（"1.234 Bewertungen" -> "1234"）
pub fn digits(raw: &str) -> Option<String> {
    let value = NON_DIGITS.replace_all(raw, "");
    non_empty(&value)
}

/// 件数表記を数値として読む
pub fn count(raw: &str) -> Option<u32> {
    digits(raw)?.parse().ok()
}

/// 住所 "Straße 1, 09337 Ort" の通り部分
pub fn street(raw: &str) -> Option<String> {
    raw.split(", ").next().and_then(non_empty)
}

/// 住所から5桁の郵便番号を取り出す
pub fn postcode(raw: &str) -> Option<String> {
    let rest = raw.split_once(", ").map(|(_, rest)| rest).unwrap_or(raw);
    POSTCODE.find(rest).map(|m| m.as_str().to_string())
}

/// "Italienisch, Pizza, Mediterran" の n 番目（0始まり）
pub fn nth_cuisine(raw: &str, n: usize) -> Option<String> {
    raw.splitn(4, ", ").nth(n).and_then(non_empty)
}

pub fn cuisine1(raw: &str) -> Option<String> {
    nth_cuisine(raw, 0)
}

pub fn cuisine2(raw: &str) -> Option<String> {
    nth_cuisine(raw, 1)
}

pub fn cuisine3(raw: &str) -> Option<String> {
    nth_cuisine(raw, 2)
}

/// "5 € - 20 €" の下限
pub fn price_low(raw: &str) -> Option<String> {
    raw.split(" - ").next().and_then(digits)
}

/// "5 € - 20 €" の上限
pub fn price_high(raw: &str) -> Option<String> {
    raw.split_once(" - ").and_then(|(_, high)| digits(high))
}

/// 星評価クラス "ui_bubble_rating bubble_45" を 1〜5 の整数へ（10で割って切り捨て）
pub fn bubble_score(raw: &str) -> Option<String> {
    let scaled: u32 = BUBBLE.captures(raw)?.get(1)?.as_str().parse().ok()?;
    let score = scaled / 10;
    (1..=5).contains(&score).then(|| score.to_string())
}

/// 検索結果の店名から順位の接頭辞 "12. " を除去
pub fn entry_name(raw: &str) -> Option<String> {
    let value = LIST_POSITION.replace(raw, "");
    non_empty(&value)
}

/// プロフィール説明 "Mann, 35-49 aus Berlin, Deutschland" から性別
pub fn gender(raw: &str) -> Option<String> {
    if raw.contains("Mann") {
        Some("Mann".to_string())
    } else if raw.contains("Frau") {
        Some("Frau".to_string())
    } else {
        None
    }
}

/// プロフィール説明から年齢層
pub fn age_range(raw: &str) -> Option<String> {
    AGE_RANGE.find(raw).map(|m| m.as_str().to_string())
}

/// プロフィール説明から居住都市
pub fn user_city(raw: &str) -> Option<String> {
    let rest = match raw.trim_start().strip_prefix("Aus ") {
        Some(rest) => rest,
        None => raw.split_once(" aus ")?.1,
    };
    rest.split(", ").next().and_then(non_empty)
}

/// プロフィール説明から居住国（最後のカンマ区切り要素）
pub fn user_country(raw: &str) -> Option<String> {
    let (_, rest) = raw.split_once(", ")?;
    rest.rsplit(", ").next().and_then(non_empty)
}

/// メンバーリンクの id "UID_8F3A2-SRC_123" からユーザーID
pub fn user_id(raw: &str) -> Option<String> {
    let head = raw.split('-').next()?;
    head.split_once('_').and_then(|(_, id)| non_empty(id))
}
