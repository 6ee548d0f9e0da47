//! フィールド抽出ルール
//!
//! フィールドごとに「どこを探すか（Locator）」「何を読むか（Source）」
//! 「どう整形するか（parse）」を1つの `Rule` にまとめる。
//! ブラウザ側は `Rule` の前半だけを解釈し、生テキストを返す。
//! 整形はこちらの純粋関数で行うので、フィクスチャ文字列だけでテストできる。

pub mod parse;

use tracing::debug;

use crate::error::ScraperError;
use crate::traits::PageClient;

/// 抽出の起点となる要素
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// ページ全体
    Document,
    /// 検索結果ページの n 番目の店舗
    ResultEntry(usize),
    /// 口コミ一覧の n 番目の口コミ
    Review(usize),
    /// 開いているユーザープロフィールのオーバーレイ
    UserOverlay,
}

/// 要素の探し方（起点からの相対）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// 起点要素そのもの
    Root,
    Css(&'static str),
    XPath(&'static str),
}

/// 要素から読む値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Text,
    Attribute(&'static str),
}

/// ユーザー情報の取得経路
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchMode {
    /// プロフィールオーバーレイから
    Primary,
    /// 口コミ欄にインライン表示された要約から
    Fallback,
}

impl FetchMode {
    /// `review_user_overlay_failed` 列に保存する値
    pub fn overlay_failed_flag(self) -> &'static str {
        match self {
            FetchMode::Primary => "0",
            FetchMode::Fallback => "1",
        }
    }
}

/// 1フィールド分の抽出ルール
#[derive(Clone, Copy)]
pub struct Rule {
    pub locator: Locator,
    pub source: Source,
    pub parse: fn(&str) -> Option<String>,
}

impl Rule {
    const fn new(locator: Locator, source: Source, parse: fn(&str) -> Option<String>) -> Self {
        Self {
            locator,
            source,
            parse,
        }
    }

    /// 生テキストに整形関数を適用
    pub fn apply(&self, raw: &str) -> Option<String> {
        (self.parse)(raw)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("locator", &self.locator)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// 抽出対象フィールド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    EntryName,
    EntryUrl,
    StreetWithNo,
    Postcode,
    Cuisine1,
    Cuisine2,
    Cuisine3,
    PriceRangeLo,
    PriceRangeHi,
    ReviewCount,
    ReviewUserName,
    ReviewUserGender,
    ReviewUserAge,
    ReviewUserCity,
    ReviewUserCountry,
    ReviewUserSignup,
    ReviewUserReviews,
    ReviewUserThumbsup,
    ReviewUserCitiesVisited,
    ReviewUserId,
    ReviewDate,
    ReviewScore,
    ReviewTitle,
    ReviewText,
    ReviewId,
}

const ADDRESS: Locator = Locator::XPath(r##".//a[contains(@href,"#MAPVIEW")]"##);
const CUISINES: Locator = Locator::XPath(r#".//div[contains(text(), "KÜCHEN")]/following-sibling::div"#);
const PRICE_RANGE: Locator =
    Locator::XPath(r#".//div[contains(text(), "PREISSPANNE")]/following-sibling::div"#);
const ENTRY_LINK: Locator = Locator::XPath(r#"(.//a[contains(@href,"Restaurant_Review")])[2]"#);
const MEMBER_DESCRIPTION: Locator =
    Locator::XPath(r#"(.//ul[contains(@class, "memberdescriptionReviewEnhancements")]/li)[2]"#);

impl Field {
    /// 検索結果から読む店舗情報
    pub const ENTRY: [Field; 2] = [Field::EntryName, Field::EntryUrl];

    /// レストラン詳細ページから1回だけ読む項目
    pub const RESTAURANT: [Field; 7] = [
        Field::StreetWithNo,
        Field::Postcode,
        Field::Cuisine1,
        Field::Cuisine2,
        Field::Cuisine3,
        Field::PriceRangeLo,
        Field::PriceRangeHi,
    ];

    /// オーバーレイ（またはインライン要約）から読むユーザー情報
    pub const USER_PROFILE: [Field; 9] = [
        Field::ReviewUserName,
        Field::ReviewUserGender,
        Field::ReviewUserAge,
        Field::ReviewUserCity,
        Field::ReviewUserCountry,
        Field::ReviewUserSignup,
        Field::ReviewUserReviews,
        Field::ReviewUserThumbsup,
        Field::ReviewUserCitiesVisited,
    ];

    /// 口コミ要素から読む項目
    pub const REVIEW: [Field; 6] = [
        Field::ReviewUserId,
        Field::ReviewDate,
        Field::ReviewScore,
        Field::ReviewTitle,
        Field::ReviewText,
        Field::ReviewId,
    ];

    /// 成果物の列名
    pub fn column(self) -> &'static str {
        match self {
            Field::EntryName => "name",
            Field::EntryUrl => "url",
            Field::StreetWithNo => "street_w_no",
            Field::Postcode => "postcode",
            Field::Cuisine1 => "cuisine1",
            Field::Cuisine2 => "cuisine2",
            Field::Cuisine3 => "cuisine3",
            Field::PriceRangeLo => "pricerange_lo",
            Field::PriceRangeHi => "pricerange_hi",
            Field::ReviewCount => "review_count",
            Field::ReviewUserName => "review_user_name",
            Field::ReviewUserGender => "review_user_gender",
            Field::ReviewUserAge => "review_user_age",
            Field::ReviewUserCity => "review_user_city",
            Field::ReviewUserCountry => "review_user_country",
            Field::ReviewUserSignup => "review_user_signup",
            Field::ReviewUserReviews => "review_user_reviews",
            Field::ReviewUserThumbsup => "review_user_thumbsup",
            Field::ReviewUserCitiesVisited => "review_user_cities_visited",
            Field::ReviewUserId => "review_user_id",
            Field::ReviewDate => "review_date",
            Field::ReviewScore => "review_score",
            Field::ReviewTitle => "review_title",
            Field::ReviewText => "review_text",
            Field::ReviewId => "review_id",
        }
    }

    /// 取得経路ごとのルール。`None` はその経路では常に欠損
    pub fn rule(self, mode: FetchMode) -> Option<Rule> {
        use Locator::{Css, Root, XPath};
        use Source::{Attribute, Text};

        let rule = match (self, mode) {
            (Field::EntryName, _) => Rule::new(ENTRY_LINK, Text, parse::entry_name),
            (Field::EntryUrl, _) => Rule::new(ENTRY_LINK, Attribute("href"), parse::trimmed),
            (Field::StreetWithNo, _) => Rule::new(ADDRESS, Text, parse::street),
            (Field::Postcode, _) => Rule::new(ADDRESS, Text, parse::postcode),
            (Field::Cuisine1, _) => Rule::new(CUISINES, Text, parse::cuisine1),
            (Field::Cuisine2, _) => Rule::new(CUISINES, Text, parse::cuisine2),
            (Field::Cuisine3, _) => Rule::new(CUISINES, Text, parse::cuisine3),
            (Field::PriceRangeLo, _) => Rule::new(PRICE_RANGE, Text, parse::price_low),
            (Field::PriceRangeHi, _) => Rule::new(PRICE_RANGE, Text, parse::price_high),
            (Field::ReviewCount, _) => Rule::new(Css("span.reviews_header_count"), Text, parse::digits),

            (Field::ReviewUserName, FetchMode::Primary) => {
                Rule::new(Css("h3.username"), Text, parse::trimmed)
            }
            (Field::ReviewUserName, FetchMode::Fallback) => Rule::new(
                XPath(r#".//div[contains(@class, "member_info")]//div[contains(@class, "info_text")]/div"#),
                Text,
                parse::trimmed,
            ),
            (Field::ReviewUserGender, FetchMode::Primary) => {
                Rule::new(MEMBER_DESCRIPTION, Text, parse::gender)
            }
            (Field::ReviewUserAge, FetchMode::Primary) => {
                Rule::new(MEMBER_DESCRIPTION, Text, parse::age_range)
            }
            (Field::ReviewUserCity, FetchMode::Primary) => {
                Rule::new(MEMBER_DESCRIPTION, Text, parse::user_city)
            }
            (Field::ReviewUserCountry, FetchMode::Primary) => {
                Rule::new(MEMBER_DESCRIPTION, Text, parse::user_country)
            }
            (Field::ReviewUserSignup, FetchMode::Primary) => Rule::new(
                XPath(r#".//li[contains(text(), "Tripadvisor-Mitglied seit")]"#),
                Text,
                parse::digits,
            ),
            (Field::ReviewUserReviews, FetchMode::Primary) => Rule::new(
                XPath(r#".//li[contains(@class, "countsReviewEnhancementsItem")]/span[contains(text(), "Beitr")]"#),
                Text,
                parse::digits,
            ),
            (Field::ReviewUserReviews, FetchMode::Fallback) => Rule::new(
                XPath(r#".//div[contains(@class, "member_info")]/span[contains(text(), "Bewertung")]"#),
                Text,
                parse::digits,
            ),
            (Field::ReviewUserThumbsup, FetchMode::Primary) => Rule::new(
                XPath(r#".//li[contains(@class, "countsReviewEnhancementsItem")]/span[contains(text(), "Hilfreich")]"#),
                Text,
                parse::digits,
            ),
            (Field::ReviewUserCitiesVisited, FetchMode::Primary) => Rule::new(
                XPath(r#".//li[contains(@class, "countsReviewEnhancementsItem")]/span[contains(text(), "besuchte")]"#),
                Text,
                parse::digits,
            ),
            (
                Field::ReviewUserGender
                | Field::ReviewUserAge
                | Field::ReviewUserCity
                | Field::ReviewUserCountry
                | Field::ReviewUserSignup
                | Field::ReviewUserThumbsup
                | Field::ReviewUserCitiesVisited,
                FetchMode::Fallback,
            ) => return None,

            (Field::ReviewUserId, _) => Rule::new(
                Css("div.memberOverlayLink.clickable"),
                Attribute("id"),
                parse::user_id,
            ),
            (Field::ReviewDate, _) => Rule::new(Css("span.ratingDate"), Attribute("title"), parse::trimmed),
            (Field::ReviewScore, _) => Rule::new(
                Css("span.ui_bubble_rating"),
                Attribute("class"),
                parse::bubble_score,
            ),
            (Field::ReviewTitle, _) => Rule::new(Css("div.quote a span.noQuotes"), Text, parse::trimmed),
            (Field::ReviewText, _) => Rule::new(Css("div.entry p.partial_entry"), Text, parse::trimmed),
            (Field::ReviewId, _) => Rule::new(Root, Attribute("data-reviewid"), parse::trimmed),
        };
        Some(rule)
    }
}

/// フィールドを取得して整形する
///
/// 要素が無い・読めない場合は欠損（`Ok(None)`）として扱う。
/// セッション喪失などの一時障害だけは呼び出し元へ伝播する。
pub async fn fetch_field<C>(
    client: &mut C,
    scope: &Scope,
    field: Field,
    mode: FetchMode,
) -> Result<Option<String>, ScraperError>
where
    C: PageClient + ?Sized,
{
    let Some(rule) = field.rule(mode) else {
        return Ok(None);
    };

    match client.get_field(scope, field, mode).await {
        Ok(Some(raw)) => Ok(rule.apply(&raw)),
        Ok(None) => Ok(None),
        Err(e) if e.is_retryable() => Err(e),
        Err(e) => {
            debug!("Field {} missing in {:?}: {}", field.column(), scope, e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_rules_only_cover_inline_fields() {
        let inline: Vec<Field> = Field::USER_PROFILE
            .iter()
            .copied()
            .filter(|f| f.rule(FetchMode::Fallback).is_some())
            .collect();
        assert_eq!(inline, vec![Field::ReviewUserName, Field::ReviewUserReviews]);

        for field in Field::USER_PROFILE {
            assert!(field.rule(FetchMode::Primary).is_some(), "{:?}", field);
        }
    }

    #[test]
    fn test_rule_applies_parser() {
        let rule = Field::ReviewScore.rule(FetchMode::Primary).unwrap();
        assert_eq!(rule.locator, Locator::Css("span.ui_bubble_rating"));
        assert_eq!(rule.source, Source::Attribute("class"));
        assert_eq!(rule.apply("ui_bubble_rating bubble_40").as_deref(), Some("4"));

        let rule = Field::ReviewId.rule(FetchMode::Fallback).unwrap();
        assert_eq!(rule.locator, Locator::Root);
        assert_eq!(rule.apply(" 812345 ").as_deref(), Some("812345"));
    }

    #[test]
    fn test_columns_are_unique() {
        let mut columns: Vec<&str> = Field::RESTAURANT
            .iter()
            .chain(Field::USER_PROFILE.iter())
            .chain(Field::REVIEW.iter())
            .chain(Field::ENTRY.iter())
            .map(|f| f.column())
            .collect();
        let total = columns.len();
        columns.sort();
        columns.dedup();
        assert_eq!(columns.len(), total);
    }

    #[test]
    fn test_overlay_flag() {
        assert_eq!(FetchMode::Primary.overlay_failed_flag(), "0");
        assert_eq!(FetchMode::Fallback.overlay_failed_flag(), "1");
    }
}
