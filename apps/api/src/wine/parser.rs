//! Candidate record parser for wine-list page text.
//!
//! Lines are split into columns on tabs, ideographic spaces or runs of two or
//! more spaces. A column that carries a price is further cut into
//! segments at signal words, since extracted PDF text usually separates
//! everything with single spaces. Each segment is classified (price, vintage,
//! alcohol, labelled field, region/country/grape lexicon, producer marker,
//! free text) and a line that carries a plausible name plus at least one wine
//! signal becomes a candidate. Lines without signals directly under a
//! candidate are folded into it.
//!
//! Parsing is lazy: [`Candidates`] walks the text once, line by line.

use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;

use chrono::{Datelike, Utc};
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::wine::models::{RecordSource, WineRecord};
use crate::wine::script::{contains_japanese, normalize_name};

// ────────────────────────────────────────────────────────────────────────────
// Patterns and lexicons
// ────────────────────────────────────────────────────────────────────────────

static COLUMN_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\t\x{3000}]|\s{2,}").expect("valid column regex"));

static PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[¥$€£]\s*(?P<pre>[^\s(]+)|(?P<post>[^\s(]+?)\s*円)\s*(?:\([^)]*\))?$")
        .expect("valid price regex")
});

static BARE_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d{1,3}(?:,\d{3})+|\d{3,})(?:\.\d+)?$").expect("valid bare price regex")
});

static VINTAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?P<year>(?:19|20)\d{2})\s*年?|nv|n\.v\.?|non[- ]vintage)$")
        .expect("valid vintage regex")
});

static ALCOHOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,2}(?:\.\d{1,2})?\s*%$").expect("valid alcohol regex")
});

static AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d[\d,]*(?:\.\d+)?$").expect("valid amount regex"));

static NAME_VINTAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<name>.*\S)\s+(?P<vintage>(?:19|20)\d{2}|nv|n\.v\.?)$")
        .expect("valid name vintage regex")
});

static LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<label>生産者|造り手|ワイナリー|生産国|国|産地|生産地|地域|地方|品種|ぶどう品種|ブドウ品種|葡萄品種|セパージュ|ヴィンテージ|価格|値段|アルコール度数|アルコール|度数|コメント|テイスティングノート|特徴|producer|winery|region|appellation|country|grapes?|variet(?:y|ies)|vintage|price|alcohol|abv|tasting notes?|notes?)\s*:\s*(?P<value>.+)$",
    )
    .expect("valid label regex")
});

static HEADER_JA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:赤|白|ロゼ|泡|スパークリング|シャンパン|オレンジ|デザート|甘口|辛口|グラス|ボトル|ハーフボトル|おすすめ|本日の)?\s*(?:ワイン)?\s*(?:リスト|メニュー)?$",
    )
    .expect("valid header regex")
});

static HEADER_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:red|white|ros[eé]|sparkling|orange|dessert|sweet|fortified|house|natural)\s*)?(?:wines?)?\s*(?:list|menu|by the glass|by the bottle)?$|^(?:champagne|bubbles)$",
    )
    .expect("valid header regex")
});

static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\btel\b|\bfax\b|https?://|www\.|\S+@\S+\.\S+|〒|電話|営業時間|定休日|住所|^[※*]|^page\s*\d+$|^p\.?\s*\d+$|^-\s*\d+\s*-$|^\d{1,3}$|^\d+\s*/\s*\d+$",
    )
    .expect("valid noise regex")
});

const HEADER_TRIM: &[char] = &[
    '■', '□', '◆', '◇', '●', '○', '★', '☆', '◎', '▼', '▽', '▲', '△', '・', '-', '=', '~', '〜', '*',
    '【', '】', '[', ']', '<', '>', '〈', '〉', '《', '》', '(', ')', '「', '」', ' ',
];

const REGIONS: &[&str] = &[
    "ボルドー", "bordeaux", "ブルゴーニュ", "bourgogne", "burgundy", "シャンパーニュ", "champagne",
    "ロワール", "loire", "ローヌ", "rhone", "アルザス", "alsace", "プロヴァンス", "provence",
    "ラングドック", "languedoc", "ナパ", "napa", "ナパ・ヴァレー", "napa valley", "ソノマ", "sonoma",
    "カリフォルニア", "california", "オレゴン", "oregon", "ピエモンテ", "piemonte", "piedmont",
    "トスカーナ", "toscana", "tuscany", "ヴェネト", "veneto", "シチリア", "sicilia", "sicily",
    "リオハ", "rioja", "リベラ・デル・ドゥエロ", "ribera del duero", "モーゼル", "mosel",
    "ラインガウ", "rheingau", "マールボロ", "marlborough", "バロッサ・ヴァレー", "barossa valley",
    "メンドーサ", "mendoza", "ヴィーニョ・ヴェルデ", "vinho verde", "山梨", "yamanashi", "長野",
    "nagano", "北海道", "hokkaido",
];

const COUNTRIES: &[&str] = &[
    "フランス", "france", "イタリア", "italy", "italia", "スペイン", "spain", "ドイツ", "germany",
    "ポルトガル", "portugal", "アメリカ", "usa", "america", "チリ", "chile", "アルゼンチン",
    "argentina", "オーストラリア", "australia", "ニュージーランド", "new zealand", "南アフリカ",
    "south africa", "オーストリア", "austria", "日本", "japan",
];

const GRAPES: &[&str] = &[
    "シャルドネ", "chardonnay", "ピノ・ノワール", "pinot noir", "ピノ・グリージョ", "pinot grigio",
    "pinot gris", "カベルネ・ソーヴィニヨン", "cabernet sauvignon", "ソーヴィニヨン・ブラン",
    "sauvignon blanc", "メルロー", "merlot", "シラー", "syrah", "shiraz", "リースリング", "riesling",
    "テンプラニーリョ", "tempranillo", "ネッビオーロ", "nebbiolo", "サンジョヴェーゼ", "sangiovese",
    "グルナッシュ", "grenache", "ガメイ", "gamay", "ヴィオニエ", "viognier", "シュナン・ブラン",
    "chenin blanc", "マルベック", "malbec", "ジンファンデル", "zinfandel", "ロウレイロ", "loureiro",
    "甲州", "koshu", "マスカット・ベーリーA", "muscat bailey a",
];

const PRODUCER_WORDS: &[&str] = &[
    "domaine", "chateau", "weingut", "bodega", "bodegas", "tenuta", "cantina", "maison", "quinta",
    "winery", "estate", "vineyards", "azienda", "cave",
];

const PRODUCER_KANA: &[&str] = &[
    "ドメーヌ", "シャトー", "メゾン", "テヌータ", "カンティーナ", "ボデガ", "ヴァイングート", "ワイナリー",
    "酒造", "醸造",
];

fn lexicon(terms: &[&str]) -> HashSet<String> {
    terms.iter().map(|t| normalize_name(t)).collect()
}

static REGION_SET: LazyLock<HashSet<String>> = LazyLock::new(|| lexicon(REGIONS));
static COUNTRY_SET: LazyLock<HashSet<String>> = LazyLock::new(|| lexicon(COUNTRIES));
static GRAPE_SET: LazyLock<HashSet<String>> = LazyLock::new(|| lexicon(GRAPES));

// ────────────────────────────────────────────────────────────────────────────
// Column classification
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Producer,
    Region,
    Country,
    Grape,
    Vintage,
    Price,
    Alcohol,
    Notes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VintageMark {
    Year(u16),
    NonVintage,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
enum Column {
    Text(String),
    /// `None` when the column looks like a price but the amount does not parse.
    Price(Option<f64>),
    Vintage(VintageMark),
    Labelled(Field, String),
    Region(String),
    Country(String),
    Producer(String),
    Grape(String),
}

impl Column {
    fn is_signal(&self) -> bool {
        match self {
            Column::Text(_) => false,
            Column::Labelled(field, _) => *field != Field::Notes,
            _ => true,
        }
    }

    fn is_lexical(&self) -> bool {
        matches!(
            self,
            Column::Region(_) | Column::Country(_) | Column::Grape(_) | Column::Producer(_)
        )
    }

    fn into_text(self) -> Option<String> {
        match self {
            Column::Text(t)
            | Column::Region(t)
            | Column::Country(t)
            | Column::Grape(t)
            | Column::Producer(t) => Some(t),
            _ => None,
        }
    }
}

fn split_columns(line: &str) -> Vec<String> {
    COLUMN_SPLIT
        .split(line)
        .map(|c| c.trim().nfkc().collect::<String>())
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn classify(column: &str, first: bool) -> Column {
    if let Some(caps) = LABELLED.captures(column) {
        let field = label_field(&caps["label"]);
        return Column::Labelled(field, caps["value"].trim().to_string());
    }
    if let Some(mark) = parse_vintage(column) {
        return Column::Vintage(mark);
    }
    if let Some(price) = parse_price(column) {
        return Column::Price(price);
    }
    if ALCOHOL.is_match(column) {
        return Column::Labelled(Field::Alcohol, column.to_string());
    }

    let normalized = normalize_name(column);
    if REGION_SET.contains(&normalized) {
        return Column::Region(column.to_string());
    }
    if COUNTRY_SET.contains(&normalized) {
        return Column::Country(column.to_string());
    }
    if GRAPE_SET.contains(&normalized) {
        return Column::Grape(column.to_string());
    }
    // The first column is where the wine name sits, and names such as
    // シャトー・マルゴー carry producer words themselves.
    if !first && looks_like_producer(&normalized) {
        return Column::Producer(column.to_string());
    }
    Column::Text(column.to_string())
}

fn label_field(label: &str) -> Field {
    match label.to_lowercase().as_str() {
        "生産者" | "造り手" | "ワイナリー" | "producer" | "winery" => Field::Producer,
        "生産国" | "国" | "country" => Field::Country,
        "産地" | "生産地" | "地域" | "地方" | "region" | "appellation" => Field::Region,
        "品種" | "ぶどう品種" | "ブドウ品種" | "葡萄品種" | "セパージュ" | "grape" | "grapes"
        | "variety" | "varieties" => Field::Grape,
        "ヴィンテージ" | "vintage" => Field::Vintage,
        "価格" | "値段" | "price" => Field::Price,
        "アルコール度数" | "アルコール" | "度数" | "alcohol" | "abv" => Field::Alcohol,
        _ => Field::Notes,
    }
}

fn looks_like_producer(normalized: &str) -> bool {
    if contains_japanese(normalized) {
        PRODUCER_KANA.iter().any(|m| normalized.contains(m))
    } else {
        normalized
            .split_whitespace()
            .any(|w| PRODUCER_WORDS.contains(&w))
    }
}

/// `Some(None)` marks a price-shaped column whose amount is unusable.
fn parse_price(column: &str) -> Option<Option<f64>> {
    if let Some(caps) = PRICE.captures(column) {
        let amount = caps
            .name("pre")
            .or_else(|| caps.name("post"))
            .map(|m| m.as_str())
            .unwrap_or_default();
        return Some(parse_amount(amount));
    }
    if BARE_PRICE.is_match(column) {
        return Some(parse_amount(column));
    }
    None
}

// ────────────────────────────────────────────────────────────────────────────
// In-column segmentation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Plain,
    Price,
    Vintage,
    Alcohol,
}

/// Whitespace tokens, with split prices (`¥ 8,000`, `8,000 円`, `¥8000 (税込)`)
/// and percentages (`13.5 %`) joined back together.
fn tokenize(column: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in column.split_whitespace() {
        if let Some(prev) = out.last_mut() {
            let joins = matches!(prev.as_str(), "¥" | "$" | "€" | "£")
                || (AMOUNT.is_match(prev) && matches!(word, "円" | "%"))
                || (word.starts_with('(') && PRICE.is_match(prev));
            if joins {
                prev.push(' ');
                prev.push_str(word);
                continue;
            }
        }
        out.push(word.to_string());
    }
    out
}

/// A bare number only reads as a price at the end of the column.
fn token_kind(token: &str, last: bool) -> Token {
    if matches!(
        parse_vintage(token),
        Some(VintageMark::Year(_) | VintageMark::Invalid)
    ) {
        Token::Vintage
    } else if PRICE.is_match(token) || (last && BARE_PRICE.is_match(token)) {
        Token::Price
    } else if ALCOHOL.is_match(token) {
        Token::Alcohol
    } else {
        Token::Plain
    }
}

/// Length of the longest lexicon phrase (up to three words) at the start of
/// `tokens`.
fn lexicon_phrase(tokens: &[String], kinds: &[Token]) -> Option<usize> {
    let plain = kinds.iter().take_while(|k| **k == Token::Plain).count().min(3);
    (1..=plain).rev().find(|&len| {
        let normalized = normalize_name(&tokens[..len].join(" "));
        REGION_SET.contains(&normalized)
            || COUNTRY_SET.contains(&normalized)
            || GRAPE_SET.contains(&normalized)
    })
}

/// A bare marker word (`Estate`, `ドメーヌ`) only opens a producer when a
/// plain word follows it.
fn starts_producer(token: &str, next: Option<Token>) -> bool {
    let normalized = normalize_name(token);
    if !looks_like_producer(&normalized) {
        return false;
    }
    let bare = PRODUCER_WORDS.contains(&normalized.as_str())
        || PRODUCER_KANA.contains(&normalized.as_str());
    !bare || next == Some(Token::Plain)
}

fn flush_run(run: &mut Vec<&str>, out: &mut Vec<String>) {
    if !run.is_empty() {
        out.push(run.join(" "));
        run.clear();
    }
}

/// Cuts a single-spaced column into segments at prices, years, percentages,
/// lexicon phrases and producer markers.
///
/// Columns without a price are returned whole, so prose such as `notes of
/// cherry from Napa` or `family estate since 1998` stays one note. The leading
/// words of the first column are the wine name and never match the lexicon.
fn segment(column: &str, first: bool) -> Vec<String> {
    if LABELLED.is_match(column) {
        return vec![column.to_string()];
    }
    let tokens = tokenize(column);
    if tokens.len() <= 1 {
        return vec![column.to_string()];
    }
    let kinds: Vec<Token> = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| token_kind(t, i + 1 == tokens.len()))
        .collect();
    if !kinds.contains(&Token::Price) {
        return vec![column.to_string()];
    }

    let mut out: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();
        match kinds[i] {
            // `Name 2015` at the end stays whole; the name splitter reads it.
            Token::Vintage if i + 1 == tokens.len() && !run.is_empty() => run.push(token),
            Token::Price | Token::Vintage | Token::Alcohol => {
                flush_run(&mut run, &mut out);
                out.push(token.to_string());
            }
            Token::Plain => {
                let leading = first && out.is_empty() && run.is_empty();
                if !leading {
                    if let Some(len) = lexicon_phrase(&tokens[i..], &kinds[i..]) {
                        flush_run(&mut run, &mut out);
                        out.push(tokens[i..i + len].join(" "));
                        i += len;
                        continue;
                    }
                    if !run.is_empty() && starts_producer(token, kinds.get(i + 1).copied()) {
                        flush_run(&mut run, &mut out);
                    }
                }
                run.push(token);
            }
        }
        i += 1;
    }
    flush_run(&mut run, &mut out);
    out
}

fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn parse_vintage(column: &str) -> Option<VintageMark> {
    let caps = VINTAGE.captures(column.trim())?;
    match caps.name("year") {
        Some(year) => Some(validate_year(year.as_str())),
        None => Some(VintageMark::NonVintage),
    }
}

fn validate_year(text: &str) -> VintageMark {
    let latest = Utc::now().year() + 1;
    match text.parse::<i32>() {
        Ok(year) if (1900..=latest).contains(&year) => VintageMark::Year(year as u16),
        _ => VintageMark::Invalid,
    }
}

fn is_category_header(columns: &[String]) -> bool {
    let [only] = columns else {
        return false;
    };
    let normalized = normalize_name(only);
    if REGION_SET.contains(&normalized) || COUNTRY_SET.contains(&normalized) {
        return true;
    }
    only.split(['/', '|']).all(|part| {
        let cleaned = part.trim_matches(HEADER_TRIM);
        !cleaned.is_empty() && (HEADER_JA.is_match(cleaned) || HEADER_EN.is_match(cleaned))
    })
}

fn is_noise(columns: &[String]) -> bool {
    NOISE.is_match(&columns.join(" "))
}

fn is_plausible_name(text: &str) -> bool {
    text.chars().filter(|c| c.is_alphabetic()).count() >= 2
}

// ────────────────────────────────────────────────────────────────────────────
// Record assembly
// ────────────────────────────────────────────────────────────────────────────

/// Splits a line's columns into one group per price. Columns after the last
/// price stay with the last group.
fn split_on_prices(columns: Vec<Column>) -> Vec<Vec<Column>> {
    let mut groups: Vec<Vec<Column>> = Vec::new();
    let mut current: Vec<Column> = Vec::new();
    for column in columns {
        let closes = matches!(column, Column::Price(_));
        current.push(column);
        if closes {
            groups.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        match groups.last_mut() {
            Some(last) => last.extend(current),
            None => groups.push(current),
        }
    }
    groups
}

fn fill(slot: &mut Option<String>, value: String) {
    if slot.is_none() && !value.trim().is_empty() {
        *slot = Some(value);
    }
}

fn apply_column(record: &mut WineRecord, column: Column, dropped: &mut usize) {
    match column {
        Column::Text(text) => record.push_note(&text),
        Column::Price(Some(amount)) => {
            if record.price.is_none() {
                record.price = Some(amount);
            }
        }
        Column::Price(None) => *dropped += 1,
        Column::Vintage(VintageMark::Year(year)) => {
            if record.vintage.is_none() {
                record.vintage = Some(year);
            }
        }
        Column::Vintage(VintageMark::NonVintage) => {}
        Column::Vintage(VintageMark::Invalid) => *dropped += 1,
        Column::Region(v) => fill(&mut record.region, v),
        Column::Country(v) => fill(&mut record.country, v),
        Column::Producer(v) => fill(&mut record.producer, v),
        Column::Grape(v) => fill(&mut record.grape_variety, v),
        Column::Labelled(field, value) => {
            let column = match field {
                Field::Alcohol => {
                    fill(&mut record.alcohol_content, value);
                    return;
                }
                Field::Producer => Column::Producer(value),
                Field::Region => Column::Region(value),
                Field::Country => Column::Country(value),
                Field::Grape => Column::Grape(value),
                Field::Notes => Column::Text(value),
                Field::Vintage => Column::Vintage(
                    parse_vintage(&value).unwrap_or(VintageMark::Invalid),
                ),
                Field::Price => Column::Price(parse_price(&value).unwrap_or_else(|| parse_amount(&value))),
            };
            apply_column(record, column, dropped);
        }
    }
}

/// Turns one price group into a candidate, if it has a name and a signal.
///
/// `dangling` holds name-only lines seen just above in the same block; they
/// name a group whose own columns carry no text.
fn assemble(mut group: Vec<Column>, dangling: &[String], dropped: &mut usize) -> Option<WineRecord> {
    if !group.iter().any(Column::is_signal) {
        return None;
    }

    let mut used_dangling = false;
    let name = match group.iter().position(|c| matches!(c, Column::Text(_))) {
        Some(idx) => group.remove(idx).into_text(),
        None if !dangling.is_empty() => {
            used_dangling = true;
            dangling
                .iter()
                .find(|d| contains_japanese(d))
                .or_else(|| dangling.first())
                .cloned()
        }
        None if group.first().is_some_and(Column::is_lexical)
            && group.iter().skip(1).any(Column::is_signal) =>
        {
            group.remove(0).into_text()
        }
        None => None,
    };
    let name = name?;

    let (name, vintage) = split_name_vintage(&name);
    if !is_plausible_name(&name) {
        return None;
    }

    let mut record = WineRecord::new(name, RecordSource::PdfImport);
    if let Some(mark) = vintage {
        apply_column(&mut record, Column::Vintage(mark), dropped);
    }
    if used_dangling {
        let chosen = record.name.clone();
        for extra in dangling.iter().filter(|d| **d != chosen) {
            record.push_note(extra);
        }
    }
    for column in group {
        apply_column(&mut record, column, dropped);
    }
    Some(record)
}

fn split_name_vintage(name: &str) -> (String, Option<VintageMark>) {
    match NAME_VINTAGE.captures(name) {
        Some(caps) => {
            let mark = parse_vintage(&caps["vintage"]);
            (caps["name"].trim().to_string(), mark)
        }
        None => (name.trim().to_string(), None),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Lazy candidate iterator
// ────────────────────────────────────────────────────────────────────────────

/// Single-pass iterator of candidate records over one page of text.
pub struct Candidates<'a> {
    lines: std::str::Lines<'a>,
    current: Option<WineRecord>,
    ready: VecDeque<WineRecord>,
    dangling: Vec<String>,
    dropped_fields: usize,
}

/// Starts parsing `text`. Nothing is read until the iterator is polled.
pub fn parse_candidates(text: &str) -> Candidates<'_> {
    Candidates {
        lines: text.lines(),
        current: None,
        ready: VecDeque::new(),
        dangling: Vec::new(),
        dropped_fields: 0,
    }
}

impl Candidates<'_> {
    /// Fields dropped so far because they failed validation.
    pub fn dropped_fields(&self) -> usize {
        self.dropped_fields
    }

    fn flush(&mut self) {
        if let Some(record) = self.current.take() {
            self.ready.push_back(record);
        }
    }

    fn end_block(&mut self) {
        self.flush();
        self.dangling.clear();
    }

    fn consume_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            self.end_block();
            return;
        }
        let columns = split_columns(line);
        if columns.is_empty() || is_noise(&columns) {
            return;
        }
        if is_category_header(&columns) {
            self.end_block();
            return;
        }

        let classified: Vec<Column> = columns
            .iter()
            .enumerate()
            .flat_map(|(i, c)| segment(c, i == 0))
            .enumerate()
            .map(|(i, s)| classify(&s, i == 0))
            .collect();

        let mut produced: Vec<WineRecord> = Vec::new();
        let mut stray: Vec<Column> = Vec::new();
        for group in split_on_prices(classified) {
            let dangling: &[String] = if produced.is_empty() {
                &self.dangling
            } else {
                &[]
            };
            match assemble(group.clone(), dangling, &mut self.dropped_fields) {
                Some(record) => produced.push(record),
                None => match produced.last_mut() {
                    Some(last) => {
                        for column in group {
                            apply_column(last, column, &mut self.dropped_fields);
                        }
                    }
                    None => stray.extend(group),
                },
            }
        }

        if produced.is_empty() {
            self.continue_current(stray);
            return;
        }

        self.flush();
        self.dangling.clear();
        if let Some(first) = produced.first_mut() {
            for column in stray {
                apply_column(first, column, &mut self.dropped_fields);
            }
        }
        self.current = produced.pop();
        self.ready.extend(produced);
    }

    /// Folds a line without its own candidate into the open record, or keeps
    /// it as a dangling name when no record is open.
    fn continue_current(&mut self, columns: Vec<Column>) {
        match self.current.as_mut() {
            Some(current) => {
                for column in columns {
                    apply_column(current, column, &mut self.dropped_fields);
                }
            }
            None => {
                if columns.iter().any(Column::is_signal) {
                    return;
                }
                let name = columns.into_iter().find_map(|c| match c {
                    Column::Text(t) if is_plausible_name(&t) => Some(t),
                    _ => None,
                });
                if let Some(name) = name {
                    self.dangling.push(name);
                }
            }
        }
    }
}

impl Iterator for Candidates<'_> {
    type Item = WineRecord;

    fn next(&mut self) -> Option<WineRecord> {
        loop {
            if let Some(record) = self.ready.pop_front() {
                return Some(record);
            }
            match self.lines.next() {
                Some(line) => self.consume_line(line),
                None => return self.current.take(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MENU: &str = "白ワイン\nシャトー・マルゴー  ボルドー  ¥8000\n\n赤ワイン\nオーパス・ワン  ナパ  ¥15000";

    #[test]
    fn test_menu_with_category_headers() {
        let records: Vec<WineRecord> = parse_candidates(MENU).collect();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].name, "シャトー・マルゴー");
        assert_eq!(records[0].region.as_deref(), Some("ボルドー"));
        assert_eq!(records[0].price, Some(8000.0));
        assert_eq!(records[0].source, RecordSource::PdfImport);

        assert_eq!(records[1].name, "オーパス・ワン");
        assert_eq!(records[1].region.as_deref(), Some("ナパ"));
        assert_eq!(records[1].price, Some(15000.0));
    }

    #[test]
    fn test_headers_alone_produce_nothing() {
        let text = "白ワイン\n赤ワイン\n\nスパークリングワイン\n【ロゼワイン】\nRed Wine / 赤ワイン\nWINE LIST";
        assert_eq!(parse_candidates(text).count(), 0);
    }

    #[test]
    fn test_iterator_is_lazy() {
        let mut candidates = parse_candidates(MENU);
        let first = candidates.next().unwrap();
        assert_eq!(first.name, "シャトー・マルゴー");
        // The second wine sits after the blank line and has not been read yet.
        assert!(candidates.current.is_none());
        assert!(candidates.ready.is_empty());
        assert_eq!(candidates.next().unwrap().name, "オーパス・ワン");
        assert!(candidates.next().is_none());
        assert!(candidates.next().is_none());
    }

    #[test]
    fn test_full_width_price_and_yen_suffix() {
        let text = "プティ・シャブリ\u{3000}フランス\u{3000}４，５００円";
        let records: Vec<_> = parse_candidates(text).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].country.as_deref(), Some("フランス"));
        assert_eq!(records[0].price, Some(4500.0));
    }

    #[test]
    fn test_malformed_price_is_dropped_but_record_kept() {
        let text = "シャトー・マルゴー  ボルドー  ¥時価";
        let mut candidates = parse_candidates(text);
        let records: Vec<_> = candidates.by_ref().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].price, None);
        assert_eq!(records[0].region.as_deref(), Some("ボルドー"));
        assert_eq!(candidates.dropped_fields(), 1);
    }

    #[test]
    fn test_vintage_column_and_name_suffix() {
        let text = "Opus One  2018  Napa  ¥60,000\nシャトー・マルゴー 2015  ¥80000\nボニトゥラ NV  ポルトガル  ¥3200";
        let records: Vec<_> = parse_candidates(text).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].name, "Opus One");
        assert_eq!(records[0].vintage, Some(2018));
        assert_eq!(records[0].price, Some(60000.0));
        assert_eq!(records[1].name, "シャトー・マルゴー");
        assert_eq!(records[1].vintage, Some(2015));
        assert_eq!(records[2].name, "ボニトゥラ");
        assert_eq!(records[2].vintage, None);
        assert_eq!(records[2].country.as_deref(), Some("ポルトガル"));
    }

    #[test]
    fn test_implausible_vintage_is_dropped() {
        let text = "Chablis  2099  ¥4000";
        let mut candidates = parse_candidates(text);
        let record = candidates.next().unwrap();
        assert_eq!(record.vintage, None);
        assert_eq!(record.price, Some(4000.0));
        assert_eq!(candidates.dropped_fields(), 1);
    }

    #[test]
    fn test_two_prices_on_one_line_split_into_two_candidates() {
        let text = "シャブリ  ¥4000  ムルソー  ¥9000";
        let records: Vec<_> = parse_candidates(text).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "シャブリ");
        assert_eq!(records[0].price, Some(4000.0));
        assert_eq!(records[1].name, "ムルソー");
        assert_eq!(records[1].price, Some(9000.0));
    }

    #[test]
    fn test_continuation_lines_fill_fields_and_notes() {
        let text = "シャトー・マルゴー  ¥8000\n生産者：Château Margaux\n品種: カベルネ・ソーヴィニヨン\n華やかで長い余韻";
        let records: Vec<_> = parse_candidates(text).collect();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.producer.as_deref(), Some("Château Margaux"));
        assert_eq!(r.grape_variety.as_deref(), Some("カベルネ・ソーヴィニヨン"));
        assert_eq!(r.notes.as_deref(), Some("華やかで長い余韻"));
    }

    #[test]
    fn test_name_line_followed_by_detail_line() {
        let text = "CASA DE FONTE PEQUENA BONITURA NV\nボニトゥラ\nポルトガル  ¥3200";
        let records: Vec<_> = parse_candidates(text).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ボニトゥラ");
        assert_eq!(records[0].country.as_deref(), Some("ポルトガル"));
        assert_eq!(records[0].price, Some(3200.0));
        assert_eq!(
            records[0].notes.as_deref(),
            Some("CASA DE FONTE PEQUENA BONITURA NV")
        );
    }

    #[test]
    fn test_producer_marker_outside_first_column() {
        let text = "Chablis Premier Cru  Domaine Laroche  ¥9800";
        let records: Vec<_> = parse_candidates(text).collect();
        assert_eq!(records[0].name, "Chablis Premier Cru");
        assert_eq!(records[0].producer.as_deref(), Some("Domaine Laroche"));
    }

    #[test]
    fn test_varietal_named_wine() {
        let records: Vec<_> = parse_candidates("シャルドネ  ¥3000").collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "シャルドネ");
    }

    #[test]
    fn test_noise_lines_are_ignored() {
        let text = "ワインショップ銀座\nTEL 03-1234-5678\n〒104-0061 東京都中央区\nシャブリ  ¥4000\n※価格は税込です\n12";
        let records: Vec<_> = parse_candidates(text).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "シャブリ");
        assert_eq!(records[0].notes, None);
    }

    #[test]
    fn test_lines_without_signals_are_not_candidates() {
        let text = "本日のおすすめをご案内します\n\nごゆっくりお楽しみください";
        assert_eq!(parse_candidates(text).count(), 0);
    }

    #[test]
    fn test_single_spaced_lines_are_segmented() {
        let text = "Red Wine\nOpus One Napa $150\nChateau Margaux Bordeaux 2015 $300\n\nWhite Wine\nChablis Burgundy $40";
        let records: Vec<_> = parse_candidates(text).collect();
        let summary: Vec<_> = records
            .iter()
            .map(|r| (r.name.as_str(), r.region.as_deref(), r.vintage, r.price))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Opus One", Some("Napa"), None, Some(150.0)),
                ("Chateau Margaux", Some("Bordeaux"), Some(2015), Some(300.0)),
                ("Chablis", Some("Burgundy"), None, Some(40.0)),
            ]
        );
        assert!(records.iter().all(|r| r.notes.is_none()));
    }

    #[test]
    fn test_single_spaced_japanese_line_with_tax_note() {
        let records: Vec<_> = parse_candidates("シャトー・マルゴー ボルドー ¥8,000 (税込)").collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "シャトー・マルゴー");
        assert_eq!(records[0].region.as_deref(), Some("ボルドー"));
        assert_eq!(records[0].price, Some(8000.0));
    }

    #[test]
    fn test_single_spaced_producer_is_split_from_name() {
        let records: Vec<_> = parse_candidates("Chablis Premier Cru Domaine Laroche ¥9800").collect();
        assert_eq!(records[0].name, "Chablis Premier Cru");
        assert_eq!(records[0].producer.as_deref(), Some("Domaine Laroche"));

        // A bare marker right before the price belongs to the name.
        let records: Vec<_> = parse_candidates("Stags Leap Estate $45").collect();
        assert_eq!(records[0].name, "Stags Leap Estate");
        assert_eq!(records[0].producer, None);
    }

    #[test]
    fn test_spaced_currency_and_yen_suffix_are_joined() {
        let records: Vec<_> = parse_candidates("Barolo ¥ 12,000\nバローロ 12,000 円").collect();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.price == Some(12000.0)));
        assert_eq!(records[1].name, "バローロ");
    }

    #[test]
    fn test_prose_continuation_keeps_lexicon_words() {
        let text = "Chablis Burgundy $40\nnotes of cherry from Napa\nfamily estate since 1998";
        let records: Vec<_> = parse_candidates(text).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].region.as_deref(), Some("Burgundy"));
        assert_eq!(
            records[0].notes.as_deref(),
            Some("notes of cherry from Napa | family estate since 1998")
        );
    }

    #[test]
    fn test_alcohol_from_column_and_label() {
        let records: Vec<_> = parse_candidates("Chablis  12.5%  ¥4000").collect();
        assert_eq!(records[0].alcohol_content.as_deref(), Some("12.5%"));
        assert_eq!(records[0].price, Some(4000.0));

        let records: Vec<_> = parse_candidates("Chablis Burgundy 13 % $40").collect();
        assert_eq!(records[0].alcohol_content.as_deref(), Some("13 %"));
        assert_eq!(records[0].region.as_deref(), Some("Burgundy"));

        let text = "シャブリ  ¥4000\nアルコール度数：12.5%\nAlcohol: 13%";
        let records: Vec<_> = parse_candidates(text).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].alcohol_content.as_deref(), Some("12.5%"));
    }

    #[test]
    fn test_dangling_names_other_than_the_chosen_one_become_notes() {
        let text = "Bonitura\nボニトゥラ\nポルトガル  ¥3200";
        let records: Vec<_> = parse_candidates(text).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ボニトゥラ");
        assert_eq!(records[0].notes.as_deref(), Some("Bonitura"));
    }

    #[test]
    fn test_parse_price_variants() {
        assert_eq!(parse_price("¥8,000"), Some(Some(8000.0)));
        assert_eq!(parse_price("¥8,000(税込)"), Some(Some(8000.0)));
        assert_eq!(parse_price("8000円"), Some(Some(8000.0)));
        assert_eq!(parse_price("€12.50"), Some(Some(12.5)));
        assert_eq!(parse_price("¥ASK"), Some(None));
        assert_eq!(parse_price("ボルドー"), None);
    }
}
