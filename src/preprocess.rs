use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::app::dispatcher::CrawledPage;
use crate::catalog::InputUrlRecord;
use crate::handlers::{HandlerOutput, MenuHint};

const TABLE_PLACEHOLDER: &str = "[TABLE]";

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static preprocess regex"))
        .collect()
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static preprocess regex")
}

static CSS_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\.[\w-]+ \{[^}]+\}",
        r"#[\w-]+ \.[\w-]+ \{[^}]+\}",
        r"\.[\w-]+ [\w-]+ \{[^}]+\}",
        r"\.[\w-]+ li \{[^}]+\}",
    ])
});

static NOTICE_BREADCRUMBS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?s)(?:\[HOME\]|HOME).*?\n",
        r"(?s)\[(?:이전글|다음글)\\\\.*?\]\(.*?\)|\[목록\]\(.*?\)",
        r"(?s)- (?:이전글|다음글) \[.*?\]\(.*?\)",
    ])
});

static NOTICE_NAVIGATION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r#"(?m)\[목록\].*?#\)"#,
        r#"(?m)^목록$"#,
        r#"(?m)\[상세보기.*?\].*?".*?"\)"#,
        r#"(?m)\[상세보기.*?\].*?\)"#,
        r#"(?m)\[.*?바로가기.*?\].*?".*?"\)"#,
        r#"(?m)\[.*?바로가기.*?\].*?\)"#,
        r#"(?m)- \[가이드 전체\].*?\n"#,
        r#"(?m)- \[.*?\]\(.*?"현재탭"\).*?\n"#,
        r#"(?m)^\s*-\s*\[.*?\]\(.*?\)\s*$\n*"#,
        r#"(?m)\[이전 탭.*?\].*?\n"#,
        r#"(?m)\[다음 탭.*?\].*?\n"#,
        r#"(?m)^\s*-\s*\[.*?\].*?\n"#,
        r#"(?m)^\s*\[.*?\].*?"현재탭"\).*?\n"#,
        r#"(?m)\[\s*이전글\\*.*?\]\(.*?\)"#,
        r#"(?m)\[\s*다음글\\*.*?\]\(.*?\)"#,
        r#"(?m)\[\s*목록\s*\]\(.*?\)"#,
        r#"(?m)-\s*이전글\s*\[.*?\]\(.*?\)"#,
        r#"(?m)-\s*다음글\s*\[.*?\]\(.*?\)"#,
        r#"(?m)이전글\s*이전글이\s*없습니다\.*\s*\n*"#,
        r#"(?m)다음글\s*다음글이\s*없습니다\.*\s*\n*"#,
    ])
});

static BR_TAG: LazyLock<Regex> = LazyLock::new(|| regex(r"<br\s*/?>|<BR\s*/?>"));
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| regex(r"<[^>]+>"));
static ESCAPED_BRACKETS: LazyLock<Regex> = LazyLock::new(|| regex(r"\\\[(.*?)\\\]"));
static ESCAPED_STAR: LazyLock<Regex> = LazyLock::new(|| regex(r"\\\*"));
static BACKSLASH_RUN: LazyLock<Regex> = LazyLock::new(|| regex(r"\\{2,}"));
static ANY_BACKSLASH: LazyLock<Regex> = LazyLock::new(|| regex(r"\\+"));
static NOTICE_IMAGE: LazyLock<Regex> = LazyLock::new(|| regex(r"!\[(.*?)\]\((.*?)\)"));
static INFO_IMAGE: LazyLock<Regex> = LazyLock::new(|| regex(r"!\[([^\]]*)\]\([^)]+\)"));
static LINK_OR_IMAGE: LazyLock<Regex> = LazyLock::new(|| regex(r"(!?)\[([^\]]+)\]\([^)]+\)"));
static LINK: LazyLock<Regex> = LazyLock::new(|| regex(r"\[([^\]]+)\]\([^)]+\)"));
static JAVASCRIPT_LINK: LazyLock<Regex> =
    LazyLock::new(|| regex(r"\[([^\]]*)\]\(javascript:[^)]*\)"));
static EMPTY_LINK: LazyLock<Regex> = LazyLock::new(|| regex(r"\[\]\(\)"));
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| regex(r"\n{3,}"));
static TRAILING_SPACES: LazyLock<Regex> = LazyLock::new(|| regex(r"(?m) +$"));
static BULLET: LazyLock<Regex> = LazyLock::new(|| regex(r"(?m)^\s*-\s*"));

static INFO_WIDGETS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"자막\s*열기\s*자막\s*접기",
        r"(?m)^\s*[=-]{3,}\s*$",
        r"(?mi)^(?:_?닫기_?|주문하기|이전\s*다음|확인|동의|검색|레이어\s*닫기)$",
    ])
});

static GLOSSARY: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (regex(r"피해\s*사례"), "피해사례"),
        (regex(r"주의\s*사항"), "주의사항"),
        (regex(r"대응\s*방안"), "대응방안"),
    ]
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessType {
    Notice,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoticeRules {
    pub path_keywords: Vec<String>,
    pub content_markers: Vec<String>,
}

impl Default for NoticeRules {
    fn default() -> Self {
        Self {
            path_keywords: [
                "공지사항",
                "통신서비스중단작업공지",
                "통신사기주의보",
                "공연예매메인/공지사항",
                "공지/이용안내",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            content_markers: [
                "# 통신사기주의보",
                "### 통신서비스 중단/작업 공지",
                "### 공지사항",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

impl NoticeRules {
    pub fn classify(&self, markdown: &str, menu_path: Option<&str>) -> ProcessType {
        let by_path = menu_path.is_some_and(|path| {
            self.path_keywords
                .iter()
                .any(|keyword| path.contains(keyword.as_str()))
        });
        let by_content = self
            .content_markers
            .iter()
            .any(|marker| markdown.contains(marker.as_str()));
        if by_path || by_content {
            ProcessType::Notice
        } else {
            ProcessType::Info
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PreprocessedRecord {
    pub url: String,
    pub mobile_url: Option<String>,
    pub title: String,
    pub text: String,
    pub html: String,
    /// Handler-supplied hierarchy; empty means "derive from the catalog row".
    pub hierarchy: Vec<String>,
    pub process_type: Option<ProcessType>,
    pub handler_name: Option<String>,
    pub recommendations: Option<serde_json::Value>,
    pub is_handler_data: bool,
    pub children: Option<Children>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Children {
    pub items: Vec<PreprocessedRecord>,
    pub menus: Vec<MenuHint>,
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    rules: NoticeRules,
}

impl Preprocessor {
    pub fn new(rules: NoticeRules) -> Self {
        Self { rules }
    }

    /// `(markdown, menu_path, html) -> (text, process type)`. When the
    /// markdown is empty the html is converted instead.
    pub fn normalize(
        &self,
        markdown: &str,
        menu_path: Option<&str>,
        html: &str,
    ) -> (String, ProcessType) {
        let converted;
        let markdown = if markdown.trim().is_empty() {
            if html.trim().is_empty() {
                return (String::new(), ProcessType::Info);
            }
            converted = html2md::parse_html(html);
            converted.as_str()
        } else {
            markdown
        };

        let process_type = self.rules.classify(markdown, menu_path);
        let text = match process_type {
            ProcessType::Notice => clean_notice(markdown),
            ProcessType::Info => clean_info(markdown),
        };
        tracing::debug!(?process_type, len = text.len(), "normalized markdown");
        (text, process_type)
    }

    pub fn preprocess(&self, page: &CrawledPage, input: &InputUrlRecord) -> PreprocessedRecord {
        let menu_path = Some(input.menu_path.as_str()).filter(|p| !p.is_empty());
        let base = PreprocessedRecord {
            url: page.url.clone(),
            mobile_url: page.mobile_url.clone(),
            handler_name: page.handler_name.clone(),
            ..PreprocessedRecord::default()
        };

        match &page.output {
            HandlerOutput::Single(single) => {
                let (text, process_type) =
                    self.normalize(&single.markdown, menu_path, &single.html);
                PreprocessedRecord {
                    title: single.title.clone(),
                    text,
                    html: single.html.clone(),
                    hierarchy: single.hierarchy.clone().unwrap_or_default(),
                    process_type: Some(process_type),
                    ..base
                }
            }
            HandlerOutput::Multi { datas, menus } => {
                let items = datas
                    .iter()
                    .map(|data| {
                        let (text, process_type) =
                            self.normalize(&data.markdown, menu_path, &data.html);
                        PreprocessedRecord {
                            url: data.url.clone().unwrap_or_default(),
                            mobile_url: data.mobile_url.clone(),
                            title: data.title.clone(),
                            text,
                            html: data.html.clone(),
                            process_type: Some(process_type),
                            recommendations: data.recommendations.clone(),
                            is_handler_data: true,
                            ..PreprocessedRecord::default()
                        }
                    })
                    .collect();
                PreprocessedRecord {
                    children: Some(Children {
                        items,
                        menus: menus.clone(),
                    }),
                    ..base
                }
            }
        }
    }
}

fn replace_each(text: String, patterns: &[Regex], with: &str) -> String {
    patterns.iter().fold(text, |acc, re| re.replace_all(&acc, with).into_owned())
}

fn is_table_row(line: &str) -> bool {
    let line = line.trim();
    line.len() >= 2 && line.starts_with('|') && line.ends_with('|')
}

fn is_table_separator(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('|')
        && line.contains('-')
        && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn extract_tables(text: &str) -> (String, Vec<String>) {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut kept: Vec<String> = Vec::with_capacity(lines.len());
    let mut tables = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if is_table_row(lines[i]) && lines.get(i + 1).is_some_and(|l| is_table_separator(l)) {
            let mut table = vec![lines[i].trim().to_string(), lines[i + 1].trim().to_string()];
            let mut j = i + 2;
            while j < lines.len() && is_table_row(lines[j]) {
                table.push(LINK.replace_all(lines[j].trim(), "${1}").into_owned());
                j += 1;
            }
            if table.len() >= 3 {
                tables.push(table.join("\n"));
                kept.push(TABLE_PLACEHOLDER.to_string());
                i = j;
                continue;
            }
        }
        kept.push(lines[i].to_string());
        i += 1;
    }
    (kept.join("\n"), tables)
}

fn restore_tables(mut text: String, tables: Vec<String>) -> String {
    for table in tables {
        if text.contains(TABLE_PLACEHOLDER) {
            text = text.replacen(TABLE_PLACEHOLDER, &table, 1);
        } else {
            if !text.ends_with("\n\n") {
                text = format!("{}\n\n", text.trim_end());
            }
            text.push_str(&table);
        }
    }
    text
}

pub fn clean_notice(text: &str) -> String {
    let text = replace_each(text.to_string(), &CSS_RULES, "");
    let (text, tables) = extract_tables(&text);

    let text = replace_each(text, &NOTICE_BREADCRUMBS, "");
    let text = BR_TAG.replace_all(&text, " ");
    let text = HTML_TAG.replace_all(&text, "");
    let text = ESCAPED_BRACKETS.replace_all(&text, "[${1}]");
    let text = ESCAPED_STAR.replace_all(&text, "*");
    let text = BACKSLASH_RUN.replace_all(&text, "");
    let text = NOTICE_IMAGE.replace_all(&text, |caps: &Captures| {
        if caps[1].trim().is_empty() {
            String::new()
        } else {
            format!("![{}]({})", &caps[1], &caps[2])
        }
    });
    let text = LINK_OR_IMAGE.replace_all(&text, |caps: &Captures| {
        if caps[1].is_empty() {
            caps[2].to_string()
        } else {
            caps[0].to_string()
        }
    });
    let text = replace_each(text.into_owned(), &NOTICE_NAVIGATION, "");

    let text = BLANK_RUN.replace_all(&text, "\n\n");
    let text = TRAILING_SPACES.replace_all(&text, "");
    let text = restore_tables(text.into_owned(), tables);
    BLANK_RUN.replace_all(&text, "\n\n").trim().to_string()
}

pub fn clean_info(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = ANY_BACKSLASH.replace_all(text, "");
    let text = INFO_IMAGE.replace_all(&text, |caps: &Captures| {
        if caps[1].trim().is_empty() {
            String::new()
        } else {
            caps[1].to_string()
        }
    });
    let text = JAVASCRIPT_LINK.replace_all(&text, "${1}");
    let text = LINK.replace_all(&text, "${1}");
    let text = EMPTY_LINK.replace_all(&text, "");
    let text = HTML_TAG.replace_all(&text, "");
    let text = replace_each(text.into_owned(), &INFO_WIDGETS, "");

    let text = BLANK_RUN.replace_all(&text, "\n\n");
    let text = TRAILING_SPACES.replace_all(&text, "");
    let mut text = BULLET.replace_all(&text, "- ").into_owned();
    for (re, canonical) in GLOSSARY.iter() {
        text = re.replace_all(&text, *canonical).into_owned();
    }
    text.trim().to_string()
}
