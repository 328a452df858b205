use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization as _;

use crate::catalog::{InputUrlRecord, split_menu_path};
use crate::preprocess::PreprocessedRecord;

pub const START_DATE: &str = "1900-01-01";
pub const END_DATE: &str = "2999-12-31";
pub const NEW_STATUS: &str = "new";
pub const UNTITLED: &str = "제목 없음";

const EXCLUDED_SECTION_IDS: [&str; 2] = ["cfmClHeader", "cfmClFooter"];

static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("static img selector"));
static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static link selector"));

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRef {
    pub alt: String,
    pub src: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkRef {
    pub desc: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<LinkRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputRecord {
    #[serde(rename = "docId")]
    pub doc_id: String,
    pub url: String,
    #[serde(rename = "murl")]
    pub mobile_url: String,
    pub hierarchy: Vec<String>,
    pub title: String,
    pub text: String,
    pub startdate: String,
    pub enddate: String,
    pub metadata: Metadata,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobileUrlRule {
    pub domain: String,
}

impl Default for MobileUrlRule {
    fn default() -> Self {
        Self {
            domain: "kt.com".to_string(),
        }
    }
}

impl MobileUrlRule {
    /// `event.<domain>` becomes `m.<domain>`; any other single-label
    /// `<sub>.<domain>` becomes `m.<sub>.<domain>`. Everything else is
    /// returned unchanged.
    pub fn derive(&self, pc_url: &str) -> String {
        let Ok(mut url) = url::Url::parse(pc_url) else {
            return pc_url.to_string();
        };
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return pc_url.to_string();
        };
        let Some(sub) = host
            .strip_suffix(self.domain.as_str())
            .and_then(|rest| rest.strip_suffix('.'))
        else {
            return pc_url.to_string();
        };
        if sub.is_empty() || sub.contains('.') || sub == "m" {
            return pc_url.to_string();
        }
        let mobile_host = if sub == "event" {
            format!("m.{}", self.domain)
        } else {
            format!("m.{sub}.{}", self.domain)
        };
        if url.set_host(Some(&mobile_host)).is_err() {
            return pc_url.to_string();
        }
        url.to_string()
    }
}

fn nfc(s: &str) -> String {
    s.nfc().collect()
}

fn non_blank(s: &str) -> Option<&str> {
    Some(s).filter(|s| !s.trim().is_empty())
}

fn is_present(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

pub fn split(
    mut record: PreprocessedRecord,
    input: &InputUrlRecord,
    mobile: &MobileUrlRule,
) -> Vec<PreprocessedRecord> {
    let Some(children) = record.children.take() else {
        return vec![record];
    };
    let parent_hierarchy = if record.hierarchy.is_empty() {
        input.hierarchy()
    } else {
        record.hierarchy.clone()
    };

    children
        .items
        .into_iter()
        .enumerate()
        .map(|(i, child)| {
            let hint = children.menus.get(i);
            let menu_parts = hint.map(|h| split_menu_path(&h.menu)).unwrap_or_default();
            let (hierarchy, title) = if menu_parts.is_empty() {
                (parent_hierarchy.clone(), child.title.clone())
            } else {
                let title = menu_parts.last().cloned().unwrap_or_default();
                (menu_parts, title)
            };

            let url = hint
                .and_then(|h| h.url.as_deref())
                .and_then(non_blank)
                .or_else(|| non_blank(&child.url))
                .unwrap_or(&input.pc_url)
                .to_string();
            let mobile_url = hint
                .and_then(|h| h.mobile_url.as_deref())
                .and_then(non_blank)
                .or_else(|| child.mobile_url.as_deref().and_then(non_blank))
                .map(str::to_string)
                .unwrap_or_else(|| mobile.derive(&url));

            PreprocessedRecord {
                url,
                mobile_url: Some(mobile_url),
                title,
                hierarchy,
                handler_name: record.handler_name.clone(),
                is_handler_data: true,
                children: None,
                ..child
            }
        })
        .collect()
}

pub fn menu_path_for(record: &PreprocessedRecord, input: &InputUrlRecord) -> String {
    let segments: Vec<&str> = record
        .hierarchy
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        input.menu_path.clone()
    } else {
        segments.join("^")
    }
}

fn derive_title(record: &PreprocessedRecord, input: &InputUrlRecord) -> String {
    if record.is_handler_data {
        if let Some(title) = non_blank(&record.title) {
            return title.trim().to_string();
        }
    }
    if !input.menu_path.is_empty() {
        if let Some(last) = input.menu_path.rsplit('^').next().and_then(non_blank) {
            return last.trim().to_string();
        }
    }
    non_blank(&record.title)
        .map(|t| t.trim().to_string())
        .unwrap_or_else(|| UNTITLED.to_string())
}

pub fn build(
    record: &PreprocessedRecord,
    input: &InputUrlRecord,
    document_id: Option<&str>,
) -> OutputRecord {
    let hierarchy = if record.hierarchy.is_empty() {
        input.hierarchy()
    } else {
        record.hierarchy.clone()
    };
    let hierarchy = hierarchy
        .iter()
        .filter(|item| !item.is_empty())
        .map(|item| nfc(item))
        .collect();

    let url = nfc(&record.url);
    let mobile_url = record
        .mobile_url
        .as_deref()
        .and_then(non_blank)
        .or_else(|| input.mobile_url.as_deref().and_then(non_blank))
        .map(nfc)
        .unwrap_or_default();

    let mut metadata = extract_metadata(&record.html, &url);
    if let Some(recommendations) = record.recommendations.as_ref().filter(|v| is_present(v)) {
        metadata.recommendations = Some(recommendations.clone());
    }

    OutputRecord {
        doc_id: document_id.map(nfc).unwrap_or_default(),
        url,
        mobile_url,
        hierarchy,
        title: nfc(&derive_title(record, input)),
        text: nfc(&record.text).replace('\n', "\\n"),
        startdate: START_DATE.to_string(),
        enddate: END_DATE.to_string(),
        metadata,
        status: NEW_STATUS.to_string(),
    }
}

fn in_excluded_section(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| {
            ancestor
                .value()
                .id()
                .is_some_and(|id| EXCLUDED_SECTION_IDS.contains(&id))
        })
}

fn resolve(base: Option<&url::Url>, href: &str) -> String {
    base.and_then(|base| base.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}

/// Images with meaningful alt text and outbound links found in `html`,
/// skipping the site-wide header and footer.
pub fn extract_metadata(html: &str, base_url: &str) -> Metadata {
    let mut metadata = Metadata::default();
    if html.trim().is_empty() {
        return metadata;
    }
    let base = url::Url::parse(base_url).ok();
    let document = Html::parse_fragment(html);

    for img in document.select(&IMG_SELECTOR) {
        if in_excluded_section(&img) {
            continue;
        }
        let alt = img.value().attr("alt").unwrap_or_default().trim();
        if alt.chars().count() <= 2 {
            continue;
        }
        let src = img.value().attr("src").unwrap_or_default();
        let src = if !src.is_empty() && !src.starts_with("http") {
            resolve(base.as_ref(), src)
        } else {
            src.to_string()
        };
        metadata.images.push(ImageRef {
            alt: nfc(alt),
            src: nfc(&src),
        });
    }

    let mut seen = HashSet::new();
    for link in document.select(&LINK_SELECTOR) {
        if in_excluded_section(&link) {
            continue;
        }
        let text: String = link.text().collect();
        let desc = text.trim();
        if desc.chars().count() < 2 {
            continue;
        }
        let href = link.value().attr("href").unwrap_or_default();
        let url = if href.starts_with("http") {
            href.to_string()
        } else if href.starts_with('/') {
            resolve(base.as_ref(), href)
        } else {
            continue;
        };
        if seen.insert(url.clone()) {
            metadata.urls.push(LinkRef {
                desc: nfc(desc),
                url: nfc(&url),
            });
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::MenuHint;
    use crate::preprocess::Children;

    fn single(text: &str, html: &str) -> PreprocessedRecord {
        PreprocessedRecord {
            url: "https://ex.test/a".to_string(),
            title: "A".to_string(),
            text: text.to_string(),
            html: html.to_string(),
            ..PreprocessedRecord::default()
        }
    }

    #[test]
    fn single_record_takes_title_from_menu_path_and_escapes_newlines() {
        let input = InputUrlRecord::new(1, "https://ex.test/a", "X^Y");
        let out = build(&single("hi\nthere", "<p>hi</p>"), &input, Some("ktcom_1"));

        assert_eq!(out.doc_id, "ktcom_1");
        assert_eq!(out.title, "Y");
        assert_eq!(out.hierarchy, vec!["X", "Y"]);
        assert_eq!(out.text, "hi\\nthere");
        assert!(!out.text.contains('\n'));
        assert_eq!(out.mobile_url, "");
        assert_eq!(out.metadata, Metadata::default());

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["docId"], "ktcom_1");
        assert_eq!(json["murl"], "");
        assert_eq!(json["startdate"], START_DATE);
        assert_eq!(json["enddate"], END_DATE);
        assert_eq!(json["status"], "new");
        assert_eq!(json["metadata"], serde_json::json!({}));
    }

    #[test]
    fn title_falls_back_to_page_title_then_placeholder() {
        let input = InputUrlRecord::new(1, "https://ex.test/a", "");
        assert_eq!(build(&single("x", ""), &input, None).title, "A");

        let untitled = PreprocessedRecord {
            title: "  ".to_string(),
            ..single("x", "")
        };
        let out = build(&untitled, &input, None);
        assert_eq!(out.title, UNTITLED);
        assert_eq!(out.doc_id, "");
        assert!(out.hierarchy.is_empty());
    }

    #[test]
    fn output_strings_are_nfc() {
        // "한" as decomposed jamo.
        let decomposed = "\u{1112}\u{1161}\u{11AB}";
        let input = InputUrlRecord::new(1, "https://ex.test/a", format!("상품^{decomposed}"));
        let out = build(&single(decomposed, ""), &input, None);
        assert_eq!(out.title, "한");
        assert_eq!(out.text, "한");
        assert_eq!(out.hierarchy, vec!["상품", "한"]);
    }

    #[test]
    fn metadata_skips_header_footer_short_alts_and_duplicate_links() {
        let html = r##"
            <div id="cfmClHeader"><img alt="global logo" src="/logo.png"><a href="/home">홈으로</a></div>
            <img alt="요금제 안내 배너" src="/img/plan.png">
            <img alt="ab" src="/img/tiny.png">
            <img alt="external banner" src="https://cdn.ex.test/b.png">
            <a href="/plans/5g">5G 요금제</a>
            <a href="https://ex.test/plans/5g">다시 5G</a>
            <a href="javascript:void(0)">열기</a>
            <a href="#top">맨 위로</a>
            <a href="/x">x</a>
            <div id="cfmClFooter"><a href="/terms">이용약관</a></div>
        "##;
        let meta = extract_metadata(html, "https://ex.test/shop/page");
        assert_eq!(
            meta.images,
            vec![
                ImageRef {
                    alt: "요금제 안내 배너".to_string(),
                    src: "https://ex.test/img/plan.png".to_string(),
                },
                ImageRef {
                    alt: "external banner".to_string(),
                    src: "https://cdn.ex.test/b.png".to_string(),
                },
            ]
        );
        assert_eq!(
            meta.urls,
            vec![LinkRef {
                desc: "5G 요금제".to_string(),
                url: "https://ex.test/plans/5g".to_string(),
            }]
        );
    }

    #[test]
    fn empty_recommendations_are_not_emitted() {
        let input = InputUrlRecord::new(1, "https://ex.test/a", "X");
        let with_empty = PreprocessedRecord {
            recommendations: Some(serde_json::json!([])),
            ..single("x", "")
        };
        assert!(build(&with_empty, &input, None).metadata.recommendations.is_none());

        let with_items = PreprocessedRecord {
            recommendations: Some(serde_json::json!([{"name": "plan"}])),
            ..single("x", "")
        };
        let out = build(&with_items, &input, None);
        assert_eq!(
            serde_json::to_value(&out.metadata).unwrap(),
            serde_json::json!({"recommendations": [{"name": "plan"}]})
        );
    }

    #[test]
    fn mobile_rule_rewrites_known_hosts() {
        let rule = MobileUrlRule::default();
        assert_eq!(
            rule.derive("https://event.kt.com/html/event/list.html?x=1"),
            "https://m.kt.com/html/event/list.html?x=1"
        );
        assert_eq!(rule.derive("https://shop.kt.com/a"), "https://m.shop.kt.com/a");
        assert_eq!(rule.derive("https://product.kt.com/b"), "https://m.product.kt.com/b");
        assert_eq!(rule.derive("https://m.shop.kt.com/a"), "https://m.shop.kt.com/a");
        assert_eq!(rule.derive("https://ex.test/a"), "https://ex.test/a");
        assert_eq!(rule.derive("not a url"), "not a url");
    }

    fn multi(items: Vec<PreprocessedRecord>, menus: Vec<MenuHint>) -> PreprocessedRecord {
        PreprocessedRecord {
            url: "https://event.kt.com/list".to_string(),
            handler_name: Some("event_main".to_string()),
            children: Some(Children { items, menus }),
            ..PreprocessedRecord::default()
        }
    }

    fn child(title: &str, text: &str) -> PreprocessedRecord {
        PreprocessedRecord {
            title: title.to_string(),
            text: text.to_string(),
            is_handler_data: true,
            ..PreprocessedRecord::default()
        }
    }

    #[test]
    fn split_uses_menu_hints_positionally() {
        let input = InputUrlRecord::new(9, "https://event.kt.com/list", "A^B");
        let record = multi(
            vec![child("t1", "m1"), child("t2", "m2")],
            vec![
                MenuHint {
                    menu: "A^B^C1".to_string(),
                    url: Some("u1".to_string()),
                    mobile_url: Some("mu1".to_string()),
                },
                MenuHint {
                    menu: "A^B^C2".to_string(),
                    url: Some("u2".to_string()),
                    mobile_url: Some("mu2".to_string()),
                },
            ],
        );
        let parts = split(record, &input, &MobileUrlRule::default());
        assert_eq!(parts.len(), 2);
        let outs: Vec<OutputRecord> = parts.iter().map(|p| build(p, &input, None)).collect();
        assert_eq!(outs[0].title, "C1");
        assert_eq!(outs[1].title, "C2");
        assert_eq!(outs[0].hierarchy, vec!["A", "B", "C1"]);
        assert_eq!(outs[1].hierarchy, vec!["A", "B", "C2"]);
        assert_eq!((outs[0].url.as_str(), outs[0].mobile_url.as_str()), ("u1", "mu1"));
        assert_eq!((outs[1].url.as_str(), outs[1].mobile_url.as_str()), ("u2", "mu2"));
        assert_eq!(outs[1].text, "m2");
        assert_eq!(menu_path_for(&parts[0], &input), "A^B^C1");
    }

    #[test]
    fn split_children_without_hint_inherit_parent_hierarchy() {
        let input = InputUrlRecord::new(9, "https://event.kt.com/list", "A^B");
        let mut with_url = child("own title", "m2");
        with_url.url = "https://event.kt.com/detail/2".to_string();
        let record = multi(
            vec![child("t1", "m1"), with_url],
            vec![MenuHint {
                menu: "A^B^C1".to_string(),
                url: None,
                mobile_url: None,
            }],
        );
        let parts = split(record, &input, &MobileUrlRule::default());

        assert_eq!(parts[0].url, "https://event.kt.com/list");
        assert_eq!(parts[0].mobile_url.as_deref(), Some("https://m.kt.com/list"));

        assert_eq!(parts[1].hierarchy, vec!["A", "B"]);
        assert_eq!(parts[1].url, "https://event.kt.com/detail/2");
        let out = build(&parts[1], &input, None);
        assert_eq!(out.title, "own title");
        assert_eq!(out.mobile_url, "https://m.kt.com/detail/2");
        assert_eq!(parts[1].handler_name.as_deref(), Some("event_main"));
    }

    #[test]
    fn single_records_pass_through_split() {
        let input = InputUrlRecord::new(1, "https://ex.test/a", "X^Y");
        let parts = split(single("hi", ""), &input, &MobileUrlRule::default());
        assert_eq!(parts.len(), 1);
        assert_eq!(menu_path_for(&parts[0], &input), "X^Y");
    }
}
