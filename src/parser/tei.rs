use chrono::Datelike;
use regex::Regex;
use tracing::{debug, warn};

use super::tree::DocNode;
use super::{PaperInfo, PaperSection};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";
pub const UNTITLED_SECTION: &str = "Untitled Section";

/// 按顺序尝试候选访问器，取第一个非空结果
fn first_of(candidates: &[&dyn Fn() -> Option<String>]) -> Option<String> {
    candidates
        .iter()
        .find_map(|c| c().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

/// 从文档树头部解析论文元数据
///
/// 每个字段都走一条候选路径链，全部落空时使用文档化的默认值，
/// 保证PaperInfo永远是完整填充的。
pub fn parse_header(root: &DocNode) -> PaperInfo {
    let header = root.first("teiHeader").unwrap_or(root);

    let title = first_of(&[
        &|| {
            root.find(&["teiHeader", "fileDesc", "titleStmt", "title"])
                .map(|n| n.text_content())
        },
        &|| {
            root.find(&[
                "teiHeader",
                "fileDesc",
                "sourceDesc",
                "biblStruct",
                "analytic",
                "title",
            ])
            .map(|n| n.text_content())
        },
        &|| {
            header
                .descendants("title")
                .first()
                .map(|n| n.text_content())
        },
    ])
    .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let authors = normalize_authors(
        header
            .descendants("author")
            .iter()
            .map(|a| person_name(a))
            .collect(),
    );

    let abstract_text = first_of(&[
        &|| {
            root.find(&["teiHeader", "profileDesc", "abstract"])
                .map(|n| n.text_content())
        },
        &|| {
            header
                .descendants("abstract")
                .first()
                .map(|n| n.text_content())
        },
    ])
    .unwrap_or_default();

    let year = first_of(&[
        &|| {
            header
                .descendants("date")
                .iter()
                .find_map(|d| d.attr("when").map(str::to_string))
        },
        &|| {
            header
                .descendants("date")
                .first()
                .map(|n| n.text_content())
        },
    ])
    .and_then(|s| extract_year(&s))
    .unwrap_or_else(|| chrono::Local::now().year());

    let doi = header
        .descendants("idno")
        .iter()
        .find(|n| n.attr("type").map(|t| t.eq_ignore_ascii_case("doi")) == Some(true))
        .map(|n| n.text_content())
        .filter(|s| !s.is_empty());

    let keywords: Vec<String> = header
        .descendants("keywords")
        .iter()
        .flat_map(|k| k.descendants("term"))
        .map(|t| t.text_content())
        .filter(|s| !s.is_empty())
        .collect();

    let venue = root
        .find(&["teiHeader", "fileDesc", "sourceDesc", "biblStruct", "monogr", "title"])
        .map(|n| n.text_content())
        .filter(|s| !s.is_empty() && *s != title);

    debug!("元数据解析完成: {}", title);

    PaperInfo {
        title,
        authors,
        abstract_text,
        year,
        doi,
        keywords: if keywords.is_empty() { None } else { Some(keywords) },
        venue,
    }
}

/// 解析作者节点，兼容三种形状：结构化姓名列表、单个结构化姓名、裸字符串
pub fn person_name(node: &DocNode) -> String {
    let pers = node.first("persName").unwrap_or(node);
    let mut parts: Vec<String> = pers
        .children_named("forename")
        .iter()
        .map(|f| f.text_content())
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(surname) = pers.first("surname") {
        let s = surname.text_content();
        if !s.is_empty() {
            parts.push(s);
        }
    }
    if parts.is_empty() {
        // 无结构化姓名时退回裸文本
        return normalize_name(&node.text_content());
    }
    normalize_name(&parts.join(" "))
}

fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 过滤空名并在列表为空时替换为占位作者。对已规范化的输入是幂等的。
pub fn normalize_authors(names: Vec<String>) -> Vec<String> {
    let filtered: Vec<String> = names
        .into_iter()
        .map(|n| normalize_name(&n))
        .filter(|n| !n.is_empty())
        .collect();
    if filtered.is_empty() {
        vec![UNKNOWN_AUTHOR.to_string()]
    } else {
        filtered
    }
}

pub fn extract_year(text: &str) -> Option<i32> {
    let re = Regex::new(r"\b(\d{4})\b").expect("valid regex");
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// 递归遍历容器节点生成章节森林
///
/// 章节id按 sec-1 / sec-1.2 的层级方案生成，level等于树深度。
/// 没有任何容器的文档合成一个兜底章节，保证章节列表永远非空。
pub fn parse_sections(root: &DocNode) -> Vec<PaperSection> {
    let base = body_node(root);
    let divs = base.children_named("div");

    if divs.is_empty() {
        warn!("文档中没有章节容器，合成兜底章节");
        let salvaged = base.text_content();
        return vec![PaperSection {
            id: "sec-1".to_string(),
            level: 1,
            title: "Content".to_string(),
            content: salvaged,
            subsections: Vec::new(),
        }];
    }

    divs.iter()
        .enumerate()
        .map(|(i, div)| walk_div(div, None, i, 1))
        .collect()
}

fn body_node(root: &DocNode) -> &DocNode {
    root.find(&["text", "body"])
        .or_else(|| root.first("body"))
        .unwrap_or(root)
}

fn walk_div(div: &DocNode, parent_id: Option<&str>, index: usize, level: u8) -> PaperSection {
    let id = match parent_id {
        Some(pid) => format!("{}.{}", pid, index + 1),
        None => format!("sec-{}", index + 1),
    };

    let title = div
        .first("head")
        .map(|h| h.text_content())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED_SECTION.to_string());

    let content = div
        .children_named("p")
        .iter()
        .map(|p| p.text_content())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let subsections = div
        .children_named("div")
        .iter()
        .enumerate()
        .map(|(i, child)| walk_div(child, Some(&id), i, level + 1))
        .collect();

    PaperSection {
        id,
        level,
        title,
        content,
        subsections,
    }
}

/// 扁平化 (章节id, 容器节点) 对，供分类器按归属章节扫描
///
/// 首个元素是body本身，承接游离在任何div之外的节点，默认归入第一个章节。
pub fn div_scopes<'a>(root: &'a DocNode) -> Vec<(String, &'a DocNode)> {
    let base = body_node(root);
    let mut out: Vec<(String, &'a DocNode)> = vec![("sec-1".to_string(), base)];

    fn recurse<'a>(node: &'a DocNode, parent_id: Option<&str>, out: &mut Vec<(String, &'a DocNode)>) {
        for (i, div) in node.children_named("div").into_iter().enumerate() {
            let id = match parent_id {
                Some(pid) => format!("{}.{}", pid, i + 1),
                None => format!("sec-{}", i + 1),
            };
            out.push((id.clone(), div));
            recurse(div, Some(&id), out);
        }
    }

    recurse(base, None, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> DocNode {
        DocNode::parse_xml(xml).unwrap()
    }

    #[test]
    fn title_only_tree_gets_defaults() {
        let tree = parse("<title>Test</title>");
        let info = parse_header(&tree);
        assert_eq!(info.title, "Test");
        assert_eq!(info.authors, vec![UNKNOWN_AUTHOR]);

        let sections = parse_sections(&tree);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].id, "sec-1");
    }

    #[test]
    fn header_fields_resolve_through_candidate_paths() {
        let tree = parse(
            r#"<TEI><teiHeader>
                <fileDesc>
                  <titleStmt><title>Deep Parsing</title></titleStmt>
                  <sourceDesc><biblStruct>
                    <analytic>
                      <author><persName><forename>Ada</forename><surname>Lovelace</surname></persName></author>
                      <author><persName><forename>Alan</forename><forename>M</forename><surname>Turing</surname></persName></author>
                    </analytic>
                    <monogr><title>Journal of Tests</title>
                      <imprint><date when="2021-03-01"/></imprint>
                    </monogr>
                    <idno type="DOI">10.1000/xyz</idno>
                  </biblStruct></sourceDesc>
                </fileDesc>
                <profileDesc>
                  <abstract><p>Para one.</p><p>Para two.</p></abstract>
                  <textClass><keywords><term>parsing</term><term>papers</term></keywords></textClass>
                </profileDesc>
              </teiHeader></TEI>"#,
        );
        let info = parse_header(&tree);
        assert_eq!(info.title, "Deep Parsing");
        assert_eq!(info.authors, vec!["Ada Lovelace", "Alan M Turing"]);
        assert_eq!(info.abstract_text, "Para one. Para two.");
        assert_eq!(info.year, 2021);
        assert_eq!(info.doi.as_deref(), Some("10.1000/xyz"));
        assert_eq!(info.venue.as_deref(), Some("Journal of Tests"));
        assert_eq!(
            info.keywords,
            Some(vec!["parsing".to_string(), "papers".to_string()])
        );
    }

    #[test]
    fn bare_string_author_is_accepted() {
        let tree = parse(
            "<TEI><teiHeader><fileDesc><sourceDesc><biblStruct><analytic>
               <author>  Grace   Hopper </author>
             </analytic></biblStruct></sourceDesc></fileDesc></teiHeader></TEI>",
        );
        let info = parse_header(&tree);
        assert_eq!(info.authors, vec!["Grace Hopper"]);
    }

    #[test]
    fn author_normalization_is_idempotent() {
        let once = normalize_authors(vec!["A B".to_string()]);
        let twice = normalize_authors(once.clone());
        assert_eq!(once, twice);
        assert_eq!(twice, vec!["A B"]);
    }

    #[test]
    fn empty_author_list_gets_placeholder() {
        assert_eq!(
            normalize_authors(vec!["   ".to_string(), String::new()]),
            vec![UNKNOWN_AUTHOR]
        );
    }

    #[test]
    fn section_ids_follow_hierarchy() {
        let tree = parse(
            "<TEI><text><body>
               <div><head>Introduction</head><p>intro text</p>
                 <div><head>Background</head><p>bg</p></div>
                 <div><head>Motivation</head>
                   <div><head>Research Questions</head><p>rq</p></div>
                 </div>
               </div>
               <div><head>Methods</head><p>m</p></div>
             </body></text></TEI>",
        );
        let sections = parse_sections(&tree);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].id, "sec-1");
        assert_eq!(sections[0].subsections.len(), 2);
        assert_eq!(sections[0].subsections[1].subsections[0].title, "Research Questions");
        assert_eq!(sections[0].subsections[1].subsections[0].id, "sec-1.2.1");
        assert_eq!(sections[0].subsections[1].subsections[0].level, 3);
        assert_eq!(sections[1].id, "sec-2");

        // 不变量：子级level比父级大一，且id以父id为前缀
        fn check(section: &PaperSection) {
            for child in &section.subsections {
                assert_eq!(child.level, section.level + 1);
                assert!(child.id.starts_with(&section.id));
                check(child);
            }
        }
        for s in &sections {
            check(s);
        }
    }

    #[test]
    fn headless_div_gets_placeholder_title() {
        let tree = parse("<TEI><text><body><div><p>text only</p></div></body></text></TEI>");
        let sections = parse_sections(&tree);
        assert_eq!(sections[0].title, UNTITLED_SECTION);
        assert_eq!(sections[0].content, "text only");
    }

    #[test]
    fn div_scopes_assign_innermost_ownership() {
        let tree = parse(
            "<TEI><text><body>
               <figure><head>floating</head></figure>
               <div><head>A</head><figure><head>in A</head></figure>
                 <div><head>A1</head><figure><head>in A1</head></figure></div>
               </div>
             </body></text></TEI>",
        );
        let scopes = div_scopes(&tree);
        let found: Vec<(String, String)> = scopes
            .iter()
            .flat_map(|(id, node)| {
                node.descendants_bounded("figure", &["div"])
                    .into_iter()
                    .map(|f| (id.clone(), f.first("head").unwrap().text.clone()))
            })
            .collect();
        assert!(found.contains(&("sec-1".to_string(), "floating".to_string())));
        assert!(found.contains(&("sec-1".to_string(), "in A".to_string())));
        assert!(found.contains(&("sec-1.1".to_string(), "in A1".to_string())));
        assert_eq!(found.len(), 3);
    }
}
