use regex::Regex;
use tracing::{debug, info, warn};

use super::tei;
use super::tree::DocNode;
use super::PaperCitation;
use crate::utils::ExtractError;

pub struct CitationParser {
    year_re: Regex,
}

impl CitationParser {
    pub fn new() -> Self {
        Self {
            year_re: Regex::new(r"\b(\d{4})\b").unwrap(),
        }
    }

    /// 解析参考文献容器下的所有条目，单条失败不影响其余条目
    pub fn extract(&self, root: &DocNode) -> Vec<PaperCitation> {
        let scope = root.find(&["text", "back"]).unwrap_or(root);
        let mut entries = scope.descendants("biblStruct");
        if entries.is_empty() && !std::ptr::eq(scope, root) {
            entries = root.descendants("biblStruct");
        }

        let citations: Vec<PaperCitation> = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let citation = self.parse_entry(entry, i);
                if citation.text.ends_with("(extraction error)") {
                    // 单条目失败只记录，不影响其余条目
                    warn!(
                        "{}",
                        ExtractError::Classification(format!("引文条目 {} 没有可识别字段", i + 1))
                    );
                }
                citation
            })
            .collect();

        info!("引文解析完成，共 {} 条", citations.len());
        citations
    }

    fn parse_entry(&self, entry: &DocNode, index: usize) -> PaperCitation {
        let authors: Vec<String> = entry
            .descendants("author")
            .iter()
            .map(|a| tei::person_name(a))
            .filter(|s| !s.is_empty())
            .collect();

        let analytic_title = entry
            .find(&["analytic", "title"])
            .map(|n| n.text_content())
            .filter(|s| !s.is_empty());
        let monogr_title = entry
            .find(&["monogr", "title"])
            .map(|n| n.text_content())
            .filter(|s| !s.is_empty());
        let note_text = entry
            .first("note")
            .map(|n| n.text_content())
            .filter(|s| !s.is_empty());

        // monogr标题在有analytic标题时充当期刊/会议名，否则顶替为标题
        let (title, venue) = match (&analytic_title, &monogr_title) {
            (Some(t), Some(v)) => (Some(t.clone()), Some(v.clone())),
            (Some(t), None) => (Some(t.clone()), None),
            (None, Some(v)) => (Some(v.clone()), None),
            (None, None) => (note_text.clone(), None),
        };

        let year = entry
            .descendants("date")
            .iter()
            .find_map(|d| d.attr("when").map(str::to_string))
            .or_else(|| {
                entry
                    .descendants("date")
                    .first()
                    .map(|d| d.text_content())
            })
            .or_else(|| Some(entry.text_content()))
            .and_then(|s| self.first_year(&s));

        let (volume, issue, pages) = self.bibl_scopes(entry);

        let doi = entry
            .descendants("idno")
            .iter()
            .find(|n| n.attr("type").map(|t| t.eq_ignore_ascii_case("doi")) == Some(true))
            .map(|n| n.text_content())
            .filter(|s| !s.is_empty());

        let text = self.format_citation(
            index,
            &authors,
            title.as_deref(),
            venue.as_deref(),
            volume.as_deref(),
            issue.as_deref(),
            pages.as_deref(),
            doi.as_deref(),
        );

        debug!("引文 {}: {}", index + 1, text);

        PaperCitation {
            id: format!("cite-{}", index + 1),
            text,
            authors: if authors.is_empty() { None } else { Some(authors) },
            title,
            year,
            venue,
            volume,
            pages,
            doi,
        }
    }

    fn first_year(&self, text: &str) -> Option<i32> {
        self.year_re.captures(text)?.get(1)?.as_str().parse().ok()
    }

    /// biblScope按unit属性区分卷、期、页码；页码可由from/to属性组成区间
    fn bibl_scopes(&self, entry: &DocNode) -> (Option<String>, Option<String>, Option<String>) {
        let mut volume = None;
        let mut issue = None;
        let mut pages = None;
        for scope in entry.descendants("biblScope") {
            let value = {
                let t = scope.text_content();
                if t.is_empty() {
                    match (scope.attr("from"), scope.attr("to")) {
                        (Some(from), Some(to)) => format!("{}-{}", from, to),
                        (Some(from), None) => from.to_string(),
                        _ => continue,
                    }
                } else {
                    t
                }
            };
            match scope.attr("unit") {
                Some(u) if u.eq_ignore_ascii_case("volume") => volume = Some(value),
                Some(u) if u.eq_ignore_ascii_case("issue") => issue = Some(value),
                Some(u) if u.eq_ignore_ascii_case("page") => pages = Some(value),
                _ => {}
            }
        }
        (volume, issue, pages)
    }

    /// 组装人类可读的引文串，缺失字段的子句整体省略；
    /// 字段全空时退回标题，标题也没有时使用占位文本。
    #[allow(clippy::too_many_arguments)]
    fn format_citation(
        &self,
        index: usize,
        authors: &[String],
        title: Option<&str>,
        venue: Option<&str>,
        volume: Option<&str>,
        issue: Option<&str>,
        pages: Option<&str>,
        doi: Option<&str>,
    ) -> String {
        let mut parts: Vec<String> = Vec::new();

        if !authors.is_empty() {
            parts.push(format!("{}.", join_authors(authors)));
        }
        if let Some(t) = title {
            parts.push(format!("\"{}\".", t));
        }

        let mut venue_clause = String::new();
        if let Some(v) = venue {
            venue_clause.push_str(v);
        }
        if let Some(v) = volume {
            if !venue_clause.is_empty() {
                venue_clause.push_str(", ");
            }
            venue_clause.push_str(&format!("Vol. {}", v));
        }
        if let Some(i) = issue {
            if !venue_clause.is_empty() {
                venue_clause.push_str(", ");
            }
            venue_clause.push_str(&format!("No. {}", i));
        }
        if let Some(p) = pages {
            if !venue_clause.is_empty() {
                venue_clause.push_str(", ");
            }
            venue_clause.push_str(&format!("pp. {}", p));
        }
        if !venue_clause.is_empty() {
            parts.push(format!("{}.", venue_clause));
        }

        if let Some(d) = doi {
            parts.push(format!("DOI: {}.", d));
        }

        if parts.is_empty() {
            return match title {
                Some(t) if !t.is_empty() => t.to_string(),
                _ => format!("Citation {} (extraction error)", index + 1),
            };
        }
        parts.join(" ")
    }
}

impl Default for CitationParser {
    fn default() -> Self {
        Self::new()
    }
}

fn join_authors(authors: &[String]) -> String {
    match authors.len() {
        1 => authors[0].clone(),
        2 => format!("{} and {}", authors[0], authors[1]),
        _ => format!(
            "{} and {}",
            authors[..authors.len() - 1].join(", "),
            authors[authors.len() - 1]
        ),
    }
}
