use regex::Regex;
use tracing::{debug, info};

use super::figure_extractor::NO_CAPTION;
use super::tei;
use super::tree::DocNode;
use super::PaperTable;

pub const NO_DATA_ROW: &str = "No data extracted";

pub struct TableParser {
    caption_re: Regex,
    multi_space_re: Regex,
}

impl TableParser {
    pub fn new() -> Self {
        Self {
            caption_re: Regex::new(r"(?i)^Table\s+(\d+)[.:]?\s*(.*)$").unwrap(),
            multi_space_re: Regex::new(r"[\t]|\s{2,}").unwrap(),
        }
    }

    /// 收集表格节点，结构通道为空时退回列对齐文本块检测
    pub fn extract(&self, root: &DocNode, raw_text: &str) -> Vec<PaperTable> {
        let mut tables = self.extract_structural(root);
        if tables.is_empty() {
            debug!("结构通道未发现表格，尝试文本模式");
            tables = self.extract_textual(raw_text);
        }
        info!("表格解析完成，共 {} 个", tables.len());
        tables
    }

    fn extract_structural(&self, root: &DocNode) -> Vec<PaperTable> {
        let mut tables = Vec::new();
        for (section_id, scope) in tei::div_scopes(root) {
            // 标记为表格的图式节点
            for fig in scope.descendants_bounded("figure", &["div"]) {
                if fig.attr("type").map(|t| t.eq_ignore_ascii_case("table")) != Some(true) {
                    continue;
                }
                let caption = fig
                    .first("figDesc")
                    .or_else(|| fig.first("head"))
                    .map(|n| n.text_content())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| NO_CAPTION.to_string());
                let label = fig
                    .first("label")
                    .map(|l| l.text_content())
                    .filter(|s| !s.is_empty());
                let rows = fig
                    .first("table")
                    .map(|t| self.parse_structural_rows(t))
                    .unwrap_or_default();
                tables.push(self.build(tables.len(), caption, label, &section_id, rows));
            }

            // 独立的表格节点（不在figure包装内）
            for tbl in scope.descendants_bounded("table", &["div", "figure"]) {
                let caption = tbl
                    .first("head")
                    .map(|n| n.text_content())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| NO_CAPTION.to_string());
                let rows = self.parse_structural_rows(tbl);
                tables.push(self.build(tables.len(), caption, None, &section_id, rows));
            }
        }
        tables
    }

    /// 行-单元格遍历；修剪后全空的行被丢弃
    fn parse_structural_rows(&self, table: &DocNode) -> Vec<Vec<String>> {
        table
            .children_named("row")
            .iter()
            .map(|row| {
                row.children_named("cell")
                    .iter()
                    .map(|c| c.text_content())
                    .collect::<Vec<String>>()
            })
            .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
            .collect()
    }

    /// 表格永远不缺行：零行时给出占位行
    fn build(
        &self,
        index: usize,
        caption: String,
        label: Option<String>,
        section_id: &str,
        rows: Vec<Vec<String>>,
    ) -> PaperTable {
        let rows = if rows.is_empty() {
            vec![vec![NO_DATA_ROW.to_string()]]
        } else {
            rows
        };
        PaperTable {
            id: format!("table-{}", index + 1),
            caption,
            label,
            section_id: section_id.to_string(),
            rows,
        }
    }

    fn extract_textual(&self, raw_text: &str) -> Vec<PaperTable> {
        let lines: Vec<&str> = raw_text.lines().collect();
        let mut tables: Vec<PaperTable> = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            let trimmed = lines[i].trim();

            // 寻找 "Table N" 题注行
            if self.caption_re.is_match(trimmed) {
                let caption = trimmed.to_string();
                i += 1;

                while i < lines.len() && lines[i].trim().is_empty() {
                    i += 1;
                }

                let mut raw_rows: Vec<&str> = Vec::new();
                let mut blank_count = 0;
                while i < lines.len() {
                    let row = lines[i].trim();
                    if row.is_empty() {
                        blank_count += 1;
                        if blank_count > 1 {
                            break; // 连续两个空行结束表格
                        }
                        i += 1;
                        continue;
                    }
                    blank_count = 0;
                    if self.caption_re.is_match(row) {
                        break;
                    }
                    raw_rows.push(row);
                    i += 1;
                }

                let rows = self.parse_text_rows(&raw_rows);
                debug!("检测到表格: {}, {} 行", caption, rows.len());
                tables.push(self.build(tables.len(), caption, None, "sec-1", rows));
                continue;
            }

            // 无题注的列对齐块：至少2列（2个以上空格分隔），且连续3行以上
            if self.looks_like_table_row(trimmed) {
                let start = i;
                let mut raw_rows: Vec<&str> = Vec::new();
                while i < lines.len() {
                    let row = lines[i].trim();
                    if row.is_empty() || !self.looks_like_table_row(row) {
                        break;
                    }
                    raw_rows.push(row);
                    i += 1;
                }

                if raw_rows.len() >= 3 {
                    let rows = self.parse_text_rows(&raw_rows);
                    if !rows.is_empty() {
                        debug!("检测到无题注表格: {} 行", rows.len());
                        tables.push(self.build(
                            tables.len(),
                            NO_CAPTION.to_string(),
                            None,
                            "sec-1",
                            rows,
                        ));
                    }
                }
                if i == start {
                    i += 1;
                }
                continue;
            }

            i += 1;
        }

        tables
    }

    fn looks_like_table_row(&self, line: &str) -> bool {
        if line.len() < 5 {
            return false;
        }
        let parts: Vec<&str> = self
            .multi_space_re
            .split(line)
            .filter(|s| !s.is_empty())
            .collect();
        parts.len() >= 2
    }

    fn parse_text_rows(&self, raw_rows: &[&str]) -> Vec<Vec<String>> {
        raw_rows
            .iter()
            .map(|row| {
                self.multi_space_re
                    .split(row)
                    .filter(|s| !s.is_empty())
                    .map(|s| s.trim().to_string())
                    .collect::<Vec<String>>()
            })
            .filter(|cells| cells.len() >= 2)
            .collect()
    }
}

impl Default for TableParser {
    fn default() -> Self {
        Self::new()
    }
}
