use regex::Regex;
use tracing::{debug, info};

use super::tei;
use super::tree::DocNode;
use super::PaperFigure;

pub const NO_CAPTION: &str = "No caption available";

pub struct FigureExtractor {
    algorithm_re: Regex,
    label_re: Regex,
    textual_re: Regex,
}

impl FigureExtractor {
    pub fn new() -> Self {
        Self {
            algorithm_re: Regex::new(r"(?i)algorithm").unwrap(),
            label_re: Regex::new(r"(?i)fig(?:ure)?\.?\s*(\d+)").unwrap(),
            textual_re: Regex::new(r"(?m)^\s*(?:Figure|Fig\.?)\s+(\d+)\s*[:.]\s*(.{3,200})$").unwrap(),
        }
    }

    /// 收集非表格、非算法的图式节点，结构通道为空时退回题注行匹配
    pub fn extract(&self, root: &DocNode, raw_text: &str) -> Vec<PaperFigure> {
        let mut figures = self.extract_structural(root);
        if figures.is_empty() {
            debug!("结构通道未发现图，尝试文本模式");
            figures = self.extract_textual(raw_text);
        }
        info!("图提取完成，共 {} 个", figures.len());
        figures
    }

    fn extract_structural(&self, root: &DocNode) -> Vec<PaperFigure> {
        let mut figures = Vec::new();
        for (section_id, scope) in tei::div_scopes(root) {
            for fig in scope.descendants_bounded("figure", &["div"]) {
                // 表格和算法由各自的分类器处理
                if fig.attr("type").map(|t| t.eq_ignore_ascii_case("table")) == Some(true) {
                    continue;
                }
                let head = fig
                    .first("head")
                    .map(|h| h.text_content())
                    .unwrap_or_default();
                if self.algorithm_re.is_match(&head) {
                    continue;
                }

                let caption = fig
                    .first("figDesc")
                    .map(|d| d.text_content())
                    .filter(|s| !s.is_empty())
                    .or_else(|| Some(head.clone()).filter(|s| !s.is_empty()))
                    .unwrap_or_else(|| NO_CAPTION.to_string());
                let label = fig
                    .first("label")
                    .map(|l| l.text_content())
                    .filter(|s| !s.is_empty());

                let id = self
                    .numeric_label(label.as_deref(), &head, &caption)
                    .unwrap_or_else(|| format!("fig-{}", figures.len() + 1));

                figures.push(PaperFigure {
                    id,
                    caption,
                    label,
                    section_id: section_id.clone(),
                });
            }
        }
        figures
    }

    /// `figure NN` 式的数字标记优先于顺序id，保证跨运行的人类可读稳定性
    fn numeric_label(&self, label: Option<&str>, head: &str, caption: &str) -> Option<String> {
        for candidate in [label.unwrap_or(""), head, caption] {
            if let Some(caps) = self.label_re.captures(candidate) {
                return Some(format!("fig-{}", &caps[1]));
            }
        }
        None
    }

    fn extract_textual(&self, raw_text: &str) -> Vec<PaperFigure> {
        self.textual_re
            .captures_iter(raw_text)
            .map(|caps| PaperFigure {
                id: format!("fig-{}", &caps[1]),
                caption: caps[2].trim().to_string(),
                label: Some(format!("Figure {}", &caps[1])),
                section_id: "sec-1".to_string(),
            })
            .collect()
    }
}

impl Default for FigureExtractor {
    fn default() -> Self {
        Self::new()
    }
}
