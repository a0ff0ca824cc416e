use regex::Regex;
use tracing::{debug, info};

use super::tei;
use super::tree::DocNode;
use super::{EquationType, PaperEquation};

pub struct FormulaExtractor {
    patterns: Vec<(Regex, &'static str)>,
}

impl FormulaExtractor {
    pub fn new() -> Self {
        // 降级文本通道：PDF提取的文本不保留LaTeX语法，公式会变成Unicode数学符号，
        // 需要匹配的是渲染后的数学表达式特征
        let patterns = vec![
            // 含数学运算符的行（如 x = a + b, f(x) = ...）
            (
                Regex::new(r"(?m)^[^\n]{0,200}[a-zA-Z]\s*[=≡≈≤≥<>]\s*[^\n]{3,}$").unwrap(),
                "equation",
            ),
            // Unicode 数学符号密集区域：积分、求和、乘积等
            (
                Regex::new(r"[∫∑∏∂∇∆√∞±∓≠≡≈≤≥⊂⊃∈∉∀∃∧∨¬⟨⟩⊗⊕⊙]{1}[^\n]{2,100}").unwrap(),
                "math_symbol",
            ),
            // 希腊字母与运算符组合
            (
                Regex::new(r"[^\n]{0,50}[αβγδεζηθικλμνξπρστυφχψωΓΔΘΛΞΠΣΦΨΩ][^\n]{0,10}[=+\-<>≤≥≈][^\n]{2,}").unwrap(),
                "greek_expr",
            ),
            // argmin/argmax, min, max, log, exp, lim 等数学函数
            (
                Regex::new(r"(?i)(?:arg\s*(?:min|max)|(?:min|max|sup|inf|lim|log|exp|det|tr|diag)\s*[({⟨])").unwrap(),
                "math_func",
            ),
            // 部分PDF仍保留LaTeX命令
            (
                Regex::new(r"\\(?:frac|int|sum|prod|partial|nabla|lim|infty|alpha|beta|theta|lambda|mathbb|mathcal)\b").unwrap(),
                "latex_cmd",
            ),
            (Regex::new(r"\$[^\$]{2,}?\$").unwrap(), "inline_latex"),
            (Regex::new(r"\$\$[\s\S]+?\$\$").unwrap(), "display_latex"),
        ];
        Self { patterns }
    }

    /// 收集树中所有公式节点，结构通道为空时退回文本模式匹配
    pub fn extract(&self, root: &DocNode, raw_text: &str) -> Vec<PaperEquation> {
        let mut equations = self.extract_structural(root);
        if equations.is_empty() {
            debug!("结构通道未发现公式，尝试文本模式");
            equations = self.extract_textual(raw_text);
        }
        info!("公式提取完成，共 {} 个", equations.len());
        equations
    }

    fn extract_structural(&self, root: &DocNode) -> Vec<PaperEquation> {
        let mut equations = Vec::new();
        for (section_id, scope) in tei::div_scopes(root) {
            for node in scope.descendants_bounded("formula", &["div"]) {
                let (content, is_dump) = formula_content(node);
                let equation_type = classify_type(node, &content, is_dump);
                equations.push(PaperEquation {
                    id: format!("eq-{}", equations.len() + 1),
                    content,
                    section_id: section_id.clone(),
                    equation_type,
                });
            }
        }
        equations
    }

    fn extract_textual(&self, raw_text: &str) -> Vec<PaperEquation> {
        let mut equations: Vec<PaperEquation> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for (pattern, kind) in &self.patterns {
            for mat in pattern.find_iter(raw_text) {
                let raw = mat.as_str().trim().to_string();

                if seen.contains(&raw) {
                    continue;
                }
                // 过短或过长的匹配大多是噪声
                if raw.len() < 4 || raw.len() > 500 {
                    continue;
                }

                debug!("公式匹配 [{}]: {}", kind, truncated(&raw, 80));

                let equation_type = heuristic_type(&raw);
                seen.insert(raw.clone());
                equations.push(PaperEquation {
                    id: format!("eq-{}", equations.len() + 1),
                    content: raw,
                    section_id: "sec-1".to_string(),
                    equation_type,
                });
            }
        }
        equations
    }
}

impl Default for FormulaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// 从公式节点的任一子形状提取内容，最后手段是截断的调试转储
fn formula_content(node: &DocNode) -> (String, bool) {
    if !node.text.trim().is_empty() {
        return (node.text.trim().to_string(), false);
    }
    if let Some(math) = node.first("math") {
        let t = math.text_content();
        if !t.is_empty() {
            return (t, false);
        }
    }
    let t = node.text_content();
    if !t.is_empty() {
        return (t, false);
    }
    (truncated(&format!("{:?}", node), 120), true)
}

fn classify_type(node: &DocNode, content: &str, is_dump: bool) -> EquationType {
    match node.attr("type").or_else(|| node.attr("rend")) {
        Some(t) if t.eq_ignore_ascii_case("display") => EquationType::Display,
        Some(t) if t.eq_ignore_ascii_case("inline") => EquationType::Inline,
        _ if is_dump => EquationType::Unknown,
        _ => heuristic_type(content),
    }
}

fn heuristic_type(content: &str) -> EquationType {
    if content.len() > 50 || content.contains('\n') {
        EquationType::Display
    } else {
        EquationType::Inline
    }
}

fn truncated(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_pass_reads_all_shapes() {
        let tree = DocNode::parse_xml(
            r#"<TEI><text><body>
                 <div><head>A</head>
                   <formula type="display">E = mc^2</formula>
                   <p>inline <formula>x + y</formula> math</p>
                 </div>
               </body></text></TEI>"#,
        )
        .unwrap();
        let eqs = FormulaExtractor::new().extract(&tree, "");
        assert_eq!(eqs.len(), 2);
        assert_eq!(eqs[0].content, "E = mc^2");
        assert!(matches!(eqs[0].equation_type, EquationType::Display));
        assert_eq!(eqs[1].content, "x + y");
        assert!(matches!(eqs[1].equation_type, EquationType::Inline));
        assert_eq!(eqs[0].section_id, "sec-1");
        assert_eq!(eqs[1].section_id, "sec-1");
    }

    #[test]
    fn long_content_classified_as_display() {
        let tree = DocNode::parse_xml(&format!(
            "<body><div><formula>{}</formula></div></body>",
            "x + y + z + a + b + c + d + e + f + g + h + i + j + k"
        ))
        .unwrap();
        let eqs = FormulaExtractor::new().extract(&tree, "");
        assert!(matches!(eqs[0].equation_type, EquationType::Display));
    }

    #[test]
    fn textual_pass_finds_latex_remnants() {
        let text = "The loss is defined as $L(\\theta) = xyz$ in our work.\nf(x) = a + b + c";
        let eqs = FormulaExtractor::new().extract(&DocNode::element("TEI"), text);
        assert!(!eqs.is_empty());
        assert!(eqs.iter().any(|e| e.content.contains("L(\\theta)") || e.content.contains("f(x)")));
    }

    #[test]
    fn ids_are_sequential() {
        let tree = DocNode::parse_xml(
            "<body><div><formula>a=1</formula><formula>b=2</formula></div></body>",
        )
        .unwrap();
        let eqs = FormulaExtractor::new().extract(&tree, "");
        assert_eq!(eqs[0].id, "eq-1");
        assert_eq!(eqs[1].id, "eq-2");
    }
}
