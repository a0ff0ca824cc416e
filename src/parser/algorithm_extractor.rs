use regex::Regex;
use tracing::{debug, info};

use super::tei;
use super::tree::DocNode;
use super::{AlgorithmComplexity, PaperAlgorithm};

pub struct AlgorithmExtractor {
    head_re: Regex,
    name_prefix_re: Regex,
    io_split_re: Regex,
    time_re: Regex,
    space_re: Regex,
    textual_re: Regex,
}

impl AlgorithmExtractor {
    pub fn new() -> Self {
        Self {
            head_re: Regex::new(r"(?i)algorithm").unwrap(),
            name_prefix_re: Regex::new(r"(?i)^algorithm\s*\d*\s*[:.]?\s*").unwrap(),
            io_split_re: Regex::new(r"[,;\n]").unwrap(),
            time_re: Regex::new(r"(?i)time[^\n.]{0,40}?(O\([^)]{1,40}\))").unwrap(),
            space_re: Regex::new(r"(?i)space[^\n.]{0,40}?(O\([^)]{1,40}\))").unwrap(),
            textual_re: Regex::new(r"(?m)^\s*Algorithm\s+(\d+)\s*[:.]?\s+(.{3,100})$").unwrap(),
        }
    }

    /// 识别标题匹配algorithm的图式节点，结构通道为空时退回文本行匹配
    pub fn extract(&self, root: &DocNode, raw_text: &str) -> Vec<PaperAlgorithm> {
        let mut algorithms = self.extract_structural(root);
        if algorithms.is_empty() {
            debug!("结构通道未发现算法，尝试文本模式");
            algorithms = self.extract_textual(raw_text);
        }
        info!("算法提取完成，共 {} 个", algorithms.len());
        algorithms
    }

    fn extract_structural(&self, root: &DocNode) -> Vec<PaperAlgorithm> {
        let mut algorithms = Vec::new();
        for (section_id, scope) in tei::div_scopes(root) {
            for fig in scope.descendants_bounded("figure", &["div"]) {
                let head = fig
                    .first("head")
                    .map(|h| h.text_content())
                    .unwrap_or_default();
                if !self.head_re.is_match(&head) {
                    continue;
                }

                let description = fig
                    .first("figDesc")
                    .map(|d| d.text_content())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| head.clone());
                let pseudocode = self.pseudocode_of(fig, &description);
                let (inputs, outputs) = self.parse_io(&pseudocode);
                let complexity = self.parse_complexity(&pseudocode, &description);

                let name = {
                    let stripped = self.name_prefix_re.replace(&head, "").trim().to_string();
                    if stripped.is_empty() {
                        head.clone()
                    } else {
                        stripped
                    }
                };

                algorithms.push(PaperAlgorithm {
                    id: format!("algo-{}", algorithms.len() + 1),
                    name,
                    description,
                    pseudocode,
                    inputs,
                    outputs,
                    section_id: section_id.clone(),
                    complexity,
                });
            }
        }
        algorithms
    }

    /// 伪代码来源优先级：code子节点 > 描述文本 > 表格行按换行拼接
    fn pseudocode_of(&self, fig: &DocNode, description: &str) -> String {
        if let Some(code) = fig.first("code") {
            let t = code.text_content();
            if !t.is_empty() {
                return t;
            }
        }
        if let Some(table) = fig.first("table") {
            let rows: Vec<String> = table
                .children_named("row")
                .iter()
                .map(|row| {
                    row.children_named("cell")
                        .iter()
                        .map(|c| c.text_content())
                        .collect::<Vec<_>>()
                        .join(" ")
                        .trim()
                        .to_string()
                })
                .filter(|r| !r.is_empty())
                .collect();
            if !rows.is_empty() {
                return rows.join("\n");
            }
        }
        description.to_string()
    }

    fn parse_io(&self, pseudocode: &str) -> (Vec<String>, Vec<String>) {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for line in pseudocode.lines() {
            let lower = line.to_lowercase();
            if let Some(pos) = lower.find("input:") {
                inputs.extend(self.split_io(&line[pos + "input:".len()..]));
            } else if let Some(pos) = lower.find("output:") {
                outputs.extend(self.split_io(&line[pos + "output:".len()..]));
            }
        }
        (inputs, outputs)
    }

    fn split_io(&self, rest: &str) -> Vec<String> {
        self.io_split_re
            .split(rest)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn parse_complexity(&self, pseudocode: &str, description: &str) -> Option<AlgorithmComplexity> {
        let haystack = format!("{}\n{}", pseudocode, description);
        let time = self
            .time_re
            .captures(&haystack)
            .map(|c| c[1].to_string());
        let space = self
            .space_re
            .captures(&haystack)
            .map(|c| c[1].to_string());
        if time.is_none() && space.is_none() {
            None
        } else {
            Some(AlgorithmComplexity { time, space })
        }
    }

    fn extract_textual(&self, raw_text: &str) -> Vec<PaperAlgorithm> {
        let mut algorithms = Vec::new();
        for caps in self.textual_re.captures_iter(raw_text) {
            let name = caps[2].trim().to_string();
            let whole = caps.get(0).expect("group 0 always present");
            // 跟随的至多10个非空行作为伪代码
            let tail = &raw_text[whole.end()..];
            let pseudocode: Vec<&str> = tail
                .lines()
                .skip(1)
                .take_while(|l| !l.trim().is_empty())
                .take(10)
                .collect();
            let pseudocode = pseudocode.join("\n");
            let (inputs, outputs) = self.parse_io(&pseudocode);

            algorithms.push(PaperAlgorithm {
                id: format!("algo-{}", &caps[1]),
                name,
                description: whole.as_str().trim().to_string(),
                pseudocode,
                inputs,
                outputs,
                section_id: "sec-1".to_string(),
                complexity: None,
            });
        }
        algorithms
    }
}

impl Default for AlgorithmExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn figure_with_algorithm_head_is_classified() {
        let tree = DocNode::parse_xml(
            r#"<TEI><text><body><div><head>Methods</head>
                 <figure><head>Algorithm 1: Sorting Algorithm</head>
                   <code>Input: array A, length n
Output: sorted array
for i in 1..n do
  swap as needed
Time complexity: O(n log n)</code>
                 </figure>
                 <figure><head>Figure 1: Architecture</head><figDesc>overview</figDesc></figure>
               </div></body></text></TEI>"#,
        )
        .unwrap();
        let algos = AlgorithmExtractor::new().extract(&tree, "");
        assert_eq!(algos.len(), 1);
        assert!(algos[0].name.contains("Sorting"));
        assert_eq!(algos[0].inputs, vec!["array A", "length n"]);
        assert_eq!(algos[0].outputs, vec!["sorted array"]);
        assert_eq!(algos[0].section_id, "sec-1");
        let complexity = algos[0].complexity.as_ref().unwrap();
        assert_eq!(complexity.time.as_deref(), Some("O(n log n)"));
        assert!(complexity.space.is_none());
    }

    #[test]
    fn tabular_body_becomes_pseudocode_lines() {
        let tree = DocNode::parse_xml(
            "<body><div><figure><head>Algorithm 2</head><table>
               <row><cell>step 1</cell></row>
               <row><cell>step 2</cell></row>
             </table></figure></div></body>",
        )
        .unwrap();
        let algos = AlgorithmExtractor::new().extract(&tree, "");
        assert_eq!(algos[0].pseudocode, "step 1\nstep 2");
    }

    #[test]
    fn textual_fallback_matches_algorithm_lines() {
        let text = "Algorithm 3: Greedy Matching\nfor each item\n  pick best\n\nother text";
        let algos = AlgorithmExtractor::new().extract(&DocNode::element("TEI"), text);
        assert_eq!(algos.len(), 1);
        assert!(algos[0].name.contains("Greedy"));
        assert_eq!(algos[0].id, "algo-3");
        assert!(algos[0].pseudocode.contains("pick best"));
    }

    #[test]
    fn no_algorithms_yields_empty_list() {
        let tree = DocNode::parse_xml("<body><div><p>plain</p></div></body>").unwrap();
        assert!(AlgorithmExtractor::new().extract(&tree, "no markers here").is_empty());
    }
}
