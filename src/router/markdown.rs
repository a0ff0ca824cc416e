use regex::Regex;
use tracing::{debug, warn};

use super::{assemble_tei, SectionStack};
use crate::parser::tree::DocNode;

/// 基于标题行的Markdown结构恢复
///
/// 首个一级标题作为论文标题；其余标题按#数量决定嵌套层级；
/// 首个标题之前以abstract开头的段落单独捕获为摘要。
pub fn recover(text: &str, fallback_title: &str) -> DocNode {
    let heading_re = Regex::new(r"^(#{1,6})\s+(.+)$").unwrap();
    let abstract_re = Regex::new(r"(?i)^\**abstract\**[:.]?\s*(.*)$").unwrap();

    let mut title: Option<String> = None;
    let mut abstract_text = String::new();
    let mut stack = SectionStack::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut preamble: Vec<String> = Vec::new();

    let flush =
        |paragraph: &mut Vec<&str>, stack: &mut SectionStack, preamble: &mut Vec<String>| {
            if paragraph.is_empty() {
                return;
            }
            let text = paragraph.join("\n").trim().to_string();
            paragraph.clear();
            if text.is_empty() {
                return;
            }
            if !stack.add_paragraph(&text) {
                preamble.push(text);
            }
        };

    for line in text.lines() {
        if let Some(caps) = heading_re.captures(line.trim_end()) {
            flush(&mut paragraph, &mut stack, &mut preamble);
            let level = caps[1].len() as u8;
            let heading = caps[2].trim();
            if level == 1 && title.is_none() && stack.is_empty() {
                title = Some(heading.to_string());
                continue;
            }
            stack.open(level, heading);
            continue;
        }
        if line.trim().is_empty() {
            flush(&mut paragraph, &mut stack, &mut preamble);
        } else {
            paragraph.push(line);
        }
    }
    flush(&mut paragraph, &mut stack, &mut preamble);

    // 首个标题之前的abstract段落
    for para in &preamble {
        if let Some(caps) = abstract_re.captures(para.lines().next().unwrap_or("")) {
            let mut collected = caps[1].trim().to_string();
            let rest: Vec<&str> = para.lines().skip(1).collect();
            if !rest.is_empty() {
                if !collected.is_empty() {
                    collected.push(' ');
                }
                collected.push_str(rest.join(" ").trim());
            }
            abstract_text = collected;
            break;
        }
    }

    let mut divs = stack.finish();

    if divs.is_empty() {
        // 没有任何标题时合成固定的占位章节，保证输出始终可导航
        warn!("Markdown中没有标题，合成占位章节");
        let content = text.trim();
        divs = vec![
            DocNode::element("div").child(DocNode::with_text("head", "Introduction")),
            DocNode::element("div")
                .child(DocNode::with_text("head", "Content"))
                .child(DocNode::with_text("p", content)),
            DocNode::element("div").child(DocNode::with_text("head", "Conclusion")),
        ];
    }

    let title = title.unwrap_or_else(|| fallback_title.to_string());
    debug!("Markdown恢复完成: {}", title);
    assemble_tei(&title, &[], &abstract_text, divs, Vec::new())
}
