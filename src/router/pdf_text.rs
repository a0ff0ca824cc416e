use anyhow::Result;
use lopdf::content::Content;
use lopdf::{Document, Object};
use regex::Regex;
use std::io::Read as IoRead;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{assemble_tei, SectionStack};
use crate::parser::tree::DocNode;

/// 原始PDF文本恢复：pdf-extract优先，失败后扫描内容流文本算符，
/// 仍然没有文本时退回"内容不可用"兜底树
pub fn recover(path: &Path, stem: &str) -> DocNode {
    let text = match pdf_extract::extract_text(path) {
        Ok(t) if !t.trim().is_empty() => t,
        Ok(_) => {
            warn!("pdf-extract未提取到文本，扫描文本算符");
            scan_text_operators(path).unwrap_or_default()
        }
        Err(e) => {
            warn!("pdf-extract失败: {}，扫描文本算符", e);
            scan_text_operators(path).unwrap_or_default()
        }
    };

    if text.trim().is_empty() {
        warn!("PDF中没有可恢复的文本内容");
        let div = DocNode::element("div")
            .child(DocNode::with_text("head", "Content"))
            .child(DocNode::with_text(
                "p",
                "No text content could be extracted from this PDF.",
            ));
        return assemble_tei(stem, &[], "", vec![div], Vec::new());
    }

    info!("恢复文本 {} 字符", text.len());
    build_tree_from_text(&text, stem)
}

/// 扫描每页内容流中的文本显示算符（Tj/TJ/'/"）
fn scan_text_operators(path: &Path) -> Option<String> {
    let doc = Document::load(path).ok()?;
    let mut text = String::new();

    for (_page_num, page_id) in doc.get_pages() {
        let content_bytes = match doc.get_page_content(page_id) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        let content = match Content::decode(&content_bytes) {
            Ok(c) => c,
            Err(_) => match manual_inflate(&content_bytes).and_then(|b| Ok(Content::decode(&b)?)) {
                Ok(c) => c,
                Err(e) => {
                    debug!("内容流解码失败 (页 {:?}): {}", page_id, e);
                    continue;
                }
            },
        };

        for operation in &content.operations {
            match operation.operator.as_str() {
                "Tj" | "TJ" | "'" | "\"" => {
                    for operand in &operation.operands {
                        if let Some(s) = object_text(operand) {
                            text.push_str(&s);
                            text.push(' ');
                        }
                    }
                }
                // 文本定位算符当作换行处理
                "Td" | "TD" | "T*" => {
                    if !text.ends_with('\n') {
                        text.push('\n');
                    }
                }
                _ => {}
            }
        }
        text.push('\n');
    }

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn object_text(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => {
            // UTF-16BE带BOM优先，否则按Latin-1处理
            if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
                let utf16: Vec<u16> = bytes[2..]
                    .chunks(2)
                    .filter(|c| c.len() == 2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&utf16).ok()
            } else {
                Some(bytes.iter().map(|&b| b as char).collect())
            }
        }
        Object::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(object_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(""))
            }
        }
        _ => None,
    }
}

fn manual_inflate(compressed: &[u8]) -> Result<Vec<u8>> {
    // 先按带头的zlib尝试
    let mut decoder = flate2::read::ZlibDecoder::new(compressed);
    let mut result = Vec::new();
    if decoder.read_to_end(&mut result).is_ok() {
        return Ok(result);
    }

    // 退回无头的raw deflate
    let mut decoder = flate2::read::DeflateDecoder::new(compressed);
    let mut result = Vec::new();
    decoder.read_to_end(&mut result)?;
    Ok(result)
}

/// 对恢复出的纯文本运行标题/摘要/章节/参考文献启发式，构造文档树
pub(crate) fn build_tree_from_text(text: &str, stem: &str) -> DocNode {
    let boilerplate_re = Regex::new(
        r"(?i)(arxiv|preprint|proceedings|journal\b|vol\.|no\.\s*\d|http|www\.|doi|issn|isbn|copyright|©|@|submitted|under review|page \d)",
    )
    .unwrap();
    let abstract_re = Regex::new(r"(?i)^abstract\b[\s:.\-—]*(.*)$").unwrap();
    let header_after_abstract_re =
        Regex::new(r"(?i)^(1[.\s]|introduction\b|keywords\b|index terms\b|ccs concepts\b)").unwrap();
    let references_re = Regex::new(r"(?i)^(references|bibliography)\s*$").unwrap();

    let lines: Vec<&str> = text.lines().collect();

    // 标题：第一个长度在10..=200之间且不是样板头的行
    let title = lines
        .iter()
        .map(|l| l.trim())
        .find(|l| {
            let len = l.chars().count();
            (10..=200).contains(&len) && !boilerplate_re.is_match(l)
        })
        .map(str::to_string)
        .unwrap_or_else(|| stem.to_string());

    // 摘要：abstract标记到下一个已知标头之间的文本
    let mut abstract_text = String::new();
    for (i, line) in lines.iter().enumerate() {
        if let Some(caps) = abstract_re.captures(line.trim()) {
            let mut collected = vec![caps[1].trim().to_string()];
            for follow in lines.iter().skip(i + 1) {
                let follow = follow.trim();
                if header_after_abstract_re.is_match(follow) || numbered_heading(follow).is_some() {
                    break;
                }
                collected.push(follow.to_string());
                if collected.iter().map(|s| s.len()).sum::<usize>() > 3000 {
                    break;
                }
            }
            abstract_text = collected
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            break;
        }
    }

    // 参考文献标记之后的部分单独解析，不混入章节正文
    let ref_idx = lines.iter().position(|l| references_re.is_match(l.trim()));
    let body_lines = &lines[..ref_idx.unwrap_or(lines.len())];
    let bibl_entries = match ref_idx {
        Some(idx) => parse_references(&lines[idx + 1..]),
        None => Vec::new(),
    };

    let divs = detect_sections(body_lines, text);

    debug!(
        "文本启发式完成: {} 个顶级章节, {} 条参考文献",
        divs.len(),
        bibl_entries.len()
    );
    assemble_tei(&title, &[], &abstract_text, divs, bibl_entries)
}

/// 编号标题（如 "1. Introduction"、"1.2.1 Research Questions"）
/// 返回(层级, 标题文本)
fn numbered_heading(line: &str) -> Option<(u8, String)> {
    let re = Regex::new(r"^(\d+(?:\.\d+)*)\s*[.)]?\s+([A-Z][^\n]{2,99})$").unwrap();
    let caps = re.captures(line)?;
    let level = caps[1].split('.').count().min(6) as u8;
    Some((level, caps[2].trim().to_string()))
}

/// 全大写标题行（如 "INTRODUCTION"、"RELATED WORK"）
fn caps_heading(line: &str) -> Option<String> {
    let re = Regex::new(r"^[A-Z][A-Z0-9\s:&\-]{3,60}$").unwrap();
    if !re.is_match(line) {
        return None;
    }
    let letters = line.chars().filter(|c| c.is_ascii_alphabetic()).count();
    if letters < 4 {
        return None;
    }
    Some(line.trim().to_string())
}

/// 章节检测：编号标题优先，退回全大写标题，再退回单个兜底章节
fn detect_sections(lines: &[&str], full_text: &str) -> Vec<DocNode> {
    let has_numbered = lines.iter().any(|l| numbered_heading(l.trim()).is_some());

    let mut stack = SectionStack::new();
    let mut paragraph: Vec<&str> = Vec::new();

    let flush = |paragraph: &mut Vec<&str>, stack: &mut SectionStack| {
        if paragraph.is_empty() {
            return;
        }
        let text = paragraph.join("\n").trim().to_string();
        paragraph.clear();
        stack.add_paragraph(&text);
    };

    for line in lines {
        let trimmed = line.trim();
        let heading = if has_numbered {
            numbered_heading(trimmed)
        } else {
            caps_heading(trimmed).map(|h| (1u8, h))
        };
        if let Some((level, title)) = heading {
            flush(&mut paragraph, &mut stack);
            stack.open(level, &title);
            continue;
        }
        if trimmed.is_empty() {
            flush(&mut paragraph, &mut stack);
        } else {
            paragraph.push(line);
        }
    }
    flush(&mut paragraph, &mut stack);

    let divs = stack.finish();
    if divs.is_empty() {
        return vec![DocNode::element("div")
            .child(DocNode::with_text("head", "Content"))
            .child(DocNode::with_text("p", full_text.trim()))];
    }
    divs
}

/// 参考文献切分：方括号编号标记优先，退回"姓, 年份"作者-日期模式
fn parse_references(lines: &[&str]) -> Vec<DocNode> {
    let bracket_re = Regex::new(r"^\[\d+\]").unwrap();
    let author_date_re = Regex::new(r"^[A-Z][A-Za-z'\-]+,\s.*\b\d{4}\b").unwrap();

    let has_brackets = lines.iter().any(|l| bracket_re.is_match(l.trim()));
    let starts_entry = |line: &str| {
        if has_brackets {
            bracket_re.is_match(line)
        } else {
            author_date_re.is_match(line)
        }
    };

    let mut entries: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if starts_entry(trimmed) {
            if !current.is_empty() {
                entries.push(current.join(" "));
            }
            current = vec![trimmed];
        } else if !current.is_empty() {
            current.push(trimmed);
        }
    }
    if !current.is_empty() {
        entries.push(current.join(" "));
    }

    entries
        .into_iter()
        .map(|e| DocNode::element("biblStruct").child(DocNode::with_text("note", &e)))
        .collect()
}
