use regex::Regex;
use tracing::debug;

use super::{assemble_tei, SectionStack};
use crate::parser::tree::DocNode;

/// 基于LaTeX命令的结构恢复
///
/// \title{} / \author{} / abstract环境填充元数据；
/// \section / \subsection / \subsubsection 对应1/2/3级章节，
/// 每节消费到下一个分节命令或\end{document}为止。
pub fn recover(text: &str, fallback_title: &str) -> DocNode {
    let text = strip_comments(text);

    let title_re = Regex::new(r"\\title\s*\{([^}]*)\}").unwrap();
    let author_re = Regex::new(r"\\author\s*\{([^}]*)\}").unwrap();
    let abstract_re = Regex::new(r"(?s)\\begin\{abstract\}(.*?)\\end\{abstract\}").unwrap();
    let section_re = Regex::new(r"\\(section|subsection|subsubsection)\*?\s*\{([^}]*)\}").unwrap();
    let end_re = Regex::new(r"\\end\{document\}").unwrap();

    let title = title_re
        .captures(&text)
        .map(|c| clean_inline(&c[1]))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_title.to_string());

    // \author{}可重复出现，单个命令内还可能用\and分隔
    let authors: Vec<String> = author_re
        .captures_iter(&text)
        .flat_map(|c| {
            c[1].split(r"\and")
                .map(clean_inline)
                .collect::<Vec<String>>()
        })
        .filter(|a| !a.is_empty())
        .collect();

    let abstract_text = abstract_re
        .captures(&text)
        .map(|c| clean_block(&c[1]))
        .unwrap_or_default();

    let doc_end = end_re.find(&text).map(|m| m.start()).unwrap_or(text.len());

    let mut stack = SectionStack::new();
    let matches: Vec<(usize, usize, u8, String)> = section_re
        .captures_iter(&text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if whole.start() >= doc_end {
                return None;
            }
            let level = match &caps[1] {
                "section" => 1,
                "subsection" => 2,
                _ => 3,
            };
            Some((whole.start(), whole.end(), level, clean_inline(&caps[2])))
        })
        .collect();

    for (i, (_, end, level, heading)) in matches.iter().enumerate() {
        stack.open(*level, heading);
        let body_end = matches
            .get(i + 1)
            .map(|(next_start, ..)| *next_start)
            .unwrap_or(doc_end);
        let body = clean_block(&text[*end..body_end]);
        if !body.is_empty() {
            stack.add_paragraph(&body);
        }
    }

    let divs = stack.finish();
    debug!("LaTeX恢复完成: {} ({} 个顶级章节)", title, divs.len());
    assemble_tei(&title, &authors, &abstract_text, divs, Vec::new())
}

/// 去掉未转义的%注释
fn strip_comments(text: &str) -> String {
    text.lines()
        .map(|line| {
            let mut prev = '\0';
            for (i, ch) in line.char_indices() {
                if ch == '%' && prev != '\\' {
                    return &line[..i];
                }
                prev = ch;
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_inline(text: &str) -> String {
    let thanks_re = Regex::new(r"\\thanks\s*\{[^}]*\}").unwrap();
    let cmd_re = Regex::new(r"\\[a-zA-Z]+\s*").unwrap();
    let text = thanks_re.replace_all(text, "");
    let text = cmd_re.replace_all(&text, "");
    text.replace(['{', '}'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 章节正文的轻量清理：去掉引用类命令和环境标记，压缩空行
fn clean_block(text: &str) -> String {
    let ref_re = Regex::new(r"\\(?:label|cite|ref|eqref|footnote)\s*\{[^}]*\}").unwrap();
    let env_re = Regex::new(r"\\(?:begin|end)\s*\{[^}]*\}").unwrap();
    let wrap_re = Regex::new(r"\\(?:textbf|textit|emph|texttt)\s*\{([^}]*)\}").unwrap();

    let text = ref_re.replace_all(text, "");
    let text = env_re.replace_all(&text, "");
    let text = wrap_re.replace_all(&text, "$1");

    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('\\'))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tei;

    const SAMPLE: &str = r"\documentclass{article}
\title{Structured Extraction}
\author{Ada Lovelace \and Alan Turing}
\author{Grace Hopper}
\begin{document}
\maketitle
\begin{abstract}
We extract structure. % inline note
\end{abstract}
\section{Introduction}
Intro body text. \cite{smith2020}
\subsection{Background}
Background body.
\section{Methods}
Method body.
\end{document}
Trailing junk that must be ignored.
\section{Ghost}
";

    #[test]
    fn metadata_comes_from_commands() {
        let tree = recover(SAMPLE, "file");
        let info = tei::parse_header(&tree);
        assert_eq!(info.title, "Structured Extraction");
        assert_eq!(
            info.authors,
            vec!["Ada Lovelace", "Alan Turing", "Grace Hopper"]
        );
        assert_eq!(info.abstract_text, "We extract structure.");
    }

    #[test]
    fn sectioning_commands_nest_by_level() {
        let tree = recover(SAMPLE, "file");
        let sections = tei::parse_sections(&tree);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "Introduction");
        assert!(sections[0].content.contains("Intro body text."));
        assert!(!sections[0].content.contains("cite"));
        assert_eq!(sections[0].subsections[0].title, "Background");
        assert_eq!(sections[1].title, "Methods");
    }

    #[test]
    fn content_after_end_document_is_ignored() {
        let tree = recover(SAMPLE, "file");
        let sections = tei::parse_sections(&tree);
        assert!(sections.iter().all(|s| s.title != "Ghost"));
    }

    #[test]
    fn missing_title_falls_back_to_filename() {
        let tree = recover(r"\section{Only}body", "draft3");
        let info = tei::parse_header(&tree);
        assert_eq!(info.title, "draft3");
    }
}
