pub mod latex;
pub mod markdown;
pub mod pdf_text;

use std::path::Path;
use tracing::{info, warn};

use crate::config::ExtractorConfig;
use crate::grobid::GrobidClient;
use crate::parser::tree::DocNode;
use crate::utils::ExtractError;

/// 格式路由：检查文件、尝试结构分析服务、按扩展名选择降级分支
///
/// 除文件不存在外的任何失败都不向外抛出；每个分支都返回
/// 合法的中间文档树，下游只有一种消费契约。
pub async fn route(
    path: &Path,
    config: &ExtractorConfig,
    grobid: &GrobidClient,
) -> Result<DocNode, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::NotFound(path.display().to_string()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    if ext == "pdf" {
        match grobid.process_fulltext(path).await {
            Ok(xml) => match DocNode::parse_xml(&xml) {
                Ok(tree) => {
                    info!("结构分析服务解析成功");
                    return Ok(tree);
                }
                Err(e) => {
                    warn!("{}", ExtractError::MalformedInput(e.to_string()));
                }
            },
            Err(e) => {
                warn!("{}", ExtractError::ServiceUnavailable(e.to_string()));
            }
        }
        info!("进入降级链: {}", path.display());
    }

    Ok(fallback_tree(path, &ext, config))
}

fn fallback_tree(path: &Path, ext: &str, config: &ExtractorConfig) -> DocNode {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    match ext {
        "pdf" => pdf_text::recover(path, &stem),
        "md" | "markdown" => markdown::recover(&read_lossy(path), &stem),
        "tex" | "latex" => latex::recover(&read_lossy(path), &stem),
        _ => plain_stub(&read_lossy(path), &stem, config.stub_max_chars),
    }
}

fn read_lossy(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("读取文件失败 {}: {}", path.display(), e);
            String::new()
        }
    }
}

/// 未识别格式兜底：文件名做标题，截取开头文本作为单个章节
fn plain_stub(text: &str, stem: &str, max_chars: usize) -> DocNode {
    let snippet: String = text.chars().take(max_chars).collect();
    let div = DocNode::element("div")
        .child(DocNode::with_text("head", "Content"))
        .child(DocNode::with_text("p", snippet.trim()));
    assemble_tei(stem, &[], "", vec![div], Vec::new())
}

/// 把降级分支恢复出的内容组装为TEI形状的文档树
pub(crate) fn assemble_tei(
    title: &str,
    authors: &[String],
    abstract_text: &str,
    divs: Vec<DocNode>,
    bibl_entries: Vec<DocNode>,
) -> DocNode {
    let mut file_desc = DocNode::element("fileDesc")
        .child(DocNode::element("titleStmt").child(DocNode::with_text("title", title)));
    if !authors.is_empty() {
        let mut analytic = DocNode::element("analytic");
        for author in authors {
            analytic.push(DocNode::with_text("author", author));
        }
        file_desc.push(
            DocNode::element("sourceDesc")
                .child(DocNode::element("biblStruct").child(analytic)),
        );
    }

    let mut header = DocNode::element("teiHeader").child(file_desc);
    if !abstract_text.trim().is_empty() {
        header.push(
            DocNode::element("profileDesc").child(
                DocNode::element("abstract")
                    .child(DocNode::with_text("p", abstract_text.trim())),
            ),
        );
    }

    let mut body = DocNode::element("body");
    for div in divs {
        body.push(div);
    }
    let mut text = DocNode::element("text").child(body);

    if !bibl_entries.is_empty() {
        let mut list = DocNode::element("listBibl");
        for entry in bibl_entries {
            list.push(entry);
        }
        text.push(
            DocNode::element("back")
                .child(DocNode::element("div").attr_value("type", "references").child(list)),
        );
    }

    DocNode::element("TEI").child(header).child(text)
}

/// 按标题层级把扁平的标题流折叠成嵌套div结构
pub(crate) struct SectionStack {
    stack: Vec<(u8, DocNode)>,
    done: Vec<DocNode>,
}

impl SectionStack {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            done: Vec::new(),
        }
    }

    pub fn open(&mut self, level: u8, heading: &str) {
        while self
            .stack
            .last()
            .map(|(l, _)| *l >= level)
            .unwrap_or(false)
        {
            self.close_one();
        }
        let div = DocNode::element("div").child(DocNode::with_text("head", heading.trim()));
        self.stack.push((level, div));
    }

    /// 把段落附到当前打开的章节；没有打开的章节时返回false
    pub fn add_paragraph(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return true;
        }
        match self.stack.last_mut() {
            Some((_, div)) => {
                div.push(DocNode::with_text("p", text));
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty() && self.done.is_empty()
    }

    fn close_one(&mut self) {
        if let Some((_, node)) = self.stack.pop() {
            match self.stack.last_mut() {
                Some((_, parent)) => parent.push(node),
                None => self.done.push(node),
            }
        }
    }

    pub fn finish(mut self) -> Vec<DocNode> {
        while !self.stack.is_empty() {
            self.close_one();
        }
        self.done
    }
}
