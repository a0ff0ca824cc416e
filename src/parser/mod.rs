pub mod algorithm_extractor;
pub mod citation_parser;
pub mod figure_extractor;
pub mod formula_extractor;
pub mod table_parser;
pub mod tei;
pub mod tree;

pub use algorithm_extractor::AlgorithmExtractor;
pub use citation_parser::CitationParser;
pub use figure_extractor::FigureExtractor;
pub use formula_extractor::FormulaExtractor;
pub use table_parser::TableParser;
pub use tree::DocNode;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::enhancer::{self, Enhancer};
use crate::grobid::GrobidClient;
use crate::router;
use crate::utils::ExtractError;

/// 论文元数据，永远完整填充（缺失字段使用文档化默认值）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperInfo {
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    pub year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
}

/// 论文章节，id按 sec-1 / sec-1.2 的层级方案生成
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperSection {
    pub id: String,
    pub level: u8,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub subsections: Vec<PaperSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmComplexity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperAlgorithm {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pseudocode: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    pub section_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<AlgorithmComplexity>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquationType {
    Inline,
    Display,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperEquation {
    pub id: String,
    pub content: String,
    pub section_id: String,
    #[serde(rename = "type")]
    pub equation_type: EquationType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperFigure {
    pub id: String,
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub section_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperTable {
    pub id: String,
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub section_id: String,
    /// 行优先矩阵，允许参差行，但永远至少一行
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperCitation {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
}

/// 聚合根：一次提取调用的全部结果
///
/// 各元素通过section id弱引用章节，不持有对象引用。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperContent {
    pub paper_info: PaperInfo,
    pub sections: Vec<PaperSection>,
    #[serde(default)]
    pub algorithms: Vec<PaperAlgorithm>,
    #[serde(default)]
    pub equations: Vec<PaperEquation>,
    #[serde(default)]
    pub figures: Vec<PaperFigure>,
    #[serde(default)]
    pub tables: Vec<PaperTable>,
    #[serde(default)]
    pub citations: Vec<PaperCitation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

/// 统一提取管道
///
/// 路由 → 结构解析 → 元素分类 → 引文解析 → 可选增强。
/// 每次调用构造全新的值对象，不同文件的并发提取无需协调。
pub struct ExtractionPipeline {
    config: AppConfig,
    grobid: GrobidClient,
    algorithm_extractor: AlgorithmExtractor,
    formula_extractor: FormulaExtractor,
    figure_extractor: FigureExtractor,
    table_parser: TableParser,
    citation_parser: CitationParser,
    enhancer: Option<Box<dyn Enhancer>>,
}

impl ExtractionPipeline {
    pub fn new(config: AppConfig) -> Self {
        let grobid = GrobidClient::new(
            &config.extractor.endpoint_url,
            config.extractor.service_timeout_secs,
        );
        Self {
            config,
            grobid,
            algorithm_extractor: AlgorithmExtractor::new(),
            formula_extractor: FormulaExtractor::new(),
            figure_extractor: FigureExtractor::new(),
            table_parser: TableParser::new(),
            citation_parser: CitationParser::new(),
            enhancer: None,
        }
    }

    /// 注入增强能力对象，管道只在这里感知一次可用性
    pub fn with_enhancer(mut self, enhancer: Box<dyn Enhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    /// 处理一个文件，返回完整的结构化内容
    ///
    /// 只有文件不存在会返回Err；其余失败全部降级为更小但形状完整的结果。
    pub async fn extract(&self, path: impl AsRef<std::path::Path>) -> Result<PaperContent, ExtractError> {
        let path = path.as_ref();
        info!("开始提取管道: {}", path.display());

        let tree = router::route(path, &self.config.extractor, &self.grobid).await?;
        let raw_text = tree.text_content();

        let paper_info = tei::parse_header(&tree);
        let mut sections = tei::parse_sections(&tree);
        info!("提取到 {} 个章节", sections.len());
        if !self.config.extractor.include_structured_text {
            clear_section_bodies(&mut sections);
        }

        let opts = &self.config.extractor;
        let algorithms = self.algorithm_extractor.extract(&tree, &raw_text);
        let equations = if opts.include_formulas {
            self.formula_extractor.extract(&tree, &raw_text)
        } else {
            Vec::new()
        };
        let (figures, tables) = if opts.include_figures {
            (
                self.figure_extractor.extract(&tree, &raw_text),
                self.table_parser.extract(&tree, &raw_text),
            )
        } else {
            (Vec::new(), Vec::new())
        };
        let citations = if opts.include_citations {
            self.citation_parser.extract(&tree)
        } else {
            Vec::new()
        };

        let content = PaperContent {
            paper_info,
            sections,
            algorithms,
            equations,
            figures,
            tables,
            citations,
            raw_text: opts.include_raw_text.then_some(raw_text),
        };

        info!(
            "提取完成: {} 章节, {} 算法, {} 公式, {} 图, {} 表格, {} 引文",
            content.sections.len(),
            content.algorithms.len(),
            content.equations.len(),
            content.figures.len(),
            content.tables.len(),
            content.citations.len(),
        );

        match &self.enhancer {
            Some(e) if e.is_available() => Ok(self.enhance(content, e.as_ref()).await),
            _ => Ok(content),
        }
    }

    /// 增强通道：响应解析失败时丢弃增强结果，返回增强前内容
    async fn enhance(&self, content: PaperContent, enhancer: &dyn Enhancer) -> PaperContent {
        info!("调用增强通道...");
        let prompt = match enhancer::build_enhancement_prompt(&content) {
            Ok(p) => p,
            Err(e) => {
                warn!("增强请求构造失败: {}", e);
                return content;
            }
        };
        match enhancer.query(&prompt).await {
            Ok(reply) => match enhancer::parse_enhanced_content(&reply.content) {
                Some(enhanced) => {
                    info!("增强完成");
                    enhanced
                }
                None => {
                    warn!(
                        "{}",
                        ExtractError::EnhancementParse("响应不是有效的内容JSON".to_string())
                    );
                    content
                }
            },
            Err(e) => {
                warn!("增强调用失败: {}，保留原始内容", e);
                content
            }
        }
    }
}

fn clear_section_bodies(sections: &mut [PaperSection]) {
    for section in sections {
        section.content.clear();
        clear_section_bodies(&mut section.subsections);
    }
}
