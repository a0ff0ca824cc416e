use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use paperext::config::AppConfig;
use paperext::enhancer::LlmEnhancer;
use paperext::parser::ExtractionPipeline;
use paperext::utils::logger;

#[derive(Parser)]
#[command(name = "paperext")]
#[command(about = "论文内容结构化提取系统", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 提取单个文件为结构化JSON
    Extract {
        /// 输入文件 (pdf / md / tex / txt)
        file: PathBuf,
        /// 输出JSON路径，不指定时打印到标准输出
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 覆盖结构分析服务地址
        #[arg(long)]
        endpoint: Option<String>,
        /// 启用增强通道
        #[arg(long)]
        enhance: bool,
        /// 跳过引文解析
        #[arg(long)]
        no_citations: bool,
        /// 跳过图与表格分类
        #[arg(long)]
        no_figures: bool,
        /// 跳过公式收集
        #[arg(long)]
        no_formulas: bool,
        /// 在结果中附带原始文本
        #[arg(long)]
        raw_text: bool,
    },
    /// 生成默认配置文件
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logger();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            file,
            output,
            endpoint,
            enhance,
            no_citations,
            no_figures,
            no_formulas,
            raw_text,
        } => {
            extract_command(
                file,
                output,
                endpoint,
                enhance,
                no_citations,
                no_figures,
                no_formulas,
                raw_text,
            )
            .await?;
        }
        Commands::InitConfig => {
            init_config_command().await?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn extract_command(
    file: PathBuf,
    output: Option<PathBuf>,
    endpoint: Option<String>,
    enhance: bool,
    no_citations: bool,
    no_figures: bool,
    no_formulas: bool,
    raw_text: bool,
) -> Result<()> {
    let mut config = AppConfig::load()?;
    if let Some(endpoint) = endpoint {
        config.extractor.endpoint_url = endpoint;
    }
    config.extractor.include_citations = !no_citations;
    config.extractor.include_figures = !no_figures;
    config.extractor.include_formulas = !no_formulas;
    config.extractor.include_raw_text = raw_text;

    let enhancer_config = config.enhancer.clone();
    let mut pipeline = ExtractionPipeline::new(config);
    if enhance {
        let enhancer = LlmEnhancer::new(enhancer_config);
        pipeline = pipeline.with_enhancer(Box::new(enhancer));
    }

    let content = pipeline.extract(&file).await?;

    info!("标题: {}", content.paper_info.title);
    info!("作者: {}", content.paper_info.authors.join(", "));
    info!(
        "章节 {} / 算法 {} / 公式 {} / 图 {} / 表格 {} / 引文 {}",
        content.sections.len(),
        content.algorithms.len(),
        content.equations.len(),
        content.figures.len(),
        content.tables.len(),
        content.citations.len(),
    );

    let json = serde_json::to_string_pretty(&content)?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, json).await?;
            info!("✅ 结果已写入: {}", path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

async fn init_config_command() -> Result<()> {
    tokio::fs::create_dir_all("config").await?;

    let config = AppConfig::default();
    config.save("config/settings.toml")?;
    info!("✅ 已生成配置文件: config/settings.toml");
    info!("下一步:");
    info!("  1. 编辑 config/settings.toml 配置结构分析服务地址");
    info!("  2. 如需增强通道，配置 [enhancer] api_key");
    info!("  3. 运行 'paperext extract <file>' 开始提取");

    Ok(())
}
