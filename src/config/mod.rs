use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub extractor: ExtractorConfig,
    pub enhancer: EnhancerConfig,
}

/// 提取选项包
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractorConfig {
    /// 结构分析服务地址
    pub endpoint_url: String,
    pub service_timeout_secs: u64,
    pub include_citations: bool,
    pub include_raw_text: bool,
    pub include_structured_text: bool,
    pub include_figures: bool,
    pub include_formulas: bool,
    /// 未识别格式兜底时截取的最大字符数
    pub stub_max_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnhancerConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub proxy: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/settings.toml");

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            enhancer: EnhancerConfig {
                api_key: "your-api-key".to_string(),
                api_url: "https://api.minimax.chat/v1/text/chatcompletion_v2".to_string(),
                model: "abab6.5-chat".to_string(),
                proxy: String::new(),
            },
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:8070".to_string(),
            service_timeout_secs: 60,
            include_citations: true,
            include_raw_text: false,
            include_structured_text: true,
            include_figures: true,
            include_formulas: true,
            stub_max_chars: 4000,
        }
    }
}
