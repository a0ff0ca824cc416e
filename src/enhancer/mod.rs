use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EnhancerConfig;
use crate::parser::PaperContent;

/// 增强能力对象
///
/// 管道只持有一个这样的对象，可用性只在注入处检查一次，
/// 不在各调用点查询全局状态。
#[async_trait]
pub trait Enhancer: Send + Sync {
    fn is_available(&self) -> bool;
    async fn query(&self, prompt: &str) -> Result<EnhancerReply>;
}

pub struct EnhancerReply {
    pub content: String,
}

/// Chat API 请求体
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat API 响应体
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

pub struct LlmEnhancer {
    client: reqwest::Client,
    config: EnhancerConfig,
}

impl LlmEnhancer {
    pub fn new(config: EnhancerConfig) -> Self {
        let mut builder = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60));

        if !config.proxy.is_empty() {
            match reqwest::Proxy::all(&config.proxy) {
                Ok(proxy) => {
                    info!("使用代理: {}", config.proxy);
                    builder = builder.proxy(proxy);
                }
                Err(e) => {
                    warn!("代理配置无效 '{}': {}", config.proxy, e);
                }
            }
        }

        let client = builder.build().expect("Failed to create HTTP client");
        Self { client, config }
    }

    async fn do_request(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .context("发送请求失败")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API 返回错误 {}: {}", status, body);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("解析 API 响应失败")?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(content)
    }
}

#[async_trait]
impl Enhancer for LlmEnhancer {
    /// 检查 API key 是否已配置
    fn is_available(&self) -> bool {
        !self.config.api_key.is_empty() && self.config.api_key != "your-api-key"
    }

    /// 单次请求，不重试；失败由管道降级处理
    async fn query(&self, prompt: &str) -> Result<EnhancerReply> {
        let system_prompt = "你是一位学术论文结构化专家。用户会给你一份JSON格式的论文提取结果。\n\
             请修正其中明显的提取错误（截断的标题、错误的章节归属、残缺的引文），\n\
             保持JSON结构和字段名完全不变，只输出修正后的JSON，不要添加任何解释。";

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.3,
        };

        let content = self.do_request(&request).await?;
        Ok(EnhancerReply { content })
    }
}

/// 把当前提取结果序列化为增强请求
pub fn build_enhancement_prompt(content: &PaperContent) -> Result<String> {
    let json = serde_json::to_string_pretty(content).context("序列化提取结果失败")?;
    Ok(format!("请修正以下论文提取结果：\n\n{}", json))
}

/// 解析增强响应中的内容JSON，可能包裹在代码块围栏中
///
/// 解析失败返回None，调用方丢弃增强结果，绝不向外传播。
pub fn parse_enhanced_content(raw: &str) -> Option<PaperContent> {
    let body = strip_code_fence(raw.trim());
    serde_json::from_str(body).ok()
}

fn strip_code_fence(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }
    // 去掉 ```json 行和结尾的 ```
    let after_open = text.find('\n').map(|i| &text[i + 1..]).unwrap_or(text);
    after_open
        .rfind("```")
        .map(|i| after_open[..i].trim())
        .unwrap_or(after_open)
}
