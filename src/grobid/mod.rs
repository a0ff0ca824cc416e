use anyhow::{Context, Result};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// 结构分析服务客户端（GROBID兼容接口）
///
/// 失败不在这里重试：任何传输错误或非2xx状态都视为服务不可用，
/// 由路由层转入降级链。
pub struct GrobidClient {
    client: Client,
    endpoint: String,
}

impl GrobidClient {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("paperext/0.1 (academic paper extraction)")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// 上传文件获取TEI结构标记文本
    pub async fn process_fulltext(&self, path: &Path) -> Result<String> {
        let url = format!("{}/api/processFulltextDocument", self.endpoint);
        info!("请求结构分析服务: {}", url);

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("读取文件失败: {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.pdf".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/pdf")
            .context("构造multipart失败")?;
        let form = reqwest::multipart::Form::new().part("input", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("发送请求失败")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("服务返回错误 {}", status);
        }

        let body = response.text().await.context("读取响应失败")?;
        info!("收到结构标记, {} 字节", body.len());
        Ok(body)
    }
}
