pub mod logger;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("文件不存在: {0}")]
    NotFound(String),

    #[error("结构分析服务不可用: {0}")]
    ServiceUnavailable(String),

    #[error("结构标记格式错误: {0}")]
    MalformedInput(String),

    #[error("元素分类失败: {0}")]
    Classification(String),

    #[error("增强响应解析失败: {0}")]
    EnhancementParse(String),

    #[error("网络请求错误: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type ExtractResult<T> = Result<T, ExtractError>;
