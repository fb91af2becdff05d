use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Principal;

fn default_jwt_secret() -> String {
    "your-secret-key-change-this-in-production".to_string()
}

fn default_jwt_expiration_hours() -> i64 {
    24
}

fn default_dev_principal() -> Principal {
    Principal::admin(Uuid::nil())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8080".to_string(),
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
            request_timeout_seconds: 30,
            auth: AuthConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_address.is_empty() {
            return Err(anyhow::anyhow!("绑定地址不能为空"));
        }
        if !self.bind_address.contains(':') {
            return Err(anyhow::anyhow!("绑定地址格式无效，应为 host:port"));
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }
        self.auth.validate()?;

        Ok(())
    }
}

/// 认证配置
///
/// 关闭认证时所有请求都以 `dev_principal` 的身份执行，只应在本地开发中使用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiration_hours")]
    pub jwt_expiration_hours: i64,
    #[serde(default = "default_dev_principal")]
    pub dev_principal: Principal,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            jwt_secret: default_jwt_secret(),
            jwt_expiration_hours: default_jwt_expiration_hours(),
            dev_principal: default_dev_principal(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.enabled {
            if self.jwt_secret.is_empty() {
                return Err(anyhow::anyhow!("JWT密钥不能为空"));
            }

            if self.jwt_secret.len() < 32 {
                return Err(anyhow::anyhow!("JWT密钥长度应至少32字符"));
            }

            if self.jwt_expiration_hours <= 0 {
                return Err(anyhow::anyhow!("JWT过期时间必须大于0"));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// `pretty` 或 `json`
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level,
                valid_log_levels
            ));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志格式: {}，支持的格式: {:?}",
                self.log_format,
                valid_formats
            ));
        }

        Ok(())
    }
}
