//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (validator derive 规则)
//! - 广播超时不超过上限
//! - 重试次数不超过上限

use contracts::{EngineConfig, PipelineError};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 广播超时上限 (毫秒)
pub const MAX_MULTIPLIER_TIMEOUT_MS: u64 = 60 * 60 * 1000;

/// panic 重试次数上限
pub const MAX_RETRIES: u32 = 1000;

/// 校验 EngineConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &EngineConfig) -> Result<(), PipelineError> {
    validate_field_rules(config)?;
    validate_multiplier(config)?;
    validate_supervision(config)?;
    Ok(())
}

/// 校验 derive 声明的字段规则
fn validate_field_rules(config: &EngineConfig) -> Result<(), PipelineError> {
    config.validate().map_err(|errors| {
        let (field, message) = first_error("", &errors);
        PipelineError::config_validation(field, message)
    })
}

/// 取出第一个字段错误，返回 (路径, 描述)
fn first_error(prefix: &str, errors: &ValidationErrors) -> (String, String) {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    for (field, kind) in fields {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                if let Some(err) = list.first() {
                    let message = match &err.message {
                        Some(message) => message.to_string(),
                        None => format!("failed '{}' rule", err.code),
                    };
                    return (path, message);
                }
            }
            ValidationErrorsKind::Struct(nested) => return first_error(&path, nested),
            ValidationErrorsKind::List(items) => {
                if let Some((idx, nested)) = items.iter().next() {
                    return first_error(&format!("{path}[{idx}]"), nested);
                }
            }
        }
    }
    (prefix.to_string(), "invalid value".to_string())
}

/// 校验广播配置
fn validate_multiplier(config: &EngineConfig) -> Result<(), PipelineError> {
    let timeout_ms = config.multiplier.timeout_ms;
    if timeout_ms > MAX_MULTIPLIER_TIMEOUT_MS {
        return Err(PipelineError::config_validation(
            "multiplier.timeout_ms",
            format!("timeout_ms must be <= {MAX_MULTIPLIER_TIMEOUT_MS}, got {timeout_ms}"),
        ));
    }
    Ok(())
}

/// 校验监督配置
fn validate_supervision(config: &EngineConfig) -> Result<(), PipelineError> {
    let retries = config.supervision.max_retries;
    if retries > MAX_RETRIES {
        return Err(PipelineError::config_validation(
            "supervision.max_retries",
            format!("max_retries must be <= {MAX_RETRIES}, got {retries}"),
        ));
    }
    Ok(())
}
