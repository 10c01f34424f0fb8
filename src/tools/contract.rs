//! 工具契约：名称、描述、风险等级、所需 scopes、输入 / 输出 schema、路径前缀、数据处理标记、幂等配置
//!
//! 契约在构造时即校验：WRITE 风险的工具必须声明幂等配置，schema 必须能编译，
//! 否则 build() 直接返回 ContractError（不会拖到执行期才发现）。

use std::path::PathBuf;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::tools::schema::check_schema;
use crate::tools::ToolCall;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Tool name must not be empty")]
    EmptyName,

    #[error("WRITE tool '{0}' must declare idempotency configuration")]
    MissingIdempotency(String),

    #[error("Tool '{0}' derives idempotency keys from arguments but lists no fields")]
    EmptyIdempotencyFields(String),

    #[error("Tool '{tool}' has invalid {which} schema: {message}")]
    InvalidSchema {
        tool: String,
        which: &'static str,
        message: String,
    },
}

/// 风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Read,
    Write,
}

/// 数据处理标记：命中任一项时工具事件中的参数 / 输出整体脱敏
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DataHandling {
    pub pii: bool,
    pub secrets: bool,
}

/// 幂等配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "fields", rename_all = "snake_case")]
pub enum Idempotency {
    /// 操作天然幂等；调用方给出 key 时同样去重
    Natural,
    /// 每次调用必须携带 idempotency_key
    CallKey,
    /// 调用未携带 key 时，由这些参数字段的值派生 key
    Arguments(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolContract {
    name: String,
    description: String,
    risk: RiskLevel,
    required_scopes: Vec<String>,
    input_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_schema: Option<Value>,
    read_paths: Vec<PathBuf>,
    write_paths: Vec<PathBuf>,
    data_handling: DataHandling,
    #[serde(skip_serializing_if = "Option::is_none")]
    idempotency: Option<Idempotency>,
}

impl ToolContract {
    pub fn builder(name: impl Into<String>) -> ToolContractBuilder {
        ToolContractBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn risk(&self) -> RiskLevel {
        self.risk
    }

    pub fn required_scopes(&self) -> &[String] {
        &self.required_scopes
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }

    pub fn read_paths(&self) -> &[PathBuf] {
        &self.read_paths
    }

    pub fn write_paths(&self) -> &[PathBuf] {
        &self.write_paths
    }

    /// WRITE 工具检查写路径，其余检查读路径
    pub fn permitted_paths(&self) -> &[PathBuf] {
        match self.risk {
            RiskLevel::Write => &self.write_paths,
            RiskLevel::Read => &self.read_paths,
        }
    }

    pub fn data_handling(&self) -> DataHandling {
        self.data_handling
    }

    pub fn handles_sensitive_data(&self) -> bool {
        self.data_handling.pii || self.data_handling.secrets
    }

    pub fn idempotency(&self) -> Option<&Idempotency> {
        self.idempotency.as_ref()
    }

    /// 本次调用的幂等 key；未配置幂等或无法得到 key 时为 None
    pub fn idempotency_key(&self, call: &ToolCall) -> Option<String> {
        match self.idempotency.as_ref()? {
            Idempotency::Natural | Idempotency::CallKey => call.idempotency_key.clone(),
            Idempotency::Arguments(fields) => call.idempotency_key.clone().or_else(|| {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|f| call.arguments.get(f).cloned().unwrap_or(Value::Null).to_string())
                    .collect();
                Some(parts.join("|"))
            }),
        }
    }
}

pub struct ToolContractBuilder {
    name: String,
    description: String,
    risk: RiskLevel,
    required_scopes: Vec<String>,
    input_schema: Value,
    output_schema: Option<Value>,
    read_paths: Vec<PathBuf>,
    write_paths: Vec<PathBuf>,
    data_handling: DataHandling,
    idempotency: Option<Idempotency>,
}

impl ToolContractBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            risk: RiskLevel::Read,
            required_scopes: Vec::new(),
            input_schema: json!({"type": "object"}),
            output_schema: None,
            read_paths: Vec::new(),
            write_paths: Vec::new(),
            data_handling: DataHandling::default(),
            idempotency: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn risk(mut self, risk: RiskLevel) -> Self {
        self.risk = risk;
        self
    }

    pub fn required_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn read_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.read_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn write_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.write_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn data_handling(mut self, pii: bool, secrets: bool) -> Self {
        self.data_handling = DataHandling { pii, secrets };
        self
    }

    pub fn idempotency(mut self, idempotency: Idempotency) -> Self {
        self.idempotency = Some(idempotency);
        self
    }

    pub fn build(self) -> Result<ToolContract, ContractError> {
        if self.name.trim().is_empty() {
            return Err(ContractError::EmptyName);
        }
        match (&self.risk, &self.idempotency) {
            (RiskLevel::Write, None) => {
                return Err(ContractError::MissingIdempotency(self.name));
            }
            (_, Some(Idempotency::Arguments(fields))) if fields.is_empty() => {
                return Err(ContractError::EmptyIdempotencyFields(self.name));
            }
            _ => {}
        }
        check_schema(&self.input_schema).map_err(|message| ContractError::InvalidSchema {
            tool: self.name.clone(),
            which: "input",
            message,
        })?;
        if let Some(ref output) = self.output_schema {
            check_schema(output).map_err(|message| ContractError::InvalidSchema {
                tool: self.name.clone(),
                which: "output",
                message,
            })?;
        }
        Ok(ToolContract {
            name: self.name,
            description: self.description,
            risk: self.risk,
            required_scopes: self.required_scopes,
            input_schema: self.input_schema,
            output_schema: self.output_schema,
            read_paths: self.read_paths,
            write_paths: self.write_paths,
            data_handling: self.data_handling,
            idempotency: self.idempotency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_without_idempotency_fails_fast() {
        let err = ToolContract::builder("write_file")
            .risk(RiskLevel::Write)
            .build()
            .unwrap_err();
        assert_eq!(err, ContractError::MissingIdempotency("write_file".to_string()));
    }

    #[test]
    fn test_write_with_idempotency_builds() {
        let c = ToolContract::builder("write_file")
            .risk(RiskLevel::Write)
            .write_paths(["/tmp/ws"])
            .idempotency(Idempotency::CallKey)
            .build()
            .unwrap();
        assert_eq!(c.permitted_paths(), [PathBuf::from("/tmp/ws")]);
    }

    #[test]
    fn test_read_tool_needs_no_idempotency() {
        let c = ToolContract::builder("echo").build().unwrap();
        assert_eq!(c.risk(), RiskLevel::Read);
        assert!(c.idempotency().is_none());
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let err = ToolContract::builder("echo")
            .input_schema(json!({"type": 12}))
            .build()
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidSchema { which: "input", .. }));
    }

    #[test]
    fn test_empty_name_and_fields_rejected() {
        assert_eq!(
            ToolContract::builder("  ").build().unwrap_err(),
            ContractError::EmptyName
        );
        assert!(matches!(
            ToolContract::builder("w")
                .risk(RiskLevel::Write)
                .idempotency(Idempotency::Arguments(vec![]))
                .build(),
            Err(ContractError::EmptyIdempotencyFields(_))
        ));
    }

    #[test]
    fn test_idempotency_key_derivation() {
        let c = ToolContract::builder("write_file")
            .risk(RiskLevel::Write)
            .idempotency(Idempotency::Arguments(vec!["path".into(), "content".into()]))
            .build()
            .unwrap();
        let call = ToolCall::new("write_file", json!({"path": "a.txt", "content": "x"}));
        assert_eq!(c.idempotency_key(&call).as_deref(), Some("\"a.txt\"|\"x\""));
        let keyed = call.clone().with_idempotency_key("k1");
        assert_eq!(c.idempotency_key(&keyed).as_deref(), Some("k1"));

        let read = ToolContract::builder("echo").build().unwrap();
        assert!(read.idempotency_key(&keyed).is_none());
    }
}
