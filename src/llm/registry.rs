//! 模型注册表：角色 → 后端
//!
//! 启动时构造一次，之后以只读方式传入 RunEngine。planner / actor 必须存在，critic 可选。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::EngineError;
use crate::llm::{ModelProvider, ModelRole};

#[derive(Clone, Default)]
pub struct ModelRegistry {
    providers: BTreeMap<ModelRole, Arc<dyn ModelProvider>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同一后端承担全部三个角色
    pub fn single(provider: Arc<dyn ModelProvider>) -> Self {
        Self::new()
            .with(ModelRole::Planner, provider.clone())
            .with(ModelRole::Actor, provider.clone())
            .with(ModelRole::Critic, provider)
    }

    pub fn with(mut self, role: ModelRole, provider: Arc<dyn ModelProvider>) -> Self {
        self.providers.insert(role, provider);
        self
    }

    pub fn without(mut self, role: ModelRole) -> Self {
        self.providers.remove(&role);
        self
    }

    pub fn get(&self, role: ModelRole) -> Option<&Arc<dyn ModelProvider>> {
        self.providers.get(&role)
    }

    pub fn require(&self, role: ModelRole) -> Result<&Arc<dyn ModelProvider>, EngineError> {
        self.get(role).ok_or(EngineError::MissingModel(role))
    }

    pub fn has_critic(&self) -> bool {
        self.providers.contains_key(&ModelRole::Critic)
    }

    pub fn roles(&self) -> Vec<ModelRole> {
        self.providers.keys().copied().collect()
    }
}
