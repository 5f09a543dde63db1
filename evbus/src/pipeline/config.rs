use bon::Builder;
use serde::Deserialize;

use crate::error::{BusError, BusResult};
use crate::failure::FailurePolicy;

/// 流水线配置
#[derive(Builder, Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 执行阶段的最大并行度；`None` 为不限
    pub max_parallelism: Option<usize>,
    /// 订阅者失败时的处置策略
    #[builder(default)]
    pub failure_policy: FailurePolicy,
}

impl PipelineConfig {
    pub(crate) fn validate(&self) -> BusResult<()> {
        if self.max_parallelism == Some(0) {
            return Err(BusError::invalid_argument(
                "max_parallelism must be greater than zero",
            ));
        }
        Ok(())
    }
}
