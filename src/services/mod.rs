//! 业务逻辑服务模块
//!
//! 封装行情获取、规范化、存储和采集调度逻辑

pub mod eastmoney;     // 东方财富行情数据源
pub mod normalizer;    // 原始行规范化
pub mod orchestrator;  // 采集编排
pub mod scheduler;     // 每日定时任务
pub mod store;         // 文档存储网关
