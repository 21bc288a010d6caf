//! 内置子模块
//!
//! 示例子模块实现了完整的子模块接口（CMI），
//! 供演示入口与测试挂载；真实页面内容由外部协作方提供。

pub mod example;

pub use example::{builtin_loader, ExampleExperiment, ExampleQuestionnaire};
