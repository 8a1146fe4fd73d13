//! kvlab-bootstrap - 统一启动骨架
//!
//! 运行时初始化、关闭信号与基础设施资源容器

mod infrastructure;
mod runtime;

pub use infrastructure::*;
pub use runtime::*;
