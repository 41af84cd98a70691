//! 基础设施层 - 会话驱动抽象与 tmux 实现

pub mod driver;
pub mod tmux;

pub use driver::{DriverError, SessionDriver};
pub use tmux::TmuxManager;
