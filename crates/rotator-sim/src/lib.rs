//! # Rotator Sim
//!
//! 模拟旋转台控制器，用于离线测试与仿真模式：
//! - 周期性发送遥测，连接时与配置变化后发送配置帧
//! - 支持 Enable / StandBy / ClearError、PositionSet + Move（每周期 5°）、Stop、
//!   命令源切换及速度/加速度/急动度配置命令
//! - 测试注入：跟随误差故障、暂停遥测、随机垃圾帧、静默（不应答）

pub mod model;
mod server;

pub use model::SimulatedController;
pub use server::{MockConfig, MockController};
