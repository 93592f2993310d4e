//! # `rosoku-enrich` - K 线富化引擎
//!
//! 对每根刚收盘的 K 线计算技术指标 (趋势/动量/波动/量能)、识别
//! 蜡烛与图表形态、划分市场阶段、聚类支撑/阻力，并加权融合为
//! 交易信号摘要。
//!
//! 全部计算对相同输入严格确定；单类指标失败只降级该类别，
//! 基础 OHLCV 永远不因富化失败被丢弃。

pub mod engine;
pub mod history;
pub mod indicators;
pub mod levels;
pub mod patterns;
pub mod regime;
pub mod service;
pub mod signal;
