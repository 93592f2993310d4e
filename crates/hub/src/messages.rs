//! # WebSocket 线上消息
//!
//! 客户端与服务端 JSON 消息的完整形状定义，以及 K 线载荷与
//! 领域实体之间的转换。周期字段在本层做协议长形式
//! (`1min`…`1day`) 与内部短形式 (`1m`…`1d`) 的互转。

use chrono::{DateTime, Utc};
use rosoku_core::common::TimeFrame;
use rosoku_core::enrich::entity::{AnalysisReport, EnrichedCandle, IndicatorVector, SignalSummary};
use rosoku_core::market::entity::Candle;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 客户端上行消息：订阅控制或保活。
///
/// # Invariants
/// - `type ∈ {subscription, ping}`；`action ∈ {subscribe, unsubscribe}`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    // 协议长形式周期，如 "1min"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// # Summary
/// 服务端下行消息。`data` 按 `type` 携带 K 线或富化载荷，
/// `interval` 为顶层周期副本，方便客户端不拆包路由。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ServerMessage {
    fn bare(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            symbol: None,
            timeframe: None,
            interval: None,
            data: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// 连接确认通知
    pub fn connected() -> Self {
        Self::bare("connected")
    }

    /// 保活应答
    pub fn pong() -> Self {
        Self::bare("pong")
    }

    /// 错误通知 (不改变任何订阅状态)
    pub fn error(message: impl Into<String>) -> Self {
        let mut msg = Self::bare("error");
        msg.error = Some(message.into());
        msg
    }

    /// # Summary
    /// 已收盘 K 线通知。`interval` 与 `timeframe` 同值，
    /// 方便客户端不拆包路由。
    pub fn candle(candle: &Candle) -> Self {
        let mut msg = Self::bare("candle");
        msg.symbol = Some(candle.symbol.clone());
        msg.timeframe = Some(candle.timeframe.wire_name().to_string());
        msg.interval = Some(candle.timeframe.wire_name().to_string());
        msg.data = serde_json::to_value(CandlePayload::from(candle)).ok();
        msg
    }

    /// # Summary
    /// 已富化 K 线通知。
    pub fn enriched_candle(enriched: &EnrichedCandle) -> Self {
        let mut msg = Self::bare("enriched_candle");
        msg.symbol = Some(enriched.base.symbol.clone());
        msg.timeframe = Some(enriched.base.timeframe.wire_name().to_string());
        msg.interval = Some(enriched.base.timeframe.wire_name().to_string());
        msg.data = serde_json::to_value(EnrichedPayload::from(enriched)).ok();
        msg
    }
}

/// # Summary
/// K 线线上载荷。周期以协议长形式编码，时间为 RFC3339 UTC。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandlePayload {
    pub symbol: String,
    pub timeframe: String,
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl From<&Candle> for CandlePayload {
    fn from(candle: &Candle) -> Self {
        Self {
            symbol: candle.symbol.clone(),
            timeframe: candle.timeframe.wire_name().to_string(),
            time: candle.time,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
        }
    }
}

impl TryFrom<CandlePayload> for Candle {
    type Error = String;

    /// 线上载荷还原为领域实体；未知周期字符串报错
    fn try_from(payload: CandlePayload) -> Result<Self, Self::Error> {
        Ok(Candle {
            symbol: payload.symbol,
            timeframe: TimeFrame::from_str(&payload.timeframe)?,
            time: payload.time,
            open: payload.open,
            high: payload.high,
            low: payload.low,
            close: payload.close,
            volume: payload.volume,
        })
    }
}

/// # Summary
/// 富化 K 线线上载荷：基础载荷 + 指标 + 分析 + 信号 + 告警。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedPayload {
    pub candle: CandlePayload,
    pub indicators: IndicatorVector,
    pub analysis: AnalysisReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<SignalSummary>,
    pub warnings: Vec<String>,
    pub partial: bool,
}

impl From<&EnrichedCandle> for EnrichedPayload {
    fn from(enriched: &EnrichedCandle) -> Self {
        Self {
            candle: CandlePayload::from(&enriched.base),
            indicators: enriched.indicators.clone(),
            analysis: enriched.analysis.clone(),
            signal: enriched.signal.clone(),
            warnings: enriched.meta.warnings.clone(),
            partial: enriched.meta.partial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle() -> Candle {
        Candle {
            symbol: "AAPL".to_string(),
            timeframe: TimeFrame::Minute5,
            time: Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
            open: 100.0,
            high: 101.5,
            low: 99.8,
            close: 99.8,
            volume: 23,
        }
    }

    #[test]
    fn test_candle_wire_roundtrip() {
        let original = candle();
        let json = serde_json::to_string(&CandlePayload::from(&original)).unwrap();
        let payload: CandlePayload = serde_json::from_str(&json).unwrap();
        let restored = Candle::try_from(payload).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_wire_uses_long_timeframe_form() {
        let msg = ServerMessage::candle(&candle());
        assert_eq!(msg.interval.as_deref(), Some("5min"));
        let data = msg.data.unwrap();
        assert_eq!(data["timeframe"], "5min");
    }

    #[test]
    fn test_client_message_parses_spec_shape() {
        let text = r#"{"type":"subscription","symbol":"AAPL","timeframe":"1min","action":"subscribe"}"#;
        let msg: ClientMessage = serde_json::from_str(text).unwrap();
        assert_eq!(msg.kind, "subscription");
        assert_eq!(msg.symbol.as_deref(), Some("AAPL"));
        assert_eq!(msg.timeframe.as_deref(), Some("1min"));
        assert_eq!(msg.action.as_deref(), Some("subscribe"));
    }

    #[test]
    fn test_error_message_shape() {
        let msg = ServerMessage::error("symbol must contain only uppercase letters");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert!(json["error"].as_str().unwrap().contains("uppercase"));
        assert!(json.get("data").is_none());
    }
}
