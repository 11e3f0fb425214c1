//! One-line rendering of bus events for the terminal

use classroom_core::{BusEvent, DecisionResponse};

/// Render `event` as a single console line
pub fn line(event: &BusEvent) -> String {
    match event {
        BusEvent::ConnectionOpened => "[open] connected".to_string(),
        BusEvent::ConnectionClosed { code } => format!("[closed] {code}"),
        BusEvent::ConnectionError { message } => format!("[error] {message}"),
        BusEvent::DecisionResponse(response) => decision(response),
        BusEvent::CommandSent { student_id, action } => {
            format!("[sent] {action} -> {student_id}")
        }
        BusEvent::Reconnecting { attempt } => format!("[retry] reconnect attempt {attempt}"),
        BusEvent::ReconnectExhausted { attempts } => {
            format!("[retry] gave up after {attempts} attempts")
        }
    }
}

fn decision(response: &DecisionResponse) -> String {
    let mut out = format!(
        "[decision] {} ({}, {}, {:.0}%) \"{}\"",
        response.animation_trigger().key(),
        response.emotion_kind(),
        response.behavior_state(),
        response.confidence * 100.0,
        response.reply_text,
    );
    if let Some(trace) = &response.decision_trace {
        out.push_str(&format!(" rule={}", trace.rule_applied));
    }
    if response.meta.latency_ms > 0 {
        out.push_str(&format!(" {}ms", response.meta.latency_ms));
    }
    out
}
