#[cfg(test)]
mod tests;

use serde::Deserialize;
use thiserror::Error;

use super::events::UsageStats;

/// One decoded line of the upstream NDJSON stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// An incremental text fragment.
    Token(String),
    /// Generation finished. `tail` carries text sent on the final line itself.
    Done {
        tail: Option<String>,
        usage: UsageStats,
    },
    /// The server reported a failure in-band.
    Error(String),
    /// A well-formed line that carries nothing the relay acts on.
    NoOp,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed upstream line: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    total_duration: u64,
    #[serde(default)]
    eval_count: u64,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_duration: u64,
}

/// Decode a single complete line from `/api/generate`.
///
/// Lines that parse but match no known shape decode to [`UpstreamEvent::NoOp`]; only
/// unparseable input is an error, and callers are expected to drop it.
#[inline]
pub fn decode(line: &str) -> Result<UpstreamEvent, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(UpstreamEvent::NoOp);
    }

    let parsed: GenerateLine = serde_json::from_str(line)?;
    let usage = usage_of(&parsed);

    // `"error": null` deserializes to `None` and is not a failure.
    if let Some(error) = parsed.error {
        let message = match error {
            serde_json::Value::String(message) => message,
            other => other.to_string(),
        };
        return Ok(UpstreamEvent::Error(message));
    }

    Ok(classify_content(parsed.response, parsed.done, usage))
}

fn usage_of(line: &GenerateLine) -> UsageStats {
    UsageStats {
        total_duration: line.total_duration,
        eval_count: line.eval_count,
        prompt_eval_count: line.prompt_eval_count,
        eval_duration: line.eval_duration,
    }
}

fn classify_content(response: Option<String>, done: bool, usage: UsageStats) -> UpstreamEvent {
    let text = response.filter(|text| !text.is_empty());
    if done {
        UpstreamEvent::Done { tail: text, usage }
    } else if let Some(text) = text {
        UpstreamEvent::Token(text)
    } else {
        UpstreamEvent::NoOp
    }
}
