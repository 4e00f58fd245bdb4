use std::sync::LazyLock;
use std::time::Duration;

use procflow_core::expr::{compile_expression, CompiledExpr, ExprError, Language};
use procflow_core::Scope;
use regex::Regex;

static ISO_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").expect("valid")
});
static SHORT_DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(ms|s|m|h|d)$").expect("valid"));
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(?:T\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:\d{2})?)?$")
        .expect("valid")
});

/// A timer attribute: a literal value, or `#{expr}` evaluated when the timer
/// is armed.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerExpr {
    Duration(Duration),
    Date(String),
    Expression(CompiledExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TimerError {
    Expression(ExprError),
    Invalid(String),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TimerField {
    Delay,
    Period,
    Date,
}

impl TimerField {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            TimerField::Delay => "delay",
            TimerField::Period => "period",
            TimerField::Date => "date",
        }
    }
}

pub(crate) fn compile_timer_value(
    field: TimerField,
    text: &str,
    scope: &Scope<'_>,
) -> Result<TimerExpr, TimerError> {
    if let Some(inner) = text.strip_prefix("#{").and_then(|s| s.strip_suffix('}')) {
        return compile_expression(&Language::Simple, inner, scope)
            .map(TimerExpr::Expression)
            .map_err(TimerError::Expression);
    }
    match field {
        TimerField::Date if DATE_RE.is_match(text) => Ok(TimerExpr::Date(text.to_string())),
        TimerField::Date => Err(TimerError::Invalid(format!("invalid date '{text}'"))),
        TimerField::Delay | TimerField::Period => parse_duration(text)
            .map(TimerExpr::Duration)
            .ok_or_else(|| TimerError::Invalid(format!("invalid {} '{text}'", field.as_str()))),
    }
}

/// Accepts ISO-8601 day/time durations (`P1DT2H`, `PT1H30M`) and the short
/// forms `500ms`, `10s`, `5m`, `2h`, `1d`.
pub fn parse_duration(text: &str) -> Option<Duration> {
    if let Some(c) = SHORT_DURATION_RE.captures(text) {
        let n: u64 = c[1].parse().ok()?;
        return match &c[2] {
            "ms" => Some(Duration::from_millis(n)),
            "s" => Some(Duration::from_secs(n)),
            "m" => Some(Duration::from_secs(n.checked_mul(60)?)),
            "h" => Some(Duration::from_secs(n.checked_mul(3_600)?)),
            _ => Some(Duration::from_secs(n.checked_mul(86_400)?)),
        };
    }

    let c = ISO_DURATION_RE.captures(text)?;
    if text == "P" || text.ends_with('T') {
        return None;
    }
    let part = |i: usize, unit: u64| -> Option<u64> {
        match c.get(i) {
            Some(m) => m.as_str().parse::<u64>().ok()?.checked_mul(unit),
            None => Some(0),
        }
    };
    let secs = part(1, 86_400)?
        .checked_add(part(2, 3_600)?)?
        .checked_add(part(3, 60)?)?
        .checked_add(part(4, 1)?)?;
    Some(Duration::from_secs(secs))
}
