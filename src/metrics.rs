use std::collections::HashMap;
use std::sync::Mutex;

const OVERFLOW_SERIES_LABEL: &str = "__overflow__";
const DEFAULT_MAX_SERIES: usize = 256;

/// Monotonic counters emitted by the review pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewCounter {
    TotalToken,
    InputToken,
    OutputToken,
    ApiError,
    InappropriateContent,
    ReviewCount,
}

impl ReviewCounter {
    pub const ALL: [ReviewCounter; 6] = [
        Self::TotalToken,
        Self::InputToken,
        Self::OutputToken,
        Self::ApiError,
        Self::InappropriateContent,
        Self::ReviewCount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::TotalToken => "total_token",
            Self::InputToken => "input_token",
            Self::OutputToken => "output_token",
            Self::ApiError => "llm_api_error",
            Self::InappropriateContent => "llm_inappropriate_content",
            Self::ReviewCount => "llm_review_count",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ReviewCount => "outcome",
            _ => "model",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Self::TotalToken => "Total tokens reported by the model provider.",
            Self::InputToken => "Prompt tokens reported by the model provider.",
            Self::OutputToken => "Completion tokens reported by the model provider.",
            Self::ApiError => "Failed model calls, including unparseable output.",
            Self::InappropriateContent => "Model calls refused for content policy reasons.",
            Self::ReviewCount => "Moderation verdicts by outcome.",
        }
    }
}

pub trait MetricsSink: Send + Sync {
    fn add(&self, counter: ReviewCounter, label_value: &str, delta: u64);

    fn increment(&self, counter: ReviewCounter, label_value: &str) {
        self.add(counter, label_value, 1);
    }
}

/// In-process counter registry with Prometheus text rendering.
#[derive(Debug)]
pub struct ReviewMetrics {
    max_series: usize,
    counters: Mutex<HashMap<ReviewCounter, HashMap<String, u64>>>,
}

impl Default for ReviewMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SERIES)
    }
}

impl ReviewMetrics {
    pub fn new(max_series: usize) -> Self {
        Self {
            max_series: max_series.max(1),
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn counter(&self, counter: ReviewCounter, label_value: &str) -> u64 {
        self.counters
            .lock()
            .ok()
            .and_then(|counters| {
                counters
                    .get(&counter)
                    .and_then(|series| series.get(label_value).copied())
            })
            .unwrap_or(0)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let Ok(counters) = self.counters.lock() else {
            return out;
        };
        let empty = HashMap::new();
        for counter in ReviewCounter::ALL {
            write_counter_map(
                &mut out,
                counter.name(),
                counter.help(),
                counter.label(),
                counters.get(&counter).unwrap_or(&empty),
            );
        }
        out
    }
}

impl MetricsSink for ReviewMetrics {
    fn add(&self, counter: ReviewCounter, label_value: &str, delta: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            let series = counters.entry(counter).or_default();
            add_limited(series, label_value, self.max_series, delta);
        }
    }
}

fn add_limited(map: &mut HashMap<String, u64>, key: &str, max_series: usize, delta: u64) {
    let key = if map.contains_key(key) || map.len() < max_series {
        key.to_string()
    } else {
        OVERFLOW_SERIES_LABEL.to_string()
    };
    let entry = map.entry(key).or_default();
    *entry = entry.saturating_add(delta);
}

fn write_counter_map(
    out: &mut String,
    metric: &str,
    help: &str,
    label: &str,
    map: &HashMap<String, u64>,
) {
    out.push_str(&format!("# HELP {metric} {help}\n"));
    out.push_str(&format!("# TYPE {metric} counter\n"));

    let mut entries: Vec<(&String, &u64)> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    for (value, count) in entries {
        out.push_str(&format!(
            "{metric}{{{label}=\"{}\"}} {count}\n",
            escape_label_value(value)
        ));
    }
}

fn escape_label_value(value: &str) -> String {
    let mut out = String::new();
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}
