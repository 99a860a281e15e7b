//! Thematic summary engine
//!
//! One remote clustering call with a strict response-shape contract,
//! defensively coerced; any failure degrades to a deterministic local
//! heuristic so a summary is always produced. Shape violations from the
//! remote service never propagate to the caller.

use std::collections::BTreeMap;

use anyhow::anyhow;
use huddle_common::config::LlmConfig;
use huddle_common::db;
use huddle_common::events::{
    name, Contradiction, Outlier, Summary, SummaryStats, Theme,
};
use huddle_common::vecmath::cosine;
use huddle_common::{Error, Result};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use super::embedding::{hash_embed, FALLBACK_DIM};
use super::text::extract_text;
use crate::state::AppState;

const MAX_THEMES: usize = 6;
const MAX_CONTRADICTIONS: usize = 3;
const MAX_OUTLIERS: usize = 2;
const MAX_AGENDA: usize = 4;
const MAX_QUOTES: usize = 4;

/// One statement handed to the summarizer
#[derive(Debug, Clone, Serialize)]
pub struct SummaryItem {
    pub id: i64,
    pub text: String,
}

/// Summarize the current run, persist the result as the run's saved
/// snapshot and broadcast it under the `summary` event.
pub async fn run_summary(state: &AppState) -> Result<Summary> {
    let run_id = state.runs.current_run_id(&state.db).await?;

    let submissions = db::submissions_for_run(&state.db, run_id).await?;
    if submissions.is_empty() {
        return Err(Error::InvalidInput(
            "no submissions for the current run".to_string(),
        ));
    }

    // Latest statement per participant, in ascending participant id order
    let mut latest: BTreeMap<i64, String> = BTreeMap::new();
    for submission in &submissions {
        let payload =
            serde_json::from_str(&submission.payload_json).unwrap_or(Value::Null);
        latest.insert(submission.participant_id, extract_text(&payload));
    }
    let items: Vec<SummaryItem> = latest
        .into_iter()
        .map(|(id, text)| SummaryItem { id, text })
        .collect();

    let summary = state.summarizer.summarize(&items).await;

    let json = serde_json::to_string(&summary).map_err(|e| Error::Internal(e.to_string()))?;
    db::save_run_summary(&state.db, run_id, &json).await?;
    state.bus.publish(name::SUMMARY, &summary);

    Ok(summary)
}

/// Remote summarization client with deterministic local fallback
pub struct Summarizer {
    client: reqwest::Client,
    config: LlmConfig,
}

impl Summarizer {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }

    /// Produce a summary for `items`. Never fails; callers validate
    /// that `items` is non-empty.
    pub async fn summarize(&self, items: &[SummaryItem]) -> Summary {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return heuristic_summary(items);
        };
        match self.remote_summary(api_key, items).await {
            Ok(value) => coerce_summary(&value, items.len()),
            Err(e) => {
                warn!("Remote summarization failed, using local heuristic: {}", e);
                heuristic_summary(items)
            }
        }
    }

    async fn remote_summary(&self, api_key: &str, items: &[SummaryItem]) -> anyhow::Result<Value> {
        let system = "You cluster short statements from a live group exercise. \
Return ONLY a valid JSON object with keys: \
themes (3-6 entries: label, why, members, quotes), \
contradictions (0-3 entries: a, b, explain), \
outliers (0-2 entries: participant_id, explain), \
agenda (2-4 strings), tone (string), stats.count.";

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.config.summary_model,
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": serde_json::to_string(items)? },
                ],
                "temperature": 0.2,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("summarization service returned {}", status));
        }

        let body: Value = response.json().await?;
        let content = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("completion content missing from response"))?;

        Ok(serde_json::from_str(content)?)
    }
}

/// Map an arbitrary remote JSON value into the strict `Summary` type.
///
/// Unknown or alternate field names are normalized, non-array fields
/// become empty arrays, non-numeric ids are dropped, and every list is
/// capped at its contract size.
pub(crate) fn coerce_summary(value: &Value, item_count: usize) -> Summary {
    let themes = as_array(value.get("themes"))
        .iter()
        .take(MAX_THEMES)
        .enumerate()
        .map(|(i, theme)| Theme {
            label: str_field(theme, &["label", "title", "name"])
                .unwrap_or_else(|| format!("Theme {}", i + 1)),
            why: str_field(theme, &["why", "rationale"]),
            members: id_list(theme.get("members")),
            quotes: string_list(theme.get("quotes"), MAX_QUOTES),
        })
        .collect();

    let contradictions = as_array(value.get("contradictions"))
        .iter()
        .filter_map(|entry| {
            let a = id_value(entry.get("a"))?;
            let b = id_value(entry.get("b"))?;
            Some(Contradiction {
                a,
                b,
                explain: str_field(entry, &["explain", "explanation"]).unwrap_or_default(),
            })
        })
        .take(MAX_CONTRADICTIONS)
        .collect();

    let outliers = as_array(value.get("outliers"))
        .iter()
        .filter_map(|entry| {
            let participant_id = id_value(
                entry
                    .get("participant_id")
                    .or_else(|| entry.get("participantId"))
                    .or_else(|| entry.get("id")),
            )?;
            Some(Outlier {
                participant_id,
                explain: str_field(entry, &["explain", "explanation"]).unwrap_or_default(),
            })
        })
        .take(MAX_OUTLIERS)
        .collect();

    Summary {
        themes,
        contradictions,
        outliers,
        agenda: string_list(value.get("agenda"), MAX_AGENDA),
        tone: value.get("tone").and_then(Value::as_str).map(str::to_string),
        stats: SummaryStats {
            count: value
                .get("stats")
                .and_then(|s| s.get("count"))
                .and_then(Value::as_i64)
                .unwrap_or(item_count as i64),
        },
    }
}

fn as_array(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .find(|s| !s.is_empty())
}

fn id_value(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn id_list(value: Option<&Value>) -> Vec<i64> {
    as_array(value).iter().filter_map(|v| id_value(Some(v))).collect()
}

fn string_list(value: Option<&Value>, cap: usize) -> Vec<String> {
    as_array(value)
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .take(cap)
        .collect()
}

/// Deterministic local clustering: seed up to 3 clusters with the first
/// items' fallback embeddings, assign everything to its best seed (ties
/// go to the lowest seed index), and flag the globally worst fit as the
/// outlier.
pub(crate) fn heuristic_summary(items: &[SummaryItem]) -> Summary {
    let embeds: Vec<Vec<f64>> = items
        .iter()
        .map(|item| hash_embed(&item.text, FALLBACK_DIM))
        .collect();
    let seeds: Vec<&Vec<f64>> = embeds.iter().take(3).collect();

    let mut clusters: Vec<Vec<i64>> = vec![Vec::new(); seeds.len()];
    let mut worst: Option<(i64, f64)> = None;
    for (item, vector) in items.iter().zip(&embeds) {
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (k, seed) in seeds.iter().enumerate() {
            let score = cosine(vector, seed);
            if score > best_score {
                best_score = score;
                best = k;
            }
        }
        clusters[best].push(item.id);
        // first strict minimum wins
        if worst.map_or(true, |(_, lowest)| best_score < lowest) {
            worst = Some((item.id, best_score));
        }
    }

    let themes: Vec<Theme> = clusters
        .iter()
        .enumerate()
        .filter(|(_, members)| !members.is_empty())
        .map(|(i, members)| Theme {
            label: format!("Theme {}", i + 1),
            why: None,
            members: members.clone(),
            quotes: Vec::new(),
        })
        .collect();

    let agenda: Vec<String> = clusters
        .iter()
        .enumerate()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(i, members)| {
            let mentioned = members
                .iter()
                .take(4)
                .map(|id| format!("#{}", id))
                .collect::<Vec<_>>()
                .join(", ");
            format!("Clarify theme {} with {}", i + 1, mentioned)
        })
        .take(MAX_AGENDA)
        .collect();

    Summary {
        themes,
        contradictions: Vec::new(),
        outliers: worst
            .map(|(id, _)| Outlier {
                participant_id: id,
                explain: "Least similar to any theme seed".to_string(),
            })
            .into_iter()
            .collect(),
        agenda,
        tone: None,
        stats: SummaryStats {
            count: items.len() as i64,
        },
    }
}
