//! Similarity graph builder
//!
//! Recomputed on demand from the current run's submissions and
//! embeddings; never persisted. O(n^2 * d) per build, which is fine for
//! workshop-sized groups but would need approximate nearest neighbors
//! beyond low hundreds of participants.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use huddle_common::config::EngineConfig;
use huddle_common::db;
use huddle_common::events::{name, GraphEdge, GraphNode, GraphPayload};
use huddle_common::vecmath::cosine;
use huddle_common::Result;
use sqlx::SqlitePool;

use super::text::extract_text;
use super::{participant_vectors, round4};
use crate::state::AppState;

/// Build the similarity graph for one run.
///
/// Every participant appears as a node; edges connect each node's
/// top-k neighbors at or above the threshold, deduplicated as
/// undirected pairs with `source < target`. When nothing clears the
/// threshold and at least two nodes have vectors, a relaxed pass
/// connects each node to its single nearest neighbor so the graph is
/// never totally disconnected while data exists.
pub async fn build_graph(
    pool: &SqlitePool,
    run_id: i64,
    config: &EngineConfig,
) -> Result<GraphPayload> {
    let people = db::list_participants(pool).await?;
    let submissions = db::submissions_for_run(pool, run_id).await?;
    let embeddings = db::embeddings_for_run(pool, run_id).await?;

    // Latest statement text per participant; submissions arrive in id
    // order, so the last write wins.
    let mut latest_text: HashMap<i64, String> = HashMap::new();
    for submission in &submissions {
        let payload =
            serde_json::from_str(&submission.payload_json).unwrap_or(serde_json::Value::Null);
        latest_text.insert(submission.participant_id, extract_text(&payload));
    }

    let vectors = participant_vectors(&submissions, &embeddings);

    let nodes: Vec<GraphNode> = people
        .iter()
        .map(|p| GraphNode {
            id: p.id,
            label: p.display_name.clone(),
            text: latest_text.get(&p.id).cloned().unwrap_or_default(),
        })
        .collect();
    let ids: Vec<i64> = nodes.iter().map(|n| n.id).collect();

    let mut seen: HashSet<(i64, i64)> = HashSet::new();
    let mut edges: Vec<GraphEdge> = Vec::new();

    // Top-k neighbors per node, thresholded
    for &i in &ids {
        let Some(vi) = vectors.get(&i) else { continue };
        let mut row: Vec<(i64, f64)> = Vec::new();
        for &j in &ids {
            if i == j {
                continue;
            }
            let Some(vj) = vectors.get(&j) else { continue };
            row.push((j, cosine(vi, vj)));
        }
        // Stable sort: ties keep ascending id order
        row.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        for &(j, score) in row.iter().take(config.graph_top_k) {
            if score >= config.graph_threshold {
                push_edge(&mut seen, &mut edges, i, j, score);
            }
        }
    }

    // Relaxed nearest-neighbor pass when the thresholded set is empty
    if edges.is_empty() && vectors.len() >= 2 {
        for &i in &ids {
            let Some(vi) = vectors.get(&i) else { continue };
            let mut best: Option<(i64, f64)> = None;
            for &j in &ids {
                if i == j {
                    continue;
                }
                let Some(vj) = vectors.get(&j) else { continue };
                let score = cosine(vi, vj);
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((j, score));
                }
            }
            if let Some((j, score)) = best {
                push_edge(&mut seen, &mut edges, i, j, score);
            }
        }
    }

    Ok(GraphPayload { nodes, edges })
}

/// Insert an undirected edge unless its unordered pair was seen before.
fn push_edge(
    seen: &mut HashSet<(i64, i64)>,
    edges: &mut Vec<GraphEdge>,
    a: i64,
    b: i64,
    score: f64,
) {
    let key = (a.min(b), a.max(b));
    if seen.insert(key) {
        edges.push(GraphEdge {
            source: key.0,
            target: key.1,
            weight: round4(score),
        });
    }
}

/// Rebuild the current run's graph and push it to all subscribers.
pub async fn build_and_broadcast(state: &AppState) -> Result<()> {
    let run_id = state.runs.current_run_id(&state.db).await?;
    let graph = build_graph(&state.db, run_id, &state.engine).await?;
    state.bus.publish(name::GRAPH, &graph);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_common::db::init::init_memory_database;

    async fn seed_participant(
        pool: &SqlitePool,
        run_id: i64,
        name: &str,
        vectors: &[&[f64]],
    ) -> i64 {
        let pid = db::insert_participant(pool, name).await.unwrap();
        for (i, vector) in vectors.iter().enumerate() {
            let sub = db::insert_submission(
                pool,
                run_id,
                pid,
                "line",
                &format!(r#"{{"text":"{} statement {}"}}"#, name, i),
            )
            .await
            .unwrap();
            db::insert_embedding(
                pool,
                sub,
                r#"{"clean_text":""}"#,
                &serde_json::to_string(vector).unwrap(),
            )
            .await
            .unwrap();
        }
        pid
    }

    fn config(threshold: f64, top_k: usize) -> EngineConfig {
        EngineConfig {
            graph_threshold: threshold,
            graph_top_k: top_k,
            recent_lines: 10,
        }
    }

    #[tokio::test]
    async fn no_self_loops_and_no_duplicate_edges() {
        let pool = init_memory_database().await.unwrap();
        let run = db::insert_run(&pool).await.unwrap();
        seed_participant(&pool, run, "a", &[&[1.0, 0.0]]).await;
        seed_participant(&pool, run, "b", &[&[0.9, 0.1]]).await;
        seed_participant(&pool, run, "c", &[&[0.8, 0.2]]).await;

        let graph = build_graph(&pool, run, &config(0.5, 3)).await.unwrap();

        let mut seen = HashSet::new();
        for edge in &graph.edges {
            assert_ne!(edge.source, edge.target);
            assert!(edge.source < edge.target, "edges must be canonical");
            assert!(seen.insert((edge.source, edge.target)), "duplicate edge");
        }
    }

    #[tokio::test]
    async fn thresholded_edge_weights_stay_in_bounds() {
        let pool = init_memory_database().await.unwrap();
        let run = db::insert_run(&pool).await.unwrap();
        seed_participant(&pool, run, "a", &[&[1.0, 0.0]]).await;
        seed_participant(&pool, run, "b", &[&[0.7, 0.7]]).await;
        seed_participant(&pool, run, "c", &[&[0.0, 1.0]]).await;

        let threshold = 0.65;
        let graph = build_graph(&pool, run, &config(threshold, 3)).await.unwrap();

        assert!(!graph.edges.is_empty());
        for edge in &graph.edges {
            assert!(edge.weight >= threshold && edge.weight <= 1.0);
        }
    }

    #[tokio::test]
    async fn participant_without_submissions_is_a_bare_node() {
        let pool = init_memory_database().await.unwrap();
        let run = db::insert_run(&pool).await.unwrap();
        let with_vec = seed_participant(&pool, run, "a", &[&[1.0, 0.0]]).await;
        let without = db::insert_participant(&pool, "silent").await.unwrap();

        let graph = build_graph(&pool, run, &config(0.5, 3)).await.unwrap();

        let node_ids: Vec<i64> = graph.nodes.iter().map(|n| n.id).collect();
        assert!(node_ids.contains(&with_vec));
        assert!(node_ids.contains(&without));
        assert!(graph
            .edges
            .iter()
            .all(|e| e.source != without && e.target != without));
    }

    #[tokio::test]
    async fn fallback_connects_nearest_neighbors_when_nothing_clears_threshold() {
        let pool = init_memory_database().await.unwrap();
        let run = db::insert_run(&pool).await.unwrap();
        let a = seed_participant(&pool, run, "a", &[&[1.0, 0.0]]).await;
        let b = seed_participant(&pool, run, "b", &[&[0.0, 1.0]]).await;

        // Orthogonal vectors: similarity 0, below any sensible threshold
        let graph = build_graph(&pool, run, &config(0.65, 3)).await.unwrap();

        assert_eq!(graph.edges.len(), 1);
        let edge = &graph.edges[0];
        assert_eq!((edge.source, edge.target), (a.min(b), a.max(b)));
        assert!((-1.0..=1.0).contains(&edge.weight));
    }

    #[tokio::test]
    async fn single_vector_node_produces_no_fallback_edges() {
        let pool = init_memory_database().await.unwrap();
        let run = db::insert_run(&pool).await.unwrap();
        seed_participant(&pool, run, "a", &[&[1.0, 0.0]]).await;
        db::insert_participant(&pool, "silent").await.unwrap();

        let graph = build_graph(&pool, run, &config(0.65, 3)).await.unwrap();
        assert!(graph.edges.is_empty());
    }

    #[tokio::test]
    async fn node_text_is_latest_submission() {
        let pool = init_memory_database().await.unwrap();
        let run = db::insert_run(&pool).await.unwrap();
        let pid = db::insert_participant(&pool, "a").await.unwrap();
        for text in ["first thought", "second thought"] {
            let sub = db::insert_submission(
                &pool,
                run,
                pid,
                "line",
                &format!(r#"{{"text":"{}"}}"#, text),
            )
            .await
            .unwrap();
            db::insert_embedding(&pool, sub, r#"{"clean_text":""}"#, "[1.0]")
                .await
                .unwrap();
        }

        let graph = build_graph(&pool, run, &config(0.65, 3)).await.unwrap();
        assert_eq!(graph.nodes[0].text, "second thought");
    }

    #[tokio::test]
    async fn top_k_limits_neighbors_per_node() {
        let pool = init_memory_database().await.unwrap();
        let run = db::insert_run(&pool).await.unwrap();
        // Five nearly parallel vectors, all pairs above threshold
        for (i, name) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            let v = [1.0, 0.01 * i as f64];
            seed_participant(&pool, run, name, &[&v]).await;
        }

        let graph = build_graph(&pool, run, &config(0.5, 1)).await.unwrap();

        // With top_k = 1 each node contributes at most one candidate,
        // so at most 5 undirected edges survive dedup.
        assert!(graph.edges.len() <= 5);
        let mut degree: HashMap<i64, usize> = HashMap::new();
        for edge in &graph.edges {
            *degree.entry(edge.source).or_default() += 1;
            *degree.entry(edge.target).or_default() += 1;
        }
        // A node can exceed degree 1 only by being chosen by others.
        assert!(degree.values().all(|&d| d <= 4));
    }
}
