// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid retrieval: vector search + bounded graph expansion + inference
//! path discovery.
//!
//! 1. Embed the query and collect direct vector matches.
//! 2. Breadth-first expansion over the relation graph from the direct
//!    matches, bounded by `max_depth` and guarded by a visited-set — the
//!    graph may contain cycles and both properties are load-bearing for
//!    termination.
//! 3. Depth-first search over the expanded subgraph surfaces inference
//!    paths: causal chains, contradiction pairs, and support chains.
//! 4. A textual summary of everything found.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use engram_core::traits::EmbeddingAdapter;
use engram_core::types::{
    EmbeddingInput, MemoryEntry, MemoryRelation, QualityTier, RelationType,
};
use engram_core::EngramError;
use engram_config::model::MemoryConfig;
use engram_storage::models::EmbeddingFilter;
use engram_storage::{queries, Database};
use tracing::debug;

use crate::scoring::{combined_score, ScoringEngine};
use crate::vector::VectorStore;

/// Longest chain followed when assembling causal or support paths.
const MAX_CHAIN_HOPS: usize = 3;

/// Caller-supplied retrieval knobs.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// BFS expansion bound; defaults to the configured `max_graph_depth`.
    pub max_depth: Option<usize>,
    /// Restrict graph expansion to these relation types.
    pub relation_types: Option<Vec<RelationType>>,
    /// Restrict direct matches to memories produced by this agent.
    pub agent_filter: Option<String>,
    /// Restrict direct matches to a namespace subtree.
    pub namespace: Option<String>,
    pub include_inference_paths: bool,
    /// Direct matches below this entry confidence are dropped.
    pub min_confidence: f64,
    /// Cap on direct matches.
    pub limit: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            relation_types: None,
            agent_filter: None,
            namespace: None,
            include_inference_paths: true,
            min_confidence: 0.0,
            limit: 10,
        }
    }
}

/// A direct vector match with its blended ranking score.
#[derive(Debug, Clone)]
pub struct DirectMatch {
    pub entry: MemoryEntry,
    pub similarity: f32,
    /// `similarity · 0.4 + final_score / 100`, in [0, 1].
    pub combined_score: f64,
    /// Display tier of the combined score on the 0-100 scale.
    pub tier: QualityTier,
}

/// A memory reached through graph expansion.
#[derive(Debug, Clone)]
pub struct RelatedMemory {
    pub entry: MemoryEntry,
    /// BFS depth at which this memory was first reached (1-based).
    pub depth: usize,
}

/// The shape of a discovered inference path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferencePathKind {
    CausalChain,
    Contradiction,
    SupportChain,
}

/// A chain of typed relations surfaced as reasoning context.
#[derive(Debug, Clone)]
pub struct InferencePath {
    pub kind: InferencePathKind,
    /// Node ids along the path, in order.
    pub node_ids: Vec<String>,
    pub description: String,
    /// Product of the strengths of the traversed edges.
    pub strength: f64,
}

/// Full hybrid retrieval result.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub direct_matches: Vec<DirectMatch>,
    pub related_context: Vec<RelatedMemory>,
    /// Every edge traversed during expansion.
    pub edges: Vec<MemoryRelation>,
    pub inference_paths: Vec<InferencePath>,
    pub summary: String,
}

/// Vector + graph retrieval over the memory store.
pub struct HybridRetriever {
    db: Database,
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingAdapter>,
    scoring: ScoringEngine,
    config: MemoryConfig,
}

impl HybridRetriever {
    pub fn new(
        db: Database,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingAdapter>,
        scoring: ScoringEngine,
        config: MemoryConfig,
    ) -> Self {
        Self {
            db,
            vector_store,
            embedder,
            scoring,
            config,
        }
    }

    /// Retrieve direct matches, related context, and inference paths for
    /// a query within one organization.
    pub async fn retrieve(
        &self,
        org_id: &str,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<RetrievalResult, EngramError> {
        let direct_matches = self.direct_matches(org_id, query, options).await?;

        let max_depth = options.max_depth.unwrap_or(self.config.max_graph_depth);
        let seed_ids: Vec<String> =
            direct_matches.iter().map(|m| m.entry.id.clone()).collect();
        let (related_context, edges) = self
            .expand_graph(&seed_ids, max_depth, options.relation_types.as_deref())
            .await?;

        let inference_paths = if options.include_inference_paths {
            let mut content_of: HashMap<String, String> = HashMap::new();
            for m in &direct_matches {
                content_of.insert(m.entry.id.clone(), m.entry.content.clone());
            }
            for r in &related_context {
                content_of.insert(r.entry.id.clone(), r.entry.content.clone());
            }
            discover_inference_paths(&edges, &content_of)
        } else {
            Vec::new()
        };

        let summary = synthesize_summary(&direct_matches, &related_context, &edges, &inference_paths);

        debug!(
            org_id,
            direct = direct_matches.len(),
            related = related_context.len(),
            paths = inference_paths.len(),
            "hybrid retrieval complete"
        );

        Ok(RetrievalResult {
            direct_matches,
            related_context,
            edges,
            inference_paths,
            summary,
        })
    }

    async fn direct_matches(
        &self,
        org_id: &str,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<DirectMatch>, EngramError> {
        let output = self
            .embedder
            .embed(EmbeddingInput {
                texts: vec![query.to_string()],
            })
            .await?;
        let query_embedding = output.embeddings.into_iter().next().ok_or_else(|| {
            EngramError::Embedding {
                message: "embedding returned no results".to_string(),
            }
        })?;

        let filter = EmbeddingFilter {
            org_id: Some(org_id.to_string()),
            namespace: options.namespace.clone(),
            agent_id: options.agent_filter.clone(),
            ..EmbeddingFilter::default()
        };
        let hits = self
            .vector_store
            .search(&query_embedding, self.config.max_retrieval_results, &filter)
            .await?;
        let hits: Vec<_> = hits
            .into_iter()
            .filter(|hit| hit.similarity as f64 >= self.config.similarity_threshold)
            .collect();

        let ids: Vec<String> = hits.iter().map(|h| h.entry_id.clone()).collect();
        let entries = queries::entries::get_entries_by_ids(&self.db, &ids).await?;
        let mut entry_of: HashMap<String, MemoryEntry> =
            entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        let scores = queries::scores::get_scores_by_ids(&self.db, &ids).await?;

        let mut matches = Vec::new();
        for hit in hits {
            let Some(entry) = entry_of.remove(&hit.entry_id) else {
                continue;
            };
            if entry.confidence < options.min_confidence {
                continue;
            }
            // Fall back to an on-the-fly score when the cache is cold.
            let final_score = scores
                .get(&entry.id)
                .map(|s| s.final_score)
                .unwrap_or_else(|| self.scoring.score(&entry).final_score);
            let combined = combined_score(hit.similarity as f64, final_score);
            matches.push(DirectMatch {
                tier: QualityTier::for_score(combined * 100.0),
                entry,
                similarity: hit.similarity,
                combined_score: combined,
            });
        }

        matches.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(options.limit);
        Ok(matches)
    }

    /// Breadth-first expansion from the seed ids. Cycle-safe via the
    /// visited set; bounded by `max_depth`.
    async fn expand_graph(
        &self,
        seed_ids: &[String],
        max_depth: usize,
        relation_types: Option<&[RelationType]>,
    ) -> Result<(Vec<RelatedMemory>, Vec<MemoryRelation>), EngramError> {
        let mut visited: HashSet<String> = seed_ids.iter().cloned().collect();
        let mut frontier: Vec<String> = seed_ids.to_vec();
        let mut seen_edges: HashSet<i64> = HashSet::new();
        let mut edges: Vec<MemoryRelation> = Vec::new();
        let mut related: Vec<RelatedMemory> = Vec::new();

        for depth in 1..=max_depth {
            if frontier.is_empty() {
                break;
            }
            let frontier_edges =
                queries::relations::edges_touching(&self.db, &frontier, relation_types).await?;

            let mut next_frontier: Vec<String> = Vec::new();
            for edge in frontier_edges {
                if seen_edges.insert(edge.id) {
                    for node in [&edge.source_id, &edge.target_id] {
                        if !visited.contains(node) {
                            visited.insert(node.clone());
                            next_frontier.push(node.clone());
                        }
                    }
                    edges.push(edge);
                }
            }

            let new_entries =
                queries::entries::get_entries_by_ids(&self.db, &next_frontier).await?;
            for entry in new_entries {
                related.push(RelatedMemory { entry, depth });
            }
            frontier = next_frontier;
        }

        Ok((related, edges))
    }
}

/// Depth-first discovery of inference paths over an already-expanded edge
/// set. Paths never revisit a node, and chains stop at
/// [`MAX_CHAIN_HOPS`] edges.
pub fn discover_inference_paths(
    edges: &[MemoryRelation],
    content_of: &HashMap<String, String>,
) -> Vec<InferencePath> {
    let mut paths = Vec::new();

    // Contradiction pairs: every CONTRADICTS edge is surfaced directly.
    for edge in edges.iter().filter(|e| e.relation_type == RelationType::Contradicts) {
        paths.push(InferencePath {
            kind: InferencePathKind::Contradiction,
            node_ids: vec![edge.source_id.clone(), edge.target_id.clone()],
            description: format!(
                "{} contradicts {}",
                label(content_of, &edge.source_id),
                label(content_of, &edge.target_id)
            ),
            strength: edge.strength,
        });
    }

    paths.extend(chain_paths(edges, content_of, RelationType::Causes, InferencePathKind::CausalChain, "causes"));
    paths.extend(chain_paths(edges, content_of, RelationType::Supports, InferencePathKind::SupportChain, "supports"));

    paths.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(std::cmp::Ordering::Equal));
    paths
}

/// Maximal directed chains (≥ 2 edges) of one relation type.
fn chain_paths(
    edges: &[MemoryRelation],
    content_of: &HashMap<String, String>,
    relation_type: RelationType,
    kind: InferencePathKind,
    verb: &str,
) -> Vec<InferencePath> {
    let mut adjacency: HashMap<&str, Vec<&MemoryRelation>> = HashMap::new();
    let mut has_incoming: HashSet<&str> = HashSet::new();
    for edge in edges.iter().filter(|e| e.relation_type == relation_type) {
        adjacency.entry(edge.source_id.as_str()).or_default().push(edge);
        has_incoming.insert(edge.target_id.as_str());
    }

    // Start DFS only from chain heads so sub-chains are not re-reported.
    let mut paths = Vec::new();
    for start in adjacency.keys().filter(|n| !has_incoming.contains(*n)) {
        let mut on_path = HashSet::from([*start]);
        dfs_chains(
            start,
            &adjacency,
            &mut vec![(*start).to_string()],
            &mut on_path,
            1.0,
            &mut paths,
        );
    }

    paths
        .into_iter()
        .filter(|(nodes, _)| nodes.len() >= 3) // at least two edges
        .map(|(nodes, strength)| {
            let description = nodes
                .iter()
                .map(|id| label(content_of, id))
                .collect::<Vec<_>>()
                .join(&format!(" → {verb} → "));
            InferencePath {
                kind,
                node_ids: nodes,
                description,
                strength,
            }
        })
        .collect()
}

fn dfs_chains<'a>(
    node: &str,
    adjacency: &HashMap<&'a str, Vec<&'a MemoryRelation>>,
    path: &mut Vec<String>,
    on_path: &mut HashSet<&'a str>,
    strength: f64,
    out: &mut Vec<(Vec<String>, f64)>,
) {
    let at_hop_limit = path.len() > MAX_CHAIN_HOPS;
    let next_edges = if at_hop_limit { None } else { adjacency.get(node) };

    let mut extended = false;
    if let Some(next_edges) = next_edges {
        for edge in next_edges {
            let target = edge.target_id.as_str();
            if on_path.contains(target) {
                continue;
            }
            extended = true;
            path.push(edge.target_id.clone());
            on_path.insert(target);
            dfs_chains(target, adjacency, path, on_path, strength * edge.strength, out);
            on_path.remove(target);
            path.pop();
        }
    }

    if !extended && path.len() >= 2 {
        out.push((path.clone(), strength));
    }
}

fn label(content_of: &HashMap<String, String>, id: &str) -> String {
    match content_of.get(id) {
        Some(content) => {
            let snippet: String = content.chars().take(40).collect();
            if content.chars().count() > 40 {
                format!("\"{snippet}…\"")
            } else {
                format!("\"{snippet}\"")
            }
        }
        None => id.to_string(),
    }
}

/// Human-readable roll-up of a retrieval.
fn synthesize_summary(
    direct: &[DirectMatch],
    related: &[RelatedMemory],
    edges: &[MemoryRelation],
    paths: &[InferencePath],
) -> String {
    if direct.is_empty() {
        return "No matching memories found.".to_string();
    }

    let causal = paths.iter().filter(|p| p.kind == InferencePathKind::CausalChain).count();
    let contradictions = paths
        .iter()
        .filter(|p| p.kind == InferencePathKind::Contradiction)
        .count();
    let support = paths.iter().filter(|p| p.kind == InferencePathKind::SupportChain).count();

    let mut summary = format!(
        "Found {} direct matches (best {:.2}), {} related memories via {} relations.",
        direct.len(),
        direct[0].combined_score,
        related.len(),
        edges.len(),
    );
    if !paths.is_empty() {
        summary.push_str(&format!(
            " Discovered {} inference paths: {causal} causal, {contradictions} contradiction, {support} support.",
            paths.len()
        ));
    }
    summary
}
