//! Graph command implementation.
//!
//! Visualizes dependency graphs with focus on reverse dependencies (dependents).
//!
//! - `br graph <issue-id>`: Show all dependents of an issue (what depends on it)
//! - `br graph --all`: Show connected components for `open`/`in_progress`/`blocked` issues

use crate::cli::GraphArgs;
use crate::config;
use crate::error::{BeadsError, Result};
use crate::model::Status;
use crate::storage::{ListFilters, SqliteStorage};
use crate::util::id::{IdResolver, ResolverConfig, find_matching_ids};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use tracing::debug;

/// JSON output for a single node in the graph.
#[derive(Debug, Clone, Serialize)]
struct GraphNode {
    id: String,
    title: String,
    status: String,
    priority: i32,
    depth: usize,
}

/// JSON output for the graph command (single issue mode).
#[derive(Debug, Serialize)]
struct SingleGraphOutput {
    root: String,
    nodes: Vec<GraphNode>,
    edges: Vec<(String, String)>,
    count: usize,
}

/// JSON output for connected component.
#[derive(Debug, Serialize)]
struct ConnectedComponent {
    nodes: Vec<GraphNode>,
    edges: Vec<(String, String)>,
    roots: Vec<String>,
}

/// JSON output for --all mode.
#[derive(Debug, Serialize)]
struct AllGraphOutput {
    components: Vec<ConnectedComponent>,
    total_nodes: usize,
    total_components: usize,
}

/// Execute the graph command.
///
/// # Errors
///
/// Returns an error if database operations fail or if inputs are invalid.
pub fn execute(args: &GraphArgs, json: bool, cli: &config::CliOverrides) -> Result<()> {
    let beads_dir = config::discover_beads_dir(Some(Path::new(".")))?;
    let storage_ctx = config::open_storage_with_cli(&beads_dir, cli)?;

    let config_layer = config::load_config(&beads_dir, Some(&storage_ctx.storage), cli)?;
    let id_config = config::id_config_from_layer(&config_layer);
    let resolver = IdResolver::new(ResolverConfig::with_prefix(id_config.prefix));
    let all_ids = storage_ctx.storage.get_all_ids()?;

    if args.all {
        graph_all(&storage_ctx.storage, args.compact, json)
    } else {
        let issue_id = args.issue.as_ref().ok_or_else(|| {
            BeadsError::validation("issue", "Issue ID required unless --all is specified")
        })?;

        let resolved_id = resolve_issue_id(&storage_ctx.storage, &resolver, &all_ids, issue_id)?;
        graph_single(&storage_ctx.storage, &resolved_id, args.compact, json)
    }
}

/// Show graph for a single issue (traverse dependents only).
fn graph_single(storage: &SqliteStorage, root_id: &str, compact: bool, json: bool) -> Result<()> {
    // Verify the root issue exists
    let root_issue = storage
        .get_issue(root_id)?
        .ok_or_else(|| BeadsError::IssueNotFound {
            id: root_id.to_string(),
        })?;

    // DFS to find all dependents (reverse deps)
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<(String, usize)> = Vec::new();
    let mut nodes: Vec<GraphNode> = Vec::new();
    let mut edges: Vec<(String, String)> = Vec::new();

    // Start with root
    stack.push((root_id.to_string(), 0));
    visited.insert(root_id.to_string());

    while let Some((current_id, depth)) = stack.pop() {
        let issue = if current_id == root_id {
            root_issue.clone()
        } else {
            storage.get_issue(&current_id)?.unwrap_or_else(|| {
                let mut i = root_issue.clone();
                i.id.clone_from(&current_id);
                i.title = "Unknown".to_string();
                i
            })
        };

        nodes.push(GraphNode {
            id: current_id.clone(),
            title: issue.title.clone(),
            status: issue.status.as_str().to_string(),
            priority: issue.priority.0,
            depth,
        });

        // Get dependents (issues that depend on current_id)
        let mut dependents = storage.get_dependents_with_metadata(&current_id)?;

        // Filter "blocks" type
        dependents.retain(|dep| dep.dep_type == "blocks");

        // Sort dependents to ensure deterministic DFS order (stack reverses order)
        dependents.sort_by(|a, b| a.priority.0.cmp(&b.priority.0).then(a.id.cmp(&b.id)));

        for dep in dependents.into_iter().rev() {
            // Record edge: dependent -> current (dependent depends on current)
            edges.push((dep.id.clone(), current_id.clone()));

            if !visited.contains(&dep.id) {
                visited.insert(dep.id.clone());
                stack.push((dep.id.clone(), depth + 1));
            }
        }
    }

    if json {
        let output = SingleGraphOutput {
            root: root_id.to_string(),
            count: nodes.len(),
            nodes,
            edges,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    // Text output
    if nodes.len() == 1 {
        println!("No dependents for {root_id}");
        return Ok(());
    }

    if compact {
        // One-liner format: root <- dep1 <- dep2 ...
        let dependent_ids: Vec<&str> = nodes.iter().skip(1).map(|n| n.id.as_str()).collect();
        println!("{} <- {}", root_id, dependent_ids.join(" <- "));
    } else {
        // Tree-like format
        println!("Dependents of {} ({} total):", root_id, nodes.len() - 1);
        println!();
        println!(
            "  {} [P{}] [{}] (root)",
            root_issue.title,
            root_issue.priority.0,
            root_issue.status.as_str()
        );

        for node in nodes.iter().skip(1) {
            let indent = "  ".repeat(node.depth + 1);
            println!(
                "{}â† {}: {} [P{}] [{}]",
                indent, node.id, node.title, node.priority, node.status
            );
        }
    }

    Ok(())
}

/// Show graph for all `open`/`in_progress`/`blocked` issues.
#[allow(clippy::too_many_lines)]
fn graph_all(storage: &SqliteStorage, compact: bool, json: bool) -> Result<()> {
    // Get all open/in_progress/blocked issues
    let filters = ListFilters {
        statuses: Some(vec![Status::Open, Status::InProgress, Status::Blocked]),
        include_closed: false,
        include_templates: false,
        ..Default::default()
    };

    let issues = storage.list_issues(&filters)?;
    debug!(count = issues.len(), "Found issues for graph");

    if issues.is_empty() {
        if json {
            let output = AllGraphOutput {
                components: vec![],
                total_nodes: 0,
                total_components: 0,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("No open/in_progress/blocked issues found");
        }
        return Ok(());
    }

    // Build issue lookup and adjacency lists
    let issue_set: HashSet<String> = issues.iter().map(|i| i.id.clone()).collect();
    let issue_map: HashMap<String, &crate::model::Issue> =
        issues.iter().map(|i| (i.id.clone(), i)).collect();

    // Build adjacency list (both directions for connected components)
    let mut adj: HashMap<String, Vec<String>> = HashMap::new();
    let mut blocking_edges: Vec<(String, String)> = Vec::new();

    // Optimize: fetch all dependencies once
    let all_dependencies = storage.get_all_dependency_records()?;

    for issue in &issues {
        adj.entry(issue.id.clone()).or_default();

        // Get dependencies from bulk map
        if let Some(deps) = all_dependencies.get(&issue.id) {
            for dep in deps {
                let dep_id = &dep.depends_on_id;
                // Only include edges within our issue set
                if issue_set.contains(dep_id) {
                    adj.entry(issue.id.clone())
                        .or_default()
                        .push(dep_id.clone());
                    adj.entry(dep_id.clone())
                        .or_default()
                        .push(issue.id.clone());
                    blocking_edges.push((issue.id.clone(), dep_id.clone()));
                }
            }
        }
    }

    // Find connected components using BFS
    let mut visited: HashSet<String> = HashSet::new();
    let mut components: Vec<ConnectedComponent> = Vec::new();

    for issue in &issues {
        if visited.contains(&issue.id) {
            continue;
        }

        // BFS to find all nodes in this component
        let mut component_nodes: Vec<String> = Vec::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        queue.push_back(issue.id.clone());
        visited.insert(issue.id.clone());

        while let Some(current) = queue.pop_front() {
            component_nodes.push(current.clone());

            if let Some(neighbors) = adj.get(&current) {
                for neighbor in neighbors {
                    if !visited.contains(neighbor) {
                        visited.insert(neighbor.clone());
                        queue.push_back(neighbor.clone());
                    }
                }
            }
        }

        // Calculate depths using longest path from roots
        // Roots are issues with no unsatisfied dependencies within the component
        let component_set: HashSet<&String> = component_nodes.iter().collect();
        let mut depths = calculate_depths(&all_dependencies, &component_nodes, &component_set);

        // Build component output
        let mut nodes: Vec<GraphNode> = Vec::new();
        let mut roots: Vec<String> = Vec::new();

        for node_id in &component_nodes {
            if let Some(issue) = issue_map.get(node_id) {
                let depth = depths.remove(node_id).unwrap_or(0);
                if depth == 0 {
                    roots.push(node_id.clone());
                }
                nodes.push(GraphNode {
                    id: node_id.clone(),
                    title: issue.title.clone(),
                    status: issue.status.as_str().to_string(),
                    priority: issue.priority.0,
                    depth,
                });
            }
        }

        // Sort by depth, priority, id
        nodes.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then(a.priority.cmp(&b.priority))
                .then(a.id.cmp(&b.id))
        });
        roots.sort();

        // Filter edges to this component
        let component_edges: Vec<(String, String)> = blocking_edges
            .iter()
            .filter(|(from, to)| component_set.contains(from) && component_set.contains(to))
            .cloned()
            .collect();

        components.push(ConnectedComponent {
            nodes,
            edges: component_edges,
            roots,
        });
    }

    // Sort components by size (largest first)
    components.sort_by(|a, b| b.nodes.len().cmp(&a.nodes.len()));

    let total_nodes: usize = components.iter().map(|c| c.nodes.len()).sum();

    if json {
        let output = AllGraphOutput {
            total_nodes,
            total_components: components.len(),
            components,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    // Text output
    println!(
        "Dependency graph: {} issues in {} component(s)",
        total_nodes,
        components.len()
    );
    println!();

    for (i, component) in components.iter().enumerate() {
        if compact {
            // Compact: one line per component
            let ids: Vec<&str> = component.nodes.iter().map(|n| n.id.as_str()).collect();
            println!("Component {}: {}", i + 1, ids.join(", "));
        } else {
            // Detailed view
            println!(
                "Component {} ({} issues, roots: {}):",
                i + 1,
                component.nodes.len(),
                component.roots.join(", ")
            );

            for node in &component.nodes {
                let indent = "  ".repeat(node.depth + 1);
                let root_marker = if node.depth == 0 { " (root)" } else { "" };
                println!(
                    "{}{}: {} [P{}] [{}]{}",
                    indent, node.id, node.title, node.priority, node.status, root_marker
                );
            }
            println!();
        }
    }

    Ok(())
}

/// Calculate depths for nodes using longest path from roots.
///
/// Roots are issues with no dependencies within the component.
/// Depth is the longest path from any root to the node.
fn calculate_depths(
    all_dependencies: &HashMap<String, Vec<crate::model::Dependency>>,
    nodes: &[String],
    component_set: &HashSet<&String>,
) -> HashMap<String, usize> {
    let mut depths: HashMap<String, usize> = HashMap::new();

    // Get dependencies for each node (filtered to component)
    let mut deps_map: HashMap<String, Vec<String>> = HashMap::new();
    for node_id in nodes {
        if let Some(deps) = all_dependencies.get(node_id) {
            let filtered: Vec<String> = deps
                .iter()
                .map(|d| d.depends_on_id.clone())
                .filter(|d| component_set.contains(d))
                .collect();
            deps_map.insert(node_id.clone(), filtered);
        } else {
            deps_map.insert(node_id.clone(), Vec::new());
        }
    }

    // Find roots (nodes with no dependencies in component)
    let roots: Vec<&String> = nodes
        .iter()
        .filter(|n| deps_map.get(*n).is_none_or(Vec::is_empty))
        .collect();

    // BFS from each root, tracking maximum depth
    for root in &roots {
        let mut queue: VecDeque<(&String, usize)> = VecDeque::new();
        queue.push_back((root, 0));

        while let Some((current, depth)) = queue.pop_front() {
            // Update depth if this path is longer
            let entry = depths.entry(current.clone()).or_insert(0);
            if depth > *entry {
                *entry = depth;
            }

            // Find dependents (nodes that depend on current)
            for node_id in nodes {
                if let Some(node_deps) = deps_map.get(node_id) {
                    if node_deps.contains(current) {
                        queue.push_back((node_id, depth + 1));
                    }
                }
            }
        }
    }

    // Ensure all nodes have a depth (isolated nodes get 0)
    for node_id in nodes {
        depths.entry(node_id.clone()).or_insert(0);
    }

    depths
}

fn resolve_issue_id(
    storage: &SqliteStorage,
    resolver: &IdResolver,
    all_ids: &[String],
    input: &str,
) -> Result<String> {
    resolver
        .resolve(
            input,
            |id| storage.id_exists(id).unwrap_or(false),
            |hash| find_matching_ids(all_ids, hash),
        )
        .map(|resolved| resolved.id)
}
