//! Stats command implementation.
//!
//! Shows project statistics including issue counts by status, type, priority,
//! assignee, and label. Also supports recent activity tracking via git.

use crate::cli::StatsArgs;
use crate::config;
use crate::error::Result;
use crate::format::{Breakdown, BreakdownEntry, RecentActivity, Statistics, StatsSummary};
use crate::model::{IssueType, Status};
use crate::storage::{ListFilters, SqliteStorage};
use chrono::Utc;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Execute the stats command.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or queries fail.
pub fn execute(args: &StatsArgs, json: bool, cli: &config::CliOverrides) -> Result<()> {
    let beads_dir = config::discover_beads_dir(Some(Path::new(".")))?;
    let storage_ctx = config::open_storage_with_cli(&beads_dir, cli)?;
    let storage = &storage_ctx.storage;

    info!("Computing project statistics");

    // Get all issues including closed and tombstones for comprehensive stats
    let all_filters = ListFilters {
        include_closed: true,
        include_templates: true,
        ..Default::default()
    };
    let all_issues = storage.list_issues(&all_filters)?;

    debug!(total = all_issues.len(), "Loaded all issues for stats");

    // Compute summary counts
    let summary = compute_summary(storage, &all_issues)?;

    // Compute breakdowns if requested
    let mut breakdowns = Vec::new();

    if args.by_type {
        breakdowns.push(compute_type_breakdown(&all_issues));
    }
    if args.by_priority {
        breakdowns.push(compute_priority_breakdown(&all_issues));
    }
    if args.by_assignee {
        breakdowns.push(compute_assignee_breakdown(&all_issues));
    }
    if args.by_label {
        breakdowns.push(compute_label_breakdown(storage, &all_issues)?);
    }

    // Compute recent activity by default (matches bd behavior).
    // Use --no-activity to skip this (for performance).
    let recent_activity = if args.no_activity {
        None
    } else {
        compute_recent_activity(&beads_dir, args.activity_hours)
    };

    let output = Statistics {
        summary,
        breakdowns,
        recent_activity,
    };

    // Output
    let use_json = json || args.robot;
    if use_json {
        let json_str = serde_json::to_string_pretty(&output)?;
        println!("{json_str}");
    } else {
        print_text_output(&output);
    }

    Ok(())
}

/// Compute summary statistics.
#[allow(clippy::cast_precision_loss)]
fn compute_summary(
    storage: &SqliteStorage,
    issues: &[crate::model::Issue],
) -> Result<StatsSummary> {
    let mut open = 0;
    let mut in_progress = 0;
    let mut closed = 0;
    let mut blocked_by_status = 0;
    let mut deferred = 0;
    let mut tombstone = 0;
    let mut pinned = 0;
    let mut epics = Vec::new();
    let mut lead_times = Vec::new();

    // Use only 'blocks' dependency type for stats blocked count (classic bd semantics).
    // This differs from the ready/blocked commands which use the full blocked cache.
    let blocked_by_blocks = storage.get_blocked_by_blocks_deps_only()?;

    // Get full blocked cache for accurate Ready count (must match `br ready` behavior)
    let all_blocked_ids = storage.get_blocked_ids()?;

    for issue in issues {
        match issue.status {
            Status::Open => open += 1,
            Status::InProgress => in_progress += 1,
            Status::Closed => {
                closed += 1;
                // Calculate lead time for closed issues
                if let Some(closed_at) = issue.closed_at {
                    let lead_time = closed_at.signed_duration_since(issue.created_at);
                    lead_times.push(lead_time.num_hours() as f64);
                }
            }
            Status::Blocked => blocked_by_status += 1,
            Status::Deferred => deferred += 1,
            Status::Tombstone => tombstone += 1,
            Status::Pinned | Status::Custom(_) => {}
        }
        if issue.pinned || issue.status == Status::Pinned {
            pinned += 1;
        }

        // Track epics for eligible-for-closure calculation
        if issue.issue_type == IssueType::Epic
            && !matches!(issue.status, Status::Closed | Status::Tombstone)
        {
            epics.push(issue.id.clone());
        }
    }

    // Ready count: status=open (not in_progress), no blockers (full definition).
    let now = Utc::now();
    let ready = issues
        .iter()
        .filter(|i| {
            i.status == Status::Open
                && !all_blocked_ids.contains(&i.id)
                && !i.ephemeral
                && !i.pinned
                && i.defer_until.is_none_or(|d| d <= now)
        })
        .count();

    // Blocked count based on 'blocks' deps only (classic bd semantics).
    let blocked = blocked_by_blocks.len();

    // Epics eligible for closure: all children closed
    let epics_eligible = count_epics_eligible_for_closure(storage, &epics)?;

    // Average lead time
    let avg_lead_time = if lead_times.is_empty() {
        None
    } else {
        let sum: f64 = lead_times.iter().sum();
        Some(sum / lead_times.len() as f64)
    };

    // Total excludes tombstones
    let total = issues
        .iter()
        .filter(|i| i.status != Status::Tombstone)
        .count();

    // blocked_by_status is unused but kept for potential future use
    let _ = blocked_by_status;

    Ok(StatsSummary {
        total_issues: total,
        open_issues: open,
        in_progress_issues: in_progress,
        closed_issues: closed,
        blocked_issues: blocked,
        deferred_issues: deferred,
        ready_issues: ready,
        tombstone_issues: tombstone,
        pinned_issues: pinned,
        epics_eligible_for_closure: epics_eligible,
        average_lead_time_hours: avg_lead_time,
    })
}

/// Count epics that have all children closed.
fn count_epics_eligible_for_closure(storage: &SqliteStorage, epic_ids: &[String]) -> Result<usize> {
    let mut eligible = 0;

    for epic_id in epic_ids {
        // Get children via parent-child dependencies
        let children = storage.get_dependents_with_metadata(epic_id)?;
        let parent_child_children: Vec<_> = children
            .iter()
            .filter(|c| c.dep_type == "parent-child")
            .collect();

        if parent_child_children.is_empty() {
            // No children means not eligible (nothing to close)
            continue;
        }

        // Check if all children are closed
        let all_closed = parent_child_children
            .iter()
            .all(|c| matches!(c.status, Status::Closed | Status::Tombstone));

        if all_closed {
            eligible += 1;
        }
    }

    Ok(eligible)
}

/// Compute breakdown by issue type.
fn compute_type_breakdown(issues: &[crate::model::Issue]) -> Breakdown {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for issue in issues {
        if issue.status == Status::Tombstone {
            continue;
        }
        let key = issue.issue_type.as_str().to_string();
        *counts.entry(key).or_insert(0) += 1;
    }

    Breakdown {
        dimension: "type".to_string(),
        counts: counts
            .into_iter()
            .map(|(key, count)| BreakdownEntry { key, count })
            .collect(),
    }
}

/// Compute breakdown by priority.
fn compute_priority_breakdown(issues: &[crate::model::Issue]) -> Breakdown {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();

    for issue in issues {
        if issue.status == Status::Tombstone {
            continue;
        }
        *counts.entry(issue.priority.0).or_insert(0) += 1;
    }

    Breakdown {
        dimension: "priority".to_string(),
        counts: counts
            .into_iter()
            .map(|(p, count)| BreakdownEntry {
                key: format!("P{p}"),
                count,
            })
            .collect(),
    }
}

/// Compute breakdown by assignee.
fn compute_assignee_breakdown(issues: &[crate::model::Issue]) -> Breakdown {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for issue in issues {
        if issue.status == Status::Tombstone {
            continue;
        }
        let key = issue
            .assignee
            .as_deref()
            .unwrap_or("(unassigned)")
            .to_string();
        *counts.entry(key).or_insert(0) += 1;
    }

    Breakdown {
        dimension: "assignee".to_string(),
        counts: counts
            .into_iter()
            .map(|(key, count)| BreakdownEntry { key, count })
            .collect(),
    }
}

/// Compute breakdown by label.
fn compute_label_breakdown(
    storage: &SqliteStorage,
    issues: &[crate::model::Issue],
) -> Result<Breakdown> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for issue in issues {
        if issue.status == Status::Tombstone {
            continue;
        }
        let labels = storage.get_labels(&issue.id)?;
        if labels.is_empty() {
            *counts.entry("(no labels)".to_string()).or_insert(0) += 1;
        } else {
            for label in labels {
                *counts.entry(label).or_insert(0) += 1;
            }
        }
    }

    Ok(Breakdown {
        dimension: "label".to_string(),
        counts: counts
            .into_iter()
            .map(|(key, count)| BreakdownEntry { key, count })
            .collect(),
    })
}

/// Compute recent activity from git log on issues.jsonl.
fn compute_recent_activity(beads_dir: &Path, hours: u32) -> Option<RecentActivity> {
    let jsonl_path = beads_dir.join("issues.jsonl");
    if !jsonl_path.exists() {
        debug!("No issues.jsonl found for activity tracking");
        return None;
    }

    let since = format!("{hours} hours ago");

    // Get the git repo root (parent of .beads)
    let repo_root = beads_dir.parent().unwrap_or(beads_dir);

    // Get commit count using relative path from repo root
    let mut child = Command::new("git")
        .args([
            "log",
            "--oneline",
            "--since",
            &since,
            "--",
            ".beads/issues.jsonl",
        ])
        .current_dir(repo_root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .ok()?;

    let stdout = child.stdout.take()?;
    let reader = BufReader::new(stdout);
    let commit_count = reader.lines().count();

    let status = child.wait().ok()?;
    if !status.success() {
        // Log stderr if available
        if let Some(stderr) = child.stderr {
            use std::io::Read;
            let mut err_msg = String::new();
            if std::io::BufReader::new(stderr)
                .read_to_string(&mut err_msg)
                .is_ok()
            {
                debug!(stderr = %err_msg, "Git log failed");
            }
        }
        return None;
    }

    Some(RecentActivity {
        hours_tracked: hours,
        commit_count,
        issues_created: 0,
        issues_closed: 0,
        issues_updated: 0,
        issues_reopened: 0,
        total_changes: 0,
    })
}

/// Print text output for stats.
fn print_text_output(output: &Statistics) {
    println!("Project Statistics");
    println!("==================\n");

    let s = &output.summary;
    println!("Summary:");
    println!("  Total issues:     {}", s.total_issues);
    println!("  Open:             {}", s.open_issues);
    println!("  In Progress:      {}", s.in_progress_issues);
    println!("  Closed:           {}", s.closed_issues);
    println!("  Blocked:          {}", s.blocked_issues);
    println!("  Deferred:         {}", s.deferred_issues);
    println!("  Ready:            {}", s.ready_issues);
    if s.tombstone_issues > 0 {
        println!("  Tombstones:       {}", s.tombstone_issues);
    }
    if s.pinned_issues > 0 {
        println!("  Pinned:           {}", s.pinned_issues);
    }
    if s.epics_eligible_for_closure > 0 {
        println!("  Epics ready to close: {}", s.epics_eligible_for_closure);
    }
    if let Some(avg) = s.average_lead_time_hours {
        println!("  Avg lead time:    {avg:.1}h");
    }

    for breakdown in &output.breakdowns {
        println!("\nBy {}:", breakdown.dimension);
        for entry in &breakdown.counts {
            println!("  {}: {}", entry.key, entry.count);
        }
    }

    if let Some(activity) = &output.recent_activity {
        println!("\nRecent Activity (last {} hours):", activity.hours_tracked);
        println!("  Commits:         {}", activity.commit_count);
        println!("  Total Changes:   {}", activity.total_changes);
        println!("  Issues Created:  {}", activity.issues_created);
        println!("  Issues Closed:   {}", activity.issues_closed);
        println!("  Issues Reopened: {}", activity.issues_reopened);
        println!("  Issues Updated:  {}", activity.issues_updated);
    }
}
