//! Daemon server: a per-workspace singleton that accepts RPC connections on
//! a Unix domain socket and routes them to the Store.
//!
//! Mutations are serialized through a single `Mutex<SqliteStorage>` (the
//! "single-writer" option the concurrency model allows); reads take the
//! same lock today but do no I/O beyond SQLite's own read path, so they are
//! not a contention concern at the scale this daemon targets.

use std::io::{BufReader, BufWriter};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;

use crate::config;
use crate::daemon::protocol::{read_envelope, write_envelope, Op, Request, Response};
use crate::daemon::socket::{derive_socket_path, pid_file_path};
use crate::error::{BeadsError, Result};
use crate::model::{Dependency, Issue, IssueType, Priority, Status};
use crate::storage::{IssueUpdate, ListFilters, SqliteStorage};
use crate::sync::{self, debounce::{DebounceHandle, FlushDebouncer}};
use crate::util::id::{resolve_id, IdGenerator};

/// Handle on a running daemon. Dropping it removes the socket and PID file.
pub struct DaemonServer {
    beads_dir: PathBuf,
    socket_path: PathBuf,
    pid_path: PathBuf,
    storage: Arc<Mutex<SqliteStorage>>,
    debouncer: FlushDebouncer,
    listener: UnixListener,
}

impl DaemonServer {
    /// Bind the daemon's socket for `beads_dir`, writing a PID file and
    /// cleaning up any stale one left by a crashed prior instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the database can't be opened, a live daemon
    /// already owns the socket, or the socket can't be bound.
    pub fn bind(beads_dir: &Path, socket_override: Option<PathBuf>) -> Result<Self> {
        let (storage, paths) = config::open_storage(beads_dir, None, None)?;
        let socket_path = derive_socket_path(beads_dir, socket_override.as_deref());
        let pid_path = pid_file_path(beads_dir);

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        remove_stale_socket(&socket_path)?;

        let listener = UnixListener::bind(&socket_path).map_err(|e| BeadsError::SocketError {
            reason: format!("failed to bind {}: {e}", socket_path.display()),
        })?;

        std::fs::write(&pid_path, std::process::id().to_string())?;

        let storage = Arc::new(Mutex::new(storage));
        let flush_storage = Arc::clone(&storage);
        let flush_beads_dir = paths.beads_dir.clone();
        let debouncer = FlushDebouncer::new(sync::DEFAULT_FLUSH_WINDOW, move || {
            let mut guard = flush_storage.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(err) = sync::auto_flush(&mut guard, &flush_beads_dir) {
                tracing::warn!(%err, "debounced flush failed");
            }
        });

        Ok(Self {
            beads_dir: paths.beads_dir,
            socket_path,
            pid_path,
            storage,
            debouncer,
            listener,
        })
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until the process is told to stop. Each
    /// connection is handled on its own thread; a connection itself
    /// handles exactly one request (this is not a persistent session).
    ///
    /// # Errors
    ///
    /// Returns an error only if the listener itself fails unrecoverably.
    pub fn run(&self) -> Result<()> {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let storage = Arc::clone(&self.storage);
                    let beads_dir = self.beads_dir.clone();
                    let debouncer = self.debouncer.clone_handle();
                    std::thread::spawn(move || {
                        if let Err(err) = handle_connection(stream, &storage, &beads_dir, &debouncer) {
                            tracing::warn!(%err, "daemon connection failed");
                        }
                    });
                }
                Err(err) => tracing::warn!(%err, "daemon accept failed"),
            }
        }
        Ok(())
    }
}

impl Drop for DaemonServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
        let _ = std::fs::remove_file(&self.pid_path);
    }
}

fn remove_stale_socket(socket_path: &Path) -> Result<()> {
    if !socket_path.exists() {
        return Ok(());
    }
    if UnixStream::connect(socket_path).is_ok() {
        return Err(BeadsError::SocketError {
            reason: format!("a daemon is already listening on {}", socket_path.display()),
        });
    }
    std::fs::remove_file(socket_path)?;
    Ok(())
}

fn handle_connection(
    stream: UnixStream,
    storage: &Arc<Mutex<SqliteStorage>>,
    beads_dir: &Path,
    debouncer: &DebounceHandle,
) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    let request: Request = read_envelope(&mut reader)?;
    let response = dispatch(storage, beads_dir, debouncer, &request);
    write_envelope(&mut writer, &response)
}

/// Route one request to the Store, running the freshness hook first and
/// kicking the flush debouncer after any successful mutating op.
fn dispatch(
    storage: &Arc<Mutex<SqliteStorage>>,
    beads_dir: &Path,
    debouncer: &DebounceHandle,
    request: &Request,
) -> Response {
    let mut guard = match storage.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Err(err) = sync::auto_import(&mut guard, beads_dir) {
        tracing::warn!(%err, "freshness hook failed, serving request against possibly-stale state");
    }

    match dispatch_op(&mut guard, debouncer, request) {
        Ok(response) => response,
        Err(err) => Response::from(&err),
    }
}

fn dispatch_op(
    storage: &mut SqliteStorage,
    debouncer: &DebounceHandle,
    request: &Request,
) -> Result<Response> {
    let response = match request.op {
        Op::Show => op_show(storage, &request.args),
        Op::List => op_list(storage, &request.args),
        Op::Create => op_create(storage, &request.args),
        Op::Update => op_update(storage, &request.args),
        Op::Delete => op_delete(storage, &request.args),
        Op::AddDependency => op_add_dependency(storage, &request.args),
        Op::RemoveDependency => op_remove_dependency(storage, &request.args),
        Op::AddLabel => op_add_label(storage, &request.args),
        Op::RemoveLabel => op_remove_label(storage, &request.args),
        Op::ResolveId => op_resolve_id(storage, &request.args),
        Op::Stats => op_stats(storage),
        Op::Batch => op_batch(storage, debouncer, &request.args),
    };
    if response.is_ok() && request.op.is_mutating() {
        debouncer.mark();
    }
    response
}

fn actor(args: &serde_json::Value) -> String {
    args.get("actor")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("daemon")
        .to_string()
}

fn require_str<'a>(args: &'a serde_json::Value, field: &str) -> Result<&'a str> {
    args.get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| BeadsError::Validation {
            field: field.to_string(),
            reason: "required".to_string(),
        })
}

fn op_show(storage: &SqliteStorage, args: &serde_json::Value) -> Result<Response> {
    let id = resolve_issue_id(storage, require_str(args, "id")?)?;
    let issue = storage
        .get_issue(&id)?
        .ok_or(BeadsError::IssueNotFound { id })?;
    Ok(Response::ok(serde_json::to_value(issue)?))
}

fn op_list(storage: &SqliteStorage, args: &serde_json::Value) -> Result<Response> {
    let mut filters = ListFilters::default();
    if let Some(assignee) = args.get("assignee").and_then(serde_json::Value::as_str) {
        filters.assignee = Some(assignee.to_string());
    }
    if let Some(include_closed) = args.get("include_closed").and_then(serde_json::Value::as_bool) {
        filters.include_closed = include_closed;
    }
    if let Some(limit) = args.get("limit").and_then(serde_json::Value::as_u64) {
        filters.limit = Some(limit as usize);
    }
    let issues = storage.list_issues(&filters)?;
    Ok(Response::ok(serde_json::to_value(issues)?))
}

fn op_create(storage: &mut SqliteStorage, args: &serde_json::Value) -> Result<Response> {
    let title = require_str(args, "title")?.to_string();
    if title.trim().is_empty() {
        return Err(BeadsError::validation("title", "cannot be empty"));
    }
    let actor = actor(args);

    let priority = args
        .get("priority")
        .and_then(serde_json::Value::as_str)
        .map(str::parse::<Priority>)
        .transpose()?
        .unwrap_or(Priority::MEDIUM);
    let issue_type = args
        .get("type")
        .and_then(serde_json::Value::as_str)
        .map(str::parse::<IssueType>)
        .transpose()?
        .unwrap_or(IssueType::Task);
    let description = args
        .get("description")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);

    let id_gen = IdGenerator::with_defaults();
    let now = Utc::now();
    let count = storage.count_issues()?;
    let id = id_gen.generate(&title, description.as_deref(), None, now, count, |id| {
        storage.id_exists(id).unwrap_or(false)
    });

    let mut issue = Issue {
        id,
        content_hash: None,
        title,
        description,
        design: None,
        acceptance_criteria: None,
        notes: None,
        status: Status::Open,
        priority,
        issue_type,
        assignee: None,
        owner: None,
        estimated_minutes: None,
        created_at: now,
        created_by: None,
        updated_at: now,
        closed_at: None,
        close_reason: None,
        closed_by_session: None,
        due_at: None,
        defer_until: None,
        external_ref: None,
        source_system: None,
        deleted_at: None,
        deleted_by: None,
        delete_reason: None,
        original_type: None,
        compaction_level: None,
        compacted_at: None,
        compacted_at_commit: None,
        original_size: None,
        sender: None,
        ephemeral: false,
        pinned: false,
        is_template: false,
        labels: vec![],
        dependencies: vec![],
        comments: vec![],
    };
    issue.content_hash = Some(issue.compute_content_hash());

    storage.create_issue(&issue, &actor)?;
    Ok(Response::ok(serde_json::to_value(issue)?))
}

fn op_update(storage: &mut SqliteStorage, args: &serde_json::Value) -> Result<Response> {
    let id = resolve_issue_id(storage, require_str(args, "id")?)?;
    let actor = actor(args);

    let mut updates = IssueUpdate::default();
    if let Some(title) = args.get("title").and_then(serde_json::Value::as_str) {
        updates.title = Some(title.to_string());
    }
    if let Some(status) = args.get("status").and_then(serde_json::Value::as_str) {
        updates.status = Some(status.parse()?);
    }
    if let Some(priority) = args.get("priority").and_then(serde_json::Value::as_str) {
        updates.priority = Some(priority.parse()?);
    }
    if let Some(assignee) = args.get("assignee").and_then(serde_json::Value::as_str) {
        updates.assignee = Some(Some(assignee.to_string()));
    }

    let issue = storage.update_issue(&id, &updates, &actor)?;
    Ok(Response::ok(serde_json::to_value(issue)?))
}

fn op_delete(storage: &mut SqliteStorage, args: &serde_json::Value) -> Result<Response> {
    let id = resolve_issue_id(storage, require_str(args, "id")?)?;
    let actor = actor(args);
    let reason = args
        .get("reason")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("deleted via daemon");
    let issue = storage.delete_issue(&id, &actor, reason, None)?;
    Ok(Response::ok(serde_json::to_value(issue)?))
}

fn op_add_dependency(storage: &mut SqliteStorage, args: &serde_json::Value) -> Result<Response> {
    let id = resolve_issue_id(storage, require_str(args, "id")?)?;
    let depends_on = resolve_issue_id(storage, require_str(args, "depends_on")?)?;
    let dep_type = args
        .get("dep_type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("blocks");
    let actor = actor(args);
    let added = storage.add_dependency(&id, &depends_on, dep_type, &actor)?;
    let dependency = Dependency {
        issue_id: id,
        depends_on_id: depends_on,
        dep_type: dep_type
            .parse()
            .unwrap_or(crate::model::DependencyType::Blocks),
        created_at: Utc::now(),
        created_by: Some(actor),
    };
    Ok(Response::ok(json!({ "added": added, "dependency": dependency })))
}

fn op_remove_dependency(storage: &mut SqliteStorage, args: &serde_json::Value) -> Result<Response> {
    let id = resolve_issue_id(storage, require_str(args, "id")?)?;
    let depends_on = resolve_issue_id(storage, require_str(args, "depends_on")?)?;
    let actor = actor(args);
    let removed = storage.remove_dependency(&id, &depends_on, &actor)?;
    Ok(Response::ok(json!({ "removed": removed })))
}

fn op_add_label(storage: &mut SqliteStorage, args: &serde_json::Value) -> Result<Response> {
    let id = resolve_issue_id(storage, require_str(args, "id")?)?;
    let label = require_str(args, "label")?;
    let actor = actor(args);
    let added = storage.add_label(&id, label, &actor)?;
    Ok(Response::ok(json!({ "added": added })))
}

fn op_remove_label(storage: &mut SqliteStorage, args: &serde_json::Value) -> Result<Response> {
    let id = resolve_issue_id(storage, require_str(args, "id")?)?;
    let label = require_str(args, "label")?;
    let actor = actor(args);
    let removed = storage.remove_label(&id, label, &actor)?;
    Ok(Response::ok(json!({ "removed": removed })))
}

fn op_resolve_id(storage: &SqliteStorage, args: &serde_json::Value) -> Result<Response> {
    let input = require_str(args, "id")?;
    let id = resolve_issue_id(storage, input)?;
    Ok(Response::ok(json!({ "id": id })))
}

fn op_stats(storage: &SqliteStorage) -> Result<Response> {
    let filters = ListFilters {
        include_closed: true,
        include_templates: true,
        ..Default::default()
    };
    let issues = storage.list_issues(&filters)?;
    let open = issues.iter().filter(|i| i.status == Status::Open).count();
    let closed = issues
        .iter()
        .filter(|i| i.status == Status::Closed)
        .count();
    let in_progress = issues
        .iter()
        .filter(|i| i.status == Status::InProgress)
        .count();
    Ok(Response::ok(json!({
        "total": issues.len(),
        "open": open,
        "in_progress": in_progress,
        "closed": closed,
    })))
}

/// A batch is a list of sub-requests, each dispatched and replied to
/// independently; one failing does not abort the rest. Each mutating
/// sub-request kicks the flush debouncer on its own, same as a top-level
/// request of that op would.
fn op_batch(
    storage: &mut SqliteStorage,
    debouncer: &DebounceHandle,
    args: &serde_json::Value,
) -> Result<Response> {
    let items = args
        .get("requests")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| BeadsError::Validation {
            field: "requests".to_string(),
            reason: "batch requires a `requests` array".to_string(),
        })?;

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let sub_request: Request = serde_json::from_value(item.clone())?;
        let result = dispatch_op(storage, debouncer, &sub_request)
            .unwrap_or_else(|err| Response::from(&err));
        results.push(result);
    }
    Ok(Response::ok(serde_json::to_value(results)?))
}

fn resolve_issue_id(storage: &SqliteStorage, input: &str) -> Result<String> {
    resolve_id(
        input,
        |candidate| storage.get_issue(candidate).ok().flatten().is_some(),
        |prefix| {
            storage
                .list_issues(&ListFilters {
                    include_closed: true,
                    include_templates: true,
                    ..Default::default()
                })
                .unwrap_or_default()
                .into_iter()
                .map(|issue| issue.id)
                .filter(|id| id.starts_with(prefix))
                .collect()
        },
    )
}
