//! Concurrent writers against one database file.
//!
//! Every handle here is a separate SQLite connection, the same as separate
//! processes sharing a board.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use taskboard::config::RetryPolicy;
use taskboard::db::Database;
use taskboard::models::*;
use taskboard::BoardError;
use tempfile::TempDir;
use uuid::Uuid;

fn patient() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 10,
        backoff: Duration::from_millis(5),
        busy_timeout: Duration::from_secs(5),
    }
}

fn setup(dir: &TempDir) -> (PathBuf, Database, Vec<BoardColumn>) {
    let path = dir.path().join("board.db");
    let db = Database::open_with_policy(path.clone(), patient()).expect("Failed to open");
    db.migrate().expect("Failed to migrate");
    let project = db
        .create_project(CreateProjectInput {
            name: "Shared".to_string(),
            description: None,
        })
        .expect("Failed to create project");
    let columns = db.get_project_columns(project.id).expect("Query failed");
    (path, db, columns)
}

fn add(db: &Database, column: Uuid, title: &str, position: i64) -> Task {
    db.create_task(
        column,
        CreateTaskInput {
            title: title.to_string(),
            position,
            ..Default::default()
        },
    )
    .expect("Failed to create task")
}

fn assert_dense(db: &Database, column: Uuid) -> Vec<Task> {
    let tasks = db.get_column_tasks(column).expect("Query failed");
    let positions: Vec<i64> = tasks.iter().map(|t| t.position).collect();
    assert_eq!(positions, (0..tasks.len() as i64).collect::<Vec<_>>());
    tasks
}

/// Hold the write lock from a raw connection until the returned sender fires.
fn hold_write_lock(path: &Path) -> (thread::JoinHandle<()>, std::sync::mpsc::Sender<()>) {
    let (locked_tx, locked_rx) = std::sync::mpsc::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let path = path.to_path_buf();
    let handle = thread::spawn(move || {
        let conn = Connection::open(path).expect("Failed to open raw connection");
        conn.execute_batch("BEGIN IMMEDIATE").expect("Failed to lock");
        locked_tx.send(()).expect("Test hung up");
        let _ = release_rx.recv();
        conn.execute_batch("COMMIT").expect("Failed to unlock");
    });
    locked_rx.recv().expect("Lock holder died");
    (handle, release_tx)
}

#[test]
fn interleaved_handles_keep_a_column_dense() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let (path, db, columns) = setup(&dir);
    let (left, right) = (columns[0].id, columns[1].id);
    let writers = 6;
    let inserts_per_writer = 15;

    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let path = path.clone();
            thread::spawn(move || {
                let db = Database::open_with_policy(path, patient()).expect("Failed to open");
                for i in 0..inserts_per_writer {
                    let column = if (w + i) % 2 == 0 { left } else { right };
                    add(&db, column, &format!("w{w}-{i}"), ((w * 7 + i * 3) % 5) as i64);

                    let tasks = db.get_column_tasks(left).expect("Query failed");
                    if let Some(task) = tasks.get((w + i) % tasks.len().max(1)) {
                        let to = if i % 3 == 0 { right } else { left };
                        db.move_task(task.id, MoveTaskInput {
                            column_id: to,
                            position: (i % 4) as i64,
                        })
                        .expect("Move failed");
                    }
                    thread::sleep(Duration::from_millis(((w + i) % 3) as u64));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Writer panicked");
    }

    let total = assert_dense(&db, left).len() + assert_dense(&db, right).len();
    assert_eq!(total, writers * inserts_per_writer);
}

#[test]
fn simultaneous_migrations_on_a_fresh_file_apply_once() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let openers = 4;

    for round in 0..20 {
        let path = dir.path().join(format!("fresh-{round}.db"));
        let barrier = Arc::new(Barrier::new(openers));

        let handles: Vec<_> = (0..openers)
            .map(|_| {
                let path = path.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let db = Database::open_with_policy(path, patient())?;
                    barrier.wait();
                    db.migrate()?;
                    anyhow::Ok(db)
                })
            })
            .collect();

        let handles: Vec<Database> = handles
            .into_iter()
            .map(|h| {
                h.join()
                    .expect("Opener panicked")
                    .unwrap_or_else(|e| panic!("round {round}: {e:#}"))
            })
            .collect();

        let raw = Connection::open(&path).expect("Failed to open raw connection");
        let applied: i64 = raw
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("Query failed");
        assert_eq!(applied, 2, "round {round}");

        // Every handle is usable afterwards
        let project = handles[0]
            .create_project(CreateProjectInput {
                name: "Fresh".to_string(),
                description: None,
            })
            .expect("Failed to create project");
        for db in &handles {
            assert_eq!(db.get_project_columns(project.id).expect("Query failed").len(), 3);
        }
    }
}

#[test]
fn cloned_handles_serialize_in_process() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let (_, db, columns) = setup(&dir);
    let column = columns[0].id;

    let handles: Vec<_> = (0..4)
        .map(|w| {
            let db = db.clone();
            thread::spawn(move || {
                for i in 0..10 {
                    let task = add(&db, column, &format!("w{w}-{i}"), 0);
                    db.update_task(task.id, UpdateTaskInput {
                        position: Some((i * 2) as i64),
                        ..Default::default()
                    })
                    .expect("Update failed");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Writer panicked");
    }

    assert_eq!(assert_dense(&db, column).len(), 40);
}

#[test]
fn writer_waits_out_a_held_lock() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let (path, db, columns) = setup(&dir);
    let (holder, release) = hold_write_lock(&path);

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        release.send(()).expect("Lock holder gone");
    });

    let task = add(&db, columns[0].id, "Patient", 0);

    releaser.join().expect("Releaser panicked");
    holder.join().expect("Lock holder panicked");
    assert_eq!(task.position, 0);
    assert_eq!(assert_dense(&db, columns[0].id).len(), 1);
}

#[test]
fn exhausted_retries_surface_a_conflict_and_write_nothing() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let (path, db, columns) = setup(&dir);
    add(&db, columns[0].id, "A", 0);

    let impatient = Database::open_with_policy(
        path.clone(),
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
            busy_timeout: Duration::ZERO,
        },
    )
    .expect("Failed to open");

    let (holder, release) = hold_write_lock(&path);
    let result = impatient.create_task(
        columns[0].id,
        CreateTaskInput {
            title: "Blocked".to_string(),
            position: 0,
            ..Default::default()
        },
    );
    release.send(()).expect("Lock holder gone");
    holder.join().expect("Lock holder panicked");

    assert!(matches!(
        result,
        Err(BoardError::ConcurrencyConflict { attempts: 3 })
    ));
    let tasks = assert_dense(&db, columns[0].id);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "A");
}

#[test]
fn failure_after_the_shift_rolls_everything_back() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let (path, db, columns) = setup(&dir);
    let (left, right) = (columns[0].id, columns[1].id);
    add(&db, left, "A", 0);
    let b = add(&db, left, "B", 1);
    add(&db, right, "X", 0);

    // Reject the final timestamp write of a move, after both spaces have shifted
    let raw = Connection::open(&path).expect("Failed to open raw connection");
    raw.execute_batch(&format!(
        "CREATE TRIGGER refuse_move BEFORE UPDATE OF updated_at ON tasks
         WHEN NEW.id = '{}'
         BEGIN SELECT RAISE(ABORT, 'refused'); END;",
        b.id
    ))
    .expect("Failed to create trigger");

    let result = db.move_task(b.id, MoveTaskInput {
        column_id: right,
        position: 0,
    });

    assert!(matches!(result, Err(BoardError::Store(_))));
    let left_titles: Vec<_> = assert_dense(&db, left).into_iter().map(|t| t.title).collect();
    let right_titles: Vec<_> = assert_dense(&db, right).into_iter().map(|t| t.title).collect();
    assert_eq!(left_titles, vec!["A", "B"]);
    assert_eq!(right_titles, vec!["X"]);
}
