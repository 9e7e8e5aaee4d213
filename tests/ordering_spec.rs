//! Ordering properties of column and task position spaces.
//!
//! Each test drives the public `Database` API and checks that every space
//! stays numbered exactly `0..n`, plus the concrete behaviour of each
//! operation.

use proptest::prelude::*;
use taskboard::db::Database;
use taskboard::models::*;
use taskboard::BoardError;
use uuid::Uuid;

fn setup() -> (Database, Project, Vec<BoardColumn>) {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    let project = db
        .create_project(CreateProjectInput {
            name: "Board".to_string(),
            description: None,
        })
        .expect("Failed to create project");
    let columns = db.get_project_columns(project.id).expect("Query failed");
    (db, project, columns)
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

/// Titles in position order, asserting the positions are `0..n`.
fn dense_titles(db: &Database, column: Uuid) -> Vec<String> {
    let tasks = db.get_column_tasks(column).expect("Query failed");
    let positions: Vec<i64> = tasks.iter().map(|t| t.position).collect();
    assert_eq!(positions, (0..tasks.len() as i64).collect::<Vec<_>>());
    tasks.into_iter().map(|t| t.title).collect()
}

fn ids(db: &Database, column: Uuid) -> Vec<Uuid> {
    db.get_column_tasks(column)
        .expect("Query failed")
        .into_iter()
        .map(|t| t.id)
        .collect()
}

mod scenarios {
    use super::*;

    #[test]
    fn reposition_to_front_then_delete() {
        let (db, _, columns) = setup();
        let col = columns[0].id;
        let a = add(&db, col, "A", 0);
        add(&db, col, "B", 1);
        let c = add(&db, col, "C", 2);

        db.move_task(c.id, MoveTaskInput { column_id: col, position: 0 })
            .expect("Move failed");
        assert_eq!(dense_titles(&db, col), vec!["C", "A", "B"]);

        db.delete_task(a.id).expect("Delete failed");
        assert_eq!(dense_titles(&db, col), vec!["C", "B"]);
    }

    #[test]
    fn insert_into_empty_space_past_the_end_lands_at_zero() {
        let (db, _, columns) = setup();

        let task = add(&db, columns[0].id, "Only", 5);

        assert_eq!(task.position, 0);
        assert_eq!(dense_titles(&db, columns[0].id), vec!["Only"]);
    }

    #[test]
    fn reposition_is_idempotent() {
        let (db, _, columns) = setup();
        let col = columns[0].id;
        for (i, title) in ["A", "B", "C", "D"].iter().enumerate() {
            add(&db, col, title, i as i64);
        }
        let b = ids(&db, col)[1];
        let to = MoveTaskInput { column_id: col, position: 3 };

        db.move_task(b, to).expect("Move failed");
        let after_first = dense_titles(&db, col);
        db.move_task(b, to).expect("Move failed");

        assert_eq!(dense_titles(&db, col), after_first);
    }

    #[test]
    fn reposition_round_trip_restores_order() {
        let (db, _, columns) = setup();
        let col = columns[0].id;
        for (i, title) in ["A", "B", "C", "D", "E"].iter().enumerate() {
            add(&db, col, title, i as i64);
        }
        let original = dense_titles(&db, col);
        let d = ids(&db, col)[3];

        db.move_task(d, MoveTaskInput { column_id: col, position: 0 })
            .expect("Move failed");
        db.move_task(d, MoveTaskInput { column_id: col, position: 3 })
            .expect("Move failed");

        assert_eq!(dense_titles(&db, col), original);
    }

    #[test]
    fn delete_keeps_relative_order() {
        let (db, _, columns) = setup();
        let col = columns[0].id;
        for (i, title) in ["A", "B", "C", "D"].iter().enumerate() {
            add(&db, col, title, i as i64);
        }

        db.delete_task(ids(&db, col)[0]).expect("Delete failed");

        assert_eq!(dense_titles(&db, col), vec!["B", "C", "D"]);
    }

    #[test]
    fn relocate_conserves_members() {
        let (db, _, columns) = setup();
        let (from, to) = (columns[0].id, columns[1].id);
        for (i, title) in ["A", "B", "C"].iter().enumerate() {
            add(&db, from, title, i as i64);
        }
        for (i, title) in ["X", "Y"].iter().enumerate() {
            add(&db, to, title, i as i64);
        }
        let b = ids(&db, from)[1];

        let moved = db
            .move_task(b, MoveTaskInput { column_id: to, position: 0 })
            .expect("Move failed");

        assert_eq!(moved.position, 0);
        assert_eq!(dense_titles(&db, from), vec!["A", "C"]);
        assert_eq!(dense_titles(&db, to), vec!["B", "X", "Y"]);
    }

    #[test]
    fn negative_positions_are_rejected_everywhere() {
        let (db, _, columns) = setup();
        let task = add(&db, columns[0].id, "A", 0);

        let moved = db.move_task(task.id, MoveTaskInput { column_id: columns[1].id, position: -1 });
        let updated = db.update_task(task.id, UpdateTaskInput {
            position: Some(-3),
            ..Default::default()
        });

        assert!(matches!(moved, Err(BoardError::InvalidArgument(_))));
        assert!(matches!(updated, Err(BoardError::InvalidArgument(_))));
        assert_eq!(dense_titles(&db, columns[0].id), vec!["A"]);
    }

    #[test]
    fn invalid_update_does_not_move_anything() {
        let (db, _, columns) = setup();
        let col = columns[0].id;
        add(&db, col, "A", 0);
        let b = add(&db, col, "B", 1);

        let long_title = "x".repeat(500);
        let result = db.update_task(b.id, UpdateTaskInput {
            title: Some(long_title),
            position: Some(0),
            ..Default::default()
        });

        assert!(matches!(result, Err(BoardError::InvalidArgument(_))));
        assert_eq!(dense_titles(&db, col), vec!["A", "B"]);
    }

    #[test]
    fn bulk_reorder_on_columns_is_all_or_nothing() {
        let (db, project, columns) = setup();
        let mut reversed: Vec<Uuid> = columns.iter().map(|c| c.id).collect();
        reversed.reverse();

        db.reorder_columns(project.id, &reversed).expect("Reorder failed");
        let names: Vec<_> = db
            .get_project_columns(project.id)
            .expect("Query failed")
            .into_iter()
            .map(|c| (c.position, c.name))
            .collect();
        assert_eq!(
            names,
            vec![
                (0, "Done".to_string()),
                (1, "In Progress".to_string()),
                (2, "To Do".to_string())
            ]
        );

        reversed.push(Uuid::new_v4());
        assert!(db.reorder_columns(project.id, &reversed).is_err());
        assert!(db.check_board(project.id).expect("Check failed"));
    }
}

// ============================================================
// Random operation sequences
// ============================================================

#[derive(Debug, Clone)]
enum Op {
    Insert { column: usize, position: i64 },
    Move { pick: usize, column: usize, position: i64 },
    Delete { pick: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..2usize, 0..8i64).prop_map(|(column, position)| Op::Insert { column, position }),
        (any::<usize>(), 0..2usize, 0..8i64)
            .prop_map(|(pick, column, position)| Op::Move { pick, column, position }),
        any::<usize>().prop_map(|pick| Op::Delete { pick }),
    ]
}

/// Expected state: task ids per column, in order.
fn model_insert(model: &mut [Vec<Uuid>], column: usize, position: i64, id: Uuid) {
    let slot = (position as usize).min(model[column].len());
    model[column].insert(slot, id);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn any_sequence_matches_the_list_model(ops in prop::collection::vec(op(), 1..30)) {
        let (db, project, columns) = setup();
        let scopes = [columns[0].id, columns[1].id];
        let mut model: Vec<Vec<Uuid>> = vec![Vec::new(), Vec::new()];
        let mut counter = 0;

        for op in ops {
            let all: Vec<(usize, Uuid)> = model
                .iter()
                .enumerate()
                .flat_map(|(c, ids)| ids.iter().map(move |id| (c, *id)))
                .collect();

            match op {
                Op::Insert { column, position } => {
                    counter += 1;
                    let task = add(&db, scopes[column], &format!("t{counter}"), position);
                    model_insert(&mut model, column, position, task.id);
                }
                Op::Move { pick, column, position } => {
                    if all.is_empty() {
                        continue;
                    }
                    let (from, id) = all[pick % all.len()];
                    db.move_task(id, MoveTaskInput { column_id: scopes[column], position })
                        .expect("Move failed");
                    model[from].retain(|x| *x != id);
                    model_insert(&mut model, column, position, id);
                }
                Op::Delete { pick } => {
                    if all.is_empty() {
                        continue;
                    }
                    let (from, id) = all[pick % all.len()];
                    prop_assert!(db.delete_task(id).expect("Delete failed"));
                    model[from].retain(|x| *x != id);
                }
            }

            for (c, scope) in scopes.iter().enumerate() {
                dense_titles(&db, *scope);
                prop_assert_eq!(&ids(&db, *scope), &model[c]);
            }
        }

        prop_assert!(db.check_board(project.id).expect("Check failed"));
    }
}
