//! Goal lifecycle through an on-disk store, including readers on separate
//! connections.

use stride::hierarchy::{MicroStatus, NewGoal, NodeStatus, Tone};
use stride::store::Store;

use crate::helpers::{temp_store, two_subgoal_breakdown};

fn micro_id(store: &Store, goal_id: &str, title: &str) -> String {
    store
        .goal_tree(goal_id)
        .unwrap()
        .microtasks()
        .find(|m| m.title == title)
        .map(|m| m.id.clone())
        .expect("microtask")
}

fn focus_titles(store: &Store, goal_id: &str) -> Option<(String, String, String)> {
    let focus = store.focus_pointer(goal_id).unwrap()?;
    let tree = store.goal_tree(goal_id).unwrap();
    let sub = tree
        .subgoals
        .iter()
        .find(|s| s.subgoal.id == focus.subgoal_id)
        .expect("focused subgoal in tree");
    let task = sub
        .tasks
        .iter()
        .find(|t| t.task.id == focus.task_id)
        .expect("focused task nested in subgoal");
    let micro = task
        .microtasks
        .iter()
        .find(|m| m.id == focus.microtask_id)
        .expect("focused microtask nested in task");
    Some((
        sub.subgoal.title.clone(),
        task.task.title.clone(),
        micro.title.clone(),
    ))
}

fn triple(s: &str, t: &str, m: &str) -> Option<(String, String, String)> {
    Some((s.to_owned(), t.to_owned(), m.to_owned()))
}

#[test]
fn focus_walks_the_tree_and_is_visible_to_other_connections() {
    let (store, _dir, path) = temp_store();
    let goal = NewGoal {
        title: "Run a marathon".to_owned(),
        tone: Tone::Motivational,
        ..NewGoal::default()
    };
    let created = store
        .create_goal("u1", &goal, Some(&two_subgoal_breakdown()))
        .unwrap();
    let goal_id = created.goal_id;

    // A second connection, as a separate API process would hold.
    let reader = Store::open(&path).unwrap();
    assert_eq!(focus_titles(&reader, &goal_id), triple("S1", "T1", "m1"));

    store
        .set_microtask_status("u1", &micro_id(&store, &goal_id, "m1"), MicroStatus::Done)
        .unwrap();
    assert_eq!(focus_titles(&reader, &goal_id), triple("S1", "T1", "m2"));

    store
        .set_microtask_status("u1", &micro_id(&store, &goal_id, "m2"), MicroStatus::Done)
        .unwrap();
    assert_eq!(focus_titles(&reader, &goal_id), triple("S2", "T2", "m3"));
    let tree = reader.goal_tree(&goal_id).unwrap();
    assert_eq!(tree.subgoals[0].subgoal.status, NodeStatus::Done);
    assert_eq!(tree.goal.status, NodeStatus::InProgress);

    store
        .set_microtask_status("u1", &micro_id(&store, &goal_id, "m3"), MicroStatus::Done)
        .unwrap();
    assert_eq!(focus_titles(&reader, &goal_id), None);
    assert_eq!(reader.goal_tree(&goal_id).unwrap().goal.status, NodeStatus::Done);
    assert!(reader.goal_digests("u1").unwrap().is_empty());
}

#[test]
fn state_survives_reopen() {
    let (store, _dir, path) = temp_store();
    let created = store
        .create_goal("u1", &NewGoal::titled("Learn piano"), None)
        .unwrap();
    let first = store.focus_pointer(&created.goal_id).unwrap();
    drop(store);

    let reopened = Store::open(&path).unwrap();
    assert_eq!(reopened.focus_pointer(&created.goal_id).unwrap(), first);
    let goals = reopened.goals_for_user("u1").unwrap();
    assert_eq!(goals.len(), 1);
    assert_eq!(goals[0].title, "Learn piano");
}

#[test]
fn subdivided_step_becomes_the_new_focus() {
    let (store, _dir, _path) = temp_store();
    let created = store
        .create_goal("u1", &NewGoal::titled("Move house"), Some(&two_subgoal_breakdown()))
        .unwrap();
    let m2 = micro_id(&store, &created.goal_id, "m2");
    let m1 = micro_id(&store, &created.goal_id, "m1");
    store.set_microtask_status("u1", &m1, MicroStatus::Done).unwrap();

    let (_ids, outcome) = store
        .subdivide_microtask("u1", &m2, &["pack books".to_owned(), "pack kitchen".to_owned()])
        .unwrap();
    assert!(outcome.normalized);
    assert_eq!(
        focus_titles(&store, &created.goal_id),
        triple("S1", "T1", "pack books")
    );

    let titles: Vec<String> = store
        .goal_tree(&created.goal_id)
        .unwrap()
        .microtasks()
        .map(|m| m.title.clone())
        .collect();
    assert_eq!(titles, vec!["m1", "pack books", "pack kitchen", "m3"]);
}

#[test]
fn deleting_a_goal_leaves_other_goals_alone() {
    let (store, _dir, _path) = temp_store();
    let keep = store.create_goal("u1", &NewGoal::titled("keep"), None).unwrap();
    let gone = store.create_goal("u1", &NewGoal::titled("gone"), None).unwrap();

    assert!(store.delete_goal("u1", &gone.goal_id).unwrap());
    assert!(store.goal_tree(&gone.goal_id).is_err());
    assert_eq!(store.goal_tree(&keep.goal_id).unwrap().microtasks().count(), 3);
}
