//! Tree mutations: create, delete with milestone renumbering, subtree copy.

use chrono::{DateTime, TimeZone, Utc};
use rubric_core::db::{open_in_memory, query};
use rubric_core::model::{
    AssessmentType, AutomationKind, AutomationRule, Category, CategoryDraft, GroupId, Role,
    ScoreKind, Subject, SubjectScope, Window,
};
use rubric_core::scoring::{FixedSignals, Grader};
use rubric_core::{CategoryTree, ErrorCode, TreeError};
use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, day, 0, 0, 0)
        .single()
        .expect("valid date")
}

fn window(from: u32, to: u32) -> Window {
    Window::new(at(from), at(to)).expect("window")
}

fn milestone_layout(conn: &Connection, group: GroupId) -> Vec<(u32, String)> {
    query::group_milestones(conn, group)
        .expect("milestones")
        .into_iter()
        .map(|milestone| {
            let category = query::require_category(conn, milestone.category_id).expect("category");
            (milestone.order_index, category.name)
        })
        .collect()
}

fn root(grader: &mut Grader<'_>, group: GroupId) -> Category {
    grader
        .create_category(
            group,
            None,
            &CategoryDraft::new("Course", AssessmentType::Sum).total(dec!(10)),
        )
        .expect("root")
}

#[test]
fn deleting_a_milestone_renumbers_the_rest() {
    let conn = open_in_memory().expect("store");
    let signals = FixedSignals::default();
    let mut grader = Grader::new(&conn, &signals);
    let group = query::insert_group(&conn, "compilers").expect("group");
    let course = root(&mut grader, group);

    let mut sprints = Vec::new();
    for n in 1..=4_u32 {
        sprints.push(
            grader
                .create_category(
                    group,
                    Some(course.id),
                    &CategoryDraft::new(format!("Sprint {n}"), AssessmentType::Custom)
                        .window(window(n * 5, n * 5 + 4)),
                )
                .expect("sprint"),
        );
    }
    assert_eq!(
        milestone_layout(&conn, group)
            .iter()
            .map(|(order, _)| *order)
            .collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );

    grader
        .delete_category(sprints[1].id, Role::Owner)
        .expect("delete sprint 2");

    assert_eq!(
        milestone_layout(&conn, group),
        vec![
            (1, "Sprint 1".to_string()),
            (2, "Sprint 3".to_string()),
            (3, "Sprint 4".to_string()),
        ]
    );
    assert_eq!(
        query::get_group(&conn, group)
            .expect("group")
            .expect("present")
            .milestone_seq,
        3
    );

    let fifth = grader
        .create_category(
            group,
            Some(course.id),
            &CategoryDraft::new("Sprint 5", AssessmentType::Custom).window(window(25, 28)),
        )
        .expect("sprint 5");
    let appended = query::milestone_by_order(&conn, group, 4)
        .expect("lookup")
        .expect("appended");
    assert_eq!(appended.category_id, fifth.id);
}

#[test]
fn deleting_a_subtree_removes_nested_milestones_and_descendants() {
    let conn = open_in_memory().expect("store");
    let signals = FixedSignals::default();
    let mut grader = Grader::new(&conn, &signals);
    let group = query::insert_group(&conn, "compilers").expect("group");
    let course = root(&mut grader, group);

    let phase = grader
        .create_category(
            group,
            Some(course.id),
            &CategoryDraft::new("Phase", AssessmentType::Sum).total(dec!(5)),
        )
        .expect("phase");
    for n in 1..=2_u32 {
        grader
            .create_category(
                group,
                Some(phase.id),
                &CategoryDraft::new(format!("Inner {n}"), AssessmentType::Custom)
                    .window(window(n, n + 1)),
            )
            .expect("inner");
    }
    grader
        .create_category(
            group,
            Some(course.id),
            &CategoryDraft::new("Outer", AssessmentType::Custom).window(window(10, 12)),
        )
        .expect("outer");

    let removed = grader.delete_category(phase.id, Role::Owner).expect("delete");
    assert_eq!(removed.len(), 3);
    assert_eq!(removed[0], phase.id);
    assert_eq!(milestone_layout(&conn, group), vec![(1, "Outer".to_string())]);

    let tree = CategoryTree::load(&conn, group).expect("tree");
    assert_eq!(tree.len(), 2);
    assert!(!tree.contains(phase.id));
}

#[test]
fn delete_requires_owner_and_leaves_tree_untouched() {
    let conn = open_in_memory().expect("store");
    let signals = FixedSignals::default();
    let mut grader = Grader::new(&conn, &signals);
    let group = query::insert_group(&conn, "compilers").expect("group");
    let course = root(&mut grader, group);

    for role in [Role::Viewer, Role::Member, Role::Teacher, Role::Admin] {
        let err = grader.delete_category(course.id, role).expect_err("denied");
        assert!(matches!(err, TreeError::PermissionDenied(_)));
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
    }
    assert!(query::get_category(&conn, course.id).expect("lookup").is_some());
}

#[test]
fn delete_recalculates_former_parent() {
    let conn = open_in_memory().expect("store");
    let signals = FixedSignals::default();
    let mut grader = Grader::new(&conn, &signals);
    let group = query::insert_group(&conn, "compilers").expect("group");
    let project = grader.add_project(group, "team-1").expect("project");
    let user = query::insert_user(&conn, "ann", "ann@example.edu").expect("user");
    let ann = grader.enroll(user, project, Role::Member).expect("enroll");

    let course = root(&mut grader, group);
    let essay = grader
        .create_category(
            group,
            Some(course.id),
            &CategoryDraft::new("Essay", AssessmentType::Custom).total(dec!(5)),
        )
        .expect("essay");
    let exam = grader
        .create_category(
            group,
            Some(course.id),
            &CategoryDraft::new("Exam", AssessmentType::Custom).total(dec!(5)),
        )
        .expect("exam");
    grader.assess(ann, essay.id, dec!(5)).expect("assess");

    let subject = Subject::Enrollment(ann);
    assert_eq!(
        query::score_card(&conn, course.id, subject).expect("card").automatic,
        Some(dec!(5))
    );

    grader.delete_category(exam.id, Role::Owner).expect("delete exam");
    assert_eq!(
        query::score_card(&conn, course.id, subject).expect("card").automatic,
        Some(dec!(10))
    );
    assert!(query::score_instances(&conn, exam.id, subject)
        .expect("instances")
        .is_empty());
}

#[test]
fn create_validates_before_writing() {
    let conn = open_in_memory().expect("store");
    let signals = FixedSignals::default();
    let mut grader = Grader::new(&conn, &signals);
    let group = query::insert_group(&conn, "compilers").expect("group");
    let course = root(&mut grader, group);

    let err = grader
        .create_category(group, None, &CategoryDraft::new("Second root", AssessmentType::Sum))
        .expect_err("second root");
    assert!(matches!(err, TreeError::RootAlreadyExists { root, .. } if root == course.id));

    let team = grader
        .create_category(
            group,
            Some(course.id),
            &CategoryDraft::new("Team", AssessmentType::Sum).scope(SubjectScope::Project),
        )
        .expect("project-scoped child of user parent");
    let err = grader
        .create_category(
            group,
            Some(team.id),
            &CategoryDraft::new("Personal", AssessmentType::Custom),
        )
        .expect_err("user child of project parent");
    assert!(matches!(
        err,
        TreeError::ScopeMismatch {
            parent: SubjectScope::Project,
            child: SubjectScope::User,
            ..
        }
    ));

    let err = grader
        .create_category(
            group,
            Some(course.id),
            &CategoryDraft::new("Commits", AssessmentType::Automatic),
        )
        .expect_err("missing rule");
    assert!(matches!(err, TreeError::MissingAutomationRule(_)));

    let err = grader
        .create_category(
            query::insert_group(&conn, "empty").expect("group"),
            Some(course.id),
            &CategoryDraft::new("Stray", AssessmentType::Custom),
        )
        .expect_err("parent from another group");
    assert!(err.is_not_found());

    let tree = CategoryTree::load(&conn, group).expect("tree");
    assert_eq!(tree.len(), 2);
}

#[test]
fn window_under_an_existing_milestone_is_ignored() {
    let conn = open_in_memory().expect("store");
    let signals = FixedSignals::default();
    let mut grader = Grader::new(&conn, &signals);
    let group = query::insert_group(&conn, "compilers").expect("group");
    let course = root(&mut grader, group);

    let sprint = grader
        .create_category(
            group,
            Some(course.id),
            &CategoryDraft::new("Sprint", AssessmentType::Sum).window(window(1, 14)),
        )
        .expect("sprint");
    let task = grader
        .create_category(
            group,
            Some(sprint.id),
            &CategoryDraft::new("Task", AssessmentType::Custom).window(window(2, 3)),
        )
        .expect("task");

    assert_eq!(milestone_layout(&conn, group), vec![(1, "Sprint".to_string())]);
    let tree = CategoryTree::load(&conn, group).expect("tree");
    let governing = tree.governing_milestone(task.id).expect("inherited");
    assert_eq!(governing.category_id, sprint.id);
}

#[test]
fn new_categories_seed_placeholders_for_existing_subjects() {
    let conn = open_in_memory().expect("store");
    let signals = FixedSignals::default();
    let mut grader = Grader::new(&conn, &signals);
    let group = query::insert_group(&conn, "compilers").expect("group");
    let project = grader.add_project(group, "team-1").expect("project");
    let user = query::insert_user(&conn, "ann", "ann@example.edu").expect("user");
    let ann = grader.enroll(user, project, Role::Member).expect("enroll");
    assert_eq!(grader.enroll(user, project, Role::Member).expect("again"), ann);

    let course = root(&mut grader, group);
    let team = grader
        .create_category(
            group,
            Some(course.id),
            &CategoryDraft::new("Team", AssessmentType::Custom).scope(SubjectScope::Project),
        )
        .expect("team");

    let user_rows = query::score_instances(&conn, course.id, Subject::Enrollment(ann)).expect("rows");
    assert_eq!(user_rows.len(), 1);
    let team_rows = query::score_instances(&conn, team.id, Subject::Project(project)).expect("rows");
    assert_eq!(team_rows.len(), 1);
    assert_eq!(team_rows[0].kind, ScoreKind::Placeholder);

    let late = grader.add_project(group, "team-2").expect("late project");
    let late_rows = query::score_instances(&conn, team.id, Subject::Project(late)).expect("rows");
    assert_eq!(late_rows.len(), 1);
    assert_eq!(late_rows[0].value, Decimal::ZERO);
}

// ---------------------------------------------------------------------------
// Copy
// ---------------------------------------------------------------------------

#[test]
fn copy_reproduces_structure_with_fresh_milestone() {
    let conn = open_in_memory().expect("store");
    let signals = FixedSignals::default();
    let mut grader = Grader::new(&conn, &signals);
    let group = query::insert_group(&conn, "compilers").expect("group");
    let course = root(&mut grader, group);

    let term_one = grader
        .create_category(
            group,
            Some(course.id),
            &CategoryDraft::new("Term 1", AssessmentType::Sum)
                .total(dec!(4))
                .description("first half")
                .window(window(1, 14)),
        )
        .expect("term 1");
    grader
        .create_category(
            group,
            Some(term_one.id),
            &CategoryDraft::new("Essay", AssessmentType::Custom).total(dec!(1.5)),
        )
        .expect("essay");
    grader
        .create_category(
            group,
            Some(term_one.id),
            &CategoryDraft::new("Commits", AssessmentType::Automatic)
                .total(dec!(2.5))
                .automation(AutomationRule::new(AutomationKind::LinesChanged, 400)),
        )
        .expect("commits");
    let term_two = grader
        .create_category(
            group,
            Some(course.id),
            &CategoryDraft::new("Term 2", AssessmentType::Sum).total(dec!(6)),
        )
        .expect("term 2");

    let copy = grader.copy_subtree(term_one.id, term_two.id).expect("copy");
    assert_ne!(copy.id, term_one.id);
    assert_eq!(copy.parent_id, Some(term_two.id));
    assert_eq!(copy.name, "Term 1");
    assert_eq!(copy.total, dec!(4));
    assert_eq!(copy.description.as_deref(), Some("first half"));

    let tree = CategoryTree::load(&conn, group).expect("tree");
    let original: Vec<_> = tree
        .children(term_one.id)
        .map(|node| (node.category.name.clone(), node.category.total, node.category.assessment_type, node.rule))
        .collect();
    let copied: Vec<_> = tree
        .children(copy.id)
        .map(|node| (node.category.name.clone(), node.category.total, node.category.assessment_type, node.rule))
        .collect();
    assert_eq!(copied, original);
    assert!(copied.iter().any(|(_, _, _, rule)| rule.is_some()));

    let copied_milestone = tree.get(copy.id).and_then(|node| node.milestone).expect("milestone");
    assert_eq!(copied_milestone.order_index, 2);
    assert_eq!(copied_milestone.window, window(1, 14));
}

#[test]
fn copy_into_own_subtree_is_rejected() {
    let conn = open_in_memory().expect("store");
    let signals = FixedSignals::default();
    let mut grader = Grader::new(&conn, &signals);
    let group = query::insert_group(&conn, "compilers").expect("group");
    let course = root(&mut grader, group);
    let part = grader
        .create_category(
            group,
            Some(course.id),
            &CategoryDraft::new("Part", AssessmentType::Sum),
        )
        .expect("part");
    let leaf = grader
        .create_category(
            group,
            Some(part.id),
            &CategoryDraft::new("Leaf", AssessmentType::Custom),
        )
        .expect("leaf");

    for target in [part.id, leaf.id] {
        let err = grader.copy_subtree(part.id, target).expect_err("cycle");
        assert!(matches!(err, TreeError::CopyIntoSelf { .. }));
        assert_eq!(err.code(), ErrorCode::CycleDetected);
    }
    assert_eq!(CategoryTree::load(&conn, group).expect("tree").len(), 3);
}

#[test]
fn copy_across_groups_seeds_target_subjects() {
    let conn = open_in_memory().expect("store");
    let signals = FixedSignals::default();
    let mut grader = Grader::new(&conn, &signals);

    let template = query::insert_group(&conn, "template").expect("group");
    let template_root = root(&mut grader, template);
    let lab = grader
        .create_category(
            template,
            Some(template_root.id),
            &CategoryDraft::new("Lab", AssessmentType::Custom)
                .total(dec!(3))
                .window(window(3, 9)),
        )
        .expect("lab");

    let live = query::insert_group(&conn, "live").expect("group");
    let project = grader.add_project(live, "team-1").expect("project");
    let user = query::insert_user(&conn, "ann", "ann@example.edu").expect("user");
    let ann = grader.enroll(user, project, Role::Member).expect("enroll");
    let live_root = root(&mut grader, live);

    let copy = grader.copy_subtree(lab.id, live_root.id).expect("copy");
    assert_eq!(copy.group_id, live);
    assert_eq!(milestone_layout(&conn, live), vec![(1, "Lab".to_string())]);
    assert_eq!(milestone_layout(&conn, template), vec![(1, "Lab".to_string())]);

    let rows = query::score_instances(&conn, copy.id, Subject::Enrollment(ann)).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, ScoreKind::Placeholder);
}
