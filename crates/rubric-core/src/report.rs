//! Per-milestone progress report for one project.
//!
//! The report only reads: scores are shown as last written, so run a
//! recalculation first when signals changed.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::query;
use crate::error::{TreeError, TreeResult};
use crate::model::{
    CategoryId, Enrollment, EnrollmentId, Milestone, ProjectId, Subject, SubjectScope, UserId,
    Window,
};
use crate::scoring::{SignalSource, SqliteSignals};
use crate::tree::{CategoryNode, CategoryTree};
use rusqlite::{Connection, params};

/// Issues of a milestone a member touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssueActivity {
    pub authored: i64,
    pub closed: i64,
    /// Issues the member logged time on, whenever it was logged.
    pub participated: i64,
}

/// One enrollment's standing inside a milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberProgress {
    pub enrollment: EnrollmentId,
    pub user: UserId,
    pub username: String,
    pub points: Decimal,
    pub minutes: Decimal,
    pub issues: IssueActivity,
}

/// Automatic and manual values of one subject on a breakdown category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectPoints {
    pub subject: Subject,
    pub automatic_points: Option<Decimal>,
    pub given_points: Option<Decimal>,
}

/// A direct child of the milestone category.
///
/// User-scoped children list every enabled member; project-scoped children
/// list the project once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryBreakdown {
    pub category: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub total: Decimal,
    pub scope: SubjectScope,
    pub points: Vec<SubjectPoints>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneProgress {
    pub order_index: u32,
    pub category: CategoryId,
    pub name: String,
    pub window: Window,
    /// True once any member has points above zero.
    pub assessed: bool,
    pub members: Vec<MemberProgress>,
    pub categories: Vec<CategoryBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneReport {
    pub project: ProjectId,
    pub project_name: String,
    pub milestones: Vec<MilestoneProgress>,
}

fn issue_activity(
    conn: &Connection,
    member: &Enrollment,
    milestone: &Milestone,
) -> TreeResult<IssueActivity> {
    let count_by = |column: &str| -> TreeResult<i64> {
        Ok(conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM issues
                 WHERE project_id = ?1 AND milestone_category_id = ?2 AND {column} = ?3"
            ),
            params![member.project_id, milestone.category_id, member.user_id],
            |row| row.get(0),
        )?)
    };
    let participated = conn.query_row(
        "SELECT COUNT(DISTINCT i.issue_id)
         FROM issues i
         JOIN time_entries t ON t.issue_id = i.issue_id
         WHERE i.project_id = ?1 AND i.milestone_category_id = ?2 AND t.user_id = ?3",
        params![member.project_id, milestone.category_id, member.user_id],
        |row| row.get(0),
    )?;
    Ok(IssueActivity {
        authored: count_by("author_user_id")?,
        closed: count_by("closed_by_user_id")?,
        participated,
    })
}

fn breakdown(
    conn: &Connection,
    child: &CategoryNode,
    project: ProjectId,
    members: &[Enrollment],
) -> TreeResult<CategoryBreakdown> {
    let subjects: Vec<Subject> = match child.category.scope {
        SubjectScope::User => members.iter().map(Enrollment::subject).collect(),
        SubjectScope::Project => vec![Subject::Project(project)],
    };
    let mut points = Vec::with_capacity(subjects.len());
    for subject in subjects {
        let card = query::score_card(conn, child.id(), subject)?;
        points.push(SubjectPoints {
            subject,
            automatic_points: card.automatic,
            given_points: card.manual,
        });
    }
    Ok(CategoryBreakdown {
        category: child.id(),
        name: child.category.name.clone(),
        description: child.category.description.clone(),
        total: child.category.total,
        scope: child.category.scope,
        points,
    })
}

/// Build the report for `project`, milestones in `order_index` order.
///
/// Disabled enrollments are left out. On a project-scoped milestone every
/// member shows the project's points.
///
/// # Errors
///
/// Returns [`TreeError::ProjectNotFound`] for an unknown project and
/// propagates storage failures.
pub fn milestone_report(conn: &Connection, project: ProjectId) -> TreeResult<MilestoneReport> {
    let project_row =
        query::get_project(conn, project)?.ok_or(TreeError::ProjectNotFound(project))?;
    let members = query::project_enrollments(conn, project, false)?;
    let tree = CategoryTree::load(conn, project_row.group_id)?;
    let signals = SqliteSignals::new(conn);

    let mut milestones = Vec::new();
    for milestone in query::group_milestones(conn, project_row.group_id)? {
        let node = tree
            .get(milestone.category_id)
            .ok_or(TreeError::CategoryNotFound(milestone.category_id))?;
        let category = &node.category;

        let mut progress = Vec::with_capacity(members.len());
        for member in &members {
            let scored = match category.scope {
                SubjectScope::User => member.subject(),
                SubjectScope::Project => Subject::Project(project),
            };
            let points = query::score_card(conn, category.id, scored)?.chosen();
            let minutes = signals.minutes_logged(member.subject(), &milestone)?;
            let username = query::get_user(conn, member.user_id)?
                .map(|user| user.username)
                .unwrap_or_default();
            progress.push(MemberProgress {
                enrollment: member.id,
                user: member.user_id,
                username,
                points,
                minutes,
                issues: issue_activity(conn, member, &milestone)?,
            });
        }

        let categories = tree
            .children(category.id)
            .map(|child| breakdown(conn, child, project, &members))
            .collect::<TreeResult<Vec<_>>>()?;

        milestones.push(MilestoneProgress {
            order_index: milestone.order_index,
            category: category.id,
            name: category.name.clone(),
            window: milestone.window,
            assessed: progress.iter().any(|member| member.points > Decimal::ZERO),
            members: progress,
            categories,
        });
    }

    Ok(MilestoneReport {
        project,
        project_name: project_row.name,
        milestones,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::ingest::{IssueRecord, record_issue, record_time_entry};
    use crate::model::{CategoryDraft, AssessmentType, Role};
    use crate::scoring::Grader;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 10, 0, 0)
            .single()
            .expect("valid date")
    }

    #[test]
    fn report_lists_milestones_with_points_and_minutes() {
        let conn = open_in_memory().expect("store");
        let signals = SqliteSignals::new(&conn);
        let mut grader = Grader::new(&conn, &signals);

        let group = query::insert_group(&conn, "os").expect("group");
        let root = grader
            .create_category(group, None, &CategoryDraft::new("Course", AssessmentType::Sum).total(dec!(10)))
            .expect("root");
        let window = Window::new(at(1), at(14)).expect("window");
        let sprint_one = grader
            .create_category(
                group,
                Some(root.id),
                &CategoryDraft::new("Sprint 1", AssessmentType::Custom)
                    .total(dec!(5))
                    .window(window),
            )
            .expect("sprint 1");
        grader
            .create_category(
                group,
                Some(root.id),
                &CategoryDraft::new("Sprint 2", AssessmentType::Custom)
                    .total(dec!(5))
                    .window(Window::new(at(15), at(28)).expect("window")),
            )
            .expect("sprint 2");

        let project = grader.add_project(group, "team-a").expect("project");
        let ann = query::insert_user(&conn, "ann", "ann@example.edu").expect("ann");
        let bob = query::insert_user(&conn, "bob", "bob@example.edu").expect("bob");
        let ann_enrollment = grader.enroll(ann, project, Role::Member).expect("enroll ann");
        let bob_enrollment = grader.enroll(bob, project, Role::Member).expect("enroll bob");
        query::set_enrollment_disabled(&conn, bob_enrollment, true).expect("disable bob");

        grader.assess(ann_enrollment, sprint_one.id, dec!(4)).expect("assess");
        let issue = record_issue(
            &conn,
            &IssueRecord::new(project, 1, "Scheduler")
                .milestone(1)
                .author("ann")
                .closed_by("ann"),
        )
        .expect("issue");
        record_issue(&conn, &IssueRecord::new(project, 2, "Paging").milestone(1).author("bob"))
            .expect("bob's issue");
        record_time_entry(&conn, issue, "ann", 150, at(3), "n-1").expect("time");
        record_time_entry(&conn, issue, "ann", 60, at(20), "n-2").expect("outside window");

        let report = milestone_report(&conn, project).expect("report");
        assert_eq!(report.project_name, "team-a");
        assert_eq!(report.milestones.len(), 2);

        let first = &report.milestones[0];
        assert_eq!(first.order_index, 1);
        assert_eq!(first.name, "Sprint 1");
        assert!(first.assessed);
        assert_eq!(first.members.len(), 1);
        assert_eq!(first.members[0].username, "ann");
        assert_eq!(first.members[0].points, dec!(4));
        assert_eq!(first.members[0].minutes, dec!(150));
        assert_eq!(
            first.members[0].issues,
            IssueActivity {
                authored: 1,
                closed: 1,
                participated: 1,
            }
        );
        assert!(first.categories.is_empty());

        let second = &report.milestones[1];
        assert!(!second.assessed);
        assert_eq!(second.members[0].minutes, Decimal::ZERO);
        assert_eq!(second.members[0].issues, IssueActivity::default());
    }

    #[test]
    fn breakdown_lists_members_for_user_children_and_project_once() {
        let conn = open_in_memory().expect("store");
        let signals = SqliteSignals::new(&conn);
        let mut grader = Grader::new(&conn, &signals);

        let group = query::insert_group(&conn, "db").expect("group");
        let sprint = grader
            .create_category(
                group,
                None,
                &CategoryDraft::new("Sprint 1", AssessmentType::Sum)
                    .total(dec!(5))
                    .window(Window::new(at(1), at(14)).expect("window")),
            )
            .expect("sprint");
        let review = grader
            .create_category(
                group,
                Some(sprint.id),
                &CategoryDraft::new("Code review", AssessmentType::Custom)
                    .total(dec!(2))
                    .description("Reviews given to teammates"),
            )
            .expect("review");
        let demo = grader
            .create_category(
                group,
                Some(sprint.id),
                &CategoryDraft::new("Demo", AssessmentType::Custom)
                    .total(dec!(3))
                    .scope(SubjectScope::Project),
            )
            .expect("demo");

        let project = grader.add_project(group, "team-b").expect("project");
        let ann = query::insert_user(&conn, "ann", "ann@example.edu").expect("ann");
        let bob = query::insert_user(&conn, "bob", "bob@example.edu").expect("bob");
        let ann_enrollment = grader.enroll(ann, project, Role::Member).expect("enroll ann");
        let bob_enrollment = grader.enroll(bob, project, Role::Member).expect("enroll bob");

        grader.assess(ann_enrollment, review.id, dec!(1.5)).expect("review ann");
        grader.assess(ann_enrollment, demo.id, dec!(2)).expect("demo");

        let report = milestone_report(&conn, project).expect("report");
        let categories = &report.milestones[0].categories;
        assert_eq!(categories.len(), 2);

        let review_row = &categories[0];
        assert_eq!(review_row.name, "Code review");
        assert_eq!(review_row.description.as_deref(), Some("Reviews given to teammates"));
        assert_eq!(review_row.total, dec!(2));
        assert_eq!(
            review_row.points,
            vec![
                SubjectPoints {
                    subject: Subject::Enrollment(ann_enrollment),
                    automatic_points: None,
                    given_points: Some(dec!(1.5)),
                },
                SubjectPoints {
                    subject: Subject::Enrollment(bob_enrollment),
                    automatic_points: None,
                    given_points: None,
                },
            ]
        );

        let demo_row = &categories[1];
        assert_eq!(demo_row.scope, SubjectScope::Project);
        assert_eq!(
            demo_row.points,
            vec![SubjectPoints {
                subject: Subject::Project(project),
                automatic_points: None,
                given_points: Some(dec!(2)),
            }]
        );

        // the sprint itself aggregated both children for ann
        assert_eq!(report.milestones[0].members[0].points, dec!(3.5));
    }

    #[test]
    fn unknown_project_is_not_found() {
        let conn = open_in_memory().expect("store");
        let err = milestone_report(&conn, ProjectId(42)).expect_err("missing");
        assert!(matches!(err, TreeError::ProjectNotFound(ProjectId(42))));
    }
}
