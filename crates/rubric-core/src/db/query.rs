//! `SQLite` query helpers for the score store.
//!
//! Typed accessors for the roster, the category tree and the score table.
//! Every function takes a shared `&Connection` (a [`rusqlite::Transaction`]
//! derefs to one) and returns typed structs, never raw rows. Lookups return
//! `Option`; turning a miss into a not-found error is the caller's call.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{TreeError, TreeResult};
use crate::model::{
    AutomationRule, Category, CategoryDraft, CategoryId, Enrollment, EnrollmentId, GroupId,
    Milestone, ProjectId, Role, ScoreCard, ScoreInstance, ScoreKind, Subject, SubjectScope,
    UserId, Window, decimal_from_sql,
};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A group together with its calculation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRow {
    pub id: GroupId,
    pub name: String,
    pub root: Option<CategoryId>,
    pub milestone_seq: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRow {
    pub id: ProjectId,
    pub group_id: GroupId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRow {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

/// Current wall clock as stored in `*_us` columns.
pub(crate) fn now_us() -> i64 {
    Utc::now().timestamp_micros()
}

/// Canonical text form used for every stored decimal.
pub(crate) fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    decimal_from_sql(row.get_ref(idx)?)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Insert a group and its empty calculation record.
///
/// # Errors
///
/// Returns an error if the name is taken or the insert fails.
pub fn insert_group(conn: &Connection, name: &str) -> TreeResult<GroupId> {
    conn.execute(
        "INSERT INTO groups (name, created_at_us) VALUES (?1, ?2)",
        params![name, now_us()],
    )?;
    let id = GroupId(conn.last_insert_rowid());
    conn.execute(
        "INSERT INTO calculations (group_id, root_category_id, milestone_seq) VALUES (?1, NULL, 0)",
        params![id],
    )?;
    Ok(id)
}

const GROUP_COLUMNS: &str = "g.group_id, g.name, c.root_category_id, COALESCE(c.milestone_seq, 0)
     FROM groups g
     LEFT JOIN calculations c ON c.group_id = g.group_id";

fn row_to_group(row: &Row<'_>) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        id: row.get(0)?,
        name: row.get(1)?,
        root: row.get(2)?,
        milestone_seq: row.get(3)?,
    })
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn get_group(conn: &Connection, id: GroupId) -> TreeResult<Option<GroupRow>> {
    let sql = format!("SELECT {GROUP_COLUMNS} WHERE g.group_id = ?1");
    Ok(conn
        .query_row(&sql, params![id], row_to_group)
        .optional()?)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find_group_by_name(conn: &Connection, name: &str) -> TreeResult<Option<GroupRow>> {
    let sql = format!("SELECT {GROUP_COLUMNS} WHERE g.name = ?1");
    Ok(conn
        .query_row(&sql, params![name], row_to_group)
        .optional()?)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn list_groups(conn: &Connection) -> TreeResult<Vec<GroupRow>> {
    let sql = format!("SELECT {GROUP_COLUMNS} ORDER BY g.group_id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_group)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Bind (or clear) the root category of a group's calculation.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn set_root(conn: &Connection, group: GroupId, root: Option<CategoryId>) -> TreeResult<()> {
    conn.execute(
        "UPDATE calculations SET root_category_id = ?2 WHERE group_id = ?1",
        params![group, root],
    )?;
    Ok(())
}

/// # Errors
///
/// Returns an error if the update fails.
pub fn set_milestone_seq(conn: &Connection, group: GroupId, seq: u32) -> TreeResult<()> {
    conn.execute(
        "UPDATE calculations SET milestone_seq = ?2 WHERE group_id = ?1",
        params![group, seq],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Projects and users
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns an error if the group does not exist or the name is taken.
pub fn insert_project(conn: &Connection, group: GroupId, name: &str) -> TreeResult<ProjectId> {
    conn.execute(
        "INSERT INTO projects (group_id, name, created_at_us) VALUES (?1, ?2, ?3)",
        params![group, name, now_us()],
    )?;
    Ok(ProjectId(conn.last_insert_rowid()))
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        name: row.get(2)?,
    })
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn get_project(conn: &Connection, id: ProjectId) -> TreeResult<Option<ProjectRow>> {
    Ok(conn
        .query_row(
            "SELECT project_id, group_id, name FROM projects WHERE project_id = ?1",
            params![id],
            row_to_project,
        )
        .optional()?)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn list_projects(conn: &Connection, group: GroupId) -> TreeResult<Vec<ProjectRow>> {
    let mut stmt = conn.prepare(
        "SELECT project_id, group_id, name FROM projects WHERE group_id = ?1 ORDER BY project_id",
    )?;
    let rows = stmt
        .query_map(params![group], row_to_project)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// # Errors
///
/// Returns an error if the username is taken or the insert fails.
pub fn insert_user(conn: &Connection, username: &str, email: &str) -> TreeResult<UserId> {
    conn.execute(
        "INSERT INTO users (username, email) VALUES (?1, ?2)",
        params![username, email],
    )?;
    Ok(UserId(conn.last_insert_rowid()))
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
    })
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn get_user(conn: &Connection, id: UserId) -> TreeResult<Option<UserRow>> {
    Ok(conn
        .query_row(
            "SELECT user_id, username, email FROM users WHERE user_id = ?1",
            params![id],
            row_to_user,
        )
        .optional()?)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find_user_by_username(conn: &Connection, username: &str) -> TreeResult<Option<UserRow>> {
    Ok(conn
        .query_row(
            "SELECT user_id, username, email FROM users WHERE username = ?1",
            params![username],
            row_to_user,
        )
        .optional()?)
}

// ---------------------------------------------------------------------------
// Enrollments
// ---------------------------------------------------------------------------

const ENROLLMENT_COLUMNS: &str = "e.enrollment_id, e.user_id, e.project_id, e.role, e.disabled";

fn row_to_enrollment(row: &Row<'_>) -> rusqlite::Result<Enrollment> {
    Ok(Enrollment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        project_id: row.get(2)?,
        role: row.get(3)?,
        disabled: row.get(4)?,
    })
}

/// # Errors
///
/// Returns an error if the user is already enrolled or the insert fails.
pub fn insert_enrollment(
    conn: &Connection,
    user: UserId,
    project: ProjectId,
    role: Role,
) -> TreeResult<EnrollmentId> {
    conn.execute(
        "INSERT INTO enrollments (user_id, project_id, role, disabled) VALUES (?1, ?2, ?3, 0)",
        params![user, project, role],
    )?;
    Ok(EnrollmentId(conn.last_insert_rowid()))
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn get_enrollment(conn: &Connection, id: EnrollmentId) -> TreeResult<Option<Enrollment>> {
    let sql = format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments e WHERE e.enrollment_id = ?1");
    Ok(conn
        .query_row(&sql, params![id], row_to_enrollment)
        .optional()?)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find_enrollment(
    conn: &Connection,
    user: UserId,
    project: ProjectId,
) -> TreeResult<Option<Enrollment>> {
    let sql = format!(
        "SELECT {ENROLLMENT_COLUMNS} FROM enrollments e WHERE e.user_id = ?1 AND e.project_id = ?2"
    );
    Ok(conn
        .query_row(&sql, params![user, project], row_to_enrollment)
        .optional()?)
}

/// Enrollments of one project, optionally skipping disabled ones.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn project_enrollments(
    conn: &Connection,
    project: ProjectId,
    include_disabled: bool,
) -> TreeResult<Vec<Enrollment>> {
    let sql = format!(
        "SELECT {ENROLLMENT_COLUMNS} FROM enrollments e
         WHERE e.project_id = ?1 AND (?2 OR e.disabled = 0)
         ORDER BY e.enrollment_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![project, include_disabled], row_to_enrollment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every enrollment in any project of the group.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn group_enrollments(conn: &Connection, group: GroupId) -> TreeResult<Vec<Enrollment>> {
    let sql = format!(
        "SELECT {ENROLLMENT_COLUMNS} FROM enrollments e
         JOIN projects p ON p.project_id = e.project_id
         WHERE p.group_id = ?1
         ORDER BY e.enrollment_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![group], row_to_enrollment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns `false` when no such enrollment exists.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn set_enrollment_disabled(
    conn: &Connection,
    id: EnrollmentId,
    disabled: bool,
) -> TreeResult<bool> {
    let changed = conn.execute(
        "UPDATE enrollments SET disabled = ?2 WHERE enrollment_id = ?1",
        params![id, disabled],
    )?;
    Ok(changed > 0)
}

// ---------------------------------------------------------------------------
// Categories, automation rules, milestones
// ---------------------------------------------------------------------------

const CATEGORY_COLUMNS: &str =
    "category_id, group_id, parent_id, name, description, total, assessment_type, subject_scope";

fn row_to_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        group_id: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        total: decimal_column(row, 5)?,
        assessment_type: row.get(6)?,
        scope: row.get(7)?,
    })
}

/// Insert the category row only; rules and milestones are written
/// separately.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_category(
    conn: &Connection,
    group: GroupId,
    parent: Option<CategoryId>,
    draft: &CategoryDraft,
) -> TreeResult<CategoryId> {
    conn.execute(
        "INSERT INTO categories (group_id, parent_id, name, description, total, assessment_type, subject_scope)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            group,
            parent,
            draft.name,
            draft.description,
            decimal_text(draft.total),
            draft.assessment_type,
            draft.scope,
        ],
    )?;
    Ok(CategoryId(conn.last_insert_rowid()))
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn get_category(conn: &Connection, id: CategoryId) -> TreeResult<Option<Category>> {
    let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE category_id = ?1");
    Ok(conn
        .query_row(&sql, params![id], row_to_category)
        .optional()?)
}

/// Like [`get_category`] but a miss is [`TreeError::CategoryNotFound`].
///
/// # Errors
///
/// Returns an error if the category does not exist or the query fails.
pub fn require_category(conn: &Connection, id: CategoryId) -> TreeResult<Category> {
    get_category(conn, id)?.ok_or(TreeError::CategoryNotFound(id))
}

/// All categories of a group in id order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_categories(conn: &Connection, group: GroupId) -> TreeResult<Vec<Category>> {
    let sql = format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE group_id = ?1 ORDER BY category_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![group], row_to_category)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_category_row(conn: &Connection, id: CategoryId) -> TreeResult<()> {
    conn.execute("DELETE FROM categories WHERE category_id = ?1", params![id])?;
    Ok(())
}

/// # Errors
///
/// Returns an error if the write fails.
pub fn upsert_rule(conn: &Connection, category: CategoryId, rule: AutomationRule) -> TreeResult<()> {
    conn.execute(
        "INSERT INTO automation_rules (category_id, kind, amount_needed) VALUES (?1, ?2, ?3)
         ON CONFLICT(category_id) DO UPDATE SET kind = excluded.kind, amount_needed = excluded.amount_needed",
        params![category, rule.kind, rule.amount_needed],
    )?;
    Ok(())
}

/// Automation rules of every category in the group.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn group_rules(
    conn: &Connection,
    group: GroupId,
) -> TreeResult<HashMap<CategoryId, AutomationRule>> {
    let mut stmt = conn.prepare(
        "SELECT r.category_id, r.kind, r.amount_needed
         FROM automation_rules r
         JOIN categories c ON c.category_id = r.category_id
         WHERE c.group_id = ?1",
    )?;
    let rows = stmt
        .query_map(params![group], |row| {
            Ok((
                row.get::<_, CategoryId>(0)?,
                AutomationRule::new(row.get(1)?, row.get(2)?),
            ))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

/// # Errors
///
/// Returns an error if the `(group, order_index)` slot is taken or the
/// insert fails.
pub fn insert_milestone(conn: &Connection, milestone: &Milestone) -> TreeResult<()> {
    conn.execute(
        "INSERT INTO milestones (category_id, group_id, start_us, end_us, order_index)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            milestone.category_id,
            milestone.group_id,
            milestone.window.start_us(),
            milestone.window.end_us(),
            milestone.order_index,
        ],
    )?;
    Ok(())
}

const MILESTONE_COLUMNS: &str = "category_id, group_id, start_us, end_us, order_index";

type RawMilestone = (CategoryId, GroupId, i64, i64, u32);

fn row_to_raw_milestone(row: &Row<'_>) -> rusqlite::Result<RawMilestone> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode_milestone(raw: RawMilestone) -> TreeResult<Milestone> {
    let (category_id, group_id, start_us, end_us, order_index) = raw;
    let window = Window::from_us(start_us, end_us).ok_or_else(|| TreeError::CorruptRow {
        table: "milestones",
        detail: format!("category {category_id} has an out-of-range window"),
    })?;
    Ok(Milestone {
        category_id,
        group_id,
        window,
        order_index,
    })
}

/// Milestones of a group in `order_index` order.
///
/// # Errors
///
/// Returns an error if the query fails or a row is out of range.
pub fn group_milestones(conn: &Connection, group: GroupId) -> TreeResult<Vec<Milestone>> {
    let sql = format!(
        "SELECT {MILESTONE_COLUMNS} FROM milestones WHERE group_id = ?1 ORDER BY order_index"
    );
    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt
        .query_map(params![group], row_to_raw_milestone)?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter().map(decode_milestone).collect()
}

/// # Errors
///
/// Returns an error if the query fails or the row is out of range.
pub fn milestone_by_order(
    conn: &Connection,
    group: GroupId,
    order_index: u32,
) -> TreeResult<Option<Milestone>> {
    let sql =
        format!("SELECT {MILESTONE_COLUMNS} FROM milestones WHERE group_id = ?1 AND order_index = ?2");
    conn.query_row(&sql, params![group, order_index], row_to_raw_milestone)
        .optional()?
        .map(decode_milestone)
        .transpose()
}

/// Shift every milestone above `removed` down by one.
///
/// Runs in two passes through negative indexes so the
/// `(group_id, order_index)` unique constraint never sees a duplicate.
///
/// # Errors
///
/// Returns an error if either update fails.
pub fn close_milestone_gap(conn: &Connection, group: GroupId, removed: u32) -> TreeResult<usize> {
    let shifted = conn.execute(
        "UPDATE milestones SET order_index = -(order_index - 1)
         WHERE group_id = ?1 AND order_index > ?2",
        params![group, removed],
    )?;
    conn.execute(
        "UPDATE milestones SET order_index = -order_index
         WHERE group_id = ?1 AND order_index < 0",
        params![group],
    )?;
    Ok(shifted)
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

fn row_to_score(row: &Row<'_>) -> rusqlite::Result<ScoreInstance> {
    let scope: SubjectScope = row.get(2)?;
    Ok(ScoreInstance {
        id: row.get(0)?,
        category_id: row.get(1)?,
        subject: Subject::from_parts(scope, row.get(3)?),
        kind: row.get(4)?,
        value: decimal_column(row, 5)?,
    })
}

/// All score rows a subject holds on a category, lowest precedence first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn score_instances(
    conn: &Connection,
    category: CategoryId,
    subject: Subject,
) -> TreeResult<Vec<ScoreInstance>> {
    let mut stmt = conn.prepare(
        "SELECT score_id, category_id, subject_kind, subject_id, kind, value
         FROM scores
         WHERE category_id = ?1 AND subject_kind = ?2 AND subject_id = ?3
         ORDER BY score_id",
    )?;
    let mut rows = stmt
        .query_map(
            params![category, subject.scope(), subject.raw_id()],
            row_to_score,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    rows.sort_by_key(|instance| instance.kind);
    Ok(rows)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn score_card(
    conn: &Connection,
    category: CategoryId,
    subject: Subject,
) -> TreeResult<ScoreCard> {
    Ok(ScoreCard::from_instances(&score_instances(
        conn, category, subject,
    )?))
}

/// Distinct subjects that hold any score row on the category.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn scored_subjects(conn: &Connection, category: CategoryId) -> TreeResult<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT subject_kind, subject_id
         FROM scores
         WHERE category_id = ?1
         ORDER BY subject_kind, subject_id",
    )?;
    let rows = stmt
        .query_map(params![category], |row| {
            Ok(Subject::from_parts(row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Overwrite the single row of `kind`, inserting it when missing.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn upsert_score(
    conn: &Connection,
    category: CategoryId,
    subject: Subject,
    kind: ScoreKind,
    value: Decimal,
) -> TreeResult<()> {
    let text = decimal_text(value);
    let updated = conn.execute(
        "UPDATE scores SET value = ?5, updated_at_us = ?6
         WHERE category_id = ?1 AND subject_kind = ?2 AND subject_id = ?3 AND kind = ?4",
        params![
            category,
            subject.scope(),
            subject.raw_id(),
            kind,
            text,
            now_us()
        ],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO scores (category_id, subject_kind, subject_id, kind, value, updated_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                category,
                subject.scope(),
                subject.raw_id(),
                kind,
                text,
                now_us()
            ],
        )?;
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_placeholders(
    conn: &Connection,
    category: CategoryId,
    subject: Subject,
) -> TreeResult<usize> {
    Ok(conn.execute(
        "DELETE FROM scores
         WHERE category_id = ?1 AND subject_kind = ?2 AND subject_id = ?3 AND kind = 'placeholder'",
        params![category, subject.scope(), subject.raw_id()],
    )?)
}

/// Insert a zero placeholder unless the subject already holds any row on
/// the category. Returns whether a row was written.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn seed_placeholder(
    conn: &Connection,
    category: CategoryId,
    subject: Subject,
) -> TreeResult<bool> {
    let inserted = conn.execute(
        "INSERT INTO scores (category_id, subject_kind, subject_id, kind, value, updated_at_us)
         SELECT ?1, ?2, ?3, 'placeholder', '0', ?4
         WHERE NOT EXISTS (
             SELECT 1 FROM scores
             WHERE category_id = ?1 AND subject_kind = ?2 AND subject_id = ?3
         )",
        params![category, subject.scope(), subject.raw_id(), now_us()],
    )?;
    Ok(inserted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::model::AssessmentType;
    use chrono::{TimeZone, Utc};

    fn seeded() -> (Connection, GroupId, CategoryId) {
        let conn = open_in_memory().expect("open store");
        let group = insert_group(&conn, "databases").expect("insert group");
        let root = insert_category(
            &conn,
            group,
            None,
            &CategoryDraft::new("Total", AssessmentType::Sum).total(Decimal::from(10)),
        )
        .expect("insert category");
        (conn, group, root)
    }

    fn window(day: u32) -> Window {
        let start = Utc
            .with_ymd_and_hms(2024, 5, day, 0, 0, 0)
            .single()
            .expect("start");
        let end = Utc
            .with_ymd_and_hms(2024, 5, day + 1, 0, 0, 0)
            .single()
            .expect("end");
        Window::new(start, end).expect("window")
    }

    #[test]
    fn group_starts_with_empty_calculation() {
        let (conn, group, root) = seeded();
        let row = get_group(&conn, group).expect("query").expect("group row");
        assert_eq!(row.root, None);
        assert_eq!(row.milestone_seq, 0);

        set_root(&conn, group, Some(root)).expect("bind root");
        set_milestone_seq(&conn, group, 3).expect("bump seq");
        let row = find_group_by_name(&conn, "databases")
            .expect("query")
            .expect("group row");
        assert_eq!(row.root, Some(root));
        assert_eq!(row.milestone_seq, 3);
    }

    #[test]
    fn category_total_survives_text_storage() {
        let (conn, _group, root) = seeded();
        let category = require_category(&conn, root).expect("category");
        assert_eq!(category.total, Decimal::from(10));
        assert_eq!(category.assessment_type, AssessmentType::Sum);
        assert!(matches!(
            require_category(&conn, CategoryId(404)),
            Err(TreeError::CategoryNotFound(CategoryId(404)))
        ));
    }

    #[test]
    fn upsert_score_keeps_one_row_per_kind() {
        let (conn, _group, root) = seeded();
        let subject = Subject::Project(ProjectId(1));

        assert!(seed_placeholder(&conn, root, subject).expect("seed"));
        assert!(!seed_placeholder(&conn, root, subject).expect("seed again"));

        upsert_score(&conn, root, subject, ScoreKind::Manual, Decimal::new(25, 1)).expect("manual");
        upsert_score(&conn, root, subject, ScoreKind::Manual, Decimal::new(75, 1)).expect("manual");

        let instances = score_instances(&conn, root, subject).expect("instances");
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].kind, ScoreKind::Placeholder);
        assert_eq!(instances[1].value, Decimal::new(75, 1));

        assert_eq!(delete_placeholders(&conn, root, subject).expect("delete"), 1);
        let card = score_card(&conn, root, subject).expect("card");
        assert_eq!(card.placeholder, None);
        assert_eq!(card.chosen(), Decimal::new(75, 1));
    }

    #[test]
    fn milestone_gap_closes_without_unique_violations() {
        let (conn, group, root) = seeded();
        let mut ids = Vec::new();
        for order in 1..=4_u32 {
            let category = insert_category(
                &conn,
                group,
                Some(root),
                &CategoryDraft::new(format!("Sprint {order}"), AssessmentType::Sum),
            )
            .expect("insert sprint");
            insert_milestone(
                &conn,
                &Milestone {
                    category_id: category,
                    group_id: group,
                    window: window(order),
                    order_index: order,
                },
            )
            .expect("insert milestone");
            ids.push(category);
        }

        delete_category_row(&conn, ids[1]).expect("delete sprint 2");
        assert_eq!(close_milestone_gap(&conn, group, 2).expect("close gap"), 2);

        let orders: Vec<u32> = group_milestones(&conn, group)
            .expect("milestones")
            .iter()
            .map(|m| m.order_index)
            .collect();
        assert_eq!(orders, vec![1, 2, 3]);
        let third = milestone_by_order(&conn, group, 3)
            .expect("query")
            .expect("milestone 3");
        assert_eq!(third.category_id, ids[3]);
    }

    #[test]
    fn enrollments_filter_disabled_members() {
        let (conn, group, _root) = seeded();
        let project = insert_project(&conn, group, "team-a").expect("project");
        let ann = insert_user(&conn, "ann", "ann@example.edu").expect("ann");
        let bob = insert_user(&conn, "bob", "bob@example.edu").expect("bob");
        insert_enrollment(&conn, ann, project, Role::Member).expect("enroll ann");
        let bob_enrollment = insert_enrollment(&conn, bob, project, Role::Member).expect("enroll bob");

        assert!(set_enrollment_disabled(&conn, bob_enrollment, true).expect("disable"));
        assert_eq!(
            project_enrollments(&conn, project, false)
                .expect("enabled")
                .len(),
            1
        );
        assert_eq!(
            project_enrollments(&conn, project, true).expect("all").len(),
            2
        );
        assert_eq!(group_enrollments(&conn, group).expect("group").len(), 2);
        assert!(!set_enrollment_disabled(&conn, EnrollmentId(99), true).expect("missing"));
    }
}
