//! Canonical SQLite schema for the rubric score store.
//!
//! The schema is normalized around one assessment tree per group:
//! - `categories` is a self-referential parent-pointer table; detaching a
//!   parent leaves its children as roots
//! - `automation_rules` and `milestones` hang 1:1 off a category
//! - `scores` holds placeholder, automatic and manual values per
//!   `(category, subject)` with at most one row per non-placeholder kind
//! - `calculations` binds the root category and owns the milestone sequence
//! - `store_meta` records the applied schema version

/// Migration v1: roster, tree and score tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS groups (
    group_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    project_id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL REFERENCES groups(group_id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    created_at_us INTEGER NOT NULL,
    UNIQUE (group_id, name)
);

CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE CHECK (length(trim(username)) > 0),
    email TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS enrollments (
    enrollment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK (role IN ('viewer', 'member', 'mentor', 'teacher', 'admin', 'owner')),
    disabled INTEGER NOT NULL DEFAULT 0 CHECK (disabled IN (0, 1)),
    UNIQUE (user_id, project_id)
);

CREATE TABLE IF NOT EXISTS categories (
    category_id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL REFERENCES groups(group_id) ON DELETE CASCADE,
    parent_id INTEGER REFERENCES categories(category_id) ON DELETE SET NULL,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    description TEXT,
    total TEXT NOT NULL DEFAULT '1',
    assessment_type TEXT NOT NULL
        CHECK (assessment_type IN ('custom', 'sum', 'max', 'min', 'automatic')),
    subject_scope TEXT NOT NULL DEFAULT 'user' CHECK (subject_scope IN ('user', 'project')),
    CHECK (parent_id IS NULL OR parent_id <> category_id)
);

CREATE TABLE IF NOT EXISTS calculations (
    group_id INTEGER PRIMARY KEY REFERENCES groups(group_id) ON DELETE CASCADE,
    root_category_id INTEGER REFERENCES categories(category_id) ON DELETE SET NULL,
    milestone_seq INTEGER NOT NULL DEFAULT 0 CHECK (milestone_seq >= 0)
);

CREATE TABLE IF NOT EXISTS automation_rules (
    category_id INTEGER PRIMARY KEY REFERENCES categories(category_id) ON DELETE CASCADE,
    kind TEXT NOT NULL CHECK (kind IN ('random', 'time_spent', 'lines_changed')),
    amount_needed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS milestones (
    category_id INTEGER PRIMARY KEY REFERENCES categories(category_id) ON DELETE CASCADE,
    group_id INTEGER NOT NULL REFERENCES groups(group_id) ON DELETE CASCADE,
    start_us INTEGER NOT NULL,
    end_us INTEGER NOT NULL,
    order_index INTEGER NOT NULL,
    UNIQUE (group_id, order_index),
    CHECK (end_us >= start_us)
);

CREATE TABLE IF NOT EXISTS scores (
    score_id INTEGER PRIMARY KEY AUTOINCREMENT,
    category_id INTEGER NOT NULL REFERENCES categories(category_id) ON DELETE CASCADE,
    subject_kind TEXT NOT NULL CHECK (subject_kind IN ('user', 'project')),
    subject_id INTEGER NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('placeholder', 'automatic', 'manual')),
    value TEXT NOT NULL DEFAULT '0',
    updated_at_us INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_scores_one_per_kind
    ON scores(category_id, subject_kind, subject_id, kind)
    WHERE kind <> 'placeholder';

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us)
VALUES (1, 0, 0);
";

/// Migration v2: activity signal tables and lookup indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS issues (
    issue_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    external_id INTEGER NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    milestone_category_id INTEGER REFERENCES categories(category_id) ON DELETE SET NULL,
    UNIQUE (project_id, external_id)
);

CREATE TABLE IF NOT EXISTS time_entries (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id INTEGER NOT NULL REFERENCES issues(issue_id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    minutes INTEGER NOT NULL,
    logged_at_us INTEGER NOT NULL,
    external_id TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS commits (
    commit_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    hash TEXT NOT NULL CHECK (length(trim(hash)) > 0),
    user_id INTEGER REFERENCES users(user_id) ON DELETE SET NULL,
    author_name TEXT NOT NULL DEFAULT '',
    author_email TEXT NOT NULL DEFAULT '',
    lines_added INTEGER NOT NULL DEFAULT 0 CHECK (lines_added >= 0),
    lines_removed INTEGER NOT NULL DEFAULT 0 CHECK (lines_removed >= 0),
    committed_at_us INTEGER NOT NULL,
    UNIQUE (project_id, hash)
);

CREATE INDEX IF NOT EXISTS idx_categories_group_parent
    ON categories(group_id, parent_id);

CREATE INDEX IF NOT EXISTS idx_scores_subject
    ON scores(subject_kind, subject_id, category_id);

CREATE INDEX IF NOT EXISTS idx_enrollments_project
    ON enrollments(project_id, disabled);

CREATE INDEX IF NOT EXISTS idx_issues_milestone
    ON issues(milestone_category_id, project_id);

CREATE INDEX IF NOT EXISTS idx_time_entries_user_logged
    ON time_entries(user_id, logged_at_us);

CREATE INDEX IF NOT EXISTS idx_commits_project_user_time
    ON commits(project_id, user_id, committed_at_us);
";

/// Migration v3: who opened and who closed each issue.
pub const MIGRATION_V3_SQL: &str = r"
ALTER TABLE issues ADD COLUMN author_user_id INTEGER
    REFERENCES users(user_id) ON DELETE SET NULL;

ALTER TABLE issues ADD COLUMN closed_by_user_id INTEGER
    REFERENCES users(user_id) ON DELETE SET NULL;
";

/// Indexes expected by the hot read paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_scores_one_per_kind",
    "idx_categories_group_parent",
    "idx_scores_subject",
    "idx_enrollments_project",
    "idx_issues_milestone",
    "idx_time_entries_user_logged",
    "idx_commits_project_user_time",
];
