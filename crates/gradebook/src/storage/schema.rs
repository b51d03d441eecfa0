//! Mirror schema: one table per entity type, plus the foreign-key registry
//! driving the post-push reference rewrite.
//!
//! Every table shares the bookkeeping prefix (`local_id`, `server_id`,
//! `sync_state`) followed by its domain columns. Reference columns hold the
//! canonical `EntityRef` text encoding.

use rusqlite::Connection;

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS groups (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id INTEGER,
    sync_state TEXT NOT NULL DEFAULT 'synced',
    level TEXT NOT NULL,
    section TEXT NOT NULL,
    school_year INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_groups_server ON groups(server_id);
CREATE INDEX IF NOT EXISTS idx_groups_state ON groups(sync_state);

CREATE TABLE IF NOT EXISTS students (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id INTEGER,
    sync_state TEXT NOT NULL DEFAULT 'synced',
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT,
    group_ref TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_students_server ON students(server_id);
CREATE INDEX IF NOT EXISTS idx_students_state ON students(sync_state);
CREATE INDEX IF NOT EXISTS idx_students_group ON students(group_ref);

CREATE TABLE IF NOT EXISTS subjects (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id INTEGER,
    sync_state TEXT NOT NULL DEFAULT 'synced',
    name TEXT NOT NULL,
    description TEXT
);
CREATE INDEX IF NOT EXISTS idx_subjects_server ON subjects(server_id);
CREATE INDEX IF NOT EXISTS idx_subjects_state ON subjects(sync_state);

CREATE TABLE IF NOT EXISTS terms (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id INTEGER,
    sync_state TEXT NOT NULL DEFAULT 'synced',
    name TEXT NOT NULL,
    school_year INTEGER NOT NULL,
    start_date TEXT,
    end_date TEXT,
    active INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_terms_server ON terms(server_id);
CREATE INDEX IF NOT EXISTS idx_terms_state ON terms(sync_state);

CREATE TABLE IF NOT EXISTS activities (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id INTEGER,
    sync_state TEXT NOT NULL DEFAULT 'synced',
    name TEXT NOT NULL,
    description TEXT,
    weight REAL NOT NULL,
    subject_ref TEXT NOT NULL,
    term_ref TEXT NOT NULL,
    parent_ref TEXT,
    averaged INTEGER NOT NULL DEFAULT 0,
    activity_date TEXT
);
CREATE INDEX IF NOT EXISTS idx_activities_server ON activities(server_id);
CREATE INDEX IF NOT EXISTS idx_activities_state ON activities(sync_state);
CREATE INDEX IF NOT EXISTS idx_activities_scope ON activities(subject_ref, term_ref);

CREATE TABLE IF NOT EXISTS scores (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id INTEGER,
    sync_state TEXT NOT NULL DEFAULT 'synced',
    value REAL NOT NULL,
    remark TEXT,
    student_ref TEXT NOT NULL,
    activity_ref TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scores_server ON scores(server_id);
CREATE INDEX IF NOT EXISTS idx_scores_state ON scores(sync_state);
CREATE INDEX IF NOT EXISTS idx_scores_student ON scores(student_ref);
CREATE INDEX IF NOT EXISTS idx_scores_activity ON scores(activity_ref);
CREATE INDEX IF NOT EXISTS idx_scores_pair ON scores(student_ref, activity_ref);
"#;

/// A reference column pointing at rows of `parent_table`.
#[derive(Debug, Clone, Copy)]
pub struct ForeignKeySpec {
    pub table: &'static str,
    pub column: &'static str,
    pub parent_table: &'static str,
}

/// Every cross-entity reference column in the mirror. The post-push
/// rewrite scans this registry whenever a row gains a server identity.
pub(crate) const FOREIGN_KEYS: &[ForeignKeySpec] = &[
    ForeignKeySpec {
        table: "students",
        column: "group_ref",
        parent_table: "groups",
    },
    ForeignKeySpec {
        table: "activities",
        column: "subject_ref",
        parent_table: "subjects",
    },
    ForeignKeySpec {
        table: "activities",
        column: "term_ref",
        parent_table: "terms",
    },
    ForeignKeySpec {
        table: "activities",
        column: "parent_ref",
        parent_table: "activities",
    },
    ForeignKeySpec {
        table: "scores",
        column: "student_ref",
        parent_table: "students",
    },
    ForeignKeySpec {
        table: "scores",
        column: "activity_ref",
        parent_table: "activities",
    },
];

pub(crate) fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}
