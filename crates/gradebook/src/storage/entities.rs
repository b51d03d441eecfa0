//! `MirrorEntity` bindings for the domain types.
//!
//! Each impl names its table, its domain columns in declaration order, and
//! how the entity maps to and from those columns. `from_row` receives the
//! index of the first domain column; the bookkeeping prefix is read by the
//! store itself.

use gradebook_api::{Activity, Group, Score, Student, Subject, Term};
use rusqlite::types::Value;
use rusqlite::Row;

use super::types::{
    bind_date, bind_opt_ref, bind_opt_text, bind_ref, date_column, opt_ref_column, ref_column,
};

/// A domain type persisted in the mirror.
pub trait MirrorEntity: Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    /// Domain columns, in the order `bind_values` produces them.
    const COLUMNS: &'static [&'static str];

    fn bind_values(&self) -> Vec<Value>;
    fn from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Self>;

    /// Composite logical key as (column, encoded value) pairs, for entities
    /// the remote upserts on something other than its identity.
    fn natural_key(&self) -> Option<Vec<(&'static str, String)>> {
        None
    }
}

impl MirrorEntity for Group {
    const TABLE: &'static str = "groups";
    const COLUMNS: &'static [&'static str] = &["level", "section", "school_year"];

    fn bind_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.level.clone()),
            Value::Text(self.section.clone()),
            Value::Integer(self.school_year as i64),
        ]
    }

    fn from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Self> {
        Ok(Group {
            level: row.get(base)?,
            section: row.get(base + 1)?,
            school_year: row.get(base + 2)?,
        })
    }
}

impl MirrorEntity for Student {
    const TABLE: &'static str = "students";
    const COLUMNS: &'static [&'static str] = &["first_name", "last_name", "email", "group_ref"];

    fn bind_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.first_name.clone()),
            Value::Text(self.last_name.clone()),
            bind_opt_text(&self.email),
            bind_ref(&self.group),
        ]
    }

    fn from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Self> {
        Ok(Student {
            first_name: row.get(base)?,
            last_name: row.get(base + 1)?,
            email: row.get(base + 2)?,
            group: ref_column(row, base + 3)?,
        })
    }
}

impl MirrorEntity for Subject {
    const TABLE: &'static str = "subjects";
    const COLUMNS: &'static [&'static str] = &["name", "description"];

    fn bind_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            bind_opt_text(&self.description),
        ]
    }

    fn from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Self> {
        Ok(Subject {
            name: row.get(base)?,
            description: row.get(base + 1)?,
        })
    }
}

impl MirrorEntity for Term {
    const TABLE: &'static str = "terms";
    const COLUMNS: &'static [&'static str] =
        &["name", "school_year", "start_date", "end_date", "active"];

    fn bind_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            Value::Integer(self.school_year as i64),
            bind_date(&self.start_date),
            bind_date(&self.end_date),
            Value::Integer(self.active as i64),
        ]
    }

    fn from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Self> {
        Ok(Term {
            name: row.get(base)?,
            school_year: row.get(base + 1)?,
            start_date: date_column(row, base + 2)?,
            end_date: date_column(row, base + 3)?,
            active: row.get(base + 4)?,
        })
    }
}

impl MirrorEntity for Activity {
    const TABLE: &'static str = "activities";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "description",
        "weight",
        "subject_ref",
        "term_ref",
        "parent_ref",
        "averaged",
        "activity_date",
    ];

    fn bind_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            bind_opt_text(&self.description),
            Value::Real(self.weight),
            bind_ref(&self.subject),
            bind_ref(&self.term),
            bind_opt_ref(&self.parent),
            Value::Integer(self.averaged as i64),
            bind_date(&self.date),
        ]
    }

    fn from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Self> {
        Ok(Activity {
            name: row.get(base)?,
            description: row.get(base + 1)?,
            weight: row.get(base + 2)?,
            subject: ref_column(row, base + 3)?,
            term: ref_column(row, base + 4)?,
            parent: opt_ref_column(row, base + 5)?,
            averaged: row.get(base + 6)?,
            date: date_column(row, base + 7)?,
        })
    }
}

impl MirrorEntity for Score {
    const TABLE: &'static str = "scores";
    const COLUMNS: &'static [&'static str] = &["value", "remark", "student_ref", "activity_ref"];

    fn bind_values(&self) -> Vec<Value> {
        vec![
            Value::Real(self.value),
            bind_opt_text(&self.remark),
            bind_ref(&self.student),
            bind_ref(&self.activity),
        ]
    }

    fn from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Self> {
        Ok(Score {
            value: row.get(base)?,
            remark: row.get(base + 1)?,
            student: ref_column(row, base + 2)?,
            activity: ref_column(row, base + 3)?,
        })
    }

    fn natural_key(&self) -> Option<Vec<(&'static str, String)>> {
        Some(self.logical_key().to_vec())
    }
}
