//! Domain entities and backend wire DTOs.
//!
//! Domain structs are what the engine mirrors and callers consume. DTOs
//! match the Spring backend's JSON verbatim (Spanish field names, nested
//! parent objects); the conversion into a `(ServerId, entity)` pair
//! flattens nested references once, at this boundary.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::keys::{EntityRef, ServerId};

// =============================================================================
// Domain entities
// =============================================================================

/// A class group ("7mo Grado A, 2025").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub level: String,
    pub section: String,
    pub school_year: i32,
}

/// A student enrolled in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub group: EntityRef,
}

/// Catalog entry: a taught subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub description: Option<String>,
}

/// Catalog entry: a grading term of a school year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub name: String,
    pub school_year: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
}

/// A gradable activity within (subject, term), optionally nested under a
/// parent activity. `weight` is the percentage contribution enforced
/// server-side (root weights per (subject, term) may not exceed 100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    pub description: Option<String>,
    pub weight: f64,
    pub subject: EntityRef,
    pub term: EntityRef,
    pub parent: Option<EntityRef>,
    pub averaged: bool,
    pub date: Option<NaiveDate>,
}

/// A score a student obtained in an activity. The `(student, activity)`
/// pair is the score's logical key: the backend upserts on it, and the
/// mirror matches incoming rows against pending rows by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub value: f64,
    pub remark: Option<String>,
    pub student: EntityRef,
    pub activity: EntityRef,
}

impl Score {
    /// The composite logical key as (column, encoded value) pairs, in the
    /// order the mirror indexes them.
    pub fn logical_key(&self) -> [(&'static str, String); 2] {
        [
            ("student_ref", self.student.encode()),
            ("activity_ref", self.activity.encode()),
        ]
    }
}

// =============================================================================
// Wire DTOs (backend JSON, verbatim)
// =============================================================================

/// Bare `{ "id": n }` object used for denormalized parent references.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParentIdDto {
    pub id: i64,
}

impl From<ServerId> for ParentIdDto {
    fn from(id: ServerId) -> Self {
        ParentIdDto { id: id.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDto {
    pub id: i64,
    #[serde(rename = "nivel")]
    pub level: String,
    #[serde(rename = "seccion")]
    pub section: String,
    #[serde(rename = "anioEscolar")]
    pub school_year: i32,
}

impl GroupDto {
    pub fn into_pair(self) -> (ServerId, Group) {
        (
            ServerId(self.id),
            Group {
                level: self.level,
                section: self.section,
                school_year: self.school_year,
            },
        )
    }
}

/// Create/update body for a group (no identity attached).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPayload {
    #[serde(rename = "nivel")]
    pub level: String,
    #[serde(rename = "seccion")]
    pub section: String,
    #[serde(rename = "anioEscolar")]
    pub school_year: i32,
}

impl From<&Group> for GroupPayload {
    fn from(g: &Group) -> Self {
        GroupPayload {
            level: g.level.clone(),
            section: g.section.clone(),
            school_year: g.school_year,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentDto {
    pub id: i64,
    #[serde(rename = "nombres")]
    pub first_name: String,
    #[serde(rename = "apellidos")]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "grado")]
    pub group: ParentIdDto,
}

impl StudentDto {
    pub fn into_pair(self) -> (ServerId, Student) {
        (
            ServerId(self.id),
            Student {
                first_name: self.first_name,
                last_name: self.last_name,
                email: self.email,
                group: EntityRef::Server(ServerId(self.group.id)),
            },
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentPayload {
    #[serde(rename = "nombres")]
    pub first_name: String,
    #[serde(rename = "apellidos")]
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "grado")]
    pub group: ParentIdDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectDto {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
}

impl SubjectDto {
    pub fn into_pair(self) -> (ServerId, Subject) {
        (
            ServerId(self.id),
            Subject {
                name: self.name,
                description: self.description,
            },
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectPayload {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Subject> for SubjectPayload {
    fn from(s: &Subject) -> Self {
        SubjectPayload {
            name: s.name.clone(),
            description: s.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermDto {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "anioEscolar")]
    pub school_year: i32,
    #[serde(rename = "fechaInicio", default)]
    pub start_date: Option<NaiveDate>,
    #[serde(rename = "fechaFin", default)]
    pub end_date: Option<NaiveDate>,
    #[serde(rename = "activo", default)]
    pub active: bool,
}

impl TermDto {
    pub fn into_pair(self) -> (ServerId, Term) {
        (
            ServerId(self.id),
            Term {
                name: self.name,
                school_year: self.school_year,
                start_date: self.start_date,
                end_date: self.end_date,
                active: self.active,
            },
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermPayload {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "anioEscolar")]
    pub school_year: i32,
    #[serde(rename = "fechaInicio", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(rename = "fechaFin", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(rename = "activo")]
    pub active: bool,
}

impl From<&Term> for TermPayload {
    fn from(t: &Term) -> Self {
        TermPayload {
            name: t.name.clone(),
            school_year: t.school_year,
            start_date: t.start_date,
            end_date: t.end_date,
            active: t.active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityDto {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    #[serde(rename = "ponderacion")]
    pub weight: f64,
    #[serde(rename = "materia")]
    pub subject: ParentIdDto,
    #[serde(rename = "trimestre")]
    pub term: ParentIdDto,
    #[serde(default)]
    pub parent: Option<ParentIdDto>,
    #[serde(rename = "promedia", default)]
    pub averaged: bool,
    #[serde(rename = "fechaActividad", default)]
    pub date: Option<NaiveDate>,
}

impl ActivityDto {
    pub fn into_pair(self) -> (ServerId, Activity) {
        (
            ServerId(self.id),
            Activity {
                name: self.name,
                description: self.description,
                weight: self.weight,
                subject: EntityRef::Server(ServerId(self.subject.id)),
                term: EntityRef::Server(ServerId(self.term.id)),
                parent: self.parent.map(|p| EntityRef::Server(ServerId(p.id))),
                averaged: self.averaged,
                date: self.date,
            },
        )
    }
}

/// Flat create/update body the activities controller expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "ponderacion")]
    pub weight: f64,
    #[serde(rename = "materiaId")]
    pub subject_id: i64,
    #[serde(rename = "trimestreId")]
    pub term_id: i64,
    #[serde(rename = "parentId", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[serde(rename = "promedia")]
    pub averaged: bool,
    #[serde(rename = "fechaActividad", skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreDto {
    pub id: i64,
    #[serde(rename = "nota")]
    pub value: f64,
    #[serde(rename = "observacion", default)]
    pub remark: Option<String>,
    #[serde(rename = "estudiante")]
    pub student: ParentIdDto,
    #[serde(rename = "actividad")]
    pub activity: ParentIdDto,
}

impl ScoreDto {
    pub fn into_pair(self) -> (ServerId, Score) {
        (
            ServerId(self.id),
            Score {
                value: self.value,
                remark: self.remark,
                student: EntityRef::Server(ServerId(self.student.id)),
                activity: EntityRef::Server(ServerId(self.activity.id)),
            },
        )
    }
}

/// Flat upsert body for `/api/calificaciones`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorePayload {
    #[serde(rename = "estudianteId")]
    pub student_id: i64,
    #[serde(rename = "actividadId")]
    pub activity_id: i64,
    #[serde(rename = "nota")]
    pub value: f64,
    #[serde(rename = "observacion")]
    pub remark: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_dto_flattens_nested_group_reference() {
        let json = r#"{"id":5,"nombres":"Ana","apellidos":"Lopez","email":null,"grado":{"id":2}}"#;
        let dto: StudentDto = serde_json::from_str(json).unwrap();
        let (id, student) = dto.into_pair();
        assert_eq!(id, ServerId(5));
        assert_eq!(student.group, EntityRef::Server(ServerId(2)));
        assert_eq!(student.first_name, "Ana");
    }

    #[test]
    fn score_payload_serializes_backend_field_names() {
        let payload = ScorePayload {
            student_id: 1,
            activity_id: 2,
            value: 85.5,
            remark: String::new(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["estudianteId"], 1);
        assert_eq!(json["actividadId"], 2);
        assert_eq!(json["nota"], 85.5);
    }
}
