//! crates/attendance_core/src/roster.rs
//!
//! Lookup structures over the synced roster lists.

use crate::domain::{Student, Teacher};
use std::collections::HashMap;

/// `studentId -> Student` and `teacherId -> Teacher`, rebuilt in full whenever
/// the roster changes. There is no incremental update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterIndex {
    students: HashMap<String, Student>,
    teachers: HashMap<String, Teacher>,
}

impl RosterIndex {
    /// Builds both mappings. Duplicate IDs are tolerated: the last occurrence wins.
    pub fn rebuild(students: &[Student], teachers: &[Teacher]) -> Self {
        let students = students
            .iter()
            .map(|s| (s.student_id.clone(), s.clone()))
            .collect();
        let teachers = teachers.iter().map(|t| (t.id.clone(), t.clone())).collect();
        Self { students, teachers }
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.get(id)
    }

    pub fn teacher(&self, id: &str) -> Option<&Teacher> {
        self.teachers.get(id)
    }

    pub fn student_count(&self) -> usize {
        self.students.len()
    }

    pub fn teacher_count(&self) -> usize {
        self.teachers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str, name: &str) -> Student {
        Student {
            student_id: id.to_string(),
            student_name: name.to_string(),
            class: None,
        }
    }

    fn teacher(id: &str, name: &str) -> Teacher {
        Teacher {
            id: id.to_string(),
            name: name.to_string(),
            subject: None,
        }
    }

    #[test]
    fn every_roster_id_resolves_and_others_do_not() {
        let students = vec![student("S1", "Asha"), student("S2", "Ben")];
        let teachers = vec![teacher("T1", "Mrs. Rao")];
        let index = RosterIndex::rebuild(&students, &teachers);

        for s in &students {
            assert_eq!(index.student(&s.student_id), Some(s));
        }
        assert_eq!(index.teacher("T1"), Some(&teachers[0]));
        assert!(index.student("S3").is_none());
        assert!(index.teacher("S1").is_none());
        assert!(index.student("T1").is_none());
    }

    #[test]
    fn duplicate_ids_keep_the_last_occurrence() {
        let students = vec![student("S1", "First"), student("S1", "Second")];
        let index = RosterIndex::rebuild(&students, &[]);
        assert_eq!(index.student_count(), 1);
        assert_eq!(index.student("S1").map(|s| s.student_name.as_str()), Some("Second"));
    }

    #[test]
    fn default_index_is_empty() {
        let index = RosterIndex::default();
        assert_eq!(index.student_count(), 0);
        assert_eq!(index.teacher_count(), 0);
    }
}
