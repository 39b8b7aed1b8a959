//! In-memory doubles for the core ports, used by the unit tests.

use crate::domain::{
    ClassData, NewClass, RosterSnapshot, Student, StudentMark, Teacher, TeacherAttendanceRecord,
};
use crate::ports::{Clock, PortError, PortResult, RosterService};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
    Unauthorized,
    Network,
    Malformed,
    Hang,
}

impl Failure {
    async fn raise<T>(self) -> PortResult<T> {
        match self {
            Failure::Unauthorized => Err(PortError::Unauthorized),
            Failure::Network => Err(PortError::Network("connection refused".into())),
            Failure::Malformed => Err(PortError::Malformed("expected value at line 1".into())),
            Failure::Hang => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeRoster {
    pub snapshot: Mutex<RosterSnapshot>,
    pub fetch_failure: Mutex<Option<Failure>>,
    pub upload_failure: Mutex<Option<Failure>>,
    pub student_uploads: Mutex<Vec<StudentMark>>,
    pub teacher_uploads: Mutex<Vec<TeacherAttendanceRecord>>,
    pub keys_seen: Mutex<Vec<String>>,
}

impl FakeRoster {
    pub fn with_roster(students: Vec<Student>, teachers: Vec<Teacher>) -> Self {
        let fake = Self::default();
        *fake.snapshot.lock().unwrap() = RosterSnapshot {
            students,
            teachers,
            classes: Vec::new(),
        };
        fake
    }

    pub fn fail_fetch(&self, failure: Option<Failure>) {
        *self.fetch_failure.lock().unwrap() = failure;
    }

    pub fn fail_upload(&self, failure: Option<Failure>) {
        *self.upload_failure.lock().unwrap() = failure;
    }

    pub fn set_snapshot(&self, snapshot: RosterSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    fn upload_failure(&self) -> Option<Failure> {
        *self.upload_failure.lock().unwrap()
    }
}

#[async_trait]
impl RosterService for FakeRoster {
    async fn fetch_roster(&self, sync_key: &str) -> PortResult<RosterSnapshot> {
        self.keys_seen.lock().unwrap().push(sync_key.to_string());
        let failure = *self.fetch_failure.lock().unwrap();
        if let Some(failure) = failure {
            return failure.raise().await;
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn upload_student_attendance(&self, sync_key: &str, marks: &[StudentMark]) -> PortResult<()> {
        self.keys_seen.lock().unwrap().push(sync_key.to_string());
        if let Some(failure) = self.upload_failure() {
            return failure.raise().await;
        }
        self.student_uploads.lock().unwrap().extend_from_slice(marks);
        Ok(())
    }

    async fn submit_teacher_attendance(
        &self,
        sync_key: &str,
        records: &[TeacherAttendanceRecord],
    ) -> PortResult<()> {
        self.keys_seen.lock().unwrap().push(sync_key.to_string());
        if let Some(failure) = self.upload_failure() {
            return failure.raise().await;
        }
        self.teacher_uploads.lock().unwrap().extend_from_slice(records);
        Ok(())
    }

    async fn list_classes(&self, _sync_key: &str) -> PortResult<Vec<ClassData>> {
        Ok(self.snapshot.lock().unwrap().classes.clone())
    }

    async fn create_class(&self, _sync_key: &str, class: &NewClass) -> PortResult<ClassData> {
        let mut snapshot = self.snapshot.lock().unwrap();
        let created = ClassData {
            id: (snapshot.classes.len() + 1).to_string(),
            class_name: class.class_name.clone(),
            class_numeric: class.class_numeric,
            class_capacity: class.class_capacity,
            sections: class.sections.clone(),
        };
        snapshot.classes.push(created.clone());
        Ok(created)
    }

    async fn delete_class(&self, _sync_key: &str, class_id: &str) -> PortResult<()> {
        let mut snapshot = self.snapshot.lock().unwrap();
        let before = snapshot.classes.len();
        snapshot.classes.retain(|c| c.id != class_id);
        if snapshot.classes.len() == before {
            return Err(PortError::NotFound(format!("Class {class_id} not found")));
        }
        Ok(())
    }
}

pub(crate) struct FixedClock(pub DateTime<Local>);

impl FixedClock {
    /// 2024-05-06 08:30:00 local time.
    pub fn morning() -> Self {
        Self(Local.with_ymd_and_hms(2024, 5, 6, 8, 30, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

pub(crate) fn student(id: &str, name: &str) -> Student {
    Student {
        student_id: id.to_string(),
        student_name: name.to_string(),
        class: None,
    }
}

pub(crate) fn teacher(id: &str, name: &str) -> Teacher {
    Teacher {
        id: id.to_string(),
        name: name.to_string(),
        subject: None,
    }
}
