pub mod domain;
pub mod ledger;
pub mod ports;
pub mod roster;
pub mod scan;
pub mod session;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use domain::{
    AttendanceStatus, ClassData, NewClass, PersonKind, Role, RosterSnapshot, ScanEvent, Student,
    StudentAttendanceRecord, StudentMark, Teacher, TeacherAttendanceRecord, TeacherScanRecord,
    TeacherStatusEntry, User, UserCredentials,
};
pub use ledger::{StudentLedger, TeacherScanLog, TeacherStatusMap};
pub use ports::{AccountService, Clock, PortError, PortResult, RosterService, SystemClock};
pub use roster::RosterIndex;
pub use scan::{process_scan, ScanContext, ScanError, ScanOutcome, TeacherScanPolicy};
pub use session::{AttendanceSession, SessionSettings};
pub use sync::{RosterState, SyncError, SyncSummary};
