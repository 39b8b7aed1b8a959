//! services/api/src/adapters/roster_http.rs
//!
//! This module contains the adapter for the school's remote roster plugin.
//! It implements the `RosterService` port from the `core` crate over its JSON
//! REST contract; every request carries the secret key in `X-Sync-Key`.

use async_trait::async_trait;
use attendance_core::{
    ClassData, NewClass, PortError, PortResult, RosterService, RosterSnapshot, StudentMark,
    TeacherAttendanceRecord,
};
use reqwest::{Client, Method, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const SYNC_KEY_HEADER: &str = "X-Sync-Key";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `RosterService` port using `reqwest`.
#[derive(Clone)]
pub struct HttpRosterAdapter {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpRosterAdapter {
    /// Creates a new `HttpRosterAdapter` with a client-level request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> PortResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PortError::Unexpected(format!("invalid roster URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PortError::Unexpected(format!("roster URL '{}' cannot be a base", base_url)));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Sends one request and decodes the JSON body. An empty body, or a JSON
    /// `null`, is a null result rather than an error.
    async fn send<B, T>(
        &self,
        method: Method,
        url: Url,
        sync_key: &str,
        body: Option<&B>,
    ) -> PortResult<Option<T>>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        debug!("{} {}", method, url);
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(SYNC_KEY_HEADER, sync_key);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            warn!("{} {} returned {}", method, url, status);
            return Err(status_error(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str::<Option<T>>(&text).map_err(|e| PortError::Malformed(e.to_string()))
    }

    fn transport_error(&self, err: reqwest::Error) -> PortError {
        if err.is_timeout() {
            PortError::Timeout(self.timeout)
        } else if err.is_decode() {
            PortError::Malformed(err.to_string())
        } else {
            PortError::Network(err.to_string())
        }
    }
}

fn status_error(status: StatusCode, body: &str) -> PortError {
    let detail = format!("HTTP {}: {}", status.as_u16(), body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
        StatusCode::NOT_FOUND => PortError::NotFound(detail),
        StatusCode::CONFLICT => PortError::Conflict(detail),
        _ => PortError::Unexpected(detail),
    }
}

#[derive(Serialize)]
struct StudentUpload<'a> {
    students: &'a [StudentMark],
}

#[derive(Serialize)]
struct TeacherUpload<'a> {
    teachers: &'a [TeacherAttendanceRecord],
}

//=========================================================================================
// `RosterService` Trait Implementation
//=========================================================================================

#[async_trait]
impl RosterService for HttpRosterAdapter {
    async fn fetch_roster(&self, sync_key: &str) -> PortResult<RosterSnapshot> {
        let snapshot = self
            .send::<(), RosterSnapshot>(Method::GET, self.endpoint(&["data"]), sync_key, None)
            .await?;
        Ok(snapshot.unwrap_or_default())
    }

    async fn upload_student_attendance(&self, sync_key: &str, marks: &[StudentMark]) -> PortResult<()> {
        let body = StudentUpload { students: marks };
        self.send::<_, serde_json::Value>(Method::POST, self.endpoint(&["attendance"]), sync_key, Some(&body))
            .await?;
        Ok(())
    }

    async fn submit_teacher_attendance(
        &self,
        sync_key: &str,
        records: &[TeacherAttendanceRecord],
    ) -> PortResult<()> {
        let body = TeacherUpload { teachers: records };
        self.send::<_, serde_json::Value>(Method::POST, self.endpoint(&["attendance"]), sync_key, Some(&body))
            .await?;
        Ok(())
    }

    async fn list_classes(&self, sync_key: &str) -> PortResult<Vec<ClassData>> {
        let classes = self
            .send::<(), Vec<ClassData>>(Method::GET, self.endpoint(&["classes"]), sync_key, None)
            .await?;
        Ok(classes.unwrap_or_default())
    }

    async fn create_class(&self, sync_key: &str, class: &NewClass) -> PortResult<ClassData> {
        self.send::<_, ClassData>(Method::POST, self.endpoint(&["classes"]), sync_key, Some(class))
            .await?
            .ok_or_else(|| PortError::Malformed("class creation returned an empty body".to_string()))
    }

    async fn delete_class(&self, sync_key: &str, class_id: &str) -> PortResult<()> {
        self.send::<(), serde_json::Value>(
            Method::DELETE,
            self.endpoint(&["classes", class_id]),
            sync_key,
            None,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_append_to_the_base_path() {
        let adapter =
            HttpRosterAdapter::new("https://school.example/wp-json/attendance/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            adapter.endpoint(&["data"]).as_str(),
            "https://school.example/wp-json/attendance/v1/data"
        );
        assert_eq!(
            adapter.endpoint(&["classes", "7/8"]).as_str(),
            "https://school.example/wp-json/attendance/v1/classes/7%2F8"
        );
    }

    #[test]
    fn unusable_base_urls_are_rejected() {
        assert!(HttpRosterAdapter::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpRosterAdapter::new("mailto:office@school.example", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn statuses_map_to_port_errors() {
        assert!(matches!(status_error(StatusCode::FORBIDDEN, ""), PortError::Unauthorized));
        assert!(matches!(status_error(StatusCode::UNAUTHORIZED, ""), PortError::Unauthorized));
        assert!(matches!(status_error(StatusCode::NOT_FOUND, "gone"), PortError::NotFound(m) if m.contains("gone")));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            PortError::Unexpected(m) if m.starts_with("HTTP 500")
        ));
    }
}
