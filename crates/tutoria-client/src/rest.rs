//! REST bootstrap calls.
//!
//! The external store is reached only for state bootstraps and read-state
//! writes; everything live goes over the event channel.

use serde::{Deserialize, Serialize};

use tutoria_shared::{CourseId, Notification, UserId};

use crate::error::Result;

/// One enrolled course, as served by the bootstrap API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub id: CourseId,
    pub title: String,
    #[serde(default)]
    pub tutor_id: Option<UserId>,
    #[serde(default)]
    pub tutor_name: Option<String>,
}

/// One enrolled student of a course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub id: UserId,
    pub name: String,
}

/// Thin wrapper over the bootstrap API. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn fetch_notifications(&self) -> Result<Vec<Notification>> {
        let resp = self
            .http
            .get(self.url("/tutor/notifications"))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<()> {
        self.http
            .put(self.url(&format!("/tutor/notifications/{id}/read")))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn mark_all_notifications_read(&self) -> Result<()> {
        self.http
            .put(self.url("/tutor/notifications/read-all"))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn fetch_enrolled_courses(&self) -> Result<Vec<CourseSummary>> {
        let resp = self
            .http
            .get(self.url("/purchase/enrolled-courses"))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    pub async fn fetch_course_students(&self, course_id: &CourseId) -> Result<Vec<StudentSummary>> {
        let resp = self
            .http
            .get(self.url(&format!("/courses/{}/students", course_id.as_str())))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}
