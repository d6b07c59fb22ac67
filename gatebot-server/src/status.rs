//! Status types and access check for the status endpoint.

use axum::http::{header, HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;

use gatebot_core::eligibility::is_eligible_to_withdraw;
use gatebot_core::{ConfigDocument, UserDocument};

use crate::constant_time_eq;

/// Counts over the two documents.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total_users: usize,
    pub eligible: usize,
    pub withdrawn: usize,
    pub referred: usize,
    pub channels: usize,
    pub folders: usize,
    /// Delegated admins; the root admin is not counted.
    pub admins: usize,
}

impl StatusSummary {
    pub fn from_documents(users: &UserDocument, config: &ConfigDocument) -> Self {
        let mut summary = StatusSummary {
            total_users: users.users.len(),
            channels: config.channels.len(),
            folders: config.folders.len(),
            admins: users.admins.len(),
            ..Default::default()
        };

        for (id, record) in &users.users {
            if is_eligible_to_withdraw(users, *id) {
                summary.eligible += 1;
            }
            if record.has_withdrawn {
                summary.withdrawn += 1;
            }
            if record.referred_by.is_some() {
                summary.referred += 1;
            }
        }

        summary
    }
}

/// Full status data for rendering.
#[derive(Debug, Serialize)]
pub struct StatusData {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub summary: StatusSummary,
    pub channels: Vec<String>,
    pub folders: Vec<String>,
}

impl StatusData {
    pub fn from_documents(users: &UserDocument, config: &ConfigDocument, version: String) -> Self {
        Self {
            version,
            generated_at: Utc::now(),
            summary: StatusSummary::from_documents(users, config),
            channels: config.channels.iter().map(|c| c.name.clone()).collect(),
            folders: config.folders.keys().cloned().collect(),
        }
    }
}

/// Check the `Authorization: Bearer <token>` header against the configured
/// token.
///
/// With no token configured the endpoint is disabled and every request gets
/// `403 Forbidden`.
pub fn check_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), StatusCode> {
    let expected = expected.ok_or(StatusCode::FORBIDDEN)?;

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatebot_core::eligibility::{mark_withdrawn, record_referral, register_user};
    use gatebot_core::{ChannelDescriptor, FolderDescriptor, UserId};

    fn documents() -> (UserDocument, ConfigDocument) {
        let mut users = UserDocument::default();
        register_user(&mut users, UserId(1), Some("a"));
        for referee in 2..=4 {
            register_user(&mut users, UserId(referee), None);
            assert!(record_referral(&mut users, UserId(1), UserId(referee)).is_applied());
        }
        register_user(&mut users, UserId(5), None);
        assert!(mark_withdrawn(&mut users, UserId(1)).reveals_reward());
        users.admins.insert(UserId(5));

        let mut config = ConfigDocument::default();
        config.channels.push(ChannelDescriptor {
            name: "Chan".to_string(),
            link: "https://t.me/chan".to_string(),
            external_chat_id: "-100".to_string(),
        });
        config.folders.insert(
            "F1".to_string(),
            FolderDescriptor {
                link: "https://t.me/addlist/f1".to_string(),
            },
        );
        (users, config)
    }

    #[test]
    fn test_summary_counts() {
        let (users, config) = documents();
        assert_eq!(
            StatusSummary::from_documents(&users, &config),
            StatusSummary {
                total_users: 5,
                eligible: 1,
                withdrawn: 1,
                referred: 3,
                channels: 1,
                folders: 1,
                admins: 1,
            }
        );
    }

    #[test]
    fn test_status_data_lists_names() {
        let (users, config) = documents();
        let data = StatusData::from_documents(&users, &config, "abc12345".to_string());
        assert_eq!(data.channels, vec!["Chan".to_string()]);
        assert_eq!(data.folders, vec!["F1".to_string()]);
        assert_eq!(data.version, "abc12345");
    }

    #[test]
    fn test_empty_documents() {
        let summary =
            StatusSummary::from_documents(&UserDocument::default(), &ConfigDocument::default());
        assert_eq!(summary, StatusSummary::default());
    }

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_bearer_disabled_without_token() {
        assert_eq!(
            check_bearer(&with_auth("Bearer x"), None),
            Err(StatusCode::FORBIDDEN)
        );
    }

    #[test]
    fn test_bearer_checks() {
        assert_eq!(check_bearer(&with_auth("Bearer tok"), Some("tok")), Ok(()));
        assert_eq!(
            check_bearer(&with_auth("Bearer bad"), Some("tok")),
            Err(StatusCode::UNAUTHORIZED)
        );
        assert_eq!(
            check_bearer(&with_auth("tok"), Some("tok")),
            Err(StatusCode::UNAUTHORIZED)
        );
        assert_eq!(
            check_bearer(&HeaderMap::new(), Some("tok")),
            Err(StatusCode::UNAUTHORIZED)
        );
    }
}
