//! Generic JSON user export.
//!
//! The file is an array of entries shaped like
//! `{"User": {"id": 1, "login": "meg", ...}, "roles": [{"id": 3, "name": "staff"}]}`.
//! Roles become groups; each user keeps the ids of its roles.

use std::collections::HashSet;
use std::path::Path;

use chrono::DateTime;
use serde::Deserialize;

use super::{ImportSources, VecSource};
use crate::error::{CoreError, Result};
use crate::records::{SourceGroup, SourceUser};

/// Ids and timestamps show up as either numbers or strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(i64),
    Text(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s,
        }
    }

    /// Numbers are Unix seconds.
    fn into_timestamp(self) -> Option<String> {
        match self {
            Scalar::Number(secs) => DateTime::from_timestamp(secs, 0).map(|t| t.to_rfc3339()),
            Scalar::Text(s) => Some(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(rename = "User")]
    user: UserFields,
    #[serde(default)]
    roles: Vec<Role>,
}

#[derive(Debug, Deserialize)]
struct UserFields {
    id: Scalar,
    login: String,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    biography: Option<String>,
    location: Option<String>,
    registration_data: Option<Registration>,
}

#[derive(Debug, Deserialize)]
struct Registration {
    registration_time: Option<Scalar>,
}

#[derive(Debug, Deserialize)]
struct Role {
    id: Scalar,
    name: String,
}

fn full_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let name = [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!name.is_empty()).then_some(name)
}

/// A parsed JSON export.
#[derive(Debug, Clone, Default)]
pub struct JsonExport {
    pub groups: Vec<SourceGroup>,
    pub users: Vec<SourceUser>,
}

impl JsonExport {
    pub async fn load(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CoreError::source_unavailable(&name, e))?;
        Self::parse(&name, &content)
    }

    pub fn parse(name: &str, content: &str) -> Result<Self> {
        let entries: Vec<Entry> =
            serde_json::from_str(content).map_err(|e| CoreError::source_format(name, e))?;

        let mut export = JsonExport::default();
        let mut seen_groups = HashSet::new();

        for entry in entries {
            let mut group_ids = Vec::with_capacity(entry.roles.len());
            for role in entry.roles {
                let id = role.id.into_string();
                if seen_groups.insert(id.clone()) {
                    export.groups.push(SourceGroup {
                        source_id: id.clone(),
                        name: role.name,
                    });
                }
                group_ids.push(id);
            }

            let fields = entry.user;
            let created_at = fields
                .registration_data
                .and_then(|r| r.registration_time)
                .and_then(Scalar::into_timestamp);

            export.users.push(SourceUser {
                source_id: fields.id.into_string(),
                name: full_name(fields.first_name.as_deref(), fields.last_name.as_deref()),
                username: fields.login,
                email: fields.email,
                created_at,
                bio: fields.biography,
                location: fields.location,
                last_seen: None,
                group_ids,
            });
        }

        Ok(export)
    }

    pub fn into_sources(self, name: &str) -> ImportSources {
        ImportSources {
            groups: Some(Box::new(VecSource::new(format!("{name} (roles)"), self.groups))),
            users: Some(Box::new(VecSource::new(format!("{name} (users)"), self.users))),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "User": {
                "id": 1,
                "login": "Meg",
                "email": "meg@example.com",
                "first_name": "Meg",
                "last_name": "Murry",
                "biography": "tesseract enthusiast",
                "location": "Connecticut",
                "registration_data": {"registration_time": "2019-04-01 12:30:00"}
            },
            "roles": [{"id": 3, "name": "staff"}, {"id": 4, "name": "beta"}]
        },
        {
            "User": {"id": "2", "login": "charles", "registration_data": {"registration_time": 0}},
            "roles": [{"id": 3, "name": "staff"}]
        }
    ]"#;

    #[test]
    fn test_parse_export() {
        let export = JsonExport::parse("sample", SAMPLE).unwrap();

        let groups: Vec<_> = export.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(groups, vec!["staff", "beta"]);

        let meg = &export.users[0];
        assert_eq!(meg.source_id, "1");
        assert_eq!(meg.username, "Meg");
        assert_eq!(meg.name.as_deref(), Some("Meg Murry"));
        assert_eq!(meg.bio.as_deref(), Some("tesseract enthusiast"));
        assert_eq!(meg.created_at.as_deref(), Some("2019-04-01 12:30:00"));
        assert_eq!(meg.group_ids, vec!["3", "4"]);

        let charles = &export.users[1];
        assert_eq!(charles.source_id, "2");
        assert_eq!(charles.name, None);
        assert_eq!(charles.created_at.as_deref(), Some("1970-01-01T00:00:00+00:00"));
        assert_eq!(charles.group_ids, vec!["3"]);
    }

    #[test]
    fn test_malformed_export() {
        let err = JsonExport::parse("broken", r#"[{"roles": []}]"#).unwrap_err();
        assert!(matches!(err, CoreError::SourceFormat { .. }));
    }
}
