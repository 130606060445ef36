use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Role identifiers as assigned by the backend's role table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum RoleType {
    Admin,
    Student,
    Teacher,
    Reviewer,
    Internal,
    External,
    Unknown(u16),
}

impl From<u16> for RoleType {
    fn from(id: u16) -> Self {
        match id {
            1 => RoleType::Admin,
            2 => RoleType::Student,
            3 => RoleType::Teacher,
            4 => RoleType::Reviewer,
            5 => RoleType::Internal,
            6 => RoleType::External,
            other => RoleType::Unknown(other),
        }
    }
}

impl From<RoleType> for u16 {
    fn from(role: RoleType) -> Self {
        match role {
            RoleType::Admin => 1,
            RoleType::Student => 2,
            RoleType::Teacher => 3,
            RoleType::Reviewer => 4,
            RoleType::Internal => 5,
            RoleType::External => 6,
            RoleType::Unknown(id) => id,
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleType::Admin => write!(f, "Admin"),
            RoleType::Student => write!(f, "Student"),
            RoleType::Teacher => write!(f, "Teacher"),
            RoleType::Reviewer => write!(f, "Reviewer"),
            RoleType::Internal => write!(f, "Internal"),
            RoleType::External => write!(f, "External"),
            RoleType::Unknown(_) => write!(f, "Unknown Role"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Department {
    Cse,
    Eee,
    Ete,
    Phm,
    Other(String),
}

impl Department {
    pub fn code(&self) -> &str {
        match self {
            Department::Cse => "CSE",
            Department::Eee => "EEE",
            Department::Ete => "ETE",
            Department::Phm => "PHM",
            Department::Other(code) => code,
        }
    }
}

impl From<String> for Department {
    fn from(code: String) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "CSE" => Department::Cse,
            "EEE" => Department::Eee,
            "ETE" => Department::Ete,
            "PHM" => Department::Phm,
            _ => Department::Other(code),
        }
    }
}

impl From<Department> for String {
    fn from(department: Department) -> Self {
        department.code().to_string()
    }
}

impl std::str::FromStr for Department {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Department::from(s.to_string()))
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The backend sends blank file and choice fields as `""`.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Accepts RFC 3339 timestamps and naive ones (taken as UTC); anything else
/// is dropped rather than failing the whole profile.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = empty_as_none(deserializer)? else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    Ok(NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc()))
}

fn department_or_none<'de, D>(deserializer: D) -> Result<Option<Department>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(empty_as_none(deserializer)?.map(Department::from))
}

/// Snapshot of the authenticated user as returned by the login endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "Array<{ id: number }>"))]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub profile_picture: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub cv_document: Option<String>,
    #[serde(default, deserialize_with = "department_or_none")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub department: Option<Department>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub last_login: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Full name if one is set, otherwise the username
    pub fn display_name(&self) -> String {
        let name = self.full_name();
        if name.is_empty() {
            self.username.clone()
        } else {
            name
        }
    }

    pub fn has_role(&self, role: RoleType) -> bool {
        self.roles.iter().any(|r| r.id == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(RoleType::Admin)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.id.to_string()).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub key: String,
    pub user: UserProfile,
}

/// Nested student record sent with a registration. The backend fills in
/// every field itself, so this serializes to `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentDetails {}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RegistrationRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub department: Department,
    #[cfg_attr(feature = "ts", ts(type = "Record<string, never>"))]
    pub student: StudentDetails,
}

impl RegistrationRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            phone_number: String::new(),
            department: Department::Cse,
            student: StudentDetails::default(),
        }
    }
}
