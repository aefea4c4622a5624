use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// User category controlling which screen set the front-end presents.
///
/// The backend reports this as a free-form `user_type` string in the login
/// response; it is normalized to this enum (case-insensitively) at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum Role {
    Doctor,
    Patient,
    Superuser,
    ClinicAdmin,
    Lab,
    Admin,
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DOCTOR" => Ok(Role::Doctor),
            "PATIENT" => Ok(Role::Patient),
            "SUPERUSER" => Ok(Role::Superuser),
            "CLINIC_ADMIN" => Ok(Role::ClinicAdmin),
            "LAB" => Ok(Role::Lab),
            "ADMIN" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Doctor => "DOCTOR",
            Role::Patient => "PATIENT",
            Role::Superuser => "SUPERUSER",
            Role::ClinicAdmin => "CLINIC_ADMIN",
            Role::Lab => "LAB",
            Role::Admin => "ADMIN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown user role: {0}")]
pub struct UnknownRole(pub String);

/// The authenticated user, as persisted in the store and held in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub role: Role,
    #[serde(rename = "isSuperuser")]
    pub is_superuser: bool,
    #[serde(rename = "doctorId")]
    pub doctor_id: Option<i64>,
    #[serde(rename = "patientId")]
    pub patient_id: Option<i64>,
    #[serde(rename = "clinicId")]
    pub clinic_id: Option<i64>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!("doctor".parse::<Role>().unwrap(), Role::Doctor);
        assert_eq!("Clinic_Admin".parse::<Role>().unwrap(), Role::ClinicAdmin);
        assert_eq!("LAB".parse::<Role>().unwrap(), Role::Lab);
        assert!("receptionist".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_display_is_uppercase() {
        assert_eq!(Role::ClinicAdmin.to_string(), "CLINIC_ADMIN");
        assert_eq!(Role::Patient.to_string(), "PATIENT");
    }

    #[test]
    fn test_user_round_trips_through_json() {
        let user = User {
            id: 7,
            username: "doc1".to_string(),
            email: "d@x.com".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            role: Role::Doctor,
            is_superuser: false,
            doctor_id: Some(7),
            patient_id: None,
            clinic_id: None,
        };

        let json = serde_json::to_string(&user).unwrap();
        let parsed: User = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, user);
        assert_eq!(parsed.full_name(), "A B");
    }
}
