use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ts_at, uuid_at, Store};
use crate::clock::to_micros;
use crate::error::{HubError, Result};
use crate::validation::validate_length;

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                match value.as_str()? {
                    $($text => Ok($name::$variant),)+
                    other => Err(FromSqlError::Other(
                        format!("unknown {} {other:?}", stringify!($name)).into(),
                    )),
                }
            }
        }
    };
}
pub(crate) use text_enum;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    #[default]
    Normal,
    Guest,
}
text_enum!(UserRole { Admin => "Admin", Normal => "Normal", Guest => "Guest" });

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserPlan {
    #[default]
    Free,
    Pro,
    Ultimate,
    Enterprise,
}
text_enum!(UserPlan { Free => "Free", Pro => "Pro", Ultimate => "Ultimate", Enterprise => "Enterprise" });

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Online,
    #[serde(rename = "AFK")]
    Afk,
    DoNotDisturb,
    #[default]
    Offline,
}
text_enum!(UserStatus { Online => "Online", Afk => "AFK", DoNotDisturb => "DoNotDisturb", Offline => "Offline" });

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub email: String,
    pub role: UserRole,
    pub plan: UserPlan,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub plan: UserPlan,
}

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            name: row.get(1)?,
            display_name: row.get(2)?,
            email: row.get(3)?,
            role: row.get(4)?,
            plan: row.get(5)?,
            status: row.get(6)?,
            created_at: ts_at(row, 7)?,
            updated_at: ts_at(row, 8)?,
        })
    }
}

impl Store<'_> {
    pub fn create_one_user(&self, input: &NewUser) -> Result<User> {
        if input.name.trim().is_empty() || input.display_name.trim().is_empty() {
            return Err(HubError::InvalidDto("user names must not be blank".into()));
        }
        validate_length("name", &input.name, 64)?;
        validate_length("displayName", &input.display_name, 128)?;
        if !input.email.contains('@') {
            return Err(HubError::InvalidDto(format!("{:?} is not an email", input.email)));
        }
        let id = Uuid::new_v4();
        let now = to_micros(self.now());
        self.conn()
            .execute(
                "INSERT INTO users (id, name, display_name, email, role, plan, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    id.to_string(),
                    input.name,
                    input.display_name,
                    input.email,
                    input.role,
                    input.plan,
                    UserStatus::default(),
                    now
                ],
            )
            .map_err(|e| HubError::FailedToCreate(format!("user: {e}")))?;
        self.get_one_user_by_id(id)
    }

    pub fn get_one_user_by_id(&self, id: Uuid) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, name, display_name, email, role, plan, status, created_at, updated_at
                 FROM users WHERE id = ?1",
                params![id.to_string()],
                User::from_row,
            )
            .optional()?
            .ok_or_else(|| HubError::not_found("User", id))
    }
}
