//! Root-shelf permissions and the oracle that resolves them.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{HubError, Result};

/// Capability a user holds on a root shelf, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Permission {
    Read = 0,
    Write = 1,
    Admin = 2,
    Owner = 3,
}

pub const READ: &[Permission] = &[
    Permission::Owner,
    Permission::Admin,
    Permission::Write,
    Permission::Read,
];
pub const WRITE: &[Permission] = &[Permission::Owner, Permission::Admin, Permission::Write];
pub const MANAGE: &[Permission] = &[Permission::Owner, Permission::Admin];
pub const OWNER: &[Permission] = &[Permission::Owner];

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "Read",
            Permission::Write => "Write",
            Permission::Admin => "Admin",
            Permission::Owner => "Owner",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Read" => Ok(Permission::Read),
            "Write" => Ok(Permission::Write),
            "Admin" => Ok(Permission::Admin),
            "Owner" => Ok(Permission::Owner),
            other => Err(HubError::InvalidDto(format!("unknown permission {other:?}"))),
        }
    }
}

impl ToSql for Permission {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Permission {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: HubError| FromSqlError::Other(Box::new(e)))
    }
}

/// Whether an actor holding `actor` may set a member's edge to `granted`
/// when that member currently holds `existing`.
pub fn can_grant(actor: Permission, granted: Permission, existing: Option<Permission>) -> bool {
    granted != Permission::Owner
        && granted < actor
        && existing.map_or(true, |current| current < actor)
}

/// Resolves capabilities from `users_to_shelves`, remembering each answer
/// for the lifetime of one operation.
pub struct AccessOracle<'c> {
    conn: &'c Connection,
    cache: RefCell<HashMap<(Uuid, Uuid), Option<Permission>>>,
}

impl<'c> AccessOracle<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn capability(&self, user_id: Uuid, root_shelf_id: Uuid) -> Result<Option<Permission>> {
        if let Some(cached) = self.cache.borrow().get(&(user_id, root_shelf_id)) {
            return Ok(*cached);
        }
        let permission = self
            .conn
            .query_row(
                "SELECT permission FROM users_to_shelves WHERE user_id = ?1 AND root_shelf_id = ?2",
                params![user_id.to_string(), root_shelf_id.to_string()],
                |row| row.get::<_, Permission>(0),
            )
            .optional()?;
        self.cache
            .borrow_mut()
            .insert((user_id, root_shelf_id), permission);
        Ok(permission)
    }

    /// Succeeds with the held permission when it is one of `allowed`.
    pub fn require(
        &self,
        user_id: Uuid,
        root_shelf_id: Uuid,
        allowed: &[Permission],
    ) -> Result<Permission> {
        match self.capability(user_id, root_shelf_id)? {
            Some(permission) if allowed.contains(&permission) => Ok(permission),
            _ => Err(HubError::PermissionDenied(root_shelf_id)),
        }
    }

    /// Drop memoised answers for a root shelf after its edges change.
    pub fn forget(&self, root_shelf_id: Uuid) {
        self.cache
            .borrow_mut()
            .retain(|(_, root), _| *root != root_shelf_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_are_ordered() {
        assert!(Permission::Owner > Permission::Admin);
        assert!(Permission::Admin > Permission::Write);
        assert!(Permission::Write > Permission::Read);
    }

    #[test]
    fn allowed_sets_nest() {
        for p in OWNER {
            assert!(MANAGE.contains(p));
        }
        for p in MANAGE {
            assert!(WRITE.contains(p));
        }
        for p in WRITE {
            assert!(READ.contains(p));
        }
    }

    #[test]
    fn grants_stay_below_the_actor() {
        assert!(can_grant(Permission::Owner, Permission::Admin, None));
        assert!(can_grant(Permission::Admin, Permission::Write, Some(Permission::Read)));
        assert!(!can_grant(Permission::Admin, Permission::Admin, None));
        assert!(!can_grant(Permission::Owner, Permission::Owner, None));
        assert!(!can_grant(Permission::Admin, Permission::Read, Some(Permission::Owner)));
        assert!(!can_grant(Permission::Write, Permission::Read, None));
    }

    #[test]
    fn permission_names_parse() {
        for p in READ {
            assert_eq!(p.as_str().parse::<Permission>().unwrap(), *p);
        }
        assert!("Root".parse::<Permission>().is_err());
    }
}
