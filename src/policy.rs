use serde::Serialize;
use std::{collections::BTreeSet, fmt};

use crate::{
    error::{AppError, Result},
    models::Role,
};

/// Resource
///
/// The entity types exposed by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resource {
    Book,
    Author,
    Account,
}

/// Operation
///
/// What a caller wants to do with a resource. Finder queries are `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identity
///
/// An authenticated caller. It is passed explicitly to every guarded operation;
/// there is no ambient "current user".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_name: String,
    pub roles: BTreeSet<Role>,
}

impl Identity {
    pub fn new(user_name: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_name: user_name.into(),
            roles: roles.into_iter().collect(),
        }
    }

    /// The synthetic identity used while seeding data at startup.
    pub fn system() -> Self {
        Self::new("system", [Role::Admin])
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

const READERS: &[Role] = &[Role::User, Role::Admin];
const ADMINS: &[Role] = &[Role::Admin];

/// permitted_roles
///
/// The fixed policy table. Roles are not hierarchical, so ADMIN is listed
/// wherever it is allowed.
pub fn permitted_roles(resource: Resource, operation: Operation) -> &'static [Role] {
    match (resource, operation) {
        (Resource::Book | Resource::Author, Operation::Read) => READERS,
        (Resource::Book | Resource::Author, _) => ADMINS,
        (Resource::Account, Operation::Delete) => ADMINS,
        (Resource::Account, _) => READERS,
    }
}

/// authorize
///
/// Allows the operation when the role set holds at least one permitted role.
pub fn authorize(roles: &BTreeSet<Role>, resource: Resource, operation: Operation) -> Decision {
    if permitted_roles(resource, operation)
        .iter()
        .any(|role| roles.contains(role))
    {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

/// check
///
/// Guard invoked before every repository operation. A missing identity is
/// `Unauthenticated`; a denied identity is `Forbidden`.
pub fn check(caller: Option<&Identity>, resource: Resource, operation: Operation) -> Result<&Identity> {
    let identity = caller.ok_or_else(|| {
        tracing::warn!(%resource, %operation, "rejected unauthenticated call");
        AppError::Unauthenticated
    })?;

    match authorize(&identity.roles, resource, operation) {
        Decision::Allow => Ok(identity),
        Decision::Deny => {
            tracing::warn!(
                user = %identity.user_name,
                roles = ?identity.roles,
                %resource,
                %operation,
                "access denied"
            );
            Err(AppError::Forbidden)
        }
    }
}
