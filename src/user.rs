use serde::{Deserialize, Serialize};

use crate::Id;

/// The caller on whose behalf an operation runs, as established by the
/// session layer.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,

    pub username: String,

    /// Whether the user may see and modify everything.
    #[serde(default)]
    pub super_user: bool,

    /// The groups the user belongs to.
    #[serde(default)]
    pub group_ids: Vec<Id>,
}

impl User {
    pub fn is_member_of(&self, group_id: Option<Id>) -> bool {
        group_id.map_or(false, |id| self.group_ids.contains(&id))
    }

    /// Whether the user may modify a row owned by `group_id`.
    pub fn can_edit(&self, group_id: Option<Id>) -> bool {
        self.super_user || self.is_member_of(group_id)
    }
}

/// A group that recordings can belong to.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Group {
    pub id: Id,
    pub groupname: String,
}

/// The rows a caller is allowed to see.
#[derive(Clone, Debug, PartialEq)]
pub enum Scope {
    /// Every row.
    Everything,

    /// Public rows and rows belonging to any of these groups.
    PublicAndGroups(Vec<Id>),
}

impl Scope {
    pub fn for_user(user: Option<&User>) -> Scope {
        match user {
            Some(user) if user.super_user => Scope::Everything,
            Some(user) => Scope::PublicAndGroups(user.group_ids.clone()),
            None => Scope::PublicAndGroups(vec![]),
        }
    }

    pub fn includes(&self, public: bool, group_id: Option<Id>) -> bool {
        match self {
            Scope::Everything => true,
            Scope::PublicAndGroups(groups) => {
                public || group_id.map_or(false, |id| groups.contains(&id))
            }
        }
    }

    /// Splits the scope into the parameters the SQL queries bind.
    pub(crate) fn as_parameters(&self) -> (bool, Vec<Id>) {
        match self {
            Scope::Everything => (true, vec![]),
            Scope::PublicAndGroups(groups) => (false, groups.clone()),
        }
    }
}
