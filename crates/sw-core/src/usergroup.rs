//! Users, groups, and the generic selection that may be either.

use serde_json::{json, Value};
use swimlane_client::Session;

use crate::error::{Error, ErrorKind, Result};

/// Wire tag for a user/group selection object.
pub const USERGROUP_SELECTION_TYPE: &str = "Core.Models.Utilities.UserGroupSelection, Core";

/// A user-or-group reference as it appears inside record values and ACLs.
/// Carries only id and display name; [`UserGroupSelection::resolve`] performs
/// the lookup that disambiguates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupSelection {
    pub id: String,
    pub name: String,
}

impl UserGroupSelection {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Parse a selection object from wire JSON.
    pub(crate) fn from_wire(raw: &Value) -> Option<Self> {
        Some(Self {
            id: raw.get("id")?.as_str()?.to_string(),
            name: raw
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// The wire form used inside record values.
    pub(crate) fn to_wire(&self) -> Value {
        json!({
            "$type": USERGROUP_SELECTION_TYPE,
            "id": self.id,
            "name": self.name,
        })
    }

    /// Disambiguate the selection with one lookup: users first, then groups.
    pub async fn resolve(&self, session: &Session) -> Result<UserGroup> {
        match session
            .get_json::<Value>(&format!("user/{}", self.id))
            .await
        {
            Ok(raw) => Ok(UserGroup::User(User::from_raw(raw))),
            Err(_) => {
                let raw = session
                    .get_json::<Value>(&format!("groups/{}", self.id))
                    .await
                    .map_err(|err| {
                        Error::with_source(
                            ErrorKind::NotFound(format!(
                                "No user or group with id \"{}\"",
                                self.id
                            )),
                            err,
                        )
                    })?;
                Ok(UserGroup::Group(Group::from_raw(raw)))
            }
        }
    }
}

/// A resolved user or group.
#[derive(Debug, Clone)]
pub enum UserGroup {
    User(User),
    Group(Group),
}

impl UserGroup {
    pub fn id(&self) -> &str {
        match self {
            UserGroup::User(user) => &user.id,
            UserGroup::Group(group) => &group.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            UserGroup::User(user) => &user.display_name,
            UserGroup::Group(group) => &group.name,
        }
    }

    /// Collapse back to the selection form used on the wire.
    pub fn selection(&self) -> UserGroupSelection {
        UserGroupSelection::new(self.id(), self.name())
    }
}

/// A Swimlane user account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    raw: Value,
}

impl User {
    pub(crate) fn from_raw(raw: Value) -> Self {
        let field = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: field("id"),
            username: field("userName"),
            display_name: field("displayName"),
            raw,
        }
    }

    /// The raw server document.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn selection(&self) -> UserGroupSelection {
        UserGroupSelection::new(&self.id, &self.display_name)
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<User: {}>", self.display_name)
    }
}

/// A Swimlane group. Member users are fetched lazily through
/// [`Group::members`].
#[derive(Debug, Clone)]
pub struct Group {
    pub id: String,
    pub name: String,
    raw: Value,
}

impl Group {
    pub(crate) fn from_raw(raw: Value) -> Self {
        let field = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: field("id"),
            name: field("name"),
            raw,
        }
    }

    /// The raw server document.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn selection(&self) -> UserGroupSelection {
        UserGroupSelection::new(&self.id, &self.name)
    }

    /// Ids of the user selections embedded in the group document.
    pub fn member_ids(&self) -> Vec<String> {
        self.raw
            .get("users")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|u| u.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    /// Ids of subgroups embedded in the group document.
    pub fn subgroup_ids(&self) -> Vec<String> {
        self.raw
            .get("groups")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|g| g.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    /// Fetch the full member users, one request per member.
    pub async fn members(&self, session: &Session) -> Result<Vec<User>> {
        let mut users = Vec::new();
        for id in self.member_ids() {
            let raw: Value = session.get_json(&format!("user/{}", id)).await?;
            users.push(User::from_raw(raw));
        }
        Ok(users)
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Group: {}>", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selection_wire_round_trip() {
        let selection = UserGroupSelection::new("u1", "Admin User");
        let wire = selection.to_wire();
        assert_eq!(wire["$type"], USERGROUP_SELECTION_TYPE);
        assert_eq!(UserGroupSelection::from_wire(&wire), Some(selection));
    }

    #[test]
    fn test_group_member_and_subgroup_ids() {
        let group = Group::from_raw(json!({
            "id": "g1",
            "name": "Analysts",
            "users": [{"id": "u1", "name": "A"}, {"id": "u2", "name": "B"}],
            "groups": [{"id": "g2", "name": "Tier 2"}],
        }));
        assert_eq!(group.member_ids(), vec!["u1", "u2"]);
        assert_eq!(group.subgroup_ids(), vec!["g2"]);
        assert_eq!(format!("{}", group), "<Group: Analysts>");
    }

    #[test]
    fn test_user_display() {
        let user = User::from_raw(json!({
            "id": "u1",
            "userName": "admin",
            "displayName": "Admin User",
        }));
        assert_eq!(user.username, "admin");
        assert_eq!(format!("{}", user), "<User: Admin User>");
        assert_eq!(user.selection().name, "Admin User");
    }
}
