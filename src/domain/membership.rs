//! Permission-group membership.
//!
//! The admission engine never inspects how groups are represented; it asks a
//! [`MembershipProvider`]. [`GroupDirectory`] is the in-process provider: a
//! tree of named groups where a member of a child group is also a member of
//! every ancestor.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use super::{GroupId, UserId};
use crate::error::AdmissionError;

/// Capability check consumed by the admission engine.
pub trait MembershipProvider: Send + Sync + fmt::Debug {
    /// Returns how many parent hops separate one of the user's direct groups
    /// from `group` (`Some(0)` for a direct member), or `None` when the user
    /// is not a member at all.
    fn membership_depth(&self, user: UserId, group: GroupId) -> Option<u32>;

    /// Returns `true` if `user` is a member of `group`.
    fn is_member(&self, user: UserId, group: GroupId) -> bool {
        self.membership_depth(user, group).is_some()
    }
}

#[derive(Debug)]
struct GroupNode {
    name: String,
    parent: Option<GroupId>,
}

#[derive(Debug, Default)]
struct Directory {
    groups: HashMap<GroupId, GroupNode>,
    by_name: HashMap<String, GroupId>,
    members: HashMap<UserId, HashSet<GroupId>>,
}

impl Directory {
    fn depth_from(&self, start: GroupId, target: GroupId) -> Option<u32> {
        let mut current = Some(start);
        let mut depth = 0u32;
        // Parents always predate their children, so the walk is acyclic.
        for _ in 0..=self.groups.len() {
            let id = current?;
            if id == target {
                return Some(depth);
            }
            current = self.groups.get(&id).and_then(|node| node.parent);
            depth = depth.saturating_add(1);
        }
        None
    }
}

/// In-memory hierarchical group directory.
#[derive(Debug, Default)]
pub struct GroupDirectory {
    inner: RwLock<Directory>,
}

impl GroupDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group, optionally nested under an existing parent.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::GroupNotFound`] if `parent` is unknown and
    /// [`AdmissionError::InvalidRequest`] if the name is already taken.
    pub fn add_group(
        &self,
        name: &str,
        parent: Option<GroupId>,
    ) -> Result<GroupId, AdmissionError> {
        let mut dir = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if dir.by_name.contains_key(name) {
            return Err(AdmissionError::InvalidRequest(format!(
                "group {name} already exists"
            )));
        }
        if let Some(parent) = parent
            && !dir.groups.contains_key(&parent)
        {
            return Err(AdmissionError::GroupNotFound(parent.to_string()));
        }
        let id = GroupId::new();
        dir.groups.insert(
            id,
            GroupNode {
                name: name.to_string(),
                parent,
            },
        );
        dir.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Makes `user` a direct member of `group`.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::GroupNotFound`] if the group is unknown.
    pub fn add_user(&self, group: GroupId, user: UserId) -> Result<(), AdmissionError> {
        let mut dir = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !dir.groups.contains_key(&group) {
            return Err(AdmissionError::GroupNotFound(group.to_string()));
        }
        dir.members.entry(user).or_default().insert(group);
        Ok(())
    }

    /// Removes a direct membership. Returns `true` if it existed.
    pub fn remove_user(&self, group: GroupId, user: UserId) -> bool {
        let mut dir = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        dir.members
            .get_mut(&user)
            .is_some_and(|groups| groups.remove(&group))
    }

    /// Looks a group up by name.
    #[must_use]
    pub fn group_by_name(&self, name: &str) -> Option<GroupId> {
        let dir = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        dir.by_name.get(name).copied()
    }

    /// Returns the name of a group.
    #[must_use]
    pub fn group_name(&self, group: GroupId) -> Option<String> {
        let dir = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        dir.groups.get(&group).map(|node| node.name.clone())
    }
}

impl MembershipProvider for GroupDirectory {
    fn membership_depth(&self, user: UserId, group: GroupId) -> Option<u32> {
        let dir = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        dir.members
            .get(&user)?
            .iter()
            .filter_map(|direct| dir.depth_from(*direct, group))
            .min()
    }
}
