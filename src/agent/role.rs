use std::fmt;

use serde::{Deserialize, Serialize};

/// The two competing roles in self-play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Drives the pathological metabolite up with continuous pressure actions.
    Tumor,
    /// Designs enzyme constructs that sink the metabolite back down.
    SinkDesigner,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Tumor, Role::SinkDesigner];

    /// The role this one plays against.
    pub fn opponent(self) -> Role {
        match self {
            Role::Tumor => Role::SinkDesigner,
            Role::SinkDesigner => Role::Tumor,
        }
    }

    /// Fixed worker assignment: even slots play the tumor, odd slots the sink designer.
    pub fn for_worker(worker_id: usize) -> Role {
        if worker_id % 2 == 0 {
            Role::Tumor
        } else {
            Role::SinkDesigner
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Tumor => "tumor",
            Role::SinkDesigner => "sink_designer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per role, addressed by [`Role`] instead of by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleMap<T> {
    pub tumor: T,
    pub sink_designer: T,
}

impl<T> RoleMap<T> {
    pub fn new(tumor: T, sink_designer: T) -> Self {
        RoleMap {
            tumor,
            sink_designer,
        }
    }

    /// Build a map by evaluating `f` once per role.
    pub fn from_fn(mut f: impl FnMut(Role) -> T) -> Self {
        RoleMap {
            tumor: f(Role::Tumor),
            sink_designer: f(Role::SinkDesigner),
        }
    }

    /// Fallible variant of [`RoleMap::from_fn`].
    pub fn try_from_fn<E>(mut f: impl FnMut(Role) -> Result<T, E>) -> Result<Self, E> {
        Ok(RoleMap {
            tumor: f(Role::Tumor)?,
            sink_designer: f(Role::SinkDesigner)?,
        })
    }

    pub fn get(&self, role: Role) -> &T {
        match role {
            Role::Tumor => &self.tumor,
            Role::SinkDesigner => &self.sink_designer,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Tumor => &mut self.tumor,
            Role::SinkDesigner => &mut self.sink_designer,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, &T)> {
        [(Role::Tumor, &self.tumor), (Role::SinkDesigner, &self.sink_designer)].into_iter()
    }

    pub fn map<U>(&self, mut f: impl FnMut(Role, &T) -> U) -> RoleMap<U> {
        RoleMap {
            tumor: f(Role::Tumor, &self.tumor),
            sink_designer: f(Role::SinkDesigner, &self.sink_designer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opponent_is_involution() {
        for role in Role::ALL {
            assert_ne!(role, role.opponent());
            assert_eq!(role, role.opponent().opponent());
        }
    }

    #[test]
    fn test_worker_assignment_alternates() {
        assert_eq!(Role::for_worker(0), Role::Tumor);
        assert_eq!(Role::for_worker(1), Role::SinkDesigner);
        assert_eq!(Role::for_worker(6), Role::Tumor);
        assert_eq!(Role::for_worker(7), Role::SinkDesigner);
    }

    #[test]
    fn test_role_serde_names() {
        assert_eq!(serde_json::to_string(&Role::SinkDesigner).unwrap(), "\"sink_designer\"");
        let role: Role = serde_json::from_str("\"tumor\"").unwrap();
        assert_eq!(role, Role::Tumor);
    }

    #[test]
    fn test_role_map_access() {
        let mut map = RoleMap::from_fn(|role| role.as_str().len());
        assert_eq!(*map.get(Role::Tumor), 5);
        *map.get_mut(Role::SinkDesigner) += 1;
        assert_eq!(map.sink_designer, 14);
        let roles: Vec<Role> = map.iter().map(|(r, _)| r).collect();
        assert_eq!(roles, Role::ALL.to_vec());
    }
}
