// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor path
//!
//! The `path` module provides the `ActorPath` type. An `ActorPath` addresses an actor inside the
//! supervision tree: root actors live under `/user`, children append their own name to the path
//! of their parent (`/user/manager/group-a/device-1`).
//!

use serde::{Deserialize, Serialize};

use std::fmt::{Error, Formatter};

/// Hierarchical address of an actor.
#[derive(
    Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ActorPath(Vec<String>);

impl ActorPath {
    /// Path of the parent actor. The parent of a top level path is the empty path.
    pub fn parent(&self) -> Self {
        let mut tokens = self.0.clone();
        tokens.pop();
        ActorPath(tokens)
    }

    /// Last segment of the path, the name the actor was created with.
    pub fn key(&self) -> String {
        self.0.last().cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `self` is a direct child of `other`.
    pub fn is_child_of(&self, other: &ActorPath) -> bool {
        !self.is_empty() && self.parent() == *other
    }
}

fn tokens(path: &str) -> impl Iterator<Item = String> + '_ {
    path.split('/')
        .filter(|x| !x.trim().is_empty())
        .map(|s| s.to_string())
}

impl From<&str> for ActorPath {
    fn from(str: &str) -> Self {
        ActorPath(tokens(str).collect())
    }
}

impl From<String> for ActorPath {
    fn from(string: String) -> Self {
        ActorPath::from(string.as_str())
    }
}

impl std::ops::Div<&str> for ActorPath {
    type Output = ActorPath;

    fn div(self, rhs: &str) -> Self::Output {
        let mut keys = self.0;
        keys.extend(tokens(rhs));
        ActorPath(keys)
    }
}

impl std::fmt::Display for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        if self.is_empty() {
            write!(f, "/")
        } else {
            write!(f, "/{}", self.0.join("/"))
        }
    }
}

impl std::fmt::Debug for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        std::fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_string() {
        let path = ActorPath::from("");
        assert!(path.is_empty());
        assert_eq!(path.to_string(), "/");
    }

    #[test]
    fn parse_three_deep() {
        let path = ActorPath::from("/user/group-a/device-1");
        assert_eq!(path.0, vec!["user", "group-a", "device-1"]);
        assert_eq!(path.key(), "device-1");
    }

    #[test]
    fn parent_of_top_level_is_empty() {
        let path = ActorPath::from("/user");
        assert_eq!(path.parent().to_string(), "/");
        assert!(!ActorPath::from("/").is_child_of(&ActorPath::from("/")));
    }

    #[test]
    fn div_appends_segments() {
        let path = ActorPath::from("/user") / "group-a" / "query-0";
        assert_eq!(path.to_string(), "/user/group-a/query-0");
        assert!(path.is_child_of(&ActorPath::from("/user/group-a")));
        assert!(!path.is_child_of(&ActorPath::from("/user")));
        assert!(!ActorPath::from("/user/group-ab/query-0")
            .is_child_of(&ActorPath::from("/user/group-a")));
    }
}
