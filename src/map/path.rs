// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Folder path arithmetic for set-folder navigation.
//!
//! Paths are stored without a leading separator; the root folder is the
//! empty string.

use super::types::SetFolderOption;

pub const SEPARATOR: char = '/';

/// Compute the path that results from applying `option` to `current`.
///
/// The current path is never modified; the caller promotes the returned
/// value once the peer confirms the navigation.
pub fn build_pending_path(option: SetFolderOption, name: Option<&str>, current: &str) -> String {
    let name = name.filter(|n| !n.is_empty());
    match option {
        SetFolderOption::Root => String::new(),
        SetFolderOption::Down => {
            let mut path = current.to_string();
            if let Some(name) = name {
                append_segment(&mut path, name);
            }
            path
        }
        SetFolderOption::Up => {
            let mut path = match current.rfind(SEPARATOR) {
                Some(idx) => current[..idx].to_string(),
                None => String::new(),
            };
            if let Some(name) = name {
                append_segment(&mut path, name);
            }
            path
        }
    }
}

fn append_segment(path: &mut String, name: &str) {
    if !path.is_empty() && !path.ends_with(SEPARATOR) {
        path.push(SEPARATOR);
    }
    path.push_str(name.trim_start_matches(SEPARATOR));
}

/// Walk state for an absolute set-folder: Root first, then one Down per
/// segment of the target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbsoluteWalk {
    target: String,
    cursor: usize,
    rooted: bool,
}

impl AbsoluteWalk {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.trim_matches(SEPARATOR).to_string(),
            cursor: 0,
            rooted: false,
        }
    }

    /// Whether the initial Root step has been confirmed.
    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    pub fn mark_rooted(&mut self) {
        self.rooted = true;
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Path reached so far.
    pub fn reached(&self) -> &str {
        self.target[..self.cursor].trim_end_matches(SEPARATOR)
    }

    /// The next segment to descend into, or `None` when the walk is done.
    pub fn next_segment(&self) -> Option<&str> {
        let rest = self.target.get(self.cursor..)?.trim_start_matches(SEPARATOR);
        if rest.is_empty() {
            return None;
        }
        Some(rest.split(SEPARATOR).next().unwrap_or(rest))
    }

    /// Record that the segment returned by `next_segment` was entered.
    pub fn advance(&mut self) {
        let Some(len) = self.next_segment().map(str::len) else {
            return;
        };
        let start = self.target[self.cursor..]
            .find(|c| c != SEPARATOR)
            .map(|offset| self.cursor + offset)
            .unwrap_or(self.cursor);
        self.cursor = start + len;
    }

    pub fn is_complete(&self) -> bool {
        self.next_segment().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_down() {
        assert_eq!(
            build_pending_path(SetFolderOption::Down, Some("d"), "a/b/c"),
            "a/b/c/d"
        );
        assert_eq!(build_pending_path(SetFolderOption::Down, Some("telecom"), ""), "telecom");
        assert_eq!(build_pending_path(SetFolderOption::Down, Some("x"), "a/"), "a/x");
    }

    #[test]
    fn test_up() {
        assert_eq!(build_pending_path(SetFolderOption::Up, None, "a/b/c"), "a/b");
        assert_eq!(build_pending_path(SetFolderOption::Up, None, "a"), "");
        assert_eq!(build_pending_path(SetFolderOption::Up, None, ""), "");
        assert_eq!(
            build_pending_path(SetFolderOption::Up, Some("sent"), "telecom/msg/inbox"),
            "telecom/msg/sent"
        );
    }

    #[test]
    fn test_root_ignores_name() {
        assert_eq!(build_pending_path(SetFolderOption::Root, Some("x"), "a/b"), "");
    }

    #[test]
    fn test_absolute_walk() {
        let mut walk = AbsoluteWalk::new("/telecom/msg/inbox");
        assert!(!walk.is_rooted());
        walk.mark_rooted();
        assert_eq!(walk.next_segment(), Some("telecom"));
        walk.advance();
        assert_eq!(walk.reached(), "telecom");
        assert_eq!(walk.next_segment(), Some("msg"));
        walk.advance();
        assert_eq!(walk.reached(), "telecom/msg");
        walk.advance();
        assert_eq!(walk.reached(), "telecom/msg/inbox");
        assert!(walk.is_complete());
    }

    #[test]
    fn test_absolute_walk_empty_target() {
        let walk = AbsoluteWalk::new("");
        assert!(walk.is_complete());
        assert_eq!(walk.reached(), "");
    }
}
