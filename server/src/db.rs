//! Flat-file user and group stores.
//!
//! Each line is one record in a fixed field order:
//! `users.txt`         — `id username password`
//! `groups.txt`        — `group_id name owner_id`
//! `group_members.txt` — `group_id user_id status` (0 pending, 1 accepted)
//!
//! Every read-modify-write sequence runs under the store's own mutex, so
//! concurrent handlers cannot lose updates against each other.

use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::types::{GroupInfo, GroupMemberInfo, MemberStatus, User};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("store I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt record in {0}: {1:?}")]
    Corrupt(&'static str, String),
}

/// Group-operation failures, worded as the user-facing reason strings.
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("Group not found")]
    NotFound,

    #[error("Already a member or pending")]
    AlreadyMember,

    #[error("You are not in this group")]
    NotMember,

    #[error("Only the group owner can do this")]
    NotOwner,

    #[error("Owner cannot leave the group")]
    OwnerCannotLeave,

    #[error("Request not found")]
    RequestNotFound,

    #[error("Database error")]
    Db(#[from] DbError),
}

fn read_lines(path: &Path) -> Result<Vec<String>, DbError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string())
            .collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

// --- USER STORE ---

pub struct UserStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl UserStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<Vec<User>, DbError> {
        let mut users = Vec::new();
        for line in read_lines(&self.path)? {
            let mut it = line.split_whitespace();
            let (id, username, password) = match (it.next(), it.next(), it.next()) {
                (Some(id), Some(u), Some(p)) => (id, u, p),
                _ => return Err(DbError::Corrupt("users.txt", line)),
            };
            let id = id
                .parse()
                .map_err(|_| DbError::Corrupt("users.txt", line.clone()))?;
            users.push(User {
                id,
                username: username.to_string(),
                password: password.to_string(),
            });
        }
        Ok(users)
    }

    fn write_all(&self, users: &[User]) -> Result<(), DbError> {
        let mut out = String::new();
        for u in users {
            out.push_str(&format!("{} {} {}\n", u.id, u.username, u.password));
        }
        fs::write(&self.path, out)?;
        Ok(())
    }

    /// Returns the user id on a credential match.
    pub fn check_login(&self, username: &str, password: &str) -> Result<Option<i64>, DbError> {
        let _guard = self.lock.lock().unwrap();
        Ok(self
            .read_all()?
            .into_iter()
            .find(|u| u.username == username && u.password == password)
            .map(|u| u.id))
    }

    /// Registers a new user. Returns `None` if the username is taken.
    pub fn register(&self, username: &str, password: &str) -> Result<Option<i64>, DbError> {
        let _guard = self.lock.lock().unwrap();
        let users = self.read_all()?;

        if users.iter().any(|u| u.username == username) {
            return Ok(None);
        }

        let new_id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let mut out = users;
        out.push(User {
            id: new_id,
            username: username.to_string(),
            password: password.to_string(),
        });
        self.write_all(&out)?;
        Ok(Some(new_id))
    }

    /// Replaces the password if the old one matches. Returns `false` on a
    /// mismatch or unknown user.
    pub fn change_password(&self, user_id: i64, old: &str, new: &str) -> Result<bool, DbError> {
        let _guard = self.lock.lock().unwrap();
        let mut users = self.read_all()?;

        let Some(user) = users
            .iter_mut()
            .find(|u| u.id == user_id && u.password == old)
        else {
            return Ok(false);
        };
        user.password = new.to_string();
        self.write_all(&users)?;
        Ok(true)
    }

    /// Removes the user's row. Returns `false` if no such user existed.
    pub fn delete_account(&self, user_id: i64) -> Result<bool, DbError> {
        let _guard = self.lock.lock().unwrap();
        let users = self.read_all()?;
        let before = users.len();
        let remaining: Vec<User> = users.into_iter().filter(|u| u.id != user_id).collect();
        if remaining.len() == before {
            return Ok(false);
        }
        self.write_all(&remaining)?;
        Ok(true)
    }
}

// --- GROUP STORE ---

pub struct GroupStore {
    groups_path: PathBuf,
    members_path: PathBuf,
    lock: Mutex<()>,
}

impl GroupStore {
    pub fn new(groups_path: PathBuf, members_path: PathBuf) -> Self {
        Self {
            groups_path,
            members_path,
            lock: Mutex::new(()),
        }
    }

    fn read_groups_unlocked(&self) -> Result<Vec<GroupInfo>, DbError> {
        let mut groups = Vec::new();
        for line in read_lines(&self.groups_path)? {
            let mut it = line.split_whitespace();
            let (id, name, owner) = match (it.next(), it.next(), it.next()) {
                (Some(id), Some(n), Some(o)) => (id, n, o),
                _ => return Err(DbError::Corrupt("groups.txt", line)),
            };
            let group_id = id
                .parse()
                .map_err(|_| DbError::Corrupt("groups.txt", line.clone()))?;
            let owner_id = owner
                .parse()
                .map_err(|_| DbError::Corrupt("groups.txt", line.clone()))?;
            groups.push(GroupInfo {
                group_id,
                name: name.to_string(),
                owner_id,
            });
        }
        Ok(groups)
    }

    fn write_groups(&self, groups: &[GroupInfo]) -> Result<(), DbError> {
        let mut out = String::new();
        for g in groups {
            out.push_str(&format!("{} {} {}\n", g.group_id, g.name, g.owner_id));
        }
        fs::write(&self.groups_path, out)?;
        Ok(())
    }

    fn read_members_unlocked(&self) -> Result<Vec<GroupMemberInfo>, DbError> {
        let mut members = Vec::new();
        for line in read_lines(&self.members_path)? {
            let mut it = line.split_whitespace();
            let (gid, uid, status) = match (it.next(), it.next(), it.next()) {
                (Some(g), Some(u), Some(s)) => (g, u, s),
                _ => return Err(DbError::Corrupt("group_members.txt", line)),
            };
            let group_id = gid
                .parse()
                .map_err(|_| DbError::Corrupt("group_members.txt", line.clone()))?;
            let user_id = uid
                .parse()
                .map_err(|_| DbError::Corrupt("group_members.txt", line.clone()))?;
            let status = status
                .parse()
                .ok()
                .and_then(MemberStatus::from_code)
                .ok_or_else(|| DbError::Corrupt("group_members.txt", line.clone()))?;
            members.push(GroupMemberInfo {
                group_id,
                user_id,
                status,
            });
        }
        Ok(members)
    }

    fn write_members(&self, members: &[GroupMemberInfo]) -> Result<(), DbError> {
        let mut out = String::new();
        for m in members {
            out.push_str(&format!(
                "{} {} {}\n",
                m.group_id,
                m.user_id,
                m.status.code()
            ));
        }
        fs::write(&self.members_path, out)?;
        Ok(())
    }

    pub fn read_groups(&self) -> Result<Vec<GroupInfo>, DbError> {
        let _guard = self.lock.lock().unwrap();
        self.read_groups_unlocked()
    }

    /// Members of one group, in store order.
    pub fn members_of(&self, group_id: i64) -> Result<Vec<GroupMemberInfo>, DbError> {
        let _guard = self.lock.lock().unwrap();
        Ok(self
            .read_members_unlocked()?
            .into_iter()
            .filter(|m| m.group_id == group_id)
            .collect())
    }

    /// Allocates the next group id, persists the record, and auto-adds the
    /// owner as an accepted member. The caller provisions the storage
    /// directory afterwards.
    pub fn create_group(&self, name: &str, owner_id: i64) -> Result<i64, DbError> {
        let _guard = self.lock.lock().unwrap();
        let mut groups = self.read_groups_unlocked()?;

        let group_id = groups.iter().map(|g| g.group_id).max().unwrap_or(0) + 1;
        groups.push(GroupInfo {
            group_id,
            name: name.to_string(),
            owner_id,
        });
        self.write_groups(&groups)?;

        let mut members = self.read_members_unlocked()?;
        members.push(GroupMemberInfo {
            group_id,
            user_id: owner_id,
            status: MemberStatus::Accepted,
        });
        self.write_members(&members)?;

        Ok(group_id)
    }

    pub fn is_owner(&self, group_id: i64, user_id: i64) -> Result<bool, DbError> {
        let _guard = self.lock.lock().unwrap();
        Ok(self
            .read_groups_unlocked()?
            .iter()
            .any(|g| g.group_id == group_id && g.owner_id == user_id))
    }

    pub fn is_accepted_member(&self, group_id: i64, user_id: i64) -> Result<bool, DbError> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.read_members_unlocked()?.iter().any(|m| {
            m.group_id == group_id && m.user_id == user_id && m.status == MemberStatus::Accepted
        }))
    }

    /// Files a pending join request.
    pub fn join(&self, group_id: i64, user_id: i64) -> Result<(), GroupError> {
        let _guard = self.lock.lock().unwrap();
        if !self
            .read_groups_unlocked()?
            .iter()
            .any(|g| g.group_id == group_id)
        {
            return Err(GroupError::NotFound);
        }

        let mut members = self.read_members_unlocked()?;
        if members
            .iter()
            .any(|m| m.group_id == group_id && m.user_id == user_id)
        {
            return Err(GroupError::AlreadyMember);
        }

        members.push(GroupMemberInfo {
            group_id,
            user_id,
            status: MemberStatus::Pending,
        });
        self.write_members(&members)?;
        Ok(())
    }

    /// Owner-only: flips a pending membership to accepted.
    pub fn approve(&self, group_id: i64, target_id: i64, actor_id: i64) -> Result<(), GroupError> {
        let _guard = self.lock.lock().unwrap();
        if !self
            .read_groups_unlocked()?
            .iter()
            .any(|g| g.group_id == group_id && g.owner_id == actor_id)
        {
            return Err(GroupError::NotOwner);
        }

        let mut members = self.read_members_unlocked()?;
        let mut found = false;
        for m in members.iter_mut() {
            if m.group_id == group_id && m.user_id == target_id {
                m.status = MemberStatus::Accepted;
                found = true;
            }
        }
        if !found {
            return Err(GroupError::RequestNotFound);
        }
        self.write_members(&members)?;
        Ok(())
    }

    /// Owner-only: removes a member's row.
    pub fn kick(&self, group_id: i64, target_id: i64, actor_id: i64) -> Result<(), GroupError> {
        let _guard = self.lock.lock().unwrap();
        if !self
            .read_groups_unlocked()?
            .iter()
            .any(|g| g.group_id == group_id && g.owner_id == actor_id)
        {
            return Err(GroupError::NotOwner);
        }

        let members = self.read_members_unlocked()?;
        let before = members.len();
        let remaining: Vec<GroupMemberInfo> = members
            .into_iter()
            .filter(|m| !(m.group_id == group_id && m.user_id == target_id))
            .collect();
        if remaining.len() == before {
            return Err(GroupError::NotMember);
        }
        self.write_members(&remaining)?;
        Ok(())
    }

    /// The owner adds the target as accepted; an accepted member files a
    /// sponsored (pending) request on the target's behalf. Anyone else is
    /// rejected.
    pub fn invite(
        &self,
        group_id: i64,
        target_id: i64,
        actor_id: i64,
    ) -> Result<MemberStatus, GroupError> {
        let _guard = self.lock.lock().unwrap();
        let groups = self.read_groups_unlocked()?;
        let Some(group) = groups.iter().find(|g| g.group_id == group_id) else {
            return Err(GroupError::NotFound);
        };

        let mut members = self.read_members_unlocked()?;

        let status = if group.owner_id == actor_id {
            MemberStatus::Accepted
        } else if members.iter().any(|m| {
            m.group_id == group_id && m.user_id == actor_id && m.status == MemberStatus::Accepted
        }) {
            MemberStatus::Pending
        } else {
            return Err(GroupError::NotMember);
        };

        if members
            .iter()
            .any(|m| m.group_id == group_id && m.user_id == target_id)
        {
            return Err(GroupError::AlreadyMember);
        }

        members.push(GroupMemberInfo {
            group_id,
            user_id: target_id,
            status,
        });
        self.write_members(&members)?;
        Ok(status)
    }

    /// Any accepted member except the owner may leave.
    pub fn leave(&self, group_id: i64, user_id: i64) -> Result<(), GroupError> {
        let _guard = self.lock.lock().unwrap();
        if self
            .read_groups_unlocked()?
            .iter()
            .any(|g| g.group_id == group_id && g.owner_id == user_id)
        {
            return Err(GroupError::OwnerCannotLeave);
        }

        let members = self.read_members_unlocked()?;
        let before = members.len();
        let remaining: Vec<GroupMemberInfo> = members
            .into_iter()
            .filter(|m| !(m.group_id == group_id && m.user_id == user_id))
            .collect();
        if remaining.len() == before {
            return Err(GroupError::NotMember);
        }
        self.write_members(&remaining)?;
        Ok(())
    }

    /// Owner-only: removes the group record and every membership row.
    /// Storage-directory removal is the caller's (best-effort) concern.
    pub fn delete_group(&self, group_id: i64, actor_id: i64) -> Result<(), GroupError> {
        let _guard = self.lock.lock().unwrap();
        let groups = self.read_groups_unlocked()?;
        let Some(group) = groups.iter().find(|g| g.group_id == group_id) else {
            return Err(GroupError::NotFound);
        };
        if group.owner_id != actor_id {
            return Err(GroupError::NotOwner);
        }

        let remaining_groups: Vec<GroupInfo> = groups
            .iter()
            .filter(|g| g.group_id != group_id)
            .cloned()
            .collect();
        self.write_groups(&remaining_groups)?;

        let remaining_members: Vec<GroupMemberInfo> = self
            .read_members_unlocked()?
            .into_iter()
            .filter(|m| m.group_id != group_id)
            .collect();
        self.write_members(&remaining_members)?;
        Ok(())
    }
}
