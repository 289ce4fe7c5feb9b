// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Friendship model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

/// Friendship between two users.
///
/// Document ID is the ordered user pair, so a pair has at most one record
/// regardless of who sent the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Friendship {
    pub friendship_id: String,
    pub requester_id: String,
    pub addressee_id: String,
    /// Both user IDs, for `array_contains` queries
    pub members: Vec<String>,
    pub status: FriendshipStatus,
    #[serde(with = "crate::time_utils::serde_utc")]
    pub created_at: DateTime<Utc>,
}

impl Friendship {
    pub fn document_id(a: &str, b: &str) -> String {
        if a <= b {
            format!("{}_{}", a, b)
        } else {
            format!("{}_{}", b, a)
        }
    }

    pub fn new_request(requester_id: &str, addressee_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            friendship_id: Self::document_id(requester_id, addressee_id),
            requester_id: requester_id.to_string(),
            addressee_id: addressee_id.to_string(),
            members: vec![requester_id.to_string(), addressee_id.to_string()],
            status: FriendshipStatus::Pending,
            created_at: now,
        }
    }

    /// The member that is not `user_id`.
    pub fn other(&self, user_id: &str) -> &str {
        if self.requester_id == user_id {
            &self.addressee_id
        } else {
            &self.requester_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_is_order_independent() {
        assert_eq!(
            Friendship::document_id("alice", "bob"),
            Friendship::document_id("bob", "alice")
        );
    }

    #[test]
    fn test_other_member() {
        let f = Friendship::new_request("alice", "bob", Utc::now());
        assert_eq!(f.other("alice"), "bob");
        assert_eq!(f.other("bob"), "alice");
    }
}
