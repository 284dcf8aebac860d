use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// -- Membership --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub uid: String,
    pub name: String,
}

/// A box as fetched from the box store: author identity plus the roster in
/// enrollment order. The author is always part of the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxInfo {
    pub id: String,
    pub author: Member,
    pub roster: Vec<Member>,
}

impl BoxInfo {
    pub fn is_author(&self, uid: &str) -> bool {
        self.author.uid == uid
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.roster.iter().any(|m| m.uid == uid)
    }

    pub fn member(&self, uid: &str) -> Option<&Member> {
        self.roster.iter().find(|m| m.uid == uid)
    }

    /// Number of enrolled users, author included.
    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }
}

// -- Feed --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Love,
    Meh,
    Sad,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 3] = [Self::Love, Self::Meh, Self::Sad];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Love => "love",
            Self::Meh => "meh",
            Self::Sad => "sad",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "love" => Some(Self::Love),
            "meh" => Some(Self::Meh),
            "sad" => Some(Self::Sad),
            _ => None,
        }
    }
}

/// A post exactly as the feed store pushes it. Reaction buckets may be
/// missing entirely and may, in principle, repeat a reactor id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "postURL")]
    pub content_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub love: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meh: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sad: Option<Vec<String>>,
}

impl PostRecord {
    /// Reactor ids of one bucket; an absent bucket is empty.
    pub fn bucket(&self, kind: ReactionKind) -> &[String] {
        let bucket = match kind {
            ReactionKind::Love => &self.love,
            ReactionKind::Meh => &self.meh,
            ReactionKind::Sad => &self.sad,
        };
        bucket.as_deref().unwrap_or_default()
    }
}

/// Full feed of a box: post key -> record. Ordered by key so every
/// reduction of the same snapshot walks posts in the same order.
pub type RawFeed = BTreeMap<String, PostRecord>;

/// Key of a post derived from its content name (`"abc.jpg"` -> `"abc"`).
pub fn post_key(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// A post with its reaction buckets normalized to sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub key: String,
    pub uid: String,
    pub name: String,
    pub content_ref: String,
    pub love: BTreeSet<String>,
    pub meh: BTreeSet<String>,
    pub sad: BTreeSet<String>,
}

impl Post {
    pub fn from_record(key: &str, record: &PostRecord) -> Self {
        let set = |kind: ReactionKind| record.bucket(kind).iter().cloned().collect::<BTreeSet<_>>();
        Self {
            key: key.to_string(),
            uid: record.uid.clone(),
            name: record.name.clone(),
            content_ref: record.content_ref.clone(),
            love: set(ReactionKind::Love),
            meh: set(ReactionKind::Meh),
            sad: set(ReactionKind::Sad),
        }
    }

    pub fn reactions(&self, kind: ReactionKind) -> &BTreeSet<String> {
        match kind {
            ReactionKind::Love => &self.love,
            ReactionKind::Meh => &self.meh,
            ReactionKind::Sad => &self.sad,
        }
    }
}

/// Per-user statistics folded from one feed snapshot. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAggregate {
    pub uid: String,
    pub post_count: usize,
    pub love: usize,
    pub meh: usize,
    pub sad: usize,
    pub posts: Vec<Post>,
}

impl UserAggregate {
    pub fn empty(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            post_count: 0,
            love: 0,
            meh: 0,
            sad: 0,
            posts: Vec::new(),
        }
    }

    pub fn count(&self, kind: ReactionKind) -> usize {
        match kind {
            ReactionKind::Love => self.love,
            ReactionKind::Meh => self.meh,
            ReactionKind::Sad => self.sad,
        }
    }

    pub fn post(&self, key: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.key == key)
    }
}

// -- Profiles --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default, alias = "photoURL")]
    pub avatar_ref: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_key_strips_extension() {
        assert_eq!(post_key("1600000000.jpg"), "1600000000");
        assert_eq!(post_key("archive.tar.gz"), "archive");
        assert_eq!(post_key("plain"), "plain");
        assert_eq!(post_key(""), "");
    }

    #[test]
    fn record_tolerates_missing_buckets() {
        let record: PostRecord = serde_json::from_str(
            r#"{"uid":"u1","name":"a.jpg","postURL":"https://cdn/a.jpg","love":["u2"]}"#,
        )
        .unwrap();
        assert_eq!(record.content_ref, "https://cdn/a.jpg");
        assert_eq!(record.bucket(ReactionKind::Love), ["u2".to_string()]);
        assert!(record.bucket(ReactionKind::Meh).is_empty());
        assert!(record.bucket(ReactionKind::Sad).is_empty());
    }

    #[test]
    fn post_collapses_duplicate_reactors() {
        let record = PostRecord {
            uid: "u1".into(),
            love: Some(vec!["a".into(), "a".into(), "b".into()]),
            ..Default::default()
        };
        let post = Post::from_record("p1", &record);
        assert_eq!(post.love.len(), 2);
        assert!(post.sad.is_empty());
    }

    #[test]
    fn roster_lookup() {
        let author = Member {
            uid: "u1".into(),
            name: "Ann".into(),
        };
        let info = BoxInfo {
            id: "box".into(),
            author: author.clone(),
            roster: vec![
                author,
                Member {
                    uid: "u2".into(),
                    name: "Bo".into(),
                },
            ],
        };
        assert!(info.is_author("u1"));
        assert!(!info.is_author("u2"));
        assert!(info.contains("u2"));
        assert_eq!(info.member("u2").map(|m| m.name.as_str()), Some("Bo"));
        assert_eq!(info.len(), 2);
    }

    #[test]
    fn reaction_kind_names() {
        for kind in ReactionKind::ALL {
            assert_eq!(ReactionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ReactionKind::parse("angry"), None);
    }
}
