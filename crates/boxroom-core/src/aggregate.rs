use boxroom_types::models::{Post, RawFeed, ReactionKind, UserAggregate};

/// Fold one feed snapshot into the statistics of `uid`.
///
/// A post belongs to `uid` only on an exact match of its `uid` field.
/// Reaction counts are the sizes of the de-duplicated reactor sets, so a
/// reactor listed twice counts once. Posts come out in feed key order.
pub fn reduce(feed: &RawFeed, uid: &str) -> UserAggregate {
    let posts: Vec<Post> = feed
        .iter()
        .filter(|(_, record)| record.uid == uid)
        .map(|(key, record)| Post::from_record(key, record))
        .collect();

    let total = |kind: ReactionKind| -> usize {
        posts.iter().map(|p| p.reactions(kind).len()).sum()
    };
    let (love, meh, sad) = (
        total(ReactionKind::Love),
        total(ReactionKind::Meh),
        total(ReactionKind::Sad),
    );

    UserAggregate {
        uid: uid.to_string(),
        post_count: posts.len(),
        love,
        meh,
        sad,
        posts,
    }
}

/// Same as [`reduce`], treating an absent feed as an empty one.
pub fn reduce_snapshot(feed: Option<&RawFeed>, uid: &str) -> UserAggregate {
    match feed {
        Some(feed) => reduce(feed, uid),
        None => UserAggregate::empty(uid),
    }
}
