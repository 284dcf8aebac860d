use crate::Database;
use crate::models::{BoxRow, EnrollOutcome, MemberRow, PostRow, ReactionRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        name: &str,
        avatar_ref: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, name, avatar_ref) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, email, name, avatar_ref],
            )?;
            Ok(())
        })
    }

    /// Delete an account. Its enrollments go with it, and so do the boxes it
    /// authored.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Find a user by id, or by email ignoring case.
    pub fn resolve_user(&self, identifier: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| resolve_user(conn, identifier))
    }

    // -- Boxes --

    /// Create a box with its author as the first enrolled member.
    pub fn create_box(&self, id: &str, author_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO boxes (id, author_id) VALUES (?1, ?2)",
                (id, author_id),
            )?;
            tx.execute(
                "INSERT INTO enrollments (box_id, user_id) VALUES (?1, ?2)",
                (id, author_id),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Box header and members in enrollment order.
    pub fn get_box(&self, id: &str) -> Result<Option<(BoxRow, Vec<MemberRow>)>> {
        self.with_conn(|conn| {
            let Some(header) = query_box(conn, id)? else {
                return Ok(None);
            };
            let members = query_members(conn, id)?;
            Ok(Some((header, members)))
        })
    }

    // -- Enrollments --

    pub fn enroll(&self, box_id: &str, identifier: &str) -> Result<EnrollOutcome> {
        self.with_conn(|conn| {
            if query_box(conn, box_id)?.is_none() {
                return Ok(EnrollOutcome::UnknownBox);
            }
            let Some(user) = resolve_user(conn, identifier)? else {
                return Ok(EnrollOutcome::UnknownUser);
            };

            let inserted = conn.execute(
                "INSERT OR IGNORE INTO enrollments (box_id, user_id) VALUES (?1, ?2)",
                (box_id, &user.id),
            )?;
            if inserted == 0 {
                Ok(EnrollOutcome::AlreadyMember { user_id: user.id })
            } else {
                Ok(EnrollOutcome::Enrolled { user_id: user.id })
            }
        })
    }

    /// Returns false if the user was not enrolled.
    pub fn unenroll(&self, box_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM enrollments WHERE box_id = ?1 AND user_id = ?2",
                (box_id, user_id),
            )?;
            Ok(removed > 0)
        })
    }

    // -- Posts --

    pub fn insert_post(
        &self,
        box_id: &str,
        key: &str,
        uid: &str,
        name: &str,
        content_ref: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (box_id, key, uid, name, content_ref) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![box_id, key, uid, name, content_ref],
            )?;
            Ok(())
        })
    }

    /// Delete a post and its reactions. Returns false if it did not exist.
    pub fn delete_post(&self, box_id: &str, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM posts WHERE box_id = ?1 AND key = ?2",
                (box_id, key),
            )?;
            Ok(removed > 0)
        })
    }

    pub fn get_posts(&self, box_id: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| query_posts(conn, box_id))
    }

    // -- Reactions --

    /// Toggle a reaction: removes if exists, inserts if not.
    /// Returns true when the reaction was added.
    pub fn toggle_reaction(
        &self,
        box_id: &str,
        post_key: &str,
        user_id: &str,
        kind: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM reactions
                     WHERE box_id = ?1 AND post_key = ?2 AND user_id = ?3 AND kind = ?4",
                    rusqlite::params![box_id, post_key, user_id, kind],
                    |row| row.get(0),
                )
                .optional()?;

            if existing.is_some() {
                conn.execute(
                    "DELETE FROM reactions
                     WHERE box_id = ?1 AND post_key = ?2 AND user_id = ?3 AND kind = ?4",
                    rusqlite::params![box_id, post_key, user_id, kind],
                )?;
                Ok(false)
            } else {
                conn.execute(
                    "INSERT INTO reactions (box_id, post_key, user_id, kind) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![box_id, post_key, user_id, kind],
                )?;
                Ok(true)
            }
        })
    }

    /// All reactions on posts of a box, oldest first.
    pub fn get_reactions(&self, box_id: &str) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT post_key, user_id, kind FROM reactions
                 WHERE box_id = ?1
                 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map([box_id], |row| {
                    Ok(ReactionRow {
                        post_key: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, name, avatar_ref FROM users WHERE {}",
        predicate
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                avatar_ref: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn resolve_user(conn: &Connection, identifier: &str) -> Result<Option<UserRow>> {
    match query_user(conn, "id = ?1", identifier)? {
        Some(user) => Ok(Some(user)),
        None => query_user(conn, "email = ?1 COLLATE NOCASE", identifier),
    }
}

fn query_box(conn: &Connection, id: &str) -> Result<Option<BoxRow>> {
    let row = conn
        .query_row(
            "SELECT b.id, b.author_id, u.name
             FROM boxes b
             JOIN users u ON b.author_id = u.id
             WHERE b.id = ?1",
            [id],
            |row| {
                Ok(BoxRow {
                    id: row.get(0)?,
                    author_id: row.get(1)?,
                    author_name: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(row)
}

fn query_members(conn: &Connection, box_id: &str) -> Result<Vec<MemberRow>> {
    // JOIN users to fetch names in a single query
    let mut stmt = conn.prepare(
        "SELECT e.user_id, u.name
         FROM enrollments e
         JOIN users u ON e.user_id = u.id
         WHERE e.box_id = ?1
         ORDER BY e.seq",
    )?;

    let rows = stmt
        .query_map([box_id], |row| {
            Ok(MemberRow {
                user_id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_posts(conn: &Connection, box_id: &str) -> Result<Vec<PostRow>> {
    let mut stmt = conn.prepare(
        "SELECT key, uid, name, content_ref FROM posts WHERE box_id = ?1 ORDER BY key",
    )?;

    let rows = stmt
        .query_map([box_id], |row| {
            Ok(PostRow {
                key: row.get(0)?,
                uid: row.get(1)?,
                name: row.get(2)?,
                content_ref: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
