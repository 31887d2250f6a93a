use crate::Database;
use crate::models::{SeenOutcome, UserRow};
use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use kinship_types::models::{Chat, Message};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

impl Database {
    // -- Users --

    pub fn create_user(&self, id: Uuid, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), username, password_hash, timestamp(now())],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    /// How many of `ids` name existing users. Callers pass distinct ids.
    pub fn count_existing_users(&self, ids: &[Uuid]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT COUNT(*) FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );
            let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
            let count: i64 =
                conn.query_row(&sql, rusqlite::params_from_iter(ids.iter()), |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    // -- Friends --

    /// Link two users as friends in both directions.
    /// Returns false if they were already friends.
    pub fn add_friendship(&self, a: Uuid, b: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let at = timestamp(now());
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at) VALUES (?1, ?2, ?3)",
                params![a.to_string(), b.to_string(), at],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at) VALUES (?1, ?2, ?3)",
                params![b.to_string(), a.to_string(), at],
            )?;
            tx.commit()?;
            Ok(inserted == 1)
        })
    }

    pub fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
                    params![a.to_string(), b.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn friends_of(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT friend_id FROM friendships WHERE user_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| uuid_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Chats --

    pub fn create_group(&self, name: &str, creator: Uuid, participants: &[Uuid]) -> Result<Chat> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let chat = Chat {
                id: Uuid::new_v4(),
                participants: participants.to_vec(),
                group_name: Some(name.to_string()),
                room_id: Some(Uuid::new_v4().to_string()),
                created_by: creator,
                created_at: now(),
                messages: vec![],
            };
            tx.execute(
                "INSERT INTO chats (id, group_name, room_id, created_by, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    chat.id.to_string(),
                    name,
                    chat.room_id,
                    creator.to_string(),
                    timestamp(chat.created_at)
                ],
            )?;
            insert_participants(&tx, chat.id, participants)?;
            tx.commit()?;
            Ok(chat)
        })
    }

    /// Append to a group chat the sender belongs to. `None` when the chat is
    /// not a group or the sender is not a member.
    pub fn append_group_message(
        &self,
        chat_id: Uuid,
        sender: Uuid,
        content: &str,
    ) -> Result<Option<(Chat, Message)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(chat) = query_group_for_member(&tx, chat_id, sender)? else {
                return Ok(None);
            };
            let message = insert_message(&tx, chat_id, sender, content)?;
            tx.commit()?;
            Ok(Some((chat, message)))
        })
    }

    /// Append to the direct chat of the pair, creating it first if this is
    /// the pair's first message. The pair key is unique, so racing first
    /// messages from both sides land in one chat.
    pub fn append_direct_message(
        &self,
        sender: Uuid,
        recipient: Uuid,
        content: &str,
    ) -> Result<(Chat, Message)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let key = direct_key(sender, recipient);
            let fresh_id = Uuid::new_v4();

            let created = tx.execute(
                "INSERT INTO chats (id, direct_key, created_by, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(direct_key) DO NOTHING",
                params![fresh_id.to_string(), key, sender.to_string(), timestamp(now())],
            )?;

            let chat_id = if created == 1 {
                insert_participants(&tx, fresh_id, &[recipient, sender])?;
                fresh_id
            } else {
                tx.query_row("SELECT id FROM chats WHERE direct_key = ?1", [&key], |row| {
                    uuid_at(row, 0)
                })?
            };

            let message = insert_message(&tx, chat_id, sender, content)?;
            let chat = query_chat_header(&tx, chat_id)?
                .ok_or_else(|| anyhow!("chat {} vanished mid-transaction", chat_id))?;
            tx.commit()?;
            Ok((chat, message))
        })
    }

    /// Flip the chat's tail message to seen, if and only if `message_id` is
    /// the tail and it is not seen yet.
    pub fn mark_tail_seen(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<SeenOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !is_participant(&tx, chat_id, user_id)? {
                return Ok(SeenOutcome::ChatNotFound);
            }

            let tail = tx
                .query_row(
                    "SELECT id, seen, seen_at FROM messages WHERE chat_id = ?1 ORDER BY seq DESC LIMIT 1",
                    [chat_id.to_string()],
                    |row| Ok((uuid_at(row, 0)?, row.get::<_, bool>(1)?, opt_time_at(row, 2)?)),
                )
                .optional()?;

            let Some((tail_id, seen, seen_at)) = tail else {
                return Ok(SeenOutcome::NotTail);
            };
            if tail_id != message_id {
                return Ok(SeenOutcome::NotTail);
            }
            if seen {
                return Ok(SeenOutcome::AlreadySeen { seen_at });
            }

            let at = at.trunc_subsecs(6);
            tx.execute(
                "UPDATE messages SET seen = 1, seen_at = ?1 WHERE id = ?2 AND seen = 0",
                params![timestamp(at), message_id.to_string()],
            )?;
            let participants = query_participants(&tx, chat_id)?;
            tx.commit()?;

            Ok(SeenOutcome::Marked {
                seen_at: at,
                participants,
            })
        })
    }

    /// Direct chat of the pair with one page of its log, plus the total
    /// message count.
    pub fn direct_chat_page(
        &self,
        a: Uuid,
        b: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Option<(Chat, u64)>> {
        self.with_conn(|conn| {
            let chat_id = conn
                .query_row(
                    "SELECT id FROM chats WHERE direct_key = ?1",
                    [direct_key(a, b)],
                    |row| uuid_at(row, 0),
                )
                .optional()?;
            let Some(chat_id) = chat_id else {
                return Ok(None);
            };
            let Some(mut chat) = query_chat_header(conn, chat_id)? else {
                return Ok(None);
            };
            let (messages, total) = query_message_page(conn, chat_id, page, limit)?;
            chat.messages = messages;
            Ok(Some((chat, total)))
        })
    }

    pub fn group_chat_page(
        &self,
        chat_id: Uuid,
        member: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Option<(Chat, u64)>> {
        self.with_conn(|conn| {
            let Some(mut chat) = query_group_for_member(conn, chat_id, member)? else {
                return Ok(None);
            };
            let (messages, total) = query_message_page(conn, chat_id, page, limit)?;
            chat.messages = messages;
            Ok(Some((chat, total)))
        })
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn direct_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}", lo, hi)
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| {
            // Rows written by hand through the sqlite shell use datetime('now').
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
}

fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_time_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        parse_timestamp(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn is_participant(conn: &Connection, chat_id: Uuid, user_id: Uuid) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id.to_string(), user_id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn insert_participants(conn: &Connection, chat_id: Uuid, participants: &[Uuid]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO chat_participants (chat_id, user_id, position) VALUES (?1, ?2, ?3)",
    )?;
    for (position, user_id) in participants.iter().enumerate() {
        stmt.execute(params![chat_id.to_string(), user_id.to_string(), position as i64])?;
    }
    Ok(())
}

fn query_participants(conn: &Connection, chat_id: Uuid) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM chat_participants WHERE chat_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map([chat_id.to_string()], |row| uuid_at(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Chat document without its message log.
fn query_chat_header(conn: &Connection, chat_id: Uuid) -> Result<Option<Chat>> {
    let header = conn
        .query_row(
            "SELECT id, group_name, room_id, created_by, created_at FROM chats WHERE id = ?1",
            [chat_id.to_string()],
            |row| {
                Ok(Chat {
                    id: uuid_at(row, 0)?,
                    participants: vec![],
                    group_name: row.get(1)?,
                    room_id: row.get(2)?,
                    created_by: uuid_at(row, 3)?,
                    created_at: time_at(row, 4)?,
                    messages: vec![],
                })
            },
        )
        .optional()?;

    let Some(mut chat) = header else {
        return Ok(None);
    };
    chat.participants = query_participants(conn, chat_id)?;
    Ok(Some(chat))
}

fn query_group_for_member(conn: &Connection, chat_id: Uuid, user_id: Uuid) -> Result<Option<Chat>> {
    if !is_participant(conn, chat_id, user_id)? {
        return Ok(None);
    }
    Ok(query_chat_header(conn, chat_id)?.filter(Chat::is_group))
}

fn insert_message(conn: &Connection, chat_id: Uuid, sender: Uuid, content: &str) -> Result<Message> {
    let next_seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE chat_id = ?1",
        [chat_id.to_string()],
        |row| row.get(0),
    )?;

    let message = Message {
        id: Uuid::new_v4(),
        content: content.to_string(),
        created_by: sender,
        seen: false,
        seen_at: None,
        created_at: now(),
    };

    conn.execute(
        "INSERT INTO messages (id, chat_id, seq, content, created_by, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            message.id.to_string(),
            chat_id.to_string(),
            next_seq,
            content,
            sender.to_string(),
            timestamp(message.created_at)
        ],
    )?;

    Ok(message)
}

/// One page of the log counted back from the newest message; the page
/// itself is ordered oldest first. Sequence numbers are dense from 1, so the
/// page is a plain seq range.
fn query_message_page(
    conn: &Connection,
    chat_id: Uuid,
    page: u32,
    limit: u32,
) -> Result<(Vec<Message>, u64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
        [chat_id.to_string()],
        |row| row.get(0),
    )?;
    let total = total.max(0) as u64;

    let skip = u64::from(page.saturating_sub(1)) * u64::from(limit);
    let upper = total.saturating_sub(skip);
    let lower = upper.saturating_sub(u64::from(limit));

    let mut stmt = conn.prepare(
        "SELECT id, content, created_by, seen, seen_at, created_at
         FROM messages
         WHERE chat_id = ?1 AND seq > ?2 AND seq <= ?3
         ORDER BY seq ASC",
    )?;

    let rows = stmt
        .query_map(
            params![chat_id.to_string(), lower as i64, upper as i64],
            |row| {
                Ok(Message {
                    id: uuid_at(row, 0)?,
                    content: row.get(1)?,
                    created_by: uuid_at(row, 2)?,
                    seen: row.get(3)?,
                    seen_at: opt_time_at(row, 4)?,
                    created_at: time_at(row, 5)?,
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((rows, total))
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
