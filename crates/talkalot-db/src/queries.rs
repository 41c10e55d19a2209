use crate::Database;
use crate::models::{MessageRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

const USER_COLUMNS: &str = "id, email, full_name, password, profile_pic, created_at, updated_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        full_name: &str,
        password_hash: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, full_name, password) VALUES (?1, ?2, ?3, ?4)",
                (id, email, full_name, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// All users except the given one: the contact list.
    pub fn list_users_except(&self, id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY full_name"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Replace the avatar URL and bump updated_at. Returns the fresh row,
    /// or None if the user no longer exists.
    pub fn update_profile_pic(&self, id: &str, profile_pic: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET profile_pic = ?2, updated_at = datetime('now') WHERE id = ?1",
                (id, profile_pic),
            )?;
            if updated == 0 {
                return Ok(None);
            }
            query_user(conn, "id", id)
        })
    }

    /// Users this user has at least one message with, in either direction.
    pub fn get_chat_partners(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE id IN (
                     SELECT CASE WHEN m.sender_id = ?1 THEN m.receiver_id ELSE m.sender_id END
                     FROM messages m
                     WHERE m.sender_id = ?1 OR m.receiver_id = ?1
                 )
                 ORDER BY full_name"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        text: Option<&str>,
        image: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, image)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, sender_id, receiver_id, text, image],
            )?;
            Ok(())
        })
    }

    /// Full history between two users, both directions, oldest first.
    pub fn get_conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, text, image, created_at
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map([user_a, user_b], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        text: row.get(3)?,
                        image: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &rusqlite::Row) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        password: row.get(3)?,
        profile_pic: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
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

#[cfg(test)]
mod tests {
    use crate::Database;

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "ana@example.com", "Ana Lima", "hash-a").unwrap();
        db.create_user("u2", "bia@example.com", "Bia Souza", "hash-b").unwrap();
        db.create_user("u3", "caio@example.com", "Caio Reis", "hash-c").unwrap();
        db
    }

    #[test]
    fn email_uniqueness_enforced_by_store() {
        let db = seeded_db();
        let result = db.create_user("u9", "ana@example.com", "Other Ana", "hash-x");
        assert!(result.is_err());
    }

    #[test]
    fn lookup_by_email_and_id() {
        let db = seeded_db();

        let by_email = db.get_user_by_email("bia@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, "u2");
        assert_eq!(by_email.full_name, "Bia Souza");

        let by_id = db.get_user_by_id("u2").unwrap().unwrap();
        assert_eq!(by_id.email, "bia@example.com");

        assert!(db.get_user_by_email("nobody@example.com").unwrap().is_none());
        assert!(db.get_user_by_id("u9").unwrap().is_none());
    }

    #[test]
    fn contacts_exclude_self() {
        let db = seeded_db();
        let contacts = db.list_users_except("u1").unwrap();
        let ids: Vec<_> = contacts.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["u2", "u3"]);
    }

    #[test]
    fn update_profile_pic_bumps_row() {
        let db = seeded_db();
        let updated = db
            .update_profile_pic("u1", "https://cdn.example.com/a.png")
            .unwrap()
            .unwrap();
        assert_eq!(updated.profile_pic, "https://cdn.example.com/a.png");

        assert!(db.update_profile_pic("u9", "x").unwrap().is_none());
    }

    #[test]
    fn conversation_covers_both_directions_in_order() {
        let db = seeded_db();
        db.insert_message("m1", "u1", "u2", Some("oi"), None).unwrap();
        db.insert_message("m2", "u2", "u1", Some("olá"), None).unwrap();
        db.insert_message("m3", "u1", "u3", Some("outro papo"), None).unwrap();
        db.insert_message("m4", "u1", "u2", None, Some("https://cdn.example.com/i.png")).unwrap();

        let convo = db.get_conversation("u1", "u2").unwrap();
        let ids: Vec<_> = convo.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m4"]);
        assert_eq!(convo[0].text.as_deref(), Some("oi"));
        assert!(convo[2].text.is_none());
        assert_eq!(convo[2].image.as_deref(), Some("https://cdn.example.com/i.png"));
    }

    #[test]
    fn chat_partners_are_distinct_either_direction() {
        let db = seeded_db();
        db.insert_message("m1", "u1", "u2", Some("a"), None).unwrap();
        db.insert_message("m2", "u1", "u2", Some("b"), None).unwrap();
        db.insert_message("m3", "u3", "u1", Some("c"), None).unwrap();

        let partners = db.get_chat_partners("u1").unwrap();
        let ids: Vec<_> = partners.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["u2", "u3"]);

        // u2 only ever talked to u1
        let partners = db.get_chat_partners("u2").unwrap();
        let ids: Vec<_> = partners.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["u1"]);
    }

    #[test]
    fn insert_message_requires_existing_users() {
        let db = seeded_db();
        let result = db.insert_message("m1", "u1", "ghost", Some("oi"), None);
        assert!(result.is_err());
    }
}
