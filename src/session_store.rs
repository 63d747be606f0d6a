//! # Session store
//!
//! SQLite persistence for named conversations, so `drq interactive -s <name>` can
//! pick up where the last run stopped.
//!
//! Two tables (see [`crate::schema`]): `conversations`, one row per session name,
//! and `messages`, one row per turn in insertion order. The tables are created on
//! first open; no migration tool is needed.

use diesel::{connection::SimpleConnection, prelude::*};
use tracing::{debug, info};

use crate::{
    error::SessionError,
    history::ConversationTurn,
    models::{Conversation, Message},
    schema::{conversations, messages},
};

/// DDL matching [`crate::schema`].
pub const BOOTSTRAP_SQL: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    session_name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    sql_query TEXT,
    conversation_id INTEGER REFERENCES conversations(id)
);
";

/// Open a SQLite connection.
///
/// # Errors
/// [`SessionError::Connection`] if the database cannot be opened.
pub fn establish_connection(db_url: &str) -> Result<SqliteConnection, SessionError> {
    SqliteConnection::establish(db_url).map_err(|source| SessionError::Connection {
        url: db_url.to_string(),
        source,
    })
}

/// One named conversation in the session database.
pub struct SessionStore {
    connection: SqliteConnection,
    conversation: Conversation,
}

impl SessionStore {
    /// Open `db_url`, creating the tables and the named conversation if needed.
    ///
    /// # Parameters
    /// - `db_url`: SQLite path (or `:memory:`).
    /// - `session_name`: Conversation to attach to.
    ///
    /// # Errors
    /// Returns a [`SessionError`] if the database cannot be opened or bootstrapped.
    pub fn open(db_url: &str, session_name: &str) -> Result<Self, SessionError> {
        let mut connection = establish_connection(db_url)?;
        connection.batch_execute(BOOTSTRAP_SQL)?;

        let conversation = connection.transaction::<_, diesel::result::Error, _>(|conn| {
            let existing: Option<Conversation> = conversations::table
                .filter(conversations::session_name.eq(session_name))
                .first(conn)
                .optional()?;

            match existing {
                Some(conversation) => Ok(conversation),
                None => diesel::insert_into(conversations::table)
                    .values(&Conversation {
                        id: None,
                        session_name: session_name.to_string(),
                    })
                    .returning(Conversation::as_returning())
                    .get_result(conn),
            }
        })?;

        info!(
            "Using session '{}' (conversation {:?})",
            conversation.session_name, conversation.id
        );

        Ok(Self {
            connection,
            conversation,
        })
    }

    pub fn session_name(&self) -> &str {
        &self.conversation.session_name
    }

    /// Every stored turn, oldest first.
    ///
    /// # Errors
    /// Returns a [`SessionError`] on query failure or an unknown stored role.
    pub fn load_history(&mut self) -> Result<Vec<ConversationTurn>, SessionError> {
        let rows: Vec<Message> = messages::table
            .filter(messages::conversation_id.eq(self.conversation.id))
            .order(messages::id.asc())
            .select(Message::as_select())
            .load(&mut self.connection)?;

        debug!("Loaded {} stored turns", rows.len());

        rows.into_iter()
            .map(|message| {
                Ok(ConversationTurn {
                    role: message.role.parse()?,
                    text: message.content,
                })
            })
            .collect()
    }

    /// Persist one turn, with the SQL behind it when there is one.
    ///
    /// # Returns
    /// The inserted row.
    pub fn append(
        &mut self,
        turn: &ConversationTurn,
        sql: Option<&str>,
    ) -> Result<Message, SessionError> {
        let message = Message {
            id: None,
            role: turn.role.as_str().to_string(),
            content: turn.text.clone(),
            sql_query: sql.map(str::to_string),
            conversation_id: self.conversation.id,
        };

        let inserted = self.connection.transaction(|conn| {
            diesel::insert_into(messages::table)
                .values(&message)
                .returning(Message::as_returning())
                .get_result(conn)
        })?;

        Ok(inserted)
    }

    /// Delete every turn of this conversation.
    ///
    /// # Returns
    /// The number of deleted rows.
    pub fn clear(&mut self) -> Result<usize, SessionError> {
        let deleted = diesel::delete(
            messages::table.filter(messages::conversation_id.eq(self.conversation.id)),
        )
        .execute(&mut self.connection)?;
        info!("Cleared {} turns from '{}'", deleted, self.session_name());
        Ok(deleted)
    }
}
