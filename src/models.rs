//! # Database models
//!
//! Diesel mappings for the SQLite session database (see [`crate::schema`]).
//!
//! - [`Conversation`]: a named session.
//! - [`Message`]: one turn of a conversation, with the SQL that produced it when
//!   the turn is an answer.
//!
//! ```no_run
//! use diesel::prelude::*;
//! use drquery::schema::conversations;
//! use drquery::models::Conversation;
//!
//! # fn demo(conn: &mut SqliteConnection) -> Result<(), Box<dyn std::error::Error>> {
//! let convo: Conversation = diesel::insert_into(conversations::table)
//!     .values(&Conversation { id: None, session_name: "ward-review".into() })
//!     .returning(Conversation::as_returning())
//!     .get_result(conn)?;
//! # Ok(()) }
//! ```
use diesel::prelude::*;

/// A named chat session.
#[derive(Queryable, Identifiable, Insertable, Debug, Selectable, Clone)]
#[diesel(table_name = crate::schema::conversations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Conversation {
    /// Auto-increment primary key (set by the DB on insert).
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    /// Unique session name for this conversation.
    pub session_name: String,
}

/// One turn in a conversation.
///
/// `role` is `"user"` or `"assistant"`. `sql_query` is set on assistant turns that
/// came out of an executed statement.
#[derive(Queryable, Associations, Insertable, Debug, Selectable, Clone, PartialEq)]
#[diesel(belongs_to(Conversation))]
#[diesel(table_name = crate::schema::messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Message {
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub role: String,
    pub content: String,
    pub sql_query: Option<String>,
    pub conversation_id: Option<i32>,
}
