// Kept in sync with the DDL in `session_store::BOOTSTRAP_SQL`.

diesel::table! {
    conversations (id) {
        id -> Integer,
        session_name -> Text,
    }
}

diesel::table! {
    messages (id) {
        id -> Integer,
        role -> Text,
        content -> Text,
        sql_query -> Nullable<Text>,
        conversation_id -> Nullable<Integer>,
    }
}

diesel::joinable!(messages -> conversations (conversation_id));

diesel::allow_tables_to_appear_in_same_query!(conversations, messages,);
