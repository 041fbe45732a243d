pub mod sqlite {
    diesel::table! {
        rsvps (id) {
            id -> BigInt,
            name -> Text,
            attendance -> Text,
            guests -> Integer,
            note -> Nullable<Text>,
            created_at -> Timestamp,
        }
    }
}

pub mod pg {
    diesel::table! {
        rsvps (id) {
            id -> Integer,
            name -> Text,
            attendance -> Text,
            guests -> Integer,
            note -> Nullable<Text>,
            created_at -> Timestamptz,
        }
    }
}
