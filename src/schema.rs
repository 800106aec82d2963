// Hand-maintained to match the table ensured by TaskRepository::initialize.

diesel::table! {
    search_results (link) {
        link -> Text,
        status -> Integer,
        keyword -> Nullable<Text>,
        created_at -> Nullable<Text>,
        content -> Nullable<Text>,
        retry_count -> Integer,
        error_log -> Nullable<Text>,
        updated_at -> Nullable<Text>,
    }
}
