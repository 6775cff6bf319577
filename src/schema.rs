// Hand-maintained to match the DDL in repository/context.rs.

diesel::table! {
    users (id) {
        id -> Integer,
        source_id -> Nullable<BigInt>,
        email -> Text,
        name -> Text,
        slug -> Text,
        bio -> Nullable<Text>,
        avatar_url -> Nullable<Text>,
        registered_at -> Nullable<Text>,
        password_hash -> Text,
        role -> Text,
        must_reset_password -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    categories (id) {
        id -> Integer,
        source_id -> BigInt,
        name -> Text,
        slug -> Text,
        description -> Nullable<Text>,
        parent_id -> Nullable<Integer>,
        created_at -> Text,
    }
}

diesel::table! {
    tags (id) {
        id -> Integer,
        source_id -> BigInt,
        name -> Text,
        slug -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    media_assets (id) {
        id -> Integer,
        source_id -> BigInt,
        filename -> Text,
        source_url -> Text,
        local_url -> Text,
        local_path -> Text,
        mime_type -> Text,
        width -> Nullable<Integer>,
        height -> Nullable<Integer>,
        file_size -> BigInt,
        alt_text -> Nullable<Text>,
        content_hash -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    posts (id) {
        id -> Integer,
        source_id -> BigInt,
        title -> Text,
        slug -> Text,
        content -> Text,
        excerpt -> Nullable<Text>,
        status -> Text,
        published_at -> Nullable<Text>,
        modified_at -> Nullable<Text>,
        author_id -> Integer,
        featured_image_id -> Nullable<Integer>,
        read_time_minutes -> Integer,
        source_url -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    pages (id) {
        id -> Integer,
        source_id -> BigInt,
        title -> Text,
        slug -> Text,
        content -> Text,
        status -> Text,
        published_at -> Nullable<Text>,
        modified_at -> Nullable<Text>,
        author_id -> Integer,
        source_url -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    post_categories (post_id, category_id) {
        post_id -> Integer,
        category_id -> Integer,
    }
}

diesel::table! {
    post_tags (post_id, tag_id) {
        post_id -> Integer,
        tag_id -> Integer,
    }
}

diesel::table! {
    source_aliases (entity, source_id) {
        entity -> Text,
        source_id -> BigInt,
        target_id -> Integer,
    }
}

diesel::joinable!(posts -> users (author_id));
diesel::joinable!(posts -> media_assets (featured_image_id));
diesel::joinable!(pages -> users (author_id));
diesel::joinable!(post_categories -> posts (post_id));
diesel::joinable!(post_categories -> categories (category_id));
diesel::joinable!(post_tags -> posts (post_id));
diesel::joinable!(post_tags -> tags (tag_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    categories,
    tags,
    media_assets,
    posts,
    pages,
    post_categories,
    post_tags,
    source_aliases,
);
