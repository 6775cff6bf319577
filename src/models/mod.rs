//! Data models for the migration pipeline.

mod content;
mod entity;
mod source;

pub use content::{
    Category, Link, MediaAsset, Page, Post, PublishStatus, Record, Tag, User, IMPORTED_ROLE,
};
pub use entity::EntityType;
pub use source::{
    parse_source_datetime, Embedded, EmbeddedRef, MediaDetails, Rendered, SourceMedia,
    SourcePage, SourcePost, SourceTerm, SourceUser,
};
