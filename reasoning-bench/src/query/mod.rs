//! Structured Query Client

pub mod client;
pub mod schema;

pub use client::{QueryClient, QueryOutput, QuerySpec};
pub use schema::{
    decode, decode_value, extract_json, FieldKind, FieldSpec, ResponseSchema, StructuredOutput,
};
