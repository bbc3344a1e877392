#[path = "integration/callback.rs"]
mod callback;
#[path = "integration/embedding.rs"]
mod embedding;
#[path = "integration/properties.rs"]
mod properties;
