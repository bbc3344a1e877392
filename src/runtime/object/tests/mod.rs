//! Tests for the object runtime

mod exceptions;
mod values;
