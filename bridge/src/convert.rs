//! Coordinate conversions between the two dialects.
//!
//! The client protocol is 0-based for lines and columns; the adapter is
//! configured with `linesStartAt1` and `columnsStartAt1`. Every boundary
//! conversion goes through these two functions.

pub fn client_to_adapter(value: i64) -> i64 {
    value + 1
}

pub fn adapter_to_client(value: i64) -> i64 {
    value - 1
}
