use std::fmt;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

/// Displays any serializable value as tab-indented JSON. Renders nothing when
/// the value cannot be serialized.
pub struct Pretty<'a, T: ?Sized>(pub &'a T);

impl<T: Serialize + ?Sized> fmt::Display for Pretty<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
        if self.0.serialize(&mut ser).is_err() {
            return Ok(());
        }
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}
