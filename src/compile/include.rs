//! Bundled sources for the standard `google/protobuf` imports, used when
//! the file accessor reports not-found. The set is fixed; the sources are
//! compiled through the normal pipeline on first use in each compilation.

use std::collections::HashMap;

use once_cell::sync::Lazy;

static STANDARD_IMPORTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            "google/protobuf/any.proto",
            include_str!("../../include/google/protobuf/any.proto"),
        ),
        (
            "google/protobuf/api.proto",
            include_str!("../../include/google/protobuf/api.proto"),
        ),
        (
            "google/protobuf/compiler/plugin.proto",
            include_str!("../../include/google/protobuf/compiler/plugin.proto"),
        ),
        (
            "google/protobuf/descriptor.proto",
            include_str!("../../include/google/protobuf/descriptor.proto"),
        ),
        (
            "google/protobuf/duration.proto",
            include_str!("../../include/google/protobuf/duration.proto"),
        ),
        (
            "google/protobuf/empty.proto",
            include_str!("../../include/google/protobuf/empty.proto"),
        ),
        (
            "google/protobuf/field_mask.proto",
            include_str!("../../include/google/protobuf/field_mask.proto"),
        ),
        (
            "google/protobuf/source_context.proto",
            include_str!("../../include/google/protobuf/source_context.proto"),
        ),
        (
            "google/protobuf/struct.proto",
            include_str!("../../include/google/protobuf/struct.proto"),
        ),
        (
            "google/protobuf/timestamp.proto",
            include_str!("../../include/google/protobuf/timestamp.proto"),
        ),
        (
            "google/protobuf/type.proto",
            include_str!("../../include/google/protobuf/type.proto"),
        ),
        (
            "google/protobuf/wrappers.proto",
            include_str!("../../include/google/protobuf/wrappers.proto"),
        ),
    ])
});

pub(crate) fn standard_import(name: &str) -> Option<&'static str> {
    STANDARD_IMPORTS.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        assert!(standard_import("google/protobuf/descriptor.proto").is_some());
        assert!(standard_import("google/protobuf/any.proto").is_some());
        assert!(standard_import("google/protobuf/unknown.proto").is_none());
    }
}
