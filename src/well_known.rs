//! The `google/protobuf/*.proto` schemas shipped with the crate, so that imports
//! of them resolve without a search path.

use crate::fileset::ResourceProvider;

const RESOURCES: &[(&str, &str)] = &[
    (
        "google/protobuf/descriptor.proto",
        include_str!("../resources/google/protobuf/descriptor.proto"),
    ),
    (
        "google/protobuf/any.proto",
        include_str!("../resources/google/protobuf/any.proto"),
    ),
    (
        "google/protobuf/duration.proto",
        include_str!("../resources/google/protobuf/duration.proto"),
    ),
    (
        "google/protobuf/empty.proto",
        include_str!("../resources/google/protobuf/empty.proto"),
    ),
    (
        "google/protobuf/timestamp.proto",
        include_str!("../resources/google/protobuf/timestamp.proto"),
    ),
    (
        "google/protobuf/wrappers.proto",
        include_str!("../resources/google/protobuf/wrappers.proto"),
    ),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct WellKnownTypes;

impl WellKnownTypes {
    pub fn names() -> impl Iterator<Item = &'static str> {
        RESOURCES.iter().map(|(name, _)| *name)
    }
}

impl ResourceProvider for WellKnownTypes {
    fn get(&self, name: &str) -> Option<&str> {
        let name = name.replace('\\', "/");
        RESOURCES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
            .map(|(_, text)| *text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileset::FileSet;

    #[test]
    fn test_lookup_by_import_name() {
        assert!(WellKnownTypes.get("google/protobuf/any.proto").is_some());
        assert!(WellKnownTypes.get("google\\protobuf\\Empty.proto").is_some());
        assert!(WellKnownTypes.get("google/protobuf/struct.proto").is_none());
    }

    #[test]
    fn test_every_resource_compiles_cleanly() {
        let mut set = FileSet::default();
        for name in WellKnownTypes::names() {
            assert!(set.add(name, true, None).unwrap(), "{name}");
        }
        set.process().unwrap();
        assert!(set.diagnostics().is_empty(), "{:?}", set.diagnostics());
    }
}
